mod error;
pub use error::MigrateError;

mod set;
pub use set::MigrationSet;

mod target;
pub use target::MigrationTarget;

mod runner;
pub use runner::{MigrationRunner, apply_pending};
