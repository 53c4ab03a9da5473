mod database;
mod endpoint;
mod error;
mod settings;
mod tuning;

pub use database::DatabaseTarget;
pub use endpoint::Endpoint;
pub use error::ConfigError;
pub use settings::{
    CREDENTIALS_VAR, DB_NAME_VAR, DB_PASS_VAR, DB_USER_VAR, INSTANCE_ID_VAR, REQUIRED_VARS,
    Settings,
};
pub use tuning::{ReadyStream, Tuning};
