mod error;
pub use error::{ExecError, ExecResult};

pub mod locate;
pub use locate::{locate, locate_in};

pub mod proc;
pub use proc::{
    ExitOutcome, MarkerPredicate, OutputLine, OutputStream, ProxyConfig, ProxyHandle,
    ProxyProcess, ReadinessPredicate, supervise,
};

pub mod trap;
pub use trap::{SignalTrap, TrapSignal};

mod util;

pub mod prelude {
    pub use crate::error::{ExecError, ExecResult};
    pub use crate::proc::{MarkerPredicate, ProxyConfig, ReadinessPredicate, supervise};
    pub use crate::trap::{SignalTrap, TrapSignal};
}
