use std::{io, path::PathBuf, time::Duration};

use thiserror::Error;

use crate::trap::TrapSignal;

pub type ExecResult<T> = Result<T, ExecError>;

#[derive(Error, Debug)]
pub enum ExecError {
    #[error("executable {name:?} not found in working directory or PATH")]
    ExecutableNotFound { name: String },

    #[error("spawn {program:?} failed: {source}")]
    Spawn {
        program: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("proxy not ready after {}ms", .after.as_millis())]
    ReadinessTimeout { after: Duration },

    #[error("proxy output read failed: {0}")]
    OutputStream(#[source] io::Error),

    #[error("proxy output closed before readiness marker")]
    OutputClosed,

    #[error("proxy exited unexpectedly: {status}")]
    ProxyExited { status: String },

    #[error("interrupted by {0}")]
    Interrupted(TrapSignal),

    #[error("install signal handlers: {0}")]
    SignalInstall(#[source] io::Error),

    #[error("send {signal} to process group {pgid}: {source}")]
    Signal {
        signal: &'static str,
        pgid: u32,
        #[source]
        source: io::Error,
    },

    #[error("proxy did not exit after kill")]
    Teardown,
}
