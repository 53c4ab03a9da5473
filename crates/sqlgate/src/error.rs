use std::process::ExitCode;

use thiserror::Error;

use sqlgate_exec::ExecError;
use sqlgate_migrate::MigrateError;
use sqlgate_model::ConfigError;
use sqlgate_observe::LoggerError;

#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Exec(#[from] ExecError),

    #[error(transparent)]
    Migrate(#[from] MigrateError),

    #[error(transparent)]
    Logger(#[from] LoggerError),
}

impl RunError {
    /// Operator-facing failure class.
    pub fn kind(&self) -> &'static str {
        match self {
            RunError::Config(ConfigError::Missing { .. }) => "MissingConfiguration",
            RunError::Config(_) => "InvalidConfiguration",

            RunError::Exec(e) => match e {
                ExecError::ExecutableNotFound { .. } => "ExecutableNotFound",
                ExecError::Spawn { .. } | ExecError::SignalInstall(_) => "ProcessStartFailure",
                ExecError::ReadinessTimeout { .. } => "ReadinessTimeout",
                ExecError::OutputStream(_) | ExecError::OutputClosed => "OutputStreamError",
                ExecError::ProxyExited { .. } => "ProxyExited",
                ExecError::Interrupted(_) => "Interrupted",
                ExecError::Signal { .. } | ExecError::Teardown => "TeardownFailure",
            },

            RunError::Migrate(e) => match e {
                MigrateError::MissingDirectory(_) => "MissingMigrationsDirectory",
                MigrateError::Connect { .. }
                | MigrateError::ConnectTimeout { .. }
                | MigrateError::Config(_) => "DatabaseConnectionError",
                _ => "MigrationApplyError",
            },

            RunError::Logger(_) => "LoggerFailure",
        }
    }

    /// `130` for operator interrupts (shell convention for SIGINT), `1` otherwise.
    pub fn exit_code(&self) -> ExitCode {
        match self {
            RunError::Exec(ExecError::Interrupted(_)) => ExitCode::from(130),
            _ => ExitCode::FAILURE,
        }
    }
}
