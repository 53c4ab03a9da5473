use std::process::ExitCode;

use anyhow::Context;
use tracing::{error, info};

use sqlgate_exec::SignalTrap;
use sqlgate_observe::{LoggerConfig, logger_init};

mod config;
mod error;
mod run;

use crate::{config::RunConfig, error::RunError};

#[tokio::main]
async fn main() -> ExitCode {
    match bootstrap().await {
        Ok(applied) => {
            println!("Applied {applied} migrations!");
            ExitCode::SUCCESS
        }
        Err(err) => {
            let run_err = err.downcast_ref::<RunError>();
            let kind = run_err.map(RunError::kind).unwrap_or("Startup");
            error!(kind, "{err:#}");
            eprintln!("Exiting with error: {err:#}");
            run_err.map(RunError::exit_code).unwrap_or(ExitCode::FAILURE)
        }
    }
}

async fn bootstrap() -> anyhow::Result<u64> {
    let log_cfg = LoggerConfig::from_env().map_err(RunError::from)?;
    logger_init(&log_cfg).map_err(RunError::from)?;

    let cfg = RunConfig::from_env()
        .map_err(RunError::from)
        .context("load configuration")?;
    info!(?cfg.settings, ?cfg.tuning, "configuration loaded");

    let mut trap = SignalTrap::install()
        .map_err(RunError::from)
        .context("install signal trap")?;

    let applied = run::run(&cfg, trap.recv()).await?;
    info!(applied, "migrations complete");
    Ok(applied)
}
