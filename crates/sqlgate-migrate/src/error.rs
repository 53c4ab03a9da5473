use std::{path::PathBuf, time::Duration};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MigrateError {
    #[error("migrations directory {0:?} is missing")]
    MissingDirectory(PathBuf),

    #[error("load migrations from {dir:?}: {source}")]
    Load {
        dir: PathBuf,
        #[source]
        source: sqlx::migrate::MigrateError,
    },

    #[error("invalid connection settings: {0}")]
    Config(#[from] sqlgate_model::ConfigError),

    #[error("connect to {target}: {source}")]
    Connect {
        target: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("connect to {target}: no answer within {}s", .after.as_secs())]
    ConnectTimeout { target: String, after: Duration },

    #[error("migration bookkeeping failed: {0}")]
    Bookkeeping(#[source] sqlx::migrate::MigrateError),

    #[error("database is dirty at version {0}; fix it manually before migrating")]
    Dirty(i64),

    #[error("database records migration {0}, which is not in the migrations directory")]
    UnknownApplied(i64),

    #[error("applied migration {0} was modified after it ran")]
    VersionMismatch(i64),

    #[error("apply migration {version} ({description}): {source}")]
    Apply {
        version: i64,
        description: String,
        #[source]
        source: sqlx::migrate::MigrateError,
    },
}
