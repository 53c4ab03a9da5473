use std::{collections::HashMap, path::PathBuf, str::FromStr, time::Duration};

use sqlx::{
    Connection, PgConnection,
    migrate::{AppliedMigration, Migration},
    postgres::PgConnectOptions,
};
use tracing::{debug, info, instrument, warn};

use sqlgate_model::DatabaseTarget;

use crate::{error::MigrateError, set::MigrationSet, target::MigrationTarget};

/// Applies the migrations of one directory to the database behind the tunnel.
#[derive(Debug, Clone)]
pub struct MigrationRunner {
    dir: PathBuf,
    connect_timeout: Duration,
}

impl MigrationRunner {
    pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            connect_timeout: Self::DEFAULT_CONNECT_TIMEOUT,
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Load the set, connect, apply what is pending. Returns the number of newly applied
    /// migrations.
    #[instrument(level = "info", skip_all, fields(db = %target.redacted()))]
    pub async fn run(&self, target: &DatabaseTarget) -> Result<u64, MigrateError> {
        let set = MigrationSet::load(&self.dir).await?;

        let shown = target.redacted();
        let options = PgConnectOptions::from_str(target.connection_url()?.as_str()).map_err(
            |source| MigrateError::Connect {
                target: shown.clone(),
                source,
            },
        )?;

        debug!("connecting");
        let mut conn = tokio::time::timeout(self.connect_timeout, PgConnection::connect_with(&options))
            .await
            .map_err(|_| MigrateError::ConnectTimeout {
                target: shown.clone(),
                after: self.connect_timeout,
            })?
            .map_err(|source| MigrateError::Connect {
                target: shown.clone(),
                source,
            })?;

        let applied = apply_pending(&mut conn, &set).await;
        if let Err(e) = conn.close().await {
            debug!(error = %e, "closing migration connection failed");
        }
        applied
    }
}

/// Apply every migration of `set` the target has not recorded, in ascending version order.
///
/// The count is returned only if all pending migrations applied; the first failure aborts the
/// run. A fully migrated target gets no `apply` call.
pub async fn apply_pending<T>(target: &mut T, set: &MigrationSet) -> Result<u64, MigrateError>
where
    T: MigrationTarget + ?Sized,
{
    target.lock().await.map_err(MigrateError::Bookkeeping)?;
    let res = apply_locked(target, set).await;
    if let Err(e) = target.unlock().await {
        warn!(error = %e, "releasing migration lock failed");
    }
    res
}

async fn apply_locked<T>(target: &mut T, set: &MigrationSet) -> Result<u64, MigrateError>
where
    T: MigrationTarget + ?Sized,
{
    target
        .ensure_migrations_table()
        .await
        .map_err(MigrateError::Bookkeeping)?;

    if let Some(version) = target.dirty_version().await.map_err(MigrateError::Bookkeeping)? {
        return Err(MigrateError::Dirty(version));
    }

    let applied: HashMap<i64, AppliedMigration> = target
        .list_applied_migrations()
        .await
        .map_err(MigrateError::Bookkeeping)?
        .into_iter()
        .map(|m| (m.version, m))
        .collect();

    let pending = plan(set, &applied)?;
    if pending.is_empty() {
        info!(known = set.len(), "database is up to date");
        return Ok(0);
    }
    info!(pending = pending.len(), "applying migrations");

    let mut count = 0u64;
    for migration in pending {
        let elapsed = target
            .apply(migration)
            .await
            .map_err(|source| MigrateError::Apply {
                version: migration.version,
                description: migration.description.to_string(),
                source,
            })?;
        info!(
            version = migration.version,
            description = %migration.description,
            elapsed_ms = elapsed.as_millis() as u64,
            "migration applied"
        );
        count += 1;
    }
    Ok(count)
}

fn plan<'a>(
    set: &'a MigrationSet,
    applied: &HashMap<i64, AppliedMigration>,
) -> Result<Vec<&'a Migration>, MigrateError> {
    let mut recorded: Vec<i64> = applied.keys().copied().collect();
    recorded.sort_unstable();
    if let Some(version) = recorded.into_iter().find(|v| set.get(*v).is_none()) {
        return Err(MigrateError::UnknownApplied(version));
    }

    let mut pending = Vec::new();
    for migration in set.iter() {
        match applied.get(&migration.version) {
            Some(done) if done.checksum != migration.checksum => {
                return Err(MigrateError::VersionMismatch(migration.version));
            }
            Some(_) => {}
            None => pending.push(migration),
        }
    }
    Ok(pending)
}
