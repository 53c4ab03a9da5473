use std::time::Duration;

use async_trait::async_trait;
use sqlx::{
    PgConnection,
    migrate::{AppliedMigration, Migrate, MigrateError, Migration},
};

/// A database that records which migrations it has applied.
///
/// Implemented for live Postgres connections; tests substitute an in-memory double.
#[async_trait]
pub trait MigrationTarget: Send {
    /// Take the migration lock so concurrent runners serialize.
    async fn lock(&mut self) -> Result<(), MigrateError>;

    async fn unlock(&mut self) -> Result<(), MigrateError>;

    /// Create the bookkeeping table if it does not exist yet.
    async fn ensure_migrations_table(&mut self) -> Result<(), MigrateError>;

    /// Version of a migration that started but never finished, if any.
    async fn dirty_version(&mut self) -> Result<Option<i64>, MigrateError>;

    async fn list_applied_migrations(&mut self) -> Result<Vec<AppliedMigration>, MigrateError>;

    /// Apply one migration and record it.
    async fn apply(&mut self, migration: &Migration) -> Result<Duration, MigrateError>;
}

#[async_trait]
impl MigrationTarget for PgConnection {
    async fn lock(&mut self) -> Result<(), MigrateError> {
        Migrate::lock(self).await
    }

    async fn unlock(&mut self) -> Result<(), MigrateError> {
        Migrate::unlock(self).await
    }

    async fn ensure_migrations_table(&mut self) -> Result<(), MigrateError> {
        Migrate::ensure_migrations_table(self).await
    }

    async fn dirty_version(&mut self) -> Result<Option<i64>, MigrateError> {
        Migrate::dirty_version(self).await
    }

    async fn list_applied_migrations(&mut self) -> Result<Vec<AppliedMigration>, MigrateError> {
        Migrate::list_applied_migrations(self).await
    }

    async fn apply(&mut self, migration: &Migration) -> Result<Duration, MigrateError> {
        Migrate::apply(self, migration).await
    }
}
