use std::path::{Path, PathBuf};

use sqlx::migrate::{Migration, Migrator};
use tracing::debug;

use crate::error::MigrateError;

/// Up-migrations found in a directory, ascending by version.
///
/// Files follow the `<VERSION>_<DESCRIPTION>.sql` naming (`0001_init.sql`); reversible
/// `.up.sql` / `.down.sql` pairs contribute their up half only.
#[derive(Debug, Clone)]
pub struct MigrationSet {
    dir: PathBuf,
    migrations: Vec<Migration>,
}

impl MigrationSet {
    /// Fails with `MissingDirectory` unless `dir` is an existing directory.
    pub fn ensure_dir(dir: &Path) -> Result<(), MigrateError> {
        if dir.is_dir() {
            Ok(())
        } else {
            Err(MigrateError::MissingDirectory(dir.to_path_buf()))
        }
    }

    pub async fn load(dir: impl AsRef<Path>) -> Result<Self, MigrateError> {
        let dir = dir.as_ref();
        Self::ensure_dir(dir)?;

        let migrator = Migrator::new(dir).await.map_err(|source| MigrateError::Load {
            dir: dir.to_path_buf(),
            source,
        })?;
        let mut migrations: Vec<Migration> = migrator
            .iter()
            .filter(|m| !m.migration_type.is_down_migration())
            .cloned()
            .collect();
        migrations.sort_by_key(|m| m.version);

        debug!(dir = %dir.display(), count = migrations.len(), "migrations loaded");
        Ok(Self {
            dir: dir.to_path_buf(),
            migrations,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn iter(&self) -> impl Iterator<Item = &Migration> {
        self.migrations.iter()
    }

    pub fn get(&self, version: i64) -> Option<&Migration> {
        self.migrations
            .binary_search_by_key(&version, |m| m.version)
            .ok()
            .map(|i| &self.migrations[i])
    }

    pub fn len(&self) -> usize {
        self.migrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.migrations.is_empty()
    }
}
