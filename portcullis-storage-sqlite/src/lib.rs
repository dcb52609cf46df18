//! SQLite storage backend for portcullis
//!
//! Every timestamp is stored as an `INTEGER` of unix seconds.
//!
//! # Usage
//!
//! ```rust,no_run
//! use portcullis_core::RepositoryProvider;
//! use portcullis_storage_sqlite::SqliteStorage;
//!
//! # async fn run() -> Result<(), portcullis_core::Error> {
//! let storage = SqliteStorage::connect("sqlite://portcullis.db?mode=rwc").await?;
//! let repositories = storage.into_repository_provider();
//! repositories.migrate().await?;
//! # Ok(())
//! # }
//! ```
pub mod migrations;
pub mod repositories;

use std::{str::FromStr, sync::Arc};

use chrono::{DateTime, Utc};
use portcullis_core::{Clock, Error, User, UserId, error::StorageError};
use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};

pub use repositories::{
    SqliteLoginAttemptRepository, SqlitePasswordRepository, SqliteRememberTokenRepository,
    SqliteRepositoryProvider, SqliteSessionRepository, SqliteUserRepository,
};

#[derive(Debug, Clone)]
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open a pool for `database_url`, creating the database file if needed.
    pub async fn connect(database_url: &str) -> Result<Self, Error> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| {
                tracing::error!(error = %e, "Invalid SQLite database URL");
                StorageError::Connection("Invalid SQLite database URL".to_string())
            })?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .connect_with(options)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Failed to connect to SQLite");
                StorageError::Connection("Failed to connect to SQLite".to_string())
            })?;

        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn into_repository_provider(self) -> SqliteRepositoryProvider {
        SqliteRepositoryProvider::new(self.pool)
    }

    /// Like [`SqliteStorage::into_repository_provider`], but the attempt log
    /// stamps rows with `clock` instead of the system clock.
    pub fn into_repository_provider_with_clock(
        self,
        clock: Arc<dyn Clock>,
    ) -> SqliteRepositoryProvider {
        SqliteRepositoryProvider::with_clock(self.pool, clock)
    }
}

/// Convert a stored unix timestamp back into a `DateTime`.
pub(crate) fn from_timestamp(seconds: i64) -> Result<DateTime<Utc>, Error> {
    DateTime::from_timestamp(seconds, 0)
        .ok_or_else(|| StorageError::Database(format!("Invalid timestamp: {seconds}")).into())
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub(crate) struct SqliteUser {
    id: String,
    email: String,
    name: Option<String>,
    is_active: bool,
    email_verified_at: Option<i64>,
    deleted_at: Option<i64>,
    created_at: i64,
    updated_at: i64,
}

impl TryFrom<SqliteUser> for User {
    type Error = Error;

    fn try_from(user: SqliteUser) -> Result<Self, Self::Error> {
        User::builder()
            .id(UserId::new(&user.id))
            .email(user.email)
            .name(user.name)
            .is_active(user.is_active)
            .email_verified_at(user.email_verified_at.map(from_timestamp).transpose()?)
            .deleted_at(user.deleted_at.map(from_timestamp).transpose()?)
            .created_at(from_timestamp(user.created_at)?)
            .updated_at(from_timestamp(user.updated_at)?)
            .build()
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use portcullis_core::RepositoryProvider;

    #[tokio::test]
    async fn test_connect_and_migrate() {
        let storage = SqliteStorage::connect("sqlite::memory:").await.unwrap();
        let repositories = storage.into_repository_provider();

        repositories.migrate().await.unwrap();
        repositories.health_check().await.unwrap();

        // Migrating twice is a no-op
        repositories.migrate().await.unwrap();
    }

    #[tokio::test]
    async fn test_connect_rejects_bad_url() {
        let err = SqliteStorage::connect("sqlite:///missing-directory/portcullis.db").await.unwrap_err();
        assert!(err.is_storage_error());
    }

    #[test]
    fn test_from_timestamp() {
        assert_eq!(from_timestamp(0).unwrap().timestamp(), 0);
        assert!(from_timestamp(i64::MAX).is_err());
    }
}
