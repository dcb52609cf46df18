//! Repository implementations for SQLite storage

pub mod attempt;
pub mod password;
pub mod remember_token;
pub mod session;
pub mod user;

pub use attempt::SqliteLoginAttemptRepository;
pub use password::SqlitePasswordRepository;
pub use remember_token::SqliteRememberTokenRepository;
pub use session::SqliteSessionRepository;
pub use user::SqliteUserRepository;

use async_trait::async_trait;
use portcullis_core::{
    Clock, Error,
    clock::system_clock,
    error::StorageError,
    repositories::{
        LoginAttemptRepositoryProvider, PasswordRepositoryProvider, RememberTokenRepositoryProvider,
        RepositoryProvider, SessionRepositoryProvider, UserRepositoryProvider,
    },
};
use portcullis_migration::MigrationManager;
use sqlx::SqlitePool;
use std::sync::Arc;

use crate::migrations::{self, SqliteMigrationManager};

/// Repository provider implementation for SQLite
///
/// This struct implements all the individual repository provider traits
/// as well as the unified `RepositoryProvider` trait.
pub struct SqliteRepositoryProvider {
    pool: SqlitePool,
    user: Arc<SqliteUserRepository>,
    session: Arc<SqliteSessionRepository>,
    password: Arc<SqlitePasswordRepository>,
    login_attempt: Arc<SqliteLoginAttemptRepository>,
    remember_token: Arc<SqliteRememberTokenRepository>,
}

impl SqliteRepositoryProvider {
    pub fn new(pool: SqlitePool) -> Self {
        Self::with_clock(pool, system_clock())
    }

    /// Build a provider whose user rows and attempt log are stamped from `clock`.
    pub fn with_clock(pool: SqlitePool, clock: Arc<dyn Clock>) -> Self {
        let user = Arc::new(SqliteUserRepository::with_clock(pool.clone(), clock.clone()));
        let session = Arc::new(SqliteSessionRepository::new(pool.clone()));
        let password = Arc::new(SqlitePasswordRepository::with_clock(
            pool.clone(),
            clock.clone(),
        ));
        let login_attempt = Arc::new(SqliteLoginAttemptRepository::with_clock(
            pool.clone(),
            clock,
        ));
        let remember_token = Arc::new(SqliteRememberTokenRepository::new(pool.clone()));

        Self {
            pool,
            user,
            session,
            password,
            login_attempt,
            remember_token,
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Versions of the schema that [`RepositoryProvider::migrate`] would apply.
    pub async fn pending_migrations(&self) -> Result<Vec<i64>, Error> {
        let manager = SqliteMigrationManager::new(self.pool.clone());
        manager.initialize().await?;
        Ok(manager.pending_versions(&migrations::all()).await?)
    }
}

// Implement individual provider traits

impl UserRepositoryProvider for SqliteRepositoryProvider {
    type UserRepo = SqliteUserRepository;

    fn user(&self) -> &Self::UserRepo {
        &self.user
    }
}

impl SessionRepositoryProvider for SqliteRepositoryProvider {
    type SessionRepo = SqliteSessionRepository;

    fn session(&self) -> &Self::SessionRepo {
        &self.session
    }
}

impl PasswordRepositoryProvider for SqliteRepositoryProvider {
    type PasswordRepo = SqlitePasswordRepository;

    fn password(&self) -> &Self::PasswordRepo {
        &self.password
    }
}

impl LoginAttemptRepositoryProvider for SqliteRepositoryProvider {
    type LoginAttemptRepo = SqliteLoginAttemptRepository;

    fn login_attempt(&self) -> &Self::LoginAttemptRepo {
        &self.login_attempt
    }
}

impl RememberTokenRepositoryProvider for SqliteRepositoryProvider {
    type RememberTokenRepo = SqliteRememberTokenRepository;

    fn remember_token(&self) -> &Self::RememberTokenRepo {
        &self.remember_token
    }
}

// Implement the unified RepositoryProvider trait

#[async_trait]
impl RepositoryProvider for SqliteRepositoryProvider {
    async fn migrate(&self) -> Result<(), Error> {
        let manager = SqliteMigrationManager::new(self.pool.clone());
        manager.initialize().await.map_err(|e| {
            tracing::error!(error = %e, "Failed to initialize migrations");
            Error::Storage(StorageError::Migration(
                "Failed to initialize migrations".to_string(),
            ))
        })?;

        manager.up(&migrations::all()).await.map_err(|e| {
            tracing::error!(error = %e, "Failed to run migrations");
            Error::Storage(StorageError::Migration(
                "Failed to run migrations".to_string(),
            ))
        })?;

        Ok(())
    }

    async fn health_check(&self) -> Result<(), Error> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| Error::Storage(StorageError::Database(e.to_string())))?;
        Ok(())
    }
}
