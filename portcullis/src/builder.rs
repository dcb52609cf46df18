//! Builder pattern for constructing Portcullis instances
//!
//! This module provides a type-safe builder for creating [`Portcullis`] instances with
//! compile-time validation of storage configuration.
//!
//! # Example
//!
//! ```rust,no_run
//! use portcullis::{PortcullisBuilder, ThrottleConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Build with SQLite and auto-migration
//!     let portcullis = PortcullisBuilder::new()
//!         .with_sqlite("sqlite::memory:")
//!         .await?
//!         .apply_migrations(true)
//!         .build()
//!         .await?;
//!
//!     // Or build without throttling and migrate manually
//!     let portcullis = PortcullisBuilder::new()
//!         .with_throttle_config(ThrottleConfig::disabled())
//!         .with_sqlite("sqlite::memory:")
//!         .await?
//!         .build()
//!         .await?;
//!     portcullis.migrate().await?;
//!
//!     Ok(())
//! }
//! ```

use std::sync::Arc;

use portcullis_core::{
    Clock, LoginConfig, PortcullisConfig, RepositoryProvider, ThrottleConfig,
    clock::system_clock,
};

use crate::Portcullis;

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur when building a Portcullis instance.
#[derive(Debug, thiserror::Error)]
pub enum PortcullisBuilderError {
    /// Failed to connect to storage backend
    #[error("Storage connection failed: {0}")]
    StorageConnection(String),

    /// Failed to run database migrations
    #[error("Migration failed: {0}")]
    Migration(String),

    /// Invalid configuration provided
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}

// ============================================================================
// Type-State Markers
// ============================================================================

/// Marker type indicating no storage has been configured yet.
///
/// This is the initial state of [`PortcullisBuilder`].
pub struct NoStorage;

/// Marker type indicating storage has been configured.
///
/// Contains the repository provider that will be used by Portcullis.
pub struct WithStorage<R: RepositoryProvider> {
    repositories: Arc<R>,
}

// ============================================================================
// Builder Implementation
// ============================================================================

/// A type-safe builder for constructing [`Portcullis`] instances.
///
/// The builder uses a type-state pattern to ensure that storage is configured
/// before building.
///
/// # Type States
///
/// - [`NoStorage`]: Initial state, storage must be configured
/// - [`WithStorage<R>`]: Storage configured, ready to build
///
/// The clock can only be replaced before storage is configured, because the
/// SQLite backend stamps attempt rows with it.
pub struct PortcullisBuilder<Storage> {
    storage: Storage,
    config: PortcullisConfig,
    clock: Arc<dyn Clock>,
    apply_migrations: bool,
}

impl Default for PortcullisBuilder<NoStorage> {
    fn default() -> Self {
        Self::new()
    }
}

impl PortcullisBuilder<NoStorage> {
    /// Create a new builder with default configuration.
    ///
    /// # Defaults
    ///
    /// - Throttle: enabled; users lock after 5 failures in 5 minutes, IPs
    ///   after 20 failures in 15 minutes
    /// - Sessions: 24 hours, remember-me tokens 30 days
    /// - Clock: system clock
    /// - Apply migrations: false
    pub fn new() -> Self {
        Self {
            storage: NoStorage,
            config: PortcullisConfig::default(),
            clock: system_clock(),
            apply_migrations: false,
        }
    }

    /// Replace the time source shared by the attempt log and the throttle.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Use a custom storage backend.
    ///
    /// The backend must stamp attempts with the same clock this builder holds.
    pub fn with_repositories<R: RepositoryProvider>(
        self,
        repositories: Arc<R>,
    ) -> PortcullisBuilder<WithStorage<R>> {
        PortcullisBuilder {
            storage: WithStorage { repositories },
            config: self.config,
            clock: self.clock,
            apply_migrations: self.apply_migrations,
        }
    }
}

// ============================================================================
// Storage Configuration Methods (NoStorage -> WithStorage)
// ============================================================================

#[cfg(feature = "sqlite")]
impl PortcullisBuilder<NoStorage> {
    /// Configure SQLite storage by connecting to the given URL.
    ///
    /// # Arguments
    ///
    /// * `url` - SQLite connection URL (e.g., "sqlite::memory:" or "sqlite://path/to/db.sqlite")
    pub async fn with_sqlite(
        self,
        url: &str,
    ) -> Result<
        PortcullisBuilder<WithStorage<crate::sqlite::SqliteRepositoryProvider>>,
        PortcullisBuilderError,
    > {
        let storage = crate::sqlite::SqliteStorage::connect(url)
            .await
            .map_err(|e| PortcullisBuilderError::StorageConnection(e.to_string()))?;

        let repositories = Arc::new(storage.into_repository_provider_with_clock(self.clock.clone()));

        Ok(self.with_repositories(repositories))
    }

    /// Configure SQLite storage with an existing connection pool.
    pub fn with_sqlite_pool(
        self,
        pool: sqlx::SqlitePool,
    ) -> PortcullisBuilder<WithStorage<crate::sqlite::SqliteRepositoryProvider>> {
        let repositories = Arc::new(crate::sqlite::SqliteRepositoryProvider::with_clock(
            pool,
            self.clock.clone(),
        ));

        self.with_repositories(repositories)
    }
}

// ============================================================================
// Configuration Methods
// ============================================================================

impl<Storage> PortcullisBuilder<Storage> {
    /// Replace the whole configuration, e.g. one loaded with [`crate::config::load`].
    pub fn with_config(mut self, config: PortcullisConfig) -> Self {
        self.config = config;
        self
    }

    /// Configure the lockout policies.
    pub fn with_throttle_config(mut self, config: ThrottleConfig) -> Self {
        self.config.throttle = config;
        self
    }

    /// Configure email verification, session and remember-me lifetimes.
    pub fn with_login_config(mut self, config: LoginConfig) -> Self {
        self.config.login = config;
        self
    }
}

impl<R: RepositoryProvider> PortcullisBuilder<WithStorage<R>> {
    /// Set whether to automatically apply database migrations during build.
    ///
    /// Default: false
    pub fn apply_migrations(mut self, apply: bool) -> Self {
        self.apply_migrations = apply;
        self
    }

    /// Build the Portcullis instance.
    ///
    /// Validates the configuration and, if `apply_migrations(true)` was
    /// called, migrates the storage before returning.
    pub async fn build(self) -> Result<Portcullis<R>, PortcullisBuilderError> {
        self.config
            .validate()
            .map_err(|e| PortcullisBuilderError::InvalidConfiguration(e.to_string()))?;

        if self.apply_migrations {
            self.storage
                .repositories
                .migrate()
                .await
                .map_err(|e| PortcullisBuilderError::Migration(e.to_string()))?;
        }

        Ok(Portcullis::with_config(
            self.storage.repositories,
            self.config,
            self.clock,
        ))
    }
}
