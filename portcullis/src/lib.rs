//! # Portcullis
//!
//! Portcullis throttles password logins. Every attempt is appended to a log,
//! and lockouts are derived from that log on each check: once a user or a
//! client IP address collects enough failures inside a sliding window it is
//! locked out, and every further block of failures doubles the lockout up to
//! a cap.
//!
//! What you get:
//! - Per-user and per-IP lockouts with exponential backoff
//! - A login flow that validates input, checks the throttle, verifies the
//!   password and account state, and issues a session
//! - Remember-me tokens with a sliding expiry
//! - A retention task that prunes old attempts
//! - Account cleanup that deactivates long-unverified users and purges
//!   deleted ones
//!
//! ## Storage Support
//!
//! - SQLite (the `sqlite` feature, on by default)
//!
//! Other backends implement [`RepositoryProvider`].
//!
//! ## Example
//!
//! ```rust,no_run
//! use portcullis::{LoginRequest, PortcullisBuilder};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let portcullis = PortcullisBuilder::new()
//!         .with_sqlite("sqlite::memory:")
//!         .await?
//!         .apply_migrations(true)
//!         .build()
//!         .await?;
//!
//!     let outcome = portcullis
//!         .login(LoginRequest::new("user@example.com", "Password123").ip_address("192.0.2.7"))
//!         .await;
//!     println!("{}", outcome.message());
//!     Ok(())
//! }
//! ```
pub mod builder;
pub mod config;

use std::sync::Arc;

use portcullis_core::{
    clock::system_clock,
    repositories::{
        LoginAttemptRepositoryAdapter, PasswordRepositoryAdapter, RememberTokenRepositoryAdapter,
        SessionRepositoryAdapter, UserRepositoryAdapter,
    },
    services::{
        LoginService, PasswordService, RememberTokenService, SessionService, ThrottleService,
        UserService,
    },
};
use secrecy::SecretString;

pub use builder::{NoStorage, PortcullisBuilder, PortcullisBuilderError, WithStorage};

/// Re-export core types from portcullis_core
///
/// These types are commonly used when working with the Portcullis API.
pub use portcullis_core::{
    AttemptScope, Clock, LockoutScope, LockoutStatus, LoginConfig, ManualClock, PortcullisConfig,
    RememberToken, RepositoryProvider, ScopePolicy, Session, SessionToken, SystemClock,
    ThrottleConfig, User, UserId,
    services::{LoginMessage, LoginOutcome, LoginRejection, LoginRequest, LoginSuccess},
};

/// Re-export storage backends
///
/// These storage implementations are available when the corresponding feature is enabled.
#[cfg(feature = "sqlite")]
pub mod sqlite {
    pub use portcullis_storage_sqlite::{SqliteRepositoryProvider, SqliteStorage};
}

#[cfg(feature = "sqlite")]
pub use sqlite::{SqliteRepositoryProvider, SqliteStorage};

/// Errors that can occur when using Portcullis.
#[derive(Debug, thiserror::Error)]
pub enum PortcullisError {
    /// Error during authentication
    #[error("Auth error: {0}")]
    AuthError(String),
    /// Error when interacting with storage
    #[error("Storage error: {0}")]
    StorageError(String),
    /// Input that failed validation
    #[error("Validation error: {0}")]
    ValidationError(String),
    /// Invalid or unreadable configuration
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// What one [`Portcullis::prune_accounts`] pass changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AccountCleanup {
    /// Unverified accounts past their grace period that were deactivated
    pub deactivated: u64,
    /// Soft-deleted accounts removed for good
    pub purged: u64,
}

impl From<portcullis_core::Error> for PortcullisError {
    fn from(error: portcullis_core::Error) -> Self {
        use portcullis_core::Error;

        match error {
            Error::Auth(e) => PortcullisError::AuthError(e.to_string()),
            Error::Storage(e) => PortcullisError::StorageError(e.to_string()),
            Error::Validation(e) => PortcullisError::ValidationError(e.to_string()),
            Error::Config(e) => PortcullisError::ConfigError(e.to_string()),
        }
    }
}

type Users<R> = UserRepositoryAdapter<R>;
type Passwords<R> = PasswordRepositoryAdapter<R>;
type Attempts<R> = LoginAttemptRepositoryAdapter<R>;
type Sessions<R> = SessionRepositoryAdapter<R>;
type RememberTokens<R> = RememberTokenRepositoryAdapter<R>;

/// The login throttle wired to a storage backend.
///
/// `Portcullis` owns the services and hands out the operations an application
/// needs around a login form: registering users, processing submissions,
/// reporting lockouts and managing sessions.
///
/// # Example
///
/// ```rust,no_run
/// use portcullis::{Portcullis, SqliteRepositoryProvider};
/// use std::sync::Arc;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let pool = sqlx::SqlitePool::connect("sqlite::memory:").await?;
///     let repositories = Arc::new(SqliteRepositoryProvider::new(pool));
///
///     let portcullis = Portcullis::new(repositories);
///     portcullis.migrate().await?;
///
///     let status = portcullis.lockout_status("user@example.com", "192.0.2.7").await?;
///     println!("{status:?}");
///     Ok(())
/// }
/// ```
pub struct Portcullis<R: RepositoryProvider> {
    repositories: Arc<R>,
    config: PortcullisConfig,
    clock: Arc<dyn Clock>,
    user_service: Arc<UserService<Users<R>>>,
    password_service: Arc<PasswordService<Passwords<R>>>,
    session_service: Arc<SessionService<Sessions<R>>>,
    throttle_service: Arc<ThrottleService<Attempts<R>>>,
    login_service: LoginService<Users<R>, Passwords<R>, Attempts<R>, Sessions<R>, RememberTokens<R>>,
}

impl<R: RepositoryProvider> Portcullis<R> {
    /// Create a Portcullis instance with the default configuration and the
    /// system clock.
    pub fn new(repositories: Arc<R>) -> Self {
        Self::with_config(repositories, PortcullisConfig::default(), system_clock())
    }

    /// Create a Portcullis instance from explicit parts.
    ///
    /// `clock` must be the clock the storage backend stamps attempts with.
    /// The configuration is used as given; [`PortcullisBuilder`] validates it
    /// first.
    pub fn with_config(
        repositories: Arc<R>,
        config: PortcullisConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let user_repo = Arc::new(UserRepositoryAdapter::new(repositories.clone()));
        let attempt_repo = Arc::new(LoginAttemptRepositoryAdapter::new(repositories.clone()));

        let user_service = Arc::new(UserService::new(user_repo.clone()));
        let password_service = Arc::new(PasswordService::new(Arc::new(
            PasswordRepositoryAdapter::new(repositories.clone()),
        )));
        let session_service = Arc::new(SessionService::new(
            Arc::new(SessionRepositoryAdapter::new(repositories.clone())),
            clock.clone(),
            config.login.session_ttl(),
        ));
        let throttle_service = Arc::new(ThrottleService::new(
            attempt_repo.clone(),
            config.throttle.clone(),
            clock.clone(),
        ));
        let remember_service = Arc::new(RememberTokenService::new(
            Arc::new(RememberTokenRepositoryAdapter::new(repositories.clone())),
            user_repo,
            clock.clone(),
            config.login.remember_for(),
        ));

        let login_service = LoginService::new(
            user_service.clone(),
            password_service.clone(),
            attempt_repo,
            throttle_service.clone(),
            session_service.clone(),
            remember_service,
            config.login.clone(),
        );

        Self {
            repositories,
            config,
            clock,
            user_service,
            password_service,
            session_service,
            throttle_service,
            login_service,
        }
    }

    pub fn config(&self) -> &PortcullisConfig {
        &self.config
    }

    /// Run migrations for all repositories
    pub async fn migrate(&self) -> Result<(), PortcullisError> {
        self.repositories
            .migrate()
            .await
            .map_err(|e| PortcullisError::StorageError(e.to_string()))
    }

    /// Health check for all repositories
    pub async fn health_check(&self) -> Result<(), PortcullisError> {
        self.repositories
            .health_check()
            .await
            .map_err(|e| PortcullisError::StorageError(e.to_string()))
    }

    /// Process a login submission.
    ///
    /// This never fails: infrastructure problems surface as
    /// [`LoginMessage::ServiceUnavailable`].
    pub async fn login(&self, request: LoginRequest) -> LoginOutcome {
        self.login_service.login(request).await
    }

    /// The lockout that would block `email` from `ip_address` right now, if any.
    pub async fn lockout_status(
        &self,
        email: &str,
        ip_address: &str,
    ) -> Result<Option<LockoutStatus>, PortcullisError> {
        Ok(self.login_service.lockout_status(email, ip_address).await?)
    }

    /// Lockout state of a single user or IP address.
    pub async fn is_locked(&self, scope: &AttemptScope) -> Result<LockoutStatus, PortcullisError> {
        Ok(self.throttle_service.is_locked(scope).await?)
    }

    /// Sign in with a remember-me token.
    ///
    /// # Returns
    ///
    /// `None` if the token is unknown, expired, or belongs to a user who can no
    /// longer sign in.
    pub async fn resume(
        &self,
        token: &RememberToken,
        ip_address: &str,
        user_agent: &str,
    ) -> Result<Option<LoginSuccess>, PortcullisError> {
        Ok(self
            .login_service
            .resume(token, ip_address, user_agent)
            .await?)
    }

    /// Get a session by its token, ignoring expired sessions
    pub async fn get_session(
        &self,
        token: &SessionToken,
    ) -> Result<Option<Session>, PortcullisError> {
        Ok(self.session_service.get_session(token).await?)
    }

    /// End a session and forget the user's remember-me token
    pub async fn logout(&self, token: &SessionToken) -> Result<(), PortcullisError> {
        Ok(self.login_service.logout(token).await?)
    }

    /// Delete expired sessions, returning how many were removed
    pub async fn cleanup_expired_sessions(&self) -> Result<u64, PortcullisError> {
        Ok(self.session_service.cleanup_expired_sessions().await?)
    }

    /// Delete login attempts older than the retention period
    pub async fn prune_attempts(&self) -> Result<u64, PortcullisError> {
        Ok(self.throttle_service.prune_now().await?)
    }

    /// Deactivate accounts left unverified past
    /// [`LoginConfig::unverified_grace_hours`], then purge accounts deleted more
    /// than [`LoginConfig::purge_deleted_after_days`] ago.
    ///
    /// Deactivated accounts are soft-deleted too, so they are purged once the
    /// purge period has passed.
    pub async fn prune_accounts(&self) -> Result<AccountCleanup, PortcullisError> {
        let now = self.clock.now();
        let mut cleanup = AccountCleanup::default();

        if let Some(grace) = self.config.login.unverified_grace() {
            cleanup.deactivated = self.user_service.deactivate_unverified(now - grace).await?;
        }
        if let Some(after) = self.config.login.purge_deleted_after() {
            cleanup.purged = self.user_service.purge_deleted(now - after).await?;
        }

        Ok(cleanup)
    }

    /// Start the hourly attempt retention task.
    ///
    /// The task stops when `shutdown` changes.
    pub fn start_cleanup_task(
        &self,
        shutdown: tokio::sync::watch::Receiver<bool>,
    ) -> tokio::task::JoinHandle<()> {
        self.throttle_service.start_cleanup_task(shutdown)
    }
}

/// User management
impl<R: RepositoryProvider> Portcullis<R> {
    /// Register a user with a password
    ///
    /// The password is checked against the strength policy before the user is
    /// created. New users still need their email verified before they can sign
    /// in unless [`LoginConfig::require_verified_email`] is off.
    pub async fn register_user_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<User, PortcullisError> {
        self.password_service
            .policy()
            .validate(password)
            .map_err(portcullis_core::Error::from)?;

        let user = self.user_service.create_user(email, None).await?;
        self.password_service.set_password(&user.id, password).await?;

        tracing::info!(user_id = %user.id, "Registered user");
        Ok(user)
    }

    /// Get a user by their ID
    pub async fn get_user(&self, user_id: &UserId) -> Result<Option<User>, PortcullisError> {
        Ok(self.user_service.get_user(user_id).await?)
    }

    /// Get a user by email, including deactivated and deleted users
    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, PortcullisError> {
        Ok(self.user_service.get_user_by_email(email.trim()).await?)
    }

    /// Mark a user's email as verified
    pub async fn set_user_email_verified(&self, user_id: &UserId) -> Result<(), PortcullisError> {
        Ok(self.user_service.mark_email_verified(user_id).await?)
    }

    /// Block a user from signing in and end their sessions
    pub async fn deactivate_user(&self, user_id: &UserId) -> Result<(), PortcullisError> {
        self.user_service.deactivate(user_id).await?;
        self.session_service.delete_user_sessions(user_id).await?;
        Ok(())
    }

    pub async fn reactivate_user(&self, user_id: &UserId) -> Result<(), PortcullisError> {
        Ok(self.user_service.reactivate(user_id).await?)
    }

    /// Soft-delete a user and end their sessions
    ///
    /// The user row stays behind so the attempt log keeps resolving it.
    pub async fn delete_user(&self, user_id: &UserId) -> Result<(), PortcullisError> {
        self.user_service.delete_user(user_id).await?;
        self.session_service.delete_user_sessions(user_id).await?;
        Ok(())
    }

    /// Change a user's password and invalidate all existing sessions for the user.
    pub async fn change_user_password(
        &self,
        user_id: &UserId,
        old_password: &SecretString,
        new_password: &str,
    ) -> Result<(), PortcullisError> {
        self.password_service
            .change_password(user_id, old_password, new_password)
            .await?;

        // Remove all existing sessions for the user.
        self.session_service.delete_user_sessions(user_id).await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use portcullis_core::error::{AuthError, StorageError, ValidationError};

    #[test]
    fn test_core_errors_map_by_kind() {
        let error: PortcullisError = portcullis_core::Error::from(AuthError::UserAlreadyExists).into();
        assert!(matches!(error, PortcullisError::AuthError(_)));

        let error: PortcullisError = portcullis_core::Error::from(StorageError::NotFound).into();
        assert!(matches!(error, PortcullisError::StorageError(_)));

        let error: PortcullisError =
            portcullis_core::Error::from(ValidationError::InvalidEmail("x".to_string())).into();
        assert_eq!(error.to_string(), "Validation error: Invalid email format: x");
    }
}
