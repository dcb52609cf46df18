//! Repository traits for the data access layer
//!
//! Services reach storage only through these traits, so the throttle and the
//! login flow can run over SQLite in production and over in-memory mocks in
//! tests.
//!
//! # Trait Hierarchy
//!
//! - Individual `*Repository` traits define the operations for each data domain
//! - Individual `*RepositoryProvider` traits hand out each repository
//! - [`RepositoryProvider`] combines all provider traits plus lifecycle methods

pub mod adapter;
pub mod attempt;
pub mod password;
pub mod remember_token;
pub mod session;
pub mod user;

pub use adapter::{
    LoginAttemptRepositoryAdapter, PasswordRepositoryAdapter, RememberTokenRepositoryAdapter,
    SessionRepositoryAdapter, UserRepositoryAdapter,
};
pub use attempt::LoginAttemptRepository;
pub use password::PasswordRepository;
pub use remember_token::RememberTokenRepository;
pub use session::SessionRepository;
pub use user::UserRepository;

use async_trait::async_trait;

use crate::Error;

/// Provider trait for user repository access.
pub trait UserRepositoryProvider: Send + Sync + 'static {
    type UserRepo: UserRepository;

    fn user(&self) -> &Self::UserRepo;
}

/// Provider trait for session repository access.
pub trait SessionRepositoryProvider: Send + Sync + 'static {
    type SessionRepo: SessionRepository;

    fn session(&self) -> &Self::SessionRepo;
}

/// Provider trait for password repository access.
pub trait PasswordRepositoryProvider: Send + Sync + 'static {
    type PasswordRepo: PasswordRepository;

    fn password(&self) -> &Self::PasswordRepo;
}

/// Provider trait for the login attempt log.
pub trait LoginAttemptRepositoryProvider: Send + Sync + 'static {
    type LoginAttemptRepo: LoginAttemptRepository;

    fn login_attempt(&self) -> &Self::LoginAttemptRepo;
}

/// Provider trait for remember-me token storage.
pub trait RememberTokenRepositoryProvider: Send + Sync + 'static {
    type RememberTokenRepo: RememberTokenRepository;

    fn remember_token(&self) -> &Self::RememberTokenRepo;
}

/// Provider trait that storage implementations must implement to provide all repositories.
///
/// # Implementing a Custom Storage Backend
///
/// 1. Implement each individual `*Repository` trait for your backend
/// 2. Implement each individual `*RepositoryProvider` trait
/// 3. Implement the `RepositoryProvider` trait with `migrate()` and `health_check()`
///
/// ```rust,ignore
/// use portcullis_core::repositories::*;
///
/// struct MyStorage { /* ... */ }
///
/// impl LoginAttemptRepositoryProvider for MyStorage {
///     type LoginAttemptRepo = MyAttemptLog;
///     fn login_attempt(&self) -> &Self::LoginAttemptRepo { &self.attempts }
/// }
///
/// // ... implement other provider traits ...
///
/// #[async_trait]
/// impl RepositoryProvider for MyStorage {
///     async fn migrate(&self) -> Result<(), Error> { /* ... */ }
///     async fn health_check(&self) -> Result<(), Error> { /* ... */ }
/// }
/// ```
#[async_trait]
pub trait RepositoryProvider:
    UserRepositoryProvider
    + SessionRepositoryProvider
    + PasswordRepositoryProvider
    + LoginAttemptRepositoryProvider
    + RememberTokenRepositoryProvider
{
    /// Run migrations for all repositories
    async fn migrate(&self) -> Result<(), Error>;

    /// Health check for all repositories
    async fn health_check(&self) -> Result<(), Error>;
}
