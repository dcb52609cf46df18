//! Core functionality for portcullis
//!
//! Portcullis throttles password logins. Every attempt is appended to a log,
//! and lockouts for a user or a client IP address are derived from that log
//! on each check, growing exponentially while failures keep coming.
//!
//! This crate holds the storage-agnostic parts:
//!
//! - [`repositories`]: the traits a storage backend implements
//! - [`services`]: the throttle, the login flow and the user, password,
//!   session and remember-token services they build on
//! - [`config`]: lockout policies and login settings
//! - [`clock`]: the time source shared by the attempt log and the throttle
//!
//! Applications normally use the `portcullis` crate, which wires these
//! services to a storage backend.
pub mod clock;
pub mod config;
pub mod crypto;
pub mod error;
pub mod id;
pub mod repositories;
pub mod services;
pub mod session;
pub mod storage;
pub mod user;
pub mod validation;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{LoginConfig, PortcullisConfig, ScopePolicy, ThrottleConfig};
pub use error::Error;
pub use repositories::RepositoryProvider;
pub use session::{RememberToken, Session, SessionToken};
pub use storage::{
    AttemptScope, FailureReason, LockoutScope, LockoutStatus, LoginAttempt, NewLoginAttempt,
};
pub use user::{User, UserId};
