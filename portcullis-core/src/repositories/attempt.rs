//! Repository trait for the login attempt log.
//!
//! The log is append-only. Lockout state is never stored; it is derived from
//! the failed rows on every check.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;

use crate::{
    Error,
    storage::{AttemptScope, LoginAttempt, NewLoginAttempt},
};

/// Storage for the login attempt log.
///
/// # Security Considerations
///
/// - Failures against unknown emails are recorded with no user ID so they
///   still count toward the IP scope.
/// - IP addresses and user agents stored here may be subject to data
///   retention regulations; see [`LoginAttemptRepository::prune_before`].
#[async_trait]
pub trait LoginAttemptRepository: Send + Sync + 'static {
    /// Append an attempt to the log.
    ///
    /// The implementation stamps the row with its own clock, which must be the
    /// same clock the throttle reads.
    async fn record(&self, attempt: NewLoginAttempt) -> Result<LoginAttempt, Error>;

    /// Timestamps of failed attempts in `scope`, newest first.
    ///
    /// Callers stop polling once they have seen enough, so implementations
    /// should produce rows lazily rather than loading the full history.
    fn recent_failures<'a>(
        &'a self,
        scope: &'a AttemptScope,
    ) -> BoxStream<'a, Result<DateTime<Utc>, Error>>;

    /// Delete every attempt recorded before `cutoff`.
    ///
    /// # Returns
    ///
    /// The number of records deleted.
    async fn prune_before(&self, cutoff: DateTime<Utc>) -> Result<u64, Error>;
}
