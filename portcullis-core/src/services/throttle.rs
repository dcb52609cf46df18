//! Login throttling derived from the attempt log.
//!
//! Lockout is never stored. Every check re-reads the failed attempts of a
//! scope (a user ID or a client IP address) newest first and derives the
//! lockout end from them:
//!
//! 1. Count the failures within `window` of the newest one, the boundary
//!    included. Reading stops at the first failure outside the window.
//! 2. Every full `threshold` of counted failures is one block.
//! 3. The lockout lasts `base * 2^(blocks - 1)`, capped at `max`, measured
//!    from the newest failure.
//!
//! # Example
//!
//! ```rust,ignore
//! use portcullis_core::services::ThrottleService;
//!
//! let throttle = ThrottleService::new(attempts, ThrottleConfig::default(), clock);
//!
//! if let Some(lockout) = throttle.check_login(user_id.as_ref(), "192.0.2.7").await? {
//!     println!("locked for {} more minutes", lockout.minutes_remaining);
//! }
//! ```

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::TryStreamExt;

use crate::{
    Error, UserId,
    clock::Clock,
    config::{ScopePolicy, ThrottleConfig},
    repositories::LoginAttemptRepository,
    storage::{AttemptScope, LockoutScope, LockoutStatus},
};

/// How often the cleanup task prunes the attempt log
const CLEANUP_INTERVAL: std::time::Duration = std::time::Duration::from_secs(3600);

/// Service computing lockouts for users and IP addresses.
///
/// # Concurrency
///
/// The check and the write that follows it are not atomic. Two submissions
/// racing against the same scope can both pass the check before either
/// failure is recorded, so a scope may see one attempt beyond its threshold
/// before the lockout applies. This is a soft bound, not a hard guarantee.
pub struct ThrottleService<A: LoginAttemptRepository> {
    attempts: Arc<A>,
    config: ThrottleConfig,
    clock: Arc<dyn Clock>,
}

impl<A: LoginAttemptRepository> ThrottleService<A> {
    /// `clock` must be the clock the attempt log stamps rows with.
    pub fn new(attempts: Arc<A>, config: ThrottleConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            attempts,
            config,
            clock,
        }
    }

    pub fn config(&self) -> &ThrottleConfig {
        &self.config
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    fn policy(&self, scope: LockoutScope) -> &ScopePolicy {
        match scope {
            LockoutScope::User => &self.config.user,
            LockoutScope::Ip => &self.config.ip,
        }
    }

    /// When the lockout of `scope` ends, or `None` if its failures do not add
    /// up to a single block.
    ///
    /// The result may lie in the past; [`ThrottleService::is_locked`] compares
    /// it against the clock.
    pub async fn calculate_lockout_end(
        &self,
        scope: &AttemptScope,
    ) -> Result<Option<DateTime<Utc>>, Error> {
        let policy = self.policy(scope.kind());
        let window = policy.window();

        let mut failures = self.attempts.recent_failures(scope);
        let Some(newest) = failures.try_next().await? else {
            return Ok(None);
        };

        let mut count: u32 = 1;
        while let Some(attempted_at) = failures.try_next().await? {
            if newest - attempted_at > window {
                break;
            }
            count = count.saturating_add(1);
        }

        let blocks = count / policy.threshold;
        Ok(policy.lockout_duration(blocks).map(|duration| newest + duration))
    }

    /// Lockout state of `scope` right now.
    pub async fn is_locked(&self, scope: &AttemptScope) -> Result<LockoutStatus, Error> {
        if !self.config.enabled {
            return Ok(LockoutStatus::unlocked(scope.kind()));
        }

        let locked_until = self.calculate_lockout_end(scope).await?;
        Ok(LockoutStatus::at(scope.kind(), locked_until, self.clock.now()))
    }

    /// Combined check run before a login attempt.
    ///
    /// The user scope is only evaluated when the user is known. If both scopes
    /// are locked the one that unlocks later wins; a tie reports the user.
    pub async fn check_login(
        &self,
        user_id: Option<&UserId>,
        ip_address: &str,
    ) -> Result<Option<LockoutStatus>, Error> {
        if !self.config.enabled {
            return Ok(None);
        }

        let user = match user_id {
            Some(user_id) => Some(self.is_locked(&AttemptScope::User(user_id.clone())).await?),
            None => None,
        };
        let ip = self
            .is_locked(&AttemptScope::Ip(ip_address.to_string()))
            .await?;

        let lockout = [user, Some(ip)]
            .into_iter()
            .flatten()
            .filter(|status| status.is_locked)
            .reduce(|longest, status| {
                if status.locked_until > longest.locked_until {
                    status
                } else {
                    longest
                }
            });

        Ok(lockout)
    }

    /// Delete attempts older than the retention period. Returns the number of
    /// rows removed.
    pub async fn prune_now(&self) -> Result<u64, Error> {
        let cutoff = self.clock.now() - self.config.retention_period();
        self.attempts.prune_before(cutoff).await
    }

    /// Start the background retention task.
    ///
    /// Prunes the attempt log hourly until `shutdown` changes.
    pub fn start_cleanup_task(
        &self,
        mut shutdown: tokio::sync::watch::Receiver<bool>,
    ) -> tokio::task::JoinHandle<()> {
        let attempts = Arc::clone(&self.attempts);
        let clock = Arc::clone(&self.clock);
        let retention = self.config.retention_period();

        tokio::spawn(async move {
            let mut interval_timer = tokio::time::interval(CLEANUP_INTERVAL);

            loop {
                tokio::select! {
                    _ = interval_timer.tick() => {
                        let cutoff = clock.now() - retention;
                        match attempts.prune_before(cutoff).await {
                            Ok(count) if count > 0 => {
                                tracing::info!(count, "Pruned old login attempt records");
                            }
                            Err(e) => {
                                tracing::warn!(error = %e, "Failed to prune login attempt records");
                            }
                            _ => {}
                        }
                    }
                    _ = shutdown.changed() => {
                        tracing::info!("Shutting down login attempt cleanup task");
                        break;
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        clock::ManualClock,
        services::mock::MockAttemptLog,
        storage::{FailureReason, NewLoginAttempt, UNKNOWN},
    };
    use chrono::Duration;
    use std::sync::atomic::Ordering;

    const START: i64 = 1_700_000_000;
    const IP: &str = "192.0.2.7";

    struct Fixture {
        clock: Arc<ManualClock>,
        log: Arc<MockAttemptLog>,
        service: ThrottleService<MockAttemptLog>,
    }

    fn fixture(config: ThrottleConfig) -> Fixture {
        let clock = Arc::new(ManualClock::at_timestamp(START));
        let log = Arc::new(MockAttemptLog::new(clock.clone()));
        let service = ThrottleService::new(log.clone(), config, clock.clone());
        Fixture {
            clock,
            log,
            service,
        }
    }

    fn at_minute(minute: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(START + minute * 60, 0).unwrap()
    }

    impl Fixture {
        /// Record a failure for `user` (and the shared IP) at `minute` past the start.
        async fn fail_at(&self, user: Option<&UserId>, ip: &str, minute: i64) {
            self.clock.set(at_minute(minute));
            self.log
                .record(NewLoginAttempt::failed(
                    user.cloned(),
                    ip,
                    UNKNOWN,
                    FailureReason::Incorrect,
                ))
                .await
                .unwrap();
        }

        async fn user_lockout_end(&self, user: &UserId) -> Option<DateTime<Utc>> {
            self.service
                .calculate_lockout_end(&AttemptScope::User(user.clone()))
                .await
                .unwrap()
        }
    }

    #[tokio::test]
    async fn test_no_failures_is_not_locked() {
        let f = fixture(ThrottleConfig::default());
        let user = UserId::new("usr_1");

        assert_eq!(f.user_lockout_end(&user).await, None);
        assert!(f.service.check_login(Some(&user), IP).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_below_threshold_is_not_locked() {
        let f = fixture(ThrottleConfig::default());
        let user = UserId::new("usr_1");

        for minute in 0..4 {
            f.fail_at(Some(&user), IP, minute).await;
        }

        assert_eq!(f.user_lockout_end(&user).await, None);
    }

    #[tokio::test]
    async fn test_threshold_failures_lock_for_base_duration() {
        // Five failures at t=0..4 lock the user until t=4+5
        let f = fixture(ThrottleConfig::default());
        let user = UserId::new("usr_1");

        for minute in 0..5 {
            f.fail_at(Some(&user), IP, minute).await;
        }

        assert_eq!(f.user_lockout_end(&user).await, Some(at_minute(9)));

        f.clock.set(at_minute(8));
        let status = f
            .service
            .is_locked(&AttemptScope::User(user.clone()))
            .await
            .unwrap();
        assert!(status.is_locked);
        assert_eq!(status.scope, LockoutScope::User);
        assert_eq!(status.seconds_remaining, 60);
        assert_eq!(status.minutes_remaining, 1);

        f.clock.set(at_minute(9));
        let status = f
            .service
            .is_locked(&AttemptScope::User(user))
            .await
            .unwrap();
        assert!(!status.is_locked);
        assert_eq!(status.minutes_remaining, 0);
    }

    #[tokio::test]
    async fn test_two_blocks_double_the_lockout() {
        // Five more failures while locked make ten within one window
        let f = fixture(ThrottleConfig::default());
        let user = UserId::new("usr_1");

        for minute in 0..5 {
            f.fail_at(Some(&user), IP, minute).await;
        }
        assert_eq!(f.user_lockout_end(&user).await, Some(at_minute(9)));

        for step in 1..=5 {
            f.clock.set(at_minute(4) + Duration::seconds(step * 10));
            f.log
                .record(NewLoginAttempt::failed(
                    Some(user.clone()),
                    IP,
                    UNKNOWN,
                    FailureReason::Incorrect,
                ))
                .await
                .unwrap();
        }

        let newest = at_minute(4) + Duration::seconds(50);
        assert_eq!(
            f.user_lockout_end(&user).await,
            Some(newest + Duration::minutes(10))
        );
    }

    #[tokio::test]
    async fn test_lockout_is_capped_at_max_duration() {
        let f = fixture(ThrottleConfig::default());
        let user = UserId::new("usr_1");

        // 40 failures within a minute: 8 blocks, 5 * 2^7 minutes capped at 60
        for second in 0..40 {
            f.clock.set(at_minute(0) + Duration::seconds(second));
            f.log
                .record(NewLoginAttempt::failed(
                    Some(user.clone()),
                    IP,
                    UNKNOWN,
                    FailureReason::Incorrect,
                ))
                .await
                .unwrap();
        }

        let newest = at_minute(0) + Duration::seconds(39);
        assert_eq!(f.user_lockout_end(&user).await, Some(newest + Duration::minutes(60)));
    }

    #[tokio::test]
    async fn test_window_boundary_is_inclusive() {
        let f = fixture(ThrottleConfig::default());
        let user = UserId::new("usr_1");

        // Oldest failure exactly one window before the newest
        for minute in [0, 2, 3, 4, 5] {
            f.fail_at(Some(&user), IP, minute).await;
        }
        assert_eq!(f.user_lockout_end(&user).await, Some(at_minute(10)));
    }

    #[tokio::test]
    async fn test_failures_outside_window_are_not_counted() {
        let f = fixture(ThrottleConfig::default());
        let user = UserId::new("usr_1");

        // Oldest failure one second beyond the window
        f.clock.set(at_minute(0) - Duration::seconds(1));
        f.log
            .record(NewLoginAttempt::failed(
                Some(user.clone()),
                IP,
                UNKNOWN,
                FailureReason::Incorrect,
            ))
            .await
            .unwrap();
        for minute in [2, 3, 4, 5] {
            f.fail_at(Some(&user), IP, minute).await;
        }

        assert_eq!(f.user_lockout_end(&user).await, None);
    }

    #[tokio::test]
    async fn test_stops_reading_at_first_failure_outside_window() {
        let f = fixture(ThrottleConfig::default());
        let user = UserId::new("usr_1");

        for minute in 0..20 {
            f.fail_at(Some(&user), IP, minute).await;
        }
        f.log.rows_read.store(0, Ordering::SeqCst);

        // Newest at 19; rows 19 down to 13 are read, 13 being the first outside
        f.user_lockout_end(&user).await;
        assert_eq!(f.log.rows_read.load(Ordering::SeqCst), 7);
    }

    #[tokio::test]
    async fn test_reevaluation_is_idempotent() {
        let f = fixture(ThrottleConfig::default());
        let user = UserId::new("usr_1");

        for minute in 0..5 {
            f.fail_at(Some(&user), IP, minute).await;
        }

        let first = f.user_lockout_end(&user).await;
        let second = f.user_lockout_end(&user).await;
        assert_eq!(first, second);
        assert_eq!(f.log.len(), 5);
    }

    #[tokio::test]
    async fn test_successful_attempts_are_ignored() {
        let f = fixture(ThrottleConfig::default());
        let user = UserId::new("usr_1");

        for minute in 0..4 {
            f.fail_at(Some(&user), IP, minute).await;
        }
        f.log
            .record(NewLoginAttempt::succeeded(user.clone(), IP, UNKNOWN))
            .await
            .unwrap();

        assert_eq!(f.user_lockout_end(&user).await, None);
    }

    #[tokio::test]
    async fn test_ip_lockout_reported_when_user_unlocked() {
        let f = fixture(ThrottleConfig::default());
        let user = UserId::new("usr_1");

        // 20 anonymous failures from one address within 15 minutes
        for i in 0..20 {
            f.clock.set(at_minute(0) + Duration::seconds(i * 40));
            f.log
                .record(NewLoginAttempt::failed(None, IP, UNKNOWN, FailureReason::Incorrect))
                .await
                .unwrap();
        }

        let lockout = f
            .service
            .check_login(Some(&user), IP)
            .await
            .unwrap()
            .expect("ip should be locked");
        assert_eq!(lockout.scope, LockoutScope::Ip);
        assert_eq!(
            lockout.locked_until,
            Some(at_minute(0) + Duration::seconds(19 * 40) + Duration::minutes(15))
        );

        // A different address is unaffected
        assert!(
            f.service
                .check_login(Some(&user), "198.51.100.1")
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_combined_check_returns_later_unlock() {
        let config = ThrottleConfig {
            ip: ScopePolicy {
                threshold: 5,
                base_duration_minutes: 30,
                max_duration_minutes: 60,
                window_minutes: 5,
            },
            ..ThrottleConfig::default()
        };
        let f = fixture(config);
        let user = UserId::new("usr_1");

        for minute in 0..5 {
            f.fail_at(Some(&user), IP, minute).await;
        }

        // Both scopes locked; the IP lockout runs longer
        let lockout = f.service.check_login(Some(&user), IP).await.unwrap().unwrap();
        assert_eq!(lockout.scope, LockoutScope::Ip);
        assert_eq!(lockout.locked_until, Some(at_minute(34)));
    }

    #[tokio::test]
    async fn test_combined_check_tie_prefers_user() {
        let config = ThrottleConfig {
            ip: ScopePolicy::user_default(),
            ..ThrottleConfig::default()
        };
        let f = fixture(config);
        let user = UserId::new("usr_1");

        for minute in 0..5 {
            f.fail_at(Some(&user), IP, minute).await;
        }

        let lockout = f.service.check_login(Some(&user), IP).await.unwrap().unwrap();
        assert_eq!(lockout.scope, LockoutScope::User);
    }

    #[tokio::test]
    async fn test_unknown_user_checks_ip_only() {
        let f = fixture(ThrottleConfig::default());
        let user = UserId::new("usr_1");

        for minute in 0..5 {
            f.fail_at(Some(&user), IP, minute).await;
        }

        assert!(f.service.check_login(None, IP).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_recorded_failure_is_newest() {
        let f = fixture(ThrottleConfig::default());
        let user = UserId::new("usr_1");

        f.fail_at(Some(&user), IP, 0).await;
        f.fail_at(Some(&user), IP, 3).await;

        let scope = AttemptScope::User(user);
        let newest = f
            .log
            .recent_failures(&scope)
            .try_next()
            .await
            .unwrap();
        assert_eq!(newest, Some(at_minute(3)));
    }

    #[tokio::test]
    async fn test_disabled_throttle_never_locks() {
        let f = fixture(ThrottleConfig::disabled());
        let user = UserId::new("usr_1");

        for minute in 0..10 {
            f.fail_at(Some(&user), IP, minute).await;
        }

        assert!(!f.service.is_enabled());
        assert!(f.service.check_login(Some(&user), IP).await.unwrap().is_none());
        let status = f
            .service
            .is_locked(&AttemptScope::User(user))
            .await
            .unwrap();
        assert!(!status.is_locked);
    }

    #[tokio::test]
    async fn test_storage_error_propagates() {
        let f = fixture(ThrottleConfig::default());
        f.log.fail_reads.store(true, Ordering::SeqCst);

        let result = f.service.check_login(None, IP).await;
        assert!(result.unwrap_err().is_storage_error());
    }

    #[tokio::test]
    async fn test_prune_now_respects_retention() {
        let f = fixture(ThrottleConfig::default());
        let user = UserId::new("usr_1");

        f.fail_at(Some(&user), IP, 0).await;
        f.clock.advance(Duration::days(8));
        f.log
            .record(NewLoginAttempt::failed(None, IP, UNKNOWN, FailureReason::Incorrect))
            .await
            .unwrap();

        assert_eq!(f.service.prune_now().await.unwrap(), 1);
        assert_eq!(f.log.len(), 1);
        assert_eq!(f.service.prune_now().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_cleanup_task_stops_on_shutdown() {
        let f = fixture(ThrottleConfig::default());
        let (tx, rx) = tokio::sync::watch::channel(false);

        let handle = f.service.start_cleanup_task(rx);
        tx.send(true).unwrap();

        tokio::time::timeout(std::time::Duration::from_secs(5), handle)
            .await
            .expect("cleanup task should stop")
            .unwrap();
    }
}
