//! Throttle and login configuration
//!
//! All durations are configured in whole minutes (or hours/days where noted)
//! so the structs deserialize cleanly from TOML. Accessors return
//! [`chrono::Duration`].

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::{Error, error::ConfigError};

/// Lockout policy for one scope kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopePolicy {
    /// Failed attempts that make up one block
    pub threshold: u32,
    /// Lockout length for the first block
    pub base_duration_minutes: u32,
    /// Upper bound on the lockout length
    pub max_duration_minutes: u32,
    /// Span before the newest failure within which failures are counted
    pub window_minutes: u32,
}

impl ScopePolicy {
    /// 5 failures within 5 minutes lock the account for 5 minutes, doubling up to an hour.
    pub const fn user_default() -> Self {
        Self {
            threshold: 5,
            base_duration_minutes: 5,
            max_duration_minutes: 60,
            window_minutes: 5,
        }
    }

    /// 20 failures within 15 minutes block the address for 15 minutes, doubling up to 3 hours.
    pub const fn ip_default() -> Self {
        Self {
            threshold: 20,
            base_duration_minutes: 15,
            max_duration_minutes: 180,
            window_minutes: 15,
        }
    }

    pub fn base_duration(&self) -> Duration {
        Duration::minutes(i64::from(self.base_duration_minutes))
    }

    pub fn max_duration(&self) -> Duration {
        Duration::minutes(i64::from(self.max_duration_minutes))
    }

    pub fn window(&self) -> Duration {
        Duration::minutes(i64::from(self.window_minutes))
    }

    /// Lockout length for `blocks` full blocks of failures.
    ///
    /// `base * 2^(blocks - 1)`, capped at `max`. Zero blocks means no lockout.
    pub fn lockout_duration(&self, blocks: u32) -> Option<Duration> {
        if blocks == 0 {
            return None;
        }

        let multiplier = 1u64.checked_shl(blocks - 1).unwrap_or(u64::MAX);
        let minutes = u64::from(self.base_duration_minutes)
            .saturating_mul(multiplier)
            .min(u64::from(self.max_duration_minutes));

        Some(Duration::minutes(minutes as i64))
    }

    pub fn validate(&self, scope: &str) -> Result<(), ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidPolicy {
            scope: scope.to_string(),
            reason: reason.to_string(),
        };

        if self.threshold == 0 {
            return Err(invalid("threshold must be greater than zero"));
        }
        if self.window_minutes == 0 {
            return Err(invalid("window must be greater than zero"));
        }
        if self.base_duration_minutes == 0 {
            return Err(invalid("base duration must be greater than zero"));
        }
        if self.max_duration_minutes < self.base_duration_minutes {
            return Err(invalid("max duration must not be shorter than base duration"));
        }
        Ok(())
    }
}

/// Configuration for login throttling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThrottleConfig {
    /// When false, every lockout check reports unlocked
    pub enabled: bool,
    pub user: ScopePolicy,
    pub ip: ScopePolicy,
    /// Attempt rows older than this are pruned by the cleanup task
    pub retention_days: u32,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            user: ScopePolicy::user_default(),
            ip: ScopePolicy::ip_default(),
            retention_days: 7,
        }
    }
}

impl ThrottleConfig {
    /// Throttling switched off. Attempts are still recorded.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    pub fn retention_period(&self) -> Duration {
        Duration::days(i64::from(self.retention_days))
    }

    pub fn validate(&self) -> Result<(), Error> {
        self.user.validate("user")?;
        self.ip.validate("ip")?;

        // Pruning inside a window would shorten live lockouts
        let longest_window = self.user.window().max(self.ip.window());
        if self.retention_period() <= longest_window {
            return Err(ConfigError::InvalidPolicy {
                scope: "retention".to_string(),
                reason: "retention period must exceed every lockout window".to_string(),
            }
            .into());
        }
        Ok(())
    }
}

/// Configuration for the login flow around the throttle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoginConfig {
    /// Refuse sign-in until the email address is verified
    pub require_verified_email: bool,
    pub session_ttl_hours: u32,
    /// Lifetime of a remember-me token, refreshed on every use
    pub remember_for_days: u32,
    /// Deactivate accounts still unverified this long after registering.
    /// `0` keeps them forever.
    pub unverified_grace_hours: u32,
    /// Permanently remove soft-deleted accounts after this many days.
    /// `0` keeps them forever.
    pub purge_deleted_after_days: u32,
}

impl Default for LoginConfig {
    fn default() -> Self {
        Self {
            require_verified_email: true,
            session_ttl_hours: 24,
            remember_for_days: 30,
            unverified_grace_hours: 24,
            purge_deleted_after_days: 7,
        }
    }
}

impl LoginConfig {
    pub fn session_ttl(&self) -> Duration {
        Duration::hours(i64::from(self.session_ttl_hours))
    }

    pub fn remember_for(&self) -> Duration {
        Duration::days(i64::from(self.remember_for_days))
    }

    pub fn unverified_grace(&self) -> Option<Duration> {
        (self.unverified_grace_hours > 0)
            .then(|| Duration::hours(i64::from(self.unverified_grace_hours)))
    }

    pub fn purge_deleted_after(&self) -> Option<Duration> {
        (self.purge_deleted_after_days > 0)
            .then(|| Duration::days(i64::from(self.purge_deleted_after_days)))
    }
}

/// Top-level configuration, as loaded from a config file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortcullisConfig {
    pub throttle: ThrottleConfig,
    pub login: LoginConfig,
}

impl PortcullisConfig {
    pub fn validate(&self) -> Result<(), Error> {
        self.throttle.validate()
    }
}
