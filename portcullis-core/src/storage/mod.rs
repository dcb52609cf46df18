//! Records exchanged with the storage layer
//!
//! These types are shared by the repository traits and the services built on
//! top of them. Backends convert their row types into these.

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    Error, UserId,
    error::{ValidationError, utilities::RequiredFieldExt},
};

/// Placeholder stored when the client address or user agent is not known.
pub const UNKNOWN: &str = "unknown";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewUser {
    pub id: UserId,
    pub email: String,
    pub name: Option<String>,
    pub email_verified_at: Option<DateTime<Utc>>,
}

impl NewUser {
    pub fn builder() -> NewUserBuilder {
        NewUserBuilder::default()
    }

    pub fn new(email: String) -> Self {
        Self {
            id: UserId::new_random(),
            email,
            name: None,
            email_verified_at: None,
        }
    }
}

#[derive(Default)]
pub struct NewUserBuilder {
    id: Option<UserId>,
    email: Option<String>,
    name: Option<String>,
    email_verified_at: Option<DateTime<Utc>>,
}

impl NewUserBuilder {
    pub fn id(mut self, id: UserId) -> Self {
        self.id = Some(id);
        self
    }

    pub fn email(mut self, email: String) -> Self {
        self.email = Some(email);
        self
    }

    pub fn name(mut self, name: String) -> Self {
        self.name = Some(name);
        self
    }

    pub fn email_verified_at(mut self, email_verified_at: Option<DateTime<Utc>>) -> Self {
        self.email_verified_at = email_verified_at;
        self
    }

    pub fn build(self) -> Result<NewUser, Error> {
        Ok(NewUser {
            id: self.id.unwrap_or_default(),
            email: self.email.require_field("Email")?,
            name: self.name,
            email_verified_at: self.email_verified_at,
        })
    }
}

/// Why a login attempt was refused after the lockout check passed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureReason {
    /// Unknown email or wrong password
    Incorrect,
    /// Deactivated or soft-deleted account
    Inactive,
    /// Email address not yet verified
    Unverified,
}

impl FailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureReason::Incorrect => "incorrect",
            FailureReason::Inactive => "inactive",
            FailureReason::Unverified => "unverified",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FailureReason {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "incorrect" => Ok(FailureReason::Incorrect),
            "inactive" => Ok(FailureReason::Inactive),
            "unverified" => Ok(FailureReason::Unverified),
            other => Err(ValidationError::InvalidField(format!(
                "Unknown failure reason: {other}"
            ))),
        }
    }
}

/// A login attempt about to be appended to the attempt log.
///
/// The timestamp is deliberately absent: the store assigns it from the shared
/// clock at write time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLoginAttempt {
    pub user_id: Option<UserId>,
    pub ip_address: String,
    pub user_agent: String,
    pub failure_reason: Option<FailureReason>,
}

impl NewLoginAttempt {
    pub fn succeeded(user_id: UserId, ip_address: &str, user_agent: &str) -> Self {
        Self {
            user_id: Some(user_id),
            ip_address: ip_address.to_string(),
            user_agent: user_agent.to_string(),
            failure_reason: None,
        }
    }

    pub fn failed(
        user_id: Option<UserId>,
        ip_address: &str,
        user_agent: &str,
        reason: FailureReason,
    ) -> Self {
        Self {
            user_id,
            ip_address: ip_address.to_string(),
            user_agent: user_agent.to_string(),
            failure_reason: Some(reason),
        }
    }

    pub fn is_success(&self) -> bool {
        self.failure_reason.is_none()
    }
}

/// A row of the append-only attempt log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginAttempt {
    pub id: i64,
    pub user_id: Option<UserId>,
    pub ip_address: String,
    pub user_agent: String,
    pub success: bool,
    pub failure_reason: Option<FailureReason>,
    pub attempted_at: DateTime<Utc>,
}

/// The dimension a lockout is evaluated against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LockoutScope {
    User,
    Ip,
}

impl fmt::Display for LockoutScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockoutScope::User => f.write_str("user"),
            LockoutScope::Ip => f.write_str("ip"),
        }
    }
}

/// Selects the attempt-log rows belonging to one scope value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AttemptScope {
    User(UserId),
    Ip(String),
}

impl AttemptScope {
    pub fn kind(&self) -> LockoutScope {
        match self {
            AttemptScope::User(_) => LockoutScope::User,
            AttemptScope::Ip(_) => LockoutScope::Ip,
        }
    }

    /// The value matched against the log's `user_id` or `ip_address` column.
    pub fn value(&self) -> &str {
        match self {
            AttemptScope::User(user_id) => user_id.as_str(),
            AttemptScope::Ip(ip) => ip,
        }
    }
}

impl fmt::Display for AttemptScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind(), self.value())
    }
}

/// Lockout state of one scope at a given instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockoutStatus {
    pub scope: LockoutScope,
    pub is_locked: bool,
    pub locked_until: Option<DateTime<Utc>>,
    pub seconds_remaining: i64,
    /// Rounded up, for display
    pub minutes_remaining: i64,
}

impl LockoutStatus {
    pub fn unlocked(scope: LockoutScope) -> Self {
        Self {
            scope,
            is_locked: false,
            locked_until: None,
            seconds_remaining: 0,
            minutes_remaining: 0,
        }
    }

    /// Build the status of a scope whose lockout (if any) ends at `locked_until`.
    pub fn at(scope: LockoutScope, locked_until: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Self {
        // Partial seconds count as a whole second still locked
        let seconds_remaining = locked_until
            .map(|until| ((until - now).num_milliseconds() + 999).div_euclid(1000))
            .unwrap_or(0)
            .max(0);

        if seconds_remaining == 0 {
            return Self::unlocked(scope);
        }

        Self {
            scope,
            is_locked: true,
            locked_until,
            seconds_remaining,
            minutes_remaining: (seconds_remaining + 59) / 60,
        }
    }
}

/// A persisted remember-me token. Only the digest of the token is stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RememberTokenRecord {
    pub user_id: UserId,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl RememberTokenRecord {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}
