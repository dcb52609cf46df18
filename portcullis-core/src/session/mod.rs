//! Sessions established after a successful login
//!
//! | Field        | Type           | Description                                         |
//! | ------------ | -------------- | --------------------------------------------------- |
//! | `token`      | `SessionToken` | Opaque bearer token handed to the client.           |
//! | `token_hash` | `String`       | SHA-256 of the token; the only form that is stored. |
//! | `user_id`    | `UserId`       | The user the session belongs to.                    |
//! | `user_agent` | `String`       | The user agent of the client that logged in.        |
//! | `ip_address` | `String`       | The address of the client that logged in.           |
//! | `created_at` | `DateTime`     | When the session was created.                       |
//! | `expires_at` | `DateTime`     | When the session stops being valid.                 |

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    UserId,
    crypto::{generate_secure_token, hash_token, verify_token_hash},
};

/// Opaque session token with 256 bits of entropy
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionToken(String);

impl SessionToken {
    pub fn new(token: &str) -> Self {
        Self(token.to_string())
    }

    pub fn new_random() -> Self {
        Self(generate_secure_token())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }

    pub fn token_hash(&self) -> String {
        hash_token(&self.0)
    }

    pub fn verify_hash(&self, stored_hash: &str) -> bool {
        verify_token_hash(&self.0, stored_hash)
    }
}

impl Default for SessionToken {
    fn default() -> Self {
        Self::new_random()
    }
}

impl From<&str> for SessionToken {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

// Keep bearer tokens out of debug logs
impl std::fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SessionToken(..)")
    }
}

/// Long-lived "remember me" token handed to the client alongside a session
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RememberToken(String);

impl RememberToken {
    pub fn new(token: &str) -> Self {
        Self(token.to_string())
    }

    pub fn new_random() -> Self {
        Self(generate_secure_token())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }

    pub fn token_hash(&self) -> String {
        hash_token(&self.0)
    }
}

impl std::fmt::Debug for RememberToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("RememberToken(..)")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub token: SessionToken,
    pub token_hash: String,
    pub user_id: UserId,
    pub user_agent: String,
    pub ip_address: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    /// A fresh session for `user_id`, valid for `ttl` from `now`.
    pub fn issue(
        user_id: UserId,
        user_agent: &str,
        ip_address: &str,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Self {
        let token = SessionToken::new_random();
        Self {
            token_hash: token.token_hash(),
            token,
            user_id,
            user_agent: user_agent.to_string(),
            ip_address: ip_address.to_string(),
            created_at: now,
            expires_at: now + ttl,
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issue_sets_expiry_and_hash() {
        let now = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let session = Session::issue(
            UserId::new("usr_1"),
            "test-agent",
            "127.0.0.1",
            now,
            Duration::hours(24),
        );

        assert_eq!(session.expires_at, now + Duration::hours(24));
        assert!(session.token.verify_hash(&session.token_hash));
        assert!(!session.is_expired_at(now));
        assert!(session.is_expired_at(now + Duration::hours(24)));
    }

    #[test]
    fn test_debug_hides_token() {
        let token = SessionToken::new("secret-value");
        assert_eq!(format!("{token:?}"), "SessionToken(..)");

        let token = RememberToken::new("secret-value");
        assert_eq!(format!("{token:?}"), "RememberToken(..)");
        assert_eq!(token.token_hash(), SessionToken::new("secret-value").token_hash());
    }
}
