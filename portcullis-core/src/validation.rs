//! Input validation for the login form and for password changes
//!
//! Login input is checked before anything touches the attempt log: a
//! malformed submission is re-prompted and never counts as a failed attempt.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Longest email accepted on the login form
pub const MAX_LOGIN_EMAIL_LENGTH: usize = 100;

/// Longest password accepted on the login form
pub const MAX_LOGIN_PASSWORD_LENGTH: usize = 50;

/// A practical subset of RFC 5322, compiled once.
static EMAIL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$")
        .expect("Invalid email regex pattern")
});

/// Validates the email field of a login submission
///
/// # Examples
///
/// ```rust
/// use portcullis_core::validation::validate_login_email;
///
/// assert!(validate_login_email("user@example.com").is_ok());
/// assert!(validate_login_email("invalid-email").is_err());
/// ```
pub fn validate_login_email(email: &str) -> Result<(), ValidationError> {
    if email.is_empty() {
        return Err(ValidationError::MissingField("email".to_string()));
    }

    if email.len() > MAX_LOGIN_EMAIL_LENGTH {
        return Err(ValidationError::InvalidField("email".to_string()));
    }

    if EMAIL_REGEX.is_match(email) {
        Ok(())
    } else {
        Err(ValidationError::InvalidEmail(email.to_string()))
    }
}

/// Validates the password field of a login submission
///
/// Only presence and length are checked here. Strength rules apply when a
/// password is set, not when one is tried.
pub fn validate_login_password(password: &str) -> Result<(), ValidationError> {
    if password.is_empty() {
        return Err(ValidationError::MissingField("password".to_string()));
    }

    if password.len() > MAX_LOGIN_PASSWORD_LENGTH {
        return Err(ValidationError::InvalidField("password".to_string()));
    }

    Ok(())
}

/// Strength rules applied when a password is set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PasswordPolicy {
    pub min_length: usize,
    pub require_uppercase: bool,
    pub require_lowercase: bool,
    pub require_number: bool,
    pub require_special: bool,
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self {
            min_length: 8,
            require_uppercase: true,
            require_lowercase: true,
            require_number: true,
            require_special: false,
        }
    }
}

impl PasswordPolicy {
    /// Check `password` against the policy
    ///
    /// # Examples
    ///
    /// ```rust
    /// use portcullis_core::validation::PasswordPolicy;
    ///
    /// let policy = PasswordPolicy::default();
    /// assert!(policy.validate("Secure123").is_ok());
    /// assert!(policy.validate("weak").is_err());
    /// ```
    pub fn validate(&self, password: &str) -> Result<(), ValidationError> {
        let long_enough = password.chars().count() >= self.min_length;
        let satisfied = long_enough
            && (!self.require_lowercase || password.chars().any(|c| c.is_ascii_lowercase()))
            && (!self.require_uppercase || password.chars().any(|c| c.is_ascii_uppercase()))
            && (!self.require_number || password.chars().any(|c| c.is_ascii_digit()))
            && (!self.require_special || password.chars().any(|c| !c.is_ascii_alphanumeric()));

        if satisfied {
            Ok(())
        } else {
            Err(ValidationError::WeakPassword(self.requirements()))
        }
    }

    /// Human-readable summary, e.g. "Your password must contain at least 8
    /// characters, 1 lowercase letter, 1 uppercase letter and 1 number."
    pub fn requirements(&self) -> String {
        let mut rules = vec![format!("at least {} characters", self.min_length)];
        if self.require_lowercase {
            rules.push("1 lowercase letter".to_string());
        }
        if self.require_uppercase {
            rules.push("1 uppercase letter".to_string());
        }
        if self.require_number {
            rules.push("1 number".to_string());
        }
        if self.require_special {
            rules.push("1 special character".to_string());
        }

        let joined = match rules.split_last() {
            Some((last, rest)) if !rest.is_empty() => format!("{} and {last}", rest.join(", ")),
            _ => rules.concat(),
        };
        format!("Your password must contain {joined}.")
    }
}
