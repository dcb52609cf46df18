use crate::{
    Error, UserId, error::AuthError, repositories::PasswordRepository,
    validation::PasswordPolicy,
};
use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;

/// Service for password storage and verification
pub struct PasswordService<P: PasswordRepository> {
    password_repository: Arc<P>,
    policy: PasswordPolicy,
}

impl<P: PasswordRepository> PasswordService<P> {
    /// Create a new PasswordService with the default strength policy
    pub fn new(password_repository: Arc<P>) -> Self {
        Self::with_policy(password_repository, PasswordPolicy::default())
    }

    pub fn with_policy(password_repository: Arc<P>, policy: PasswordPolicy) -> Self {
        Self {
            password_repository,
            policy,
        }
    }

    pub fn policy(&self) -> &PasswordPolicy {
        &self.policy
    }

    /// Set a user's password (admin operation, no old password required)
    pub async fn set_password(&self, user_id: &UserId, password: &str) -> Result<(), Error> {
        self.policy.validate(password)?;

        let password_hash = Self::hash_password(password);
        self.password_repository
            .set_password_hash(user_id, &password_hash)
            .await
    }

    /// Change a user's password
    pub async fn change_password(
        &self,
        user_id: &UserId,
        old_password: &SecretString,
        new_password: &str,
    ) -> Result<(), Error> {
        // Validate new password strength before any other operations
        self.policy.validate(new_password)?;

        if !self.verify(user_id, old_password).await? {
            return Err(Error::Auth(AuthError::InvalidCredentials));
        }

        let new_hash = Self::hash_password(new_password);
        self.password_repository
            .set_password_hash(user_id, &new_hash)
            .await
    }

    /// Check `password` against the stored hash of a user
    ///
    /// A user without a password never verifies.
    pub async fn verify(&self, user_id: &UserId, password: &SecretString) -> Result<bool, Error> {
        let Some(password_hash) = self.password_repository.get_password_hash(user_id).await?
        else {
            return Ok(false);
        };

        Ok(Self::verify_password(password.expose_secret(), &password_hash))
    }

    /// Hash a password using argon2
    fn hash_password(password: &str) -> String {
        password_auth::generate_hash(password)
    }

    /// Verify a password against a hash
    fn verify_password(password: &str, hash: &str) -> bool {
        password_auth::verify_password(password, hash).is_ok()
    }
}
