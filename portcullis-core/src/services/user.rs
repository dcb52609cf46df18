use crate::{
    Error, User, UserId,
    error::AuthError,
    repositories::UserRepository,
    storage::NewUser,
    validation::validate_login_email,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Emails are compared without regard to surrounding whitespace or letter case.
fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Service for user management operations
pub struct UserService<R: UserRepository> {
    repository: Arc<R>,
}

impl<R: UserRepository> UserService<R> {
    /// Create a new UserService with the given repository
    pub fn new(repository: Arc<R>) -> Self {
        Self { repository }
    }

    /// Create a new user
    pub async fn create_user(&self, email: &str, name: Option<String>) -> Result<User, Error> {
        let email = normalize_email(email);
        validate_login_email(&email)?;

        if self.repository.find_by_email(&email).await?.is_some() {
            return Err(AuthError::UserAlreadyExists.into());
        }

        let mut builder = NewUser::builder()
            .id(UserId::new_random())
            .email(email);

        if let Some(name) = name {
            builder = builder.name(name);
        }

        let new_user = builder.build()?;

        self.repository.create(new_user).await
    }

    /// Get a user by ID
    pub async fn get_user(&self, user_id: &UserId) -> Result<Option<User>, Error> {
        self.repository.find_by_id(user_id).await
    }

    /// Get a user by email
    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, Error> {
        self.repository.find_by_email(&normalize_email(email)).await
    }

    /// The ID the attempt log knows `email` by, if the email belongs to a user
    ///
    /// Deactivated and soft-deleted users still resolve so their lockouts keep
    /// applying.
    pub async fn resolve_user_id(&self, email: &str) -> Result<Option<UserId>, Error> {
        Ok(self
            .repository
            .find_by_email(&normalize_email(email))
            .await?
            .map(|user| user.id))
    }

    /// Mark a user's email as verified
    pub async fn mark_email_verified(&self, user_id: &UserId) -> Result<(), Error> {
        self.repository.mark_email_verified(user_id).await
    }

    /// Block a user from signing in
    pub async fn deactivate(&self, user_id: &UserId) -> Result<(), Error> {
        self.repository.set_active(user_id, false).await
    }

    pub async fn reactivate(&self, user_id: &UserId) -> Result<(), Error> {
        self.repository.set_active(user_id, true).await
    }

    /// Soft-delete a user
    pub async fn delete_user(&self, user_id: &UserId) -> Result<(), Error> {
        self.repository.soft_delete(user_id).await
    }

    /// Deactivate accounts registered before `cutoff` that never verified
    /// their email address.
    pub async fn deactivate_unverified(&self, cutoff: DateTime<Utc>) -> Result<u64, Error> {
        let affected = self.repository.deactivate_unverified_before(cutoff).await?;
        if affected > 0 {
            tracing::info!(affected, %cutoff, "Deactivated unverified accounts");
        }
        Ok(affected)
    }

    /// Remove accounts soft-deleted before `cutoff` for good.
    pub async fn purge_deleted(&self, cutoff: DateTime<Utc>) -> Result<u64, Error> {
        let purged = self.repository.purge_deleted_before(cutoff).await?;
        if purged > 0 {
            tracing::info!(purged, %cutoff, "Purged deleted accounts");
        }
        Ok(purged)
    }
}
