use crate::{Error, User, UserId, storage::NewUser};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Repository for user data access
#[async_trait]
pub trait UserRepository: Send + Sync + 'static {
    /// Create a new user
    async fn create(&self, user: NewUser) -> Result<User, Error>;

    /// Find a user by ID
    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>, Error>;

    /// Find a user by email, ignoring letter case, including deactivated and
    /// soft-deleted users
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, Error>;

    /// Mark a user's email as verified
    async fn mark_email_verified(&self, user_id: &UserId) -> Result<(), Error>;

    /// Set the active flag on a user
    async fn set_active(&self, user_id: &UserId, is_active: bool) -> Result<(), Error>;

    /// Soft-delete a user. The row stays so the attempt log keeps resolving.
    async fn soft_delete(&self, user_id: &UserId) -> Result<(), Error>;

    /// Deactivate and soft-delete active users created before `cutoff` who
    /// never verified their email. Returns the number of users affected.
    async fn deactivate_unverified_before(&self, cutoff: DateTime<Utc>) -> Result<u64, Error>;

    /// Permanently remove users soft-deleted before `cutoff`, together with
    /// their sessions and remember tokens. Attempt rows are left to retention.
    async fn purge_deleted_before(&self, cutoff: DateTime<Utc>) -> Result<u64, Error>;
}
