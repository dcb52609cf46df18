use crate::{Error, UserId, storage::RememberTokenRecord};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Repository for remember-me tokens
///
/// Tokens are looked up by the SHA-256 digest of the token value; the raw
/// token never reaches storage.
#[async_trait]
pub trait RememberTokenRepository: Send + Sync + 'static {
    /// Store `record`, replacing every existing token of the same user
    async fn replace_for_user(&self, record: RememberTokenRecord) -> Result<(), Error>;

    /// Find a token by its digest, whether or not it has expired
    async fn find_by_hash(&self, token_hash: &str) -> Result<Option<RememberTokenRecord>, Error>;

    /// Move the expiry of a token
    async fn extend(&self, token_hash: &str, expires_at: DateTime<Utc>) -> Result<(), Error>;

    /// Delete a single token
    async fn delete(&self, token_hash: &str) -> Result<(), Error>;

    /// Delete every token belonging to a user
    async fn delete_for_user(&self, user_id: &UserId) -> Result<u64, Error>;
}
