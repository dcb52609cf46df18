//! "Remember me" tokens.
//!
//! A user holds at most one token. Each successful redemption pushes the
//! expiry forward by the full lifetime again, so a token only lapses after a
//! whole lifetime without use.

use std::sync::Arc;

use chrono::Duration;

use crate::{
    Error, User, UserId,
    clock::Clock,
    repositories::{RememberTokenRepository, UserRepository},
    session::RememberToken,
    storage::RememberTokenRecord,
};

pub struct RememberTokenService<T: RememberTokenRepository, U: UserRepository> {
    tokens: Arc<T>,
    users: Arc<U>,
    clock: Arc<dyn Clock>,
    lifetime: Duration,
}

impl<T: RememberTokenRepository, U: UserRepository> RememberTokenService<T, U> {
    pub fn new(tokens: Arc<T>, users: Arc<U>, clock: Arc<dyn Clock>, lifetime: Duration) -> Self {
        Self {
            tokens,
            users,
            clock,
            lifetime,
        }
    }

    /// Issue a fresh token for `user_id`, replacing any previous one.
    pub async fn issue(&self, user_id: &UserId) -> Result<RememberToken, Error> {
        let token = RememberToken::new_random();
        let now = self.clock.now();

        self.tokens
            .replace_for_user(RememberTokenRecord {
                user_id: user_id.clone(),
                token_hash: token.token_hash(),
                expires_at: now + self.lifetime,
                created_at: now,
            })
            .await?;

        Ok(token)
    }

    /// Exchange a token for its user.
    ///
    /// Unknown and expired tokens yield `None`; an expired token is deleted on
    /// the way. A user who can no longer sign in also yields `None`.
    pub async fn redeem(&self, token: &RememberToken) -> Result<Option<User>, Error> {
        let token_hash = token.token_hash();
        let Some(record) = self.tokens.find_by_hash(&token_hash).await? else {
            return Ok(None);
        };

        let now = self.clock.now();
        if record.is_expired_at(now) {
            tracing::debug!(user_id = %record.user_id, "Deleting expired remember token");
            self.tokens.delete(&token_hash).await?;
            return Ok(None);
        }

        let user = self
            .users
            .find_by_id(&record.user_id)
            .await?
            .filter(User::can_sign_in);
        if user.is_none() {
            return Ok(None);
        }

        self.tokens.extend(&token_hash, now + self.lifetime).await?;
        Ok(user)
    }

    /// Delete the token of `user_id`, if any.
    pub async fn revoke(&self, user_id: &UserId) -> Result<(), Error> {
        self.tokens.delete_for_user(user_id).await?;
        Ok(())
    }
}
