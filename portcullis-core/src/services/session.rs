use crate::{
    Error, Session, UserId, clock::Clock, repositories::SessionRepository, session::SessionToken,
};
use chrono::Duration;
use std::sync::Arc;

/// Service for session management operations
pub struct SessionService<R: SessionRepository> {
    repository: Arc<R>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
}

impl<R: SessionRepository> SessionService<R> {
    /// Create a new SessionService issuing sessions that last `ttl`
    pub fn new(repository: Arc<R>, clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self {
            repository,
            clock,
            ttl,
        }
    }

    /// Create a new session for a user
    pub async fn create_session(
        &self,
        user_id: &UserId,
        user_agent: &str,
        ip_address: &str,
    ) -> Result<Session, Error> {
        let session = Session::issue(
            user_id.clone(),
            user_agent,
            ip_address,
            self.clock.now(),
            self.ttl,
        );

        self.repository.create(session).await
    }

    /// Get a session by token, ignoring expired sessions
    pub async fn get_session(&self, token: &SessionToken) -> Result<Option<Session>, Error> {
        let session = self.repository.find_by_token(token).await?;
        let now = self.clock.now();

        Ok(session.filter(|s| !s.is_expired_at(now)))
    }

    /// Delete a session
    pub async fn delete_session(&self, token: &SessionToken) -> Result<(), Error> {
        self.repository.delete(token).await
    }

    /// Delete all sessions for a user
    pub async fn delete_user_sessions(&self, user_id: &UserId) -> Result<(), Error> {
        self.repository.delete_by_user_id(user_id).await
    }

    /// Clean up expired sessions
    pub async fn cleanup_expired_sessions(&self) -> Result<u64, Error> {
        self.repository.cleanup_expired(self.clock.now()).await
    }
}
