use crate::{
    Error, Session, User, UserId,
    repositories::{
        LoginAttemptRepository, PasswordRepository, RememberTokenRepository, RepositoryProvider,
        SessionRepository, UserRepository,
    },
    session::SessionToken,
    storage::{AttemptScope, LoginAttempt, NewLoginAttempt, NewUser, RememberTokenRecord},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use std::sync::Arc;

/// Adapter that wraps a RepositoryProvider and implements individual repository traits
pub struct UserRepositoryAdapter<R: RepositoryProvider> {
    provider: Arc<R>,
}

impl<R: RepositoryProvider> UserRepositoryAdapter<R> {
    pub fn new(provider: Arc<R>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl<R: RepositoryProvider> UserRepository for UserRepositoryAdapter<R> {
    async fn create(&self, user: NewUser) -> Result<User, Error> {
        self.provider.user().create(user).await
    }

    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>, Error> {
        self.provider.user().find_by_id(id).await
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, Error> {
        self.provider.user().find_by_email(email).await
    }

    async fn mark_email_verified(&self, user_id: &UserId) -> Result<(), Error> {
        self.provider.user().mark_email_verified(user_id).await
    }

    async fn set_active(&self, user_id: &UserId, is_active: bool) -> Result<(), Error> {
        self.provider.user().set_active(user_id, is_active).await
    }

    async fn soft_delete(&self, user_id: &UserId) -> Result<(), Error> {
        self.provider.user().soft_delete(user_id).await
    }

    async fn deactivate_unverified_before(&self, cutoff: DateTime<Utc>) -> Result<u64, Error> {
        self.provider.user().deactivate_unverified_before(cutoff).await
    }

    async fn purge_deleted_before(&self, cutoff: DateTime<Utc>) -> Result<u64, Error> {
        self.provider.user().purge_deleted_before(cutoff).await
    }
}

pub struct SessionRepositoryAdapter<R: RepositoryProvider> {
    provider: Arc<R>,
}

impl<R: RepositoryProvider> SessionRepositoryAdapter<R> {
    pub fn new(provider: Arc<R>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl<R: RepositoryProvider> SessionRepository for SessionRepositoryAdapter<R> {
    async fn create(&self, session: Session) -> Result<Session, Error> {
        self.provider.session().create(session).await
    }

    async fn find_by_token(&self, token: &SessionToken) -> Result<Option<Session>, Error> {
        self.provider.session().find_by_token(token).await
    }

    async fn delete(&self, token: &SessionToken) -> Result<(), Error> {
        self.provider.session().delete(token).await
    }

    async fn delete_by_user_id(&self, user_id: &UserId) -> Result<(), Error> {
        self.provider.session().delete_by_user_id(user_id).await
    }

    async fn cleanup_expired(&self, now: DateTime<Utc>) -> Result<u64, Error> {
        self.provider.session().cleanup_expired(now).await
    }
}

pub struct PasswordRepositoryAdapter<R: RepositoryProvider> {
    provider: Arc<R>,
}

impl<R: RepositoryProvider> PasswordRepositoryAdapter<R> {
    pub fn new(provider: Arc<R>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl<R: RepositoryProvider> PasswordRepository for PasswordRepositoryAdapter<R> {
    async fn set_password_hash(&self, user_id: &UserId, hash: &str) -> Result<(), Error> {
        self.provider
            .password()
            .set_password_hash(user_id, hash)
            .await
    }

    async fn get_password_hash(&self, user_id: &UserId) -> Result<Option<String>, Error> {
        self.provider.password().get_password_hash(user_id).await
    }
}

pub struct LoginAttemptRepositoryAdapter<R: RepositoryProvider> {
    provider: Arc<R>,
}

impl<R: RepositoryProvider> LoginAttemptRepositoryAdapter<R> {
    pub fn new(provider: Arc<R>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl<R: RepositoryProvider> LoginAttemptRepository for LoginAttemptRepositoryAdapter<R> {
    async fn record(&self, attempt: NewLoginAttempt) -> Result<LoginAttempt, Error> {
        self.provider.login_attempt().record(attempt).await
    }

    fn recent_failures<'a>(
        &'a self,
        scope: &'a AttemptScope,
    ) -> BoxStream<'a, Result<DateTime<Utc>, Error>> {
        self.provider.login_attempt().recent_failures(scope)
    }

    async fn prune_before(&self, cutoff: DateTime<Utc>) -> Result<u64, Error> {
        self.provider.login_attempt().prune_before(cutoff).await
    }
}

pub struct RememberTokenRepositoryAdapter<R: RepositoryProvider> {
    provider: Arc<R>,
}

impl<R: RepositoryProvider> RememberTokenRepositoryAdapter<R> {
    pub fn new(provider: Arc<R>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl<R: RepositoryProvider> RememberTokenRepository for RememberTokenRepositoryAdapter<R> {
    async fn replace_for_user(&self, record: RememberTokenRecord) -> Result<(), Error> {
        self.provider.remember_token().replace_for_user(record).await
    }

    async fn find_by_hash(&self, token_hash: &str) -> Result<Option<RememberTokenRecord>, Error> {
        self.provider.remember_token().find_by_hash(token_hash).await
    }

    async fn extend(&self, token_hash: &str, expires_at: DateTime<Utc>) -> Result<(), Error> {
        self.provider
            .remember_token()
            .extend(token_hash, expires_at)
            .await
    }

    async fn delete(&self, token_hash: &str) -> Result<(), Error> {
        self.provider.remember_token().delete(token_hash).await
    }

    async fn delete_for_user(&self, user_id: &UserId) -> Result<u64, Error> {
        self.provider.remember_token().delete_for_user(user_id).await
    }
}
