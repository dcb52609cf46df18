//! In-memory repositories shared by the service tests

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicBool, AtomicUsize, Ordering},
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::{StreamExt, stream::BoxStream};

use crate::{
    Error, Session, User, UserId,
    clock::{Clock, ManualClock},
    error::StorageError,
    repositories::{
        LoginAttemptRepository, PasswordRepository, RememberTokenRepository, SessionRepository,
        UserRepository,
    },
    session::SessionToken,
    storage::{AttemptScope, LoginAttempt, NewLoginAttempt, NewUser, RememberTokenRecord},
};

pub struct MockAttemptLog {
    pub clock: Arc<ManualClock>,
    pub attempts: Mutex<Vec<LoginAttempt>>,
    pub rows_read: Arc<AtomicUsize>,
    pub fail_writes: AtomicBool,
    pub fail_reads: AtomicBool,
}

impl MockAttemptLog {
    pub fn new(clock: Arc<ManualClock>) -> Self {
        Self {
            clock,
            attempts: Mutex::new(Vec::new()),
            rows_read: Arc::new(AtomicUsize::new(0)),
            fail_writes: AtomicBool::new(false),
            fail_reads: AtomicBool::new(false),
        }
    }

    pub fn len(&self) -> usize {
        self.attempts.lock().unwrap().len()
    }

    pub fn last(&self) -> Option<LoginAttempt> {
        self.attempts.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl LoginAttemptRepository for MockAttemptLog {
    async fn record(&self, attempt: NewLoginAttempt) -> Result<LoginAttempt, Error> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::Database("attempt log unavailable".to_string()).into());
        }

        let mut attempts = self.attempts.lock().unwrap();
        let row = LoginAttempt {
            id: attempts.len() as i64 + 1,
            success: attempt.is_success(),
            user_id: attempt.user_id,
            ip_address: attempt.ip_address,
            user_agent: attempt.user_agent,
            failure_reason: attempt.failure_reason,
            attempted_at: self.clock.now(),
        };
        attempts.push(row.clone());
        Ok(row)
    }

    fn recent_failures<'a>(
        &'a self,
        scope: &'a AttemptScope,
    ) -> BoxStream<'a, Result<DateTime<Utc>, Error>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            let error: Error = StorageError::Database("attempt log unavailable".to_string()).into();
            return futures::stream::once(async move { Err(error) }).boxed();
        }

        let mut failures: Vec<(i64, DateTime<Utc>)> = self
            .attempts
            .lock()
            .unwrap()
            .iter()
            .filter(|a| !a.success)
            .filter(|a| match scope {
                AttemptScope::User(user_id) => a.user_id.as_ref() == Some(user_id),
                AttemptScope::Ip(ip) => &a.ip_address == ip,
            })
            .map(|a| (a.id, a.attempted_at))
            .collect();
        failures.sort_by(|a, b| b.1.cmp(&a.1).then(b.0.cmp(&a.0)));

        let rows_read = Arc::clone(&self.rows_read);
        futures::stream::iter(failures)
            .inspect(move |_| {
                rows_read.fetch_add(1, Ordering::SeqCst);
            })
            .map(|(_, at)| Ok(at))
            .boxed()
    }

    async fn prune_before(&self, cutoff: DateTime<Utc>) -> Result<u64, Error> {
        let mut attempts = self.attempts.lock().unwrap();
        let before_len = attempts.len();
        attempts.retain(|a| a.attempted_at >= cutoff);
        Ok((before_len - attempts.len()) as u64)
    }
}

#[derive(Default)]
pub struct MockUserRepository {
    pub users: Mutex<Vec<User>>,
    pub lookups: AtomicUsize,
    pub fail: AtomicBool,
}

impl MockUserRepository {
    pub fn insert(&self, user: User) {
        self.users.lock().unwrap().push(user);
    }

    fn check(&self) -> Result<(), Error> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(StorageError::Connection("identity store unavailable".to_string()).into());
        }
        Ok(())
    }

    fn update(&self, user_id: &UserId, f: impl FnOnce(&mut User)) -> Result<(), Error> {
        self.check()?;
        let mut users = self.users.lock().unwrap();
        let user = users
            .iter_mut()
            .find(|u| &u.id == user_id)
            .ok_or(StorageError::NotFound)?;
        f(user);
        Ok(())
    }
}

#[async_trait]
impl UserRepository for MockUserRepository {
    async fn create(&self, user: NewUser) -> Result<User, Error> {
        self.check()?;
        let user = User::builder()
            .id(user.id)
            .email(user.email)
            .name(user.name)
            .email_verified_at(user.email_verified_at)
            .build()?;
        self.insert(user.clone());
        Ok(user)
    }

    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>, Error> {
        self.check()?;
        Ok(self
            .users
            .lock()
            .unwrap()
            .iter()
            .find(|u| &u.id == id)
            .cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, Error> {
        self.check()?;
        self.lookups.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .users
            .lock()
            .unwrap()
            .iter()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn mark_email_verified(&self, user_id: &UserId) -> Result<(), Error> {
        self.update(user_id, |u| u.email_verified_at = Some(Utc::now()))
    }

    async fn set_active(&self, user_id: &UserId, is_active: bool) -> Result<(), Error> {
        self.update(user_id, |u| u.is_active = is_active)
    }

    async fn soft_delete(&self, user_id: &UserId) -> Result<(), Error> {
        self.update(user_id, |u| u.deleted_at = Some(Utc::now()))
    }

    async fn deactivate_unverified_before(&self, cutoff: DateTime<Utc>) -> Result<u64, Error> {
        self.check()?;
        let mut affected = 0;
        for user in self.users.lock().unwrap().iter_mut() {
            if user.is_active
                && user.deleted_at.is_none()
                && user.email_verified_at.is_none()
                && user.created_at < cutoff
            {
                user.is_active = false;
                user.deleted_at = Some(Utc::now());
                affected += 1;
            }
        }
        Ok(affected)
    }

    async fn purge_deleted_before(&self, cutoff: DateTime<Utc>) -> Result<u64, Error> {
        self.check()?;
        let mut users = self.users.lock().unwrap();
        let before_len = users.len();
        users.retain(|u| !u.deleted_at.is_some_and(|at| at < cutoff));
        Ok((before_len - users.len()) as u64)
    }
}

#[derive(Default)]
pub struct MockPasswordRepository {
    pub hashes: Mutex<Vec<(UserId, String)>>,
    pub reads: AtomicUsize,
}

#[async_trait]
impl PasswordRepository for MockPasswordRepository {
    async fn set_password_hash(&self, user_id: &UserId, hash: &str) -> Result<(), Error> {
        let mut hashes = self.hashes.lock().unwrap();
        hashes.retain(|(id, _)| id != user_id);
        hashes.push((user_id.clone(), hash.to_string()));
        Ok(())
    }

    async fn get_password_hash(&self, user_id: &UserId) -> Result<Option<String>, Error> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .hashes
            .lock()
            .unwrap()
            .iter()
            .find(|(id, _)| id == user_id)
            .map(|(_, hash)| hash.clone()))
    }
}

#[derive(Default)]
pub struct MockSessionRepository {
    pub sessions: Mutex<Vec<Session>>,
}

#[async_trait]
impl SessionRepository for MockSessionRepository {
    async fn create(&self, session: Session) -> Result<Session, Error> {
        self.sessions.lock().unwrap().push(session.clone());
        Ok(session)
    }

    async fn find_by_token(&self, token: &SessionToken) -> Result<Option<Session>, Error> {
        Ok(self
            .sessions
            .lock()
            .unwrap()
            .iter()
            .find(|s| token.verify_hash(&s.token_hash))
            .cloned())
    }

    async fn delete(&self, token: &SessionToken) -> Result<(), Error> {
        let hash = token.token_hash();
        self.sessions
            .lock()
            .unwrap()
            .retain(|s| s.token_hash != hash);
        Ok(())
    }

    async fn delete_by_user_id(&self, user_id: &UserId) -> Result<(), Error> {
        self.sessions
            .lock()
            .unwrap()
            .retain(|s| &s.user_id != user_id);
        Ok(())
    }

    async fn cleanup_expired(&self, now: DateTime<Utc>) -> Result<u64, Error> {
        let mut sessions = self.sessions.lock().unwrap();
        let before_len = sessions.len();
        sessions.retain(|s| !s.is_expired_at(now));
        Ok((before_len - sessions.len()) as u64)
    }
}

#[derive(Default)]
pub struct MockRememberTokenRepository {
    pub tokens: Mutex<Vec<RememberTokenRecord>>,
    pub fail_writes: AtomicBool,
}

#[async_trait]
impl RememberTokenRepository for MockRememberTokenRepository {
    async fn replace_for_user(&self, record: RememberTokenRecord) -> Result<(), Error> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::Database("remember tokens unavailable".to_string()).into());
        }
        let mut tokens = self.tokens.lock().unwrap();
        tokens.retain(|t| t.user_id != record.user_id);
        tokens.push(record);
        Ok(())
    }

    async fn find_by_hash(&self, token_hash: &str) -> Result<Option<RememberTokenRecord>, Error> {
        Ok(self
            .tokens
            .lock()
            .unwrap()
            .iter()
            .find(|t| t.token_hash == token_hash)
            .cloned())
    }

    async fn extend(&self, token_hash: &str, expires_at: DateTime<Utc>) -> Result<(), Error> {
        let mut tokens = self.tokens.lock().unwrap();
        let token = tokens
            .iter_mut()
            .find(|t| t.token_hash == token_hash)
            .ok_or(StorageError::NotFound)?;
        token.expires_at = expires_at;
        Ok(())
    }

    async fn delete(&self, token_hash: &str) -> Result<(), Error> {
        self.tokens
            .lock()
            .unwrap()
            .retain(|t| t.token_hash != token_hash);
        Ok(())
    }

    async fn delete_for_user(&self, user_id: &UserId) -> Result<u64, Error> {
        let mut tokens = self.tokens.lock().unwrap();
        let before_len = tokens.len();
        tokens.retain(|t| &t.user_id != user_id);
        Ok((before_len - tokens.len()) as u64)
    }
}

/// An active, verified user with the given email.
pub fn verified_user(email: &str) -> User {
    User::builder()
        .email(email.to_string())
        .email_verified_at(Some(Utc::now()))
        .build()
        .unwrap()
}
