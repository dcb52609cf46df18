use async_trait::async_trait;
use chrono::{DateTime, Utc};
use portcullis_core::{
    Error, Session, UserId, error::utilities::DatabaseResultExt, repositories::SessionRepository,
    session::SessionToken,
};
use sqlx::SqlitePool;

use crate::from_timestamp;

pub struct SqliteSessionRepository {
    pool: SqlitePool,
}

impl SqliteSessionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct SqliteSession {
    token: String, // This stores the hash, not plaintext
    user_id: String,
    user_agent: String,
    ip_address: String,
    created_at: i64,
    expires_at: i64,
}

#[async_trait]
impl SessionRepository for SqliteSessionRepository {
    async fn create(&self, session: Session) -> Result<Session, Error> {
        sqlx::query(
            r#"
            INSERT INTO sessions (token, user_id, user_agent, ip_address, created_at, expires_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&session.token_hash)
        .bind(session.user_id.as_str())
        .bind(&session.user_agent)
        .bind(&session.ip_address)
        .bind(session.created_at.timestamp())
        .bind(session.expires_at.timestamp())
        .execute(&self.pool)
        .await
        .map_db_err_with_context("Failed to create session")?;

        // The caller already holds the plaintext token
        Ok(session)
    }

    async fn find_by_token(&self, token: &SessionToken) -> Result<Option<Session>, Error> {
        let token_hash = token.token_hash();

        let row = sqlx::query_as::<_, SqliteSession>("SELECT * FROM sessions WHERE token = ?1")
            .bind(&token_hash)
            .fetch_optional(&self.pool)
            .await
            .map_db_err_with_context("Failed to get session")?;

        let Some(row) = row.filter(|row| token.verify_hash(&row.token)) else {
            return Ok(None);
        };

        Ok(Some(Session {
            token: token.clone(),
            token_hash: row.token,
            user_id: UserId::new(&row.user_id),
            user_agent: row.user_agent,
            ip_address: row.ip_address,
            created_at: from_timestamp(row.created_at)?,
            expires_at: from_timestamp(row.expires_at)?,
        }))
    }

    async fn delete(&self, token: &SessionToken) -> Result<(), Error> {
        sqlx::query("DELETE FROM sessions WHERE token = ?1")
            .bind(token.token_hash())
            .execute(&self.pool)
            .await
            .map_db_err_with_context("Failed to delete session")?;

        Ok(())
    }

    async fn delete_by_user_id(&self, user_id: &UserId) -> Result<(), Error> {
        sqlx::query("DELETE FROM sessions WHERE user_id = ?1")
            .bind(user_id.as_str())
            .execute(&self.pool)
            .await
            .map_db_err_with_context("Failed to delete sessions")?;

        Ok(())
    }

    async fn cleanup_expired(&self, now: DateTime<Utc>) -> Result<u64, Error> {
        let result = sqlx::query("DELETE FROM sessions WHERE expires_at <= ?1")
            .bind(now.timestamp())
            .execute(&self.pool)
            .await
            .map_db_err_with_context("Failed to clean up expired sessions")?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{SqliteUserRepository, test_support::migrated_pool};
    use chrono::Duration;
    use portcullis_core::{repositories::UserRepository, storage::NewUser};

    #[tokio::test]
    async fn test_session_lifecycle() {
        let pool = migrated_pool().await;
        let user = SqliteUserRepository::new(pool.clone())
            .create(NewUser::new("test@example.com".to_string()))
            .await
            .unwrap();
        let repo = SqliteSessionRepository::new(pool.clone());

        let now = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let session = Session::issue(
            user.id.clone(),
            "test-agent",
            "127.0.0.1",
            now,
            Duration::hours(1),
        );
        repo.create(session.clone()).await.unwrap();

        // Only the hash is stored
        let stored: String = sqlx::query_scalar("SELECT token FROM sessions")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(stored, session.token.token_hash());
        assert_ne!(stored, session.token.as_str());

        let found = repo.find_by_token(&session.token).await.unwrap().unwrap();
        assert_eq!(found, session);

        assert_eq!(repo.cleanup_expired(now).await.unwrap(), 0);
        assert_eq!(
            repo.cleanup_expired(now + Duration::hours(1)).await.unwrap(),
            1
        );
        assert!(repo.find_by_token(&session.token).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_sessions() {
        let pool = migrated_pool().await;
        let user = SqliteUserRepository::new(pool.clone())
            .create(NewUser::new("test@example.com".to_string()))
            .await
            .unwrap();
        let repo = SqliteSessionRepository::new(pool);
        let now = Utc::now();

        let first = Session::issue(user.id.clone(), "a", "127.0.0.1", now, Duration::hours(1));
        let second = Session::issue(user.id.clone(), "b", "127.0.0.1", now, Duration::hours(1));
        repo.create(first.clone()).await.unwrap();
        repo.create(second.clone()).await.unwrap();

        repo.delete(&first.token).await.unwrap();
        assert!(repo.find_by_token(&first.token).await.unwrap().is_none());
        assert!(repo.find_by_token(&second.token).await.unwrap().is_some());

        repo.delete_by_user_id(&user.id).await.unwrap();
        assert!(repo.find_by_token(&second.token).await.unwrap().is_none());
    }
}
