use async_trait::async_trait;
use chrono::{DateTime, Utc};
use portcullis_core::{
    Error, UserId, error::utilities::DatabaseResultExt, repositories::RememberTokenRepository,
    storage::RememberTokenRecord,
};
use sqlx::SqlitePool;

use crate::from_timestamp;

pub struct SqliteRememberTokenRepository {
    pool: SqlitePool,
}

impl SqliteRememberTokenRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct SqliteRememberToken {
    token_hash: String,
    user_id: String,
    expires_at: i64,
    created_at: i64,
}

impl TryFrom<SqliteRememberToken> for RememberTokenRecord {
    type Error = Error;

    fn try_from(row: SqliteRememberToken) -> Result<Self, Self::Error> {
        Ok(RememberTokenRecord {
            user_id: UserId::new(&row.user_id),
            token_hash: row.token_hash,
            expires_at: from_timestamp(row.expires_at)?,
            created_at: from_timestamp(row.created_at)?,
        })
    }
}

#[async_trait]
impl RememberTokenRepository for SqliteRememberTokenRepository {
    async fn replace_for_user(&self, record: RememberTokenRecord) -> Result<(), Error> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_db_err_with_context("Failed to store remember token")?;

        sqlx::query("DELETE FROM remember_tokens WHERE user_id = ?1")
            .bind(record.user_id.as_str())
            .execute(&mut *tx)
            .await
            .map_db_err_with_context("Failed to store remember token")?;

        sqlx::query(
            r#"
            INSERT INTO remember_tokens (token_hash, user_id, expires_at, created_at)
            VALUES (?1, ?2, ?3, ?4)
            "#,
        )
        .bind(&record.token_hash)
        .bind(record.user_id.as_str())
        .bind(record.expires_at.timestamp())
        .bind(record.created_at.timestamp())
        .execute(&mut *tx)
        .await
        .map_db_err_with_context("Failed to store remember token")?;

        tx.commit()
            .await
            .map_db_err_with_context("Failed to store remember token")?;

        Ok(())
    }

    async fn find_by_hash(&self, token_hash: &str) -> Result<Option<RememberTokenRecord>, Error> {
        let row = sqlx::query_as::<_, SqliteRememberToken>(
            "SELECT token_hash, user_id, expires_at, created_at FROM remember_tokens WHERE token_hash = ?1",
        )
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await
        .map_db_err_with_context("Failed to get remember token")?;

        row.map(RememberTokenRecord::try_from).transpose()
    }

    async fn extend(&self, token_hash: &str, expires_at: DateTime<Utc>) -> Result<(), Error> {
        sqlx::query("UPDATE remember_tokens SET expires_at = ?1 WHERE token_hash = ?2")
            .bind(expires_at.timestamp())
            .bind(token_hash)
            .execute(&self.pool)
            .await
            .map_db_err_with_context("Failed to extend remember token")?;

        Ok(())
    }

    async fn delete(&self, token_hash: &str) -> Result<(), Error> {
        sqlx::query("DELETE FROM remember_tokens WHERE token_hash = ?1")
            .bind(token_hash)
            .execute(&self.pool)
            .await
            .map_db_err_with_context("Failed to delete remember token")?;

        Ok(())
    }

    async fn delete_for_user(&self, user_id: &UserId) -> Result<u64, Error> {
        let result = sqlx::query("DELETE FROM remember_tokens WHERE user_id = ?1")
            .bind(user_id.as_str())
            .execute(&self.pool)
            .await
            .map_db_err_with_context("Failed to delete remember tokens")?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{SqliteUserRepository, test_support::migrated_pool};
    use chrono::Duration;
    use portcullis_core::{repositories::UserRepository, storage::NewUser};

    fn record(user_id: &UserId, token_hash: &str, now: DateTime<Utc>) -> RememberTokenRecord {
        RememberTokenRecord {
            user_id: user_id.clone(),
            token_hash: token_hash.to_string(),
            expires_at: now + Duration::days(30),
            created_at: now,
        }
    }

    #[tokio::test]
    async fn test_replace_for_user_keeps_one_token() {
        let pool = migrated_pool().await;
        let user = SqliteUserRepository::new(pool.clone())
            .create(NewUser::new("test@example.com".to_string()))
            .await
            .unwrap();
        let repo = SqliteRememberTokenRepository::new(pool);
        let now = DateTime::from_timestamp(1_700_000_000, 0).unwrap();

        repo.replace_for_user(record(&user.id, "first", now))
            .await
            .unwrap();
        repo.replace_for_user(record(&user.id, "second", now))
            .await
            .unwrap();

        assert!(repo.find_by_hash("first").await.unwrap().is_none());
        let found = repo.find_by_hash("second").await.unwrap().unwrap();
        assert_eq!(found, record(&user.id, "second", now));
    }

    #[tokio::test]
    async fn test_extend_and_delete() {
        let pool = migrated_pool().await;
        let user = SqliteUserRepository::new(pool.clone())
            .create(NewUser::new("test@example.com".to_string()))
            .await
            .unwrap();
        let repo = SqliteRememberTokenRepository::new(pool);
        let now = DateTime::from_timestamp(1_700_000_000, 0).unwrap();

        repo.replace_for_user(record(&user.id, "hash", now))
            .await
            .unwrap();
        repo.extend("hash", now + Duration::days(60)).await.unwrap();
        let found = repo.find_by_hash("hash").await.unwrap().unwrap();
        assert_eq!(found.expires_at, now + Duration::days(60));

        repo.delete("hash").await.unwrap();
        assert!(repo.find_by_hash("hash").await.unwrap().is_none());

        repo.replace_for_user(record(&user.id, "hash", now))
            .await
            .unwrap();
        assert_eq!(repo.delete_for_user(&user.id).await.unwrap(), 1);
    }
}
