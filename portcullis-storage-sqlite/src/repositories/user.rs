use std::sync::Arc;

use crate::SqliteUser;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use portcullis_core::{
    Clock, Error, User, UserId, clock::system_clock, error::utilities::DatabaseResultExt,
    repositories::UserRepository, storage::NewUser,
};
use sqlx::SqlitePool;

/// Users live in a table whose `email` column uses `COLLATE NOCASE`, so
/// lookups and the uniqueness constraint ignore ASCII letter case.
pub struct SqliteUserRepository {
    pool: SqlitePool,
    clock: Arc<dyn Clock>,
}

impl SqliteUserRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self::with_clock(pool, system_clock())
    }

    pub fn with_clock(pool: SqlitePool, clock: Arc<dyn Clock>) -> Self {
        Self { pool, clock }
    }

    fn now(&self) -> i64 {
        self.clock.now().timestamp()
    }
}

#[async_trait]
impl UserRepository for SqliteUserRepository {
    async fn create(&self, user: NewUser) -> Result<User, Error> {
        let now = self.now();
        let email_verified_timestamp = user.email_verified_at.map(|dt| dt.timestamp());

        let sqlite_user = sqlx::query_as::<_, SqliteUser>(
            r#"
            INSERT INTO users (id, email, name, email_verified_at, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            RETURNING id, email, name, is_active, email_verified_at, deleted_at, created_at, updated_at
            "#,
        )
        .bind(user.id.as_str())
        .bind(&user.email)
        .bind(&user.name)
        .bind(email_verified_timestamp)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_db_err_with_context("Failed to create user")?;

        sqlite_user.try_into()
    }

    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>, Error> {
        let sqlite_user = sqlx::query_as::<_, SqliteUser>("SELECT * FROM users WHERE id = ?1")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_db_err_with_context("Failed to get user")?;

        sqlite_user.map(User::try_from).transpose()
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, Error> {
        let sqlite_user = sqlx::query_as::<_, SqliteUser>("SELECT * FROM users WHERE email = ?1")
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .map_db_err_with_context("Failed to get user by email")?;

        sqlite_user.map(User::try_from).transpose()
    }

    async fn mark_email_verified(&self, user_id: &UserId) -> Result<(), Error> {
        let now = self.now();

        sqlx::query("UPDATE users SET email_verified_at = ?1, updated_at = ?2 WHERE id = ?3")
            .bind(now)
            .bind(now)
            .bind(user_id.as_str())
            .execute(&self.pool)
            .await
            .map_db_err_with_context("Failed to mark email verified")?;

        Ok(())
    }

    async fn set_active(&self, user_id: &UserId, is_active: bool) -> Result<(), Error> {
        sqlx::query("UPDATE users SET is_active = ?1, updated_at = ?2 WHERE id = ?3")
            .bind(is_active)
            .bind(self.now())
            .bind(user_id.as_str())
            .execute(&self.pool)
            .await
            .map_db_err_with_context("Failed to update user")?;

        Ok(())
    }

    async fn soft_delete(&self, user_id: &UserId) -> Result<(), Error> {
        let now = self.now();

        sqlx::query(
            "UPDATE users SET deleted_at = ?1, updated_at = ?2 WHERE id = ?3 AND deleted_at IS NULL",
        )
        .bind(now)
        .bind(now)
        .bind(user_id.as_str())
        .execute(&self.pool)
        .await
        .map_db_err_with_context("Failed to delete user")?;

        Ok(())
    }

    async fn deactivate_unverified_before(&self, cutoff: DateTime<Utc>) -> Result<u64, Error> {
        let now = self.now();

        let result = sqlx::query(
            r#"
            UPDATE users SET is_active = 0, deleted_at = ?1, updated_at = ?1
            WHERE is_active = 1
              AND deleted_at IS NULL
              AND email_verified_at IS NULL
              AND created_at < ?2
            "#,
        )
        .bind(now)
        .bind(cutoff.timestamp())
        .execute(&self.pool)
        .await
        .map_db_err_with_context("Failed to deactivate unverified users")?;

        Ok(result.rows_affected())
    }

    async fn purge_deleted_before(&self, cutoff: DateTime<Utc>) -> Result<u64, Error> {
        // Sessions and remember tokens go with the user through ON DELETE CASCADE
        let result = sqlx::query("DELETE FROM users WHERE deleted_at IS NOT NULL AND deleted_at < ?1")
            .bind(cutoff.timestamp())
            .execute(&self.pool)
            .await
            .map_db_err_with_context("Failed to purge deleted users")?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::migrated_pool;
    use chrono::Duration;
    use portcullis_core::ManualClock;

    #[tokio::test]
    async fn test_create_and_find_user() {
        let repo = SqliteUserRepository::new(migrated_pool().await);

        let created = repo
            .create(
                NewUser::builder()
                    .email("test@example.com".to_string())
                    .name("Test User".to_string())
                    .build()
                    .unwrap(),
            )
            .await
            .unwrap();
        assert!(created.is_active);
        assert!(!created.is_email_verified());

        let by_id = repo.find_by_id(&created.id).await.unwrap().unwrap();
        assert_eq!(by_id.email, "test@example.com");
        assert_eq!(by_id.name.as_deref(), Some("Test User"));

        let by_email = repo.find_by_email("test@example.com").await.unwrap();
        assert_eq!(by_email.map(|u| u.id), Some(created.id));
        assert!(repo.find_by_email("nobody@example.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_email_is_rejected() {
        let repo = SqliteUserRepository::new(migrated_pool().await);

        repo.create(NewUser::new("test@example.com".to_string()))
            .await
            .unwrap();
        let err = repo
            .create(NewUser::new("test@example.com".to_string()))
            .await
            .unwrap_err();
        assert!(err.is_storage_error());
    }

    #[tokio::test]
    async fn test_account_state_changes() {
        let repo = SqliteUserRepository::new(migrated_pool().await);
        let user = repo
            .create(NewUser::new("test@example.com".to_string()))
            .await
            .unwrap();

        repo.mark_email_verified(&user.id).await.unwrap();
        repo.set_active(&user.id, false).await.unwrap();
        let found = repo.find_by_id(&user.id).await.unwrap().unwrap();
        assert!(found.is_email_verified());
        assert!(!found.is_active);

        repo.set_active(&user.id, true).await.unwrap();
        repo.soft_delete(&user.id).await.unwrap();
        let found = repo.find_by_email("test@example.com").await.unwrap().unwrap();
        assert!(found.is_active);
        assert!(found.deleted_at.is_some());
        assert!(!found.can_sign_in());
    }

    #[tokio::test]
    async fn test_email_ignores_case() {
        let repo = SqliteUserRepository::new(migrated_pool().await);

        let created = repo
            .create(NewUser::new("User@Example.com".to_string()))
            .await
            .unwrap();
        let found = repo.find_by_email("user@example.COM").await.unwrap();
        assert_eq!(found.map(|u| u.id), Some(created.id));

        let err = repo
            .create(NewUser::new("USER@example.com".to_string()))
            .await
            .unwrap_err();
        assert!(err.is_storage_error());
    }

    #[tokio::test]
    async fn test_rows_are_stamped_from_the_clock() {
        let clock = Arc::new(ManualClock::at_timestamp(1_600_000_000));
        let repo = SqliteUserRepository::with_clock(migrated_pool().await, clock.clone());

        let user = repo
            .create(NewUser::new("test@example.com".to_string()))
            .await
            .unwrap();
        assert_eq!(user.created_at.timestamp(), 1_600_000_000);

        clock.advance(Duration::minutes(5));
        repo.mark_email_verified(&user.id).await.unwrap();
        let user = repo.find_by_id(&user.id).await.unwrap().unwrap();
        assert_eq!(
            user.email_verified_at.map(|at| at.timestamp()),
            Some(1_600_000_300)
        );
        assert_eq!(user.updated_at.timestamp(), 1_600_000_300);
    }

    #[tokio::test]
    async fn test_deactivate_unverified_then_purge() {
        let clock = Arc::new(ManualClock::at_timestamp(1_600_000_000));
        let pool = migrated_pool().await;
        let repo = SqliteUserRepository::with_clock(pool.clone(), clock.clone());

        let stale = repo
            .create(NewUser::new("stale@example.com".to_string()))
            .await
            .unwrap();
        let verified = repo
            .create(NewUser::new("verified@example.com".to_string()))
            .await
            .unwrap();
        repo.mark_email_verified(&verified.id).await.unwrap();

        clock.advance(Duration::hours(2));
        let fresh = repo
            .create(NewUser::new("fresh@example.com".to_string()))
            .await
            .unwrap();

        let cutoff = clock.now() - Duration::hours(1);
        assert_eq!(repo.deactivate_unverified_before(cutoff).await.unwrap(), 1);

        let stale_row = repo.find_by_id(&stale.id).await.unwrap().unwrap();
        assert!(!stale_row.is_active);
        assert_eq!(stale_row.deleted_at, Some(clock.now()));
        assert!(repo.find_by_id(&fresh.id).await.unwrap().unwrap().is_active);

        sqlx::query(
            "INSERT INTO sessions (token, user_id, user_agent, ip_address, created_at, expires_at) VALUES ('hash', ?1, 'agent', '127.0.0.1', 0, 0)",
        )
        .bind(stale.id.as_str())
        .execute(&pool)
        .await
        .unwrap();

        assert_eq!(repo.purge_deleted_before(clock.now()).await.unwrap(), 0);
        clock.advance(Duration::days(8));
        assert_eq!(
            repo.purge_deleted_before(clock.now() - Duration::days(7))
                .await
                .unwrap(),
            1
        );
        assert!(repo.find_by_id(&stale.id).await.unwrap().is_none());
        assert!(repo.find_by_id(&verified.id).await.unwrap().is_some());

        let sessions: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sessions")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(sessions, 0);
    }
}
