use std::sync::Arc;

use async_trait::async_trait;
use portcullis_core::{
    Clock, Error, UserId, clock::system_clock, error::utilities::DatabaseResultExt,
    repositories::PasswordRepository,
};
use sqlx::SqlitePool;

pub struct SqlitePasswordRepository {
    pool: SqlitePool,
    clock: Arc<dyn Clock>,
}

impl SqlitePasswordRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self::with_clock(pool, system_clock())
    }

    pub fn with_clock(pool: SqlitePool, clock: Arc<dyn Clock>) -> Self {
        Self { pool, clock }
    }
}

#[async_trait]
impl PasswordRepository for SqlitePasswordRepository {
    async fn set_password_hash(&self, user_id: &UserId, hash: &str) -> Result<(), Error> {
        sqlx::query("UPDATE users SET password_hash = ?1, updated_at = ?2 WHERE id = ?3")
            .bind(hash)
            .bind(self.clock.now().timestamp())
            .bind(user_id.as_str())
            .execute(&self.pool)
            .await
            .map_db_err_with_context("Failed to set password")?;

        Ok(())
    }

    async fn get_password_hash(&self, user_id: &UserId) -> Result<Option<String>, Error> {
        // Flattened: no row and a NULL column both mean "no password"
        let result =
            sqlx::query_scalar::<_, Option<String>>("SELECT password_hash FROM users WHERE id = ?1")
                .bind(user_id.as_str())
                .fetch_optional(&self.pool)
                .await
                .map_db_err_with_context("Failed to get password")?;

        Ok(result.flatten())
    }
}
