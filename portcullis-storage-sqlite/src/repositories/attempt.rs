//! SQLite implementation of the login attempt log.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::{StreamExt, stream::BoxStream};
use portcullis_core::{
    Clock, Error,
    clock::system_clock,
    error::{StorageError, utilities::DatabaseResultExt},
    repositories::LoginAttemptRepository,
    storage::{AttemptScope, FailureReason, LoginAttempt, NewLoginAttempt},
};
use sqlx::SqlitePool;

use crate::from_timestamp;

/// SQLite repository for the attempt log.
///
/// Rows are stamped from the injected clock, which must be the one the
/// throttle reads; otherwise a lockout could be computed against a different
/// notion of "now" than the rows were written with.
pub struct SqliteLoginAttemptRepository {
    pool: SqlitePool,
    clock: Arc<dyn Clock>,
}

impl SqliteLoginAttemptRepository {
    /// Create a repository stamping rows with the system clock.
    pub fn new(pool: SqlitePool) -> Self {
        Self::with_clock(pool, system_clock())
    }

    pub fn with_clock(pool: SqlitePool, clock: Arc<dyn Clock>) -> Self {
        Self { pool, clock }
    }
}

/// Internal struct for query results
#[derive(Debug, sqlx::FromRow)]
struct SqliteLoginAttempt {
    id: i64,
    user_id: Option<String>,
    ip_address: String,
    user_agent: String,
    success: bool,
    failed_reason: Option<String>,
    attempted_at: i64,
}

impl TryFrom<SqliteLoginAttempt> for LoginAttempt {
    type Error = Error;

    fn try_from(row: SqliteLoginAttempt) -> Result<Self, Self::Error> {
        let failure_reason = row
            .failed_reason
            .as_deref()
            .map(str::parse::<FailureReason>)
            .transpose()
            .map_err(|e| StorageError::Database(e.to_string()))?;

        Ok(LoginAttempt {
            id: row.id,
            user_id: row.user_id.map(Into::into),
            ip_address: row.ip_address,
            user_agent: row.user_agent,
            success: row.success,
            failure_reason,
            attempted_at: from_timestamp(row.attempted_at)?,
        })
    }
}

const USER_FAILURES: &str = r#"
    SELECT attempted_at FROM login_attempts
    WHERE user_id = ?1 AND success = 0
    ORDER BY attempted_at DESC, id DESC
"#;

const IP_FAILURES: &str = r#"
    SELECT attempted_at FROM login_attempts
    WHERE ip_address = ?1 AND success = 0
    ORDER BY attempted_at DESC, id DESC
"#;

#[async_trait]
impl LoginAttemptRepository for SqliteLoginAttemptRepository {
    async fn record(&self, attempt: NewLoginAttempt) -> Result<LoginAttempt, Error> {
        let now = self.clock.now().timestamp();

        let row = sqlx::query_as::<_, SqliteLoginAttempt>(
            r#"
            INSERT INTO login_attempts (user_id, ip_address, user_agent, success, failed_reason, attempted_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            RETURNING id, user_id, ip_address, user_agent, success, failed_reason, attempted_at
            "#,
        )
        .bind(attempt.user_id.as_ref().map(|id| id.as_str()))
        .bind(&attempt.ip_address)
        .bind(&attempt.user_agent)
        .bind(attempt.is_success())
        .bind(attempt.failure_reason.map(|reason| reason.as_str()))
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_db_err_with_context("Failed to record login attempt")?;

        row.try_into()
    }

    fn recent_failures<'a>(
        &'a self,
        scope: &'a AttemptScope,
    ) -> BoxStream<'a, Result<DateTime<Utc>, Error>> {
        let sql = match scope {
            AttemptScope::User(_) => USER_FAILURES,
            AttemptScope::Ip(_) => IP_FAILURES,
        };

        sqlx::query_scalar::<_, i64>(sql)
            .bind(scope.value())
            .fetch(&self.pool)
            .map(|row| {
                let seconds = row.map_db_err_with_context("Failed to read login attempts")?;
                from_timestamp(seconds)
            })
            .boxed()
    }

    async fn prune_before(&self, cutoff: DateTime<Utc>) -> Result<u64, Error> {
        let result = sqlx::query("DELETE FROM login_attempts WHERE attempted_at < ?1")
            .bind(cutoff.timestamp())
            .execute(&self.pool)
            .await
            .map_db_err_with_context("Failed to prune login attempts")?;

        Ok(result.rows_affected())
    }
}
