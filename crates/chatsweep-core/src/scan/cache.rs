//! Per-account, per-job scan table cache.

use chrono::Utc;
use sqlx::Row;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use tracing::{debug, warn};

use super::model::ScanJobState;
use crate::{AccountId, Result};

/// SQLite cache of [`ScanJobState`] tables for offline display and resume.
#[derive(Debug, Clone)]
pub struct ScanStateCache {
    pool: SqlitePool,
}

impl ScanStateCache {
    /// Create a new cache with the given database path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database connection fails or schema creation fails.
    pub async fn new(database_path: &str) -> Result<Self> {
        let url = format!("sqlite:{database_path}?mode=rwc");
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await?;
        Self::from_pool(pool).await
    }

    /// Create an in-memory cache for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the database connection fails or schema creation fails.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        Self::from_pool(pool).await
    }

    /// Create a cache on an existing pool.
    ///
    /// # Errors
    ///
    /// Returns an error if schema creation fails.
    pub async fn from_pool(pool: SqlitePool) -> Result<Self> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS scan_state_cache (
                account_id TEXT NOT NULL,
                job_id TEXT NOT NULL,
                state_json TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (account_id, job_id)
            )
            ",
        )
        .execute(&pool)
        .await?;

        Ok(Self { pool })
    }

    /// Saves a job table, replacing an earlier save of the same job.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the database query fails.
    pub async fn save(&self, state: &ScanJobState) -> Result<()> {
        let state_json = serde_json::to_string(state)?;

        sqlx::query(
            r"
            INSERT OR REPLACE INTO scan_state_cache (account_id, job_id, state_json, updated_at)
            VALUES (?, ?, ?, ?)
            ",
        )
        .bind(state.account_id.as_str())
        .bind(&state.job_id)
        .bind(state_json)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        debug!(
            account = %state.account_id,
            job = %state.job_id,
            chats = state.chats.len(),
            "Cached scan table"
        );
        Ok(())
    }

    /// Loads the table of one job.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn load(&self, account_id: &AccountId, job_id: &str) -> Result<Option<ScanJobState>> {
        let row = sqlx::query(
            r"
            SELECT state_json FROM scan_state_cache
            WHERE account_id = ? AND job_id = ?
            ",
        )
        .bind(account_id.as_str())
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.and_then(|row| decode(&row.get::<String, _>("state_json"))))
    }

    /// Loads the most recently saved table for an account.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn latest(&self, account_id: &AccountId) -> Result<Option<ScanJobState>> {
        let row = sqlx::query(
            r"
            SELECT state_json FROM scan_state_cache
            WHERE account_id = ?
            ORDER BY updated_at DESC, rowid DESC
            LIMIT 1
            ",
        )
        .bind(account_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.and_then(|row| decode(&row.get::<String, _>("state_json"))))
    }

    /// Removes the tables of an account's other jobs.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn prune(&self, account_id: &AccountId, keep_job_id: &str) -> Result<u64> {
        let result =
            sqlx::query(r"DELETE FROM scan_state_cache WHERE account_id = ? AND job_id != ?")
                .bind(account_id.as_str())
                .bind(keep_job_id)
                .execute(&self.pool)
                .await?;
        if result.rows_affected() > 0 {
            debug!(
                account = %account_id,
                removed = result.rows_affected(),
                "Pruned cached scan tables"
            );
        }
        Ok(result.rows_affected())
    }

    /// Removes every cached table of an account.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn remove_account(&self, account_id: &AccountId) -> Result<u64> {
        let result = sqlx::query(r"DELETE FROM scan_state_cache WHERE account_id = ?")
            .bind(account_id.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

fn decode(json: &str) -> Option<ScanJobState> {
    match serde_json::from_str(json) {
        Ok(state) => Some(state),
        Err(e) => {
            warn!("Discarding unreadable cached scan table: {e}");
            None
        }
    }
}
