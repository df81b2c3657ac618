//! Single-slot resume checkpoint storage.

use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};
use tracing::{debug, info, warn};

use super::model::{OperationKind, ResumeSnapshot, SnapshotStatus};
use crate::{AccountId, Result};

/// Durable store holding at most one resume snapshot.
///
/// Writes are last-writer-wins across every account and operation kind: only
/// the most recently interrupted sequence is resumable.
#[derive(Debug, Clone)]
pub struct ResumeStore {
    pool: SqlitePool,
}

impl ResumeStore {
    /// Create a new store with the given database path.
    ///
    /// Creates the database and table if they don't exist.
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

    /// Create an in-memory store for testing.
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

    /// Create a store on an existing pool.
    ///
    /// # Errors
    ///
    /// Returns an error if schema creation fails.
    pub async fn from_pool(pool: SqlitePool) -> Result<Self> {
        let store = Self { pool };
        store.initialize().await?;
        Ok(store)
    }

    /// Initialize database schema.
    async fn initialize(&self) -> Result<()> {
        // The CHECK constraint pins the table to a single row.
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS resume_checkpoint (
                slot INTEGER PRIMARY KEY CHECK (slot = 0),
                id TEXT NOT NULL,
                kind TEXT NOT NULL,
                account_id TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                operations_json TEXT NOT NULL DEFAULT '[]',
                completed_steps INTEGER NOT NULL DEFAULT 0,
                started_at TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending'
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Writes a snapshot, replacing whatever the slot held.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn save(&self, snapshot: &ResumeSnapshot) -> Result<()> {
        if let Some(previous) = self.load().await?
            && previous.id != snapshot.id
        {
            info!(
                replaced = %previous.id,
                replaced_kind = %previous.kind,
                id = %snapshot.id,
                "Overwriting resume checkpoint"
            );
        }

        let operations_json = serde_json::to_string(&snapshot.operations)?;
        let completed_steps = i64::try_from(snapshot.completed_steps).unwrap_or(i64::MAX);

        sqlx::query(
            r"
            INSERT INTO resume_checkpoint
                (slot, id, kind, account_id, description, operations_json,
                 completed_steps, started_at, status)
            VALUES (0, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(slot) DO UPDATE SET
                id = excluded.id,
                kind = excluded.kind,
                account_id = excluded.account_id,
                description = excluded.description,
                operations_json = excluded.operations_json,
                completed_steps = excluded.completed_steps,
                started_at = excluded.started_at,
                status = excluded.status
            ",
        )
        .bind(&snapshot.id)
        .bind(snapshot.kind.as_str())
        .bind(snapshot.account_id.as_str())
        .bind(&snapshot.description)
        .bind(operations_json)
        .bind(completed_steps)
        .bind(snapshot.started_at.to_rfc3339())
        .bind(snapshot.status.as_str())
        .execute(&self.pool)
        .await?;

        debug!(id = %snapshot.id, kind = %snapshot.kind, "Saved resume checkpoint");
        Ok(())
    }

    /// Reads the stored snapshot, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn load(&self) -> Result<Option<ResumeSnapshot>> {
        let row = sqlx::query(
            r"
            SELECT id, kind, account_id, description, operations_json,
                   completed_steps, started_at, status
            FROM resume_checkpoint
            WHERE slot = 0
            ",
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().and_then(row_to_snapshot))
    }

    /// Returns the snapshot if it is pending for this account and kind.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn find_pending(
        &self,
        account_id: &AccountId,
        kind: OperationKind,
    ) -> Result<Option<ResumeSnapshot>> {
        Ok(self
            .load()
            .await?
            .filter(|snapshot| snapshot.is_resumable_for(account_id, kind)))
    }

    /// Records how many steps of the snapshot `id` are done.
    ///
    /// Marks the snapshot completed once every step ran. Does nothing if the
    /// slot now holds a different snapshot; returns whether it was updated.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn record_progress(&self, id: &str, completed_steps: usize) -> Result<bool> {
        let Some(mut snapshot) = self.load().await?.filter(|s| s.id == id) else {
            debug!(id, "Checkpoint was superseded, progress not recorded");
            return Ok(false);
        };

        snapshot.completed_steps = completed_steps.min(snapshot.operations.len());
        if snapshot.completed_steps == snapshot.operations.len() {
            snapshot.status = SnapshotStatus::Completed;
        }
        self.save(&snapshot).await?;
        Ok(true)
    }

    /// Clears the slot if it still holds snapshot `id`.
    ///
    /// Called when the sequence finishes normally. A newer snapshot written by
    /// another sequence is left alone. Returns whether a snapshot was removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn complete(&self, id: &str) -> Result<bool> {
        let result = sqlx::query(r"DELETE FROM resume_checkpoint WHERE slot = 0 AND id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        let removed = result.rows_affected() > 0;
        if removed {
            debug!(id, "Cleared completed resume checkpoint");
        }
        Ok(removed)
    }

    /// Discards whatever the slot holds.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn clear(&self) -> Result<()> {
        sqlx::query(r"DELETE FROM resume_checkpoint")
            .execute(&self.pool)
            .await?;
        debug!("Discarded resume checkpoint");
        Ok(())
    }
}

fn row_to_snapshot(row: &SqliteRow) -> Option<ResumeSnapshot> {
    let kind_str: String = row.get("kind");
    let Some(kind) = OperationKind::parse(&kind_str) else {
        warn!(kind = %kind_str, "Ignoring checkpoint with unknown kind");
        return None;
    };

    let operations_json: String = row.get("operations_json");
    let operations = match serde_json::from_str(&operations_json) {
        Ok(operations) => operations,
        Err(e) => {
            warn!("Ignoring checkpoint with unreadable operations: {e}");
            return None;
        }
    };

    let started_at_str: String = row.get("started_at");
    let started_at = DateTime::parse_from_rfc3339(&started_at_str)
        .ok()?
        .with_timezone(&Utc);

    let status_str: String = row.get("status");

    Some(ResumeSnapshot {
        id: row.get("id"),
        kind,
        account_id: AccountId::new(row.get::<String, _>("account_id")),
        description: row.get("description"),
        operations,
        completed_steps: usize::try_from(row.get::<i64, _>("completed_steps")).unwrap_or(0),
        started_at,
        status: SnapshotStatus::parse(&status_str),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn scan_snapshot(account: &str) -> ResumeSnapshot {
        ResumeSnapshot::new(
            OperationKind::Scan,
            AccountId::new(account),
            format!("Scan of {account}"),
            vec!["Discover chats".to_string(), "Scan chats".to_string()],
        )
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let store = ResumeStore::in_memory().await.unwrap();
        assert!(store.load().await.unwrap().is_none());

        let snapshot = scan_snapshot("a");
        store.save(&snapshot).await.unwrap();

        let loaded = store.load().await.unwrap().unwrap();
        assert_eq!(loaded.id, snapshot.id);
        assert_eq!(loaded.operations, snapshot.operations);
        assert_eq!(loaded.status, SnapshotStatus::Pending);
    }

    #[tokio::test]
    async fn test_single_slot_last_writer_wins() {
        let store = ResumeStore::in_memory().await.unwrap();

        let a = scan_snapshot("a");
        let b = ResumeSnapshot::new(
            OperationKind::DirectSend,
            AccountId::new("b"),
            "Send to 2 contacts",
            vec!["alice".to_string(), "bob".to_string()],
        );
        store.save(&a).await.unwrap();
        store.save(&b).await.unwrap();

        let loaded = store.load().await.unwrap().unwrap();
        assert_eq!(loaded.id, b.id);
        assert!(
            store
                .find_pending(&AccountId::new("a"), OperationKind::Scan)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_complete_only_clears_matching_snapshot() {
        let store = ResumeStore::in_memory().await.unwrap();

        let a = scan_snapshot("a");
        let b = scan_snapshot("b");
        store.save(&a).await.unwrap();
        store.save(&b).await.unwrap();

        assert!(!store.complete(&a.id).await.unwrap());
        assert_eq!(store.load().await.unwrap().unwrap().id, b.id);

        assert!(store.complete(&b.id).await.unwrap());
        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_record_progress_marks_completed() {
        let store = ResumeStore::in_memory().await.unwrap();
        let snapshot = scan_snapshot("a");
        store.save(&snapshot).await.unwrap();

        assert!(store.record_progress(&snapshot.id, 1).await.unwrap());
        let loaded = store.load().await.unwrap().unwrap();
        assert_eq!(loaded.completed_steps, 1);
        assert_eq!(loaded.status, SnapshotStatus::Pending);

        assert!(store.record_progress(&snapshot.id, 2).await.unwrap());
        let loaded = store.load().await.unwrap().unwrap();
        assert_eq!(loaded.status, SnapshotStatus::Completed);
        assert!(
            store
                .find_pending(&AccountId::new("a"), OperationKind::Scan)
                .await
                .unwrap()
                .is_none()
        );

        assert!(!store.record_progress("someone-else", 1).await.unwrap());
    }

    #[tokio::test]
    async fn test_clear() {
        let store = ResumeStore::in_memory().await.unwrap();
        store.save(&scan_snapshot("a")).await.unwrap();
        store.clear().await.unwrap();
        assert!(store.load().await.unwrap().is_none());
    }
}
