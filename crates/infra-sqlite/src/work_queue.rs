// SQLite WorkQueue Implementation
//
// All claim-protocol transitions are conditional UPDATEs, so concurrent
// claimers and sweepers coordinate purely through the database.

use async_trait::async_trait;
use leadharvest_core::domain::{Stage, WorkItem, WorkItemId, WorkStatus};
use leadharvest_core::error::{AppError, Result};
use leadharvest_core::port::{QueueStats, WorkQueue};
use sqlx::SqlitePool;

// Helper to convert sqlx::Error to AppError with structured information
fn map_sqlx_error(err: sqlx::Error) -> AppError {
    match &err {
        sqlx::Error::Database(db_err) => {
            if let Some(code) = db_err.code() {
                let code_str = code.as_ref();

                // SQLite error codes: https://www.sqlite.org/rescode.html
                match code_str {
                    "2067" | "1555" => AppError::Database(format!(
                        "Unique constraint violation: {} ({})",
                        db_err.message(),
                        code_str
                    )),
                    "5" => AppError::Database(format!(
                        "Database locked (SQLITE_BUSY): {}",
                        db_err.message()
                    )),
                    "13" => AppError::Database(format!("Database full: {}", db_err.message())),
                    _ => AppError::Database(format!(
                        "Database error [{}]: {}",
                        code_str,
                        db_err.message()
                    )),
                }
            } else {
                AppError::Database(format!("Database error: {}", db_err.message()))
            }
        }
        sqlx::Error::RowNotFound => AppError::Database("Row not found".to_string()),
        sqlx::Error::ColumnNotFound(col) => {
            AppError::Database(format!("Column not found: {}", col))
        }
        _ => AppError::Database(err.to_string()),
    }
}

pub struct SqliteWorkQueue {
    pool: SqlitePool,
}

impl SqliteWorkQueue {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl WorkQueue for SqliteWorkQueue {
    async fn insert(&self, item: &WorkItem) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO work_items (
                id, stage, target, label, status, result_payload,
                claimed_at, error_detail, recovery_note, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&item.id)
        .bind(item.stage.as_str())
        .bind(&item.target)
        .bind(&item.label)
        .bind(item.status.to_string())
        .bind(item.result_payload.to_string())
        .bind(item.claimed_at)
        .bind(&item.error_detail)
        .bind(&item.recovery_note)
        .bind(item.created_at)
        .bind(item.updated_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn insert_many(&self, items: &[WorkItem]) -> Result<u64> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;
        let mut inserted = 0u64;

        for item in items {
            // Dedup on (stage, target): re-discovered targets are ignored
            let result = sqlx::query(
                r#"
                INSERT OR IGNORE INTO work_items (
                    id, stage, target, label, status, result_payload,
                    claimed_at, error_detail, recovery_note, created_at, updated_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&item.id)
            .bind(item.stage.as_str())
            .bind(&item.target)
            .bind(&item.label)
            .bind(item.status.to_string())
            .bind(item.result_payload.to_string())
            .bind(item.claimed_at)
            .bind(&item.error_detail)
            .bind(&item.recovery_note)
            .bind(item.created_at)
            .bind(item.updated_at)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

            inserted += result.rows_affected();
        }

        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(inserted)
    }

    async fn find_by_id(&self, id: &WorkItemId) -> Result<Option<WorkItem>> {
        let row = sqlx::query_as::<_, WorkItemRow>("SELECT * FROM work_items WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        row.map(|r| r.into_item()).transpose()
    }

    async fn find_claimable(&self, stage: Stage, limit: u32) -> Result<Vec<WorkItem>> {
        let rows: Vec<WorkItemRow> = sqlx::query_as(
            r#"
            SELECT * FROM work_items
            WHERE stage = ? AND status = 'pending'
            ORDER BY created_at ASC, id ASC
            LIMIT ?
            "#,
        )
        .bind(stage.as_str())
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows.into_iter().map(|r| r.into_item()).collect()
    }

    async fn try_claim(&self, id: &WorkItemId, claimed_at: i64) -> Result<bool> {
        // CAS on status = pending: exactly one concurrent claimer wins
        let result = sqlx::query(
            r#"
            UPDATE work_items
            SET status = 'processing', claimed_at = ?, updated_at = ?
            WHERE id = ? AND status = 'pending'
            "#,
        )
        .bind(claimed_at)
        .bind(claimed_at)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() == 1)
    }

    async fn record_outcome(
        &self,
        id: &WorkItemId,
        status: &WorkStatus,
        result_payload: &serde_json::Value,
        error_detail: Option<&str>,
        now_millis: i64,
    ) -> Result<bool> {
        // Conditional on processing: an item released by a sweep or finished
        // elsewhere is never overwritten
        let result = sqlx::query(
            r#"
            UPDATE work_items
            SET status = ?, result_payload = ?, error_detail = ?,
                claimed_at = NULL, updated_at = ?
            WHERE id = ? AND status = 'processing'
            "#,
        )
        .bind(status.to_string())
        .bind(result_payload.to_string())
        .bind(error_detail)
        .bind(now_millis)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() == 1)
    }

    async fn release_stale(
        &self,
        stage: Stage,
        cutoff_millis: i64,
        note: &str,
        now_millis: i64,
    ) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE work_items
            SET status = 'pending', claimed_at = NULL, recovery_note = ?, updated_at = ?
            WHERE stage = ? AND status = 'processing'
              AND (claimed_at IS NULL OR claimed_at < ?)
            "#,
        )
        .bind(note)
        .bind(now_millis)
        .bind(stage.as_str())
        .bind(cutoff_millis)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected())
    }

    async fn count_pending(&self, stage: Stage) -> Result<u64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM work_items WHERE stage = ? AND status = 'pending'",
        )
        .bind(stage.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(count as u64)
    }

    async fn stats(&self, stage: Stage) -> Result<QueueStats> {
        let row: (i64, i64, i64, i64, i64, i64, i64) = sqlx::query_as(
            r#"
            SELECT
                COUNT(*),
                COALESCE(SUM(CASE WHEN status = 'pending' THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN status = 'processing' THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN status = 'found' THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN status = 'checked_no_email' THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN status LIKE 'failed_%' THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN status LIKE 'skipped_%' THEN 1 ELSE 0 END), 0)
            FROM work_items
            WHERE stage = ?
            "#,
        )
        .bind(stage.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(QueueStats {
            total: row.0 as u64,
            pending: row.1 as u64,
            processing: row.2 as u64,
            found: row.3 as u64,
            checked_no_email: row.4 as u64,
            failed: row.5 as u64,
            skipped: row.6 as u64,
        })
    }
}

/// SQLite row representation
#[derive(Debug, sqlx::FromRow)]
struct WorkItemRow {
    id: String,
    stage: String,
    target: String,
    label: Option<String>,
    status: String,
    result_payload: String,
    claimed_at: Option<i64>,
    error_detail: Option<String>,
    recovery_note: Option<String>,
    created_at: i64,
    updated_at: i64,
}

impl WorkItemRow {
    fn into_item(self) -> Result<WorkItem> {
        let stage: Stage = self.stage.parse()?;
        let status: WorkStatus = self.status.parse()?;
        let result_payload: serde_json::Value =
            serde_json::from_str(&self.result_payload).unwrap_or(serde_json::json!([]));

        Ok(WorkItem {
            id: self.id,
            stage,
            target: self.target,
            label: self.label,
            status,
            result_payload,
            claimed_at: self.claimed_at,
            error_detail: self.error_detail,
            recovery_note: self.recovery_note,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{create_pool, run_migrations};
    use leadharvest_core::domain::{FailureReason, SkipReason};

    async fn setup_test_db() -> SqliteWorkQueue {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        SqliteWorkQueue::new(pool)
    }

    fn item(id: &str, stage: Stage, target: &str) -> WorkItem {
        WorkItem::new(id, stage, target, 1000)
    }

    #[tokio::test]
    async fn test_insert_and_find() {
        let queue = setup_test_db().await;
        let mut it = item("w1", Stage::EmailHarvest, "https://acme.co.uk");
        it.label = Some("Acme Ltd".to_string());
        queue.insert(&it).await.unwrap();

        let found = queue.find_by_id(&"w1".to_string()).await.unwrap().unwrap();
        assert_eq!(found.target, "https://acme.co.uk");
        assert_eq!(found.label.as_deref(), Some("Acme Ltd"));
        assert_eq!(found.status, WorkStatus::Pending);
    }

    #[tokio::test]
    async fn test_claim_is_exclusive() {
        let queue = setup_test_db().await;
        queue
            .insert(&item("w1", Stage::EmailHarvest, "https://acme.co.uk"))
            .await
            .unwrap();

        assert!(queue.try_claim(&"w1".to_string(), 2000).await.unwrap());
        // Second claim loses the CAS
        assert!(!queue.try_claim(&"w1".to_string(), 2001).await.unwrap());

        let claimed = queue.find_by_id(&"w1".to_string()).await.unwrap().unwrap();
        assert_eq!(claimed.status, WorkStatus::Processing);
        assert_eq!(claimed.claimed_at, Some(2000));
    }

    #[tokio::test]
    async fn test_insert_many_dedups_on_stage_target() {
        let queue = setup_test_db().await;
        queue
            .insert(&item("w1", Stage::EmailHarvest, "https://acme.co.uk"))
            .await
            .unwrap();

        let batch = vec![
            item("w2", Stage::EmailHarvest, "https://acme.co.uk"), // dup
            item("w3", Stage::EmailHarvest, "https://other.co.uk"),
            // Same target, different stage is a distinct unit of work
            item("w4", Stage::BusinessDiscovery, "https://acme.co.uk"),
        ];
        let inserted = queue.insert_many(&batch).await.unwrap();
        assert_eq!(inserted, 2);
    }

    #[tokio::test]
    async fn test_record_outcome_requires_processing() {
        let queue = setup_test_db().await;
        queue
            .insert(&item("w1", Stage::EmailHarvest, "https://acme.co.uk"))
            .await
            .unwrap();

        // Not yet claimed: outcome is rejected
        let recorded = queue
            .record_outcome(
                &"w1".to_string(),
                &WorkStatus::Found,
                &serde_json::json!(["a@acme.co.uk"]),
                None,
                3000,
            )
            .await
            .unwrap();
        assert!(!recorded);

        queue.try_claim(&"w1".to_string(), 2000).await.unwrap();
        let recorded = queue
            .record_outcome(
                &"w1".to_string(),
                &WorkStatus::Found,
                &serde_json::json!(["a@acme.co.uk"]),
                None,
                3000,
            )
            .await
            .unwrap();
        assert!(recorded);

        let done = queue.find_by_id(&"w1".to_string()).await.unwrap().unwrap();
        assert_eq!(done.status, WorkStatus::Found);
        assert_eq!(done.claimed_at, None);
        assert_eq!(done.result_payload, serde_json::json!(["a@acme.co.uk"]));

        // Terminal items are never overwritten
        let again = queue
            .record_outcome(
                &"w1".to_string(),
                &WorkStatus::CheckedNoEmail,
                &serde_json::json!([]),
                None,
                4000,
            )
            .await
            .unwrap();
        assert!(!again);
    }

    #[tokio::test]
    async fn test_release_stale_is_idempotent() {
        let queue = setup_test_db().await;
        queue
            .insert(&item("old", Stage::EmailHarvest, "https://old.co.uk"))
            .await
            .unwrap();
        queue
            .insert(&item("new", Stage::EmailHarvest, "https://new.co.uk"))
            .await
            .unwrap();
        queue.try_claim(&"old".to_string(), 1000).await.unwrap();
        queue.try_claim(&"new".to_string(), 90_000).await.unwrap();

        let released = queue
            .release_stale(Stage::EmailHarvest, 50_000, "swept", 100_000)
            .await
            .unwrap();
        assert_eq!(released, 1);

        let old = queue.find_by_id(&"old".to_string()).await.unwrap().unwrap();
        assert_eq!(old.status, WorkStatus::Pending);
        assert_eq!(old.claimed_at, None);
        assert_eq!(old.recovery_note.as_deref(), Some("swept"));

        // Second sweep finds nothing
        let released = queue
            .release_stale(Stage::EmailHarvest, 50_000, "swept", 100_001)
            .await
            .unwrap();
        assert_eq!(released, 0);
    }

    #[tokio::test]
    async fn test_find_claimable_is_fifo() {
        let queue = setup_test_db().await;
        for (i, target) in ["https://a.co.uk", "https://b.co.uk", "https://c.co.uk"]
            .iter()
            .enumerate()
        {
            let mut it = item(&format!("w{}", i), Stage::EmailHarvest, target);
            it.created_at = i as i64;
            queue.insert(&it).await.unwrap();
        }

        let claimable = queue.find_claimable(Stage::EmailHarvest, 2).await.unwrap();
        assert_eq!(claimable.len(), 2);
        assert_eq!(claimable[0].target, "https://a.co.uk");
        assert_eq!(claimable[1].target, "https://b.co.uk");
    }

    #[tokio::test]
    async fn test_stats_buckets_by_status() {
        let queue = setup_test_db().await;
        for (i, target) in ["a", "b", "c", "d"].iter().enumerate() {
            queue
                .insert(&item(
                    &format!("w{}", i),
                    Stage::EmailHarvest,
                    &format!("https://{}.co.uk", target),
                ))
                .await
                .unwrap();
        }
        queue.try_claim(&"w0".to_string(), 2000).await.unwrap();
        queue
            .record_outcome(
                &"w0".to_string(),
                &WorkStatus::Failed(FailureReason::CircuitBreaker),
                &serde_json::json!([]),
                Some("circuit open"),
                3000,
            )
            .await
            .unwrap();
        queue.try_claim(&"w1".to_string(), 2000).await.unwrap();
        queue
            .record_outcome(
                &"w1".to_string(),
                &WorkStatus::Skipped(SkipReason::Shutdown),
                &serde_json::json!([]),
                None,
                3000,
            )
            .await
            .unwrap();
        queue.try_claim(&"w2".to_string(), 2000).await.unwrap();

        let stats = queue.stats(Stage::EmailHarvest).await.unwrap();
        assert_eq!(stats.total, 4);
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.processing, 1);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.skipped, 1);

        // Other stage is untouched
        let other = queue.stats(Stage::BusinessDiscovery).await.unwrap();
        assert_eq!(other.total, 0);
    }
}
