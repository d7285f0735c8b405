// Work Queue Port (Interface)
//
// Durable claimable queue of work items. The claim protocol is
// compare-and-set: `try_claim` only succeeds if the item is still pending,
// and `record_outcome` only succeeds if the item is still processing.

use crate::domain::{Stage, WorkItem, WorkItemId, WorkStatus};
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Per-stage queue counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub pending: u64,
    pub processing: u64,
    pub found: u64,
    pub checked_no_email: u64,
    pub failed: u64,
    pub skipped: u64,
    pub total: u64,
}

/// Work queue interface
#[async_trait]
pub trait WorkQueue: Send + Sync {
    /// Insert a new item
    async fn insert(&self, item: &WorkItem) -> Result<()>;

    /// Insert a batch, skipping items whose (stage, target) already exists.
    /// Returns the number actually inserted.
    async fn insert_many(&self, items: &[WorkItem]) -> Result<u64>;

    /// Find item by ID
    async fn find_by_id(&self, id: &WorkItemId) -> Result<Option<WorkItem>>;

    /// Pending items for a stage, oldest first, up to `limit`
    async fn find_claimable(&self, stage: Stage, limit: u32) -> Result<Vec<WorkItem>>;

    /// Atomically move a pending item to processing.
    /// Returns false if another claimer got it first.
    async fn try_claim(&self, id: &WorkItemId, claimed_at: i64) -> Result<bool>;

    /// Record a terminal outcome for a processing item.
    /// Returns false if the item is no longer processing (already terminal
    /// or released by a recovery sweep).
    async fn record_outcome(
        &self,
        id: &WorkItemId,
        status: &WorkStatus,
        result_payload: &serde_json::Value,
        error_detail: Option<&str>,
        now_millis: i64,
    ) -> Result<bool>;

    /// Return processing items claimed before `cutoff_millis` to pending,
    /// stamping `note` on each. Returns the number released.
    async fn release_stale(
        &self,
        stage: Stage,
        cutoff_millis: i64,
        note: &str,
        now_millis: i64,
    ) -> Result<u64>;

    /// Count pending items for a stage
    async fn count_pending(&self, stage: Stage) -> Result<u64>;

    /// Status counters for a stage
    async fn stats(&self, stage: Stage) -> Result<QueueStats>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    /// In-memory queue preserving insertion order (FIFO claims)
    pub struct InMemoryWorkQueue {
        items: Mutex<Vec<WorkItem>>,
        fail_writes: AtomicBool,
    }

    impl InMemoryWorkQueue {
        pub fn new() -> Self {
            Self {
                items: Mutex::new(Vec::new()),
                fail_writes: AtomicBool::new(false),
            }
        }

        /// Make every write after this call fail (store outage simulation)
        pub fn set_fail_writes(&self, fail: bool) {
            self.fail_writes.store(fail, Ordering::SeqCst);
        }

        pub fn snapshot(&self) -> Vec<WorkItem> {
            self.items.lock().unwrap().clone()
        }

        fn check_writable(&self) -> Result<()> {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(crate::error::AppError::Database(
                    "simulated store outage".to_string(),
                ));
            }
            Ok(())
        }
    }

    impl Default for InMemoryWorkQueue {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl WorkQueue for InMemoryWorkQueue {
        async fn insert(&self, item: &WorkItem) -> Result<()> {
            self.check_writable()?;
            self.items.lock().unwrap().push(item.clone());
            Ok(())
        }

        async fn insert_many(&self, items: &[WorkItem]) -> Result<u64> {
            self.check_writable()?;
            let mut guard = self.items.lock().unwrap();
            let mut inserted = 0;
            for item in items {
                let exists = guard
                    .iter()
                    .any(|i| i.stage == item.stage && i.target == item.target);
                if !exists {
                    guard.push(item.clone());
                    inserted += 1;
                }
            }
            Ok(inserted)
        }

        async fn find_by_id(&self, id: &WorkItemId) -> Result<Option<WorkItem>> {
            Ok(self
                .items
                .lock()
                .unwrap()
                .iter()
                .find(|i| &i.id == id)
                .cloned())
        }

        async fn find_claimable(&self, stage: Stage, limit: u32) -> Result<Vec<WorkItem>> {
            Ok(self
                .items
                .lock()
                .unwrap()
                .iter()
                .filter(|i| i.stage == stage && i.status == WorkStatus::Pending)
                .take(limit as usize)
                .cloned()
                .collect())
        }

        async fn try_claim(&self, id: &WorkItemId, claimed_at: i64) -> Result<bool> {
            self.check_writable()?;
            let mut guard = self.items.lock().unwrap();
            match guard.iter_mut().find(|i| &i.id == id) {
                Some(item) if item.status == WorkStatus::Pending => {
                    item.claim(claimed_at)?;
                    Ok(true)
                }
                _ => Ok(false),
            }
        }

        async fn record_outcome(
            &self,
            id: &WorkItemId,
            status: &WorkStatus,
            result_payload: &serde_json::Value,
            error_detail: Option<&str>,
            now_millis: i64,
        ) -> Result<bool> {
            self.check_writable()?;
            let mut guard = self.items.lock().unwrap();
            match guard.iter_mut().find(|i| &i.id == id) {
                Some(item) if item.status == WorkStatus::Processing => {
                    item.finish(
                        status.clone(),
                        result_payload.clone(),
                        error_detail.map(|s| s.to_string()),
                        now_millis,
                    )?;
                    Ok(true)
                }
                _ => Ok(false),
            }
        }

        async fn release_stale(
            &self,
            stage: Stage,
            cutoff_millis: i64,
            note: &str,
            now_millis: i64,
        ) -> Result<u64> {
            self.check_writable()?;
            let mut guard = self.items.lock().unwrap();
            let mut released = 0;
            for item in guard.iter_mut() {
                let stale = item.stage == stage
                    && item.status == WorkStatus::Processing
                    && item.claimed_at.map(|t| t < cutoff_millis).unwrap_or(true);
                if stale {
                    item.release(note, now_millis)?;
                    released += 1;
                }
            }
            Ok(released)
        }

        async fn count_pending(&self, stage: Stage) -> Result<u64> {
            Ok(self
                .items
                .lock()
                .unwrap()
                .iter()
                .filter(|i| i.stage == stage && i.status == WorkStatus::Pending)
                .count() as u64)
        }

        async fn stats(&self, stage: Stage) -> Result<QueueStats> {
            let guard = self.items.lock().unwrap();
            let mut stats = QueueStats::default();
            for item in guard.iter().filter(|i| i.stage == stage) {
                stats.total += 1;
                match &item.status {
                    WorkStatus::Pending => stats.pending += 1,
                    WorkStatus::Processing => stats.processing += 1,
                    WorkStatus::Found => stats.found += 1,
                    WorkStatus::CheckedNoEmail => stats.checked_no_email += 1,
                    WorkStatus::Failed(_) => stats.failed += 1,
                    WorkStatus::Skipped(_) => stats.skipped += 1,
                }
            }
            Ok(stats)
        }
    }
}
