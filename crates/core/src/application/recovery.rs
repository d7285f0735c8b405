// Stale Claim Recovery
//
// Items claimed by a run that crashed or was killed stay in `processing`
// forever unless swept. The sweep returns processing items whose claim is
// older than the cutoff back to `pending`, stamping a recovery note.
// Runs on daemon startup and on demand via the API.

use std::sync::Arc;

use tracing::info;

use crate::application::constants::{DEFAULT_STALE_CLAIM_MAX_AGE_MS, STALE_RECOVERY_NOTE};
use crate::domain::Stage;
use crate::error::Result;
use crate::port::{TimeProvider, WorkQueue};

/// Sweeps abandoned claims back to pending
pub struct StaleClaimSweeper {
    queue: Arc<dyn WorkQueue>,
    time_provider: Arc<dyn TimeProvider>,
    max_age_ms: i64,
}

impl StaleClaimSweeper {
    pub fn new(
        queue: Arc<dyn WorkQueue>,
        time_provider: Arc<dyn TimeProvider>,
        max_age_ms: Option<i64>,
    ) -> Self {
        Self {
            queue,
            time_provider,
            max_age_ms: max_age_ms.unwrap_or(DEFAULT_STALE_CLAIM_MAX_AGE_MS),
        }
    }

    /// Release stale claims for one stage. Returns the number released.
    pub async fn recover_stale(&self, stage: Stage) -> Result<u64> {
        let now = self.time_provider.now_millis();
        let cutoff = now - self.max_age_ms;

        let released = self
            .queue
            .release_stale(stage, cutoff, STALE_RECOVERY_NOTE, now)
            .await?;

        if released > 0 {
            info!(
                stage = %stage,
                released = %released,
                max_age_ms = %self.max_age_ms,
                "Released stale claims"
            );
        }
        Ok(released)
    }

    /// Sweep every stage (daemon startup)
    pub async fn recover_all(&self) -> Result<u64> {
        let mut total = 0;
        for stage in [Stage::BusinessDiscovery, Stage::EmailHarvest] {
            total += self.recover_stale(stage).await?;
        }
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{WorkItem, WorkStatus};
    use crate::port::time_provider::mocks::FixedTimeProvider;
    use crate::port::work_queue::mocks::InMemoryWorkQueue;

    #[tokio::test]
    async fn releases_only_stale_claims() {
        let queue = Arc::new(InMemoryWorkQueue::new());
        let clock = Arc::new(FixedTimeProvider::new(100_000));

        // Stale claim (claimed long ago)
        let stale = WorkItem::new("stale", Stage::EmailHarvest, "a.co.uk", 0);
        queue.insert(&stale).await.unwrap();
        queue.try_claim(&"stale".to_string(), 10_000).await.unwrap();

        // Fresh claim
        let fresh = WorkItem::new("fresh", Stage::EmailHarvest, "b.co.uk", 0);
        queue.insert(&fresh).await.unwrap();
        queue.try_claim(&"fresh".to_string(), 95_000).await.unwrap();

        // Terminal item must never be touched
        let done = WorkItem::new("done", Stage::EmailHarvest, "c.co.uk", 0);
        queue.insert(&done).await.unwrap();
        queue.try_claim(&"done".to_string(), 10_000).await.unwrap();
        queue
            .record_outcome(
                &"done".to_string(),
                &WorkStatus::Found,
                &serde_json::json!(["x@c.co.uk"]),
                None,
                20_000,
            )
            .await
            .unwrap();

        let sweeper = StaleClaimSweeper::new(queue.clone(), clock, Some(60_000));
        let released = sweeper.recover_stale(Stage::EmailHarvest).await.unwrap();
        assert_eq!(released, 1);

        let stale = queue.find_by_id(&"stale".to_string()).await.unwrap().unwrap();
        assert_eq!(stale.status, WorkStatus::Pending);
        assert!(stale.recovery_note.is_some());

        let fresh = queue.find_by_id(&"fresh".to_string()).await.unwrap().unwrap();
        assert_eq!(fresh.status, WorkStatus::Processing);

        let done = queue.find_by_id(&"done".to_string()).await.unwrap().unwrap();
        assert_eq!(done.status, WorkStatus::Found);
    }

    #[tokio::test]
    async fn sweep_is_idempotent() {
        let queue = Arc::new(InMemoryWorkQueue::new());
        let clock = Arc::new(FixedTimeProvider::new(100_000));
        let item = WorkItem::new("w1", Stage::BusinessDiscovery, "M1 1", 0);
        queue.insert(&item).await.unwrap();
        queue.try_claim(&"w1".to_string(), 5_000).await.unwrap();

        let sweeper = StaleClaimSweeper::new(queue.clone(), clock, Some(60_000));
        assert_eq!(sweeper.recover_stale(Stage::BusinessDiscovery).await.unwrap(), 1);
        assert_eq!(sweeper.recover_stale(Stage::BusinessDiscovery).await.unwrap(), 0);
    }
}
