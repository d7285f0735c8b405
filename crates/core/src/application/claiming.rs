// Batch Claiming
//
// Claims are two-step: list pending candidates, then compare-and-set each
// one to processing. A candidate lost to a concurrent claimer is skipped,
// never processed twice.

use std::sync::Arc;

use tracing::debug;

use crate::domain::{Stage, WorkItem};
use crate::error::Result;
use crate::port::{TimeProvider, WorkQueue};

/// Claims batches of pending work for one stage
pub struct Claimer {
    queue: Arc<dyn WorkQueue>,
    time_provider: Arc<dyn TimeProvider>,
    stage: Stage,
}

impl Claimer {
    pub fn new(
        queue: Arc<dyn WorkQueue>,
        time_provider: Arc<dyn TimeProvider>,
        stage: Stage,
    ) -> Self {
        Self {
            queue,
            time_provider,
            stage,
        }
    }

    /// Claim up to `max_items` pending items, oldest first.
    ///
    /// Returns only items this claimer won; items grabbed by a concurrent
    /// claimer between the listing and the CAS are silently skipped.
    pub async fn claim_batch(&self, max_items: u32) -> Result<Vec<WorkItem>> {
        let candidates = self.queue.find_claimable(self.stage, max_items).await?;
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let now = self.time_provider.now_millis();
        let mut claimed = Vec::with_capacity(candidates.len());
        for mut item in candidates {
            if self.queue.try_claim(&item.id, now).await? {
                item.claim(now)?;
                claimed.push(item);
            } else {
                debug!(item_id = %item.id, "Lost claim race, skipping");
            }
        }

        debug!(
            stage = %self.stage,
            claimed = claimed.len(),
            "Claimed batch"
        );
        Ok(claimed)
    }

    /// Pending items still waiting for this stage
    pub async fn pending_remaining(&self) -> Result<u64> {
        self.queue.count_pending(self.stage).await
    }
}
