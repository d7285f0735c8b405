// Batch Worker Pool
//
// Batch-synchronous processing loop: claim a batch, process it with bounded
// concurrency, wait for the whole batch, pause, repeat until the queue
// drains or cancellation is requested. A permit is acquired before each
// dispatch, so cancellation between dispatches leaves the remaining claimed
// items marked `skipped_shutdown` instead of abandoned in `processing`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::application::cancel::CancelToken;
use crate::application::circuit_breaker::CircuitBreaker;
use crate::application::claiming::Claimer;
use crate::application::constants::{
    DEFAULT_BATCH_SIZE, DEFAULT_CONCURRENCY, DEFAULT_INTER_BATCH_DELAY, MAX_EMAILS_PER_ITEM,
};
use crate::domain::{FailureReason, RunStats, SkipReason, Stage, WorkItem, WorkStatus};
use crate::error::{AppError, Result};
use crate::port::{IdProvider, ProcessError, SiteProcessor, TimeProvider, WorkQueue};

/// Pool tuning
#[derive(Debug, Clone)]
pub struct BatchPoolConfig {
    /// Items claimed per batch
    pub batch_size: u32,
    /// Concurrent collaborator slots within a batch
    pub concurrency: usize,
    /// Pause between batches
    pub inter_batch_delay: Duration,
    /// Cap on items processed in this run
    pub limit: Option<u64>,
}

impl Default for BatchPoolConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            concurrency: DEFAULT_CONCURRENCY,
            inter_batch_delay: DEFAULT_INTER_BATCH_DELAY,
            limit: None,
        }
    }
}

/// How a pool run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolOutcome {
    /// No pending items remain (or the run limit was reached)
    Drained,
    /// Cancellation was requested mid-run
    Cancelled,
}

/// Live run counters, shared between the pool and the job manager
#[derive(Debug, Default)]
pub struct StatsCell {
    processed: AtomicU64,
    found: AtomicU64,
    checked_no_email: AtomicU64,
    failed: AtomicU64,
    skipped: AtomicU64,
    results_collected: AtomicU64,
}

impl StatsCell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> RunStats {
        RunStats {
            processed: self.processed.load(Ordering::SeqCst),
            found: self.found.load(Ordering::SeqCst),
            checked_no_email: self.checked_no_email.load(Ordering::SeqCst),
            failed: self.failed.load(Ordering::SeqCst),
            skipped: self.skipped.load(Ordering::SeqCst),
            results_collected: self.results_collected.load(Ordering::SeqCst),
        }
    }

    /// Fold another run's counters in (workflow parents absorb child runs)
    pub(crate) fn absorb(&self, other: RunStats) {
        self.processed.fetch_add(other.processed, Ordering::SeqCst);
        self.found.fetch_add(other.found, Ordering::SeqCst);
        self.checked_no_email
            .fetch_add(other.checked_no_email, Ordering::SeqCst);
        self.failed.fetch_add(other.failed, Ordering::SeqCst);
        self.skipped.fetch_add(other.skipped, Ordering::SeqCst);
        self.results_collected
            .fetch_add(other.results_collected, Ordering::SeqCst);
    }

    fn record(&self, status: &WorkStatus) {
        self.processed.fetch_add(1, Ordering::SeqCst);
        match status {
            WorkStatus::Found => self.found.fetch_add(1, Ordering::SeqCst),
            WorkStatus::CheckedNoEmail => self.checked_no_email.fetch_add(1, Ordering::SeqCst),
            WorkStatus::Failed(_) => self.failed.fetch_add(1, Ordering::SeqCst),
            WorkStatus::Skipped(_) => self.skipped.fetch_add(1, Ordering::SeqCst),
            // Non-terminal statuses are never recorded as outcomes
            WorkStatus::Pending | WorkStatus::Processing => 0,
        };
    }

    pub(crate) fn add_collected(&self, n: u64) {
        self.results_collected.fetch_add(n, Ordering::SeqCst);
    }
}

struct PoolInner {
    queue: Arc<dyn WorkQueue>,
    processor: Arc<dyn SiteProcessor>,
    breaker: Arc<CircuitBreaker>,
    time_provider: Arc<dyn TimeProvider>,
    id_provider: Arc<dyn IdProvider>,
    stage: Stage,
    /// Stage discovered follow-up items are queued for
    next_stage: Option<Stage>,
}

/// Batch-synchronous worker pool for one stage
pub struct BatchPool {
    inner: Arc<PoolInner>,
    claimer: Claimer,
    config: BatchPoolConfig,
}

impl BatchPool {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        queue: Arc<dyn WorkQueue>,
        processor: Arc<dyn SiteProcessor>,
        breaker: Arc<CircuitBreaker>,
        time_provider: Arc<dyn TimeProvider>,
        id_provider: Arc<dyn IdProvider>,
        stage: Stage,
        next_stage: Option<Stage>,
        config: BatchPoolConfig,
    ) -> Self {
        let claimer = Claimer::new(queue.clone(), time_provider.clone(), stage);
        Self {
            inner: Arc::new(PoolInner {
                queue,
                processor,
                breaker,
                time_provider,
                id_provider,
                stage,
                next_stage,
            }),
            claimer,
            config,
        }
    }

    /// Run until the stage's queue drains or cancellation is requested.
    ///
    /// Queue write failures are fatal: losing the ability to record
    /// outcomes would silently strand claimed items, so the run stops.
    pub async fn run(&self, stats: Arc<StatsCell>, mut cancel: CancelToken) -> Result<PoolOutcome> {
        let semaphore = Arc::new(Semaphore::new(self.config.concurrency));

        loop {
            if cancel.is_cancel_requested() {
                return Ok(PoolOutcome::Cancelled);
            }

            let batch_size = match self.config.limit {
                Some(limit) => {
                    let remaining = limit.saturating_sub(stats.processed());
                    if remaining == 0 {
                        info!(stage = %self.inner.stage, limit = %limit, "Run limit reached");
                        return Ok(PoolOutcome::Drained);
                    }
                    self.config.batch_size.min(remaining.min(u32::MAX as u64) as u32)
                }
                None => self.config.batch_size,
            };

            let batch = self.claimer.claim_batch(batch_size).await?;
            if batch.is_empty() {
                // Nothing claimed: drained if the queue is truly empty,
                // otherwise another claimer holds the pending items
                if self.claimer.pending_remaining().await? == 0 {
                    return Ok(PoolOutcome::Drained);
                }
                tokio::select! {
                    _ = tokio::time::sleep(self.config.inter_batch_delay) => {}
                    _ = cancel.cancelled() => return Ok(PoolOutcome::Cancelled),
                }
                continue;
            }
            debug!(stage = %self.inner.stage, batch_len = batch.len(), "Processing batch");

            let cancelled = self
                .process_batch(batch, &stats, &semaphore, &mut cancel)
                .await?;
            if cancelled {
                return Ok(PoolOutcome::Cancelled);
            }

            tokio::select! {
                _ = tokio::time::sleep(self.config.inter_batch_delay) => {}
                _ = cancel.cancelled() => return Ok(PoolOutcome::Cancelled),
            }
        }
    }

    /// Process one claimed batch to completion. Returns true if cancellation
    /// interrupted the batch.
    async fn process_batch(
        &self,
        batch: Vec<WorkItem>,
        stats: &Arc<StatsCell>,
        semaphore: &Arc<Semaphore>,
        cancel: &mut CancelToken,
    ) -> Result<bool> {
        let mut join_set = JoinSet::new();
        let mut in_flight: HashMap<tokio::task::Id, WorkItem> = HashMap::new();
        let mut unsubmitted: Vec<WorkItem> = Vec::new();

        for item in batch {
            if cancel.is_cancel_requested() {
                unsubmitted.push(item);
                continue;
            }
            // Permit first, then dispatch: keeps cancellation points between
            // every dispatch instead of only between batches
            let permit = tokio::select! {
                permit = semaphore.clone().acquire_owned() => {
                    permit.map_err(|e| AppError::Internal(format!("pool semaphore closed: {}", e)))?
                }
                _ = cancel.cancelled() => {
                    unsubmitted.push(item);
                    continue;
                }
            };

            let inner = self.inner.clone();
            let stats = stats.clone();
            let task_item = item.clone();
            let handle = join_set.spawn(async move {
                let _permit = permit;
                inner.process_one(&task_item, &stats).await
            });
            in_flight.insert(handle.id(), item);
        }

        // Claimed but never dispatched: release as skipped, not abandoned
        for item in unsubmitted {
            self.inner
                .record(&item, WorkStatus::Skipped(SkipReason::Shutdown), None, stats)
                .await?;
        }

        let mut first_error: Option<AppError> = None;
        while let Some(joined) = join_set.join_next_with_id().await {
            match joined {
                Ok((id, Ok(()))) => {
                    in_flight.remove(&id);
                }
                Ok((id, Err(e))) => {
                    in_flight.remove(&id);
                    error!(error = %e, "Batch worker failed to record outcome");
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
                Err(join_err) => {
                    // A panicking worker must not take the run down; the item
                    // it held gets a terminal failure instead
                    let task_id = join_err.id();
                    if let Some(item) = in_flight.remove(&task_id) {
                        warn!(
                            item_id = %item.id,
                            target = %item.target,
                            "Worker panicked, marking item failed"
                        );
                        self.inner
                            .record(
                                &item,
                                WorkStatus::Failed(FailureReason::Unexpected),
                                Some(format!("worker panicked: {}", join_err)),
                                stats,
                            )
                            .await?;
                    }
                }
            }
        }

        if let Some(e) = first_error {
            return Err(e);
        }
        Ok(cancel.is_cancel_requested())
    }
}

impl PoolInner {
    /// Process a single claimed item end to end
    async fn process_one(&self, item: &WorkItem, stats: &Arc<StatsCell>) -> Result<()> {
        let domain = match item.domain() {
            Some(domain) => Some(domain),
            // Discovery targets are postcode subsectors, not URLs
            None if self.stage == Stage::BusinessDiscovery => None,
            None => {
                return self
                    .record(
                        item,
                        WorkStatus::Skipped(SkipReason::InvalidTarget),
                        Some(format!("target is not a usable URL: {}", item.target)),
                        stats,
                    )
                    .await;
            }
        };

        if let Some(domain) = &domain {
            if self.breaker.is_open(domain) {
                return self
                    .record(
                        item,
                        WorkStatus::Failed(FailureReason::CircuitBreaker),
                        Some(format!("circuit open for {}", domain)),
                        stats,
                    )
                    .await;
            }
        }

        match self.processor.process(item).await {
            Ok(outcome) => {
                if let Some(domain) = &domain {
                    if outcome.status.is_failed() {
                        self.breaker.record_failure(domain);
                    } else {
                        self.breaker.record_success(domain);
                    }
                }

                if !outcome.discovered.is_empty() {
                    self.enqueue_discovered(&outcome.discovered, stats).await?;
                }

                let payload = cap_payload(outcome.result_payload);
                self.record_with_payload(item, outcome.status, payload, outcome.error_detail, stats)
                    .await
            }
            Err(err) => {
                let (status, detail) = match &err {
                    ProcessError::Timeout(ms) => (
                        WorkStatus::Failed(FailureReason::DomainUnreachable),
                        format!("collaborator timed out after {}ms", ms),
                    ),
                    ProcessError::Crashed(msg) => (
                        WorkStatus::Failed(FailureReason::CollaboratorCrashed),
                        format!("collaborator crashed: {}", msg),
                    ),
                    ProcessError::SpawnFailed(msg) => (
                        WorkStatus::Failed(FailureReason::Unexpected),
                        format!("collaborator spawn failed: {}", msg),
                    ),
                    ProcessError::InvalidOutput(msg) => (
                        WorkStatus::Failed(FailureReason::Unexpected),
                        format!("collaborator output invalid: {}", msg),
                    ),
                };
                if let Some(domain) = &domain {
                    if matches!(err, ProcessError::Timeout(_) | ProcessError::Crashed(_)) {
                        self.breaker.record_failure(domain);
                    }
                }
                self.record(item, status, Some(detail), stats).await
            }
        }
    }

    /// Queue discovered follow-up items for the next stage
    async fn enqueue_discovered(
        &self,
        discovered: &[crate::port::DiscoveredItem],
        stats: &Arc<StatsCell>,
    ) -> Result<()> {
        let Some(next_stage) = self.next_stage else {
            return Ok(());
        };
        let now = self.time_provider.now_millis();
        let items: Vec<WorkItem> = discovered
            .iter()
            .map(|d| {
                let mut item =
                    WorkItem::new(self.id_provider.generate_id(), next_stage, &d.target, now);
                if let Some(label) = &d.label {
                    item = item.with_label(label);
                }
                item
            })
            .collect();
        let inserted = self.queue.insert_many(&items).await?;
        stats.add_collected(inserted);
        Ok(())
    }

    async fn record(
        &self,
        item: &WorkItem,
        status: WorkStatus,
        error_detail: Option<String>,
        stats: &Arc<StatsCell>,
    ) -> Result<()> {
        self.record_with_payload(
            item,
            status,
            serde_json::Value::Array(vec![]),
            error_detail,
            stats,
        )
        .await
    }

    async fn record_with_payload(
        &self,
        item: &WorkItem,
        status: WorkStatus,
        payload: serde_json::Value,
        error_detail: Option<String>,
        stats: &Arc<StatsCell>,
    ) -> Result<()> {
        let now = self.time_provider.now_millis();
        let recorded = self
            .queue
            .record_outcome(&item.id, &status, &payload, error_detail.as_deref(), now)
            .await?;
        if recorded {
            stats.record(&status);
        } else {
            // Item was released by a recovery sweep or finished elsewhere
            warn!(item_id = %item.id, status = %status, "Outcome not recorded, item no longer processing");
        }
        Ok(())
    }
}

/// Truncate an email array payload to the per-item cap
fn cap_payload(payload: serde_json::Value) -> serde_json::Value {
    match payload {
        serde_json::Value::Array(mut entries) if entries.len() > MAX_EMAILS_PER_ITEM => {
            entries.truncate(MAX_EMAILS_PER_ITEM);
            serde_json::Value::Array(entries)
        }
        other => other,
    }
}
