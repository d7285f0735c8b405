// Job Lifecycle Manager
//
// Starts, monitors, and terminates pipeline jobs. Each started job gets a
// spawned tokio worker, a cancellation channel, and a live counter cell;
// the registry of snapshots is persisted after every transition so terminal
// runs stay queryable after a restart. Snapshots are advisory; the work
// queue store remains the system of record.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::{error, info, warn};

use crate::application::cancel::{cancel_channel, CancelSource, CancelToken};
use crate::application::circuit_breaker::CircuitBreaker;
use crate::application::pool::{BatchPool, BatchPoolConfig, PoolOutcome, StatsCell};
use crate::application::recovery::StaleClaimSweeper;
use crate::domain::{JobId, JobKind, JobParams, JobSnapshot, JobStatus, Stage, WorkItem};
use crate::error::{AppError, Result};
use crate::port::{IdProvider, JobStore, PostcodeSource, SiteProcessor, TimeProvider, WorkQueue};

/// Everything a stage run needs, wired once at daemon startup
pub struct StageContext {
    pub queue: Arc<dyn WorkQueue>,
    pub postcode_source: Arc<dyn PostcodeSource>,
    pub business_processor: Arc<dyn SiteProcessor>,
    pub email_processor: Arc<dyn SiteProcessor>,
    pub breaker: Arc<CircuitBreaker>,
    pub time_provider: Arc<dyn TimeProvider>,
    pub id_provider: Arc<dyn IdProvider>,
    pub pool_config: BatchPoolConfig,
    /// Claims older than this are released by the pre-run sweep
    pub stale_claim_max_age_ms: Option<i64>,
    /// How often a workflow polls its running child
    pub workflow_poll_interval: std::time::Duration,
}

/// Live job state held while its worker runs
struct JobHandle {
    meta: Mutex<JobSnapshot>,
    stats: Arc<StatsCell>,
    cancel_source: CancelSource,
    cancel_token: CancelToken,
}

impl JobHandle {
    /// Snapshot with live counters folded in
    fn snapshot_now(&self) -> JobSnapshot {
        let mut snap = self.meta.lock().unwrap().clone();
        snap.stats = self.stats.snapshot();
        snap
    }
}

/// Job lifecycle manager
pub struct JobManager {
    ctx: StageContext,
    store: Arc<dyn JobStore>,
    registry: Mutex<HashMap<JobId, Arc<JobHandle>>>,
}

impl JobManager {
    pub fn new(ctx: StageContext, store: Arc<dyn JobStore>) -> Self {
        Self {
            ctx,
            store,
            registry: Mutex::new(HashMap::new()),
        }
    }

    /// Start a job and return its ID. The worker runs on a spawned task;
    /// progress is observed through `status`.
    pub fn start(self: &Arc<Self>, kind: JobKind, params: JobParams) -> Result<JobId> {
        if kind.requires_area() && params.area.as_deref().map_or(true, |a| a.trim().is_empty()) {
            return Err(AppError::Validation(format!(
                "job kind '{}' requires an 'area' parameter",
                kind
            )));
        }

        let job_id = self.ctx.id_provider.generate_id();
        let now = self.ctx.time_provider.now_millis();
        let snapshot = JobSnapshot::new(job_id.clone(), kind, params, now);

        let (cancel_source, cancel_token) = cancel_channel();
        let handle = Arc::new(JobHandle {
            meta: Mutex::new(snapshot.clone()),
            stats: Arc::new(StatsCell::new()),
            cancel_source,
            cancel_token,
        });
        self.registry
            .lock()
            .unwrap()
            .insert(job_id.clone(), handle.clone());
        self.persist(&snapshot);

        info!(job_id = %job_id, kind = %kind, "Job started");

        let manager = self.clone();
        let worker_job_id = job_id.clone();
        tokio::spawn(async move {
            manager.run_job(worker_job_id, kind, handle).await;
        });

        Ok(job_id)
    }

    /// Non-blocking snapshot: live registry first, then the persisted archive
    pub fn status(&self, job_id: &JobId) -> Result<JobSnapshot> {
        if let Some(handle) = self.registry.lock().unwrap().get(job_id) {
            return Ok(handle.snapshot_now());
        }
        self.store
            .load()?
            .remove(job_id)
            .ok_or_else(|| AppError::NotFound(format!("job not found: {}", job_id)))
    }

    /// Request cooperative termination. A live job is marked `terminating`;
    /// its worker observes the token, winds down, and finalizes the snapshot
    /// as `terminated`. Cascades to a recorded child job, including children
    /// of jobs that have already left the live registry.
    pub fn terminate(&self, job_id: &JobId) -> Result<JobSnapshot> {
        let handle = self.registry.lock().unwrap().get(job_id).cloned();
        let (snapshot, child) = match handle {
            Some(handle) => {
                handle.cancel_source.request_cancel();
                let pair = {
                    let mut meta = handle.meta.lock().unwrap();
                    if !meta.status.is_terminal() {
                        meta.status = JobStatus::Terminating;
                    }
                    meta.stats = handle.stats.snapshot();
                    (meta.clone(), meta.child_job_id.clone())
                };
                self.persist(&pair.0);
                info!(job_id = %job_id, "Job termination requested");
                pair
            }
            None => {
                // Archived jobs are already terminal; the persisted snapshot
                // still carries the child to cascade into
                let snapshot = self.status(job_id)?;
                let child = snapshot.child_job_id.clone();
                (snapshot, child)
            }
        };

        if let Some(child_id) = child {
            if let Err(e) = self.terminate(&child_id) {
                warn!(job_id = %job_id, child_job_id = %child_id, error = %e, "Child termination failed");
            }
        }
        Ok(snapshot)
    }

    /// Cancel every live job (daemon shutdown path). Workers finalize their
    /// own snapshots as `terminated`.
    pub fn request_shutdown(&self) {
        let handles: Vec<Arc<JobHandle>> =
            self.registry.lock().unwrap().values().cloned().collect();
        for handle in handles {
            if !handle.meta.lock().unwrap().status.is_terminal() {
                handle.cancel_source.request_cancel();
            }
        }
    }

    /// All known snapshots, live and archived
    pub fn list(&self) -> Result<Vec<JobSnapshot>> {
        let mut jobs = self.store.load()?;
        for handle in self.registry.lock().unwrap().values() {
            let snap = handle.snapshot_now();
            jobs.insert(snap.job_id.clone(), snap);
        }
        let mut list: Vec<JobSnapshot> = jobs.into_values().collect();
        list.sort_by_key(|s| std::cmp::Reverse(s.started_at));
        Ok(list)
    }

    // ------------------------------------------------------------------
    // Worker side
    // ------------------------------------------------------------------

    async fn run_job(self: Arc<Self>, job_id: JobId, kind: JobKind, handle: Arc<JobHandle>) {
        self.transition(&handle, JobStatus::Running, None);

        let result = match kind {
            JobKind::PostcodeDiscovery => self.run_postcode_stage(&handle).await,
            JobKind::BusinessDiscovery => {
                self.run_pool_stage(Stage::BusinessDiscovery, &handle).await
            }
            JobKind::EmailHarvest => self.run_pool_stage(Stage::EmailHarvest, &handle).await,
            JobKind::Workflow => self.run_workflow(&job_id, &handle).await,
        };

        match result {
            Ok(PoolOutcome::Drained) => {
                self.transition(&handle, JobStatus::Completed, None);
                self.maybe_chain(&job_id, kind, &handle);
                info!(job_id = %job_id, kind = %kind, "Job completed");
            }
            Ok(PoolOutcome::Cancelled) => {
                self.transition(&handle, JobStatus::Terminated, None);
                info!(job_id = %job_id, kind = %kind, "Job terminated");
            }
            Err(e) => {
                self.transition(&handle, JobStatus::Failed, Some(e.to_string()));
                error!(job_id = %job_id, kind = %kind, error = %e, "Job failed");
            }
        }

        // The terminal snapshot (with any chained child recorded) is in the
        // store; the live handle is no longer needed
        self.registry.lock().unwrap().remove(&job_id);
    }

    /// Start the successor kind as a child when `chain=true` and the run
    /// completed normally
    fn maybe_chain(self: &Arc<Self>, job_id: &JobId, kind: JobKind, handle: &Arc<JobHandle>) {
        let params = handle.meta.lock().unwrap().params.clone();
        if !params.chain || handle.cancel_token.is_cancel_requested() {
            return;
        }
        let Some(next_kind) = kind.chain_successor() else {
            return;
        };
        match self.start(next_kind, params) {
            Ok(child_id) => {
                let snapshot = {
                    let mut meta = handle.meta.lock().unwrap();
                    meta.child_job_id = Some(child_id.clone());
                    meta.clone()
                };
                self.persist(&snapshot);
                info!(job_id = %job_id, child_job_id = %child_id, kind = %next_kind, "Chained next stage");
            }
            Err(e) => {
                warn!(job_id = %job_id, error = %e, "Failed to chain next stage");
            }
        }
    }

    /// Page through the postcode source, queueing subsectors for discovery
    async fn run_postcode_stage(&self, handle: &Arc<JobHandle>) -> Result<PoolOutcome> {
        let params = handle.meta.lock().unwrap().params.clone();
        let area = params
            .area
            .as_deref()
            .ok_or_else(|| AppError::Validation("missing 'area' parameter".to_string()))?
            .to_string();

        let mut page = 0u32;
        loop {
            if handle.cancel_token.is_cancel_requested() {
                return Ok(PoolOutcome::Cancelled);
            }
            let fetched = self.ctx.postcode_source.fetch_page(&area, page).await?;
            let now = self.ctx.time_provider.now_millis();
            let items: Vec<WorkItem> = fetched
                .subsectors
                .iter()
                .map(|subsector| {
                    WorkItem::new(
                        self.ctx.id_provider.generate_id(),
                        Stage::BusinessDiscovery,
                        subsector,
                        now,
                    )
                })
                .collect();
            let inserted = self.ctx.queue.insert_many(&items).await?;
            handle.stats.add_collected(inserted);

            if !fetched.has_more {
                return Ok(PoolOutcome::Drained);
            }
            page += 1;
        }
    }

    /// Stale sweep, then batch pool over the stage queue
    async fn run_pool_stage(&self, stage: Stage, handle: &Arc<JobHandle>) -> Result<PoolOutcome> {
        let sweeper = StaleClaimSweeper::new(
            self.ctx.queue.clone(),
            self.ctx.time_provider.clone(),
            self.ctx.stale_claim_max_age_ms,
        );
        sweeper.recover_stale(stage).await?;

        let params = handle.meta.lock().unwrap().params.clone();
        let total = self.ctx.queue.count_pending(stage).await?;
        {
            let mut meta = handle.meta.lock().unwrap();
            meta.total_targets = Some(total);
        }

        let processor = match stage {
            Stage::BusinessDiscovery => self.ctx.business_processor.clone(),
            Stage::EmailHarvest => self.ctx.email_processor.clone(),
        };
        let next_stage = match stage {
            Stage::BusinessDiscovery => Some(Stage::EmailHarvest),
            Stage::EmailHarvest => None,
        };
        let mut config = self.ctx.pool_config.clone();
        config.limit = params.limit;

        let pool = BatchPool::new(
            self.ctx.queue.clone(),
            processor,
            self.ctx.breaker.clone(),
            self.ctx.time_provider.clone(),
            self.ctx.id_provider.clone(),
            stage,
            next_stage,
            config,
        );
        pool.run(handle.stats.clone(), handle.cancel_token.clone())
            .await
    }

    /// Run each pipeline stage as a child job, waiting for each in turn
    async fn run_workflow(
        self: &Arc<Self>,
        job_id: &JobId,
        handle: &Arc<JobHandle>,
    ) -> Result<PoolOutcome> {
        let params = {
            let meta = handle.meta.lock().unwrap();
            JobParams {
                chain: false,
                ..meta.params.clone()
            }
        };

        for kind in [
            JobKind::PostcodeDiscovery,
            JobKind::BusinessDiscovery,
            JobKind::EmailHarvest,
        ] {
            if handle.cancel_token.is_cancel_requested() {
                return Ok(PoolOutcome::Cancelled);
            }

            let child_id = self.start(kind, params.clone())?;
            let snapshot = {
                let mut meta = handle.meta.lock().unwrap();
                meta.child_job_id = Some(child_id.clone());
                meta.clone()
            };
            self.persist(&snapshot);

            let child_final = self.wait_for_child(&child_id, handle).await?;
            handle.stats.absorb(child_final.stats);
            match child_final.status {
                JobStatus::Completed => {}
                JobStatus::Terminated => return Ok(PoolOutcome::Cancelled),
                JobStatus::Failed => {
                    return Err(AppError::Internal(format!(
                        "child job {} ({}) failed: {}",
                        child_id,
                        kind,
                        child_final.error_detail.unwrap_or_default()
                    )));
                }
                other => {
                    return Err(AppError::InvalidState(format!(
                        "child job {} ended in non-terminal status {}",
                        child_id, other
                    )));
                }
            }
        }
        Ok(PoolOutcome::Drained)
    }

    /// Poll a child job until it reaches a terminal status. Cancellation of
    /// the parent terminates the child, then keeps polling until the child's
    /// worker has finalized its snapshot.
    async fn wait_for_child(
        &self,
        child_id: &JobId,
        handle: &Arc<JobHandle>,
    ) -> Result<JobSnapshot> {
        let mut cancel = handle.cancel_token.clone();
        loop {
            let child = self.status(child_id)?;
            if child.status.is_terminal() {
                return Ok(child);
            }
            if cancel.is_cancel_requested() {
                if child.status != JobStatus::Terminating {
                    self.terminate(child_id)?;
                }
                tokio::time::sleep(self.ctx.workflow_poll_interval).await;
                continue;
            }
            tokio::select! {
                _ = tokio::time::sleep(self.ctx.workflow_poll_interval) => {}
                _ = cancel.cancelled() => {}
            }
        }
    }

    /// Move a live job to a new status and persist the snapshot.
    /// A snapshot already terminal is never overwritten.
    fn transition(&self, handle: &Arc<JobHandle>, status: JobStatus, error_detail: Option<String>) {
        let snapshot = {
            let mut meta = handle.meta.lock().unwrap();
            if !meta.status.is_terminal() {
                meta.status = status;
                if status.is_terminal() {
                    meta.ended_at = Some(self.ctx.time_provider.now_millis());
                    meta.error_detail = error_detail;
                }
            }
            meta.stats = handle.stats.snapshot();
            meta.clone()
        };
        self.persist(&snapshot);
    }

    fn persist(&self, snapshot: &JobSnapshot) {
        if let Err(e) = self.store.save(snapshot) {
            warn!(job_id = %snapshot.job_id, error = %e, "Failed to persist job snapshot");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::circuit_breaker::CircuitBreakerConfig;
    use crate::port::id_provider::mocks::SequentialIdProvider;
    use crate::port::job_store::mocks::MemoryJobStore;
    use crate::port::postcode_source::mocks::StaticPostcodeSource;
    use crate::port::site_processor::mocks::{MockBehavior, MockSiteProcessor};
    use crate::port::time_provider::mocks::FixedTimeProvider;
    use crate::port::work_queue::mocks::InMemoryWorkQueue;
    use std::time::Duration;

    fn manager(
        queue: Arc<InMemoryWorkQueue>,
        business: Arc<MockSiteProcessor>,
        email: Arc<MockSiteProcessor>,
    ) -> Arc<JobManager> {
        let clock = Arc::new(FixedTimeProvider::new(1_000_000));
        let ctx = StageContext {
            queue,
            postcode_source: Arc::new(StaticPostcodeSource::new(vec!["M1 1", "M1 2", "M2 1"], 2)),
            business_processor: business,
            email_processor: email,
            breaker: Arc::new(CircuitBreaker::new(
                clock.clone(),
                CircuitBreakerConfig::default(),
            )),
            time_provider: clock,
            id_provider: Arc::new(SequentialIdProvider::new()),
            pool_config: BatchPoolConfig {
                batch_size: 4,
                concurrency: 2,
                inter_batch_delay: Duration::from_millis(1),
                limit: None,
            },
            stale_claim_max_age_ms: None,
            workflow_poll_interval: Duration::from_millis(5),
        };
        Arc::new(JobManager::new(ctx, Arc::new(MemoryJobStore::new())))
    }

    async fn wait_terminal(manager: &Arc<JobManager>, job_id: &JobId) -> JobSnapshot {
        for _ in 0..500 {
            let snap = manager.status(job_id).unwrap();
            if snap.status.is_terminal() {
                return snap;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("job {} never reached a terminal status", job_id);
    }

    async fn wait_pruned(manager: &Arc<JobManager>, job_id: &JobId) {
        for _ in 0..500 {
            if !manager.registry.lock().unwrap().contains_key(job_id) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("job {} was never removed from the live registry", job_id);
    }

    #[tokio::test]
    async fn email_harvest_job_completes_with_stats() {
        let queue = Arc::new(InMemoryWorkQueue::new());
        for (i, target) in ["https://a.co.uk", "https://b.co.uk"].iter().enumerate() {
            queue
                .insert(&WorkItem::new(
                    format!("w{}", i),
                    Stage::EmailHarvest,
                    *target,
                    0,
                ))
                .await
                .unwrap();
        }
        let mgr = manager(
            queue,
            Arc::new(MockSiteProcessor::new_no_email()),
            Arc::new(MockSiteProcessor::new_found(vec!["x@a.co.uk"])),
        );

        let job_id = mgr
            .start(JobKind::EmailHarvest, JobParams::default())
            .unwrap();
        let snap = wait_terminal(&mgr, &job_id).await;
        assert_eq!(snap.status, JobStatus::Completed);
        assert_eq!(snap.stats.processed, 2);
        assert_eq!(snap.stats.found, 2);
        assert_eq!(snap.total_targets, Some(2));
        assert!(snap.ended_at.is_some());
    }

    #[tokio::test]
    async fn postcode_discovery_queues_subsectors() {
        let queue = Arc::new(InMemoryWorkQueue::new());
        let mgr = manager(
            queue.clone(),
            Arc::new(MockSiteProcessor::new_no_email()),
            Arc::new(MockSiteProcessor::new_no_email()),
        );

        let job_id = mgr
            .start(
                JobKind::PostcodeDiscovery,
                JobParams {
                    area: Some("M".to_string()),
                    ..JobParams::default()
                },
            )
            .unwrap();
        let snap = wait_terminal(&mgr, &job_id).await;
        assert_eq!(snap.status, JobStatus::Completed);
        assert_eq!(snap.stats.results_collected, 3);
        assert_eq!(queue.count_pending(Stage::BusinessDiscovery).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn area_is_required_for_postcode_discovery() {
        let mgr = manager(
            Arc::new(InMemoryWorkQueue::new()),
            Arc::new(MockSiteProcessor::new_no_email()),
            Arc::new(MockSiteProcessor::new_no_email()),
        );
        let err = mgr
            .start(JobKind::PostcodeDiscovery, JobParams::default())
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn unknown_job_is_not_found() {
        let mgr = manager(
            Arc::new(InMemoryWorkQueue::new()),
            Arc::new(MockSiteProcessor::new_no_email()),
            Arc::new(MockSiteProcessor::new_no_email()),
        );
        let err = mgr.status(&"nope".to_string()).unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn chain_starts_successor_as_child() {
        let queue = Arc::new(InMemoryWorkQueue::new());
        queue
            .insert(&WorkItem::new("w0", Stage::BusinessDiscovery, "M1 1", 0))
            .await
            .unwrap();
        let business = Arc::new(MockSiteProcessor::new(MockBehavior::Discover(vec![
            "https://shop.co.uk".to_string(),
        ])));
        let mgr = manager(
            queue.clone(),
            business,
            Arc::new(MockSiteProcessor::new_found(vec!["hi@shop.co.uk"])),
        );

        let job_id = mgr
            .start(
                JobKind::BusinessDiscovery,
                JobParams {
                    chain: true,
                    ..JobParams::default()
                },
            )
            .unwrap();
        let snap = wait_terminal(&mgr, &job_id).await;
        assert_eq!(snap.status, JobStatus::Completed);

        // The chained email harvest drains the discovered website
        let parent = mgr.status(&job_id).unwrap();
        let child_id = parent.child_job_id.expect("chained child recorded");
        let child = wait_terminal(&mgr, &child_id).await;
        assert_eq!(child.kind, JobKind::EmailHarvest);
        assert_eq!(child.status, JobStatus::Completed);
        assert_eq!(child.stats.found, 1);
    }

    #[tokio::test]
    async fn terminate_cascades_to_child() {
        let queue = Arc::new(InMemoryWorkQueue::new());
        for i in 0..20 {
            queue
                .insert(&WorkItem::new(
                    format!("w{}", i),
                    Stage::EmailHarvest,
                    format!("https://site{}.co.uk", i),
                    0,
                ))
                .await
                .unwrap();
        }
        // Slow processing keeps the child alive long enough to terminate
        let slow = Arc::new(MockSiteProcessor::new(MockBehavior::Slow(100)));
        let mgr = manager(queue, Arc::new(MockSiteProcessor::new_no_email()), slow);

        let parent_id = mgr
            .start(JobKind::EmailHarvest, JobParams::default())
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        // Worker winds down cooperatively: terminating first, terminated once
        // the in-flight batch is done
        let snap = mgr.terminate(&parent_id).unwrap();
        assert_eq!(snap.status, JobStatus::Terminating);

        let final_snap = wait_terminal(&mgr, &parent_id).await;
        assert_eq!(final_snap.status, JobStatus::Terminated);
    }

    #[tokio::test]
    async fn workflow_runs_all_stages() {
        let queue = Arc::new(InMemoryWorkQueue::new());
        let business = Arc::new(MockSiteProcessor::new(MockBehavior::Discover(vec![
            "https://shop1.co.uk".to_string(),
            "https://shop2.co.uk".to_string(),
        ])));
        let email = Arc::new(MockSiteProcessor::new_found(vec!["a@b.co.uk"]));
        let mgr = manager(queue.clone(), business, email.clone());

        let job_id = mgr
            .start(
                JobKind::Workflow,
                JobParams {
                    area: Some("M".to_string()),
                    ..JobParams::default()
                },
            )
            .unwrap();
        let snap = wait_terminal(&mgr, &job_id).await;
        assert_eq!(snap.status, JobStatus::Completed);
        assert!(snap.child_job_id.is_some());

        // 3 subsectors discovered, each found 2 shops (deduped to 2), both harvested
        assert_eq!(queue.count_pending(Stage::BusinessDiscovery).await.unwrap(), 0);
        assert_eq!(queue.count_pending(Stage::EmailHarvest).await.unwrap(), 0);
        assert_eq!(email.call_count(), 2);
        assert_eq!(snap.stats.found, 3 + 2); // discovery outcomes + harvested
    }

    #[tokio::test]
    async fn terminal_snapshot_survives_in_store() {
        let queue = Arc::new(InMemoryWorkQueue::new());
        let mgr = manager(
            queue,
            Arc::new(MockSiteProcessor::new_no_email()),
            Arc::new(MockSiteProcessor::new_no_email()),
        );
        let job_id = mgr
            .start(JobKind::EmailHarvest, JobParams::default())
            .unwrap();
        wait_terminal(&mgr, &job_id).await;

        // list() merges live registry and archive without duplicates
        let listed = mgr.list().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].job_id, job_id);
    }

    #[tokio::test]
    async fn finished_jobs_leave_the_live_registry() {
        let queue = Arc::new(InMemoryWorkQueue::new());
        queue
            .insert(&WorkItem::new("w0", Stage::EmailHarvest, "https://a.co.uk", 0))
            .await
            .unwrap();
        let mgr = manager(
            queue,
            Arc::new(MockSiteProcessor::new_no_email()),
            Arc::new(MockSiteProcessor::new_no_email()),
        );

        let job_id = mgr
            .start(JobKind::EmailHarvest, JobParams::default())
            .unwrap();
        wait_terminal(&mgr, &job_id).await;
        wait_pruned(&mgr, &job_id).await;

        // The archived snapshot stays queryable
        let snap = mgr.status(&job_id).unwrap();
        assert_eq!(snap.status, JobStatus::Completed);
        assert_eq!(snap.stats.processed, 1);
    }

    #[tokio::test]
    async fn terminating_archived_parent_reaches_live_child() {
        let queue = Arc::new(InMemoryWorkQueue::new());
        queue
            .insert(&WorkItem::new("w0", Stage::BusinessDiscovery, "M1 1", 0))
            .await
            .unwrap();
        let business = Arc::new(MockSiteProcessor::new(MockBehavior::Discover(
            (0..6).map(|i| format!("https://shop{}.co.uk", i)).collect(),
        )));
        // Slow harvesting keeps the chained child alive well past the parent
        let slow = Arc::new(MockSiteProcessor::new(MockBehavior::Slow(100)));
        let mgr = manager(queue, business, slow);

        let parent_id = mgr
            .start(
                JobKind::BusinessDiscovery,
                JobParams {
                    chain: true,
                    ..JobParams::default()
                },
            )
            .unwrap();
        wait_terminal(&mgr, &parent_id).await;
        wait_pruned(&mgr, &parent_id).await;

        // Pruned parent snapshot carries the chained child
        let parent = mgr.status(&parent_id).unwrap();
        assert_eq!(parent.status, JobStatus::Completed);
        let child_id = parent.child_job_id.expect("chained child recorded");

        // Terminate through the archive: the cascade stops the running child
        let after = mgr.terminate(&parent_id).unwrap();
        assert_eq!(after.status, JobStatus::Completed);
        let child = wait_terminal(&mgr, &child_id).await;
        assert_eq!(child.status, JobStatus::Terminated);
    }
}
