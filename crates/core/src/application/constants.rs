// Pipeline constants (no magic values)
use std::time::Duration;

/// Consecutive failures before a domain's circuit opens
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 3;

/// How long an open circuit stays open before it expires (30 minutes)
pub const DEFAULT_BREAKER_RESET_TIMEOUT_MS: i64 = 30 * 60 * 1000;

/// Claims older than this are considered abandoned (1 hour)
pub const DEFAULT_STALE_CLAIM_MAX_AGE_MS: i64 = 60 * 60 * 1000;

/// Items claimed per batch
pub const DEFAULT_BATCH_SIZE: u32 = 10;

/// Concurrent collaborator slots within a batch
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Pause between batches (politeness toward scraped sites)
pub const DEFAULT_INTER_BATCH_DELAY: Duration = Duration::from_millis(500);

/// Cap on emails stored per work item
pub const MAX_EMAILS_PER_ITEM: usize = 15;

/// Workflow manager poll interval while a child stage runs
pub const WORKFLOW_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Note stamped on items released by the stale-claim sweep
pub const STALE_RECOVERY_NOTE: &str = "released by stale-claim sweep";
