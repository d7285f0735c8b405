// Application Layer - Pipeline orchestration logic

pub mod cancel;
pub mod circuit_breaker;
pub mod claiming;
pub mod constants;
pub mod lifecycle;
pub mod pool;
pub mod recovery;

// Re-exports
pub use cancel::{cancel_channel, CancelSource, CancelToken};
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
pub use claiming::Claimer;
pub use lifecycle::{JobManager, StageContext};
pub use pool::{BatchPool, BatchPoolConfig, PoolOutcome, StatsCell};
pub use recovery::StaleClaimSweeper;
