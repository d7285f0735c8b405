// Port Layer - Interfaces for external dependencies

pub mod id_provider; // For deterministic testing
pub mod job_store;
pub mod postcode_source;
pub mod site_processor;
pub mod time_provider;
pub mod work_queue;

// Re-exports
pub use id_provider::{IdProvider, UuidProvider};
pub use job_store::{FileJobStore, JobStore};
pub use postcode_source::{PostcodePage, PostcodeSource};
pub use site_processor::{DiscoveredItem, ProcessError, ProcessOutcome, SiteProcessor};
pub use time_provider::{SystemTimeProvider, TimeProvider};
pub use work_queue::{QueueStats, WorkQueue};
