// Leadharvest Infrastructure - SQLite Adapter
// Implements: WorkQueue over a WAL-mode SQLite database

mod connection;
mod migration;
mod work_queue;

pub use connection::{create_pool, create_pool_with_retry};
pub use migration::run_migrations;
pub use work_queue::SqliteWorkQueue;

// Note: sqlx::Error conversion is handled by a helper function
// due to Rust's orphan rules (cannot implement From<sqlx::Error> for AppError here)
