// SQLite Connection Pool Setup

use leadharvest_core::error::{AppError, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

/// Connection retry ceiling
const MAX_CONNECT_ATTEMPTS: u32 = 5;

/// Base delay doubled per attempt (500ms, 1s, 2s, ...)
const CONNECT_BASE_DELAY_MS: u64 = 500;

/// Create SQLite connection pool with WAL mode and optimizations
pub async fn create_pool(database_url: &str) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(database_url)
        .map_err(|e| AppError::Config(format!("invalid database url: {}", e)))?
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5))
        .create_if_missing(true);

    // In-memory databases exist per connection; the pool must stay at one
    // connection or each handle sees a different empty db
    let max_connections = if database_url.contains(":memory:") {
        1
    } else {
        10
    };

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

    sqlx::query("PRAGMA foreign_keys = ON")
        .execute(&pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

    Ok(pool)
}

/// Create the pool, retrying with exponential backoff.
/// Exhausting the attempts is fatal to the caller.
pub async fn create_pool_with_retry(database_url: &str) -> Result<SqlitePool> {
    let mut delay = Duration::from_millis(CONNECT_BASE_DELAY_MS);
    let mut last_err = None;

    for attempt in 1..=MAX_CONNECT_ATTEMPTS {
        match create_pool(database_url).await {
            Ok(pool) => return Ok(pool),
            Err(e) => {
                warn!(
                    attempt = %attempt,
                    max_attempts = %MAX_CONNECT_ATTEMPTS,
                    error = %e,
                    "Database connection failed, retrying"
                );
                last_err = Some(e);
                if attempt < MAX_CONNECT_ATTEMPTS {
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
            }
        }
    }

    Err(last_err.unwrap_or_else(|| AppError::Database("connection retries exhausted".to_string())))
}
