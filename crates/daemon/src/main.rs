mod telemetry;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::{error, info, warn};

use leadharvest_api_http::{AppState, HttpServerConfig};
use leadharvest_core::application::constants::{
    DEFAULT_BATCH_SIZE, DEFAULT_BREAKER_RESET_TIMEOUT_MS, DEFAULT_CONCURRENCY,
    DEFAULT_FAILURE_THRESHOLD, DEFAULT_STALE_CLAIM_MAX_AGE_MS, WORKFLOW_POLL_INTERVAL,
};
use leadharvest_core::application::{
    cancel_channel, BatchPoolConfig, CircuitBreaker, CircuitBreakerConfig, JobManager,
    StageContext, StaleClaimSweeper,
};
use leadharvest_core::port::{FileJobStore, SystemTimeProvider, UuidProvider};
use leadharvest_infra_scraper::{ScraperBridge, ScraperBridgeConfig};
use leadharvest_infra_sqlite::{create_pool_with_retry, run_migrations, SqliteWorkQueue};

struct DaemonConfig {
    db_path: String,
    jobs_path: String,
    http_port: u16,
    scraper_program: String,
    scraper_timeout: Duration,
    category: Option<String>,
    batch_size: u32,
    concurrency: usize,
}

impl DaemonConfig {
    fn from_env() -> anyhow::Result<Self> {
        let db_path = std::env::var("LEADHARVEST_DB_PATH")
            .unwrap_or_else(|_| "~/.leadharvest/queue.db".to_string());
        let db_path = shellexpand::tilde(&db_path).to_string();

        let jobs_path = std::env::var("LEADHARVEST_JOBS_PATH")
            .unwrap_or_else(|_| "~/.leadharvest/jobs.json".to_string());
        let jobs_path = shellexpand::tilde(&jobs_path).to_string();

        let http_port = std::env::var("LEADHARVEST_HTTP_PORT")
            .ok()
            .map(|v| v.parse::<u16>())
            .transpose()
            .context("LEADHARVEST_HTTP_PORT must be a valid port number")?
            .unwrap_or(8090);

        let scraper_program = std::env::var("LEADHARVEST_SCRAPER_BIN")
            .unwrap_or_else(|_| "leadharvest-scraper".to_string());

        let scraper_timeout = std::env::var("LEADHARVEST_SCRAPER_TIMEOUT_SECS")
            .ok()
            .map(|v| v.parse::<u64>())
            .transpose()
            .context("LEADHARVEST_SCRAPER_TIMEOUT_SECS must be an integer")?
            .map(Duration::from_secs)
            .unwrap_or_else(|| Duration::from_secs(120));

        let category = std::env::var("LEADHARVEST_CATEGORY")
            .ok()
            .filter(|v| !v.is_empty());

        let batch_size = std::env::var("LEADHARVEST_BATCH_SIZE")
            .ok()
            .map(|v| v.parse::<u32>())
            .transpose()
            .context("LEADHARVEST_BATCH_SIZE must be an integer")?
            .unwrap_or(DEFAULT_BATCH_SIZE);

        let concurrency = std::env::var("LEADHARVEST_CONCURRENCY")
            .ok()
            .map(|v| v.parse::<usize>())
            .transpose()
            .context("LEADHARVEST_CONCURRENCY must be an integer")?
            .unwrap_or(DEFAULT_CONCURRENCY);

        Ok(Self {
            db_path,
            jobs_path,
            http_port,
            scraper_program,
            scraper_timeout,
            category,
            batch_size,
            concurrency,
        })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    telemetry::init_tracing()?;

    let config = DaemonConfig::from_env()?;
    info!(
        db_path = %config.db_path,
        http_port = config.http_port,
        scraper = %config.scraper_program,
        "starting leadharvest daemon"
    );

    for path in [&config.db_path, &config.jobs_path] {
        if let Some(parent) = std::path::Path::new(path).parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create data directory {}", parent.display())
            })?;
        }
    }

    let db_url = format!("sqlite://{}", config.db_path);
    let pool = create_pool_with_retry(&db_url)
        .await
        .context("failed to open work queue database")?;
    run_migrations(&pool)
        .await
        .context("failed to run database migrations")?;

    // Dependency wiring
    let queue = Arc::new(SqliteWorkQueue::new(pool.clone()));
    let time_provider = Arc::new(SystemTimeProvider);
    let id_provider = Arc::new(UuidProvider);

    let bridge = Arc::new(ScraperBridge::new(ScraperBridgeConfig {
        program: config.scraper_program.clone(),
        unit_timeout: config.scraper_timeout,
        category: config.category.clone(),
        ..ScraperBridgeConfig::default()
    }));

    let breaker = Arc::new(CircuitBreaker::new(
        time_provider.clone(),
        CircuitBreakerConfig {
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            reset_timeout_ms: DEFAULT_BREAKER_RESET_TIMEOUT_MS,
        },
    ));

    let ctx = StageContext {
        queue: queue.clone(),
        postcode_source: bridge.clone(),
        business_processor: bridge.clone(),
        email_processor: bridge,
        breaker,
        time_provider: time_provider.clone(),
        id_provider,
        pool_config: BatchPoolConfig {
            batch_size: config.batch_size,
            concurrency: config.concurrency,
            ..BatchPoolConfig::default()
        },
        stale_claim_max_age_ms: Some(DEFAULT_STALE_CLAIM_MAX_AGE_MS),
        workflow_poll_interval: WORKFLOW_POLL_INTERVAL,
    };

    let job_store = Arc::new(
        FileJobStore::open(&config.jobs_path).context("failed to open job snapshot store")?,
    );
    let manager = Arc::new(JobManager::new(ctx, job_store));

    // Release claims orphaned by a previous unclean shutdown.
    let sweeper = StaleClaimSweeper::new(
        queue.clone(),
        time_provider.clone(),
        Some(DEFAULT_STALE_CLAIM_MAX_AGE_MS),
    );
    match sweeper.recover_all().await {
        Ok(recovered) if recovered > 0 => {
            info!(recovered, "released stale claims from previous run");
        }
        Ok(_) => {}
        Err(e) => warn!(error = %e, "startup stale-claim recovery failed"),
    }

    let (cancel_source, cancel_token) = cancel_channel();
    let http_config = HttpServerConfig {
        port: config.http_port,
        ..HttpServerConfig::default()
    };
    let state = AppState {
        manager: manager.clone(),
        queue,
        time_provider,
        stale_claim_max_age_ms: Some(DEFAULT_STALE_CLAIM_MAX_AGE_MS),
    };

    let server = tokio::spawn(async move {
        if let Err(e) = leadharvest_api_http::serve(http_config, state, cancel_token).await {
            error!(error = %e, "http server exited with error");
        }
    });

    info!("daemon ready, press Ctrl+C to stop");
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;

    info!("shutdown signal received, terminating jobs");
    manager.request_shutdown();
    cancel_source.request_cancel();

    match tokio::time::timeout(Duration::from_secs(5), server).await {
        Ok(_) => info!("http server stopped"),
        Err(_) => warn!("http server did not stop within 5s, exiting anyway"),
    }

    pool.close().await;
    info!("daemon stopped");
    Ok(())
}
