//! HTTP API wired to a real SQLite-backed queue.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use tower::ServiceExt;

use leadharvest_api_http::{routes, AppState};
use leadharvest_core::application::{
    BatchPoolConfig, CircuitBreaker, CircuitBreakerConfig, JobManager, StageContext,
};
use leadharvest_core::domain::{Stage, WorkItem};
use leadharvest_core::port::job_store::mocks::MemoryJobStore;
use leadharvest_core::port::postcode_source::mocks::StaticPostcodeSource;
use leadharvest_core::port::site_processor::mocks::{MockBehavior, MockSiteProcessor};
use leadharvest_core::port::{SystemTimeProvider, UuidProvider, WorkQueue};
use leadharvest_infra_sqlite::{create_pool, run_migrations, SqliteWorkQueue};

async fn sqlite_state(email: Arc<MockSiteProcessor>) -> (AppState, Arc<SqliteWorkQueue>) {
    let pool = create_pool("sqlite::memory:").await.unwrap();
    run_migrations(&pool).await.unwrap();
    let queue = Arc::new(SqliteWorkQueue::new(pool));

    let clock = Arc::new(SystemTimeProvider);
    let ctx = StageContext {
        queue: queue.clone(),
        postcode_source: Arc::new(StaticPostcodeSource::new(vec!["M1 1"], 10)),
        business_processor: Arc::new(MockSiteProcessor::new_no_email()),
        email_processor: email,
        breaker: Arc::new(CircuitBreaker::new(
            clock.clone(),
            CircuitBreakerConfig::default(),
        )),
        time_provider: clock.clone(),
        id_provider: Arc::new(UuidProvider),
        pool_config: BatchPoolConfig {
            batch_size: 4,
            concurrency: 2,
            inter_batch_delay: Duration::from_millis(1),
            limit: None,
        },
        stale_claim_max_age_ms: Some(60_000),
        workflow_poll_interval: Duration::from_millis(5),
    };
    let manager = Arc::new(JobManager::new(ctx, Arc::new(MemoryJobStore::new())));
    (
        AppState {
            manager,
            queue: queue.clone(),
            time_provider: clock,
            stale_claim_max_age_ms: Some(60_000),
        },
        queue,
    )
}

fn json_post(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn harvest_job_runs_to_completion_over_sqlite() {
    let (state, queue) =
        sqlite_state(Arc::new(MockSiteProcessor::new_found(vec!["sales@site.co.uk"]))).await;
    for i in 0..3 {
        queue
            .insert(&WorkItem::new(
                format!("w{}", i),
                Stage::EmailHarvest,
                format!("https://site{}.co.uk", i),
                i as i64,
            ))
            .await
            .unwrap();
    }
    let app = routes(state);

    let response = app
        .clone()
        .oneshot(json_post(
            "/api/jobs",
            serde_json::json!({"kind": "email_harvest"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let job_id = body["job_id"].as_str().unwrap().to_string();
    assert_eq!(body["status"], "starting");

    let mut completed = false;
    for _ in 0..500 {
        let response = app
            .clone()
            .oneshot(
                Request::get(format!("/api/jobs/{}", job_id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        if body["status"] == "completed" {
            assert_eq!(body["stats"]["processed"], 3);
            assert_eq!(body["stats"]["found"], 3);
            assert_eq!(body["total_targets"], 3);
            completed = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(completed, "job never completed");

    // Terminal outcomes visible through the stats endpoint
    let response = app
        .clone()
        .oneshot(
            Request::get("/api/queue/email_harvest/stats")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["found"], 3);
    assert_eq!(body["pending"], 0);
    assert_eq!(body["total"], 3);

    // Nothing left to recover after a clean run
    let response = app
        .oneshot(json_post(
            "/api/queue/email_harvest/recover-stale",
            serde_json::json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["recovered"], 0);
}

#[tokio::test]
async fn terminate_endpoint_stops_a_running_job() {
    // Slow processing keeps the job alive until the terminate request lands
    let (state, queue) =
        sqlite_state(Arc::new(MockSiteProcessor::new(MockBehavior::Slow(100)))).await;
    for i in 0..30 {
        queue
            .insert(&WorkItem::new(
                format!("w{}", i),
                Stage::EmailHarvest,
                format!("https://site{}.co.uk", i),
                i as i64,
            ))
            .await
            .unwrap();
    }
    let app = routes(state);

    let response = app
        .clone()
        .oneshot(json_post(
            "/api/jobs",
            serde_json::json!({"kind": "email_harvest"}),
        ))
        .await
        .unwrap();
    let body = body_json(response).await;
    let job_id = body["job_id"].as_str().unwrap().to_string();

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/api/jobs/{}/terminate", job_id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "terminating");

    // The worker finalizes the job as terminated
    let mut terminated = false;
    for _ in 0..500 {
        let response = app
            .clone()
            .oneshot(
                Request::get(format!("/api/jobs/{}", job_id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let body = body_json(response).await;
        if body["status"] == "terminated" {
            terminated = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(terminated, "job never finished terminating");

    // None of the claimed items may be left dangling in `processing`
    for _ in 0..500 {
        let stats = queue.stats(Stage::EmailHarvest).await.unwrap();
        if stats.processing == 0 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("claimed items were left in processing after terminate");
}
