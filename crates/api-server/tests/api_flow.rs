//! End-to-end flow over the REST router with an in-memory store.

use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use rusqlite::params;
use segmentator_api::{ApiServer, AppState};
use segmentator_core::config::ReportConfig;
use segmentator_history::HistoryReporter;
use segmentator_segments::{AssignmentEngine, RolloutSampler, SegmentCatalog};
use segmentator_store::Db;
use tower::ServiceExt;

fn reports_dir() -> String {
    let dir = std::env::temp_dir().join(format!(
        "segmentator-api-test-{}-{:?}",
        std::process::id(),
        std::thread::current().id()
    ));
    dir.to_str().unwrap().to_string()
}

fn test_app(users: i64, reports_dir: &str) -> (Arc<Db>, Router) {
    let db = Arc::new(Db::open_in_memory().unwrap());
    db.with_conn(|conn| {
        for id in 1..=users {
            conn.execute("INSERT INTO users (id) VALUES (?1)", params![id])?;
        }
        Ok(())
    })
    .unwrap();

    let report_cfg = ReportConfig {
        storage_dir: reports_dir.to_string(),
        ..ReportConfig::default()
    };
    let state = AppState {
        catalog: SegmentCatalog::new(db.clone()),
        engine: AssignmentEngine::new(db.clone()),
        sampler: RolloutSampler::new(db.clone()),
        reporter: HistoryReporter::new(db.clone(), report_cfg),
        service_name: "segmentator-test".to_string(),
        start_time: Instant::now(),
    };
    let router = ApiServer::router(state, reports_dir);
    (db, router)
}

async fn send_json(
    router: &Router,
    method: &str,
    uri: &str,
    body: serde_json::Value,
) -> StatusCode {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    router.clone().oneshot(request).await.unwrap().status()
}

async fn get_json(router: &Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
    (status, value)
}

#[tokio::test]
async fn segment_lifecycle_over_http() {
    let (_db, router) = test_app(3, &reports_dir());

    let status = send_json(
        &router,
        "POST",
        "/api/create_segment",
        serde_json::json!({"segment_slug": "beta"}),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let status = send_json(
        &router,
        "POST",
        "/api/update_user_segments",
        serde_json::json!({"user_id": 1, "assign_segments": ["beta"], "ttl": 0}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = get_json(&router, "/api/get_user_segments?user_id=1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user_id"], 1);
    assert_eq!(body["segments"], serde_json::json!(["beta"]));

    let status = send_json(
        &router,
        "DELETE",
        "/api/delete_segment",
        serde_json::json!({"segment_slug": "beta"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = get_json(&router, "/api/get_user_segments?user_id=1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["segments"], serde_json::json!([]));
}

#[tokio::test]
async fn invalid_inputs_are_client_errors() {
    let (_db, router) = test_app(1, &reports_dir());

    // empty slug
    let status = send_json(
        &router,
        "POST",
        "/api/create_segment",
        serde_json::json!({"segment_slug": ""}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // unknown slug
    let status = send_json(
        &router,
        "DELETE",
        "/api/delete_segment",
        serde_json::json!({"segment_slug": "ghost"}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // fraction out of range
    let status = send_json(
        &router,
        "POST",
        "/api/create_segment",
        serde_json::json!({"segment_slug": "beta", "fraction": 200}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // malformed history dates
    let (status, _) = get_json(
        &router,
        "/api/get_user_history?user_id=1&start_date=2023&end_date=2023-03",
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn create_with_fraction_rolls_out_to_sample() {
    let (db, router) = test_app(10, &reports_dir());

    let status = send_json(
        &router,
        "POST",
        "/api/create_segment",
        serde_json::json!({"segment_slug": "beta", "fraction": 50}),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let holders: i64 = db
        .with_conn(|conn| {
            conn.query_row(
                "SELECT COUNT(*) FROM user_segment_relation WHERE is_active = 1",
                [],
                |row| row.get(0),
            )
        })
        .unwrap();
    assert_eq!(holders, 5);
}

#[tokio::test]
async fn history_export_returns_csv_url() {
    let dir = reports_dir();
    let (_db, router) = test_app(1, &dir);

    send_json(
        &router,
        "POST",
        "/api/create_segment",
        serde_json::json!({"segment_slug": "beta"}),
    )
    .await;
    send_json(
        &router,
        "POST",
        "/api/update_user_segments",
        serde_json::json!({"user_id": 1, "assign_segments": ["beta"]}),
    )
    .await;

    let month = chrono::Utc::now().format("%Y-%m").to_string();
    let uri = format!(
        "/api/get_user_history?user_id=1&start_date={month}&end_date={month}"
    );
    let (status, body) = get_json(&router, &uri).await;
    assert_eq!(status, StatusCode::OK);

    let csv_url = body["csv_url"].as_str().unwrap();
    let file_name = csv_url.rsplit('/').next().unwrap();
    let content =
        std::fs::read_to_string(std::path::Path::new(&dir).join(file_name)).unwrap();
    assert!(content.contains("1;beta;assigned;"));

    let _ = std::fs::remove_dir_all(dir);
}
