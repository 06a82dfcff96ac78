// 🌐 API Tests - HTTP routes end to end
//
// Each test builds the router over an in-memory facility and drives it
// with `oneshot` requests.

#![cfg(feature = "server")]

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use chrono::{Duration, TimeZone, Utc};
use serde_json::Value;
use std::sync::Arc;
use tower::util::ServiceExt; // for `oneshot`

use parking_access::api::{build_router, AppState};
use parking_access::{
    seed_demo_facility, AccessController, ManualClock, MemoryStore, TariffCalculator,
};

/// Test helper: seeded facility with a controllable clock
fn setup_app() -> (axum::Router, Arc<ManualClock>) {
    let store = MemoryStore::new();
    seed_demo_facility(&store).unwrap();
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2025, 3, 1, 8, 0, 0).unwrap(),
    ));
    let controller =
        AccessController::bootstrap(Arc::new(store), TariffCalculator::default(), clock.clone())
            .unwrap();
    (build_router(AppState::new(Arc::new(controller))), clock)
}

fn request(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn send(app: &axum::Router, method: &str, uri: &str) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request(method, uri)).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("Should read body");
    (status, serde_json::from_slice(&bytes).expect("Should parse JSON"))
}

// =============================================================================
// Health
// =============================================================================

#[tokio::test]
async fn test_health_endpoint() {
    let (app, _) = setup_app();

    let (status, body) = send(&app, "GET", "/api/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"], "memory");
}

// =============================================================================
// Residents
// =============================================================================

#[tokio::test]
async fn test_resident_entry_and_conflict() {
    let (app, _) = setup_app();

    let (status, body) = send(&app, "POST", "/api/residents/ABC123/entry").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["spot_id"], 1);
    assert_eq!(body["data"]["state"], "OCCUPIED");
    assert_eq!(body["data"]["resident"]["name"], "Juan Pérez");

    let (status, body) = send(&app, "POST", "/api/residents/ABC123/entry").await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["success"], false);
    assert_eq!(body["kind"], "already_occupied");
}

#[tokio::test]
async fn test_unknown_resident_is_not_found() {
    let (app, _) = setup_app();

    let (status, body) = send(&app, "POST", "/api/residents/ZZZ999/exit").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["kind"], "not_a_resident");
}

// =============================================================================
// Visitors
// =============================================================================

#[tokio::test]
async fn test_visitor_entry_quote_and_settle() {
    let (app, clock) = setup_app();

    let (status, body) = send(&app, "POST", "/api/visitors/xyz789/entry").await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["plate"], "XYZ789");
    assert_eq!(body["data"]["spot_id"], 6);

    clock.advance(Duration::minutes(135));

    let (status, body) = send(&app, "GET", "/api/visitors/XYZ789/quote").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["amount"], 3000);

    let (status, body) = send(&app, "POST", "/api/visitors/XYZ789/settle").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["amount"], 3000);
    assert_eq!(body["data"]["elapsed_hours"], 2.25);

    let (status, body) = send(&app, "POST", "/api/visitors/XYZ789/settle").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["kind"], "not_active");
}

#[tokio::test]
async fn test_settle_without_elapsed_time_is_bad_request() {
    let (app, _) = setup_app();

    send(&app, "POST", "/api/visitors/XYZ789/entry").await;
    let (status, body) = send(&app, "POST", "/api/visitors/XYZ789/settle").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "invalid_time_range");
}

#[tokio::test]
async fn test_resident_plate_rejected_at_visitor_gate() {
    let (app, _) = setup_app();

    let (status, body) = send(&app, "POST", "/api/visitors/DEF456/entry").await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["kind"], "is_resident");
}

#[tokio::test]
async fn test_pool_exhaustion_is_conflict() {
    let (app, _) = setup_app();

    for i in 0..5 {
        let (status, _) = send(&app, "POST", &format!("/api/visitors/VIS{:03}/entry", i)).await;
        assert_eq!(status, StatusCode::CREATED);
    }
    let (status, body) = send(&app, "POST", "/api/visitors/VIS999/entry").await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["kind"], "no_spot_available");

    let (_, body) = send(&app, "GET", "/api/sessions/active").await;
    assert_eq!(body["data"].as_array().unwrap().len(), 5);
}

// =============================================================================
// Lookups & statistics
// =============================================================================

#[tokio::test]
async fn test_plate_status_kinds() {
    let (app, _) = setup_app();
    send(&app, "POST", "/api/visitors/XYZ789/entry").await;

    let (_, body) = send(&app, "GET", "/api/plates/GHI789").await;
    assert_eq!(body["data"]["kind"], "resident");
    assert_eq!(body["data"]["spot_id"], 3);

    let (_, body) = send(&app, "GET", "/api/plates/XYZ789").await;
    assert_eq!(body["data"]["kind"], "active_visitor");

    let (_, body) = send(&app, "GET", "/api/plates/NEW111").await;
    assert_eq!(body["data"]["kind"], "unregistered");
}

#[tokio::test]
async fn test_stats_spots_and_history() {
    let (app, clock) = setup_app();

    send(&app, "POST", "/api/residents/ABC123/entry").await;
    send(&app, "POST", "/api/visitors/VIS001/entry").await;
    send(&app, "POST", "/api/visitors/VIS002/entry").await;
    clock.advance(Duration::hours(6));
    send(&app, "POST", "/api/visitors/VIS001/settle").await;

    let (status, body) = send(&app, "GET", "/api/stats").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["occupancy"]["resident"]["occupied"], 1);
    assert_eq!(body["data"]["occupancy"]["visitor"]["occupied"], 1);
    assert_eq!(body["data"]["open_sessions"], 1);
    assert_eq!(body["data"]["revenue_total"], 10000);

    let (_, body) = send(&app, "GET", "/api/spots").await;
    assert_eq!(body["data"].as_array().unwrap().len(), 10);

    let (_, body) = send(&app, "GET", "/api/sessions/history?limit=1").await;
    let history = body["data"].as_array().unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0]["plate"], "VIS001");
    assert_eq!(history[0]["status"], "CLOSED");
}
