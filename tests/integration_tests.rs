use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use tower::ServiceExt;

use bookbot::config::AppConfig;
use bookbot::db;
use bookbot::services::ai::extraction::LlmFieldExtractor;
use bookbot::services::ai::{LlmProvider, Message};
use bookbot::state::AppState;

// ── Mock Providers ──

struct MockLlm;

#[async_trait]
impl LlmProvider for MockLlm {
    async fn chat(&self, _system_prompt: &str, messages: &[Message]) -> anyhow::Result<String> {
        let last = messages.last().map(|m| m.content.as_str()).unwrap_or("");
        let digits = last.chars().filter(|c| c.is_ascii_digit()).count();

        // Deterministic fields based on the customer's message
        if last.contains("book") {
            Ok(r#"{"service_name":"Haircut","date":"2030-06-17","time":"10:00","customer_name":null,"customer_phone":null}"#.to_string())
        } else if last.contains("name is") {
            Ok(r#"{"service_name":null,"date":null,"time":null,"customer_name":"Ada Lovelace","customer_phone":null}"#.to_string())
        } else if digits >= 7 {
            Ok(format!(
                r#"{{"service_name":null,"date":null,"time":null,"customer_name":null,"customer_phone":"{last}"}}"#
            ))
        } else {
            Ok(r#"{"service_name":null,"date":null,"time":null,"customer_name":null,"customer_phone":null}"#.to_string())
        }
    }
}

// ── Helpers ──

fn test_config() -> AppConfig {
    AppConfig {
        database_url: ":memory:".to_string(),
        admin_token: "test-token".to_string(),
        extraction_timeout_ms: 1000,
        ..AppConfig::default()
    }
}

fn test_state() -> Arc<AppState> {
    let conn = db::init_db(":memory:").unwrap();
    Arc::new(AppState::new(
        conn,
        test_config(),
        Box::new(LlmFieldExtractor::new(Box::new(MockLlm))),
    ))
}

fn test_app(state: Arc<AppState>) -> Router {
    bookbot::build_router(state)
}

fn admin_request(method: &str, uri: &str, body: Option<serde_json::Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("Authorization", "Bearer test-token");
    match body {
        Some(json) => builder
            .header("Content-Type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn send(state: &Arc<AppState>, req: Request<Body>) -> (StatusCode, serde_json::Value) {
    let res = test_app(state.clone()).oneshot(req).await.unwrap();
    let status = res.status();
    let body = axum::body::to_bytes(res.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if body.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&body).unwrap()
    };
    (status, json)
}

/// Creates a 30 minute "Haircut" and opens Mondays 09:00-17:00. Returns the service id.
async fn seed_catalog(state: &Arc<AppState>) -> String {
    let (status, service) = send(
        state,
        admin_request(
            "POST",
            "/api/biz/services",
            Some(serde_json::json!({ "name": "Haircut", "duration_min": 30 })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _) = send(
        state,
        admin_request(
            "PUT",
            "/api/biz/hours/1",
            Some(serde_json::json!({ "open": "09:00", "close": "17:00" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    service["id"].as_str().unwrap().to_string()
}

async fn turn(state: &Arc<AppState>, thread_id: &str, message: &str) -> (StatusCode, serde_json::Value) {
    let req = Request::builder()
        .method("POST")
        .uri("/api/biz/turn")
        .header("Content-Type", "application/json")
        .body(Body::from(
            serde_json::json!({ "message": message, "thread_id": thread_id }).to_string(),
        ))
        .unwrap();
    send(state, req).await
}

// ── Health Check ──

#[tokio::test]
async fn test_health() {
    let state = test_state();
    let (status, json) = send(
        &state,
        Request::builder().uri("/health").body(Body::empty()).unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
}

// ── Admin API Tests ──

#[tokio::test]
async fn test_admin_requires_auth() {
    let state = test_state();
    let app = test_app(state);

    let res = app
        .oneshot(
            Request::builder()
                .uri("/api/biz/bookings")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_admin_wrong_token() {
    let state = test_state();
    let app = test_app(state);

    let res = app
        .oneshot(
            Request::builder()
                .uri("/api/biz/services")
                .header("Authorization", "Bearer wrong-token")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_catalog_setup() {
    let state = test_state();
    let service_id = seed_catalog(&state).await;

    let (status, services) = send(&state, admin_request("GET", "/api/biz/services", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(services.as_array().unwrap().len(), 1);
    assert_eq!(services[0]["id"], service_id.as_str());
    assert_eq!(services[0]["enabled"], true);

    let (status, hours) = send(&state, admin_request("GET", "/api/biz/hours", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(hours[0]["weekday"], 1);
    assert_eq!(hours[0]["open"], "09:00");

    // Another business sees nothing
    let (_, other) = send(&state, admin_request("GET", "/api/other/services", None)).await;
    assert!(other.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_invalid_service_and_hours_rejected() {
    let state = test_state();

    let (status, _) = send(
        &state,
        admin_request(
            "POST",
            "/api/biz/services",
            Some(serde_json::json!({ "name": "Haircut", "duration_min": 0 })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &state,
        admin_request(
            "PUT",
            "/api/biz/hours/1",
            Some(serde_json::json!({ "open": "17:00", "close": "09:00" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_oversized_service_rejected() {
    let state = test_state();

    let (status, json) = send(
        &state,
        admin_request(
            "POST",
            "/api/biz/services",
            Some(serde_json::json!({ "name": "Haircut", "duration_min": 30, "buffer_min": 1_000_000_000_000i64 })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().unwrap().contains("buffer_min"));
}

#[tokio::test]
async fn test_disabling_a_service_closes_booking() {
    let state = test_state();
    let service_id = seed_catalog(&state).await;
    let service_uri = format!("/api/biz/services/{service_id}");

    let (_, started) = turn(&state, "t-1", "hello").await;
    assert_eq!(started["step"], "date");

    let (status, updated) = send(
        &state,
        admin_request(
            "PUT",
            &service_uri,
            Some(serde_json::json!({ "name": "Haircut", "duration_min": 30, "enabled": false })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["enabled"], false);

    // Public availability no longer knows the service
    let (status, _) = send(
        &state,
        Request::builder()
            .uri(format!(
                "/api/biz/availability?service_id={service_id}&start_date=2030-06-17"
            ))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // The open dialog drops the withdrawn service
    let (_, again) = turn(&state, "t-1", "hello").await;
    assert_eq!(again["step"], "service");
    assert!(again["message"].as_str().unwrap().contains("no services"));

    // Direct bookings are refused
    let (status, _) = send(
        &state,
        admin_request(
            "POST",
            "/api/biz/bookings",
            Some(serde_json::json!({
                "service_id": service_id,
                "start": "2030-06-17T10:00:00",
                "end": "2030-06-17T10:30:00",
                "customer": { "name": "Bob", "phone": "+15551110000" }
            })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = send(&state, admin_request("DELETE", &service_uri, None)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = send(&state, admin_request("DELETE", &service_uri, None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_update_unknown_service_not_found() {
    let state = test_state();

    let (status, _) = send(
        &state,
        admin_request(
            "PUT",
            "/api/biz/services/missing",
            Some(serde_json::json!({ "name": "Haircut", "duration_min": 30 })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// ── Availability ──

#[tokio::test]
async fn test_availability_endpoint() {
    let state = test_state();
    let service_id = seed_catalog(&state).await;

    let (status, slots) = send(
        &state,
        Request::builder()
            .uri(format!(
                "/api/biz/availability?service_id={service_id}&start_date=2030-06-17"
            ))
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let slots = slots.as_array().unwrap();
    assert_eq!(slots.len(), 16);
    assert_eq!(slots[0]["start"], "2030-06-17T09:00:00");
    assert_eq!(slots[0]["end"], "2030-06-17T09:30:00");
    assert!(slots.iter().all(|s| s["available"] == true));
}

#[tokio::test]
async fn test_availability_rejects_long_range_and_unknown_service() {
    let state = test_state();
    let service_id = seed_catalog(&state).await;

    let (status, _) = send(
        &state,
        Request::builder()
            .uri(format!(
                "/api/biz/availability?service_id={service_id}&start_date=2030-06-01&end_date=2030-07-15"
            ))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &state,
        Request::builder()
            .uri("/api/biz/availability?service_id=missing&start_date=2030-06-17")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// ── Blackouts ──

#[tokio::test]
async fn test_blackout_closes_day_and_can_be_removed() {
    let state = test_state();
    let service_id = seed_catalog(&state).await;
    let availability_uri = format!(
        "/api/biz/availability?service_id={service_id}&start_date=2030-06-17&end_date=2030-06-17"
    );

    let (status, blackout) = send(
        &state,
        admin_request(
            "POST",
            "/api/biz/blackouts",
            Some(serde_json::json!({ "start_date": "2030-06-17", "reason": "Holiday" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let blackout_id = blackout["id"].as_str().unwrap().to_string();

    let (_, slots) = send(
        &state,
        Request::builder().uri(&availability_uri).body(Body::empty()).unwrap(),
    )
    .await;
    assert!(slots.as_array().unwrap().is_empty());

    let (status, _) = send(
        &state,
        admin_request("DELETE", &format!("/api/biz/blackouts/{blackout_id}"), None),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, slots) = send(
        &state,
        Request::builder().uri(&availability_uri).body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(slots.as_array().unwrap().len(), 16);

    let (status, _) = send(
        &state,
        admin_request("DELETE", &format!("/api/biz/blackouts/{blackout_id}"), None),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_blackout_end_before_start_rejected() {
    let state = test_state();

    let (status, _) = send(
        &state,
        admin_request(
            "POST",
            "/api/biz/blackouts",
            Some(serde_json::json!({ "start_date": "2030-06-17", "end_date": "2030-06-10" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// ── Booking CRUD via Admin API ──

#[tokio::test]
async fn test_bookings_lifecycle() {
    let state = test_state();
    let service_id = seed_catalog(&state).await;

    let (status, booking) = send(
        &state,
        admin_request(
            "POST",
            "/api/biz/bookings",
            Some(serde_json::json!({
                "service_id": service_id,
                "start": "2030-06-17T10:00:00",
                "end": "2030-06-17T10:30:00",
                "customer": { "name": "Bob", "phone": "+15551110000" }
            })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(booking["status"], "pending");
    let id = booking["id"].as_str().unwrap().to_string();

    // List bookings
    let (status, list) = send(&state, admin_request("GET", "/api/biz/bookings", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list.as_array().unwrap().len(), 1);
    assert_eq!(list[0]["customer"]["name"], "Bob");

    // Confirm it
    let (status, updated) = send(
        &state,
        admin_request(
            "POST",
            &format!("/api/biz/bookings/{id}/status"),
            Some(serde_json::json!({ "status": "confirmed" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["status"], "confirmed");

    let (_, pending) = send(
        &state,
        admin_request("GET", "/api/biz/bookings?status=pending", None),
    )
    .await;
    assert!(pending.as_array().unwrap().is_empty());

    // The slot is no longer offered
    let (_, slots) = send(
        &state,
        Request::builder()
            .uri(format!(
                "/api/biz/availability?service_id={service_id}&start_date=2030-06-17&end_date=2030-06-17"
            ))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    let taken = slots
        .as_array()
        .unwrap()
        .iter()
        .find(|s| s["start"] == "2030-06-17T10:00:00")
        .unwrap();
    assert_eq!(taken["available"], false);

    // Delete it
    let (status, _) = send(
        &state,
        admin_request("DELETE", &format!("/api/biz/bookings/{id}"), None),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(
        &state,
        admin_request("GET", &format!("/api/biz/bookings/{id}"), None),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_conflicting_booking_rejected() {
    let state = test_state();
    let service_id = seed_catalog(&state).await;
    let booking = |start: &str, end: &str| {
        serde_json::json!({
            "service_id": service_id,
            "start": start,
            "end": end,
            "customer": { "name": "Bob", "phone": "+15551110000" }
        })
    };

    let (status, _) = send(
        &state,
        admin_request(
            "POST",
            "/api/biz/bookings",
            Some(booking("2030-06-17T10:00:00", "2030-06-17T10:30:00")),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, json) = send(
        &state,
        admin_request(
            "POST",
            "/api/biz/bookings",
            Some(booking("2030-06-17T10:15:00", "2030-06-17T10:45:00")),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(json["error"].as_str().unwrap().contains("conflict"));

    // Back-to-back is fine
    let (status, _) = send(
        &state,
        admin_request(
            "POST",
            "/api/biz/bookings",
            Some(booking("2030-06-17T10:30:00", "2030-06-17T11:00:00")),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
}

// ── Chat Turns ──

#[tokio::test]
async fn test_chat_dialog_books_appointment() {
    let state = test_state();
    seed_catalog(&state).await;

    let (status, first) = turn(&state, "t-1", "I'd like to book a haircut Monday at 10").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["step"], "name");
    assert_eq!(first["requires_input"], true);

    let (_, second) = turn(&state, "t-1", "My name is Ada Lovelace").await;
    assert_eq!(second["step"], "phone");

    let (_, summary) = turn(&state, "t-1", "555 123 4567").await;
    assert_eq!(summary["step"], "confirm");
    let text = summary["message"].as_str().unwrap();
    assert!(text.contains("Service: Haircut"), "got: {text}");
    assert!(text.contains("Time: 10:00 AM"), "got: {text}");
    assert!(text.contains("Name: Ada Lovelace"), "got: {text}");

    let (_, done) = turn(&state, "t-1", "yes").await;
    assert_eq!(done["step"], "complete");
    assert_eq!(done["requires_input"], false);
    assert_eq!(done["booking_created"], true);
    let booking_id = done["booking_id"].as_str().unwrap().to_string();

    let (status, booking) = send(
        &state,
        admin_request("GET", &format!("/api/biz/bookings/{booking_id}"), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(booking["status"], "pending");
    assert_eq!(booking["start"], "2030-06-17T10:00:00");
    assert_eq!(booking["thread_id"], "t-1");
    assert_eq!(booking["customer"]["phone"], "5551234567");

    let (status, by_thread) = send(
        &state,
        admin_request("GET", "/api/biz/threads/t-1/bookings", None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(by_thread[0]["id"], booking_id.as_str());

    // The dialog starts over once the booking is made
    let (_, again) = turn(&state, "t-1", "yes").await;
    assert_eq!(again["step"], "date");
}

#[tokio::test]
async fn test_chat_threads_are_independent() {
    let state = test_state();
    seed_catalog(&state).await;

    let (_, a) = turn(&state, "t-a", "I'd like to book a haircut Monday at 10").await;
    let (_, b) = turn(&state, "t-b", "hello").await;

    assert_eq!(a["step"], "name");
    assert_eq!(b["step"], "date");
}

#[tokio::test]
async fn test_chat_empty_message_rejected() {
    let state = test_state();
    seed_catalog(&state).await;

    let (status, json) = turn(&state, "t-1", "   ").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().unwrap().contains("message"));
}

#[tokio::test]
async fn test_chat_without_services() {
    let state = test_state();

    let (status, json) = turn(&state, "t-1", "hello").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["step"], "service");
    assert!(json["message"].as_str().unwrap().contains("no services"));
}
