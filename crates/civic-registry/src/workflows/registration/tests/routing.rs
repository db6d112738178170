use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;

use super::common::*;
use crate::workflows::registration::registration_router;

fn build_router() -> axum::Router {
    let (engine, _, _) = build_engine();
    registration_router(Arc::new(engine))
}

async fn read_json_body(response: axum::response::Response) -> Value {
    let body = to_bytes(response.into_body(), 1024 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}

#[tokio::test]
async fn post_applications_returns_created_record() {
    let router = build_router();
    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/registration/applications")
        .header("content-type", "application/json")
        .header("x-staff-id", "portal")
        .header("x-staff-role", "applicant")
        .body(Body::from(
            serde_json::to_vec(&submission()).expect("serialize submission"),
        ))
        .expect("request");

    let response = router.oneshot(request).await.expect("router dispatch");
    assert_eq!(response.status(), StatusCode::CREATED);

    let payload = read_json_body(response).await;
    assert_eq!(
        payload.get("status").and_then(Value::as_str),
        Some("pending_appointment")
    );
    assert!(payload
        .get("reference")
        .and_then(Value::as_str)
        .map(|reference| reference.starts_with("CIT-"))
        .unwrap_or(false));
}

#[tokio::test]
async fn missing_role_header_defaults_to_applicant_and_is_refused_for_staff_ops() {
    let router = build_router();
    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/registration/appointments")
        .header("content-type", "application/json")
        .body(Body::from(
            serde_json::to_vec(&json!({
                "application_id": "app-000001",
                "center": "Central",
                "date": "2025-02-01",
                "time_slot": "10:00",
            }))
            .expect("serialize"),
        ))
        .expect("request");

    let response = router.oneshot(request).await.expect("router dispatch");
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let payload = read_json_body(response).await;
    assert_eq!(
        payload.get("error").and_then(Value::as_str),
        Some("authorization_error")
    );
}

#[tokio::test]
async fn unknown_role_header_is_a_validation_error() {
    let router = build_router();
    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/registration/applications")
        .header("content-type", "application/json")
        .header("x-staff-role", "janitor")
        .body(Body::from(
            serde_json::to_vec(&submission()).expect("serialize submission"),
        ))
        .expect("request");

    let response = router.oneshot(request).await.expect("router dispatch");
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let payload = read_json_body(response).await;
    assert_eq!(
        payload.get("error").and_then(Value::as_str),
        Some("validation_error")
    );
}

#[tokio::test]
async fn unknown_application_is_not_found() {
    let router = build_router();
    let request = Request::builder()
        .method("GET")
        .uri("/api/v1/registration/applications/app-missing")
        .body(Body::empty())
        .expect("request");

    let response = router.oneshot(request).await.expect("router dispatch");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let payload = read_json_body(response).await;
    assert_eq!(
        payload.get("error").and_then(Value::as_str),
        Some("not_found")
    );
}

#[tokio::test]
async fn availability_lists_standard_slots() {
    let router = build_router();
    let request = Request::builder()
        .method("GET")
        .uri("/api/v1/registration/appointments/availability?center=Central&date=2025-02-01")
        .body(Body::empty())
        .expect("request");

    let response = router.oneshot(request).await.expect("router dispatch");
    assert_eq!(response.status(), StatusCode::OK);

    let payload = read_json_body(response).await;
    let rows = payload.as_array().expect("array payload");
    assert_eq!(rows.len(), 7);
    assert_eq!(
        rows[0].get("time_slot").and_then(Value::as_str),
        Some("09:00")
    );
    assert_eq!(rows[0].get("remaining").and_then(Value::as_u64), Some(1));
}

#[tokio::test]
async fn full_slot_surfaces_conflict_status() {
    let (engine, _, _) = build_engine();
    let application = create_application(&engine);
    let other = engine
        .registry
        .create(&applicant(), permit_submission())
        .expect("second application");
    engine
        .scheduler
        .book(&clerk(), booking_request(&application, "10:00"))
        .expect("first booking");

    let router = registration_router(Arc::new(engine));
    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/registration/appointments")
        .header("content-type", "application/json")
        .header("x-staff-id", "clerk-07")
        .header("x-staff-role", "clerk")
        .body(Body::from(
            serde_json::to_vec(&json!({
                "application_id": other.id.0,
                "center": "Central",
                "date": "2025-02-01",
                "time_slot": "10:00",
            }))
            .expect("serialize"),
        ))
        .expect("request");

    let response = router.oneshot(request).await.expect("router dispatch");
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let payload = read_json_body(response).await;
    assert_eq!(
        payload.get("error").and_then(Value::as_str),
        Some("slot_unavailable")
    );
}

#[tokio::test]
async fn incomplete_capture_payload_carries_missing_list() {
    let (engine, _, _) = build_engine();
    let (application, _) = checked_in_application(&engine);
    let record = engine
        .biometrics
        .start_capture(&clerk(), &application.id)
        .expect("capture started");

    let router = registration_router(Arc::new(engine));
    let request = Request::builder()
        .method("POST")
        .uri(format!(
            "/api/v1/registration/biometrics/{}/complete",
            record.id.0
        ))
        .header("x-staff-id", "clerk-07")
        .header("x-staff-role", "clerk")
        .body(Body::empty())
        .expect("request");

    let response = router.oneshot(request).await.expect("router dispatch");
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let payload = read_json_body(response).await;
    assert_eq!(
        payload.get("error").and_then(Value::as_str),
        Some("incomplete_capture")
    );
    let missing: Vec<&str> = payload
        .get("missing")
        .and_then(Value::as_array)
        .expect("missing list")
        .iter()
        .filter_map(Value::as_str)
        .collect();
    assert_eq!(missing, vec!["fingerprints", "photograph", "signature"]);
}

#[tokio::test]
async fn overview_endpoint_reports_counts() {
    let (engine, _, _) = build_engine();
    let _ = booked_application(&engine);

    let router = registration_router(Arc::new(engine));
    let request = Request::builder()
        .method("GET")
        .uri("/api/v1/registration/overview")
        .body(Body::empty())
        .expect("request");

    let response = router.oneshot(request).await.expect("router dispatch");
    assert_eq!(response.status(), StatusCode::OK);

    let payload = read_json_body(response).await;
    assert_eq!(
        payload
            .get("applications")
            .and_then(|counts| counts.get("appointment_confirmed"))
            .and_then(Value::as_u64),
        Some(1)
    );
    assert_eq!(
        payload
            .get("appointments")
            .and_then(|counts| counts.get("confirmed"))
            .and_then(Value::as_u64),
        Some(1)
    );
}
