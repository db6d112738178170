use crate::infra::{AppState, InMemoryArtifactStore, ServiceEngine};
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Extension;
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use civic_registry::workflows::registration::{registration_router, ArtifactStore, ArtifactStoreError};

pub(crate) fn with_registration_routes(
    engine: Arc<ServiceEngine>,
    artifacts: Arc<InMemoryArtifactStore>,
) -> axum::Router {
    registration_router(engine)
        .route("/health", axum::routing::get(healthcheck))
        .route("/ready", axum::routing::get(readiness_endpoint))
        .route("/metrics", axum::routing::get(metrics_endpoint))
        .route(
            "/api/v1/registration/documents",
            axum::routing::post(upload_document).with_state(artifacts),
        )
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

#[derive(Debug, Deserialize)]
pub(crate) struct DocumentUploadRequest {
    pub(crate) kind: String,
    pub(crate) content: String,
}

/// Accept a document payload on behalf of the external blob store and hand
/// back the opaque reference the engine records against the application.
pub(crate) async fn upload_document(
    State(artifacts): State<Arc<InMemoryArtifactStore>>,
    Json(request): Json<DocumentUploadRequest>,
) -> impl IntoResponse {
    match artifacts.store(&request.kind, request.content.as_bytes()) {
        Ok(reference) => (
            StatusCode::CREATED,
            Json(json!({ "reference": reference.0 })),
        ),
        Err(ArtifactStoreError::Empty) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({ "error": "validation_error", "detail": "empty document payload" })),
        ),
        Err(err) => {
            tracing::error!(error = %err, "artifact store failure");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "storage_error", "detail": "internal error" })),
            )
        }
    }
}
