use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::NaiveDate;
use serde_json::json;

use super::access::{Permission, StaffRole};
use super::biometrics::CaptureArtifact;
use super::domain::ApplicationStatus;
use super::store::StoreError;

/// Recoverable-by-caller failures of the registration engine, surfaced to the
/// staff UI with a machine-readable kind and human-readable detail. Only
/// [`RegistrationError::Store`] represents the unexpected class; it is logged
/// and mapped to a generic 500.
#[derive(Debug, thiserror::Error)]
pub enum RegistrationError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("invalid transition from {from} to {to}")]
    InvalidTransition {
        from: ApplicationStatus,
        to: ApplicationStatus,
    },

    #[error("operation not allowed in current state: {0}")]
    InvalidState(String),

    #[error("no capacity left at {center} on {date} {time_slot}")]
    SlotUnavailable {
        center: String,
        date: NaiveDate,
        time_slot: String,
    },

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("capture incomplete, missing: {}", .missing.iter().map(|artifact| artifact.label()).collect::<Vec<_>>().join(", "))]
    IncompleteCapture { missing: Vec<CaptureArtifact> },

    #[error("staff {staff_id} ({role}) lacks the {permission} permission")]
    Authorization {
        staff_id: String,
        role: StaffRole,
        permission: Permission,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl RegistrationError {
    /// Stable identifier used in API payloads and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            RegistrationError::Validation(_) => "validation_error",
            RegistrationError::NotFound { .. } => "not_found",
            RegistrationError::InvalidTransition { .. } => "invalid_transition",
            RegistrationError::InvalidState(_) => "invalid_state",
            RegistrationError::SlotUnavailable { .. } => "slot_unavailable",
            RegistrationError::Conflict(_) => "conflict",
            RegistrationError::IncompleteCapture { .. } => "incomplete_capture",
            RegistrationError::Authorization { .. } => "authorization_error",
            RegistrationError::Store(_) => "storage_error",
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            RegistrationError::Validation(_) | RegistrationError::IncompleteCapture { .. } => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            RegistrationError::NotFound { .. } => StatusCode::NOT_FOUND,
            RegistrationError::InvalidTransition { .. }
            | RegistrationError::InvalidState(_)
            | RegistrationError::SlotUnavailable { .. }
            | RegistrationError::Conflict(_) => StatusCode::CONFLICT,
            RegistrationError::Authorization { .. } => StatusCode::FORBIDDEN,
            RegistrationError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for RegistrationError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Storage faults stay opaque to callers; everything else carries its
        // specific kind and detail.
        let body = match &self {
            RegistrationError::Store(err) => {
                tracing::error!(error = %err, "registration store failure");
                json!({ "error": "storage_error", "detail": "internal error" })
            }
            RegistrationError::IncompleteCapture { missing } => json!({
                "error": self.kind(),
                "detail": self.to_string(),
                "missing": missing.iter().map(|artifact| artifact.label()).collect::<Vec<_>>(),
            }),
            other => json!({ "error": other.kind(), "detail": other.to_string() }),
        };

        (status, Json(body)).into_response()
    }
}
