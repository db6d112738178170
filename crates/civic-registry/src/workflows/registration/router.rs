use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::NaiveDate;
use serde::Deserialize;

use super::access::{AccessPolicy, Caller, StaffRole};
use super::biometrics::{BiometricRecordId, CaptureQuality, FingerprintScan, VerificationStatus};
use super::credentials::CredentialId;
use super::domain::{ApplicationId, ApplicationStatus, ApplicationType, ArtifactRef};
use super::error::RegistrationError;
use super::notify::NotificationDispatcher;
use super::registry::{ApplicationFilter, Page, RegistrationSubmission};
use super::scheduling::{AppointmentId, BookingRequest};
use super::store::RegistryStore;
use super::RegistrationEngine;

/// HTTP surface of the workflow engine. Caller identity arrives in the
/// `x-staff-id` / `x-staff-role` headers set by the session layer in front
/// of this service; reads require none.
pub fn registration_router<S, N, P>(engine: Arc<RegistrationEngine<S, N, P>>) -> Router
where
    S: RegistryStore + 'static,
    N: NotificationDispatcher + 'static,
    P: AccessPolicy + 'static,
{
    Router::new()
        .route(
            "/api/v1/registration/applications",
            post(create_application::<S, N, P>).get(list_applications::<S, N, P>),
        )
        .route(
            "/api/v1/registration/applications/:application_id",
            get(get_application::<S, N, P>),
        )
        .route(
            "/api/v1/registration/applications/:application_id/transition",
            post(transition_application::<S, N, P>),
        )
        .route(
            "/api/v1/registration/applications/:application_id/notes",
            post(add_application_note::<S, N, P>),
        )
        .route(
            "/api/v1/registration/applications/:application_id/appointment",
            get(get_application_appointment::<S, N, P>),
        )
        .route(
            "/api/v1/registration/applications/:application_id/biometrics",
            get(get_application_biometrics::<S, N, P>),
        )
        .route(
            "/api/v1/registration/applications/:application_id/credential",
            post(create_credential::<S, N, P>).get(get_application_credential::<S, N, P>),
        )
        .route(
            "/api/v1/registration/appointments",
            post(book_appointment::<S, N, P>).get(list_appointments::<S, N, P>),
        )
        .route(
            "/api/v1/registration/appointments/availability",
            get(slot_availability::<S, N, P>),
        )
        .route(
            "/api/v1/registration/appointments/:appointment_id",
            get(get_appointment::<S, N, P>),
        )
        .route(
            "/api/v1/registration/appointments/:appointment_id/reschedule",
            post(reschedule_appointment::<S, N, P>),
        )
        .route(
            "/api/v1/registration/appointments/:appointment_id/check-in",
            post(check_in_appointment::<S, N, P>),
        )
        .route(
            "/api/v1/registration/appointments/:appointment_id/cancel",
            post(cancel_appointment::<S, N, P>),
        )
        .route(
            "/api/v1/registration/biometrics",
            post(start_capture::<S, N, P>),
        )
        .route(
            "/api/v1/registration/biometrics/:record_id/fingerprints",
            post(capture_fingerprints::<S, N, P>),
        )
        .route(
            "/api/v1/registration/biometrics/:record_id/photograph",
            post(upload_photograph::<S, N, P>),
        )
        .route(
            "/api/v1/registration/biometrics/:record_id/signature",
            post(upload_signature::<S, N, P>),
        )
        .route(
            "/api/v1/registration/biometrics/:record_id/complete",
            post(complete_capture::<S, N, P>),
        )
        .route(
            "/api/v1/registration/biometrics/:record_id/verify",
            post(verify_capture::<S, N, P>),
        )
        .route(
            "/api/v1/registration/credentials/:credential_id",
            get(get_credential::<S, N, P>),
        )
        .route(
            "/api/v1/registration/credentials/:credential_id/approve-design",
            post(approve_design::<S, N, P>),
        )
        .route(
            "/api/v1/registration/credentials/:credential_id/reject-design",
            post(reject_design::<S, N, P>),
        )
        .route(
            "/api/v1/registration/credentials/:credential_id/print",
            post(mark_printed::<S, N, P>),
        )
        .route(
            "/api/v1/registration/credentials/:credential_id/issue",
            post(issue_credential::<S, N, P>),
        )
        .route(
            "/api/v1/registration/overview",
            get(registry_overview::<S, N, P>),
        )
        .with_state(engine)
}

fn caller_from_headers(headers: &HeaderMap) -> Result<Caller, RegistrationError> {
    let staff_id = headers
        .get("x-staff-id")
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or("anonymous")
        .to_string();

    let role = match headers
        .get("x-staff-role")
        .and_then(|value| value.to_str().ok())
    {
        Some(raw) => StaffRole::from_label(raw.trim()).ok_or_else(|| {
            RegistrationError::Validation(format!("unknown staff role '{}'", raw.trim()))
        })?,
        None => StaffRole::Applicant,
    };

    Ok(Caller { staff_id, role })
}

#[derive(Debug, Deserialize)]
struct ListApplicationsQuery {
    status: Option<String>,
    kind: Option<String>,
    center: Option<String>,
    offset: Option<usize>,
    limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct ListAppointmentsQuery {
    center: Option<String>,
    date: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
struct AvailabilityQuery {
    center: String,
    date: NaiveDate,
}

#[derive(Debug, Deserialize)]
struct TransitionRequest {
    target: String,
    note: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NoteRequest {
    text: String,
}

#[derive(Debug, Deserialize)]
struct RescheduleRequest {
    date: NaiveDate,
    time_slot: String,
    reason: String,
}

#[derive(Debug, Deserialize)]
struct CheckInRequest {
    staff_id: String,
}

#[derive(Debug, Deserialize)]
struct CancelRequest {
    reason: String,
}

#[derive(Debug, Deserialize)]
struct StartCaptureRequest {
    application_id: ApplicationId,
}

#[derive(Debug, Deserialize)]
struct FingerprintsRequest {
    scans: Vec<FingerprintScan>,
}

#[derive(Debug, Deserialize)]
struct ArtifactUploadRequest {
    artifact: ArtifactRef,
    quality: CaptureQuality,
}

#[derive(Debug, Deserialize)]
struct VerifyRequest {
    verdict: VerificationStatus,
    notes: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApproveDesignRequest {
    notes: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RejectDesignRequest {
    reason: String,
}

#[derive(Debug, Deserialize)]
struct PrintRequest {
    batch_number: String,
}

#[derive(Debug, Deserialize)]
struct IssueRequest {
    recipient_signature: ArtifactRef,
    notes: Option<String>,
}

async fn create_application<S, N, P>(
    State(engine): State<Arc<RegistrationEngine<S, N, P>>>,
    headers: HeaderMap,
    Json(submission): Json<RegistrationSubmission>,
) -> Result<impl IntoResponse, RegistrationError>
where
    S: RegistryStore + 'static,
    N: NotificationDispatcher + 'static,
    P: AccessPolicy + 'static,
{
    let caller = caller_from_headers(&headers)?;
    let application = engine.registry.create(&caller, submission)?;
    Ok((StatusCode::CREATED, Json(application)))
}

async fn list_applications<S, N, P>(
    State(engine): State<Arc<RegistrationEngine<S, N, P>>>,
    Query(query): Query<ListApplicationsQuery>,
) -> Result<impl IntoResponse, RegistrationError>
where
    S: RegistryStore + 'static,
    N: NotificationDispatcher + 'static,
    P: AccessPolicy + 'static,
{
    let status = query
        .status
        .as_deref()
        .map(|raw| {
            ApplicationStatus::from_label(raw).ok_or_else(|| {
                RegistrationError::Validation(format!("unknown status '{raw}'"))
            })
        })
        .transpose()?;
    let kind = query
        .kind
        .as_deref()
        .map(|raw| {
            ApplicationType::from_label(raw).ok_or_else(|| {
                RegistrationError::Validation(format!("unknown application type '{raw}'"))
            })
        })
        .transpose()?;

    let filter = ApplicationFilter {
        status,
        kind,
        center: query.center,
    };
    let defaults = Page::default();
    let page = Page {
        offset: query.offset.unwrap_or(defaults.offset),
        limit: query.limit.unwrap_or(defaults.limit),
    };

    let page = engine.registry.list(&filter, &page)?;
    Ok(Json(page))
}

async fn get_application<S, N, P>(
    State(engine): State<Arc<RegistrationEngine<S, N, P>>>,
    Path(application_id): Path<String>,
) -> Result<impl IntoResponse, RegistrationError>
where
    S: RegistryStore + 'static,
    N: NotificationDispatcher + 'static,
    P: AccessPolicy + 'static,
{
    let application = engine.registry.get(&ApplicationId(application_id))?;
    Ok(Json(application))
}

async fn transition_application<S, N, P>(
    State(engine): State<Arc<RegistrationEngine<S, N, P>>>,
    Path(application_id): Path<String>,
    headers: HeaderMap,
    Json(request): Json<TransitionRequest>,
) -> Result<impl IntoResponse, RegistrationError>
where
    S: RegistryStore + 'static,
    N: NotificationDispatcher + 'static,
    P: AccessPolicy + 'static,
{
    let caller = caller_from_headers(&headers)?;
    let target = ApplicationStatus::from_label(&request.target).ok_or_else(|| {
        RegistrationError::Validation(format!("unknown status '{}'", request.target))
    })?;
    let application = engine.registry.transition(
        &caller,
        &ApplicationId(application_id),
        target,
        request.note,
    )?;
    Ok(Json(application))
}

async fn add_application_note<S, N, P>(
    State(engine): State<Arc<RegistrationEngine<S, N, P>>>,
    Path(application_id): Path<String>,
    headers: HeaderMap,
    Json(request): Json<NoteRequest>,
) -> Result<impl IntoResponse, RegistrationError>
where
    S: RegistryStore + 'static,
    N: NotificationDispatcher + 'static,
    P: AccessPolicy + 'static,
{
    let caller = caller_from_headers(&headers)?;
    let application =
        engine
            .registry
            .add_note(&caller, &ApplicationId(application_id), &request.text)?;
    Ok(Json(application))
}

async fn get_application_appointment<S, N, P>(
    State(engine): State<Arc<RegistrationEngine<S, N, P>>>,
    Path(application_id): Path<String>,
) -> Result<impl IntoResponse, RegistrationError>
where
    S: RegistryStore + 'static,
    N: NotificationDispatcher + 'static,
    P: AccessPolicy + 'static,
{
    let appointment = engine
        .scheduler
        .for_application(&ApplicationId(application_id))?;
    Ok(Json(appointment))
}

async fn get_application_biometrics<S, N, P>(
    State(engine): State<Arc<RegistrationEngine<S, N, P>>>,
    Path(application_id): Path<String>,
) -> Result<impl IntoResponse, RegistrationError>
where
    S: RegistryStore + 'static,
    N: NotificationDispatcher + 'static,
    P: AccessPolicy + 'static,
{
    let record = engine
        .biometrics
        .for_application(&ApplicationId(application_id))?;
    Ok(Json(record))
}

async fn create_credential<S, N, P>(
    State(engine): State<Arc<RegistrationEngine<S, N, P>>>,
    Path(application_id): Path<String>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, RegistrationError>
where
    S: RegistryStore + 'static,
    N: NotificationDispatcher + 'static,
    P: AccessPolicy + 'static,
{
    let caller = caller_from_headers(&headers)?;
    let record = engine
        .credentials
        .create_from_approval(&caller, &ApplicationId(application_id))?;
    Ok((StatusCode::CREATED, Json(record)))
}

async fn get_application_credential<S, N, P>(
    State(engine): State<Arc<RegistrationEngine<S, N, P>>>,
    Path(application_id): Path<String>,
) -> Result<impl IntoResponse, RegistrationError>
where
    S: RegistryStore + 'static,
    N: NotificationDispatcher + 'static,
    P: AccessPolicy + 'static,
{
    let record = engine
        .credentials
        .for_application(&ApplicationId(application_id))?;
    Ok(Json(record))
}

async fn book_appointment<S, N, P>(
    State(engine): State<Arc<RegistrationEngine<S, N, P>>>,
    headers: HeaderMap,
    Json(request): Json<BookingRequest>,
) -> Result<impl IntoResponse, RegistrationError>
where
    S: RegistryStore + 'static,
    N: NotificationDispatcher + 'static,
    P: AccessPolicy + 'static,
{
    let caller = caller_from_headers(&headers)?;
    let appointment = engine.scheduler.book(&caller, request)?;
    Ok((StatusCode::CREATED, Json(appointment)))
}

async fn list_appointments<S, N, P>(
    State(engine): State<Arc<RegistrationEngine<S, N, P>>>,
    Query(query): Query<ListAppointmentsQuery>,
) -> Result<impl IntoResponse, RegistrationError>
where
    S: RegistryStore + 'static,
    N: NotificationDispatcher + 'static,
    P: AccessPolicy + 'static,
{
    let appointments = engine
        .scheduler
        .list(query.center.as_deref(), query.date)?;
    Ok(Json(appointments))
}

async fn slot_availability<S, N, P>(
    State(engine): State<Arc<RegistrationEngine<S, N, P>>>,
    Query(query): Query<AvailabilityQuery>,
) -> Result<impl IntoResponse, RegistrationError>
where
    S: RegistryStore + 'static,
    N: NotificationDispatcher + 'static,
    P: AccessPolicy + 'static,
{
    let slots = engine.scheduler.availability(&query.center, query.date)?;
    Ok(Json(slots))
}

async fn get_appointment<S, N, P>(
    State(engine): State<Arc<RegistrationEngine<S, N, P>>>,
    Path(appointment_id): Path<String>,
) -> Result<impl IntoResponse, RegistrationError>
where
    S: RegistryStore + 'static,
    N: NotificationDispatcher + 'static,
    P: AccessPolicy + 'static,
{
    let appointment = engine.scheduler.get(&AppointmentId(appointment_id))?;
    Ok(Json(appointment))
}

async fn reschedule_appointment<S, N, P>(
    State(engine): State<Arc<RegistrationEngine<S, N, P>>>,
    Path(appointment_id): Path<String>,
    headers: HeaderMap,
    Json(request): Json<RescheduleRequest>,
) -> Result<impl IntoResponse, RegistrationError>
where
    S: RegistryStore + 'static,
    N: NotificationDispatcher + 'static,
    P: AccessPolicy + 'static,
{
    let caller = caller_from_headers(&headers)?;
    let appointment = engine.scheduler.reschedule(
        &caller,
        &AppointmentId(appointment_id),
        request.date,
        request.time_slot,
        &request.reason,
    )?;
    Ok(Json(appointment))
}

async fn check_in_appointment<S, N, P>(
    State(engine): State<Arc<RegistrationEngine<S, N, P>>>,
    Path(appointment_id): Path<String>,
    headers: HeaderMap,
    Json(request): Json<CheckInRequest>,
) -> Result<impl IntoResponse, RegistrationError>
where
    S: RegistryStore + 'static,
    N: NotificationDispatcher + 'static,
    P: AccessPolicy + 'static,
{
    let caller = caller_from_headers(&headers)?;
    let appointment =
        engine
            .scheduler
            .check_in(&caller, &AppointmentId(appointment_id), &request.staff_id)?;
    Ok(Json(appointment))
}

async fn cancel_appointment<S, N, P>(
    State(engine): State<Arc<RegistrationEngine<S, N, P>>>,
    Path(appointment_id): Path<String>,
    headers: HeaderMap,
    Json(request): Json<CancelRequest>,
) -> Result<impl IntoResponse, RegistrationError>
where
    S: RegistryStore + 'static,
    N: NotificationDispatcher + 'static,
    P: AccessPolicy + 'static,
{
    let caller = caller_from_headers(&headers)?;
    let appointment =
        engine
            .scheduler
            .cancel(&caller, &AppointmentId(appointment_id), &request.reason)?;
    Ok(Json(appointment))
}

async fn start_capture<S, N, P>(
    State(engine): State<Arc<RegistrationEngine<S, N, P>>>,
    headers: HeaderMap,
    Json(request): Json<StartCaptureRequest>,
) -> Result<impl IntoResponse, RegistrationError>
where
    S: RegistryStore + 'static,
    N: NotificationDispatcher + 'static,
    P: AccessPolicy + 'static,
{
    let caller = caller_from_headers(&headers)?;
    let record = engine
        .biometrics
        .start_capture(&caller, &request.application_id)?;
    Ok((StatusCode::CREATED, Json(record)))
}

async fn capture_fingerprints<S, N, P>(
    State(engine): State<Arc<RegistrationEngine<S, N, P>>>,
    Path(record_id): Path<String>,
    headers: HeaderMap,
    Json(request): Json<FingerprintsRequest>,
) -> Result<impl IntoResponse, RegistrationError>
where
    S: RegistryStore + 'static,
    N: NotificationDispatcher + 'static,
    P: AccessPolicy + 'static,
{
    let caller = caller_from_headers(&headers)?;
    let record = engine.biometrics.capture_fingerprints(
        &caller,
        &BiometricRecordId(record_id),
        request.scans,
    )?;
    Ok(Json(record))
}

async fn upload_photograph<S, N, P>(
    State(engine): State<Arc<RegistrationEngine<S, N, P>>>,
    Path(record_id): Path<String>,
    headers: HeaderMap,
    Json(request): Json<ArtifactUploadRequest>,
) -> Result<impl IntoResponse, RegistrationError>
where
    S: RegistryStore + 'static,
    N: NotificationDispatcher + 'static,
    P: AccessPolicy + 'static,
{
    let caller = caller_from_headers(&headers)?;
    let record = engine.biometrics.upload_photograph(
        &caller,
        &BiometricRecordId(record_id),
        request.artifact,
        request.quality,
    )?;
    Ok(Json(record))
}

async fn upload_signature<S, N, P>(
    State(engine): State<Arc<RegistrationEngine<S, N, P>>>,
    Path(record_id): Path<String>,
    headers: HeaderMap,
    Json(request): Json<ArtifactUploadRequest>,
) -> Result<impl IntoResponse, RegistrationError>
where
    S: RegistryStore + 'static,
    N: NotificationDispatcher + 'static,
    P: AccessPolicy + 'static,
{
    let caller = caller_from_headers(&headers)?;
    let record = engine.biometrics.upload_signature(
        &caller,
        &BiometricRecordId(record_id),
        request.artifact,
        request.quality,
    )?;
    Ok(Json(record))
}

async fn complete_capture<S, N, P>(
    State(engine): State<Arc<RegistrationEngine<S, N, P>>>,
    Path(record_id): Path<String>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, RegistrationError>
where
    S: RegistryStore + 'static,
    N: NotificationDispatcher + 'static,
    P: AccessPolicy + 'static,
{
    let caller = caller_from_headers(&headers)?;
    let record = engine
        .biometrics
        .complete(&caller, &BiometricRecordId(record_id))?;
    Ok(Json(record))
}

async fn verify_capture<S, N, P>(
    State(engine): State<Arc<RegistrationEngine<S, N, P>>>,
    Path(record_id): Path<String>,
    headers: HeaderMap,
    Json(request): Json<VerifyRequest>,
) -> Result<impl IntoResponse, RegistrationError>
where
    S: RegistryStore + 'static,
    N: NotificationDispatcher + 'static,
    P: AccessPolicy + 'static,
{
    let caller = caller_from_headers(&headers)?;
    let record = engine.biometrics.verify(
        &caller,
        &BiometricRecordId(record_id),
        request.verdict,
        request.notes,
    )?;
    Ok(Json(record))
}

async fn get_credential<S, N, P>(
    State(engine): State<Arc<RegistrationEngine<S, N, P>>>,
    Path(credential_id): Path<String>,
) -> Result<impl IntoResponse, RegistrationError>
where
    S: RegistryStore + 'static,
    N: NotificationDispatcher + 'static,
    P: AccessPolicy + 'static,
{
    let record = engine.credentials.get(&CredentialId(credential_id))?;
    Ok(Json(record))
}

async fn approve_design<S, N, P>(
    State(engine): State<Arc<RegistrationEngine<S, N, P>>>,
    Path(credential_id): Path<String>,
    headers: HeaderMap,
    Json(request): Json<ApproveDesignRequest>,
) -> Result<impl IntoResponse, RegistrationError>
where
    S: RegistryStore + 'static,
    N: NotificationDispatcher + 'static,
    P: AccessPolicy + 'static,
{
    let caller = caller_from_headers(&headers)?;
    let record =
        engine
            .credentials
            .approve_design(&caller, &CredentialId(credential_id), request.notes)?;
    Ok(Json(record))
}

async fn reject_design<S, N, P>(
    State(engine): State<Arc<RegistrationEngine<S, N, P>>>,
    Path(credential_id): Path<String>,
    headers: HeaderMap,
    Json(request): Json<RejectDesignRequest>,
) -> Result<impl IntoResponse, RegistrationError>
where
    S: RegistryStore + 'static,
    N: NotificationDispatcher + 'static,
    P: AccessPolicy + 'static,
{
    let caller = caller_from_headers(&headers)?;
    let record =
        engine
            .credentials
            .reject_design(&caller, &CredentialId(credential_id), &request.reason)?;
    Ok(Json(record))
}

async fn mark_printed<S, N, P>(
    State(engine): State<Arc<RegistrationEngine<S, N, P>>>,
    Path(credential_id): Path<String>,
    headers: HeaderMap,
    Json(request): Json<PrintRequest>,
) -> Result<impl IntoResponse, RegistrationError>
where
    S: RegistryStore + 'static,
    N: NotificationDispatcher + 'static,
    P: AccessPolicy + 'static,
{
    let caller = caller_from_headers(&headers)?;
    let record = engine.credentials.mark_printed(
        &caller,
        &CredentialId(credential_id),
        &request.batch_number,
    )?;
    Ok(Json(record))
}

async fn issue_credential<S, N, P>(
    State(engine): State<Arc<RegistrationEngine<S, N, P>>>,
    Path(credential_id): Path<String>,
    headers: HeaderMap,
    Json(request): Json<IssueRequest>,
) -> Result<impl IntoResponse, RegistrationError>
where
    S: RegistryStore + 'static,
    N: NotificationDispatcher + 'static,
    P: AccessPolicy + 'static,
{
    let caller = caller_from_headers(&headers)?;
    let record = engine.credentials.issue(
        &caller,
        &CredentialId(credential_id),
        request.recipient_signature,
        request.notes,
    )?;
    Ok(Json(record))
}

async fn registry_overview<S, N, P>(
    State(engine): State<Arc<RegistrationEngine<S, N, P>>>,
) -> Result<impl IntoResponse, RegistrationError>
where
    S: RegistryStore + 'static,
    N: NotificationDispatcher + 'static,
    P: AccessPolicy + 'static,
{
    let overview = engine.registry.overview()?;
    Ok(Json(overview))
}
