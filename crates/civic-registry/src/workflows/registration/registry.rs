use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::access::{AccessPolicy, Caller, Permission};
use super::credentials;
use super::domain::{
    ApplicantInfo, Application, ApplicationId, ApplicationStatus, ApplicationType, ArtifactRef,
    DocumentKind, Note, ReferenceNumber,
};
use super::error::RegistrationError;
use super::notify::{self, NotificationDispatcher, NotificationTemplate};
use super::store::RegistryStore;

/// Intake payload for a new registration request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistrationSubmission {
    pub kind: ApplicationType,
    pub applicant: ApplicantInfo,
    #[serde(default)]
    pub documents: BTreeMap<DocumentKind, Option<ArtifactRef>>,
}

static APPLICATION_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_application_id() -> ApplicationId {
    let id = APPLICATION_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    ApplicationId(format!("app-{id:06}"))
}

/// Owns the canonical application record and its status state machine. All
/// other components advance applications through [`advance_application`], so
/// the transition table is enforced in exactly one place.
pub struct ApplicationRegistry<S, N, P> {
    store: Arc<S>,
    notifier: Arc<N>,
    policy: Arc<P>,
}

impl<S, N, P> ApplicationRegistry<S, N, P>
where
    S: RegistryStore + 'static,
    N: NotificationDispatcher + 'static,
    P: AccessPolicy + 'static,
{
    pub fn new(store: Arc<S>, notifier: Arc<N>, policy: Arc<P>) -> Self {
        Self {
            store,
            notifier,
            policy,
        }
    }

    /// Accept a submission, mint the identifiers, and persist the record in
    /// `pending_appointment`.
    pub fn create(
        &self,
        caller: &Caller,
        submission: RegistrationSubmission,
    ) -> Result<Application, RegistrationError> {
        self.policy
            .authorize(caller, Permission::SubmitApplication)?;
        validate_submission(&submission)?;

        let now = Utc::now();
        let application = Application {
            id: next_application_id(),
            reference: ReferenceNumber::mint(submission.kind),
            kind: submission.kind,
            applicant: submission.applicant,
            status: ApplicationStatus::PendingAppointment,
            documents: submission.documents,
            notes: Vec::new(),
            seq: 0,
            version: 0,
            created_at: now,
            updated_at: now,
        };

        let stored = self.store.insert_application(application)?;
        info!(
            application = %stored.id.0,
            reference = %stored.reference.0,
            kind = stored.kind.label(),
            "application created"
        );
        Ok(stored)
    }

    /// Move an application along the state machine. Review decisions come in
    /// through here; scheduling and capture advance applications via the same
    /// internal helper.
    pub fn transition(
        &self,
        caller: &Caller,
        id: &ApplicationId,
        target: ApplicationStatus,
        note: Option<String>,
    ) -> Result<Application, RegistrationError> {
        self.policy
            .authorize(caller, Permission::ReviewApplications)?;
        let note = note
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty())
            .map(|text| Note::now(text, caller.staff_id.clone()));
        advance_application(
            self.store.as_ref(),
            self.notifier.as_ref(),
            id,
            target,
            note,
        )
    }

    pub fn add_note(
        &self,
        caller: &Caller,
        id: &ApplicationId,
        text: &str,
    ) -> Result<Application, RegistrationError> {
        self.policy.authorize(caller, Permission::AddNotes)?;
        let text = text.trim();
        if text.is_empty() {
            return Err(RegistrationError::Validation(
                "note text must not be empty".to_string(),
            ));
        }

        let mut application = fetch_application(self.store.as_ref(), id)?;
        application
            .notes
            .push(Note::now(text, caller.staff_id.clone()));
        Ok(self.store.update_application(application)?)
    }

    pub fn get(&self, id: &ApplicationId) -> Result<Application, RegistrationError> {
        fetch_application(self.store.as_ref(), id)
    }

    /// Filtered, paginated listing in stable creation order, so concurrent
    /// inserts never skip or duplicate rows across pages.
    pub fn list(
        &self,
        filter: &ApplicationFilter,
        page: &Page,
    ) -> Result<ApplicationPage, RegistrationError> {
        let mut applications = self.store.applications()?;

        if let Some(center) = filter.center.as_deref() {
            let booked_at_center: HashSet<ApplicationId> = self
                .store
                .appointments()?
                .into_iter()
                .filter(|appointment| {
                    !appointment.is_cancelled() && appointment.slot.center == center
                })
                .map(|appointment| appointment.application_id)
                .collect();
            applications.retain(|application| booked_at_center.contains(&application.id));
        }
        if let Some(status) = filter.status {
            applications.retain(|application| application.status == status);
        }
        if let Some(kind) = filter.kind {
            applications.retain(|application| application.kind == kind);
        }

        let total = applications.len();
        let items = applications
            .into_iter()
            .skip(page.offset)
            .take(page.limit)
            .collect();

        Ok(ApplicationPage {
            total,
            offset: page.offset,
            limit: page.limit,
            items,
        })
    }

    /// Counts by status for every entity type, for dashboard overviews.
    pub fn overview(&self) -> Result<RegistryOverview, RegistrationError> {
        let mut applications = BTreeMap::new();
        for application in self.store.applications()? {
            *applications
                .entry(application.status.label().to_string())
                .or_insert(0usize) += 1;
        }

        let mut appointments = BTreeMap::new();
        for appointment in self.store.appointments()? {
            *appointments
                .entry(appointment.status.label().to_string())
                .or_insert(0usize) += 1;
        }

        let mut captures = BTreeMap::new();
        for record in self.store.biometrics()? {
            *captures
                .entry(record.status.label().to_string())
                .or_insert(0usize) += 1;
        }

        let mut credentials = BTreeMap::new();
        for record in self.store.credentials()? {
            *credentials
                .entry(record.status.label().to_string())
                .or_insert(0usize) += 1;
        }

        Ok(RegistryOverview {
            applications,
            appointments,
            captures,
            credentials,
        })
    }
}

/// Listing filters; all optional, combined with AND.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplicationFilter {
    pub status: Option<ApplicationStatus>,
    pub kind: Option<ApplicationType>,
    pub center: Option<String>,
}

/// Offset/limit window over the creation-ordered listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub offset: usize,
    pub limit: usize,
}

impl Default for Page {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: 50,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ApplicationPage {
    pub total: usize,
    pub offset: usize,
    pub limit: usize,
    pub items: Vec<Application>,
}

/// Counts by status per entity type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegistryOverview {
    pub applications: BTreeMap<String, usize>,
    pub appointments: BTreeMap<String, usize>,
    pub captures: BTreeMap<String, usize>,
    pub credentials: BTreeMap<String, usize>,
}

fn validate_submission(submission: &RegistrationSubmission) -> Result<(), RegistrationError> {
    let applicant = &submission.applicant;
    for (field, value) in [
        ("full_name", &applicant.full_name),
        ("email", &applicant.email),
        ("phone", &applicant.phone),
        ("address", &applicant.address),
    ] {
        if value.trim().is_empty() {
            return Err(RegistrationError::Validation(format!(
                "applicant {field} must not be empty"
            )));
        }
    }
    if !applicant.email.contains('@') {
        return Err(RegistrationError::Validation(
            "applicant email must contain '@'".to_string(),
        ));
    }

    let missing: Vec<&'static str> = submission
        .kind
        .required_documents()
        .iter()
        .filter(|kind| {
            !matches!(submission.documents.get(*kind), Some(Some(reference)) if !reference.0.trim().is_empty())
        })
        .map(|kind| kind.label())
        .collect();
    if !missing.is_empty() {
        return Err(RegistrationError::Validation(format!(
            "missing required documents: {}",
            missing.join(", ")
        )));
    }

    Ok(())
}

pub(crate) fn fetch_application<S: RegistryStore + ?Sized>(
    store: &S,
    id: &ApplicationId,
) -> Result<Application, RegistrationError> {
    store
        .application(id)?
        .ok_or_else(|| RegistrationError::NotFound {
            entity: "application",
            id: id.0.clone(),
        })
}

/// The single gate through which application status ever changes forward.
/// Validates the edge against the transition table, persists, then runs the
/// transition's side effects: credential creation on `approved` (idempotent)
/// and notification intents on `appointment_confirmed` / `id_ready`.
pub(crate) fn advance_application<S, N>(
    store: &S,
    notifier: &N,
    id: &ApplicationId,
    target: ApplicationStatus,
    note: Option<Note>,
) -> Result<Application, RegistrationError>
where
    S: RegistryStore + ?Sized,
    N: NotificationDispatcher + ?Sized,
{
    let mut application = fetch_application(store, id)?;
    if !application.status.permits(target) {
        return Err(RegistrationError::InvalidTransition {
            from: application.status,
            to: target,
        });
    }

    let from = application.status;
    application.status = target;
    if let Some(note) = note {
        application.notes.push(note);
    }
    let application = store.update_application(application)?;
    info!(
        application = %application.id.0,
        from = from.label(),
        to = target.label(),
        "application transitioned"
    );

    match target {
        ApplicationStatus::Approved => {
            credentials::ensure_credential(store, &application)?;
        }
        ApplicationStatus::AppointmentConfirmed => {
            let intent = notify::intent_for(
                &application,
                NotificationTemplate::AppointmentConfirmed,
                BTreeMap::new(),
            );
            notify::dispatch(store, notifier, intent);
        }
        ApplicationStatus::IdReady => {
            let intent = notify::intent_for(
                &application,
                NotificationTemplate::CredentialReady,
                BTreeMap::new(),
            );
            notify::dispatch(store, notifier, intent);
        }
        _ => {}
    }

    Ok(application)
}

/// Hand the application back to scheduling after its appointment was
/// cancelled. This is the one sanctioned move outside the forward table, and
/// it only ever lands back on `pending_appointment`.
pub(crate) fn reopen_for_booking<S: RegistryStore + ?Sized>(
    store: &S,
    id: &ApplicationId,
    note: Note,
) -> Result<Application, RegistrationError> {
    let mut application = fetch_application(store, id)?;
    if application.status != ApplicationStatus::AppointmentConfirmed {
        return Ok(application);
    }
    application.status = ApplicationStatus::PendingAppointment;
    application.notes.push(note);
    Ok(store.update_application(application)?)
}
