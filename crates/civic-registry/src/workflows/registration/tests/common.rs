use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use chrono::NaiveDate;

use crate::workflows::registration::access::{Caller, RoleLadderPolicy, StaffRole};
use crate::workflows::registration::biometrics::{
    BiometricRecord, CaptureQuality, Finger, FingerprintScan,
};
use crate::workflows::registration::credentials::{CredentialRecord, CredentialValidity};
use crate::workflows::registration::domain::{
    ApplicantInfo, Application, ApplicationStatus, ApplicationType, ArtifactRef, DocumentKind,
};
use crate::workflows::registration::memory::InMemoryRegistryStore;
use crate::workflows::registration::notify::{
    NotificationDispatcher, NotificationError, NotificationIntent,
};
use crate::workflows::registration::registry::RegistrationSubmission;
use crate::workflows::registration::scheduling::{Appointment, BookingRequest};
use crate::workflows::registration::RegistrationEngine;

pub(super) type TestEngine =
    RegistrationEngine<InMemoryRegistryStore, RecordingDispatcher, RoleLadderPolicy>;

/// Dispatcher double that records every intent instead of delivering it.
#[derive(Default, Clone)]
pub(super) struct RecordingDispatcher {
    events: Arc<Mutex<Vec<NotificationIntent>>>,
}

impl RecordingDispatcher {
    pub(super) fn events(&self) -> Vec<NotificationIntent> {
        self.events.lock().expect("dispatcher mutex poisoned").clone()
    }
}

impl NotificationDispatcher for RecordingDispatcher {
    fn dispatch(&self, intent: &NotificationIntent) -> Result<(), NotificationError> {
        self.events
            .lock()
            .expect("dispatcher mutex poisoned")
            .push(intent.clone());
        Ok(())
    }
}

/// Dispatcher double whose transport is always down.
pub(super) struct OfflineDispatcher;

impl NotificationDispatcher for OfflineDispatcher {
    fn dispatch(&self, _intent: &NotificationIntent) -> Result<(), NotificationError> {
        Err(NotificationError::Transport("smtp offline".to_string()))
    }
}

pub(super) fn build_engine() -> (
    TestEngine,
    Arc<InMemoryRegistryStore>,
    Arc<RecordingDispatcher>,
) {
    build_engine_with_capacity(1)
}

pub(super) fn build_engine_with_capacity(
    capacity: u32,
) -> (
    TestEngine,
    Arc<InMemoryRegistryStore>,
    Arc<RecordingDispatcher>,
) {
    let store = Arc::new(InMemoryRegistryStore::new(capacity));
    let dispatcher = Arc::new(RecordingDispatcher::default());
    let engine = RegistrationEngine::new(
        store.clone(),
        dispatcher.clone(),
        Arc::new(RoleLadderPolicy),
        CredentialValidity::default(),
    );
    (engine, store, dispatcher)
}

pub(super) fn applicant() -> Caller {
    Caller::new("portal", StaffRole::Applicant)
}

pub(super) fn clerk() -> Caller {
    Caller::new("clerk-07", StaffRole::Clerk)
}

pub(super) fn officer() -> Caller {
    Caller::new("officer-03", StaffRole::Officer)
}

pub(super) fn supervisor() -> Caller {
    Caller::new("sup-01", StaffRole::Supervisor)
}

pub(super) fn booking_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 2, 1).expect("valid date")
}

pub(super) fn submission() -> RegistrationSubmission {
    let mut documents = BTreeMap::new();
    documents.insert(
        DocumentKind::ProofOfIdentity,
        Some(ArtifactRef("blob://docs/id.pdf".to_string())),
    );
    documents.insert(
        DocumentKind::ProofOfResidence,
        Some(ArtifactRef("blob://docs/residence.pdf".to_string())),
    );
    documents.insert(
        DocumentKind::BirthCertificate,
        Some(ArtifactRef("blob://docs/birth.pdf".to_string())),
    );

    RegistrationSubmission {
        kind: ApplicationType::Citizen,
        applicant: ApplicantInfo {
            full_name: "Amina Diallo".to_string(),
            date_of_birth: NaiveDate::from_ymd_opt(1991, 6, 14).expect("valid date"),
            email: "amina.diallo@example.org".to_string(),
            phone: "+220 555 0102".to_string(),
            address: "12 Harbour Road, Banjul".to_string(),
        },
        documents,
    }
}

pub(super) fn permit_submission() -> RegistrationSubmission {
    let mut submission = submission();
    submission.kind = ApplicationType::ResidentPermit;
    submission.documents.insert(
        DocumentKind::TravelDocument,
        Some(ArtifactRef("blob://docs/passport.pdf".to_string())),
    );
    submission
}

pub(super) fn create_application(engine: &TestEngine) -> Application {
    engine
        .registry
        .create(&applicant(), submission())
        .expect("application created")
}

pub(super) fn booking_request(application: &Application, time_slot: &str) -> BookingRequest {
    BookingRequest {
        application_id: application.id.clone(),
        center: "Central".to_string(),
        date: booking_date(),
        time_slot: time_slot.to_string(),
    }
}

pub(super) fn booked_application(engine: &TestEngine) -> (Application, Appointment) {
    let application = create_application(engine);
    let appointment = engine
        .scheduler
        .book(&clerk(), booking_request(&application, "10:00"))
        .expect("slot booked");
    let application = engine
        .registry
        .get(&application.id)
        .expect("application reloaded");
    (application, appointment)
}

pub(super) fn checked_in_application(engine: &TestEngine) -> (Application, Appointment) {
    let (application, appointment) = booked_application(engine);
    let appointment = engine
        .scheduler
        .check_in(&clerk(), &appointment.id, "officer-03")
        .expect("checked in");
    (application, appointment)
}

pub(super) fn full_scan_set() -> Vec<FingerprintScan> {
    vec![
        FingerprintScan {
            finger: Finger::LeftThumb,
            artifact: ArtifactRef("blob://bio/left-thumb.wsq".to_string()),
            quality: CaptureQuality::Good,
        },
        FingerprintScan {
            finger: Finger::RightThumb,
            artifact: ArtifactRef("blob://bio/right-thumb.wsq".to_string()),
            quality: CaptureQuality::Excellent,
        },
    ]
}

/// Walk an application through capture completion.
pub(super) fn captured_application(engine: &TestEngine) -> (Application, BiometricRecord) {
    let (application, _) = checked_in_application(engine);
    let record = engine
        .biometrics
        .start_capture(&clerk(), &application.id)
        .expect("capture started");
    engine
        .biometrics
        .capture_fingerprints(&clerk(), &record.id, full_scan_set())
        .expect("fingerprints captured");
    engine
        .biometrics
        .upload_photograph(
            &clerk(),
            &record.id,
            ArtifactRef("blob://bio/photo.jpg".to_string()),
            CaptureQuality::Good,
        )
        .expect("photograph uploaded");
    engine
        .biometrics
        .upload_signature(
            &clerk(),
            &record.id,
            ArtifactRef("blob://bio/signature.png".to_string()),
            CaptureQuality::Good,
        )
        .expect("signature uploaded");
    let record = engine
        .biometrics
        .complete(&clerk(), &record.id)
        .expect("capture completed");
    let application = engine
        .registry
        .get(&application.id)
        .expect("application reloaded");
    (application, record)
}

/// Walk an application all the way to `approved`, which auto-creates its
/// credential record.
pub(super) fn approved_application(engine: &TestEngine) -> (Application, CredentialRecord) {
    let (application, _) = captured_application(engine);
    engine
        .registry
        .transition(&officer(), &application.id, ApplicationStatus::UnderReview, None)
        .expect("moved to review");
    let application = engine
        .registry
        .transition(
            &officer(),
            &application.id,
            ApplicationStatus::Approved,
            Some("background check clear".to_string()),
        )
        .expect("approved");
    let credential = engine
        .credentials
        .for_application(&application.id)
        .expect("credential auto-created");
    (application, credential)
}
