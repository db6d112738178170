use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Identifier wrapper for registration applications.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ApplicationId(pub String);

/// Human-facing tracking number, assigned exactly once at creation and never
/// reused, even after rejection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceNumber(pub String);

/// Opaque handle returned by the external document/artifact store. The engine
/// never inspects what it points at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRef(pub String);

/// Registration track the applicant is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationType {
    Citizen,
    ResidentPermit,
}

impl ApplicationType {
    pub const fn label(self) -> &'static str {
        match self {
            ApplicationType::Citizen => "citizen",
            ApplicationType::ResidentPermit => "resident_permit",
        }
    }

    pub const fn reference_prefix(self) -> &'static str {
        match self {
            ApplicationType::Citizen => "CIT",
            ApplicationType::ResidentPermit => "RES",
        }
    }

    /// Document kinds that must be attached before a submission is accepted.
    pub const fn required_documents(self) -> &'static [DocumentKind] {
        match self {
            ApplicationType::Citizen => &[
                DocumentKind::ProofOfIdentity,
                DocumentKind::ProofOfResidence,
                DocumentKind::BirthCertificate,
            ],
            ApplicationType::ResidentPermit => &[
                DocumentKind::ProofOfIdentity,
                DocumentKind::ProofOfResidence,
                DocumentKind::TravelDocument,
            ],
        }
    }

    pub fn from_label(value: &str) -> Option<Self> {
        match value {
            "citizen" => Some(ApplicationType::Citizen),
            "resident_permit" => Some(ApplicationType::ResidentPermit),
            _ => None,
        }
    }
}

/// Kinds of supporting documents tracked against an application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    ProofOfIdentity,
    ProofOfResidence,
    BirthCertificate,
    TravelDocument,
    SupportingLetter,
}

impl DocumentKind {
    pub const fn label(self) -> &'static str {
        match self {
            DocumentKind::ProofOfIdentity => "proof_of_identity",
            DocumentKind::ProofOfResidence => "proof_of_residence",
            DocumentKind::BirthCertificate => "birth_certificate",
            DocumentKind::TravelDocument => "travel_document",
            DocumentKind::SupportingLetter => "supporting_letter",
        }
    }
}

/// Contact and identity fields collected at intake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicantInfo {
    pub full_name: String,
    pub date_of_birth: NaiveDate,
    pub email: String,
    pub phone: String,
    pub address: String,
}

/// Lifecycle of an application. Transitions are validated against
/// [`ApplicationStatus::allowed_targets`]; there is no other path between
/// states anywhere in the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStatus {
    PendingAppointment,
    AppointmentConfirmed,
    BiometricCaptured,
    UnderReview,
    Approved,
    Rejected,
    IdReady,
    Completed,
}

impl ApplicationStatus {
    pub const fn label(self) -> &'static str {
        match self {
            ApplicationStatus::PendingAppointment => "pending_appointment",
            ApplicationStatus::AppointmentConfirmed => "appointment_confirmed",
            ApplicationStatus::BiometricCaptured => "biometric_captured",
            ApplicationStatus::UnderReview => "under_review",
            ApplicationStatus::Approved => "approved",
            ApplicationStatus::Rejected => "rejected",
            ApplicationStatus::IdReady => "id_ready",
            ApplicationStatus::Completed => "completed",
        }
    }

    /// Forward edges of the state machine. `Rejected` is reachable from
    /// `UnderReview` only; `Rejected` and `Completed` are terminal.
    pub const fn allowed_targets(self) -> &'static [ApplicationStatus] {
        match self {
            ApplicationStatus::PendingAppointment => &[ApplicationStatus::AppointmentConfirmed],
            ApplicationStatus::AppointmentConfirmed => &[ApplicationStatus::BiometricCaptured],
            ApplicationStatus::BiometricCaptured => &[ApplicationStatus::UnderReview],
            ApplicationStatus::UnderReview => {
                &[ApplicationStatus::Approved, ApplicationStatus::Rejected]
            }
            ApplicationStatus::Approved => &[ApplicationStatus::IdReady],
            ApplicationStatus::IdReady => &[ApplicationStatus::Completed],
            ApplicationStatus::Rejected | ApplicationStatus::Completed => &[],
        }
    }

    pub fn permits(self, target: ApplicationStatus) -> bool {
        self.allowed_targets().contains(&target)
    }

    pub fn is_terminal(self) -> bool {
        self.allowed_targets().is_empty()
    }

    pub fn from_label(value: &str) -> Option<Self> {
        match value {
            "pending_appointment" => Some(ApplicationStatus::PendingAppointment),
            "appointment_confirmed" => Some(ApplicationStatus::AppointmentConfirmed),
            "biometric_captured" => Some(ApplicationStatus::BiometricCaptured),
            "under_review" => Some(ApplicationStatus::UnderReview),
            "approved" => Some(ApplicationStatus::Approved),
            "rejected" => Some(ApplicationStatus::Rejected),
            "id_ready" => Some(ApplicationStatus::IdReady),
            "completed" => Some(ApplicationStatus::Completed),
            _ => None,
        }
    }

    pub const fn all() -> &'static [ApplicationStatus] {
        &[
            ApplicationStatus::PendingAppointment,
            ApplicationStatus::AppointmentConfirmed,
            ApplicationStatus::BiometricCaptured,
            ApplicationStatus::UnderReview,
            ApplicationStatus::Approved,
            ApplicationStatus::Rejected,
            ApplicationStatus::IdReady,
            ApplicationStatus::Completed,
        ]
    }
}

impl fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Append-only audit note with server-assigned timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    pub text: String,
    pub author: String,
    pub recorded_at: DateTime<Utc>,
}

impl Note {
    pub fn now(text: impl Into<String>, author: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            author: author.into(),
            recorded_at: Utc::now(),
        }
    }
}

/// Canonical application record owned by the registry. Other components hold
/// its id only; cross-entity effects go through the shared store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Application {
    pub id: ApplicationId,
    pub reference: ReferenceNumber,
    pub kind: ApplicationType,
    pub applicant: ApplicantInfo,
    pub status: ApplicationStatus,
    pub documents: BTreeMap<DocumentKind, Option<ArtifactRef>>,
    pub notes: Vec<Note>,
    /// Insertion order, assigned by the store; stable secondary sort key for
    /// pagination.
    pub seq: u64,
    /// Optimistic concurrency version, bumped by the store on every update.
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

static LAST_MINTED_MILLIS: AtomicI64 = AtomicI64::new(0);

/// Millisecond timestamp guaranteed to be strictly increasing across the
/// process, so timestamp-derived identifiers (reference numbers, id numbers)
/// never collide even when minted in the same instant.
pub(crate) fn monotonic_millis() -> i64 {
    let now = Utc::now().timestamp_millis();
    let mut prev = LAST_MINTED_MILLIS.load(Ordering::Relaxed);
    loop {
        let candidate = now.max(prev + 1);
        match LAST_MINTED_MILLIS.compare_exchange(
            prev,
            candidate,
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => return candidate,
            Err(actual) => prev = actual,
        }
    }
}

impl ReferenceNumber {
    pub(crate) fn mint(kind: ApplicationType) -> Self {
        ReferenceNumber(format!("{}-{}", kind.reference_prefix(), monotonic_millis()))
    }
}
