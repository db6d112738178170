use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::access::{AccessPolicy, Caller, Permission};
use super::domain::{ApplicationId, ApplicationStatus, ArtifactRef, Note};
use super::error::RegistrationError;
use super::notify::NotificationDispatcher;
use super::registry::{advance_application, fetch_application};
use super::scheduling::AppointmentStatus;
use super::store::RegistryStore;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BiometricRecordId(pub String);

/// The ten digits, little fingers outward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Finger {
    LeftLittle,
    LeftRing,
    LeftMiddle,
    LeftIndex,
    LeftThumb,
    RightThumb,
    RightIndex,
    RightMiddle,
    RightRing,
    RightLittle,
}

impl Finger {
    pub const fn label(self) -> &'static str {
        match self {
            Finger::LeftLittle => "left_little",
            Finger::LeftRing => "left_ring",
            Finger::LeftMiddle => "left_middle",
            Finger::LeftIndex => "left_index",
            Finger::LeftThumb => "left_thumb",
            Finger::RightThumb => "right_thumb",
            Finger::RightIndex => "right_index",
            Finger::RightMiddle => "right_middle",
            Finger::RightRing => "right_ring",
            Finger::RightLittle => "right_little",
        }
    }
}

/// Scanner-reported quality grade for a captured artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureQuality {
    Poor,
    Fair,
    Good,
    Excellent,
}

impl CaptureQuality {
    pub const fn label(self) -> &'static str {
        match self {
            CaptureQuality::Poor => "poor",
            CaptureQuality::Fair => "fair",
            CaptureQuality::Good => "good",
            CaptureQuality::Excellent => "excellent",
        }
    }
}

/// One scan as submitted by the capture station.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FingerprintScan {
    pub finger: Finger,
    pub artifact: ArtifactRef,
    pub quality: CaptureQuality,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FingerprintCapture {
    pub artifact: ArtifactRef,
    pub quality: CaptureQuality,
    pub captured_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhotographCapture {
    pub artifact: ArtifactRef,
    pub quality: CaptureQuality,
    pub retakes: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureCapture {
    pub artifact: ArtifactRef,
    pub quality: CaptureQuality,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureStatus {
    InProgress,
    Completed,
}

impl CaptureStatus {
    pub const fn label(self) -> &'static str {
        match self {
            CaptureStatus::InProgress => "in_progress",
            CaptureStatus::Completed => "completed",
        }
    }
}

/// Downstream review of a completed capture. `RequiresRecapture` supersedes
/// the record; it never reopens it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    Pending,
    Approved,
    Rejected,
    RequiresRecapture,
}

impl VerificationStatus {
    pub const fn label(self) -> &'static str {
        match self {
            VerificationStatus::Pending => "pending",
            VerificationStatus::Approved => "approved",
            VerificationStatus::Rejected => "rejected",
            VerificationStatus::RequiresRecapture => "requires_recapture",
        }
    }
}

/// The three artifact groups a complete capture needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureArtifact {
    Fingerprints,
    Photograph,
    Signature,
}

impl CaptureArtifact {
    pub const fn label(self) -> &'static str {
        match self {
            CaptureArtifact::Fingerprints => "fingerprints",
            CaptureArtifact::Photograph => "photograph",
            CaptureArtifact::Signature => "signature",
        }
    }
}

/// Capture record for one application. Created at first capture attempt;
/// `Completed` is terminal for capture, verification is a separate gate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BiometricRecord {
    pub id: BiometricRecordId,
    pub application_id: ApplicationId,
    pub fingerprints: BTreeMap<Finger, FingerprintCapture>,
    pub photograph: Option<PhotographCapture>,
    pub signature: Option<SignatureCapture>,
    pub status: CaptureStatus,
    pub verification: VerificationStatus,
    pub notes: Vec<Note>,
    pub completed_at: Option<DateTime<Utc>>,
    pub seq: u64,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BiometricRecord {
    /// Which of the three artifact groups are still missing, in a fixed
    /// order so error payloads are deterministic.
    pub fn missing_artifacts(&self) -> Vec<CaptureArtifact> {
        let mut missing = Vec::new();
        if self.fingerprints.is_empty() {
            missing.push(CaptureArtifact::Fingerprints);
        }
        if self.photograph.is_none() {
            missing.push(CaptureArtifact::Photograph);
        }
        if self.signature.is_none() {
            missing.push(CaptureArtifact::Signature);
        }
        missing
    }
}

static BIOMETRIC_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_record_id() -> BiometricRecordId {
    let id = BIOMETRIC_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    BiometricRecordId(format!("bio-{id:06}"))
}

/// Records capture artifacts for checked-in applicants and gates sign-off on
/// completeness.
pub struct BiometricCaptureTracker<S, N, P> {
    store: Arc<S>,
    notifier: Arc<N>,
    policy: Arc<P>,
}

impl<S, N, P> BiometricCaptureTracker<S, N, P>
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

    /// Open a capture record for a checked-in applicant. Retries must use
    /// [`Self::for_application`]; a second start is a conflict unless the
    /// existing record was sent back for recapture.
    pub fn start_capture(
        &self,
        caller: &Caller,
        application_id: &ApplicationId,
    ) -> Result<BiometricRecord, RegistrationError> {
        self.policy
            .authorize(caller, Permission::CaptureBiometrics)?;

        let application = fetch_application(self.store.as_ref(), application_id)?;
        let appointment = self
            .store
            .appointment_for_application(&application.id)?
            .ok_or_else(|| RegistrationError::NotFound {
                entity: "appointment",
                id: application.id.0.clone(),
            })?;
        if appointment.status != AppointmentStatus::CheckedIn {
            return Err(RegistrationError::InvalidState(format!(
                "appointment {} is {}, applicant must be checked in before capture",
                appointment.id.0,
                appointment.status.label()
            )));
        }

        if let Some(existing) = self.store.biometric_for_application(&application.id)? {
            if existing.verification != VerificationStatus::RequiresRecapture {
                return Err(RegistrationError::Conflict(format!(
                    "biometric record {} already exists for application {}",
                    existing.id.0, application.id.0
                )));
            }
        }

        let now = Utc::now();
        let record = BiometricRecord {
            id: next_record_id(),
            application_id: application.id.clone(),
            fingerprints: BTreeMap::new(),
            photograph: None,
            signature: None,
            status: CaptureStatus::InProgress,
            verification: VerificationStatus::Pending,
            notes: Vec::new(),
            completed_at: None,
            seq: 0,
            version: 0,
            created_at: now,
            updated_at: now,
        };

        let stored = self.store.insert_biometric(record)?;
        info!(
            record = %stored.id.0,
            application = %stored.application_id.0,
            "biometric capture started"
        );
        Ok(stored)
    }

    pub fn capture_fingerprints(
        &self,
        caller: &Caller,
        id: &BiometricRecordId,
        scans: Vec<FingerprintScan>,
    ) -> Result<BiometricRecord, RegistrationError> {
        self.policy
            .authorize(caller, Permission::CaptureBiometrics)?;
        if scans.is_empty() {
            return Err(RegistrationError::Validation(
                "at least one fingerprint scan is required".to_string(),
            ));
        }

        let mut record = self.fetch_mutable(id)?;
        let count = scans.len();
        let captured_at = Utc::now();
        for scan in scans {
            record.fingerprints.insert(
                scan.finger,
                FingerprintCapture {
                    artifact: scan.artifact,
                    quality: scan.quality,
                    captured_at,
                },
            );
        }
        record.notes.push(Note::now(
            format!("captured {count} fingerprint scan(s)"),
            caller.staff_id.clone(),
        ));
        Ok(self.store.update_biometric(record)?)
    }

    pub fn upload_photograph(
        &self,
        caller: &Caller,
        id: &BiometricRecordId,
        artifact: ArtifactRef,
        quality: CaptureQuality,
    ) -> Result<BiometricRecord, RegistrationError> {
        self.policy
            .authorize(caller, Permission::CaptureBiometrics)?;

        let mut record = self.fetch_mutable(id)?;
        let retakes = record
            .photograph
            .as_ref()
            .map(|photo| photo.retakes + 1)
            .unwrap_or(0);
        record.photograph = Some(PhotographCapture {
            artifact,
            quality,
            retakes,
        });
        record.notes.push(Note::now(
            format!("photograph uploaded (quality {}, retakes {retakes})", quality.label()),
            caller.staff_id.clone(),
        ));
        Ok(self.store.update_biometric(record)?)
    }

    pub fn upload_signature(
        &self,
        caller: &Caller,
        id: &BiometricRecordId,
        artifact: ArtifactRef,
        quality: CaptureQuality,
    ) -> Result<BiometricRecord, RegistrationError> {
        self.policy
            .authorize(caller, Permission::CaptureBiometrics)?;

        let mut record = self.fetch_mutable(id)?;
        record.signature = Some(SignatureCapture { artifact, quality });
        record.notes.push(Note::now(
            format!("signature uploaded (quality {})", quality.label()),
            caller.staff_id.clone(),
        ));
        Ok(self.store.update_biometric(record)?)
    }

    /// Close the capture once all three artifact groups are present, and move
    /// the wider workflow along: application to `biometric_captured`, the
    /// appointment to `biometric_completed`.
    pub fn complete(
        &self,
        caller: &Caller,
        id: &BiometricRecordId,
    ) -> Result<BiometricRecord, RegistrationError> {
        self.policy
            .authorize(caller, Permission::CaptureBiometrics)?;

        let mut record = self.fetch(id)?;
        if record.status == CaptureStatus::Completed {
            return Err(RegistrationError::InvalidState(format!(
                "biometric record {} is already completed",
                record.id.0
            )));
        }
        let missing = record.missing_artifacts();
        if !missing.is_empty() {
            return Err(RegistrationError::IncompleteCapture { missing });
        }

        let now = Utc::now();
        record.status = CaptureStatus::Completed;
        record.completed_at = Some(now);
        record.notes.push(Note::now(
            "capture completed".to_string(),
            caller.staff_id.clone(),
        ));
        let stored = self.store.update_biometric(record)?;

        advance_application(
            self.store.as_ref(),
            self.notifier.as_ref(),
            &stored.application_id,
            ApplicationStatus::BiometricCaptured,
            Some(Note::now(
                format!("biometric capture {} completed", stored.id.0),
                caller.staff_id.clone(),
            )),
        )?;

        if let Some(mut appointment) = self
            .store
            .appointment_for_application(&stored.application_id)?
        {
            if appointment.status == AppointmentStatus::CheckedIn {
                appointment.status = AppointmentStatus::BiometricCompleted;
                appointment.completed_time = Some(now);
                self.store.update_appointment(appointment)?;
            }
        }

        info!(
            record = %stored.id.0,
            application = %stored.application_id.0,
            "biometric capture completed"
        );
        Ok(stored)
    }

    /// Record the verification verdict on a completed capture.
    pub fn verify(
        &self,
        caller: &Caller,
        id: &BiometricRecordId,
        verdict: VerificationStatus,
        notes: Option<String>,
    ) -> Result<BiometricRecord, RegistrationError> {
        self.policy
            .authorize(caller, Permission::VerifyBiometrics)?;
        if verdict == VerificationStatus::Pending {
            return Err(RegistrationError::Validation(
                "verification verdict must be a decision".to_string(),
            ));
        }

        let mut record = self.fetch(id)?;
        if record.status != CaptureStatus::Completed {
            return Err(RegistrationError::InvalidState(format!(
                "biometric record {} is not completed",
                record.id.0
            )));
        }

        record.verification = verdict;
        if let Some(text) = notes
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty())
        {
            record.notes.push(Note::now(text, caller.staff_id.clone()));
        }
        let stored = self.store.update_biometric(record)?;
        info!(
            record = %stored.id.0,
            verdict = verdict.label(),
            "biometric record verified"
        );
        Ok(stored)
    }

    pub fn get(&self, id: &BiometricRecordId) -> Result<BiometricRecord, RegistrationError> {
        self.fetch(id)
    }

    pub fn for_application(
        &self,
        application_id: &ApplicationId,
    ) -> Result<BiometricRecord, RegistrationError> {
        self.store
            .biometric_for_application(application_id)?
            .ok_or_else(|| RegistrationError::NotFound {
                entity: "biometric record",
                id: application_id.0.clone(),
            })
    }

    fn fetch(&self, id: &BiometricRecordId) -> Result<BiometricRecord, RegistrationError> {
        self.store
            .biometric(id)?
            .ok_or_else(|| RegistrationError::NotFound {
                entity: "biometric record",
                id: id.0.clone(),
            })
    }

    /// Fetch for mutation; completed records refuse further capture writes.
    fn fetch_mutable(&self, id: &BiometricRecordId) -> Result<BiometricRecord, RegistrationError> {
        let record = self.fetch(id)?;
        if record.status == CaptureStatus::Completed {
            return Err(RegistrationError::InvalidState(format!(
                "biometric record {} is completed and can no longer be modified",
                record.id.0
            )));
        }
        Ok(record)
    }
}
