//! Civil-registration workflow engine.
//!
//! Tracks an application from submission through appointment booking,
//! biometric capture, credential design/approval, printing, and issuance.
//! Components share one injected [`store::RegistryStore`] and reference each
//! other by id only; the application status machine is enforced in a single
//! transition table, and all slot-calendar arithmetic happens in atomic store
//! operations.

pub mod access;
pub mod artifacts;
pub mod biometrics;
pub mod calendar;
pub mod credentials;
pub mod domain;
pub mod error;
pub mod memory;
pub mod notify;
pub mod registry;
pub mod router;
pub mod scheduling;
pub mod store;

#[cfg(test)]
mod tests;

use std::sync::Arc;

pub use access::{AccessPolicy, Caller, Permission, RoleLadderPolicy, StaffRole};
pub use artifacts::{ArtifactStore, ArtifactStoreError};
pub use biometrics::{
    BiometricCaptureTracker, BiometricRecord, BiometricRecordId, CaptureArtifact, CaptureQuality,
    CaptureStatus, Finger, FingerprintScan, VerificationStatus,
};
pub use calendar::{SlotAvailability, SlotEntry, SlotKey, STANDARD_TIME_SLOTS};
pub use credentials::{
    CredentialId, CredentialIssuancePipeline, CredentialRecord, CredentialStatus,
    CredentialValidity, PrintStatus,
};
pub use domain::{
    ApplicantInfo, Application, ApplicationId, ApplicationStatus, ApplicationType, ArtifactRef,
    DocumentKind, Note, ReferenceNumber,
};
pub use error::RegistrationError;
pub use memory::InMemoryRegistryStore;
pub use notify::{
    DeliveryOutcome, NotificationChannel, NotificationDispatcher, NotificationError,
    NotificationIntent, NotificationLogEntry, NotificationTemplate,
};
pub use registry::{
    ApplicationFilter, ApplicationPage, ApplicationRegistry, Page, RegistrationSubmission,
    RegistryOverview,
};
pub use router::registration_router;
pub use scheduling::{
    Appointment, AppointmentId, AppointmentScheduler, AppointmentStatus, BookingRequest,
};
pub use store::{RegistryStore, StoreError};

/// All four components wired over one store, dispatcher, and access policy.
/// Constructed once at process start and injected wherever the workflow is
/// driven (HTTP router, CLI demo, tests).
pub struct RegistrationEngine<S, N, P> {
    pub registry: ApplicationRegistry<S, N, P>,
    pub scheduler: AppointmentScheduler<S, N, P>,
    pub biometrics: BiometricCaptureTracker<S, N, P>,
    pub credentials: CredentialIssuancePipeline<S, N, P>,
}

impl<S, N, P> RegistrationEngine<S, N, P>
where
    S: RegistryStore + 'static,
    N: NotificationDispatcher + 'static,
    P: AccessPolicy + 'static,
{
    pub fn new(
        store: Arc<S>,
        notifier: Arc<N>,
        policy: Arc<P>,
        validity: CredentialValidity,
    ) -> Self {
        Self {
            registry: ApplicationRegistry::new(store.clone(), notifier.clone(), policy.clone()),
            scheduler: AppointmentScheduler::new(store.clone(), notifier.clone(), policy.clone()),
            biometrics: BiometricCaptureTracker::new(
                store.clone(),
                notifier.clone(),
                policy.clone(),
            ),
            credentials: CredentialIssuancePipeline::new(store, notifier, policy, validity),
        }
    }
}
