use super::biometrics::{BiometricRecord, BiometricRecordId};
use super::calendar::SlotKey;
use super::credentials::{CredentialId, CredentialRecord};
use super::domain::{Application, ApplicationId};
use super::notify::NotificationLogEntry;
use super::scheduling::{Appointment, AppointmentId};

/// Failures at the storage seam. `SlotFull` and `Conflict` are expected
/// outcomes the services translate into workflow errors; `VersionConflict`
/// and `Unavailable` are the unexpected class.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("slot capacity exhausted")]
    SlotFull,
    #[error("stale write: record changed since it was read")]
    VersionConflict,
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// The shared store object every component is handed at construction.
/// Entities are flat keyed tables; components hold ids, never references
/// into each other. Update methods check the record's optimistic `version`
/// and bump it. The three slot-calendar mutators are each one atomic step:
/// no caller ever observes (or creates) a half-applied capacity change.
pub trait RegistryStore: Send + Sync {
    // applications
    fn insert_application(&self, application: Application) -> Result<Application, StoreError>;
    fn update_application(&self, application: Application) -> Result<Application, StoreError>;
    fn application(&self, id: &ApplicationId) -> Result<Option<Application>, StoreError>;
    /// All applications in creation order (stable pagination key).
    fn applications(&self) -> Result<Vec<Application>, StoreError>;

    // appointments
    fn insert_appointment(&self, appointment: Appointment) -> Result<Appointment, StoreError>;
    fn update_appointment(&self, appointment: Appointment) -> Result<Appointment, StoreError>;
    fn appointment(&self, id: &AppointmentId) -> Result<Option<Appointment>, StoreError>;
    /// The latest appointment booked for an application, cancelled or not.
    fn appointment_for_application(
        &self,
        id: &ApplicationId,
    ) -> Result<Option<Appointment>, StoreError>;
    fn appointments(&self) -> Result<Vec<Appointment>, StoreError>;

    // slot calendar
    fn slot_capacity(&self, key: &SlotKey) -> Result<u32, StoreError>;
    fn set_slot_capacity(&self, key: &SlotKey, capacity: u32) -> Result<(), StoreError>;
    fn booked_count(&self, key: &SlotKey) -> Result<u32, StoreError>;
    /// Atomic check-and-increment; `SlotFull` when `booked == capacity`,
    /// leaving the counter untouched.
    fn reserve_slot(&self, key: &SlotKey) -> Result<(), StoreError>;
    fn release_slot(&self, key: &SlotKey) -> Result<(), StoreError>;
    /// Atomic release of `from` plus reserve of `to`; on `SlotFull` neither
    /// counter moves. Moving a booking onto its own slot is a no-op.
    fn move_slot(&self, from: &SlotKey, to: &SlotKey) -> Result<(), StoreError>;

    // biometric records
    fn insert_biometric(&self, record: BiometricRecord) -> Result<BiometricRecord, StoreError>;
    fn update_biometric(&self, record: BiometricRecord) -> Result<BiometricRecord, StoreError>;
    fn biometric(&self, id: &BiometricRecordId) -> Result<Option<BiometricRecord>, StoreError>;
    /// The latest capture record for an application.
    fn biometric_for_application(
        &self,
        id: &ApplicationId,
    ) -> Result<Option<BiometricRecord>, StoreError>;
    fn biometrics(&self) -> Result<Vec<BiometricRecord>, StoreError>;

    // credential records
    fn insert_credential(&self, record: CredentialRecord) -> Result<CredentialRecord, StoreError>;
    fn update_credential(&self, record: CredentialRecord) -> Result<CredentialRecord, StoreError>;
    fn credential(&self, id: &CredentialId) -> Result<Option<CredentialRecord>, StoreError>;
    fn credential_for_application(
        &self,
        id: &ApplicationId,
    ) -> Result<Option<CredentialRecord>, StoreError>;
    fn credentials(&self) -> Result<Vec<CredentialRecord>, StoreError>;

    // notification log
    fn record_notification(&self, entry: NotificationLogEntry) -> Result<(), StoreError>;
    fn notifications(&self) -> Result<Vec<NotificationLogEntry>, StoreError>;
}
