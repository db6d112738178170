use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;

use super::biometrics::{BiometricRecord, BiometricRecordId};
use super::calendar::{SlotEntry, SlotKey};
use super::credentials::{CredentialId, CredentialRecord};
use super::domain::{Application, ApplicationId};
use super::notify::NotificationLogEntry;
use super::scheduling::{Appointment, AppointmentId};
use super::store::{RegistryStore, StoreError};

/// Keyed-map store backing the engine in-process: one table per entity,
/// insertion sequence for stable ordering, optimistic versions on updates.
/// The slot calendar lives behind its own mutex, so reserve/release/move are
/// a single critical section each — the atomic check-and-increment the
/// scheduler relies on.
pub struct InMemoryRegistryStore {
    applications: Mutex<HashMap<String, Application>>,
    application_seq: AtomicU64,
    appointments: Mutex<HashMap<String, Appointment>>,
    appointment_seq: AtomicU64,
    slots: Mutex<HashMap<SlotKey, SlotEntry>>,
    biometrics: Mutex<HashMap<String, BiometricRecord>>,
    biometric_seq: AtomicU64,
    credentials: Mutex<HashMap<String, CredentialRecord>>,
    credential_seq: AtomicU64,
    notifications: Mutex<Vec<NotificationLogEntry>>,
    default_capacity: u32,
}

impl InMemoryRegistryStore {
    pub fn new(default_capacity: u32) -> Self {
        Self {
            applications: Mutex::new(HashMap::new()),
            application_seq: AtomicU64::new(0),
            appointments: Mutex::new(HashMap::new()),
            appointment_seq: AtomicU64::new(0),
            slots: Mutex::new(HashMap::new()),
            biometrics: Mutex::new(HashMap::new()),
            biometric_seq: AtomicU64::new(0),
            credentials: Mutex::new(HashMap::new()),
            credential_seq: AtomicU64::new(0),
            notifications: Mutex::new(Vec::new()),
            default_capacity: default_capacity.max(1),
        }
    }

    fn lock<'a, T>(mutex: &'a Mutex<T>, table: &'static str) -> Result<MutexGuard<'a, T>, StoreError> {
        mutex
            .lock()
            .map_err(|_| StoreError::Unavailable(format!("{table} table mutex poisoned")))
    }
}

impl Default for InMemoryRegistryStore {
    fn default() -> Self {
        Self::new(1)
    }
}

impl RegistryStore for InMemoryRegistryStore {
    fn insert_application(&self, mut application: Application) -> Result<Application, StoreError> {
        let mut guard = Self::lock(&self.applications, "application")?;
        if guard.contains_key(&application.id.0) {
            return Err(StoreError::Conflict);
        }
        application.seq = self.application_seq.fetch_add(1, Ordering::Relaxed);
        guard.insert(application.id.0.clone(), application.clone());
        Ok(application)
    }

    fn update_application(&self, mut application: Application) -> Result<Application, StoreError> {
        let mut guard = Self::lock(&self.applications, "application")?;
        let current = guard
            .get(&application.id.0)
            .ok_or(StoreError::NotFound)?;
        if current.version != application.version {
            return Err(StoreError::VersionConflict);
        }
        application.version += 1;
        application.updated_at = Utc::now();
        guard.insert(application.id.0.clone(), application.clone());
        Ok(application)
    }

    fn application(&self, id: &ApplicationId) -> Result<Option<Application>, StoreError> {
        let guard = Self::lock(&self.applications, "application")?;
        Ok(guard.get(&id.0).cloned())
    }

    fn applications(&self) -> Result<Vec<Application>, StoreError> {
        let guard = Self::lock(&self.applications, "application")?;
        let mut records: Vec<Application> = guard.values().cloned().collect();
        records.sort_by_key(|record| record.seq);
        Ok(records)
    }

    fn insert_appointment(&self, mut appointment: Appointment) -> Result<Appointment, StoreError> {
        let mut guard = Self::lock(&self.appointments, "appointment")?;
        if guard.contains_key(&appointment.id.0) {
            return Err(StoreError::Conflict);
        }
        appointment.seq = self.appointment_seq.fetch_add(1, Ordering::Relaxed);
        guard.insert(appointment.id.0.clone(), appointment.clone());
        Ok(appointment)
    }

    fn update_appointment(&self, mut appointment: Appointment) -> Result<Appointment, StoreError> {
        let mut guard = Self::lock(&self.appointments, "appointment")?;
        let current = guard
            .get(&appointment.id.0)
            .ok_or(StoreError::NotFound)?;
        if current.version != appointment.version {
            return Err(StoreError::VersionConflict);
        }
        appointment.version += 1;
        appointment.updated_at = Utc::now();
        guard.insert(appointment.id.0.clone(), appointment.clone());
        Ok(appointment)
    }

    fn appointment(&self, id: &AppointmentId) -> Result<Option<Appointment>, StoreError> {
        let guard = Self::lock(&self.appointments, "appointment")?;
        Ok(guard.get(&id.0).cloned())
    }

    fn appointment_for_application(
        &self,
        id: &ApplicationId,
    ) -> Result<Option<Appointment>, StoreError> {
        let guard = Self::lock(&self.appointments, "appointment")?;
        Ok(guard
            .values()
            .filter(|appointment| &appointment.application_id == id)
            .max_by_key(|appointment| appointment.seq)
            .cloned())
    }

    fn appointments(&self) -> Result<Vec<Appointment>, StoreError> {
        let guard = Self::lock(&self.appointments, "appointment")?;
        let mut records: Vec<Appointment> = guard.values().cloned().collect();
        records.sort_by_key(|record| record.seq);
        Ok(records)
    }

    fn slot_capacity(&self, key: &SlotKey) -> Result<u32, StoreError> {
        let guard = Self::lock(&self.slots, "slot")?;
        Ok(guard
            .get(key)
            .map(|entry| entry.capacity)
            .unwrap_or(self.default_capacity))
    }

    fn set_slot_capacity(&self, key: &SlotKey, capacity: u32) -> Result<(), StoreError> {
        let mut guard = Self::lock(&self.slots, "slot")?;
        let entry = guard.entry(key.clone()).or_insert(SlotEntry {
            capacity,
            booked: 0,
        });
        if entry.booked > capacity {
            return Err(StoreError::Unavailable(format!(
                "cannot shrink slot below {} existing bookings",
                entry.booked
            )));
        }
        entry.capacity = capacity;
        Ok(())
    }

    fn booked_count(&self, key: &SlotKey) -> Result<u32, StoreError> {
        let guard = Self::lock(&self.slots, "slot")?;
        Ok(guard.get(key).map(|entry| entry.booked).unwrap_or(0))
    }

    fn reserve_slot(&self, key: &SlotKey) -> Result<(), StoreError> {
        let mut guard = Self::lock(&self.slots, "slot")?;
        let default_capacity = self.default_capacity;
        let entry = guard.entry(key.clone()).or_insert(SlotEntry {
            capacity: default_capacity,
            booked: 0,
        });
        if entry.booked >= entry.capacity {
            return Err(StoreError::SlotFull);
        }
        entry.booked += 1;
        Ok(())
    }

    fn release_slot(&self, key: &SlotKey) -> Result<(), StoreError> {
        let mut guard = Self::lock(&self.slots, "slot")?;
        let entry = guard.get_mut(key).ok_or_else(|| {
            StoreError::Unavailable("releasing a slot that was never booked".to_string())
        })?;
        if entry.booked == 0 {
            return Err(StoreError::Unavailable(
                "slot booked count underflow".to_string(),
            ));
        }
        entry.booked -= 1;
        Ok(())
    }

    fn move_slot(&self, from: &SlotKey, to: &SlotKey) -> Result<(), StoreError> {
        if from == to {
            return Ok(());
        }

        let mut guard = Self::lock(&self.slots, "slot")?;
        let target = guard
            .get(to)
            .copied()
            .unwrap_or(SlotEntry {
                capacity: self.default_capacity,
                booked: 0,
            });
        if target.booked >= target.capacity {
            return Err(StoreError::SlotFull);
        }

        {
            let source = guard.get_mut(from).ok_or_else(|| {
                StoreError::Unavailable("moving a booking off a slot that was never booked".to_string())
            })?;
            if source.booked == 0 {
                return Err(StoreError::Unavailable(
                    "slot booked count underflow".to_string(),
                ));
            }
            source.booked -= 1;
        }

        let entry = guard.entry(to.clone()).or_insert(SlotEntry {
            capacity: target.capacity,
            booked: 0,
        });
        entry.booked += 1;
        Ok(())
    }

    fn insert_biometric(&self, mut record: BiometricRecord) -> Result<BiometricRecord, StoreError> {
        let mut guard = Self::lock(&self.biometrics, "biometric")?;
        if guard.contains_key(&record.id.0) {
            return Err(StoreError::Conflict);
        }
        record.seq = self.biometric_seq.fetch_add(1, Ordering::Relaxed);
        guard.insert(record.id.0.clone(), record.clone());
        Ok(record)
    }

    fn update_biometric(&self, mut record: BiometricRecord) -> Result<BiometricRecord, StoreError> {
        let mut guard = Self::lock(&self.biometrics, "biometric")?;
        let current = guard.get(&record.id.0).ok_or(StoreError::NotFound)?;
        if current.version != record.version {
            return Err(StoreError::VersionConflict);
        }
        record.version += 1;
        record.updated_at = Utc::now();
        guard.insert(record.id.0.clone(), record.clone());
        Ok(record)
    }

    fn biometric(&self, id: &BiometricRecordId) -> Result<Option<BiometricRecord>, StoreError> {
        let guard = Self::lock(&self.biometrics, "biometric")?;
        Ok(guard.get(&id.0).cloned())
    }

    fn biometric_for_application(
        &self,
        id: &ApplicationId,
    ) -> Result<Option<BiometricRecord>, StoreError> {
        let guard = Self::lock(&self.biometrics, "biometric")?;
        Ok(guard
            .values()
            .filter(|record| &record.application_id == id)
            .max_by_key(|record| record.seq)
            .cloned())
    }

    fn biometrics(&self) -> Result<Vec<BiometricRecord>, StoreError> {
        let guard = Self::lock(&self.biometrics, "biometric")?;
        let mut records: Vec<BiometricRecord> = guard.values().cloned().collect();
        records.sort_by_key(|record| record.seq);
        Ok(records)
    }

    fn insert_credential(&self, mut record: CredentialRecord) -> Result<CredentialRecord, StoreError> {
        let mut guard = Self::lock(&self.credentials, "credential")?;
        if guard.contains_key(&record.id.0) {
            return Err(StoreError::Conflict);
        }
        // One credential per application, enforced at the table.
        if guard
            .values()
            .any(|existing| existing.application_id == record.application_id)
        {
            return Err(StoreError::Conflict);
        }
        record.seq = self.credential_seq.fetch_add(1, Ordering::Relaxed);
        guard.insert(record.id.0.clone(), record.clone());
        Ok(record)
    }

    fn update_credential(&self, mut record: CredentialRecord) -> Result<CredentialRecord, StoreError> {
        let mut guard = Self::lock(&self.credentials, "credential")?;
        let current = guard.get(&record.id.0).ok_or(StoreError::NotFound)?;
        if current.version != record.version {
            return Err(StoreError::VersionConflict);
        }
        record.version += 1;
        record.updated_at = Utc::now();
        guard.insert(record.id.0.clone(), record.clone());
        Ok(record)
    }

    fn credential(&self, id: &CredentialId) -> Result<Option<CredentialRecord>, StoreError> {
        let guard = Self::lock(&self.credentials, "credential")?;
        Ok(guard.get(&id.0).cloned())
    }

    fn credential_for_application(
        &self,
        id: &ApplicationId,
    ) -> Result<Option<CredentialRecord>, StoreError> {
        let guard = Self::lock(&self.credentials, "credential")?;
        Ok(guard
            .values()
            .find(|record| &record.application_id == id)
            .cloned())
    }

    fn credentials(&self) -> Result<Vec<CredentialRecord>, StoreError> {
        let guard = Self::lock(&self.credentials, "credential")?;
        let mut records: Vec<CredentialRecord> = guard.values().cloned().collect();
        records.sort_by_key(|record| record.seq);
        Ok(records)
    }

    fn record_notification(&self, entry: NotificationLogEntry) -> Result<(), StoreError> {
        let mut guard = Self::lock(&self.notifications, "notification")?;
        guard.push(entry);
        Ok(())
    }

    fn notifications(&self) -> Result<Vec<NotificationLogEntry>, StoreError> {
        let guard = Self::lock(&self.notifications, "notification")?;
        Ok(guard.clone())
    }
}
