use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::access::{AccessPolicy, Caller, Permission};
use super::calendar::{is_standard_slot, SlotAvailability, SlotKey, STANDARD_TIME_SLOTS};
use super::domain::{ApplicationId, ApplicationStatus, Note};
use super::error::RegistrationError;
use super::notify::NotificationDispatcher;
use super::registry::{advance_application, fetch_application, reopen_for_booking};
use super::store::{RegistryStore, StoreError};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AppointmentId(pub String);

/// Scheduling lifecycle. Advances monotonically except `Rescheduled` (a live
/// booking moved to a new slot) and the terminal `Cancelled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Scheduled,
    Confirmed,
    CheckedIn,
    BiometricCompleted,
    Rescheduled,
    Cancelled,
}

impl AppointmentStatus {
    pub const fn label(self) -> &'static str {
        match self {
            AppointmentStatus::Scheduled => "scheduled",
            AppointmentStatus::Confirmed => "confirmed",
            AppointmentStatus::CheckedIn => "checked_in",
            AppointmentStatus::BiometricCompleted => "biometric_completed",
            AppointmentStatus::Rescheduled => "rescheduled",
            AppointmentStatus::Cancelled => "cancelled",
        }
    }

    /// A booking that still occupies calendar capacity and can be attended.
    pub fn is_live(self) -> bool {
        !matches!(self, AppointmentStatus::Cancelled)
    }

    /// States from which a visitor can be checked in at the front desk. A
    /// rescheduled appointment is a live booking awaiting attendance.
    pub fn awaits_attendance(self) -> bool {
        matches!(
            self,
            AppointmentStatus::Scheduled
                | AppointmentStatus::Confirmed
                | AppointmentStatus::Rescheduled
        )
    }
}

/// One-to-one with an application once booked; owns no application state
/// beyond the id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: AppointmentId,
    pub application_id: ApplicationId,
    pub slot: SlotKey,
    pub status: AppointmentStatus,
    pub staff_assigned: Option<String>,
    pub check_in_time: Option<DateTime<Utc>>,
    pub completed_time: Option<DateTime<Utc>>,
    pub notes: Vec<Note>,
    pub seq: u64,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Appointment {
    pub fn is_cancelled(&self) -> bool {
        self.status == AppointmentStatus::Cancelled
    }
}

/// Booking request as it arrives from the desk UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingRequest {
    pub application_id: ApplicationId,
    pub center: String,
    pub date: NaiveDate,
    pub time_slot: String,
}

static APPOINTMENT_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_appointment_id() -> AppointmentId {
    let id = APPOINTMENT_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    AppointmentId(format!("apt-{id:06}"))
}

/// Books, moves, and cancels appointments against the slot calendar. Every
/// capacity change is one atomic store call; a failed booking never leaves a
/// partially held slot behind.
pub struct AppointmentScheduler<S, N, P> {
    store: Arc<S>,
    notifier: Arc<N>,
    policy: Arc<P>,
}

impl<S, N, P> AppointmentScheduler<S, N, P>
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

    pub fn book(
        &self,
        caller: &Caller,
        request: BookingRequest,
    ) -> Result<Appointment, RegistrationError> {
        self.policy
            .authorize(caller, Permission::ManageAppointments)?;
        validate_slot_shape(&request.center, &request.time_slot)?;

        let application = fetch_application(self.store.as_ref(), &request.application_id)?;
        if application.status != ApplicationStatus::PendingAppointment {
            return Err(RegistrationError::InvalidState(format!(
                "application {} is {}, expected pending_appointment",
                application.id.0,
                application.status.label()
            )));
        }
        if let Some(existing) = self
            .store
            .appointment_for_application(&application.id)?
        {
            if existing.status.is_live() {
                return Err(RegistrationError::Conflict(format!(
                    "application {} already has appointment {}",
                    application.id.0, existing.id.0
                )));
            }
        }

        let key = SlotKey::new(request.center, request.date, request.time_slot);
        reserve(self.store.as_ref(), &key)?;

        let now = Utc::now();
        let appointment = Appointment {
            id: next_appointment_id(),
            application_id: application.id.clone(),
            slot: key.clone(),
            status: AppointmentStatus::Confirmed,
            staff_assigned: None,
            check_in_time: None,
            completed_time: None,
            notes: Vec::new(),
            seq: 0,
            version: 0,
            created_at: now,
            updated_at: now,
        };

        let stored = match self.store.insert_appointment(appointment) {
            Ok(appointment) => appointment,
            Err(err) => {
                let _ = self.store.release_slot(&key);
                return Err(err.into());
            }
        };

        let note = Note::now(
            format!(
                "appointment {} booked at {} on {} {}",
                stored.id.0, key.center, key.date, key.time_slot
            ),
            caller.staff_id.clone(),
        );
        if let Err(err) = advance_application(
            self.store.as_ref(),
            self.notifier.as_ref(),
            &application.id,
            ApplicationStatus::AppointmentConfirmed,
            Some(note),
        ) {
            // The application moved under us; undo the booking entirely.
            let mut rollback = stored;
            rollback.status = AppointmentStatus::Cancelled;
            let _ = self.store.update_appointment(rollback);
            let _ = self.store.release_slot(&key);
            return Err(err);
        }

        info!(
            appointment = %stored.id.0,
            application = %stored.application_id.0,
            center = %stored.slot.center,
            date = %stored.slot.date,
            time_slot = %stored.slot.time_slot,
            "appointment booked"
        );
        Ok(stored)
    }

    /// Move a live booking to a new date/slot at the same center. The slot
    /// swap is one atomic store operation; if the new slot is full the old
    /// one is still held and nothing changed.
    pub fn reschedule(
        &self,
        caller: &Caller,
        id: &AppointmentId,
        new_date: NaiveDate,
        new_time_slot: String,
        reason: &str,
    ) -> Result<Appointment, RegistrationError> {
        self.policy
            .authorize(caller, Permission::ManageAppointments)?;
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(RegistrationError::Validation(
                "reschedule reason must not be empty".to_string(),
            ));
        }

        let mut appointment = self.fetch(id)?;
        match appointment.status {
            AppointmentStatus::Cancelled => {
                return Err(RegistrationError::InvalidState(format!(
                    "appointment {} is cancelled",
                    appointment.id.0
                )))
            }
            AppointmentStatus::BiometricCompleted => {
                return Err(RegistrationError::InvalidState(format!(
                    "appointment {} already completed biometric capture",
                    appointment.id.0
                )))
            }
            _ => {}
        }

        // Capture may have advanced the application independently of the
        // appointment's own status; both gates apply.
        let application = fetch_application(self.store.as_ref(), &appointment.application_id)?;
        if !matches!(
            application.status,
            ApplicationStatus::PendingAppointment | ApplicationStatus::AppointmentConfirmed
        ) {
            return Err(RegistrationError::InvalidState(format!(
                "application {} is already {}; rescheduling after capture is not allowed",
                application.id.0,
                application.status.label()
            )));
        }

        validate_slot_shape(&appointment.slot.center, &new_time_slot)?;
        let new_key = SlotKey::new(appointment.slot.center.clone(), new_date, new_time_slot);
        match self.store.move_slot(&appointment.slot, &new_key) {
            Ok(()) => {}
            Err(StoreError::SlotFull) => {
                return Err(RegistrationError::SlotUnavailable {
                    center: new_key.center,
                    date: new_key.date,
                    time_slot: new_key.time_slot,
                })
            }
            Err(err) => return Err(err.into()),
        }

        let old_slot = appointment.slot.clone();
        appointment.slot = new_key;
        appointment.status = AppointmentStatus::Rescheduled;
        appointment.notes.push(Note::now(
            format!(
                "rescheduled from {} {} to {} {}: {}",
                old_slot.date,
                old_slot.time_slot,
                appointment.slot.date,
                appointment.slot.time_slot,
                reason
            ),
            caller.staff_id.clone(),
        ));
        let stored = self.store.update_appointment(appointment)?;
        info!(
            appointment = %stored.id.0,
            date = %stored.slot.date,
            time_slot = %stored.slot.time_slot,
            "appointment rescheduled"
        );
        Ok(stored)
    }

    pub fn check_in(
        &self,
        caller: &Caller,
        id: &AppointmentId,
        staff_id: &str,
    ) -> Result<Appointment, RegistrationError> {
        self.policy
            .authorize(caller, Permission::ManageAppointments)?;

        let mut appointment = self.fetch(id)?;
        if !appointment.status.awaits_attendance() {
            return Err(RegistrationError::InvalidState(format!(
                "appointment {} is {}, cannot check in",
                appointment.id.0,
                appointment.status.label()
            )));
        }

        appointment.status = AppointmentStatus::CheckedIn;
        appointment.check_in_time = Some(Utc::now());
        appointment.staff_assigned = Some(staff_id.to_string());
        let stored = self.store.update_appointment(appointment)?;
        info!(
            appointment = %stored.id.0,
            staff = staff_id,
            "appointment checked in"
        );
        Ok(stored)
    }

    /// Terminal: releases the slot permanently and hands the application
    /// back to scheduling.
    pub fn cancel(
        &self,
        caller: &Caller,
        id: &AppointmentId,
        reason: &str,
    ) -> Result<Appointment, RegistrationError> {
        self.policy
            .authorize(caller, Permission::ManageAppointments)?;

        let mut appointment = self.fetch(id)?;
        match appointment.status {
            AppointmentStatus::Cancelled => {
                return Err(RegistrationError::InvalidState(format!(
                    "appointment {} is already cancelled",
                    appointment.id.0
                )))
            }
            AppointmentStatus::BiometricCompleted => {
                return Err(RegistrationError::InvalidState(format!(
                    "appointment {} already completed biometric capture",
                    appointment.id.0
                )))
            }
            _ => {}
        }

        self.store.release_slot(&appointment.slot)?;
        appointment.status = AppointmentStatus::Cancelled;
        appointment.notes.push(Note::now(
            format!("cancelled: {}", reason.trim()),
            caller.staff_id.clone(),
        ));
        let stored = self.store.update_appointment(appointment)?;

        reopen_for_booking(
            self.store.as_ref(),
            &stored.application_id,
            Note::now(
                format!("appointment {} cancelled", stored.id.0),
                caller.staff_id.clone(),
            ),
        )?;

        info!(appointment = %stored.id.0, "appointment cancelled");
        Ok(stored)
    }

    /// Remaining capacity for each standard time slot; never mutates.
    pub fn availability(
        &self,
        center: &str,
        date: NaiveDate,
    ) -> Result<Vec<SlotAvailability>, RegistrationError> {
        if center.trim().is_empty() {
            return Err(RegistrationError::Validation(
                "center must not be empty".to_string(),
            ));
        }

        let mut rows = Vec::with_capacity(STANDARD_TIME_SLOTS.len());
        for time_slot in STANDARD_TIME_SLOTS {
            let key = SlotKey::new(center, date, time_slot);
            let capacity = self.store.slot_capacity(&key)?;
            let booked = self.store.booked_count(&key)?;
            rows.push(SlotAvailability {
                time_slot: time_slot.to_string(),
                capacity,
                booked,
                remaining: capacity.saturating_sub(booked),
            });
        }
        Ok(rows)
    }

    pub fn get(&self, id: &AppointmentId) -> Result<Appointment, RegistrationError> {
        self.fetch(id)
    }

    pub fn for_application(
        &self,
        application_id: &ApplicationId,
    ) -> Result<Appointment, RegistrationError> {
        self.store
            .appointment_for_application(application_id)?
            .ok_or_else(|| RegistrationError::NotFound {
                entity: "appointment",
                id: application_id.0.clone(),
            })
    }

    /// Appointments filtered by center and/or date, in booking order.
    pub fn list(
        &self,
        center: Option<&str>,
        date: Option<NaiveDate>,
    ) -> Result<Vec<Appointment>, RegistrationError> {
        let mut appointments = self.store.appointments()?;
        if let Some(center) = center {
            appointments.retain(|appointment| appointment.slot.center == center);
        }
        if let Some(date) = date {
            appointments.retain(|appointment| appointment.slot.date == date);
        }
        Ok(appointments)
    }

    fn fetch(&self, id: &AppointmentId) -> Result<Appointment, RegistrationError> {
        self.store
            .appointment(id)?
            .ok_or_else(|| RegistrationError::NotFound {
                entity: "appointment",
                id: id.0.clone(),
            })
    }
}

fn validate_slot_shape(center: &str, time_slot: &str) -> Result<(), RegistrationError> {
    if center.trim().is_empty() {
        return Err(RegistrationError::Validation(
            "center must not be empty".to_string(),
        ));
    }
    if !is_standard_slot(time_slot) {
        return Err(RegistrationError::Validation(format!(
            "'{time_slot}' is not a standard time slot"
        )));
    }
    Ok(())
}

fn reserve<S: RegistryStore + ?Sized>(store: &S, key: &SlotKey) -> Result<(), RegistrationError> {
    match store.reserve_slot(key) {
        Ok(()) => Ok(()),
        Err(StoreError::SlotFull) => Err(RegistrationError::SlotUnavailable {
            center: key.center.clone(),
            date: key.date,
            time_slot: key.time_slot.clone(),
        }),
        Err(err) => Err(err.into()),
    }
}
