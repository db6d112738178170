use std::sync::Arc;
use std::thread;

use super::common::*;
use crate::workflows::registration::calendar::STANDARD_TIME_SLOTS;
use crate::workflows::registration::domain::ApplicationStatus;
use crate::workflows::registration::error::RegistrationError;
use crate::workflows::registration::scheduling::AppointmentStatus;

#[test]
fn booking_confirms_appointment_and_application() {
    let (engine, _, _) = build_engine();
    let (application, appointment) = booked_application(&engine);

    assert_eq!(application.status, ApplicationStatus::AppointmentConfirmed);
    assert_eq!(appointment.status, AppointmentStatus::Confirmed);
    assert_eq!(appointment.application_id, application.id);

    let rows = engine
        .scheduler
        .availability("Central", booking_date())
        .expect("availability");
    let row = rows
        .iter()
        .find(|row| row.time_slot == "10:00")
        .expect("10:00 row");
    assert_eq!(row.booked, 1);
    assert_eq!(row.remaining, 0);
}

#[test]
fn booking_requires_pending_application() {
    let (engine, _, _) = build_engine();
    let (application, _) = booked_application(&engine);

    match engine
        .scheduler
        .book(&clerk(), booking_request(&application, "11:00"))
    {
        Err(RegistrationError::InvalidState(_)) => {}
        other => panic!("expected invalid state, got {other:?}"),
    }
}

#[test]
fn booking_rejects_non_standard_slot() {
    let (engine, _, _) = build_engine();
    let application = create_application(&engine);

    match engine
        .scheduler
        .book(&clerk(), booking_request(&application, "12:00"))
    {
        Err(RegistrationError::Validation(message)) => {
            assert!(message.contains("12:00"));
        }
        other => panic!("expected validation error, got {other:?}"),
    }
}

#[test]
fn full_slot_rejects_second_booking_until_cancelled() {
    let (engine, _, _) = build_engine();

    // Scenario: two applicants fight over a capacity-1 slot.
    let (first_application, first_appointment) = booked_application(&engine);
    assert_eq!(
        first_application.status,
        ApplicationStatus::AppointmentConfirmed
    );

    let second_application = engine
        .registry
        .create(&applicant(), permit_submission())
        .expect("second application");
    match engine
        .scheduler
        .book(&clerk(), booking_request(&second_application, "10:00"))
    {
        Err(RegistrationError::SlotUnavailable { time_slot, .. }) => {
            assert_eq!(time_slot, "10:00");
        }
        other => panic!("expected slot unavailable, got {other:?}"),
    }
    // no mutation happened: the loser is still schedulable elsewhere
    let second = engine
        .registry
        .get(&second_application.id)
        .expect("still pending");
    assert_eq!(second.status, ApplicationStatus::PendingAppointment);

    engine
        .scheduler
        .cancel(&clerk(), &first_appointment.id, "applicant unavailable")
        .expect("cancelled");

    engine
        .scheduler
        .book(&clerk(), booking_request(&second_application, "10:00"))
        .expect("slot free again after cancellation");
}

#[test]
fn cancel_releases_slot_and_reopens_application() {
    let (engine, _, _) = build_engine();
    let (application, appointment) = booked_application(&engine);

    let cancelled = engine
        .scheduler
        .cancel(&clerk(), &appointment.id, "applicant request")
        .expect("cancelled");
    assert_eq!(cancelled.status, AppointmentStatus::Cancelled);

    let application = engine.registry.get(&application.id).expect("fetch");
    assert_eq!(application.status, ApplicationStatus::PendingAppointment);

    // the same application can book a fresh slot
    engine
        .scheduler
        .book(&clerk(), booking_request(&application, "09:00"))
        .expect("rebooked");
}

#[test]
fn cancel_is_terminal() {
    let (engine, _, _) = build_engine();
    let (_, appointment) = booked_application(&engine);
    engine
        .scheduler
        .cancel(&clerk(), &appointment.id, "first")
        .expect("cancelled");

    match engine.scheduler.cancel(&clerk(), &appointment.id, "again") {
        Err(RegistrationError::InvalidState(_)) => {}
        other => panic!("expected invalid state, got {other:?}"),
    }
}

#[test]
fn cancel_after_capture_completion_is_refused() {
    let (engine, _, _) = build_engine();
    let (application, _) = captured_application(&engine);
    let appointment = engine
        .scheduler
        .for_application(&application.id)
        .expect("appointment");
    assert_eq!(appointment.status, AppointmentStatus::BiometricCompleted);

    match engine
        .scheduler
        .cancel(&clerk(), &appointment.id, "too late")
    {
        Err(RegistrationError::InvalidState(_)) => {}
        other => panic!("expected invalid state, got {other:?}"),
    }
}

#[test]
fn reschedule_moves_booking_atomically() {
    let (engine, store, _) = build_engine();
    let (_, appointment) = booked_application(&engine);

    let moved = engine
        .scheduler
        .reschedule(
            &clerk(),
            &appointment.id,
            booking_date(),
            "14:00".to_string(),
            "clinic closed in the morning",
        )
        .expect("rescheduled");
    assert_eq!(moved.status, AppointmentStatus::Rescheduled);
    assert_eq!(moved.slot.time_slot, "14:00");
    assert!(moved.notes.iter().any(|note| note.text.contains("clinic closed")));

    use crate::workflows::registration::calendar::SlotKey;
    use crate::workflows::registration::store::RegistryStore;
    let old = SlotKey::new("Central", booking_date(), "10:00");
    let new = SlotKey::new("Central", booking_date(), "14:00");
    assert_eq!(store.booked_count(&old).expect("count"), 0);
    assert_eq!(store.booked_count(&new).expect("count"), 1);
}

#[test]
fn reschedule_to_full_slot_keeps_old_booking() {
    let (engine, store, _) = build_engine();
    let (_, appointment) = booked_application(&engine);

    // fill 14:00 with another applicant
    let other = engine
        .registry
        .create(&applicant(), permit_submission())
        .expect("other application");
    engine
        .scheduler
        .book(&clerk(), booking_request(&other, "14:00"))
        .expect("other booked");

    match engine.scheduler.reschedule(
        &clerk(),
        &appointment.id,
        booking_date(),
        "14:00".to_string(),
        "try the afternoon",
    ) {
        Err(RegistrationError::SlotUnavailable { .. }) => {}
        other => panic!("expected slot unavailable, got {other:?}"),
    }

    use crate::workflows::registration::calendar::SlotKey;
    use crate::workflows::registration::store::RegistryStore;
    let old = SlotKey::new("Central", booking_date(), "10:00");
    assert_eq!(store.booked_count(&old).expect("count"), 1);
    let unchanged = engine.scheduler.get(&appointment.id).expect("fetch");
    assert_eq!(unchanged.status, AppointmentStatus::Confirmed);
    assert_eq!(unchanged.slot.time_slot, "10:00");
}

#[test]
fn reschedule_after_capture_is_refused() {
    let (engine, _, _) = build_engine();
    let (application, _) = captured_application(&engine);
    let appointment = engine
        .scheduler
        .for_application(&application.id)
        .expect("appointment");

    match engine.scheduler.reschedule(
        &clerk(),
        &appointment.id,
        booking_date(),
        "15:00".to_string(),
        "changed my mind",
    ) {
        Err(RegistrationError::InvalidState(_)) => {}
        other => panic!("expected invalid state, got {other:?}"),
    }
}

#[test]
fn rescheduled_appointment_can_still_check_in() {
    let (engine, _, _) = build_engine();
    let (_, appointment) = booked_application(&engine);
    let moved = engine
        .scheduler
        .reschedule(
            &clerk(),
            &appointment.id,
            booking_date(),
            "15:00".to_string(),
            "earlier conflict",
        )
        .expect("rescheduled");

    let checked = engine
        .scheduler
        .check_in(&clerk(), &moved.id, "officer-03")
        .expect("check in after reschedule");
    assert_eq!(checked.status, AppointmentStatus::CheckedIn);
    assert_eq!(checked.staff_assigned.as_deref(), Some("officer-03"));
    assert!(checked.check_in_time.is_some());
}

#[test]
fn check_in_requires_an_attendable_appointment() {
    let (engine, _, _) = build_engine();
    let (_, appointment) = booked_application(&engine);
    engine
        .scheduler
        .check_in(&clerk(), &appointment.id, "officer-03")
        .expect("first check in");

    match engine
        .scheduler
        .check_in(&clerk(), &appointment.id, "officer-04")
    {
        Err(RegistrationError::InvalidState(_)) => {}
        other => panic!("expected invalid state, got {other:?}"),
    }
}

#[test]
fn availability_lists_every_standard_slot() {
    let (engine, _, _) = build_engine();
    let rows = engine
        .scheduler
        .availability("Central", booking_date())
        .expect("availability");
    assert_eq!(rows.len(), STANDARD_TIME_SLOTS.len());
    assert!(rows.iter().all(|row| row.capacity == 1 && row.booked == 0));
}

#[test]
fn booking_requires_clerk_role() {
    let (engine, _, _) = build_engine();
    let application = create_application(&engine);

    match engine
        .scheduler
        .book(&applicant(), booking_request(&application, "10:00"))
    {
        Err(RegistrationError::Authorization { .. }) => {}
        other => panic!("expected authorization error, got {other:?}"),
    }
}

#[test]
fn concurrent_bookings_admit_exactly_capacity() {
    let (engine, store, _) = build_engine();
    let engine = Arc::new(engine);

    let applications: Vec<_> = (0..8).map(|_| create_application(&engine)).collect();

    let handles: Vec<_> = applications
        .into_iter()
        .map(|application| {
            let engine = engine.clone();
            thread::spawn(move || {
                engine
                    .scheduler
                    .book(&clerk(), booking_request(&application, "10:00"))
            })
        })
        .collect();

    let results: Vec<_> = handles
        .into_iter()
        .map(|handle| handle.join().expect("booking thread panicked"))
        .collect();

    let won = results.iter().filter(|result| result.is_ok()).count();
    let lost = results
        .iter()
        .filter(|result| matches!(result, Err(RegistrationError::SlotUnavailable { .. })))
        .count();
    assert_eq!(won, 1, "capacity 1 admits exactly one booking");
    assert_eq!(lost, 7, "every other attempt sees slot_unavailable");

    use crate::workflows::registration::calendar::SlotKey;
    use crate::workflows::registration::store::RegistryStore;
    let key = SlotKey::new("Central", booking_date(), "10:00");
    assert_eq!(store.booked_count(&key).expect("count"), 1);
}
