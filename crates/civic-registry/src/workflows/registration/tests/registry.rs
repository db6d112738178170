use std::sync::Arc;

use super::common::*;
use crate::workflows::registration::access::RoleLadderPolicy;
use crate::workflows::registration::credentials::CredentialValidity;
use crate::workflows::registration::domain::{ApplicationStatus, ApplicationType, DocumentKind};
use crate::workflows::registration::error::RegistrationError;
use crate::workflows::registration::memory::InMemoryRegistryStore;
use crate::workflows::registration::notify::{DeliveryOutcome, NotificationTemplate};
use crate::workflows::registration::registry::{ApplicationFilter, Page};
use crate::workflows::registration::store::RegistryStore;
use crate::workflows::registration::RegistrationEngine;

#[test]
fn create_assigns_reference_and_pending_status() {
    let (engine, _, _) = build_engine();
    let application = create_application(&engine);

    assert_eq!(application.status, ApplicationStatus::PendingAppointment);
    assert!(application.reference.0.starts_with("CIT-"));
    assert!(application.notes.is_empty());

    let permit = engine
        .registry
        .create(&applicant(), permit_submission())
        .expect("permit application");
    assert!(permit.reference.0.starts_with("RES-"));
    assert_ne!(permit.reference, application.reference);
}

#[test]
fn create_rejects_blank_applicant_fields() {
    let (engine, _, _) = build_engine();
    let mut bad = submission();
    bad.applicant.full_name = "   ".to_string();

    match engine.registry.create(&applicant(), bad) {
        Err(RegistrationError::Validation(message)) => {
            assert!(message.contains("full_name"));
        }
        other => panic!("expected validation error, got {other:?}"),
    }
}

#[test]
fn create_rejects_missing_required_documents() {
    let (engine, _, _) = build_engine();
    let mut bad = submission();
    bad.documents.remove(&DocumentKind::BirthCertificate);

    match engine.registry.create(&applicant(), bad) {
        Err(RegistrationError::Validation(message)) => {
            assert!(message.contains("birth_certificate"));
        }
        other => panic!("expected validation error, got {other:?}"),
    }

    // a null reference for a required kind is just as missing
    let mut bad = submission();
    bad.documents.insert(DocumentKind::ProofOfIdentity, None);
    match engine.registry.create(&applicant(), bad) {
        Err(RegistrationError::Validation(message)) => {
            assert!(message.contains("proof_of_identity"));
        }
        other => panic!("expected validation error, got {other:?}"),
    }
}

#[test]
fn transition_rejects_stage_skips_and_leaves_status_unchanged() {
    let (engine, _, _) = build_engine();
    let application = create_application(&engine);

    match engine.registry.transition(
        &officer(),
        &application.id,
        ApplicationStatus::UnderReview,
        None,
    ) {
        Err(RegistrationError::InvalidTransition { from, to }) => {
            assert_eq!(from, ApplicationStatus::PendingAppointment);
            assert_eq!(to, ApplicationStatus::UnderReview);
        }
        other => panic!("expected invalid transition, got {other:?}"),
    }

    let stored = engine.registry.get(&application.id).expect("still there");
    assert_eq!(stored.status, ApplicationStatus::PendingAppointment);
}

#[test]
fn every_illegal_edge_is_refused() {
    let (engine, store, _) = build_engine();
    let template = create_application(&engine);

    for from in ApplicationStatus::all() {
        // force the stored status, then probe every target
        let mut seeded = engine.registry.get(&template.id).expect("fetch");
        seeded.status = *from;
        let seeded = store.update_application(seeded).expect("seeded");

        for to in ApplicationStatus::all() {
            if from.permits(*to) {
                continue;
            }
            match engine
                .registry
                .transition(&officer(), &template.id, *to, None)
            {
                Err(RegistrationError::InvalidTransition { .. }) => {}
                other => panic!("edge {from:?} -> {to:?} should be refused, got {other:?}"),
            }
            let unchanged = engine.registry.get(&template.id).expect("fetch");
            assert_eq!(unchanged.status, *from, "status must not move on refusal");
            assert_eq!(unchanged.version, seeded.version);
        }
    }
}

#[test]
fn rejected_is_terminal() {
    let (engine, _, _) = build_engine();
    let (application, _) = captured_application(&engine);

    engine
        .registry
        .transition(&officer(), &application.id, ApplicationStatus::UnderReview, None)
        .expect("to review");
    engine
        .registry
        .transition(
            &officer(),
            &application.id,
            ApplicationStatus::Rejected,
            Some("document mismatch".to_string()),
        )
        .expect("rejected from review");

    match engine.registry.transition(
        &officer(),
        &application.id,
        ApplicationStatus::Approved,
        None,
    ) {
        Err(RegistrationError::InvalidTransition { from, .. }) => {
            assert_eq!(from, ApplicationStatus::Rejected);
        }
        other => panic!("expected invalid transition, got {other:?}"),
    }
}

#[test]
fn transition_requires_officer_role() {
    let (engine, _, _) = build_engine();
    let (application, _) = captured_application(&engine);

    match engine.registry.transition(
        &clerk(),
        &application.id,
        ApplicationStatus::UnderReview,
        None,
    ) {
        Err(RegistrationError::Authorization { .. }) => {}
        other => panic!("expected authorization error, got {other:?}"),
    }
}

#[test]
fn approval_creates_credential_exactly_once() {
    let (engine, store, _) = build_engine();
    let (application, credential) = approved_application(&engine);

    // replaying the side effect path yields the same record
    let again = engine
        .credentials
        .create_from_approval(&supervisor(), &application.id)
        .expect("idempotent create");
    assert_eq!(again.id, credential.id);
    assert_eq!(store.credentials().expect("credentials").len(), 1);
}

#[test]
fn add_note_appends_with_author_and_rejects_empty_text() {
    let (engine, _, _) = build_engine();
    let application = create_application(&engine);

    let updated = engine
        .registry
        .add_note(&clerk(), &application.id, "applicant called to confirm")
        .expect("note added");
    assert_eq!(updated.notes.len(), 1);
    assert_eq!(updated.notes[0].author, clerk().staff_id);

    match engine.registry.add_note(&clerk(), &application.id, "  ") {
        Err(RegistrationError::Validation(_)) => {}
        other => panic!("expected validation error, got {other:?}"),
    }
}

#[test]
fn add_note_unknown_application_is_not_found() {
    let (engine, _, _) = build_engine();
    match engine.registry.add_note(
        &clerk(),
        &crate::workflows::registration::domain::ApplicationId("app-zzz".to_string()),
        "hello",
    ) {
        Err(RegistrationError::NotFound { entity, .. }) => assert_eq!(entity, "application"),
        other => panic!("expected not found, got {other:?}"),
    }
}

#[test]
fn list_filters_by_status_kind_and_center() {
    let (engine, _, _) = build_engine();
    let (booked, _) = booked_application(&engine);
    let pending = engine
        .registry
        .create(&applicant(), permit_submission())
        .expect("second application");

    let confirmed = engine
        .registry
        .list(
            &ApplicationFilter {
                status: Some(ApplicationStatus::AppointmentConfirmed),
                ..ApplicationFilter::default()
            },
            &Page::default(),
        )
        .expect("listing");
    assert_eq!(confirmed.total, 1);
    assert_eq!(confirmed.items[0].id, booked.id);

    let permits = engine
        .registry
        .list(
            &ApplicationFilter {
                kind: Some(ApplicationType::ResidentPermit),
                ..ApplicationFilter::default()
            },
            &Page::default(),
        )
        .expect("listing");
    assert_eq!(permits.total, 1);
    assert_eq!(permits.items[0].id, pending.id);

    let at_center = engine
        .registry
        .list(
            &ApplicationFilter {
                center: Some("Central".to_string()),
                ..ApplicationFilter::default()
            },
            &Page::default(),
        )
        .expect("listing");
    assert_eq!(at_center.total, 1);
    assert_eq!(at_center.items[0].id, booked.id);

    let elsewhere = engine
        .registry
        .list(
            &ApplicationFilter {
                center: Some("Harbour".to_string()),
                ..ApplicationFilter::default()
            },
            &Page::default(),
        )
        .expect("listing");
    assert_eq!(elsewhere.total, 0);
}

#[test]
fn listing_pages_are_stable_under_inserts() {
    let (engine, _, _) = build_engine();
    for _ in 0..5 {
        create_application(&engine);
    }

    let first = engine
        .registry
        .list(
            &ApplicationFilter::default(),
            &Page {
                offset: 0,
                limit: 2,
            },
        )
        .expect("first page");

    // a new application arriving between page fetches must not shift
    // earlier rows
    create_application(&engine);

    let second = engine
        .registry
        .list(
            &ApplicationFilter::default(),
            &Page {
                offset: 2,
                limit: 2,
            },
        )
        .expect("second page");

    assert_eq!(first.items.len(), 2);
    assert_eq!(second.items.len(), 2);
    let first_ids: Vec<_> = first.items.iter().map(|item| item.id.clone()).collect();
    for item in &second.items {
        assert!(!first_ids.contains(&item.id), "rows must not repeat");
    }
    assert!(first.items[0].seq < first.items[1].seq);
    assert!(first.items[1].seq < second.items[0].seq);
}

#[test]
fn booking_confirmation_emits_notification_intent() {
    let (engine, store, dispatcher) = build_engine();
    let (application, _) = booked_application(&engine);

    let events = dispatcher.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].template, NotificationTemplate::AppointmentConfirmed);
    assert_eq!(events[0].recipient, application.applicant.email);
    assert_eq!(
        events[0].parameters.get("reference"),
        Some(&application.reference.0)
    );

    let log = store.notifications().expect("log");
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].outcome, DeliveryOutcome::Delivered);
}

#[test]
fn failed_dispatch_is_logged_but_not_fatal() {
    let store = Arc::new(InMemoryRegistryStore::new(1));
    let engine = RegistrationEngine::new(
        store.clone(),
        Arc::new(OfflineDispatcher),
        Arc::new(RoleLadderPolicy),
        CredentialValidity::default(),
    );

    let application = engine
        .registry
        .create(&applicant(), submission())
        .expect("created");
    engine
        .scheduler
        .book(&clerk(), booking_request(&application, "10:00"))
        .expect("booking survives dispatcher outage");

    let stored = engine.registry.get(&application.id).expect("fetch");
    assert_eq!(stored.status, ApplicationStatus::AppointmentConfirmed);

    let log = store.notifications().expect("log");
    assert_eq!(log.len(), 1);
    assert!(matches!(log[0].outcome, DeliveryOutcome::Failed(_)));
}

#[test]
fn overview_counts_by_status() {
    let (engine, _, _) = build_engine();
    let _ = booked_application(&engine);
    create_application(&engine);

    let overview = engine.registry.overview().expect("overview");
    assert_eq!(
        overview.applications.get("appointment_confirmed"),
        Some(&1)
    );
    assert_eq!(overview.applications.get("pending_appointment"), Some(&1));
    assert_eq!(overview.appointments.get("confirmed"), Some(&1));
    assert!(overview.credentials.is_empty());
}
