use std::collections::BTreeMap;

use chrono::{Duration, Local, NaiveDate};
use clap::Args;

use crate::infra::build_engine;
use civic_registry::config::RegistryConfig;
use civic_registry::error::AppError;
use civic_registry::workflows::registration::{
    ApplicantInfo, ApplicationStatus, ApplicationType, ArtifactRef, BookingRequest, Caller,
    CaptureQuality, DocumentKind, Finger, FingerprintScan, RegistrationSubmission, StaffRole,
};

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Registration center used for the demo booking
    #[arg(long, default_value = "Central")]
    pub(crate) center: String,
    /// Appointment date (YYYY-MM-DD). Defaults to tomorrow.
    #[arg(long, value_parser = crate::infra::parse_date)]
    pub(crate) date: Option<NaiveDate>,
    /// Appointment time slot
    #[arg(long, default_value = "10:00")]
    pub(crate) time_slot: String,
    /// Stop after the review decision instead of issuing the card
    #[arg(long)]
    pub(crate) skip_issuance: bool,
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        center,
        date,
        time_slot,
        skip_issuance,
    } = args;
    let date = date.unwrap_or_else(|| Local::now().date_naive() + Duration::days(1));

    let portal = Caller::new("portal", StaffRole::Applicant);
    let clerk = Caller::new("clerk-07", StaffRole::Clerk);
    let officer = Caller::new("officer-03", StaffRole::Officer);
    let supervisor = Caller::new("sup-01", StaffRole::Supervisor);

    let engine = build_engine(&RegistryConfig::default());

    println!("Civil-registration workflow demo");

    let mut documents = BTreeMap::new();
    documents.insert(
        DocumentKind::ProofOfIdentity,
        Some(ArtifactRef("blob://demo/id.pdf".to_string())),
    );
    documents.insert(
        DocumentKind::ProofOfResidence,
        Some(ArtifactRef("blob://demo/residence.pdf".to_string())),
    );
    documents.insert(
        DocumentKind::BirthCertificate,
        Some(ArtifactRef("blob://demo/birth.pdf".to_string())),
    );

    let application = engine.registry.create(
        &portal,
        RegistrationSubmission {
            kind: ApplicationType::Citizen,
            applicant: ApplicantInfo {
                full_name: "Adama Faal".to_string(),
                date_of_birth: NaiveDate::from_ymd_opt(1993, 4, 17)
                    .unwrap_or_else(|| Local::now().date_naive()),
                email: "adama.faal@example.org".to_string(),
                phone: "+220 555 0123".to_string(),
                address: "7 Independence Drive".to_string(),
            },
            documents,
        },
    )?;
    println!(
        "- Application {} created ({}) -> {}",
        application.id.0,
        application.reference.0,
        application.status.label()
    );

    println!("\nAvailability at {center} on {date}");
    for row in engine.scheduler.availability(&center, date)? {
        println!(
            "  {} | {}/{} free",
            row.time_slot, row.remaining, row.capacity
        );
    }

    let appointment = engine.scheduler.book(
        &clerk,
        BookingRequest {
            application_id: application.id.clone(),
            center: center.clone(),
            date,
            time_slot: time_slot.clone(),
        },
    )?;
    println!(
        "- Appointment {} booked for {} {} -> {}",
        appointment.id.0,
        date,
        time_slot,
        appointment.status.label()
    );

    let appointment = engine
        .scheduler
        .check_in(&clerk, &appointment.id, &officer.staff_id)?;
    println!("- Checked in, staff {}", officer.staff_id);

    let record = engine.biometrics.start_capture(&clerk, &application.id)?;
    engine.biometrics.capture_fingerprints(
        &clerk,
        &record.id,
        vec![
            FingerprintScan {
                finger: Finger::LeftThumb,
                artifact: ArtifactRef("blob://demo/left-thumb.wsq".to_string()),
                quality: CaptureQuality::Good,
            },
            FingerprintScan {
                finger: Finger::RightThumb,
                artifact: ArtifactRef("blob://demo/right-thumb.wsq".to_string()),
                quality: CaptureQuality::Excellent,
            },
        ],
    )?;
    engine.biometrics.upload_photograph(
        &clerk,
        &record.id,
        ArtifactRef("blob://demo/photo.jpg".to_string()),
        CaptureQuality::Good,
    )?;
    engine.biometrics.upload_signature(
        &clerk,
        &record.id,
        ArtifactRef("blob://demo/signature.png".to_string()),
        CaptureQuality::Good,
    )?;
    let record = engine.biometrics.complete(&clerk, &record.id)?;
    println!(
        "- Biometric record {} completed (appointment {} -> biometric_completed)",
        record.id.0, appointment.id.0
    );

    engine.registry.transition(
        &officer,
        &application.id,
        ApplicationStatus::UnderReview,
        None,
    )?;
    let application = engine.registry.transition(
        &officer,
        &application.id,
        ApplicationStatus::Approved,
        Some("background check clear".to_string()),
    )?;
    println!("- Review decision: {}", application.status.label());

    let credential = engine.credentials.for_application(&application.id)?;
    println!(
        "- Credential {} auto-created -> {} / print {}",
        credential.id.0,
        credential.status.label(),
        credential.print_status.label()
    );

    if skip_issuance {
        println!("\nStopping before issuance (--skip-issuance)");
        return Ok(());
    }

    engine
        .credentials
        .approve_design(&supervisor, &credential.id, None)?;
    engine
        .credentials
        .mark_printed(&supervisor, &credential.id, "BATCH-001")?;
    let credential = engine.credentials.issue(
        &supervisor,
        &credential.id,
        ArtifactRef("blob://demo/recipient-signature.png".to_string()),
        Some("issued at demo desk".to_string()),
    )?;
    println!(
        "- Credential {} issued, id number {}, expires {}",
        credential.id.0,
        credential.id_number,
        credential
            .expiry_date
            .map(|expiry| expiry.to_string())
            .unwrap_or_else(|| "unset".to_string())
    );

    let application = engine.registry.get(&application.id)?;
    println!("- Application final status: {}", application.status.label());

    match serde_json::to_string_pretty(&engine.registry.overview()?) {
        Ok(json) => println!("\nRegistry overview:\n{json}"),
        Err(err) => println!("\nRegistry overview unavailable: {err}"),
    }

    Ok(())
}
