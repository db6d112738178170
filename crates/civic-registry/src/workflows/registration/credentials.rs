use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Months, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::access::{AccessPolicy, Caller, Permission};
use super::domain::{
    monotonic_millis, Application, ApplicationId, ApplicationStatus, ApplicationType, ArtifactRef,
    Note,
};
use super::error::RegistrationError;
use super::notify::{self, NotificationDispatcher, NotificationTemplate};
use super::registry::{advance_application, fetch_application};
use super::store::{RegistryStore, StoreError};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CredentialId(pub String);

/// Identity-card record lifecycle. `Approved` is only ever reached together
/// with `PrintStatus::Printed`, so a printed card always has an approved
/// design behind it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialStatus {
    DesignPending,
    DesignApproved,
    Rejected,
    Approved,
    Issued,
}

impl CredentialStatus {
    pub const fn label(self) -> &'static str {
        match self {
            CredentialStatus::DesignPending => "design_pending",
            CredentialStatus::DesignApproved => "design_approved",
            CredentialStatus::Rejected => "rejected",
            CredentialStatus::Approved => "approved",
            CredentialStatus::Issued => "issued",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrintStatus {
    Pending,
    Queued,
    Printed,
}

impl PrintStatus {
    pub const fn label(self) -> &'static str {
        match self {
            PrintStatus::Pending => "pending",
            PrintStatus::Queued => "queued",
            PrintStatus::Printed => "printed",
        }
    }
}

/// The issuable identity card tied to an approved application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CredentialRecord {
    pub id: CredentialId,
    pub application_id: ApplicationId,
    pub id_number: String,
    pub status: CredentialStatus,
    pub print_status: PrintStatus,
    pub batch_number: Option<String>,
    pub recipient_signature: Option<ArtifactRef>,
    pub expiry_date: Option<NaiveDate>,
    pub issued_at: Option<DateTime<Utc>>,
    pub notes: Vec<Note>,
    pub seq: u64,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Expiry horizons per registration track, in years.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CredentialValidity {
    pub citizen_years: u32,
    pub permit_years: u32,
}

impl CredentialValidity {
    pub fn years_for(&self, kind: ApplicationType) -> u32 {
        match kind {
            ApplicationType::Citizen => self.citizen_years,
            ApplicationType::ResidentPermit => self.permit_years,
        }
    }
}

impl Default for CredentialValidity {
    fn default() -> Self {
        Self {
            citizen_years: 10,
            permit_years: 5,
        }
    }
}

static CREDENTIAL_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_credential_id() -> CredentialId {
    let id = CREDENTIAL_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    CredentialId(format!("card-{id:06}"))
}

/// Create the credential record for an approved application, exactly once.
/// Safe to call again: the existing record is returned, including when two
/// callers race the insert.
pub(crate) fn ensure_credential<S: RegistryStore + ?Sized>(
    store: &S,
    application: &Application,
) -> Result<CredentialRecord, RegistrationError> {
    if let Some(existing) = store.credential_for_application(&application.id)? {
        return Ok(existing);
    }

    let now = Utc::now();
    let record = CredentialRecord {
        id: next_credential_id(),
        application_id: application.id.clone(),
        id_number: format!("NID-{}", monotonic_millis()),
        status: CredentialStatus::DesignPending,
        print_status: PrintStatus::Pending,
        batch_number: None,
        recipient_signature: None,
        expiry_date: None,
        issued_at: None,
        notes: Vec::new(),
        seq: 0,
        version: 0,
        created_at: now,
        updated_at: now,
    };

    match store.insert_credential(record) {
        Ok(stored) => {
            info!(
                credential = %stored.id.0,
                application = %stored.application_id.0,
                "credential record created"
            );
            Ok(stored)
        }
        // Lost the race; the winner's record is the credential.
        Err(StoreError::Conflict) => store
            .credential_for_application(&application.id)?
            .ok_or_else(|| {
                StoreError::Unavailable("credential vanished after conflicting insert".to_string())
                    .into()
            }),
        Err(err) => Err(err.into()),
    }
}

/// Drives an approved application's identity card through design review,
/// printing, and issuance.
pub struct CredentialIssuancePipeline<S, N, P> {
    store: Arc<S>,
    notifier: Arc<N>,
    policy: Arc<P>,
    validity: CredentialValidity,
}

impl<S, N, P> CredentialIssuancePipeline<S, N, P>
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
            store,
            notifier,
            policy,
            validity,
        }
    }

    /// Idempotent creation entry point for callers outside the registry's
    /// `approved` transition (e.g. backfills).
    pub fn create_from_approval(
        &self,
        caller: &Caller,
        application_id: &ApplicationId,
    ) -> Result<CredentialRecord, RegistrationError> {
        self.policy
            .authorize(caller, Permission::ManageCredentials)?;

        let application = fetch_application(self.store.as_ref(), application_id)?;
        if !matches!(
            application.status,
            ApplicationStatus::Approved | ApplicationStatus::IdReady | ApplicationStatus::Completed
        ) {
            return Err(RegistrationError::InvalidState(format!(
                "application {} is {}, a credential requires an approved application",
                application.id.0,
                application.status.label()
            )));
        }

        ensure_credential(self.store.as_ref(), &application)
    }

    pub fn approve_design(
        &self,
        caller: &Caller,
        id: &CredentialId,
        notes: Option<String>,
    ) -> Result<CredentialRecord, RegistrationError> {
        self.policy
            .authorize(caller, Permission::ManageCredentials)?;

        let mut record = self.fetch(id)?;
        if record.status != CredentialStatus::DesignPending {
            return Err(RegistrationError::InvalidState(format!(
                "credential {} design review is already resolved ({})",
                record.id.0,
                record.status.label()
            )));
        }

        record.status = CredentialStatus::DesignApproved;
        record.print_status = PrintStatus::Queued;
        let text = notes
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty())
            .unwrap_or_else(|| "design approved".to_string());
        record.notes.push(Note::now(text, caller.staff_id.clone()));
        let stored = self.store.update_credential(record)?;
        info!(credential = %stored.id.0, "credential design approved");
        Ok(stored)
    }

    pub fn reject_design(
        &self,
        caller: &Caller,
        id: &CredentialId,
        reason: &str,
    ) -> Result<CredentialRecord, RegistrationError> {
        self.policy
            .authorize(caller, Permission::ManageCredentials)?;
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(RegistrationError::Validation(
                "rejection reason must not be empty".to_string(),
            ));
        }

        let mut record = self.fetch(id)?;
        if record.status != CredentialStatus::DesignPending {
            return Err(RegistrationError::InvalidState(format!(
                "credential {} design review is already resolved ({})",
                record.id.0,
                record.status.label()
            )));
        }

        record.status = CredentialStatus::Rejected;
        record
            .notes
            .push(Note::now(format!("design rejected: {reason}"), caller.staff_id.clone()));
        let stored = self.store.update_credential(record)?;
        info!(credential = %stored.id.0, "credential design rejected");
        Ok(stored)
    }

    /// Record the physical print. Promotes the card to `approved`/`printed`
    /// in one step and tells the applicant it is ready for pickup.
    pub fn mark_printed(
        &self,
        caller: &Caller,
        id: &CredentialId,
        batch_number: &str,
    ) -> Result<CredentialRecord, RegistrationError> {
        self.policy
            .authorize(caller, Permission::ManageCredentials)?;
        let batch_number = batch_number.trim();
        if batch_number.is_empty() {
            return Err(RegistrationError::Validation(
                "batch number must not be empty".to_string(),
            ));
        }

        let mut record = self.fetch(id)?;
        if record.status != CredentialStatus::DesignApproved
            || record.print_status != PrintStatus::Queued
        {
            return Err(RegistrationError::InvalidState(format!(
                "credential {} is {} ({}), design must be approved before printing",
                record.id.0,
                record.status.label(),
                record.print_status.label()
            )));
        }

        record.status = CredentialStatus::Approved;
        record.print_status = PrintStatus::Printed;
        record.batch_number = Some(batch_number.to_string());
        record.notes.push(Note::now(
            format!("printed in batch {batch_number}"),
            caller.staff_id.clone(),
        ));
        let stored = self.store.update_credential(record)?;

        advance_application(
            self.store.as_ref(),
            self.notifier.as_ref(),
            &stored.application_id,
            ApplicationStatus::IdReady,
            Some(Note::now(
                format!("credential {} printed", stored.id.0),
                caller.staff_id.clone(),
            )),
        )?;

        info!(
            credential = %stored.id.0,
            batch = batch_number,
            "credential printed"
        );
        Ok(stored)
    }

    /// Hand the card over. Requires a printed card, stamps expiry from the
    /// configured validity horizon, and closes out the application.
    pub fn issue(
        &self,
        caller: &Caller,
        id: &CredentialId,
        recipient_signature: ArtifactRef,
        notes: Option<String>,
    ) -> Result<CredentialRecord, RegistrationError> {
        self.policy
            .authorize(caller, Permission::ManageCredentials)?;

        let mut record = self.fetch(id)?;
        if record.status == CredentialStatus::Issued {
            return Err(RegistrationError::InvalidState(format!(
                "credential {} is already issued",
                record.id.0
            )));
        }
        if record.print_status != PrintStatus::Printed {
            return Err(RegistrationError::InvalidState(format!(
                "credential {} is not printed yet ({})",
                record.id.0,
                record.print_status.label()
            )));
        }

        let application = fetch_application(self.store.as_ref(), &record.application_id)?;
        let years = self.validity.years_for(application.kind);
        let now = Utc::now();
        let expiry = now
            .date_naive()
            .checked_add_months(Months::new(12 * years))
            .ok_or_else(|| {
                RegistrationError::Validation("expiry date out of range".to_string())
            })?;

        record.status = CredentialStatus::Issued;
        record.issued_at = Some(now);
        record.expiry_date = Some(expiry);
        record.recipient_signature = Some(recipient_signature);
        if let Some(text) = notes
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty())
        {
            record.notes.push(Note::now(text, caller.staff_id.clone()));
        }
        let stored = self.store.update_credential(record)?;

        advance_application(
            self.store.as_ref(),
            self.notifier.as_ref(),
            &stored.application_id,
            ApplicationStatus::Completed,
            Some(Note::now(
                format!("credential {} issued", stored.id.0),
                caller.staff_id.clone(),
            )),
        )?;

        let mut parameters = BTreeMap::new();
        parameters.insert("id_number".to_string(), stored.id_number.clone());
        parameters.insert("expiry_date".to_string(), expiry.to_string());
        let intent = notify::intent_for(&application, NotificationTemplate::CredentialIssued, parameters);
        notify::dispatch(self.store.as_ref(), self.notifier.as_ref(), intent);

        info!(
            credential = %stored.id.0,
            application = %stored.application_id.0,
            "credential issued"
        );
        Ok(stored)
    }

    pub fn get(&self, id: &CredentialId) -> Result<CredentialRecord, RegistrationError> {
        self.fetch(id)
    }

    pub fn for_application(
        &self,
        application_id: &ApplicationId,
    ) -> Result<CredentialRecord, RegistrationError> {
        self.store
            .credential_for_application(application_id)?
            .ok_or_else(|| RegistrationError::NotFound {
                entity: "credential",
                id: application_id.0.clone(),
            })
    }

    fn fetch(&self, id: &CredentialId) -> Result<CredentialRecord, RegistrationError> {
        self.store
            .credential(id)?
            .ok_or_else(|| RegistrationError::NotFound {
                entity: "credential",
                id: id.0.clone(),
            })
    }
}
