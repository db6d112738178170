use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::Application;
use super::store::RegistryStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationChannel {
    Email,
    Sms,
}

impl NotificationChannel {
    pub const fn label(self) -> &'static str {
        match self {
            NotificationChannel::Email => "email",
            NotificationChannel::Sms => "sms",
        }
    }
}

/// Message kinds the engine emits at transition points. Rendering and
/// delivery belong to the external dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationTemplate {
    AppointmentConfirmed,
    CredentialReady,
    CredentialIssued,
}

impl NotificationTemplate {
    pub const fn label(self) -> &'static str {
        match self {
            NotificationTemplate::AppointmentConfirmed => "appointment_confirmed",
            NotificationTemplate::CredentialReady => "credential_ready",
            NotificationTemplate::CredentialIssued => "credential_issued",
        }
    }
}

/// Payload handed to the external dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationIntent {
    pub channel: NotificationChannel,
    pub recipient: String,
    pub template: NotificationTemplate,
    pub parameters: BTreeMap<String, String>,
}

#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("notification transport unavailable: {0}")]
    Transport(String),
}

/// External delivery capability. A failing dispatcher never fails the
/// workflow operation that emitted the intent.
pub trait NotificationDispatcher: Send + Sync {
    fn dispatch(&self, intent: &NotificationIntent) -> Result<(), NotificationError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "outcome", content = "detail")]
pub enum DeliveryOutcome {
    Delivered,
    Failed(String),
}

/// Audit row recorded for every intent, delivered or not.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationLogEntry {
    pub intent: NotificationIntent,
    pub outcome: DeliveryOutcome,
    pub recorded_at: DateTime<Utc>,
}

/// Build the standard intent for an application-scoped template.
pub(crate) fn intent_for(
    application: &Application,
    template: NotificationTemplate,
    extra: BTreeMap<String, String>,
) -> NotificationIntent {
    let mut parameters = extra;
    parameters.insert(
        "reference".to_string(),
        application.reference.0.clone(),
    );
    parameters.insert(
        "applicant".to_string(),
        application.applicant.full_name.clone(),
    );

    NotificationIntent {
        channel: NotificationChannel::Email,
        recipient: application.applicant.email.clone(),
        template,
        parameters,
    }
}

/// Fire-and-forget dispatch after the state mutation has committed. The
/// outcome, success or failure, lands in the notification log.
pub(crate) fn dispatch<S, N>(store: &S, dispatcher: &N, intent: NotificationIntent)
where
    S: RegistryStore + ?Sized,
    N: NotificationDispatcher + ?Sized,
{
    let outcome = match dispatcher.dispatch(&intent) {
        Ok(()) => DeliveryOutcome::Delivered,
        Err(err) => {
            tracing::warn!(
                template = intent.template.label(),
                recipient = %intent.recipient,
                error = %err,
                "notification dispatch failed"
            );
            DeliveryOutcome::Failed(err.to_string())
        }
    };

    let entry = NotificationLogEntry {
        intent,
        outcome,
        recorded_at: Utc::now(),
    };

    if let Err(err) = store.record_notification(entry) {
        tracing::warn!(error = %err, "notification log write failed");
    }
}
