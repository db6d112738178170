use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::NaiveDate;
use metrics_exporter_prometheus::PrometheusHandle;
use tracing::info;

use civic_registry::config::RegistryConfig;
use civic_registry::workflows::registration::{
    ArtifactRef, ArtifactStore, ArtifactStoreError, CredentialValidity, InMemoryRegistryStore,
    NotificationDispatcher, NotificationError, NotificationIntent, RegistrationEngine,
    RoleLadderPolicy,
};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

pub(crate) type ServiceEngine =
    RegistrationEngine<InMemoryRegistryStore, LoggingDispatcher, RoleLadderPolicy>;

/// Dispatcher used until a real delivery provider is wired in: every intent
/// is logged and reported as delivered.
#[derive(Default)]
pub(crate) struct LoggingDispatcher;

impl NotificationDispatcher for LoggingDispatcher {
    fn dispatch(&self, intent: &NotificationIntent) -> Result<(), NotificationError> {
        info!(
            channel = intent.channel.label(),
            template = intent.template.label(),
            recipient = %intent.recipient,
            "notification dispatched"
        );
        Ok(())
    }
}

/// Blob store double: keeps uploads in memory and hands back opaque
/// `blob://` references.
#[derive(Default)]
pub(crate) struct InMemoryArtifactStore {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
    sequence: AtomicU64,
}

impl ArtifactStore for InMemoryArtifactStore {
    fn store(&self, kind: &str, bytes: &[u8]) -> Result<ArtifactRef, ArtifactStoreError> {
        if bytes.is_empty() {
            return Err(ArtifactStoreError::Empty);
        }
        let id = self.sequence.fetch_add(1, Ordering::Relaxed);
        let reference = format!("blob://{kind}/{id:08}");
        self.blobs
            .lock()
            .map_err(|_| ArtifactStoreError::Unavailable("blob mutex poisoned".to_string()))?
            .insert(reference.clone(), bytes.to_vec());
        Ok(ArtifactRef(reference))
    }
}

pub(crate) fn build_engine(config: &RegistryConfig) -> Arc<ServiceEngine> {
    let store = Arc::new(InMemoryRegistryStore::new(config.default_slot_capacity));
    let dispatcher = Arc::new(LoggingDispatcher);
    let policy = Arc::new(RoleLadderPolicy);
    let validity = CredentialValidity {
        citizen_years: config.citizen_validity_years,
        permit_years: config.permit_validity_years,
    };
    Arc::new(RegistrationEngine::new(store, dispatcher, policy, validity))
}

pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|err| format!("failed to parse '{raw}' as YYYY-MM-DD ({err})"))
}
