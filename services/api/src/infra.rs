use chrono::NaiveDate;
use evisa::config::{AppConfig, DraftConfig};
use evisa::error::AppError;
use evisa::workflows::visa::{
    DraftError, DraftKey, DraftStore, FileDraftStore, FormBlueprint, InMemoryDraftStore,
    PaymentCharge, SimulatedPaymentProvider, TracingNotifier, VisaApplicationService,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::info;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

pub(crate) type ApiApplicationService =
    VisaApplicationService<ConfiguredDraftStore, SimulatedPaymentProvider, TracingNotifier>;

/// Draft backend chosen at startup: files when a directory is configured, memory otherwise.
pub(crate) enum ConfiguredDraftStore {
    Memory(InMemoryDraftStore),
    File(FileDraftStore),
}

impl ConfiguredDraftStore {
    pub(crate) fn from_config(config: &DraftConfig) -> Result<Self, DraftError> {
        match &config.directory {
            Some(directory) => {
                let store = FileDraftStore::open(directory)?;
                info!(directory = %store.root().display(), "persisting drafts to disk");
                Ok(Self::File(store))
            }
            None => Ok(Self::Memory(InMemoryDraftStore::default())),
        }
    }
}

impl DraftStore for ConfiguredDraftStore {
    fn load(&self, key: &DraftKey) -> Result<Option<String>, DraftError> {
        match self {
            Self::Memory(store) => store.load(key),
            Self::File(store) => store.load(key),
        }
    }

    fn save(&self, key: &DraftKey, payload: &str) -> Result<(), DraftError> {
        match self {
            Self::Memory(store) => store.save(key, payload),
            Self::File(store) => store.save(key, payload),
        }
    }

    fn clear(&self, key: &DraftKey) -> Result<(), DraftError> {
        match self {
            Self::Memory(store) => store.clear(key),
            Self::File(store) => store.clear(key),
        }
    }
}

pub(crate) fn build_application_service(
    config: &AppConfig,
) -> Result<Arc<ApiApplicationService>, AppError> {
    let drafts = ConfiguredDraftStore::from_config(&config.drafts)?;
    Ok(Arc::new(VisaApplicationService::new(
        Arc::new(FormBlueprint::standard()),
        Arc::new(drafts),
        Arc::new(SimulatedPaymentProvider::new()),
        Arc::new(TracingNotifier),
        PaymentCharge::application_fee(&config.payment),
    )
    .with_idle_timeout(config.sessions.idle_timeout)))
}

pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|err| format!("failed to parse '{raw}' as YYYY-MM-DD ({err})"))
}
