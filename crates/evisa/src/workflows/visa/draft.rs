use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::Serialize;
use tracing::{debug, warn};

use super::blueprint::FormBlueprint;
use super::domain::{ApplicationState, FieldKey, FieldValue};

/// Storage name the form has always used for in-progress answers.
pub const DRAFT_STORAGE_KEY: &str = "visaFormData";

/// Namespaced storage key for one applicant's draft.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DraftKey {
    draft_id: String,
}

impl DraftKey {
    pub fn new(draft_id: impl Into<String>) -> Self {
        Self {
            draft_id: draft_id.into(),
        }
    }

    pub fn generate() -> Self {
        Self::new(uuid::Uuid::new_v4().simple().to_string())
    }

    pub fn draft_id(&self) -> &str {
        &self.draft_id
    }

    pub fn storage_name(&self) -> String {
        format!("{DRAFT_STORAGE_KEY}-{}", self.draft_id)
    }
}

/// Raw draft persistence. Payloads are opaque JSON strings; decoding happens in
/// [`restore_draft`] so every backend discards corrupt drafts the same way.
pub trait DraftStore: Send + Sync {
    fn load(&self, key: &DraftKey) -> Result<Option<String>, DraftError>;
    fn save(&self, key: &DraftKey, payload: &str) -> Result<(), DraftError>;
    fn clear(&self, key: &DraftKey) -> Result<(), DraftError>;
}

#[derive(Debug, thiserror::Error)]
pub enum DraftError {
    #[error("draft storage io failure: {0}")]
    Io(#[from] std::io::Error),
    #[error("unable to encode draft: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("draft store unavailable: {0}")]
    Unavailable(String),
}

/// How the session's starting state was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DraftRestoreKind {
    Fresh,
    Restored,
    Discarded,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DraftRestore {
    pub kind: DraftRestoreKind,
    pub state: ApplicationState,
}

/// Load and decode a draft. A draft that fails to decode, names unknown fields, or holds a
/// value of the wrong shape is cleared and replaced by a clean state; nothing is merged.
pub fn restore_draft<D>(
    store: &D,
    key: &DraftKey,
    blueprint: &FormBlueprint,
) -> Result<DraftRestore, DraftError>
where
    D: DraftStore + ?Sized,
{
    let Some(payload) = store.load(key)? else {
        return Ok(DraftRestore {
            kind: DraftRestoreKind::Fresh,
            state: ApplicationState::initial(),
        });
    };

    match decode_draft(&payload, blueprint) {
        Ok(state) => {
            debug!(draft = key.draft_id(), "restored application draft");
            Ok(DraftRestore {
                kind: DraftRestoreKind::Restored,
                state: state.without_transient_files(),
            })
        }
        Err(reason) => {
            warn!(draft = key.draft_id(), %reason, "discarding malformed application draft");
            if let Err(err) = store.clear(key) {
                warn!(draft = key.draft_id(), error = %err, "failed to clear malformed draft");
            }
            Ok(DraftRestore {
                kind: DraftRestoreKind::Discarded,
                state: ApplicationState::initial(),
            })
        }
    }
}

fn decode_draft(payload: &str, blueprint: &FormBlueprint) -> Result<ApplicationState, String> {
    let values: BTreeMap<FieldKey, FieldValue> =
        serde_json::from_str(payload).map_err(|err| err.to_string())?;

    for (key, value) in &values {
        let spec = blueprint
            .field(*key)
            .ok_or_else(|| format!("field '{key}' is not part of this form"))?;
        if !spec.kind.accepts(value) {
            return Err(format!("field '{key}' holds a value of the wrong shape"));
        }
    }

    Ok(ApplicationState::from_values(values))
}

pub fn persist_draft<D>(
    store: &D,
    key: &DraftKey,
    state: &ApplicationState,
) -> Result<(), DraftError>
where
    D: DraftStore + ?Sized,
{
    let payload = serde_json::to_string(state)?;
    store.save(key, &payload)
}

#[derive(Debug, Default)]
pub struct InMemoryDraftStore {
    drafts: Mutex<HashMap<DraftKey, String>>,
}

impl InMemoryDraftStore {
    fn guard(&self) -> Result<std::sync::MutexGuard<'_, HashMap<DraftKey, String>>, DraftError> {
        self.drafts
            .lock()
            .map_err(|_| DraftError::Unavailable("draft mutex poisoned".to_string()))
    }

    pub fn len(&self) -> usize {
        self.guard().map(|drafts| drafts.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DraftStore for InMemoryDraftStore {
    fn load(&self, key: &DraftKey) -> Result<Option<String>, DraftError> {
        Ok(self.guard()?.get(key).cloned())
    }

    fn save(&self, key: &DraftKey, payload: &str) -> Result<(), DraftError> {
        self.guard()?.insert(key.clone(), payload.to_string());
        Ok(())
    }

    fn clear(&self, key: &DraftKey) -> Result<(), DraftError> {
        self.guard()?.remove(key);
        Ok(())
    }
}

/// One JSON file per draft under a root directory.
#[derive(Debug, Clone)]
pub struct FileDraftStore {
    root: PathBuf,
}

impl FileDraftStore {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, DraftError> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &DraftKey) -> PathBuf {
        let sanitized: String = key
            .storage_name()
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.root.join(format!("{sanitized}.json"))
    }
}

impl DraftStore for FileDraftStore {
    fn load(&self, key: &DraftKey) -> Result<Option<String>, DraftError> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(payload) => Ok(Some(payload)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn save(&self, key: &DraftKey, payload: &str) -> Result<(), DraftError> {
        let path = self.path_for(key);
        let staging = path.with_extension("json.tmp");
        fs::write(&staging, payload)?;
        fs::rename(&staging, &path)?;
        Ok(())
    }

    fn clear(&self, key: &DraftKey) -> Result<(), DraftError> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}
