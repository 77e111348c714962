use std::collections::{BTreeMap, HashMap};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

use crate::adaptive::decision::BanditModel;
use crate::adaptive::types::Action;

pub const SCHEMA_VERSION: u32 = 1;
const KEY_PREFIX: &str = "hha.adaptive.bandit.";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("store serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Durable string key-value storage. Reads are synchronous; writes are
/// fire-and-forget and must never block the caller.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    fn set_async(&self, key: &str, value: String);

    fn is_available(&self) -> bool {
        true
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn set_async(&self, key: &str, value: String) {
        self.entries.write().insert(key.to_string(), value);
    }
}

enum Command {
    Write { key: String, value: String },
    Flush(oneshot::Sender<()>),
}

/// One JSON file per key under `dir`. Writes are queued to a dedicated worker
/// thread and applied in order; the first failed write marks the store unavailable.
///
/// `flush` blocks the calling thread and must not be called from inside an async runtime.
pub struct FileStore {
    dir: PathBuf,
    tx: mpsc::UnboundedSender<Command>,
    available: Arc<AtomicBool>,
}

impl FileStore {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;

        let (tx, mut rx) = mpsc::unbounded_channel::<Command>();
        let available = Arc::new(AtomicBool::new(true));
        let worker_dir = dir.clone();
        let worker_available = Arc::clone(&available);

        std::thread::Builder::new()
            .name("hha-store-writer".to_string())
            .spawn(move || {
                while let Some(cmd) = rx.blocking_recv() {
                    match cmd {
                        Command::Write { key, value } => {
                            if let Err(e) = write_atomic(&worker_dir, &key, &value) {
                                worker_available.store(false, Ordering::Release);
                                tracing::warn!(error = %e, key = %key, "store write failed, store disabled");
                            }
                        }
                        Command::Flush(done) => {
                            let _ = done.send(());
                        }
                    }
                }
            })?;

        tracing::debug!(dir = %dir.display(), "file store opened");
        Ok(Self { dir, tx, available })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Waits until every write queued so far has been applied.
    pub fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(Command::Flush(done_tx)).is_err() {
            return;
        }
        let _ = done_rx.blocking_recv();
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        if !self.is_available() {
            return Err(StoreError::Unavailable("previous write failed".to_string()));
        }
        match std::fs::read_to_string(path_for(&self.dir, key)) {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set_async(&self, key: &str, value: String) {
        if !self.is_available() {
            return;
        }
        let cmd = Command::Write {
            key: key.to_string(),
            value,
        };
        if self.tx.send(cmd).is_err() {
            self.available.store(false, Ordering::Release);
            tracing::warn!(key = %key, "store writer stopped, store disabled");
        }
    }

    fn is_available(&self) -> bool {
        self.available.load(Ordering::Acquire)
    }
}

fn path_for(dir: &Path, key: &str) -> PathBuf {
    let name: String = key
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    dir.join(format!("{name}.json"))
}

fn write_atomic(dir: &Path, key: &str, value: &str) -> std::io::Result<()> {
    let path = path_for(dir, key);
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, value)?;
    std::fs::rename(&tmp, &path)
}

pub fn model_key(profile_id: &str) -> String {
    format!("{KEY_PREFIX}{profile_id}")
}

/// On-disk bandit record, one per profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedBanditModel {
    pub schema_version: u32,
    #[serde(rename = "D")]
    pub dim: usize,
    pub weights: BTreeMap<String, Vec<f64>>,
    pub bias: BTreeMap<String, f64>,
    #[serde(default)]
    pub updates: u64,
    #[serde(default)]
    pub saved_at: Option<DateTime<Utc>>,
}

impl PersistedBanditModel {
    pub fn from_model(model: &BanditModel) -> Self {
        let weights = Action::ALL
            .iter()
            .map(|a| (a.as_str().to_string(), model.weights[a.index()].clone()))
            .collect();
        let bias = Action::ALL
            .iter()
            .map(|a| (a.as_str().to_string(), model.bias[a.index()]))
            .collect();
        Self {
            schema_version: SCHEMA_VERSION,
            dim: model.dim,
            weights,
            bias,
            updates: model.updates,
            saved_at: Some(Utc::now()),
        }
    }

    /// Rebuilds the model, or explains why the record cannot be used with `expected_dim`.
    pub fn into_model(self, expected_dim: usize) -> Result<BanditModel, String> {
        if self.schema_version != SCHEMA_VERSION {
            return Err(format!(
                "schema version {} (expected {SCHEMA_VERSION})",
                self.schema_version
            ));
        }
        if self.dim != expected_dim {
            return Err(format!("dimension {} (expected {expected_dim})", self.dim));
        }
        let mut model = BanditModel::zeros(expected_dim);
        for action in Action::ALL {
            let key = action.as_str();
            let w = self
                .weights
                .get(key)
                .ok_or_else(|| format!("missing weights for {key}"))?;
            let b = self
                .bias
                .get(key)
                .ok_or_else(|| format!("missing bias for {key}"))?;
            model.weights[action.index()] = w.clone();
            model.bias[action.index()] = *b;
        }
        model.updates = self.updates;
        if !model.is_well_formed(expected_dim) {
            return Err("non-finite or misshapen parameters".to_string());
        }
        Ok(model)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LoadOutcome {
    Loaded(BanditModel),
    Missing,
    Discarded(String),
    StoreFailed(String),
}

pub fn load_model(store: &dyn KeyValueStore, profile_id: &str, expected_dim: usize) -> LoadOutcome {
    let key = model_key(profile_id);
    let text = match store.get(&key) {
        Ok(Some(text)) => text,
        Ok(None) => return LoadOutcome::Missing,
        Err(e) => {
            tracing::warn!(error = %e, key = %key, "bandit model read failed");
            return LoadOutcome::StoreFailed(e.to_string());
        }
    };

    let record: PersistedBanditModel = match serde_json::from_str(&text) {
        Ok(record) => record,
        Err(e) => {
            tracing::warn!(error = %e, key = %key, "bandit model unreadable, discarding");
            return LoadOutcome::Discarded(format!("parse error: {e}"));
        }
    };

    match record.into_model(expected_dim) {
        Ok(model) => {
            tracing::debug!(key = %key, updates = model.updates, "bandit model loaded");
            LoadOutcome::Loaded(model)
        }
        Err(reason) => {
            tracing::warn!(key = %key, reason = %reason, "bandit model discarded");
            LoadOutcome::Discarded(reason)
        }
    }
}

pub fn save_model(store: &dyn KeyValueStore, profile_id: &str, model: &BanditModel) -> Result<(), StoreError> {
    let json = serde_json::to_string(&PersistedBanditModel::from_model(model))?;
    store.set_async(&model_key(profile_id), json);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_roundtrip() {
        let store = MemoryStore::new();
        let mut model = BanditModel::zeros(6);
        model.weights[2][4] = 0.75;
        model.bias[3] = -1.25;
        model.updates = 12;
        save_model(&store, "p1", &model).unwrap();
        assert_eq!(load_model(&store, "p1", 6), LoadOutcome::Loaded(model));
        assert_eq!(load_model(&store, "p2", 6), LoadOutcome::Missing);
    }

    #[test]
    fn test_record_layout() {
        let store = MemoryStore::new();
        save_model(&store, "kid", &BanditModel::zeros(6)).unwrap();
        let raw = store.get("hha.adaptive.bandit.kid").unwrap().unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["schemaVersion"], 1);
        assert_eq!(value["D"], 6);
        assert_eq!(value["weights"]["STORM"].as_array().map(|a| a.len()), Some(6));
        assert!(value["bias"]["NORMAL"].is_number());
    }

    #[test]
    fn test_dimension_mismatch_discarded() {
        let store = MemoryStore::new();
        save_model(&store, "p", &BanditModel::zeros(6)).unwrap();
        assert!(matches!(load_model(&store, "p", 8), LoadOutcome::Discarded(_)));
    }

    #[test]
    fn test_garbage_and_schema_discarded() {
        let store = MemoryStore::new();
        store.set_async(&model_key("a"), "{not json".to_string());
        assert!(matches!(load_model(&store, "a", 6), LoadOutcome::Discarded(_)));

        let mut record = PersistedBanditModel::from_model(&BanditModel::zeros(6));
        record.schema_version = 7;
        store.set_async(&model_key("b"), serde_json::to_string(&record).unwrap());
        assert!(matches!(load_model(&store, "b", 6), LoadOutcome::Discarded(_)));
    }

    #[test]
    fn test_missing_action_discarded() {
        let mut record = PersistedBanditModel::from_model(&BanditModel::zeros(6));
        record.weights.remove("WAVE");
        assert!(record.into_model(6).is_err());
    }

    #[test]
    fn test_path_for_sanitizes() {
        let p = path_for(Path::new("/tmp/x"), "hha.adaptive.bandit.a/b c");
        assert_eq!(p, PathBuf::from("/tmp/x/hha.adaptive.bandit.a_b_c.json"));
    }
}
