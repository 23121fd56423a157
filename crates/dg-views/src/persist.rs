//! View-state persistence
//!
//! Chrome is written to an external state slot (a data source the host names)
//! when one is bound, and to a keyed local store otherwise or when the slot
//! write fails. At mount the slot is read first, then the store.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use ahash::AHashMap;
use anyhow::{Context, Result};
use parking_lot::Mutex;
use tracing::{debug, warn};

use dg_core::{DataSource, ViewState};

/// Looks up a named state slot; injected by the host
pub type StateResolver = Arc<dyn Fn(&str) -> Option<Arc<dyn DataSource>> + Send + Sync>;

/// A string key-value store
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
}

/// Process-local store
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<AHashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// One JSON file per key inside a directory
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Use `dir`, creating it if needed
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create state directory {}", dir.display()))?;
        Ok(Self { dir })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let name: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(format!("{name}.json"))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key);
        match std::fs::read_to_string(&path) {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("failed to read {}", path.display())),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let path = self.path_for(key);
        std::fs::write(&path, value).with_context(|| format!("failed to write {}", path.display()))
    }
}

/// Reads and writes one grid instance's chrome
pub struct ViewStatePersistence {
    key: String,
    enabled: bool,
    slot: Option<Arc<dyn DataSource>>,
    store: Option<Arc<dyn KeyValueStore>>,
}

impl ViewStatePersistence {
    /// Persistence for grid `instance_id`
    pub fn new(
        instance_id: &str,
        enabled: bool,
        slot: Option<Arc<dyn DataSource>>,
        store: Option<Arc<dyn KeyValueStore>>,
    ) -> Self {
        Self {
            key: format!("datagrid:{instance_id}"),
            enabled,
            slot,
            store,
        }
    }

    /// Persistence that never reads or writes
    pub fn disabled() -> Self {
        Self::new("", false, None, None)
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Read the saved chrome; missing or malformed state yields `None`
    pub async fn load(&self) -> Option<ViewState> {
        if !self.enabled {
            return None;
        }

        if let Some(slot) = &self.slot {
            match slot.get_value().await {
                Ok(value) if value.is_null() => {}
                Ok(value) => match ViewState::from_json(&value) {
                    Some(state) => {
                        debug!(key = %self.key, "view state loaded from state slot");
                        return Some(state);
                    }
                    None => warn!(key = %self.key, "ignoring malformed view state in state slot"),
                },
                Err(e) => warn!(key = %self.key, error = %e, "failed to read state slot"),
            }
        }

        let store = self.store.as_ref()?;
        match store.get(&self.key) {
            Ok(Some(text)) => {
                let state = ViewState::from_json_str(&text);
                if state.is_none() {
                    warn!(key = %self.key, "ignoring malformed view state in local store");
                }
                state
            }
            Ok(None) => None,
            Err(e) => {
                warn!(key = %self.key, error = %e, "failed to read local store");
                None
            }
        }
    }

    /// Write the chrome to the slot, or to the local store when the slot is absent or fails
    pub async fn save(&self, state: &ViewState) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }

        let json = state.to_json();
        if let Some(slot) = &self.slot {
            match slot.set_value(None, json.clone(), true).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    warn!(key = %self.key, error = %e, "state slot write failed, using local store")
                }
            }
        }

        if let Some(store) = &self.store {
            store
                .set(&self.key, &json.to_string())
                .with_context(|| format!("failed to persist view state {}", self.key))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dg_core::ColumnSort;
    use dg_data::{ArraySource, ScalarElement};
    use serde_json::json;
    use tempfile::tempdir;

    fn sample_state() -> ViewState {
        let mut state = ViewState::default();
        state.column_order = vec!["b".into(), "a".into()];
        state.column_sorting = vec![ColumnSort::desc("a")];
        state.column_visibility.insert("b".into(), false);
        state
    }

    #[tokio::test]
    async fn test_store_round_trip() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let persistence = ViewStatePersistence::new("grid1", true, None, Some(store.clone()));
        persistence.save(&sample_state()).await.unwrap();
        assert!(store.get("datagrid:grid1").unwrap().is_some());
        assert_eq!(persistence.load().await, Some(sample_state()));
    }

    #[tokio::test]
    async fn test_slot_takes_precedence() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        store.set("datagrid:g", &ViewState::default().to_json().to_string()).unwrap();
        let slot = Arc::new(ScalarElement::new("state", sample_state().to_json()));

        let persistence =
            ViewStatePersistence::new("g", true, Some(slot as Arc<dyn DataSource>), Some(store));
        assert_eq!(persistence.load().await, Some(sample_state()));
    }

    #[tokio::test]
    async fn test_slot_write_does_not_touch_store() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let slot = Arc::new(ScalarElement::new("state", json!(null)));
        let persistence = ViewStatePersistence::new(
            "g",
            true,
            Some(slot.clone() as Arc<dyn DataSource>),
            Some(store.clone()),
        );

        persistence.save(&sample_state()).await.unwrap();
        assert_eq!(slot.value(), sample_state().to_json());
        assert_eq!(store.get("datagrid:g").unwrap(), None);
    }

    #[tokio::test]
    async fn test_failed_slot_write_falls_back_to_store() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        // An array slot rejects an object value
        let slot = Arc::new(ArraySource::new("state", Vec::new()));
        let persistence = ViewStatePersistence::new(
            "g",
            true,
            Some(slot as Arc<dyn DataSource>),
            Some(store.clone()),
        );

        persistence.save(&sample_state()).await.unwrap();
        assert!(store.get("datagrid:g").unwrap().is_some());
    }

    #[tokio::test]
    async fn test_malformed_state_is_ignored() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        store.set("datagrid:g", "{not json").unwrap();
        let persistence = ViewStatePersistence::new("g", true, None, Some(store));
        assert_eq!(persistence.load().await, None);
    }

    #[tokio::test]
    async fn test_disabled_never_writes() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let persistence = ViewStatePersistence::new("g", false, None, Some(store.clone()));
        persistence.save(&sample_state()).await.unwrap();
        assert_eq!(store.get("datagrid:g").unwrap(), None);
        assert_eq!(persistence.load().await, None);
    }

    #[test]
    fn test_file_store() {
        let dir = tempdir().unwrap();
        let store = FileStore::open(dir.path().join("state")).unwrap();
        assert_eq!(store.get("datagrid:a/b").unwrap(), None);
        store.set("datagrid:a/b", "{}").unwrap();
        assert_eq!(store.get("datagrid:a/b").unwrap().as_deref(), Some("{}"));
        assert!(dir.path().join("state").join("datagrid_a_b.json").exists());
    }
}
