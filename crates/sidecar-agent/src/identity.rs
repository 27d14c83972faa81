//! End-user identity
//!
//! Every browser gets a stable id, persisted under
//! [`STABLE_ID_KEY`](sidecar_core::config::STABLE_ID_KEY) so assignments
//! survive page loads.

use parking_lot::Mutex;
use sidecar_core::config::STABLE_ID_KEY;
use sidecar_core::{normalize_url, EndUser, HostPage};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Key/value storage surviving page loads
pub trait StableIdStore: Send + Sync {
    /// Stored value
    fn get(&self, key: &str) -> Option<String>;

    /// Store a value; storage failures are logged, not returned
    fn set(&self, key: &str, value: &str);
}

/// Store held in process memory
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    /// Empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl StableIdStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.lock().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        self.values.lock().insert(key.to_string(), value.to_string());
    }
}

/// Store persisted as a JSON object on disk
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileStore {
    /// Store backed by `path`; the file is created on first write
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Backing file
    #[inline]
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> BTreeMap<String, String> {
        match std::fs::read_to_string(&self.path) {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                tracing::warn!(path = %self.path.display(), error = %e, "ignoring unreadable store");
                BTreeMap::new()
            }),
            Err(_) => BTreeMap::new(),
        }
    }
}

impl StableIdStore for JsonFileStore {
    fn get(&self, key: &str) -> Option<String> {
        let _guard = self.lock.lock();
        self.load().remove(key)
    }

    fn set(&self, key: &str, value: &str) {
        let _guard = self.lock.lock();
        let mut values = self.load();
        values.insert(key.to_string(), value.to_string());
        let written = serde_json::to_string_pretty(&values)
            .map_err(std::io::Error::other)
            .and_then(|raw| std::fs::write(&self.path, raw));
        if let Err(e) = written {
            tracing::warn!(path = %self.path.display(), error = %e, "could not persist store");
        }
    }
}

/// Stored stable id, generating and persisting one when absent
pub fn stable_id(store: &dyn StableIdStore) -> String {
    if let Some(id) = store.get(STABLE_ID_KEY).filter(|id| !id.is_empty()) {
        return id;
    }
    let id = Uuid::new_v4().to_string();
    tracing::debug!(stable_id = %id, "generated stable id");
    store.set(STABLE_ID_KEY, &id);
    id
}

/// User the provider evaluates for this page
///
/// `override_user` replaces the primary identity; the stable id is always
/// carried as a custom id.
pub fn end_user(
    store: &dyn StableIdStore,
    page: &dyn HostPage,
    override_user: Option<&str>,
) -> EndUser {
    let stable = stable_id(store);
    let url = normalize_url(&page.href());

    let custom = BTreeMap::from([
        ("url".to_string(), url.clone()),
        ("page_url".to_string(), url),
        ("language".to_string(), page.language()),
    ]);

    EndUser {
        user_id: override_user.map_or_else(|| stable.clone(), ToString::to_string),
        custom_ids: BTreeMap::from([("stableID".to_string(), stable)]),
        custom,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Page;

    impl HostPage for Page {
        fn href(&self) -> String {
            "https://shop.example/p?overrideuser=qa&x=1".to_string()
        }

        fn user_agent(&self) -> String {
            String::new()
        }

        fn language(&self) -> String {
            "de-DE".to_string()
        }

        fn navigate(&self, _url: &str) {}
    }

    #[test]
    fn stable_id_is_generated_once() {
        let store = MemoryStore::new();
        let first = stable_id(&store);
        assert!(Uuid::parse_str(&first).is_ok());
        assert_eq!(stable_id(&store), first);
        assert_eq!(store.get(STABLE_ID_KEY), Some(first));
    }

    #[test]
    fn existing_id_is_reused() {
        let store = MemoryStore::new();
        store.set(STABLE_ID_KEY, "fixed");
        assert_eq!(stable_id(&store), "fixed");
    }

    #[test]
    fn end_user_fields() {
        let store = MemoryStore::new();
        store.set(STABLE_ID_KEY, "sid");
        let user = end_user(&store, &Page, None);
        assert_eq!(user.user_id, "sid");
        assert_eq!(user.stable_id(), Some("sid"));
        assert_eq!(user.custom["url"], "https://shop.example/p?x=1");
        assert_eq!(user.custom["page_url"], "https://shop.example/p?x=1");
        assert_eq!(user.custom["language"], "de-DE");
    }

    #[test]
    fn override_user_replaces_primary_identity() {
        let store = MemoryStore::new();
        store.set(STABLE_ID_KEY, "sid");
        let user = end_user(&store, &Page, Some("qa"));
        assert_eq!(user.user_id, "qa");
        assert_eq!(user.stable_id(), Some("sid"));
    }

    #[test]
    fn file_store_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let id = stable_id(&JsonFileStore::new(&path));
        assert_eq!(stable_id(&JsonFileStore::new(&path)), id);
        assert!(path.exists());
    }

    #[test]
    fn corrupt_file_store_starts_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, "not json").unwrap();
        let store = JsonFileStore::new(&path);
        assert_eq!(store.get(STABLE_ID_KEY), None);
        store.set(STABLE_ID_KEY, "x");
        assert_eq!(store.get(STABLE_ID_KEY).as_deref(), Some("x"));
    }
}
