//! Browser-local storage, modelled as two key/value scopes.
//!
//! The durable scope survives a restart (a JSON file in the data directory);
//! the ephemeral scope lives only as long as the process. Only the session
//! manager and the hierarchy scope write the keys defined here.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::models::{LoginActivity, PersistenceMode, LOGIN_ACTIVITY_CAP};

pub const AUTH_TOKEN_KEY: &str = "auth_token";
pub const TENANT_ID_KEY: &str = "tenant_id";
pub const SELECTED_SELLER_KEY: &str = "selected_seller_id";
pub const SELECTED_ARTISAN_KEY: &str = "selected_artisan_id";
pub const LOGIN_ACTIVITY_KEY: &str = "login_activity";

pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str);
    fn remove(&self, key: &str);
}

/// Process-lifetime store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.read().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        self.entries
            .write()
            .insert(key.to_string(), value.to_string());
    }

    fn remove(&self, key: &str) {
        self.entries.write().remove(key);
    }
}

/// JSON-file backed store. Every mutation rewrites the file; write failures
/// are logged and the in-memory view stays authoritative.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    entries: RwLock<HashMap<String, String>>,
}

impl FileStore {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = match std::fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                tracing::warn!(path = %path.display(), error = %e, "Discarding unreadable storage file");
                HashMap::new()
            }),
            Err(_) => HashMap::new(),
        };
        Self {
            path,
            entries: RwLock::new(entries),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self, entries: &HashMap<String, String>) {
        if let Some(parent) = self.path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                tracing::warn!(path = %parent.display(), error = %e, "Failed to create storage directory");
                return;
            }
        }
        let result = serde_json::to_string_pretty(entries)
            .map_err(std::io::Error::other)
            .and_then(|json| std::fs::write(&self.path, json));
        if let Err(e) = result {
            tracing::warn!(path = %self.path.display(), error = %e, "Failed to write storage file");
        }
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.read().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        let mut entries = self.entries.write();
        entries.insert(key.to_string(), value.to_string());
        self.flush(&entries);
    }

    fn remove(&self, key: &str) {
        let mut entries = self.entries.write();
        if entries.remove(key).is_some() {
            self.flush(&entries);
        }
    }
}

/// Both storage scopes of one browser context.
#[derive(Clone)]
pub struct BrowserStorage {
    durable: Arc<dyn KeyValueStore>,
    ephemeral: Arc<dyn KeyValueStore>,
}

impl BrowserStorage {
    pub fn new(durable: Arc<dyn KeyValueStore>, ephemeral: Arc<dyn KeyValueStore>) -> Self {
        Self { durable, ephemeral }
    }

    /// Two in-memory scopes.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()), Arc::new(MemoryStore::new()))
    }

    pub fn scope(&self, mode: PersistenceMode) -> &dyn KeyValueStore {
        match mode {
            PersistenceMode::Durable => self.durable.as_ref(),
            PersistenceMode::Ephemeral => self.ephemeral.as_ref(),
        }
    }

    pub fn durable(&self) -> &dyn KeyValueStore {
        self.durable.as_ref()
    }

    pub fn ephemeral(&self) -> &dyn KeyValueStore {
        self.ephemeral.as_ref()
    }

    /// Look a key up in the durable scope first, then the ephemeral one.
    pub fn find(&self, key: &str) -> Option<(String, PersistenceMode)> {
        if let Some(value) = self.durable.get(key) {
            return Some((value, PersistenceMode::Durable));
        }
        self.ephemeral
            .get(key)
            .map(|value| (value, PersistenceMode::Ephemeral))
    }

    pub fn remove_everywhere(&self, key: &str) {
        self.durable.remove(key);
        self.ephemeral.remove(key);
    }

    pub fn login_activity(&self) -> Vec<LoginActivity> {
        self.durable
            .get(LOGIN_ACTIVITY_KEY)
            .and_then(|raw| serde_json::from_str(&raw).ok())
            .unwrap_or_default()
    }

    /// Append to the login activity log, keeping the most recent entries.
    pub fn record_login_activity(&self, entry: LoginActivity) {
        let mut log = self.login_activity();
        log.push(entry);
        if log.len() > LOGIN_ACTIVITY_CAP {
            let overflow = log.len() - LOGIN_ACTIVITY_CAP;
            log.drain(..overflow);
        }
        match serde_json::to_string(&log) {
            Ok(json) => self.durable.set(LOGIN_ACTIVITY_KEY, &json),
            Err(e) => tracing::warn!(error = %e, "Failed to serialize login activity"),
        }
    }
}

impl std::fmt::Debug for BrowserStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrowserStorage").finish_non_exhaustive()
    }
}
