//! Durable session state: one JSON value per key behind a storage trait.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::ledger::{HistoryEntry, Scenario};

pub mod keys {
    pub const SCENARIOS: &str = "credishield-scenarios";
    pub const HISTORY: &str = "credishield-history";
    pub const BASELINE: &str = "credishield-baseline";
    pub const LANGUAGE: &str = "credishield-language";
    pub const TOUR_OPEN: &str = "credishield-tour-open";
    pub const ROLE: &str = "credishield-role";

    pub const ALL: [&str; 6] = [SCENARIOS, HISTORY, BASELINE, LANGUAGE, TOUR_OPEN, ROLE];
}

/// UI language preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Language {
    #[default]
    En,
    Hi,
}

impl Language {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "en" | "english" => Some(Self::En),
            "hi" | "hindi" => Some(Self::Hi),
            _ => None,
        }
    }
}

/// Who is using the console; analysts and admins see model oversight data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    #[default]
    EndUser,
    Analyst,
    Admin,
}

impl Role {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "end_user" | "user" => Some(Self::EndUser),
            "analyst" => Some(Self::Analyst),
            "admin" => Some(Self::Admin),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Role::EndUser => "end_user",
            Role::Analyst => "analyst",
            Role::Admin => "admin",
        }
    }

    pub fn can_view_oversight(self) -> bool {
        !matches!(self, Role::EndUser)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Raw key/value backend so the store can be exercised in isolation.
pub trait SessionStorage: Send + Sync {
    fn read(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn write(&self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("session storage unavailable: {0}")]
    Unavailable(String),
    #[error("session storage io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Failures crossing the serialize/deserialize boundary.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("failed to encode '{key}': {source}")]
    Encode {
        key: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("stored value for '{key}' is unreadable: {source}")]
    Decode {
        key: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// Process-local storage for tests and throwaway sessions.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn raw(&self, key: &str) -> Option<String> {
        self.read(key).ok().flatten()
    }
}

impl SessionStorage for MemoryStorage {
    fn read(&self, key: &str) -> Result<Option<String>, StorageError> {
        let guard = self
            .entries
            .lock()
            .map_err(|_| StorageError::Unavailable("mutex poisoned".to_string()))?;
        Ok(guard.get(key).cloned())
    }

    fn write(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut guard = self
            .entries
            .lock()
            .map_err(|_| StorageError::Unavailable("mutex poisoned".to_string()))?;
        guard.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let mut guard = self
            .entries
            .lock()
            .map_err(|_| StorageError::Unavailable("mutex poisoned".to_string()))?;
        guard.remove(key);
        Ok(())
    }
}

/// One `<key>.json` file per key inside a session directory.
#[derive(Debug, Clone)]
pub struct FileStorage {
    root: PathBuf,
}

impl FileStorage {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|source| StorageError::Io {
            path: root.clone(),
            source,
        })?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(format!("{key}.json"))
    }
}

impl SessionStorage for FileStorage {
    fn read(&self, key: &str) -> Result<Option<String>, StorageError> {
        let path = self.path_for(key);
        match fs::read_to_string(&path) {
            Ok(contents) => Ok(Some(contents)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StorageError::Io { path, source }),
        }
    }

    fn write(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let path = self.path_for(key);
        let staging = path.with_extension("json.tmp");
        fs::write(&staging, value).map_err(|source| StorageError::Io {
            path: staging.clone(),
            source,
        })?;
        fs::rename(&staging, &path).map_err(|source| StorageError::Io { path, source })
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let path = self.path_for(key);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StorageError::Io { path, source }),
        }
    }
}

/// Typed accessors over the session keys.
///
/// Reads never fail: a missing key, a storage error, or an unparsable value
/// all yield the key's default and the problem is logged.
pub struct SessionStore<K> {
    storage: Arc<K>,
}

impl<K> Clone for SessionStore<K> {
    fn clone(&self) -> Self {
        Self {
            storage: Arc::clone(&self.storage),
        }
    }
}

impl<K: SessionStorage> SessionStore<K> {
    pub fn new(storage: Arc<K>) -> Self {
        Self { storage }
    }

    pub fn storage(&self) -> &K {
        &self.storage
    }

    pub fn saved_scenarios(&self) -> Vec<Scenario> {
        self.read_or(keys::SCENARIOS, Vec::new)
    }

    pub fn set_saved_scenarios(&self, scenarios: &[Scenario]) -> Result<(), PersistenceError> {
        self.write_value(keys::SCENARIOS, &scenarios)
    }

    pub fn history(&self) -> Vec<HistoryEntry> {
        self.read_or(keys::HISTORY, Vec::new)
    }

    pub fn set_history(&self, history: &[HistoryEntry]) -> Result<(), PersistenceError> {
        self.write_value(keys::HISTORY, &history)
    }

    pub fn baseline(&self) -> Option<Scenario> {
        self.read_or(keys::BASELINE, || None)
    }

    pub fn set_baseline(&self, baseline: Option<&Scenario>) -> Result<(), PersistenceError> {
        self.write_value(keys::BASELINE, &baseline)
    }

    pub fn language(&self) -> Language {
        self.read_or(keys::LANGUAGE, Language::default)
    }

    pub fn set_language(&self, language: Language) -> Result<(), PersistenceError> {
        self.write_value(keys::LANGUAGE, &language)
    }

    pub fn tour_open(&self) -> bool {
        self.read_or(keys::TOUR_OPEN, || true)
    }

    pub fn set_tour_open(&self, open: bool) -> Result<(), PersistenceError> {
        self.write_value(keys::TOUR_OPEN, &open)
    }

    pub fn role(&self) -> Role {
        self.read_or(keys::ROLE, Role::default)
    }

    pub fn set_role(&self, role: Role) -> Result<(), PersistenceError> {
        self.write_value(keys::ROLE, &role)
    }

    fn read_or<T, F>(&self, key: &'static str, fallback: F) -> T
    where
        T: DeserializeOwned,
        F: FnOnce() -> T,
    {
        match self.decode(key) {
            Ok(Some(value)) => value,
            Ok(None) => fallback(),
            Err(err) => {
                warn!(key, error = %err, "recovering session value to default");
                fallback()
            }
        }
    }

    fn decode<T: DeserializeOwned>(&self, key: &'static str) -> Result<Option<T>, PersistenceError> {
        let Some(raw) = self.storage.read(key)? else {
            return Ok(None);
        };
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|source| PersistenceError::Decode { key, source })
    }

    fn write_value<T: Serialize>(&self, key: &'static str, value: &T) -> Result<(), PersistenceError> {
        let encoded =
            serde_json::to_string(value).map_err(|source| PersistenceError::Encode { key, source })?;
        self.storage.write(key, &encoded)?;
        debug!(key, bytes = encoded.len(), "session value persisted");
        Ok(())
    }
}
