//! Credential persistence.
//!
//! [`KeyValueStore`] is the storage capability (get / set / remove of string
//! entries). [`CredentialStore`] layers the single `quickchex_credentials`
//! entry on top of it and owns the "complete bundle or nothing" rule.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::types::CredentialBundle;

/// Name of the entry holding the serialized bundle.
pub const CREDENTIALS_KEY: &str = "quickchex_credentials";

/// Minimal string key-value persistence.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
    /// Returns whether the key existed.
    fn remove(&self, key: &str) -> Result<bool, StoreError>;
}

/// In-process store. Clones share the same entries.
#[derive(Debug, Clone, Default)]
pub struct MemoryKeyValueStore {
    entries: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>, StoreError> {
        self.entries
            .lock()
            .map_err(|_| StoreError::Io("memory store lock poisoned".to_string()))
    }
}

impl KeyValueStore for MemoryKeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.lock()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.lock()?.remove(key).is_some())
    }
}

/// On-disk entries file format
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct EntriesFile {
    #[serde(default)]
    entries: BTreeMap<String, String>,
}

/// TOML-file backed store, rewritten on every change with owner-only
/// permissions on Unix.
#[derive(Debug)]
pub struct FileKeyValueStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileKeyValueStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<EntriesFile, StoreError> {
        if !self.path.exists() {
            return Ok(EntriesFile::default());
        }
        let content = fs::read_to_string(&self.path)?;
        Ok(toml::from_str(&content)?)
    }

    fn write(&self, file: &EntriesFile) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let content = toml::to_string_pretty(file)?;
        fs::write(&self.path, content)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&self.path, fs::Permissions::from_mode(0o600))?;
        }

        Ok(())
    }

    fn guard(&self) -> Result<std::sync::MutexGuard<'_, ()>, StoreError> {
        self.lock
            .lock()
            .map_err(|_| StoreError::Io("file store lock poisoned".to_string()))
    }
}

impl KeyValueStore for FileKeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let _guard = self.guard()?;
        Ok(self.read()?.entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let _guard = self.guard()?;
        let mut file = self.read()?;
        file.entries.insert(key.to_string(), value.to_string());
        self.write(&file)
    }

    fn remove(&self, key: &str) -> Result<bool, StoreError> {
        let _guard = self.guard()?;
        let mut file = self.read()?;
        let existed = file.entries.remove(key).is_some();
        if existed {
            self.write(&file)?;
        }
        Ok(existed)
    }
}

/// Last-known-good credential bundle.
#[derive(Debug, Clone)]
pub struct CredentialStore<S> {
    backend: S,
}

impl<S: KeyValueStore> CredentialStore<S> {
    pub fn new(backend: S) -> Self {
        Self { backend }
    }

    /// Load the stored bundle. An entry that does not parse, or lacks one of
    /// the required fields, is deleted and reported as absent.
    pub fn load(&self) -> Result<Option<CredentialBundle>, StoreError> {
        let Some(raw) = self.backend.get(CREDENTIALS_KEY)? else {
            return Ok(None);
        };

        match serde_json::from_str::<CredentialBundle>(&raw) {
            Ok(bundle) if bundle.is_complete() => {
                debug!(user = %bundle.account_email, "loaded stored credentials");
                Ok(Some(bundle))
            }
            Ok(_) => {
                warn!("Stored credentials are incomplete, discarding them");
                self.backend.remove(CREDENTIALS_KEY)?;
                Ok(None)
            }
            Err(e) => {
                warn!("Error loading saved credentials: {}", e);
                self.backend.remove(CREDENTIALS_KEY)?;
                Ok(None)
            }
        }
    }

    /// Persist a bundle, replacing any previous one. Incomplete bundles are
    /// never written.
    pub fn save(&self, bundle: &CredentialBundle) -> Result<(), StoreError> {
        if !bundle.is_complete() {
            return Err(StoreError::Serde(
                "refusing to persist an incomplete credential bundle".to_string(),
            ));
        }
        let raw = serde_json::to_string(bundle)?;
        self.backend.set(CREDENTIALS_KEY, &raw)
    }

    pub fn clear(&self) -> Result<bool, StoreError> {
        self.backend.remove(CREDENTIALS_KEY)
    }
}
