//! Persistent key-value store the session is saved to.
//!
//! Values are JSON. Writes are last-write-wins with no cross-process locking.
//! Entries written with [`StorageScope::Session`] live only as long as the
//! store instance; [`StorageScope::Durable`] entries survive a restart when
//! the backend is durable.

use crate::error::StorageError;
use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

/// How long a stored value should live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageScope {
    /// Kept until removed, across restarts
    Durable,
    /// Kept for the lifetime of this process only
    Session,
}

/// Key-value store backing the session.
pub trait KeyValueStore: Send + Sync {
    /// Read a value.
    fn get(&self, key: &str) -> Result<Option<Value>, StorageError>;

    /// Write a value.
    fn set(&self, key: &str, value: Value, scope: StorageScope) -> Result<(), StorageError>;

    /// Delete a value. Deleting a missing key is not an error.
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// Namespaced keys for every value the session persists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageKeys {
    /// Bearer token
    pub token: String,
    /// User snapshot
    pub user: String,
    /// Refresh token
    pub refresh_token: String,
    /// Session record (activity, expiry, clean-exit marker)
    pub session: String,
    /// Server session id
    pub session_id: String,
    /// Client lockout end
    pub lockout_until: String,
}

impl StorageKeys {
    /// Build the key set for a namespace.
    #[must_use]
    pub fn new(namespace: &str) -> Self {
        Self {
            token: format!("{namespace}_auth_token"),
            user: format!("{namespace}_user_data"),
            refresh_token: format!("{namespace}_refresh_token"),
            session: format!("{namespace}_session_data"),
            session_id: format!("{namespace}_session_id"),
            lockout_until: format!("{namespace}_lockout_until"),
        }
    }

    /// Every key, in the order they are cleared on logout.
    #[must_use]
    pub fn all(&self) -> [&str; 6] {
        [
            &self.token,
            &self.user,
            &self.refresh_token,
            &self.session,
            &self.session_id,
            &self.lockout_until,
        ]
    }
}

impl Default for StorageKeys {
    fn default() -> Self {
        Self::new("rentora")
    }
}

/// In-memory store. Shared between manager instances (via `Arc`) it stands
/// in for browser storage across a simulated reload.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, Value>>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a key is present.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.entries
            .read()
            .expect("memory store lock poisoned")
            .contains_key(key)
    }

    /// Number of stored entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().expect("memory store lock poisoned").len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        Ok(self
            .entries
            .read()
            .expect("memory store lock poisoned")
            .get(key)
            .cloned())
    }

    fn set(&self, key: &str, value: Value, _scope: StorageScope) -> Result<(), StorageError> {
        self.entries
            .write()
            .expect("memory store lock poisoned")
            .insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.entries
            .write()
            .expect("memory store lock poisoned")
            .remove(key);
        Ok(())
    }
}

/// JSON-file store. Durable entries are rewritten to disk on every change;
/// session-scoped entries stay in memory and never touch the file.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    durable: RwLock<HashMap<String, Value>>,
    session: RwLock<HashMap<String, Value>>,
}

impl FileStore {
    /// Open (or lazily create) the store at `path`.
    ///
    /// # Errors
    /// Returns error if the file exists but cannot be read or parsed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();
        let durable = if path.exists() {
            let contents = fs::read_to_string(&path)?;
            if contents.trim().is_empty() {
                HashMap::new()
            } else {
                serde_json::from_str(&contents)?
            }
        } else {
            HashMap::new()
        };

        tracing::debug!(path = %path.display(), entries = durable.len(), "Opened session store");

        Ok(Self {
            path,
            durable: RwLock::new(durable),
            session: RwLock::new(HashMap::new()),
        })
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self, durable: &HashMap<String, Value>) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(durable)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, contents)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        if let Some(value) = self
            .session
            .read()
            .expect("session entries lock poisoned")
            .get(key)
        {
            return Ok(Some(value.clone()));
        }
        Ok(self
            .durable
            .read()
            .expect("durable entries lock poisoned")
            .get(key)
            .cloned())
    }

    fn set(&self, key: &str, value: Value, scope: StorageScope) -> Result<(), StorageError> {
        let mut session = self.session.write().expect("session entries lock poisoned");
        let mut durable = self.durable.write().expect("durable entries lock poisoned");

        // Memory only changes once the file write has succeeded.
        match scope {
            StorageScope::Session => {
                if durable.contains_key(key) {
                    let mut next = durable.clone();
                    next.remove(key);
                    self.flush(&next)?;
                    *durable = next;
                }
                session.insert(key.to_string(), value);
            }
            StorageScope::Durable => {
                let mut next = durable.clone();
                next.insert(key.to_string(), value);
                self.flush(&next)?;
                *durable = next;
                session.remove(key);
            }
        }
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let mut session = self.session.write().expect("session entries lock poisoned");
        let mut durable = self.durable.write().expect("durable entries lock poisoned");

        if durable.contains_key(key) {
            let mut next = durable.clone();
            next.remove(key);
            self.flush(&next)?;
            *durable = next;
        }
        session.remove(key);
        Ok(())
    }
}
