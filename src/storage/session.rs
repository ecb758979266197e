use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::path::PathBuf;
use thiserror::Error;

use crate::model::User;

pub const TOKEN_KEY: &str = "token";
pub const USER_KEY: &str = "user";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Failed to access session file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to serialize session: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Persistent string key/value storage for the session.
pub trait SessionStorage: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
    fn clear(&self, key: &str) -> Result<(), StorageError>;
}

/// Session values kept as a JSON object on disk, written through on every change.
pub struct FileSessionStorage {
    path: PathBuf,
    values: Mutex<BTreeMap<String, String>>,
}

impl FileSessionStorage {
    /// Opens the file at `path`. A missing or unreadable file starts empty.
    pub fn open(path: PathBuf) -> Self {
        let values = std::fs::read_to_string(&path)
            .ok()
            .and_then(|content| match serde_json::from_str::<BTreeMap<String, String>>(&content) {
                Ok(values) => Some(values),
                Err(e) => {
                    tracing::warn!("Ignoring corrupt session file {}: {}", path.display(), e);
                    None
                }
            })
            .unwrap_or_default();

        Self {
            path,
            values: Mutex::new(values),
        }
    }

    fn persist(&self, values: &BTreeMap<String, String>) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(values)?;
        std::fs::write(&self.path, json)?;
        Ok(())
    }
}

impl SessionStorage for FileSessionStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.values.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut values = self.values.lock();
        let mut updated = values.clone();
        updated.insert(key.to_string(), value.to_string());
        self.persist(&updated)?;
        *values = updated;
        Ok(())
    }

    fn clear(&self, key: &str) -> Result<(), StorageError> {
        let mut values = self.values.lock();
        if !values.contains_key(key) {
            return Ok(());
        }
        let mut updated = values.clone();
        updated.remove(key);
        self.persist(&updated)?;
        *values = updated;
        Ok(())
    }
}

#[derive(Default)]
pub struct MemorySessionStorage {
    values: Mutex<BTreeMap<String, String>>,
}

impl MemorySessionStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStorage for MemorySessionStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.values.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.values.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn clear(&self, key: &str) -> Result<(), StorageError> {
        self.values.lock().remove(key);
        Ok(())
    }
}

/// Token and user read back from storage.
#[derive(Debug, Clone, PartialEq)]
pub struct PersistedSession {
    pub token: String,
    pub user: User,
}

/// Writes token and user. If either write fails both keys are cleared, so
/// storage never holds a token without its user.
pub fn save_session(
    storage: &dyn SessionStorage,
    token: &str,
    user: &User,
) -> Result<(), StorageError> {
    let user_json = serde_json::to_string(user)?;
    let written = storage
        .set(TOKEN_KEY, token)
        .and_then(|()| storage.set(USER_KEY, &user_json));

    if let Err(e) = written {
        if let Err(clear_err) = clear_session(storage) {
            tracing::error!("Failed to clear partially written session: {}", clear_err);
        }
        return Err(e);
    }
    Ok(())
}

pub fn clear_session(storage: &dyn SessionStorage) -> Result<(), StorageError> {
    storage.clear(TOKEN_KEY)?;
    storage.clear(USER_KEY)?;
    Ok(())
}

/// Reads the stored session. Anything short of a token plus a parseable user
/// purges both values and yields `None`.
pub fn load_session(
    storage: &dyn SessionStorage,
) -> Result<Option<PersistedSession>, StorageError> {
    let token = storage.get(TOKEN_KEY)?;
    let user_json = storage.get(USER_KEY)?;

    match (token, user_json) {
        (None, None) => Ok(None),
        (Some(token), Some(user_json)) => match serde_json::from_str::<User>(&user_json) {
            Ok(user) => Ok(Some(PersistedSession { token, user })),
            Err(e) => {
                tracing::warn!("Stored user record is invalid, clearing session: {}", e);
                clear_session(storage)?;
                Ok(None)
            }
        },
        _ => {
            tracing::warn!("Incomplete stored session, clearing it");
            clear_session(storage)?;
            Ok(None)
        }
    }
}
