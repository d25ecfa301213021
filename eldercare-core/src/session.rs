//! Persisted login session
//!
//! The session lives in a small JSON key/value file (by default
//! `$XDG_DATA_HOME/eldercare/session.json`):
//!
//! ```json
//! {
//!   "currentUser": { "username": "ana", "token": "eyJ..." },
//!   "userToken": "eyJ..."
//! }
//! ```
//!
//! The token is duplicated under `userToken` so request signing can read it
//! without decoding the user record. Readers are the API client on every
//! request; writers are login, registration and logout.

use crate::error::{Error, Result};
use crate::types::Session;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct StoredKeys {
    #[serde(
        rename = "currentUser",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    current_user: Option<Session>,

    #[serde(rename = "userToken", default, skip_serializing_if = "Option::is_none")]
    user_token: Option<String>,
}

/// File-backed session with an in-memory copy for cheap reads.
#[derive(Debug)]
pub struct SessionStore {
    path: PathBuf,
    keys: RwLock<StoredKeys>,
}

impl SessionStore {
    /// Open the store at `path`, loading any saved session.
    ///
    /// A missing file is an empty store.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let keys = match std::fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content).map_err(|e| {
                Error::Session(format!("failed to parse session file {:?}: {}", path, e))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => StoredKeys::default(),
            Err(e) => return Err(Error::Io(e)),
        };

        Ok(Self {
            path,
            keys: RwLock::new(keys),
        })
    }

    /// A store that never touches disk. Useful for tests and one-off tools.
    pub fn in_memory() -> Self {
        Self {
            path: PathBuf::new(),
            keys: RwLock::new(StoredKeys::default()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The logged-in account, if any
    pub fn current(&self) -> Option<Session> {
        self.read().current_user.clone()
    }

    /// Bearer token for outgoing requests
    pub fn token(&self) -> Option<String> {
        self.read().user_token.clone()
    }

    /// Replace the stored session
    pub fn save(&self, session: Session) -> Result<()> {
        let keys = StoredKeys {
            user_token: Some(session.token.clone()),
            current_user: Some(session),
        };
        self.persist(&keys)?;
        *self.write() = keys;
        Ok(())
    }

    /// Forget the session and its token
    pub fn clear(&self) -> Result<()> {
        let keys = StoredKeys::default();
        self.persist(&keys)?;
        *self.write() = keys;
        Ok(())
    }

    fn persist(&self, keys: &StoredKeys) -> Result<()> {
        if self.path.as_os_str().is_empty() {
            return Ok(());
        }

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(keys)?)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, StoredKeys> {
        self.keys.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, StoredKeys> {
        self.keys.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
