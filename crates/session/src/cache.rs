//! Last known good session, kept on disk for offline starts.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::SessionError;

/// Snapshot written after a successful online profile check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedSession {
    pub username: String,
    pub is_active: bool,
    pub saved_at: DateTime<Utc>,
}

impl CachedSession {
    pub fn new(username: impl Into<String>, is_active: bool) -> Self {
        Self {
            username: username.into(),
            is_active,
            saved_at: Utc::now(),
        }
    }

    /// Returns `true` if this snapshot can let the user in offline.
    ///
    /// The profile reply may omit the username, so only the active flag
    /// counts.
    pub fn is_usable(&self) -> bool {
        self.is_active
    }
}

/// Persistence for the cached session.
pub trait SessionCache: Send + Sync {
    fn load_cached_session(&self) -> Result<Option<CachedSession>, SessionError>;
    fn save(&self, session: &CachedSession) -> Result<(), SessionError>;
    fn clear(&self) -> Result<(), SessionError>;
}

/// [`SessionCache`] backed by a JSON file.
#[derive(Debug, Clone)]
pub struct FileSessionCache {
    path: PathBuf,
}

impl FileSessionCache {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// `<config>/fleetops/session.json`
    pub fn default_path() -> Option<PathBuf> {
        fleetops_live_connection::credentials::config_dir()
            .map(|d| d.join("fleetops").join("session.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SessionCache for FileSessionCache {
    fn load_cached_session(&self) -> Result<Option<CachedSession>, SessionError> {
        let data = match std::fs::read_to_string(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        match serde_json::from_str(&data) {
            Ok(session) => Ok(Some(session)),
            Err(e) => {
                warn!(path = %self.path.display(), "ignoring corrupt session cache: {e}");
                Ok(None)
            }
        }
    }

    fn save(&self, session: &CachedSession) -> Result<(), SessionError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_string_pretty(session)?;
        std::fs::write(&self.path, data)?;
        debug!(path = %self.path.display(), username = %session.username, "session cached");
        Ok(())
    }

    fn clear(&self) -> Result<(), SessionError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
