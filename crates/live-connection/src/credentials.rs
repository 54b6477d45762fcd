//! Credential storage.
//!
//! The live link and the session bootstrap only ever read the auth token.
//! Writing happens at login, outside this crate's core flow.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use tracing::{debug, warn};

/// Key under which the backend auth token is stored.
pub const AUTH_TOKEN_KEY: &str = "auth_token";

/// Errors from the file-backed credential store.
#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Read access to a secure key-value credential store.
pub trait CredentialStore: Send + Sync {
    /// Returns the value stored under `key`, if any.
    fn read(&self, key: &str) -> Option<String>;
}

/// Trims the token and strips all internal whitespace.
///
/// Returns `None` if nothing is left.
pub fn sanitize_token(raw: &str) -> Option<String> {
    let token: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    (!token.is_empty()).then_some(token)
}

/// Persistent credential store.
///
/// Values are cached in memory and persisted to a JSON file.
pub struct FileCredentialStore {
    path: PathBuf,
    values: RwLock<HashMap<String, String>>,
}

impl FileCredentialStore {
    /// Creates a store, loading existing values from disk.
    pub fn new(path: PathBuf) -> Result<Self, CredentialError> {
        let values = load_values(&path)?;
        Ok(Self {
            path,
            values: RwLock::new(values),
        })
    }

    /// Creates a store, starting empty if the file on disk is unreadable.
    ///
    /// The next write replaces the bad file.
    pub fn open_or_empty(path: PathBuf) -> Self {
        let values = load_values(&path).unwrap_or_else(|e| {
            warn!(path = %path.display(), "ignoring unreadable credentials: {e}");
            HashMap::new()
        });
        Self {
            path,
            values: RwLock::new(values),
        }
    }

    /// Saves a value.
    pub fn write(&self, key: &str, value: &str) -> Result<(), CredentialError> {
        {
            let mut map = self.values.write().unwrap_or_else(PoisonError::into_inner);
            map.insert(key.to_string(), value.to_string());
        }
        self.persist()
    }

    /// Removes a value.
    pub fn remove(&self, key: &str) -> Result<(), CredentialError> {
        {
            let mut map = self.values.write().unwrap_or_else(PoisonError::into_inner);
            map.remove(key);
        }
        self.persist()
    }

    /// Returns all stored keys.
    pub fn keys(&self) -> Vec<String> {
        self.values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    /// Writes the current values to disk.
    fn persist(&self) -> Result<(), CredentialError> {
        let map = self.values.read().unwrap_or_else(PoisonError::into_inner);
        let json = serde_json::to_string_pretty(&*map)?;
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, json)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&self.path, std::fs::Permissions::from_mode(0o600))?;
        }

        debug!("persisted {} credential(s) to {:?}", map.len(), self.path);
        Ok(())
    }
}

impl CredentialStore for FileCredentialStore {
    fn read(&self, key: &str) -> Option<String> {
        self.values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }
}

/// In-memory credential store.
#[derive(Default)]
pub struct MemoryCredentialStore {
    values: RwLock<HashMap<String, String>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store holding just an auth token.
    pub fn with_token(token: &str) -> Self {
        let store = Self::new();
        store.insert(AUTH_TOKEN_KEY, token);
        store
    }

    pub fn insert(&self, key: &str, value: &str) {
        self.values
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value.to_string());
    }

    pub fn clear(&self) {
        self.values
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn read(&self, key: &str) -> Option<String> {
        self.values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }
}

/// Loads values from a JSON file on disk.
fn load_values(path: &Path) -> Result<HashMap<String, String>, CredentialError> {
    if !path.exists() {
        return Ok(HashMap::new());
    }
    let data = std::fs::read_to_string(path)?;
    let values: HashMap<String, String> = serde_json::from_str(&data)?;
    debug!("loaded {} credential(s) from {:?}", values.len(), path);
    Ok(values)
}

/// Returns the default credential file path.
pub fn default_credentials_path() -> Option<PathBuf> {
    config_dir().map(|d| d.join("fleetops").join("credentials.json"))
}

/// Returns the platform-specific config directory.
pub fn config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "linux")]
    {
        std::env::var("XDG_CONFIG_HOME")
            .ok()
            .map(PathBuf::from)
            .or_else(|| {
                std::env::var("HOME")
                    .ok()
                    .map(|h| PathBuf::from(h).join(".config"))
            })
    }

    #[cfg(target_os = "windows")]
    {
        std::env::var("APPDATA").ok().map(PathBuf::from)
    }

    #[cfg(not(any(target_os = "linux", target_os = "windows")))]
    {
        std::env::var("HOME")
            .ok()
            .map(|h| PathBuf::from(h).join(".config"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_store() -> (tempfile::TempDir, FileCredentialStore) {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("credentials.json");
        let store = FileCredentialStore::new(path).unwrap();
        (tmp, store)
    }

    #[test]
    fn new_store_empty() {
        let (_tmp, store) = test_store();
        assert!(store.keys().is_empty());
        assert!(store.read(AUTH_TOKEN_KEY).is_none());
    }

    #[test]
    fn write_and_read() {
        let (_tmp, store) = test_store();
        store.write(AUTH_TOKEN_KEY, "tok-abc").unwrap();
        assert_eq!(store.read(AUTH_TOKEN_KEY).unwrap(), "tok-abc");
    }

    #[test]
    fn remove_value() {
        let (_tmp, store) = test_store();
        store.write(AUTH_TOKEN_KEY, "tok-abc").unwrap();
        store.remove(AUTH_TOKEN_KEY).unwrap();
        assert!(store.read(AUTH_TOKEN_KEY).is_none());
    }

    #[test]
    fn persist_and_reload() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested").join("credentials.json");

        {
            let store = FileCredentialStore::new(path.clone()).unwrap();
            store.write(AUTH_TOKEN_KEY, "tok-1").unwrap();
            store.write("username", "ana").unwrap();
        }

        let store2 = FileCredentialStore::new(path).unwrap();
        assert_eq!(store2.read(AUTH_TOKEN_KEY).unwrap(), "tok-1");
        assert_eq!(store2.read("username").unwrap(), "ana");
        assert_eq!(store2.keys().len(), 2);
    }

    #[cfg(unix)]
    #[test]
    fn persisted_file_is_private() {
        use std::os::unix::fs::PermissionsExt;

        let (tmp, store) = test_store();
        store.write(AUTH_TOKEN_KEY, "secret").unwrap();
        let mode = std::fs::metadata(tmp.path().join("credentials.json"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn load_missing_file_returns_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let values = load_values(&tmp.path().join("absent.json")).unwrap();
        assert!(values.is_empty());
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("credentials.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            FileCredentialStore::new(path),
            Err(CredentialError::Json(_))
        ));
    }

    #[test]
    fn open_or_empty_starts_empty_on_corrupt_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("credentials.json");
        std::fs::write(&path, "{not json").unwrap();

        let store = FileCredentialStore::open_or_empty(path.clone());
        assert!(store.read(AUTH_TOKEN_KEY).is_none());

        store.write(AUTH_TOKEN_KEY, "tok-2").unwrap();
        let reloaded = FileCredentialStore::new(path).unwrap();
        assert_eq!(reloaded.read(AUTH_TOKEN_KEY).as_deref(), Some("tok-2"));
    }

    #[test]
    fn open_or_empty_keeps_existing_values() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("credentials.json");
        FileCredentialStore::new(path.clone())
            .unwrap()
            .write(AUTH_TOKEN_KEY, "tok-1")
            .unwrap();

        let store = FileCredentialStore::open_or_empty(path);
        assert_eq!(store.read(AUTH_TOKEN_KEY).as_deref(), Some("tok-1"));
    }

    #[test]
    fn memory_store_roundtrip() {
        let store = MemoryCredentialStore::with_token("abc");
        assert_eq!(store.read(AUTH_TOKEN_KEY).as_deref(), Some("abc"));
        store.clear();
        assert!(store.read(AUTH_TOKEN_KEY).is_none());
    }

    #[test]
    fn sanitize_strips_whitespace() {
        assert_eq!(sanitize_token("  abc\n").as_deref(), Some("abc"));
        assert_eq!(sanitize_token("ab c\td").as_deref(), Some("abcd"));
        assert_eq!(sanitize_token(" \t\n "), None);
        assert_eq!(sanitize_token(""), None);
    }
}
