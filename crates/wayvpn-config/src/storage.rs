// ── Secure storage backends ──
//
// Concrete `SecureStore` implementations for desktop hosts: the OS
// keyring, and a private JSON file for hosts without one.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use wayvpn_core::{SecureStore, StorageError};

/// Keyring service name; each storage key becomes one keyring entry.
pub const KEYRING_SERVICE: &str = "wayvpn";

// ── File store ──────────────────────────────────────────────────────

/// All keys in one JSON object on disk, readable only by the owner.
///
/// Writes replace the file atomically (temp file + rename) and are
/// serialized within the process.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<BTreeMap<String, String>, StorageError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(json) if json.trim().is_empty() => Ok(BTreeMap::new()),
            Ok(json) => serde_json::from_str(&json).map_err(|e| {
                StorageError::Io(format!("corrupt store file {}: {e}", self.path.display()))
            }),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(io_error(&self.path, &e)),
        }
    }

    async fn save(&self, entries: &BTreeMap<String, String>) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| io_error(parent, &e))?;
        }
        let json = serde_json::to_string_pretty(entries)
            .map_err(|e| StorageError::Io(e.to_string()))?;

        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| io_error(&tmp, &e))?;
        restrict_permissions(&tmp).await?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| io_error(&self.path, &e))?;
        Ok(())
    }
}

#[async_trait]
impl SecureStore for FileStore {
    async fn write(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let _guard = self.lock.lock().await;
        let mut entries = self.load().await?;
        entries.insert(key.to_owned(), value.to_owned());
        self.save(&entries).await?;
        debug!(key, path = %self.path.display(), "stored");
        Ok(())
    }

    async fn read(&self, key: &str) -> Result<Option<String>, StorageError> {
        let _guard = self.lock.lock().await;
        Ok(self.load().await?.remove(key))
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let _guard = self.lock.lock().await;
        let mut entries = self.load().await?;
        if entries.remove(key).is_some() {
            self.save(&entries).await?;
        }
        Ok(())
    }
}

fn io_error(path: &Path, err: &std::io::Error) -> StorageError {
    StorageError::Io(format!("{}: {err}", path.display()))
}

#[cfg(unix)]
async fn restrict_permissions(path: &Path) -> Result<(), StorageError> {
    use std::os::unix::fs::PermissionsExt;
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .await
        .map_err(|e| io_error(path, &e))
}

#[cfg(not(unix))]
async fn restrict_permissions(_path: &Path) -> Result<(), StorageError> {
    Ok(())
}

// ── Keyring store ───────────────────────────────────────────────────

/// One keyring entry per storage key under a fixed service name.
///
/// Keyring calls block, so each runs on the blocking pool.
#[derive(Debug, Clone)]
pub struct KeyringStore {
    service: String,
}

impl KeyringStore {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    async fn with_entry<T, F>(&self, key: &str, op: F) -> Result<T, StorageError>
    where
        T: Send + 'static,
        F: FnOnce(keyring::Entry) -> Result<T, keyring::Error> + Send + 'static,
    {
        let service = self.service.clone();
        let key = key.to_owned();
        tokio::task::spawn_blocking(move || {
            let entry = keyring::Entry::new(&service, &key).map_err(keyring_error)?;
            op(entry).map_err(keyring_error)
        })
        .await
        .map_err(|e| StorageError::Unavailable(format!("keyring task failed: {e}")))?
    }
}

#[async_trait]
impl SecureStore for KeyringStore {
    async fn write(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let value = value.to_owned();
        self.with_entry(key, move |entry| entry.set_password(&value))
            .await
    }

    async fn read(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.with_entry(key, |entry| match entry.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e),
        })
        .await
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.with_entry(key, |entry| match entry.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e),
        })
        .await
    }
}

fn keyring_error(err: keyring::Error) -> StorageError {
    match err {
        keyring::Error::NoStorageAccess(e) | keyring::Error::PlatformFailure(e) => {
            StorageError::Unavailable(e.to_string())
        }
        other => StorageError::Io(other.to_string()),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data").join("store.json");

        let store = FileStore::new(&path);
        assert!(store.read("catalog").await.unwrap().is_none());
        store.write("catalog", r#"{"version":2}"#).await.unwrap();
        store.write("last_session", "{}").await.unwrap();
        store.delete("last_session").await.unwrap();
        store.delete("never_written").await.unwrap();

        let reopened = FileStore::new(&path);
        assert_eq!(
            reopened.read("catalog").await.unwrap().as_deref(),
            Some(r#"{"version":2}"#)
        );
        assert!(reopened.read("last_session").await.unwrap().is_none());
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn file_store_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        FileStore::new(&path).write("k", "v").await.unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[tokio::test]
    async fn corrupt_file_is_a_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        std::fs::write(&path, "{oops").unwrap();

        let err = FileStore::new(&path).read("catalog").await.unwrap_err();
        assert!(matches!(err, StorageError::Io(_)));
    }
}
