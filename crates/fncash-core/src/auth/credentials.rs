//! Durable storage for the session credential.
//!
//! Exactly one opaque token is persisted under [`CREDENTIAL_KEY`]. When the
//! platform keychain is usable the token is written there and mirrored into a
//! plain JSON file, so it stays readable if the keychain later goes away.
//! Without a keychain every operation targets the plain store alone.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use keyring::Entry;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

// ============================================================================
// Constants
// ============================================================================

/// Logical key the credential lives under in every store
pub const CREDENTIAL_KEY: &str = "auth_token";

/// Service name used for OS keychain entries
pub const KEYRING_SERVICE: &str = "fncash";

/// File name of the plain fallback store inside the data directory
const PLAIN_STORE_FILE: &str = "credentials.json";

/// Key written and deleted while probing the keychain
const PROBE_KEY: &str = "fncash_probe";

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    #[error("Keychain error: {0}")]
    Keyring(#[from] keyring::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse credential file: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Storage task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

// ============================================================================
// Credential
// ============================================================================

/// Opaque session token. Debug output never shows the value.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Credential(<{} bytes>)", self.0.len())
    }
}

impl From<String> for Credential {
    fn from(token: String) -> Self {
        Self(token)
    }
}

// ============================================================================
// Storage backends
// ============================================================================

/// A string key-value store the credential can be persisted into.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Short backend name for log fields
    fn name(&self) -> &'static str;

    /// Read a value. A missing key is `Ok(None)`.
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Delete a value. Deleting a missing key succeeds.
    async fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// OS keychain (Keychain, Credential Manager, kernel keyring) via `keyring`.
pub struct KeyringStore {
    service: String,
}

impl KeyringStore {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    /// Round-trip a throwaway entry to find out whether the keychain actually
    /// persists values on this platform. Returns `None` when it does not.
    pub async fn probe(service: &str) -> Option<Self> {
        let svc = service.to_string();
        let usable = tokio::task::spawn_blocking(move || -> Result<bool, keyring::Error> {
            let entry = Entry::new(&svc, PROBE_KEY)?;
            entry.set_password("probe")?;
            let readback = Entry::new(&svc, PROBE_KEY)?.get_password()?;
            let _ = entry.delete_credential();
            Ok(readback == "probe")
        })
        .await;

        match usable {
            Ok(Ok(true)) => Some(Self::new(service)),
            Ok(Ok(false)) => {
                debug!("Keychain probe read back a different value");
                None
            }
            Ok(Err(e)) => {
                debug!(error = %e, "Keychain unavailable");
                None
            }
            Err(e) => {
                debug!(error = %e, "Keychain probe task failed");
                None
            }
        }
    }
}

#[async_trait]
impl KeyValueStore for KeyringStore {
    fn name(&self) -> &'static str {
        "keyring"
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let (service, key) = (self.service.clone(), key.to_string());
        tokio::task::spawn_blocking(move || -> Result<Option<String>, StorageError> {
            match Entry::new(&service, &key)?.get_password() {
                Ok(value) => Ok(Some(value)),
                Err(keyring::Error::NoEntry) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
        .await?
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let (service, key, value) = (self.service.clone(), key.to_string(), value.to_string());
        tokio::task::spawn_blocking(move || -> Result<(), StorageError> {
            Entry::new(&service, &key)?.set_password(&value)?;
            Ok(())
        })
        .await?
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        let (service, key) = (self.service.clone(), key.to_string());
        tokio::task::spawn_blocking(move || -> Result<(), StorageError> {
            match Entry::new(&service, &key)?.delete_credential() {
                Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
                Err(e) => Err(e.into()),
            }
        })
        .await?
    }
}

/// Plain JSON map on disk. This is the fallback store.
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Store at the conventional file name inside `dir`
    pub fn in_dir(dir: &Path) -> Self {
        Self::new(dir.join(PLAIN_STORE_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_map(&self) -> Result<HashMap<String, String>, StorageError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) if contents.trim().is_empty() => Ok(HashMap::new()),
            Ok(contents) => Ok(serde_json::from_str(&contents)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// Like `read_map`, but an unparsable file counts as empty. Writers use
    /// this so a damaged file is replaced instead of blocking every write.
    async fn read_map_for_write(&self) -> Result<HashMap<String, String>, StorageError> {
        match self.read_map().await {
            Err(StorageError::Serialization(e)) => {
                warn!(path = %self.path.display(), error = %e, "Discarding unreadable credential file");
                Ok(HashMap::new())
            }
            other => other,
        }
    }

    async fn write_map(&self, map: &HashMap<String, String>) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let contents = serde_json::to_string_pretty(map)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, contents).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    fn name(&self) -> &'static str {
        "file"
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.read_map().await?.remove(key))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut map = self.read_map_for_write().await?;
        map.insert(key.to_string(), value.to_string());
        self.write_map(&map).await
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        let (mut map, damaged) = match self.read_map().await {
            Ok(map) => (map, false),
            Err(StorageError::Serialization(e)) => {
                warn!(path = %self.path.display(), error = %e, "Clearing unreadable credential file");
                (HashMap::new(), true)
            }
            Err(e) => return Err(e),
        };
        if map.remove(key).is_some() || damaged {
            self.write_map(&map).await?;
        }
        Ok(())
    }
}

/// Process-local store. Clones share the same entries.
#[derive(Clone, Default)]
pub struct MemoryStore {
    entries: Arc<StdMutex<HashMap<String, String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries().get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.entries().insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.entries().remove(key);
        Ok(())
    }
}

// ============================================================================
// Credential Store
// ============================================================================

/// Persists the single session credential across a secure store (when the
/// platform has one) and a plain fallback store.
pub struct CredentialStore {
    secure: Option<Arc<dyn KeyValueStore>>,
    plain: Arc<dyn KeyValueStore>,
    // Serializes get/set/remove so the two copies never diverge mid-operation.
    op_lock: Mutex<()>,
}

impl CredentialStore {
    pub fn new(secure: Option<Arc<dyn KeyValueStore>>, plain: Arc<dyn KeyValueStore>) -> Self {
        Self {
            secure,
            plain,
            op_lock: Mutex::new(()),
        }
    }

    /// Store for platforms without a secure store concept
    pub fn plain_only(plain: Arc<dyn KeyValueStore>) -> Self {
        Self::new(None, plain)
    }

    /// Pick the storage branch for this platform. The keychain is used only if
    /// `use_secure_store` is set and a probe round-trip succeeds.
    pub async fn for_platform(data_dir: &Path, use_secure_store: bool) -> Self {
        let plain: Arc<dyn KeyValueStore> = Arc::new(FileStore::in_dir(data_dir));
        let secure = if use_secure_store {
            KeyringStore::probe(KEYRING_SERVICE)
                .await
                .map(|store| Arc::new(store) as Arc<dyn KeyValueStore>)
        } else {
            None
        };

        info!(
            secure = secure.is_some(),
            data_dir = %data_dir.display(),
            "Credential store ready"
        );
        Self::new(secure, plain)
    }

    pub fn has_secure_store(&self) -> bool {
        self.secure.is_some()
    }

    /// Read the stored credential. Absence is `Ok(None)`; an error means no
    /// store could be read at all.
    pub async fn get(&self) -> Result<Option<Credential>, StorageError> {
        let _guard = self.op_lock.lock().await;

        let mut secure_readable = false;
        if let Some(ref secure) = self.secure {
            match secure.get(CREDENTIAL_KEY).await {
                Ok(Some(token)) if !token.is_empty() => return Ok(Some(Credential::new(token))),
                Ok(_) => secure_readable = true,
                Err(e) => {
                    warn!(store = secure.name(), error = %e, "Secure store read failed, trying fallback");
                }
            }
        }

        match self.plain.get(CREDENTIAL_KEY).await {
            Ok(token) => Ok(token.filter(|t| !t.is_empty()).map(Credential::new)),
            Err(e) if secure_readable => {
                warn!(store = self.plain.name(), error = %e, "Fallback store read failed");
                Ok(None)
            }
            Err(e) => {
                warn!(store = self.plain.name(), error = %e, "No credential store readable");
                Err(e)
            }
        }
    }

    /// Persist `credential`, replacing any previous one. Succeeds if at least
    /// one store accepted the write.
    pub async fn set(&self, credential: &Credential) -> Result<(), StorageError> {
        let _guard = self.op_lock.lock().await;
        let token = credential.as_str();
        let mut stored = false;

        if let Some(ref secure) = self.secure {
            match secure.set(CREDENTIAL_KEY, token).await {
                Ok(()) => stored = true,
                Err(e) => {
                    warn!(store = secure.name(), error = %e, "Secure store write failed, degrading to fallback");
                    // A stale token left behind would shadow the fallback copy on read.
                    if let Err(e) = secure.remove(CREDENTIAL_KEY).await {
                        warn!(store = secure.name(), error = %e, "Failed to drop stale secure credential");
                    }
                }
            }
        }

        match self.plain.set(CREDENTIAL_KEY, token).await {
            Ok(()) => {
                debug!(secure = stored, "Credential stored");
                Ok(())
            }
            Err(e) if stored => {
                warn!(store = self.plain.name(), error = %e, "Fallback store write failed");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Delete the credential from every store. Both deletions are attempted;
    /// the first failure is reported.
    pub async fn remove(&self) -> Result<(), StorageError> {
        let _guard = self.op_lock.lock().await;
        let mut first_error = None;

        if let Some(ref secure) = self.secure {
            if let Err(e) = secure.remove(CREDENTIAL_KEY).await {
                warn!(store = secure.name(), error = %e, "Failed to remove credential");
                first_error = Some(e);
            }
        }

        if let Err(e) = self.plain.remove(CREDENTIAL_KEY).await {
            warn!(store = self.plain.name(), error = %e, "Failed to remove credential");
            first_error.get_or_insert(e);
        }

        match first_error {
            Some(e) => Err(e),
            None => {
                debug!("Credential removed");
                Ok(())
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Memory store whose operations can be made to fail
    #[derive(Clone, Default)]
    pub(crate) struct FlakyStore {
        pub inner: MemoryStore,
        pub fail_get: bool,
        pub fail_set: bool,
        pub fail_remove: bool,
    }

    fn broken() -> StorageError {
        StorageError::Unavailable("simulated failure".to_string())
    }

    #[async_trait]
    impl KeyValueStore for FlakyStore {
        fn name(&self) -> &'static str {
            "flaky"
        }

        async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
            if self.fail_get {
                return Err(broken());
            }
            self.inner.get(key).await
        }

        async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
            if self.fail_set {
                return Err(broken());
            }
            self.inner.set(key, value).await
        }

        async fn remove(&self, key: &str) -> Result<(), StorageError> {
            if self.fail_remove {
                return Err(broken());
            }
            self.inner.remove(key).await
        }
    }

    fn two_tier() -> (CredentialStore, MemoryStore, MemoryStore) {
        let secure = MemoryStore::new();
        let plain = MemoryStore::new();
        let store = CredentialStore::new(Some(Arc::new(secure.clone())), Arc::new(plain.clone()));
        (store, secure, plain)
    }

    #[tokio::test]
    async fn test_set_then_get_plain_only() {
        let store = CredentialStore::plain_only(Arc::new(MemoryStore::new()));
        store.set(&Credential::new("abc")).await.unwrap();
        assert_eq!(store.get().await.unwrap(), Some(Credential::new("abc")));
    }

    #[tokio::test]
    async fn test_set_mirrors_into_both_stores() {
        let (store, secure, plain) = two_tier();
        store.set(&Credential::new("abc")).await.unwrap();

        assert_eq!(secure.get(CREDENTIAL_KEY).await.unwrap().as_deref(), Some("abc"));
        assert_eq!(plain.get(CREDENTIAL_KEY).await.unwrap().as_deref(), Some("abc"));
        assert_eq!(store.get().await.unwrap(), Some(Credential::new("abc")));
    }

    #[tokio::test]
    async fn test_set_remove_get_is_absent() {
        let (store, secure, plain) = two_tier();
        store.set(&Credential::new("abc")).await.unwrap();
        store.remove().await.unwrap();

        assert_eq!(store.get().await.unwrap(), None);
        assert!(secure.get(CREDENTIAL_KEY).await.unwrap().is_none());
        assert!(plain.get(CREDENTIAL_KEY).await.unwrap().is_none());

        let plain_only = CredentialStore::plain_only(Arc::new(MemoryStore::new()));
        plain_only.set(&Credential::new("abc")).await.unwrap();
        plain_only.remove().await.unwrap();
        assert_eq!(plain_only.get().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_remove_when_empty_is_ok() {
        let (store, _, _) = two_tier();
        store.remove().await.unwrap();
        store.remove().await.unwrap();
    }

    #[tokio::test]
    async fn test_secure_write_failure_degrades_to_fallback() {
        let secure = FlakyStore {
            fail_set: true,
            ..Default::default()
        };
        let store = CredentialStore::new(Some(Arc::new(secure)), Arc::new(MemoryStore::new()));

        store.set(&Credential::new("abc")).await.unwrap();
        assert_eq!(store.get().await.unwrap(), Some(Credential::new("abc")));
    }

    #[tokio::test]
    async fn test_secure_write_failure_does_not_resurrect_old_token() {
        let secure = FlakyStore::default();
        secure.inner.set(CREDENTIAL_KEY, "old").await.unwrap();
        let flaky = FlakyStore {
            fail_set: true,
            ..secure
        };
        let store = CredentialStore::new(Some(Arc::new(flaky)), Arc::new(MemoryStore::new()));

        store.set(&Credential::new("new")).await.unwrap();
        assert_eq!(store.get().await.unwrap(), Some(Credential::new("new")));
    }

    #[tokio::test]
    async fn test_total_write_failure_is_error() {
        let failing = FlakyStore {
            fail_set: true,
            ..Default::default()
        };
        let store = CredentialStore::new(Some(Arc::new(failing.clone())), Arc::new(failing));
        assert!(store.set(&Credential::new("abc")).await.is_err());

        let plain_failing = FlakyStore {
            fail_set: true,
            ..Default::default()
        };
        let plain_only = CredentialStore::plain_only(Arc::new(plain_failing));
        assert!(plain_only.set(&Credential::new("abc")).await.is_err());
    }

    #[tokio::test]
    async fn test_get_falls_back_to_plain_store() {
        let (store, _, plain) = two_tier();
        plain.set(CREDENTIAL_KEY, "legacy").await.unwrap();
        assert_eq!(store.get().await.unwrap(), Some(Credential::new("legacy")));
    }

    #[tokio::test]
    async fn test_get_prefers_secure_store() {
        let (store, secure, plain) = two_tier();
        secure.set(CREDENTIAL_KEY, "secure").await.unwrap();
        plain.set(CREDENTIAL_KEY, "plain").await.unwrap();
        assert_eq!(store.get().await.unwrap(), Some(Credential::new("secure")));
    }

    #[tokio::test]
    async fn test_secure_read_failure_falls_back() {
        let plain = MemoryStore::new();
        plain.set(CREDENTIAL_KEY, "abc").await.unwrap();
        let secure = FlakyStore {
            fail_get: true,
            ..Default::default()
        };
        let store = CredentialStore::new(Some(Arc::new(secure)), Arc::new(plain));
        assert_eq!(store.get().await.unwrap(), Some(Credential::new("abc")));
    }

    #[tokio::test]
    async fn test_read_failure_everywhere_is_error() {
        let failing = FlakyStore {
            fail_get: true,
            ..Default::default()
        };
        let store = CredentialStore::new(Some(Arc::new(failing.clone())), Arc::new(failing));
        assert!(store.get().await.is_err());
    }

    #[tokio::test]
    async fn test_empty_token_is_absent() {
        let (store, secure, _) = two_tier();
        secure.set(CREDENTIAL_KEY, "").await.unwrap();
        assert_eq!(store.get().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_remove_reports_failure_but_clears_other_store() {
        let plain = MemoryStore::new();
        let secure = FlakyStore {
            fail_remove: true,
            ..Default::default()
        };
        let store = CredentialStore::new(Some(Arc::new(secure)), Arc::new(plain.clone()));
        store.set(&Credential::new("abc")).await.unwrap();

        assert!(store.remove().await.is_err());
        assert!(plain.get(CREDENTIAL_KEY).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_file_store_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();

        let first = CredentialStore::plain_only(Arc::new(FileStore::in_dir(dir.path())));
        first.set(&Credential::new("abc")).await.unwrap();

        let second = CredentialStore::plain_only(Arc::new(FileStore::in_dir(dir.path())));
        assert_eq!(second.get().await.unwrap(), Some(Credential::new("abc")));

        second.remove().await.unwrap();
        assert_eq!(first.get().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_file_store_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = FileStore::in_dir(&dir.path().join("nested"));

        assert!(file.get(CREDENTIAL_KEY).await.unwrap().is_none());
        file.remove(CREDENTIAL_KEY).await.unwrap();
        assert!(!file.path().exists());
    }

    #[tokio::test]
    async fn test_file_store_rejects_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = FileStore::in_dir(dir.path());
        std::fs::write(file.path(), "not json").unwrap();

        assert!(matches!(
            file.get(CREDENTIAL_KEY).await,
            Err(StorageError::Serialization(_))
        ));
    }

    #[tokio::test]
    async fn test_file_store_recovers_from_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = Arc::new(FileStore::in_dir(dir.path()));
        std::fs::write(file.path(), "{truncated").unwrap();
        let store = CredentialStore::plain_only(file.clone());

        assert!(store.get().await.is_err());

        store.set(&Credential::new("tok-2")).await.unwrap();
        assert_eq!(store.get().await.unwrap(), Some(Credential::new("tok-2")));
    }

    #[tokio::test]
    async fn test_file_store_remove_clears_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = Arc::new(FileStore::in_dir(dir.path()));
        std::fs::write(file.path(), "not json").unwrap();
        let store = CredentialStore::plain_only(file.clone());

        store.remove().await.unwrap();
        assert_eq!(store.get().await.unwrap(), None);
        assert_eq!(file.get(CREDENTIAL_KEY).await.unwrap(), None);
    }

    #[test]
    fn test_credential_debug_is_redacted() {
        let credential = Credential::new("super-secret");
        let debug = format!("{:?}", credential);
        assert!(!debug.contains("super-secret"));
    }
}
