use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
#[cfg(unix)]
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{CredentialStore, StoreError};

const CREDENTIAL_FILE_VERSION: u32 = 1;

/// JSON-file-backed store that keeps every value in memory and writes the
/// whole map out on flush.
///
/// Writes are batched: `set` only marks the store dirty. Durability comes
/// from [`FileCredentialStore::persist`] (flush now) or from a running
/// [`FlushScheduler`].
///
/// # Example
/// ```no_run
/// use std::sync::Arc;
/// use std::time::Duration;
/// use botauth::store::{CredentialStore, FileCredentialStore};
///
/// # async fn example() -> Result<(), botauth::store::StoreError> {
/// let store = Arc::new(FileCredentialStore::open_default()?);
/// let flusher = store.spawn_flusher(Duration::from_secs(60));
/// store.set("GOOGLE_AUTH_TOKEN", "access".to_string());
/// flusher.shutdown().await;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct FileCredentialStore {
    path: PathBuf,
    values: RwLock<BTreeMap<String, String>>,
    dirty: AtomicBool,
    /// Serializes flushes so an older snapshot never lands after a newer one.
    flush_lock: Mutex<()>,
    flush_reset: Notify,
}

impl FileCredentialStore {
    /// Open the store at `path`, loading existing values if the file exists.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let values = match fs::read_to_string(&path) {
            Ok(raw) => {
                let file: CredentialFile = serde_json::from_str(&raw)?;
                if file.version != CREDENTIAL_FILE_VERSION {
                    return Err(StoreError::UnsupportedVersion {
                        version: file.version,
                        path,
                    });
                }
                file.values
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(err) => return Err(StoreError::Io(err)),
        };
        debug!(path = %path.display(), keys = values.len(), "opened credential store");
        Ok(Self {
            path,
            values: RwLock::new(values),
            dirty: AtomicBool::new(false),
            flush_lock: Mutex::new(()),
            flush_reset: Notify::new(),
        })
    }

    pub fn open_default() -> Result<Self, StoreError> {
        Self::open(Self::default_path())
    }

    /// `~/.botauth/credentials.json`.
    pub fn default_path() -> PathBuf {
        directories::UserDirs::new()
            .map(|dirs| dirs.home_dir().join(".botauth"))
            .unwrap_or_else(|| PathBuf::from(".botauth"))
            .join("credentials.json")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Unflushed changes pending.
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::SeqCst)
    }

    /// Write the map to disk if anything changed since the last flush.
    pub fn flush(&self) -> Result<(), StoreError> {
        let _guard = self.flush_lock.lock().unwrap_or_else(PoisonError::into_inner);
        if !self.dirty.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        let snapshot = self
            .values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let file = CredentialFile {
            version: CREDENTIAL_FILE_VERSION,
            values: snapshot,
        };
        let result = serde_json::to_vec_pretty(&file)
            .map_err(StoreError::from)
            .and_then(|data| atomic_write(&self.path, &data).map_err(StoreError::from));
        if result.is_err() {
            self.dirty.store(true, Ordering::SeqCst);
        } else {
            debug!(path = %self.path.display(), "flushed credential store");
        }
        result
    }

    /// Start the periodic flusher for this store.
    ///
    /// Every `interval` the store is flushed if dirty. A call to `persist`
    /// restarts the window. Must be called inside a tokio runtime.
    pub fn spawn_flusher(self: &Arc<Self>, interval: Duration) -> FlushScheduler {
        let cancel = CancellationToken::new();
        let store = Arc::clone(self);
        let token = cancel.clone();
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = store.flush_reset.notified() => continue,
                    _ = tokio::time::sleep(interval) => {
                        if let Err(err) = store.flush() {
                            warn!(path = %store.path.display(), error = %err, "periodic credential flush failed");
                        }
                    }
                }
            }
            if let Err(err) = store.flush() {
                warn!(path = %store.path.display(), error = %err, "final credential flush failed");
            }
        });
        FlushScheduler {
            cancel,
            handle: Some(handle),
        }
    }

    fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::SeqCst);
    }
}

impl CredentialStore for FileCredentialStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn set(&self, key: &str, value: String) {
        self.values
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value);
        self.mark_dirty();
    }

    fn remove(&self, key: &str) {
        let removed = self
            .values
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        if removed.is_some() {
            self.mark_dirty();
        }
    }

    fn persist(&self) -> Result<(), StoreError> {
        let result = self.flush();
        self.flush_reset.notify_one();
        result
    }
}

/// Handle to the background flush task of a [`FileCredentialStore`].
///
/// Dropping the handle stops the task; `shutdown` also waits for the final
/// flush.
#[derive(Debug)]
pub struct FlushScheduler {
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl FlushScheduler {
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            if let Err(err) = handle.await {
                warn!(error = %err, "credential flush task ended abnormally");
            }
        }
    }
}

impl Drop for FlushScheduler {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct CredentialFile {
    version: u32,
    values: BTreeMap<String, String>,
}

fn atomic_write(path: &Path, data: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "credentials.json".to_string());
    let nonce = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let temp_path = path.with_file_name(format!(
        ".{file_name}.tmp-{}-{nonce}",
        std::process::id()
    ));

    let mut options = fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    options.mode(0o600);

    let write_result = (|| -> std::io::Result<()> {
        let mut temp_file = options.open(&temp_path)?;
        temp_file.write_all(data)?;
        temp_file.sync_all()?;
        Ok(())
    })();

    if let Err(err) = write_result {
        let _ = fs::remove_file(&temp_path);
        return Err(err);
    }

    if let Err(err) = fs::rename(&temp_path, path) {
        let _ = fs::remove_file(&temp_path);
        return Err(err);
    }

    #[cfg(unix)]
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;

    Ok(())
}
