//! Persistence collaborator
//!
//! The coordinator hands a `PoolSnapshot` to a `PoolStore` after every
//! mutation. The snapshot is the only serialized form of the pool; its layout
//! belongs to the store, not to the pool model.
//!
//! `JsonFileStore` writes the snapshot as pretty JSON using atomic temp-file +
//! rename with 0600 permissions, since the file holds raw secrets.

use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use common::Secret;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::credential::{Credential, Quota};
use crate::endpoint::{Endpoint, EndpointSet, EndpointStrategy};
use crate::error::{Error, Result};
use crate::pool::{KeyPool, SwitchStrategy};

/// Boxed future returned by store methods.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Persisted form of one credential, including its raw secret.
#[derive(Clone, Serialize, Deserialize)]
pub struct CredentialRecord {
    pub id: String,
    pub secret: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quota: Option<Quota>,
    #[serde(default)]
    pub invalid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_used: Option<u64>,
}

impl fmt::Debug for CredentialRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialRecord")
            .field("id", &self.id)
            .field("secret", &"[REDACTED]")
            .field("name", &self.name)
            .field("quota", &self.quota)
            .field("invalid", &self.invalid)
            .field("last_used", &self.last_used)
            .finish()
    }
}

impl From<&Credential> for CredentialRecord {
    fn from(c: &Credential) -> Self {
        Self {
            id: c.id.clone(),
            secret: c.secret.expose().clone(),
            name: c.display_name.clone(),
            quota: c.quota,
            invalid: c.invalid,
            last_used: c.last_used,
        }
    }
}

impl From<CredentialRecord> for Credential {
    fn from(r: CredentialRecord) -> Self {
        Self {
            id: r.id,
            secret: Secret::new(r.secret),
            display_name: r.name,
            quota: r.quota,
            invalid: r.invalid,
            last_used: r.last_used,
        }
    }
}

/// Everything needed to rebuild a pool and its endpoint set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PoolSnapshot {
    /// Increases with every mutation; older snapshots are never written over
    /// newer ones.
    #[serde(default)]
    pub revision: u64,
    #[serde(default)]
    pub credentials: Vec<CredentialRecord>,
    #[serde(default)]
    pub active_index: usize,
    #[serde(default)]
    pub strategy: SwitchStrategy,
    #[serde(default)]
    pub endpoints: Vec<Endpoint>,
    #[serde(default)]
    pub selected_endpoint: Option<String>,
    #[serde(default)]
    pub endpoint_strategy: EndpointStrategy,
}

impl PoolSnapshot {
    pub fn capture(pool: &KeyPool, endpoints: &EndpointSet, revision: u64) -> Self {
        Self {
            revision,
            credentials: pool.iter().map(CredentialRecord::from).collect(),
            active_index: pool.active_index().unwrap_or(0),
            strategy: pool.strategy(),
            endpoints: endpoints.iter().cloned().collect(),
            selected_endpoint: endpoints.selected().map(str::to_string),
            endpoint_strategy: endpoints.strategy(),
        }
    }

    /// Rebuild the pool and endpoint set. Duplicates are dropped and the
    /// active index is clamped into range.
    pub fn restore(self) -> (KeyPool, EndpointSet) {
        let credentials = self.credentials.into_iter().map(Credential::from).collect();
        let pool = KeyPool::from_parts(credentials, self.active_index, self.strategy);
        let endpoints =
            EndpointSet::from_parts(self.endpoints, self.selected_endpoint, self.endpoint_strategy);
        (pool, endpoints)
    }
}

/// Persistence collaborator.
pub trait PoolStore: Send + Sync {
    fn load(&self) -> StoreFuture<'_, PoolSnapshot>;
    fn save<'a>(&'a self, snapshot: &'a PoolSnapshot) -> StoreFuture<'a, ()>;
}

/// JSON file store.
///
/// A missing file on load is a cold start: an empty snapshot is written so
/// later loads take the normal path.
pub struct JsonFileStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PoolStore for JsonFileStore {
    fn load(&self) -> StoreFuture<'_, PoolSnapshot> {
        Box::pin(async move {
            if !tokio::fs::try_exists(&self.path)
                .await
                .map_err(|e| Error::Store(format!("checking pool file: {e}")))?
            {
                info!(path = %self.path.display(), "pool file not found, starting with empty pool");
                let snapshot = PoolSnapshot::default();
                let _guard = self.write_lock.lock().await;
                write_atomic(&self.path, &snapshot).await?;
                return Ok(snapshot);
            }

            let contents = tokio::fs::read_to_string(&self.path)
                .await
                .map_err(|e| Error::Store(format!("reading pool file: {e}")))?;
            let snapshot: PoolSnapshot = serde_json::from_str(&contents)
                .map_err(|e| Error::Store(format!("parsing pool file: {e}")))?;
            info!(
                path = %self.path.display(),
                credentials = snapshot.credentials.len(),
                endpoints = snapshot.endpoints.len(),
                revision = snapshot.revision,
                "loaded pool"
            );
            Ok(snapshot)
        })
    }

    fn save<'a>(&'a self, snapshot: &'a PoolSnapshot) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let _guard = self.write_lock.lock().await;
            write_atomic(&self.path, snapshot).await
        })
    }
}

/// Write the snapshot atomically: temp file in the same directory, 0600,
/// then rename over the target.
async fn write_atomic(path: &Path, snapshot: &PoolSnapshot) -> Result<()> {
    let json = serde_json::to_string_pretty(snapshot)
        .map_err(|e| Error::Store(format!("serializing pool: {e}")))?;

    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| String::from("keypool"));
    let tmp_path = dir.join(temp_file_name(&file_name));

    // A leftover temp file could carry a wider mode; start from scratch
    match tokio::fs::remove_file(&tmp_path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(Error::Store(format!("removing stale temp pool file: {e}"))),
    }

    let mut options = tokio::fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    options.mode(0o600);
    let mut file = options
        .open(&tmp_path)
        .await
        .map_err(|e| Error::Store(format!("creating temp pool file: {e}")))?;
    file.write_all(json.as_bytes())
        .await
        .map_err(|e| Error::Store(format!("writing temp pool file: {e}")))?;
    file.sync_all()
        .await
        .map_err(|e| Error::Store(format!("syncing temp pool file: {e}")))?;
    drop(file);

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| Error::Store(format!("renaming temp pool file: {e}")))?;

    debug!(path = %path.display(), revision = snapshot.revision, "persisted pool");
    Ok(())
}

/// Temp file name for `file_name`, unique per target file and process.
fn temp_file_name(file_name: &str) -> String {
    format!(".{file_name}.tmp.{}", std::process::id())
}

/// In-memory store. Starts empty unless seeded.
#[derive(Default)]
pub struct MemoryStore {
    snapshot: Mutex<Option<PoolSnapshot>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_snapshot(snapshot: PoolSnapshot) -> Self {
        Self {
            snapshot: Mutex::new(Some(snapshot)),
        }
    }

    /// Last saved snapshot.
    pub async fn latest(&self) -> Option<PoolSnapshot> {
        self.snapshot.lock().await.clone()
    }
}

impl PoolStore for MemoryStore {
    fn load(&self) -> StoreFuture<'_, PoolSnapshot> {
        Box::pin(async move { Ok(self.snapshot.lock().await.clone().unwrap_or_default()) })
    }

    fn save<'a>(&'a self, snapshot: &'a PoolSnapshot) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            *self.snapshot.lock().await = Some(snapshot.clone());
            Ok(())
        })
    }
}
