//! Fetch Coordinator
//!
//! Runs background downloads from the origin into the cache store, with at
//! most one download per resource path at any time. Requests never wait on
//! a download; they are redirected to the origin while it runs.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::Result;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::path::ResourcePath;
use super::store::CacheStore;
use crate::origin::{OriginClient, OriginError};

type InFlightSet = Arc<Mutex<HashSet<String>>>;

/// Outcome of a dispatch request
#[derive(Debug)]
pub enum Dispatch {
    /// A new download was spawned; the handle may be dropped to detach it
    Started(JoinHandle<()>),
    /// A download for the same path is already running
    InFlight,
}

/// Owner of the in-flight set and the background downloads
pub struct FetchCoordinator {
    store: Arc<CacheStore>,
    origin: OriginClient,
    /// Resource keys with a download currently running
    in_flight: InFlightSet,
}

impl FetchCoordinator {
    pub fn new(store: Arc<CacheStore>, origin: OriginClient) -> Self {
        Self {
            store,
            origin,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Start downloading `path` unless a download for it is already running
    ///
    /// Returns immediately. The download runs on its own task and its
    /// in-flight marker is removed when that task ends, whatever the outcome.
    /// Must be called from within a Tokio runtime.
    pub fn dispatch(&self, path: &ResourcePath) -> Dispatch {
        let key = path.key();

        if !lock(&self.in_flight).insert(key.clone()) {
            debug!(path = %path, "Download already in flight");
            return Dispatch::InFlight;
        }

        let guard = InFlightGuard {
            set: Arc::clone(&self.in_flight),
            key,
        };
        let store = Arc::clone(&self.store);
        let origin = self.origin.clone();
        let path = path.clone();

        let task = tokio::spawn(async move {
            let _guard = guard;
            match fetch(&store, &origin, &path).await {
                Ok(bytes) => info!(path = %path, bytes = bytes, "Download success"),
                Err(e) => warn!(path = %path, error = %format!("{:#}", e), "Download abandoned"),
            }
        });

        Dispatch::Started(task)
    }

    /// Whether a download for `path` is running
    pub fn is_in_flight(&self, path: &ResourcePath) -> bool {
        lock(&self.in_flight).contains(&path.key())
    }

    /// Sorted snapshot of the resource keys being downloaded
    pub fn in_flight(&self) -> Vec<String> {
        let mut keys: Vec<String> = lock(&self.in_flight).iter().cloned().collect();
        keys.sort();
        keys
    }

    /// Number of downloads running
    pub fn in_flight_count(&self) -> usize {
        lock(&self.in_flight).len()
    }
}

/// Stream a resource from the origin into the cache
///
/// # Returns
/// Size of the committed cache entry in bytes
async fn fetch(store: &CacheStore, origin: &OriginClient, path: &ResourcePath) -> Result<u64> {
    info!(path = %path, url = %origin.url_for(path), "Download started");

    let mut response = origin.download(path).await?;
    let mut pending = store.begin(path)?;
    debug!(path = %path, dest = %pending.dest().display(), "Writing cache entry");

    while let Some(chunk) = response.chunk().await.map_err(OriginError::from)? {
        pending.write(&chunk).await?;
    }

    pending.commit().await
}

/// Clears an in-flight marker when the download task ends
struct InFlightGuard {
    set: InFlightSet,
    key: String,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        lock(&self.set).remove(&self.key);
    }
}

/// Lock the in-flight set, recovering from poisoning
fn lock(set: &Mutex<HashSet<String>>) -> MutexGuard<'_, HashSet<String>> {
    set.lock().unwrap_or_else(PoisonError::into_inner)
}
