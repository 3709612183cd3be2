//! Freshness Oracle
//!
//! Decides whether a cached resource is missing or older than the origin's
//! copy. Probe failures fail open: the local copy is kept and served.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, info, warn};

use super::path::ResourcePath;
use super::store::CacheStore;
use crate::origin::OriginClient;

/// Staleness check against the origin's Last-Modified date
pub struct FreshnessOracle {
    store: Arc<CacheStore>,
    origin: OriginClient,
    /// File name suffixes of immutable archives
    archive_suffixes: Vec<String>,
}

impl FreshnessOracle {
    pub fn new(store: Arc<CacheStore>, origin: OriginClient, archive_suffixes: Vec<String>) -> Self {
        Self {
            store,
            origin,
            archive_suffixes,
        }
    }

    /// Whether the resource is an archive, which never changes once published
    pub fn is_archive(&self, path: &ResourcePath) -> bool {
        path.file_name().is_some_and(|name| {
            self.archive_suffixes
                .iter()
                .any(|suffix| name.ends_with(suffix.as_str()))
        })
    }

    /// Whether the resource has to be (re)fetched from the origin
    ///
    /// Missing entries always need a fetch. Cached archives never do. Anything
    /// else is compared against a HEAD probe at one-second resolution; if the
    /// probe cannot answer, the cached copy is considered fresh.
    pub async fn needs_refresh(&self, path: &ResourcePath) -> bool {
        let metadata = match self.store.metadata(path) {
            Ok(Some(metadata)) => metadata,
            Ok(None) => {
                info!(path = %path, "File not cached");
                return true;
            }
            Err(e) => {
                warn!(path = %path, error = %e, "Failed to stat cached file, keeping it");
                return false;
            }
        };

        if metadata.is_dir() {
            return false;
        }

        if self.is_archive(path) {
            debug!(path = %path, "Archive already cached");
            return false;
        }

        let local_time = match metadata.modified() {
            Ok(time) => time,
            Err(e) => {
                warn!(path = %path, error = %e, "Cached file has no modification time");
                return false;
            }
        };

        let origin_time = match self.origin.last_modified(path).await {
            Ok(time) => time,
            Err(e) => {
                warn!(path = %path, error = %e, "Origin probe failed, serving cached copy");
                return false;
            }
        };

        if unix_seconds(origin_time) > unix_seconds(local_time) {
            info!(path = %path, "File modified on origin");
            return true;
        }

        debug!(path = %path, "Cached file is fresh");
        false
    }
}

/// Whole seconds since the epoch, rounding towards negative infinity
fn unix_seconds(time: SystemTime) -> i64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_secs() as i64,
        Err(e) => {
            let d = e.duration();
            -(d.as_secs() as i64) - i64::from(d.subsec_nanos() > 0)
        }
    }
}
