//! Mirror - per-request serve/redirect decision
//!
//! Owns the cache store, the freshness oracle and the fetch coordinator.
//! The decision is independent of HTTP so it can be exercised directly.

use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, info};

use crate::cache::{
    CacheStore, Dispatch, FetchCoordinator, FreshnessOracle, PathError, ResourcePath,
};
use crate::config::MirrorConfig;
use crate::origin::OriginClient;

/// What to do with a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Serve the local copy
    Serve,
    /// Send the client to this origin URL
    Redirect(String),
}

/// The caching mirror
pub struct Mirror {
    store: Arc<CacheStore>,
    origin: OriginClient,
    oracle: FreshnessOracle,
    fetcher: FetchCoordinator,
    mount_path: String,
}

impl Mirror {
    /// Build the mirror from validated configuration
    pub fn new(config: &MirrorConfig) -> Result<Self> {
        let store = Arc::new(CacheStore::new(config.data_dir.clone())?);
        let origin = OriginClient::new(&config.origin, config.probe_timeout, config.fetch_timeout)?;
        let oracle = FreshnessOracle::new(
            Arc::clone(&store),
            origin.clone(),
            config.archive_suffixes.clone(),
        );
        let fetcher = FetchCoordinator::new(Arc::clone(&store), origin.clone());

        Ok(Self {
            store,
            origin,
            oracle,
            fetcher,
            mount_path: config.mount_path.clone(),
        })
    }

    /// Decide how to answer a request
    ///
    /// # Arguments
    /// * `raw` - Request path below the mount point, still percent-encoded
    ///
    /// Stale or missing resources get a background download and every
    /// request for them is redirected until the download has landed,
    /// including requests that merely joined a running download.
    pub async fn decide(&self, raw: &str) -> Result<Decision, PathError> {
        let path = ResourcePath::parse(raw)?;

        // Root index and directory listings are never cache entries
        if path.is_root() || raw.ends_with('/') {
            return Ok(Decision::Serve);
        }

        if self.oracle.is_archive(&path) && self.store.contains(&path) {
            debug!(path = %path, "Serving cached archive");
            return Ok(Decision::Serve);
        }

        // Running downloads are joined without a freshness probe
        let joined = if self.fetcher.is_in_flight(&path) {
            true
        } else {
            if !self.oracle.needs_refresh(&path).await {
                return Ok(Decision::Serve);
            }
            match self.fetcher.dispatch(&path) {
                // Detached; the download outlives this request
                Dispatch::Started(_download) => false,
                Dispatch::InFlight => true,
            }
        };
        let url = self.origin.url_for(&path);
        info!(
            path = %path,
            redirect = %url,
            joined = joined,
            in_flight = self.fetcher.in_flight_count(),
            "File not cached or modified, caching it and redirecting to origin"
        );

        Ok(Decision::Redirect(url))
    }

    /// Get the cache store
    pub fn store(&self) -> &CacheStore {
        &self.store
    }

    /// Get the fetch coordinator
    pub fn fetcher(&self) -> &FetchCoordinator {
        &self.fetcher
    }

    /// Get the origin client
    pub fn origin(&self) -> &OriginClient {
        &self.origin
    }

    /// Mount path, with trailing slash
    pub fn mount_path(&self) -> &str {
        &self.mount_path
    }
}
