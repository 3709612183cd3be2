//! Origin Repository Client
//!
//! Talks to the upstream repository the mirror follows. Two requests are
//! needed: a HEAD probe for the Last-Modified date and a GET for the body.

use std::time::{Duration, SystemTime};

use anyhow::{Context, Result};
use reqwest::header::LAST_MODIFIED;
use reqwest::{Client, Response};
use tracing::debug;

use super::errors::OriginError;
use crate::cache::ResourcePath;

/// HTTP client bound to one origin base URL
#[derive(Clone)]
pub struct OriginClient {
    /// HTTP client for making requests
    http_client: Client,
    /// Origin base URL, without trailing slash
    base_url: String,
    /// Deadline for metadata probes
    probe_timeout: Duration,
}

impl OriginClient {
    /// Create a client for the given origin
    ///
    /// # Arguments
    /// * `base_url` - Origin root, e.g. `http://luafr.org/luarocks`
    /// * `probe_timeout` - Deadline for a HEAD probe (also used for connecting)
    /// * `fetch_timeout` - Deadline for a complete download
    pub fn new(base_url: &str, probe_timeout: Duration, fetch_timeout: Duration) -> Result<Self> {
        let http_client = Client::builder()
            .connect_timeout(probe_timeout)
            .timeout(fetch_timeout)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            probe_timeout,
        })
    }

    /// Get the origin base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Origin URL of a resource
    pub fn url_for(&self, path: &ResourcePath) -> String {
        format!("{}/{}", self.base_url, path.url_path())
    }

    /// Probe the origin for a resource's last modification time
    ///
    /// Issues a HEAD request so no body is transferred.
    pub async fn last_modified(&self, path: &ResourcePath) -> Result<SystemTime, OriginError> {
        let url = self.url_for(path);
        debug!(url = %url, "Probing origin");

        let response = self
            .http_client
            .head(&url)
            .timeout(self.probe_timeout)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(OriginError::from_status(status.as_u16()));
        }

        let header = response
            .headers()
            .get(LAST_MODIFIED)
            .ok_or(OriginError::MissingLastModified)?;
        let value = header.to_str().map_err(|_| {
            OriginError::InvalidLastModified(String::from_utf8_lossy(header.as_bytes()).into_owned())
        })?;

        httpdate::parse_http_date(value)
            .map_err(|_| OriginError::InvalidLastModified(value.to_string()))
    }

    /// Start downloading a resource
    ///
    /// # Returns
    /// The response with a success status; its body has not been read yet
    pub async fn download(&self, path: &ResourcePath) -> Result<Response, OriginError> {
        let url = self.url_for(path);
        debug!(url = %url, "Downloading from origin");

        let response = self.http_client.get(&url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(OriginError::from_status(status.as_u16()));
        }

        Ok(response)
    }
}
