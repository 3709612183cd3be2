//! Status report served to operators
//!
//! JSON snapshot of the mirror's configuration and running downloads.

use serde::{Deserialize, Serialize};

use crate::mirror::Mirror;

/// URL path of the status endpoint
pub const STATUS_PATH: &str = "/_mirror/status";

/// Mirror status
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    /// Daemon version
    pub version: String,
    /// Origin base URL
    pub origin: String,
    /// Mount path clients use
    pub mount_path: String,
    /// Cache root on disk
    pub cache_dir: String,
    /// Resource paths currently being downloaded
    pub in_flight: Vec<String>,
}

impl StatusReport {
    /// Snapshot the mirror's current state
    pub fn collect(mirror: &Mirror) -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            origin: mirror.origin().base_url().to_string(),
            mount_path: mirror.mount_path().to_string(),
            cache_dir: mirror.store().root().display().to_string(),
            in_flight: mirror.fetcher().in_flight(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_serialization() {
        let report = StatusReport {
            version: "0.1.0".to_string(),
            origin: "http://luafr.org/luarocks".to_string(),
            mount_path: "/".to_string(),
            cache_dir: "/var/cache/luarocks-mirror".to_string(),
            in_flight: vec!["foo/bar-1.0.zip".to_string()],
        };

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["mountPath"], "/");
        assert_eq!(json["cacheDir"], "/var/cache/luarocks-mirror");
        assert_eq!(json["inFlight"][0], "foo/bar-1.0.zip");

        let parsed: StatusReport = serde_json::from_value(json).unwrap();
        assert_eq!(parsed.origin, report.origin);
    }
}
