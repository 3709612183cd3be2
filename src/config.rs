//! Daemon configuration
//!
//! Command-line flags with environment fallbacks, validated into a
//! [`MirrorConfig`] before anything is started.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;

/// LuaRocks Mirror - caching mirror for a LuaRocks repository
///
/// Serves files from a local cache and redirects clients to the origin
/// while missing or outdated files are downloaded in the background.
#[derive(Parser, Debug)]
#[command(name = "luarocks-mirror")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Address to listen on for mirror clients
    #[arg(long, env = "MIRROR_LISTEN_ADDRESS", default_value = "0.0.0.0:8080")]
    pub listen_address: SocketAddr,

    /// Base URL of the origin repository
    #[arg(long, env = "MIRROR_ORIGIN", default_value = "http://luafr.org/luarocks")]
    pub origin: String,

    /// Timeout for origin probes, in seconds
    #[arg(long, env = "MIRROR_TIMEOUT", value_name = "SECONDS", default_value_t = 5)]
    pub timeout: u64,

    /// Timeout for a complete origin download, in seconds
    #[arg(long, env = "MIRROR_FETCH_TIMEOUT", value_name = "SECONDS", default_value_t = 300)]
    pub fetch_timeout: u64,

    /// Cache directory [default: platform cache dir]
    #[arg(long, env = "MIRROR_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// URL path the mirror is served under
    #[arg(long, env = "MIRROR_MOUNT_PATH", default_value = "/")]
    pub mount_path: String,

    /// File suffix of immutable archives (repeatable)
    #[arg(long = "archive-suffix", value_name = "SUFFIX", default_values = [".zip", ".rock"])]
    pub archive_suffixes: Vec<String>,
}

/// Validated mirror settings
#[derive(Debug, Clone)]
pub struct MirrorConfig {
    /// Address the HTTP server binds to
    pub listen_address: SocketAddr,
    /// Origin base URL
    pub origin: String,
    /// Deadline for HEAD probes against the origin
    pub probe_timeout: Duration,
    /// Deadline for a complete download
    pub fetch_timeout: Duration,
    /// Cache root
    pub data_dir: PathBuf,
    /// Mount path, always starting and ending with `/`
    pub mount_path: String,
    /// Suffixes of files that never change once published
    pub archive_suffixes: Vec<String>,
}

impl MirrorConfig {
    /// Validate parsed arguments
    pub fn from_args(args: Args) -> Result<Self> {
        let url = reqwest::Url::parse(&args.origin)
            .with_context(|| format!("Invalid origin URL: {}", args.origin))?;
        if !matches!(url.scheme(), "http" | "https") {
            bail!("Origin URL must be http or https: {}", args.origin);
        }

        if args.timeout == 0 || args.fetch_timeout == 0 {
            bail!("Timeouts must be at least one second");
        }

        let data_dir = args.data_dir.unwrap_or_else(default_data_dir);

        let archive_suffixes: Vec<String> = args
            .archive_suffixes
            .into_iter()
            .filter(|s| !s.is_empty())
            .collect();

        Ok(Self {
            listen_address: args.listen_address,
            origin: args.origin,
            probe_timeout: Duration::from_secs(args.timeout),
            fetch_timeout: Duration::from_secs(args.fetch_timeout),
            data_dir,
            mount_path: normalize_mount_path(&args.mount_path)?,
            archive_suffixes,
        })
    }
}

/// Platform cache directory for the mirror
fn default_data_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("luarocks-mirror")
}

/// Check a mount path and give it a trailing slash
fn normalize_mount_path(path: &str) -> Result<String> {
    if !path.starts_with('/') {
        return Err(anyhow!("Mount path must start with '/': {}", path));
    }
    if path.contains(['{', '}', '*']) {
        return Err(anyhow!("Mount path must not contain URL parameters: {}", path));
    }

    if path.ends_with('/') {
        Ok(path.to_string())
    } else {
        Ok(format!("{}/", path))
    }
}
