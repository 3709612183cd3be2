//! HTTP Server - serves mirror clients
//!
//! Binds the listening socket and runs the router until shutdown.

mod routes;
mod status;

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing::info;

use crate::mirror::Mirror;

pub use routes::router;

/// HTTP front end of the mirror
pub struct MirrorServer {
    /// Mirror answering the requests
    mirror: Arc<Mirror>,
    /// Socket listener
    listener: Option<TcpListener>,
}

impl MirrorServer {
    /// Create a new server
    pub fn new(mirror: Arc<Mirror>) -> Self {
        Self {
            mirror,
            listener: None,
        }
    }

    /// Bind the listening socket
    ///
    /// # Returns
    /// The bound address (useful when binding port 0)
    pub async fn start(&mut self, address: SocketAddr) -> Result<SocketAddr> {
        let listener = TcpListener::bind(address)
            .await
            .with_context(|| format!("Failed to bind {}", address))?;
        let local_addr = listener.local_addr().context("Failed to read bound address")?;

        info!(address = %local_addr, mount_path = %self.mirror.mount_path(), "Listening on address");

        self.listener = Some(listener);
        Ok(local_addr)
    }

    /// Serve requests until `shutdown` resolves
    pub async fn run<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = self.listener.context("Server not started")?;

        axum::serve(listener, router(self.mirror))
            .with_graceful_shutdown(shutdown)
            .await
            .context("HTTP server error")?;

        info!("HTTP server stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MirrorConfig;
    use std::time::Duration;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_serves_until_shutdown() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("index.html"), b"mirror root").unwrap();
        let config = MirrorConfig {
            listen_address: "127.0.0.1:0".parse().unwrap(),
            origin: "http://127.0.0.1:9".to_string(),
            probe_timeout: Duration::from_secs(5),
            fetch_timeout: Duration::from_secs(5),
            data_dir: dir.path().to_path_buf(),
            mount_path: "/".to_string(),
            archive_suffixes: vec![".zip".to_string()],
        };
        let mirror = Arc::new(Mirror::new(&config).unwrap());

        let mut server = MirrorServer::new(mirror);
        let address = server.start(config.listen_address).await.unwrap();

        let (stop, stopped) = tokio::sync::oneshot::channel::<()>();
        let handle = tokio::spawn(server.run(async {
            let _ = stopped.await;
        }));

        let root = reqwest::get(format!("http://{}/", address))
            .await
            .unwrap();
        assert_eq!(root.status(), 200);
        assert_eq!(root.text().await.unwrap(), "mirror root");

        // Redirects are surfaced, not followed
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .unwrap();
        let missing = client
            .get(format!("http://{}/missing-1.0.zip", address))
            .send()
            .await
            .unwrap();
        assert_eq!(missing.status(), 302);
        assert_eq!(
            missing.headers()["location"],
            "http://127.0.0.1:9/missing-1.0.zip"
        );

        drop(client);
        stop.send(()).unwrap();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_run_requires_start() {
        let dir = TempDir::new().unwrap();
        let config = MirrorConfig {
            listen_address: "127.0.0.1:0".parse().unwrap(),
            origin: "http://127.0.0.1:9".to_string(),
            probe_timeout: Duration::from_secs(5),
            fetch_timeout: Duration::from_secs(5),
            data_dir: dir.path().to_path_buf(),
            mount_path: "/".to_string(),
            archive_suffixes: Vec::new(),
        };
        let server = MirrorServer::new(Arc::new(Mirror::new(&config).unwrap()));

        assert!(server.run(async {}).await.is_err());
    }
}
