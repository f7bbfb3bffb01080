//! Web server for ScribeVault.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;

use crate::config::{UploadsConfig, WebConfig};
use crate::file::Library;
use crate::{Result, VaultError};

use super::handlers::AppState;
use super::middleware::JwtState;
use super::router::create_app;

/// Web server for the API.
pub struct WebServer {
    /// Server address.
    addr: SocketAddr,
    /// Application state.
    app_state: Arc<AppState>,
    /// JWT state.
    jwt_state: Arc<JwtState>,
    /// Web configuration.
    web_config: WebConfig,
    /// Upload session housekeeping.
    uploads: UploadsConfig,
}

impl WebServer {
    /// Create a new web server.
    pub fn new(config: &WebConfig, library: Library, uploads: &UploadsConfig) -> Result<Self> {
        let addr = format!("{}:{}", config.host, config.port)
            .parse()
            .map_err(|e| VaultError::Config(format!("invalid web server address: {e}")))?;

        Ok(Self {
            addr,
            app_state: Arc::new(AppState::new(library)),
            jwt_state: Arc::new(JwtState::new(&config.jwt_secret)),
            web_config: config.clone(),
            uploads: uploads.clone(),
        })
    }

    /// Get the server address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Start the stale upload sweep background task.
    fn start_upload_sweep_task(library: Library, interval: Duration, ttl: Duration) {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(interval);

            // Skip the first immediate tick
            interval.tick().await;

            loop {
                interval.tick().await;

                match library.sweep_uploads(ttl).await {
                    Ok(report) => {
                        tracing::debug!(
                            expired_sessions = report.expired_sessions,
                            orphaned_dirs = report.orphaned_dirs,
                            "Upload sweep finished"
                        );
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Failed to sweep stale uploads");
                    }
                }
            }
        });
    }

    /// Bind the listener, start housekeeping and build the router.
    async fn prepare(self) -> std::io::Result<(TcpListener, axum::Router)> {
        let library = self.app_state.library.clone();
        let router = create_app(self.app_state, self.jwt_state, &self.web_config.cors_origins);

        let listener = TcpListener::bind(self.addr).await?;

        // Start upload sweep after successful bind
        let interval = Duration::from_secs(self.uploads.sweep_interval_secs.max(1));
        let ttl = Duration::from_secs(self.uploads.session_ttl_secs);
        Self::start_upload_sweep_task(library, interval, ttl);
        tracing::info!(
            interval_secs = interval.as_secs(),
            ttl_secs = ttl.as_secs(),
            "Upload sweep task started"
        );

        Ok((listener, router))
    }

    /// Run the web server.
    pub async fn run(self) -> std::io::Result<()> {
        let (listener, router) = self.prepare().await?;
        tracing::info!("Web server listening on http://{}", listener.local_addr()?);

        axum::serve(listener, router).await
    }

    /// Run the server in the background and return the actual bound address.
    ///
    /// This is useful for testing when binding to port 0.
    pub async fn run_with_addr(self) -> std::io::Result<SocketAddr> {
        let (listener, router) = self.prepare().await?;
        let local_addr = listener.local_addr()?;
        tracing::info!("Web server listening on http://{}", local_addr);

        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router).await {
                tracing::error!("Web server error: {}", e);
            }
        });

        Ok(local_addr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::library::test_support::library;

    fn create_test_config() -> WebConfig {
        WebConfig {
            host: "127.0.0.1".to_string(),
            port: 0, // Use random port
            cors_origins: vec![],
            jwt_secret: "test-secret-key".to_string(),
        }
    }

    #[tokio::test]
    async fn test_web_server_new() {
        let (_dir, library) = library().await;
        let server =
            WebServer::new(&create_test_config(), library, &UploadsConfig::default()).unwrap();
        assert_eq!(server.addr().ip().to_string(), "127.0.0.1");
    }

    #[tokio::test]
    async fn test_web_server_rejects_bad_address() {
        let (_dir, library) = library().await;
        let config = WebConfig {
            host: "not an address".to_string(),
            ..create_test_config()
        };
        let result = WebServer::new(&config, library, &UploadsConfig::default());
        assert!(matches!(result, Err(VaultError::Config(_))));
    }

    #[tokio::test]
    async fn test_web_server_run() {
        let (_dir, library) = library().await;
        let server =
            WebServer::new(&create_test_config(), library, &UploadsConfig::default()).unwrap();
        let addr = server.run_with_addr().await.unwrap();

        let client = reqwest::Client::new();
        let resp = client
            .get(format!("http://{}/health", addr))
            .send()
            .await
            .unwrap();

        assert!(resp.status().is_success());
        assert_eq!(resp.text().await.unwrap(), "OK");

        let resp = client
            .get(format!("http://{}/api/files", addr))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::UNAUTHORIZED);
    }
}
