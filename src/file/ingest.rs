//! Fetching remote media into storage.
//!
//! Links to well-known streaming platforms are kept by reference. Anything
//! else is downloaded with connect/total timeouts, a redirect limit and a
//! size cap. Unless private hosts are allowed, every name the client looks
//! up must resolve to public addresses only.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use reqwest::dns::{Addrs, Name, Resolve, Resolving};
use reqwest::header::CONTENT_TYPE;
use reqwest::{redirect, Client};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use url::{Host, Url};

use super::FileStorage;
use crate::config::IngestConfig;
use crate::{Result, VaultError};

/// User agent sent with every fetch.
const USER_AGENT: &str = concat!("ScribeVault/", env!("CARGO_PKG_VERSION"));

/// Bytes fetched from a URL and saved to storage.
#[derive(Debug, Clone)]
pub struct Downloaded {
    /// Name in storage.
    pub stored_name: String,
    /// Number of bytes written.
    pub size: u64,
    /// MIME type from the `Content-Type` header, if any.
    pub content_type: Option<String>,
}

/// Parse and check a user-supplied URL: http(s) with a host.
pub fn parse_source_url(raw: &str) -> Result<Url> {
    let url = Url::parse(raw.trim()).map_err(|e| VaultError::InvalidUrl(format!("{raw}: {e}")))?;
    match url.scheme() {
        "http" | "https" => {}
        scheme => {
            return Err(VaultError::InvalidUrl(format!(
                "unsupported scheme: {scheme}"
            )))
        }
    }
    match url.host_str() {
        Some(host) if !host.is_empty() => Ok(url),
        _ => Err(VaultError::InvalidUrl("URL has no host".to_string())),
    }
}

/// Display name for a URL record: the custom name, else the last path
/// segment, else the host.
pub fn display_name(url: &Url, custom_name: Option<&str>) -> String {
    if let Some(custom) = custom_name.map(str::trim).filter(|s| !s.is_empty()) {
        return custom.to_string();
    }

    let segment = url
        .path_segments()
        .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
        .map(|s| {
            urlencoding::decode(s)
                .map(|decoded| decoded.into_owned())
                .unwrap_or_else(|_| s.to_string())
        })
        .filter(|s| !s.trim().is_empty());

    segment.unwrap_or_else(|| url.host_str().unwrap_or("link").to_string())
}

fn is_forbidden_hostname(host: &str) -> bool {
    let host = host.trim_end_matches('.').to_lowercase();
    host == "localhost"
        || [".local", ".localhost", ".internal", ".intranet", ".lan", ".home"]
            .iter()
            .any(|suffix| host.ends_with(suffix))
}

fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_broadcast()
                || v4.is_unspecified()
                || v4.octets()[0] == 0
        }
        IpAddr::V6(v6) => {
            let first = v6.segments()[0];
            v6.is_loopback()
                || v6.is_unspecified()
                || (first & 0xfe00) == 0xfc00 // unique local
                || (first & 0xffc0) == 0xfe80 // link local
                || v6.to_ipv4_mapped().is_some_and(|v4| is_private_ip(&IpAddr::V4(v4)))
        }
    }
}

/// Reject URLs that point into loopback, private or internal networks.
pub fn check_public_destination(url: &Url) -> Result<()> {
    let forbidden = match url.host() {
        Some(Host::Domain(domain)) => is_forbidden_hostname(domain),
        Some(Host::Ipv4(v4)) => is_private_ip(&IpAddr::V4(v4)),
        Some(Host::Ipv6(v6)) => is_private_ip(&IpAddr::V6(v6)),
        None => true,
    };
    if forbidden {
        return Err(VaultError::InvalidUrl(format!(
            "host not allowed: {}",
            url.host_str().unwrap_or_default()
        )));
    }
    Ok(())
}

/// Resolve `host` and refuse it when any resolved address is private.
pub async fn resolve_public(host: &str, port: u16) -> Result<Vec<SocketAddr>> {
    let addrs: Vec<SocketAddr> = tokio::net::lookup_host((host, port))
        .await
        .map_err(|e| VaultError::FetchFailed(format!("cannot resolve {host}: {e}")))?
        .collect();

    if addrs.is_empty() {
        return Err(VaultError::FetchFailed(format!("{host} has no addresses")));
    }
    if let Some(addr) = addrs.iter().find(|addr| is_private_ip(&addr.ip())) {
        return Err(VaultError::InvalidUrl(format!(
            "host not allowed: {host} resolves to {}",
            addr.ip()
        )));
    }
    Ok(addrs)
}

/// DNS resolver that only hands out public addresses.
///
/// The client connects to exactly the addresses checked here, so a name
/// cannot be re-pointed between the check and the connect. Redirect targets
/// go through the same lookup.
#[derive(Debug)]
struct PublicResolver;

impl Resolve for PublicResolver {
    fn resolve(&self, name: Name) -> Resolving {
        Box::pin(async move {
            let addrs = resolve_public(name.as_str(), 0).await?;
            Ok::<Addrs, Box<dyn std::error::Error + Send + Sync>>(Box::new(addrs.into_iter()))
        })
    }
}

/// HTTP fetcher for URL ingestion.
#[derive(Debug, Clone)]
pub struct UrlIngestor {
    client: Client,
    config: IngestConfig,
}

impl UrlIngestor {
    /// Build a fetcher with the configured timeouts and redirect policy.
    pub fn new(config: IngestConfig) -> Result<Self> {
        let max_redirects = config.max_redirects;
        let allow_private = config.allow_private_hosts;
        let policy = redirect::Policy::custom(move |attempt| {
            if attempt.previous().len() > max_redirects {
                attempt.error("too many redirects")
            } else if !allow_private && check_public_destination(attempt.url()).is_err() {
                attempt.error("redirect to a private address")
            } else {
                attempt.follow()
            }
        });

        let mut builder = Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.total_timeout_secs))
            .redirect(policy)
            .user_agent(USER_AGENT);
        if !allow_private {
            builder = builder.dns_resolver(Arc::new(PublicResolver));
        }

        let client = builder
            .build()
            .map_err(|e| VaultError::Config(format!("failed to create HTTP client: {e}")))?;

        Ok(Self { client, config })
    }

    /// Largest accepted download in bytes.
    pub fn max_download_bytes(&self) -> u64 {
        self.config.max_download_size_mb * 1024 * 1024
    }

    /// Whether the URL's host is on the embeddable allowlist.
    ///
    /// Subdomains match (`www.youtube.com` matches `youtube.com`).
    pub fn is_embeddable(&self, url: &Url) -> bool {
        let Some(host) = url.host_str() else {
            return false;
        };
        let host = host.to_lowercase();
        self.config.embeddable_hosts.iter().any(|allowed| {
            let allowed = allowed.to_lowercase();
            host == allowed || host.ends_with(&format!(".{allowed}"))
        })
    }

    /// Check a URL before fetching it, resolving its host name.
    pub async fn check_destination(&self, url: &Url) -> Result<()> {
        if self.config.allow_private_hosts {
            return Ok(());
        }
        check_public_destination(url)?;
        if let Some(Host::Domain(domain)) = url.host() {
            let port = url.port_or_known_default().unwrap_or(80);
            resolve_public(domain, port).await?;
        }
        Ok(())
    }

    /// Download `url` into `storage`.
    ///
    /// Fails with `FetchFailed` on a transport error, a timeout, a non-2xx
    /// status or a body over the size cap. Partial bytes are removed.
    pub async fn download(
        &self,
        url: &Url,
        storage: &FileStorage,
        stored_name: &str,
    ) -> Result<Downloaded> {
        self.check_destination(url).await?;
        let max_bytes = self.max_download_bytes();

        let mut response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| VaultError::FetchFailed(format!("request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(VaultError::FetchFailed(format!(
                "HTTP error: {}",
                response.status()
            )));
        }
        if let Some(length) = response.content_length() {
            if length > max_bytes {
                return Err(VaultError::FetchFailed(format!(
                    "remote file too large: {length} bytes (max {max_bytes} bytes)"
                )));
            }
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(';').next())
            .map(|v| v.trim().to_lowercase())
            .filter(|v| !v.is_empty());

        let mut file = storage.create(stored_name).await?;
        let mut size: u64 = 0;

        let streamed = async {
            while let Some(chunk) = response
                .chunk()
                .await
                .map_err(|e| VaultError::FetchFailed(format!("failed to read response: {e}")))?
            {
                size += chunk.len() as u64;
                if size > max_bytes {
                    return Err(VaultError::FetchFailed(format!(
                        "remote file exceeds {max_bytes} bytes"
                    )));
                }
                file.write_all(&chunk).await?;
            }
            file.flush().await?;
            Ok::<(), VaultError>(())
        }
        .await;
        drop(file);

        if let Err(e) = streamed {
            if let Err(cleanup) = storage.delete(stored_name).await {
                warn!(stored_name, error = %cleanup, "Failed to remove partial download");
            }
            return Err(e);
        }

        debug!(url = %url, size, "Remote file downloaded");
        Ok(Downloaded {
            stored_name: stored_name.to_string(),
            size,
            content_type,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ingestor() -> UrlIngestor {
        UrlIngestor::new(IngestConfig::default()).unwrap()
    }

    #[test]
    fn test_parse_source_url() {
        assert!(parse_source_url("https://example.com/a.mp3").is_ok());
        assert!(parse_source_url("  http://example.com ").is_ok());
        assert!(matches!(
            parse_source_url("ftp://example.com/a.mp3"),
            Err(VaultError::InvalidUrl(_))
        ));
        assert!(matches!(
            parse_source_url("not a url"),
            Err(VaultError::InvalidUrl(_))
        ));
        assert!(matches!(
            parse_source_url("file:///etc/passwd"),
            Err(VaultError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_is_embeddable() {
        let ingestor = ingestor();
        let url = |s: &str| Url::parse(s).unwrap();

        assert!(ingestor.is_embeddable(&url("https://www.youtube.com/watch?v=x")));
        assert!(ingestor.is_embeddable(&url("https://youtu.be/x")));
        assert!(ingestor.is_embeddable(&url("https://player.vimeo.com/video/1")));
        assert!(!ingestor.is_embeddable(&url("https://notyoutube.com/x")));
        assert!(!ingestor.is_embeddable(&url("https://cdn.example.com/a.mp3")));
    }

    #[test]
    fn test_display_name() {
        let url = Url::parse("https://cdn.example.com/audio/Visit%2012.mp3").unwrap();
        assert_eq!(display_name(&url, None), "Visit 12.mp3");
        assert_eq!(display_name(&url, Some("  Custom ")), "Custom");
        assert_eq!(display_name(&url, Some("   ")), "Visit 12.mp3");

        let bare = Url::parse("https://cdn.example.com/").unwrap();
        assert_eq!(display_name(&bare, None), "cdn.example.com");

        let trailing = Url::parse("https://cdn.example.com/dir/").unwrap();
        assert_eq!(display_name(&trailing, None), "dir");
    }

    #[test]
    fn test_private_destinations_rejected() {
        let check = |s: &str| check_public_destination(&Url::parse(s).unwrap());

        assert!(check("http://localhost/a").is_err());
        assert!(check("http://localhost./a").is_err());
        assert!(check("http://printer.local./a").is_err());
        assert!(check("http://127.0.0.1:8080/a").is_err());
        assert!(check("http://10.1.2.3/a").is_err());
        assert!(check("http://192.168.0.10/a").is_err());
        assert!(check("http://169.254.169.254/latest").is_err());
        assert!(check("http://printer.local/a").is_err());
        assert!(check("http://[::1]/a").is_err());
        assert!(check("http://[fd00::1]/a").is_err());
        assert!(check("https://example.com/a").is_ok());
        assert!(check("http://8.8.8.8/a").is_ok());
    }

    fn permissive() -> UrlIngestor {
        UrlIngestor::new(IngestConfig {
            allow_private_hosts: true,
            ..IngestConfig::default()
        })
        .unwrap()
    }

    /// Serve a fixed body on a loopback port and return the port.
    async fn spawn_loopback_server() -> u16 {
        let app = axum::Router::new().route(
            "/secret.txt",
            axum::routing::get(|| async { "internal-secret" }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        port
    }

    #[tokio::test]
    async fn test_allow_private_hosts() {
        let url = Url::parse("http://127.0.0.1/a").unwrap();
        assert!(permissive().check_destination(&url).await.is_ok());
        assert!(ingestor().check_destination(&url).await.is_err());
    }

    #[tokio::test]
    async fn test_resolve_public_rejects_names_of_loopback() {
        // localhost comes from the hosts file, so no network is needed
        let result = resolve_public("localhost", 80).await;
        assert!(matches!(result, Err(VaultError::InvalidUrl(_))));
    }

    #[tokio::test]
    async fn test_client_refuses_names_resolving_to_loopback() {
        let port = spawn_loopback_server().await;
        let url = format!("http://localhost:{port}/secret.txt");

        // Bypasses the hostname list and goes straight to the connector
        let refused = ingestor().client.get(&url).send().await;
        assert!(refused.is_err());

        let allowed = permissive().client.get(&url).send().await.unwrap();
        assert_eq!(allowed.text().await.unwrap(), "internal-secret");
    }

    #[tokio::test]
    async fn test_download_refuses_names_resolving_to_loopback() {
        let port = spawn_loopback_server().await;
        let dir = tempfile::TempDir::new().unwrap();
        let storage = FileStorage::new(dir.path()).unwrap();
        let url = Url::parse(&format!("http://localhost.:{port}/secret.txt")).unwrap();

        let result = ingestor().download(&url, &storage, "leak.txt").await;
        assert!(matches!(result, Err(VaultError::InvalidUrl(_))));
        assert!(!storage.exists("leak.txt").await);
    }
}
