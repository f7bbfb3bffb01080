//! CORS middleware configuration.

use axum::http::header::{ACCEPT, AUTHORIZATION, CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::http::{HeaderName, HeaderValue, Method};
use tower_http::cors::{Any, CorsLayer};

/// Header reporting how many entries were left out of a zip download.
pub const ARCHIVE_SKIPPED_HEADER: &str = "x-archive-skipped";

/// Create a CORS layer from configuration.
///
/// With no valid origins configured any origin is allowed, without
/// credentials. Download headers are exposed in both modes so the
/// dashboard can read the file name and the skipped count.
pub fn create_cors_layer(origins: &[String]) -> CorsLayer {
    let methods = [
        Method::GET,
        Method::POST,
        Method::PUT,
        Method::DELETE,
        Method::OPTIONS,
    ];
    let exposed = [
        CONTENT_DISPOSITION,
        HeaderName::from_static(ARCHIVE_SKIPPED_HEADER),
    ];

    let parsed_origins: Vec<HeaderValue> =
        origins.iter().filter_map(|o| o.parse().ok()).collect();

    if parsed_origins.is_empty() {
        if !origins.is_empty() {
            tracing::warn!("No valid CORS origins configured; allowing any origin");
        }
        CorsLayer::new()
            .allow_methods(methods)
            .allow_headers(Any)
            .allow_origin(Any)
            .expose_headers(exposed)
    } else {
        CorsLayer::new()
            .allow_methods(methods)
            .allow_headers([AUTHORIZATION, CONTENT_TYPE, ACCEPT])
            .allow_credentials(true)
            .allow_origin(parsed_origins)
            .expose_headers(exposed)
    }
}
