//! Router configuration for the HTTP API.

use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use super::handlers::{
    bulk_delete, bulk_download, bulk_move, bulk_status, complete_upload, create_folder,
    delete_file, delete_folder, download_file, download_folder, file_events, get_file, list_files,
    list_folders, move_folder, rename_folder, update_status, upload_chunk, upload_url, AppState,
};
use super::middleware::{create_cors_layer, jwt_auth, JwtState};
use super::openapi::ApiDoc;

/// Room for multipart boundaries and the small text fields of a chunk request.
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

/// Create the main API router.
pub fn create_router(
    app_state: Arc<AppState>,
    jwt_state: Arc<JwtState>,
    cors_origins: &[String],
) -> Router {
    let chunk_limit = usize::try_from(app_state.library.limits().max_chunk_bytes)
        .unwrap_or(usize::MAX)
        .saturating_add(MULTIPART_OVERHEAD_BYTES);

    let upload_routes = Router::new()
        .route(
            "/chunk",
            post(upload_chunk).layer(DefaultBodyLimit::max(chunk_limit)),
        )
        .route("/complete", post(complete_upload))
        .route("/url", post(upload_url));

    let file_routes = Router::new()
        .route("/", get(list_files))
        .route("/events", get(file_events))
        .route("/metadata/:id", get(get_file).delete(delete_file))
        .route("/metadata/:id/status", put(update_status))
        .route("/:id/download", get(download_file))
        .route("/bulk-move", post(bulk_move))
        .route("/bulk-delete", post(bulk_delete))
        .route("/bulk-status", post(bulk_status))
        .route("/bulk-download", post(bulk_download))
        .route("/download-folder/:folder_id", post(download_folder));

    let folder_routes = Router::new()
        .route("/", get(list_folders).post(create_folder))
        .route("/:id", put(rename_folder).delete(delete_folder))
        .route("/:id/move", post(move_folder));

    let api_routes = Router::new()
        .nest("/upload", upload_routes)
        .nest("/files", file_routes)
        .nest("/folders", folder_routes);

    let jwt_state_for_middleware = jwt_state.clone();

    Router::new()
        .nest("/api", api_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(create_cors_layer(cors_origins))
                .layer(middleware::from_fn(move |req, next| {
                    let state = jwt_state_for_middleware.clone();
                    jwt_auth(state, req, next)
                })),
        )
        .with_state(app_state)
}

/// Create a health check router.
pub fn create_health_router() -> Router {
    Router::new().route("/health", get(health_check))
}

/// Create the Swagger UI router serving the OpenAPI document.
pub fn create_swagger_router() -> Router {
    Router::new().merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
}

/// Health check handler.
async fn health_check() -> &'static str {
    "OK"
}

/// The full application: API, health check and Swagger UI.
pub fn create_app(
    app_state: Arc<AppState>,
    jwt_state: Arc<JwtState>,
    cors_origins: &[String],
) -> Router {
    create_router(app_state, jwt_state, cors_origins)
        .merge(create_health_router())
        .merge(create_swagger_router())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_health_check() {
        let response = create_health_router()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"OK");
    }

    #[tokio::test]
    async fn test_swagger_document_is_served() {
        let response = create_swagger_router()
            .oneshot(
                Request::builder()
                    .uri("/api-docs/openapi.json")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }
}
