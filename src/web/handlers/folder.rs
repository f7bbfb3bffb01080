//! Folder handlers.

use axum::{
    extract::{Path, State},
    Json,
};
use std::sync::Arc;

use crate::web::dto::{
    CreateFolderRequest, FolderEnvelope, FolderListResponse, MoveFolderRequest,
    RenameFolderRequest, SuccessResponse, ValidatedJson,
};
use crate::web::error::ApiError;
use crate::web::handlers::AppState;
use crate::web::middleware::AuthUser;

/// GET /api/folders - List folders visible to the caller.
#[utoipa::path(
    get,
    path = "/api/folders",
    tag = "folders",
    responses(
        (status = 200, description = "Folders", body = FolderListResponse),
        (status = 401, description = "Unauthorized")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn list_folders(
    State(state): State<Arc<AppState>>,
    AuthUser(caller): AuthUser,
) -> Result<Json<FolderListResponse>, ApiError> {
    let folders = state.library.list_folders(&caller).await?;

    Ok(Json(FolderListResponse {
        success: true,
        folders: folders.into_iter().map(Into::into).collect(),
    }))
}

/// POST /api/folders - Create a folder.
#[utoipa::path(
    post,
    path = "/api/folders",
    tag = "folders",
    request_body = CreateFolderRequest,
    responses(
        (status = 200, description = "Folder created", body = FolderEnvelope),
        (status = 400, description = "Invalid name"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Parent belongs to another user"),
        (status = 404, description = "Parent folder not found")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn create_folder(
    State(state): State<Arc<AppState>>,
    AuthUser(caller): AuthUser,
    ValidatedJson(req): ValidatedJson<CreateFolderRequest>,
) -> Result<Json<FolderEnvelope>, ApiError> {
    let folder = state
        .library
        .create_folder(&caller, &req.name, req.parent_id)
        .await?;
    Ok(Json(FolderEnvelope::new(folder)))
}

/// PUT /api/folders/:id - Rename a folder.
#[utoipa::path(
    put,
    path = "/api/folders/{id}",
    tag = "folders",
    params(
        ("id" = i64, Path, description = "Folder ID")
    ),
    request_body = RenameFolderRequest,
    responses(
        (status = 200, description = "Folder renamed", body = FolderEnvelope),
        (status = 400, description = "Invalid name"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Access denied"),
        (status = 404, description = "Folder not found")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn rename_folder(
    State(state): State<Arc<AppState>>,
    AuthUser(caller): AuthUser,
    Path(folder_id): Path<i64>,
    ValidatedJson(req): ValidatedJson<RenameFolderRequest>,
) -> Result<Json<FolderEnvelope>, ApiError> {
    let folder = state
        .library
        .rename_folder(&caller, folder_id, &req.name)
        .await?;
    Ok(Json(FolderEnvelope::new(folder)))
}

/// POST /api/folders/:id/move - Move a folder under another, or to the root.
#[utoipa::path(
    post,
    path = "/api/folders/{id}/move",
    tag = "folders",
    params(
        ("id" = i64, Path, description = "Folder ID")
    ),
    request_body = MoveFolderRequest,
    responses(
        (status = 200, description = "Folder moved", body = FolderEnvelope),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Access denied"),
        (status = 404, description = "Folder or target not found"),
        (status = 409, description = "Target is the folder itself or a descendant")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn move_folder(
    State(state): State<Arc<AppState>>,
    AuthUser(caller): AuthUser,
    Path(folder_id): Path<i64>,
    ValidatedJson(req): ValidatedJson<MoveFolderRequest>,
) -> Result<Json<FolderEnvelope>, ApiError> {
    let folder = state
        .library
        .move_folder(&caller, folder_id, req.parent_id)
        .await?;
    Ok(Json(FolderEnvelope::new(folder)))
}

/// DELETE /api/folders/:id - Delete a folder.
///
/// Its files and subfolders move up to its parent.
#[utoipa::path(
    delete,
    path = "/api/folders/{id}",
    tag = "folders",
    params(
        ("id" = i64, Path, description = "Folder ID")
    ),
    responses(
        (status = 200, description = "Folder deleted", body = SuccessResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Access denied"),
        (status = 404, description = "Folder not found")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn delete_folder(
    State(state): State<Arc<AppState>>,
    AuthUser(caller): AuthUser,
    Path(folder_id): Path<i64>,
) -> Result<Json<SuccessResponse>, ApiError> {
    state.library.delete_folder(&caller, folder_id).await?;
    Ok(Json(SuccessResponse::ok()))
}
