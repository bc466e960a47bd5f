//! Download task handlers.

use super::{StartDownloadResponse, TargetRequest};
use crate::api::AppState;
use crate::error::Result;
use crate::types::{DownloadTask, TaskId};
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};

/// GET /downloads - List all tasks
#[utoipa::path(
    get,
    path = "/downloads",
    tag = "downloads",
    responses(
        (status = 200, description = "All tracked tasks, ordered by id", body = Vec<DownloadTask>)
    )
)]
pub async fn list_downloads(State(state): State<AppState>) -> Json<Vec<DownloadTask>> {
    Json(state.downloader.list().await)
}

/// POST /downloads - Start a download
#[utoipa::path(
    post,
    path = "/downloads",
    tag = "downloads",
    request_body = TargetRequest,
    responses(
        (status = 201, description = "Task queued", body = StartDownloadResponse),
        (status = 400, description = "Blank version or platform", body = crate::error::ApiError),
        (status = 503, description = "Shutting down", body = crate::error::ApiError)
    )
)]
pub async fn start_download(
    State(state): State<AppState>,
    Json(request): Json<TargetRequest>,
) -> Result<impl IntoResponse> {
    let id = state.downloader.start(request.into()).await?;
    Ok((StatusCode::CREATED, Json(StartDownloadResponse { id })))
}

/// GET /downloads/:id - Get a single task
#[utoipa::path(
    get,
    path = "/downloads/{id}",
    tag = "downloads",
    params(
        ("id" = u64, Path, description = "Task ID")
    ),
    responses(
        (status = 200, description = "Task snapshot", body = DownloadTask),
        (status = 404, description = "Task not found", body = crate::error::ApiError)
    )
)]
pub async fn get_download(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<DownloadTask>> {
    let task = state.downloader.get(TaskId(id)).await?;
    Ok(Json(task))
}

/// POST /downloads/:id/retry - Retry a failed task
#[utoipa::path(
    post,
    path = "/downloads/{id}/retry",
    tag = "downloads",
    params(
        ("id" = u64, Path, description = "Task ID")
    ),
    responses(
        (status = 200, description = "Task requeued", body = DownloadTask),
        (status = 404, description = "Task not found", body = crate::error::ApiError),
        (status = 409, description = "Task is not failed", body = crate::error::ApiError)
    )
)]
pub async fn retry_download(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<DownloadTask>> {
    let task = state.downloader.retry(TaskId(id)).await?;
    Ok(Json(task))
}

/// DELETE /downloads/:id - Cancel and remove a task
#[utoipa::path(
    delete,
    path = "/downloads/{id}",
    tag = "downloads",
    params(
        ("id" = u64, Path, description = "Task ID")
    ),
    responses(
        (status = 204, description = "Task removed"),
        (status = 404, description = "Task not found", body = crate::error::ApiError)
    )
)]
pub async fn delete_download(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<StatusCode> {
    state.downloader.remove(TaskId(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}
