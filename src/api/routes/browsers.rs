//! One-shot browser command handlers.

use super::{ClearInstallationsResponse, LaunchRequest, LaunchResponse, TargetRequest};
use crate::api::AppState;
use crate::error::Result;
use crate::types::{BrowserKind, BrowserRecord};
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};

/// GET /versions/:kind - Versions available for a browser
#[utoipa::path(
    get,
    path = "/versions/{kind}",
    tag = "browsers",
    params(
        ("kind" = String, Path, description = "chrome, chromium, firefox or chromedriver")
    ),
    responses(
        (status = 200, description = "Available versions, newest first as reported by the worker", body = Vec<String>),
        (status = 400, description = "Unknown browser kind", body = crate::error::ApiError),
        (status = 502, description = "Worker failed", body = crate::error::ApiError)
    )
)]
pub async fn list_versions(
    State(state): State<AppState>,
    Path(kind): Path<String>,
) -> Result<Json<Vec<String>>> {
    let kind: BrowserKind = kind.parse()?;
    let versions = state.downloader.available_versions(kind).await?;
    Ok(Json(versions))
}

/// POST /browsers/uninstall - Uninstall a browser build
#[utoipa::path(
    post,
    path = "/browsers/uninstall",
    tag = "browsers",
    request_body = TargetRequest,
    responses(
        (status = 204, description = "Browser uninstalled"),
        (status = 400, description = "Blank version or platform", body = crate::error::ApiError),
        (status = 502, description = "Worker reported an error", body = crate::error::ApiError)
    )
)]
pub async fn uninstall_browser(
    State(state): State<AppState>,
    Json(request): Json<TargetRequest>,
) -> Result<StatusCode> {
    state.downloader.uninstall(request.into()).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /browsers - Recorded installations
#[utoipa::path(
    get,
    path = "/browsers",
    tag = "browsers",
    responses(
        (status = 200, description = "Installed browsers", body = Vec<BrowserRecord>)
    )
)]
pub async fn list_installations(State(state): State<AppState>) -> Result<Json<Vec<BrowserRecord>>> {
    Ok(Json(state.downloader.installations().await?))
}

/// DELETE /browsers - Uninstall every recorded installation
#[utoipa::path(
    delete,
    path = "/browsers",
    tag = "browsers",
    responses(
        (status = 200, description = "Installations removed; failures are left in place", body = ClearInstallationsResponse)
    )
)]
pub async fn clear_installations(
    State(state): State<AppState>,
) -> Result<Json<ClearInstallationsResponse>> {
    let removed = state.downloader.clear_installations().await?;
    Ok(Json(ClearInstallationsResponse { removed }))
}

/// POST /browsers/:id/launch - Start an installed browser
#[utoipa::path(
    post,
    path = "/browsers/{id}/launch",
    tag = "browsers",
    params(
        ("id" = String, Path, description = "Installation record id")
    ),
    request_body = LaunchRequest,
    responses(
        (status = 200, description = "Browser started", body = LaunchResponse),
        (status = 400, description = "Record is not a launchable browser", body = crate::error::ApiError),
        (status = 404, description = "Unknown record or missing executable", body = crate::error::ApiError),
        (status = 409, description = "Browser already running", body = crate::error::ApiError)
    )
)]
pub async fn launch_browser(
    State(state): State<AppState>,
    Path(id): Path<String>,
    request: Option<Json<LaunchRequest>>,
) -> Result<Json<LaunchResponse>> {
    let Json(request) = request.unwrap_or_default();
    let pid = state.downloader.launch(&id, request.args).await?;
    Ok(Json(LaunchResponse { pid }))
}
