//! OpenAPI documentation and schema generation

use utoipa::OpenApi;

/// OpenAPI documentation for the browser-dl REST API
///
/// Served at `/openapi.json`, and at `/swagger-ui` when enabled.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "browser-dl REST API",
        version = "0.1.0",
        description = "REST API for downloading, tracking and managing browser binaries",
        license(
            name = "MIT OR Apache-2.0"
        )
    ),
    servers(
        (url = "http://localhost:6790", description = "Local development server")
    ),
    paths(
        // Downloads
        crate::api::routes::list_downloads,
        crate::api::routes::start_download,
        crate::api::routes::get_download,
        crate::api::routes::retry_download,
        crate::api::routes::delete_download,

        // Browsers
        crate::api::routes::list_versions,
        crate::api::routes::uninstall_browser,
        crate::api::routes::list_installations,
        crate::api::routes::clear_installations,
        crate::api::routes::launch_browser,

        // System
        crate::api::routes::system_info,
        crate::api::routes::health_check,
        crate::api::routes::openapi_spec,
        crate::api::routes::event_stream,
    ),
    components(schemas(
        crate::types::TaskId,
        crate::types::BrowserKind,
        crate::types::Target,
        crate::types::Status,
        crate::types::DownloadTask,
        crate::types::BrowserRecord,
        crate::types::ChangeKind,
        crate::types::TaskEvent,
        crate::types::SystemInfo,

        crate::api::routes::TargetRequest,
        crate::api::routes::StartDownloadResponse,
        crate::api::routes::LaunchRequest,
        crate::api::routes::LaunchResponse,
        crate::api::routes::ClearInstallationsResponse,

        crate::error::ApiError,
        crate::error::ErrorDetail,
    )),
    tags(
        (name = "downloads", description = "Download tasks - Start, inspect, retry and remove"),
        (name = "browsers", description = "Browser commands - Versions, installations, launch and uninstall"),
        (name = "system", description = "System endpoints - Health, platform info, OpenAPI, events"),
    )
)]
pub struct ApiDoc;
