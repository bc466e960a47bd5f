//! REST API server module
//!
//! Exposes the downloader over HTTP: task control, one-shot browser
//! commands, system information, and a server-sent event stream of task
//! changes. The OpenAPI document is generated with utoipa.

use crate::{BrowserDownloader, Config, Result};
use axum::{
    Router,
    http::HeaderValue,
    routing::{get, post},
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub mod error_response;
pub mod openapi;
pub mod routes;
pub mod state;

pub use openapi::ApiDoc;
pub use state::AppState;

/// Create the API router with all route definitions
///
/// # Routes
///
/// ## Downloads
/// - `GET /downloads` - List all tasks
/// - `POST /downloads` - Start a download
/// - `GET /downloads/:id` - Get a single task
/// - `POST /downloads/:id/retry` - Retry a failed task
/// - `DELETE /downloads/:id` - Cancel and remove a task
///
/// ## Browsers
/// - `GET /versions/:kind` - Versions available for a browser
/// - `POST /browsers/uninstall` - Uninstall a browser build
/// - `GET /browsers` - Recorded installations
/// - `DELETE /browsers` - Uninstall every recorded installation
/// - `POST /browsers/:id/launch` - Start an installed browser
///
/// ## System
/// - `GET /system` - Host platform information
/// - `GET /health` - Health check
/// - `GET /openapi.json` - OpenAPI specification
/// - `GET /swagger-ui` - Interactive Swagger UI documentation (if enabled)
/// - `GET /events` - Server-sent events stream
pub fn create_router(downloader: Arc<BrowserDownloader>, config: Arc<Config>) -> Router {
    let state = AppState::new(downloader, config.clone());

    let router = Router::new()
        // Downloads
        .route(
            "/downloads",
            get(routes::list_downloads).post(routes::start_download),
        )
        .route(
            "/downloads/:id",
            get(routes::get_download).delete(routes::delete_download),
        )
        .route("/downloads/:id/retry", post(routes::retry_download))
        // Browsers
        .route("/versions/:kind", get(routes::list_versions))
        .route("/browsers/uninstall", post(routes::uninstall_browser))
        .route(
            "/browsers",
            get(routes::list_installations).delete(routes::clear_installations),
        )
        .route("/browsers/:id/launch", post(routes::launch_browser))
        // System
        .route("/system", get(routes::system_info))
        .route("/health", get(routes::health_check))
        .route("/openapi.json", get(routes::openapi_spec))
        .route("/events", get(routes::event_stream));

    // Swagger UI serves its own copy of the document under a separate path
    let router = if config.api.swagger_ui {
        router.merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
    } else {
        router
    };

    let router = router.with_state(state).layer(TraceLayer::new_for_http());

    if config.api.cors_enabled {
        router.layer(build_cors_layer(&config.api.cors_origins))
    } else {
        router
    }
}

/// Build a CORS layer based on configured origins
///
/// `"*"` or an empty list allows any origin.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    let allow_any = origins.iter().any(|o| o == "*");

    if allow_any || origins.is_empty() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let allowed: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();

        CorsLayer::new()
            .allow_origin(AllowOrigin::list(allowed))
            .allow_methods(Any)
            .allow_headers(Any)
    }
}

/// Start the API server on the configured bind address.
///
/// Runs until the server stops or fails.
///
/// # Example
///
/// ```no_run
/// use browser_dl::{BrowserDownloader, Config};
/// use std::sync::Arc;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = Arc::new(Config::default());
/// let downloader = Arc::new(BrowserDownloader::new((*config).clone()).await?);
///
/// browser_dl::api::start_api_server(downloader, config).await?;
/// # Ok(())
/// # }
/// ```
pub async fn start_api_server(
    downloader: Arc<BrowserDownloader>,
    config: Arc<Config>,
) -> Result<()> {
    let bind_address = config.api.bind_address;

    tracing::info!(address = %bind_address, "starting API server");

    let app = create_router(downloader, config);

    let listener = TcpListener::bind(bind_address)
        .await
        .map_err(crate::error::Error::Io)?;

    tracing::info!(address = %bind_address, "API server listening");

    axum::serve(listener, app)
        .await
        .map_err(|e| crate::error::Error::ApiServerError(e.to_string()))?;

    tracing::info!("API server stopped");
    Ok(())
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(all(test, unix))]
mod tests;
