//! System handlers: health, system info, OpenAPI, events.

use crate::api::AppState;
use crate::types::SystemInfo;
use axum::{
    Json,
    extract::State,
    response::{
        IntoResponse,
        sse::{Event as SseEvent, KeepAlive, Sse},
    },
};
use serde_json::json;
use std::convert::Infallible;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;

/// SSE event name carried by every task change
const CHANGE_EVENT: &str = "change";

/// GET /health - Health check
#[utoipa::path(
    get,
    path = "/health",
    tag = "system",
    responses(
        (status = 200, description = "Service is healthy")
    )
)]
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": if state.downloader.is_shutting_down() { "shutting_down" } else { "ok" },
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// GET /system - Host platform information
#[utoipa::path(
    get,
    path = "/system",
    tag = "system",
    responses(
        (status = 200, description = "Platform id, architecture and OS", body = SystemInfo)
    )
)]
pub async fn system_info(State(state): State<AppState>) -> Json<SystemInfo> {
    Json(state.downloader.system_info())
}

/// GET /openapi.json - OpenAPI specification
#[utoipa::path(
    get,
    path = "/openapi.json",
    tag = "system",
    responses(
        (status = 200, description = "OpenAPI specification in JSON format")
    )
)]
pub async fn openapi_spec() -> impl IntoResponse {
    use crate::api::openapi::ApiDoc;
    use utoipa::OpenApi;

    Json(ApiDoc::openapi())
}

/// GET /events - Server-sent events stream
///
/// Every registry mutation is sent as a `change` event whose data is the
/// JSON-encoded [`TaskEvent`](crate::types::TaskEvent). A client that falls
/// behind receives an `error` event with the number of skipped events.
#[utoipa::path(
    get,
    path = "/events",
    tag = "system",
    responses(
        (status = 200, description = "Server-sent events stream (text/event-stream)", content_type = "text/event-stream")
    )
)]
pub async fn event_stream(
    State(state): State<AppState>,
) -> Sse<impl tokio_stream::Stream<Item = Result<SseEvent, Infallible>>> {
    let stream = BroadcastStream::new(state.downloader.subscribe());

    let sse_stream = stream.filter_map(|result| match result {
        Ok(event) => match serde_json::to_string(&event) {
            Ok(data) => Some(Ok(SseEvent::default().event(CHANGE_EVENT).data(data))),
            Err(e) => {
                tracing::warn!(error = %e, "failed to serialize task event");
                None
            }
        },
        Err(BroadcastStreamRecvError::Lagged(skipped)) => {
            tracing::warn!(skipped, "SSE client lagged");
            Some(Ok(SseEvent::default()
                .event("error")
                .data(json!({"error": "lagged", "skipped": skipped}).to_string())))
        }
    });

    Sse::new(sse_stream).keep_alive(KeepAlive::default())
}
