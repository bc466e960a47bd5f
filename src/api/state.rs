//! Application state for the API server

use crate::{BrowserDownloader, Config};
use std::sync::Arc;

/// Shared application state accessible to all route handlers
///
/// Cloned per request; both fields are behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// The downloader serving all requests
    pub downloader: Arc<BrowserDownloader>,

    /// Configuration the server was started with
    pub config: Arc<Config>,
}

impl AppState {
    /// Create a new AppState
    pub fn new(downloader: Arc<BrowserDownloader>, config: Arc<Config>) -> Self {
        Self { downloader, config }
    }
}
