//! Application state for the HTTP server.

use std::sync::Arc;

use crate::solver::Locator;

/// Shared application state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    /// The location engine; reference data and travel-time tables are
    /// shared, per-request state is built per call
    pub locator: Arc<Locator>,
}

impl AppState {
    pub fn new(locator: Arc<Locator>) -> Self {
        Self { locator }
    }
}
