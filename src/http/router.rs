//! Router configuration for the HTTP API.
//!
//! Sets up the routes and middleware (CORS, tracing) and produces the
//! axum router ready for serving.

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers;
use super::state::AppState;

/// Create the application router with all routes and middleware.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ws/locator/locate", post(handlers::locate))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::refdata::{AuxData, Cratons, ZoneStats};
    use crate::solver::Locator;
    use crate::traveltime::synthetic::SyntheticModel;
    use std::sync::Arc;

    #[test]
    fn router_builds() {
        let aux = Arc::new(AuxData::new(Cratons::default(), ZoneStats::empty()));
        let locator = Arc::new(Locator::new(aux, Arc::new(SyntheticModel::new())));
        let _router = create_router(AppState::new(locator));
    }
}
