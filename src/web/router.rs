//! Read API router and middleware setup.

use crate::query::QueryService;
use crate::web::config::WebConfig;
use crate::web::handlers::{self, AppState};
use axum::{routing::get, Router};
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

/// Create the axum application serving reads from `query`.
pub fn create_app(config: WebConfig, query: QueryService) -> Router {
    let enable_cors = config.enable_cors;
    let state = AppState { query, config };

    let mut app = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/api/latest", get(handlers::get_latest))
        .route("/api/window", get(handlers::get_window))
        .route("/api/dashboard", get(handlers::get_dashboard))
        .with_state(state);

    // Add CORS if enabled
    if enable_cors {
        app = app.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );
    }

    app.layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
}
