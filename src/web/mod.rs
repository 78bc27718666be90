//! Read-only HTTP API over the query service.
//!
//! Exposes the latest sample and the recent window as JSON for whatever
//! dashboard polls it. Nothing here writes to the store.

pub mod config;
pub mod handlers;
pub mod router;

// Re-export commonly used items
pub use config::WebConfig;
pub use router::create_app;

use crate::error::{Result, SystemError};
use crate::query::QueryService;
use tokio::sync::watch;
use tracing::info;

/// Serve the read API until `shutdown` flips to `true`.
pub async fn start_web_server(
    config: WebConfig,
    query: QueryService,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let addr = config.socket_addr()?;

    let app = create_app(config, query);

    info!("Read API listening on http://{}", addr);
    info!("  latest sample: http://{}/api/latest", addr);
    info!("  recent window: http://{}/api/window?secs=3600&limit=3600", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| SystemError::web_server_error(format!("Failed to bind to address: {}", e)))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            while !*shutdown.borrow() {
                if shutdown.changed().await.is_err() {
                    break;
                }
            }
        })
        .await
        .map_err(|e| SystemError::web_server_error(format!("Server error: {}", e)))?;

    info!("Read API stopped");
    Ok(())
}
