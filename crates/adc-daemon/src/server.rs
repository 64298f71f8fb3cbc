//! Web server setup and routing

use anyhow::Result;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::api;
use crate::state::AppState;

/// Build the API router
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/devices", get(api::list_devices))
        // Register access
        .route("/api/reg/r/{device}/{addr}", get(api::reg_read))
        .route("/api/reg/r/{device}", get(api::reg_read_all))
        .route("/api/reg/w/{device}", post(api::reg_write))
        // MStream control
        .route("/api/mstream/{action}/{device}", get(api::mstream_action))
        .route("/api/mstream/{action}", get(api::mstream_action_all))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Run the HTTP API server
pub async fn run(state: Arc<AppState>, bind: &str) -> Result<()> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!(address = %bind, "Starting API server");
    axum::serve(listener, app).await?;
    Ok(())
}
