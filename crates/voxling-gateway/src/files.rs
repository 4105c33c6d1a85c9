//! Static media service — generated reply audio and emotion images.
//!
//! Owned and started independently of the session server; the two share
//! no mutable state and can be restarted separately.

use std::sync::Arc;

use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::info;

use voxling_core::config::Config;

/// Start the file service. Runs until the process exits.
pub async fn start_file_server(config: Arc<Config>, port: u16) -> anyhow::Result<()> {
    let storage = config.storage();

    let app = Router::new()
        .nest_service("/api/audio", ServeDir::new(&storage.reply_dir))
        .nest_service("/api/emotion", ServeDir::new(&storage.emotion_dir))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr = format!("{}:{port}", config.gateway().bind_addr());
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("File service listening on http://{addr}");

    axum::serve(listener, app).await?;
    Ok(())
}
