use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    routing::{get, post},
    Router,
};
use tracing::{debug, info};

use crate::bot::Bot;
use crate::error::WebhookError;
use crate::platform::line::SIGNATURE_HEADER;

pub fn router(bot: Arc<Bot>) -> Router {
    Router::new()
        .route("/", post(callback))
        .route("/health", get(health))
        .with_state(bot)
}

async fn callback(
    State(bot): State<Arc<Bot>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<&'static str, WebhookError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());

    debug!("Webhook received ({} bytes)", body.len());
    let replied = bot.handle_webhook(&body, signature).await?;
    debug!("Webhook handled, {} repl(ies) sent", replied);

    Ok("OK")
}

async fn health() -> &'static str {
    "OK"
}

/// Serve until Ctrl+C.
pub async fn serve(bot: Arc<Bot>, addr: &str) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;

    info!("Listening on {}", addr);

    axum::serve(listener, router(bot))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
