//! Transport wiring: SSE and streamable HTTP on one listener.
//!
//! Both endpoints back onto the same shared [`Dispatcher`]; only the session
//! model differs. SSE sessions get a serializing service, streamable HTTP
//! sessions a concurrent one.

use crate::service::BridgeService;
use crate::sse;
use axum::routing::get;
use openapi_bridge_core::dispatch::Dispatcher;
use rmcp::transport::streamable_http_server::session::local::LocalSessionManager;
use rmcp::transport::streamable_http_server::{StreamableHttpServerConfig, StreamableHttpService};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub const STREAMABLE_PATH: &str = "/mcp";

/// Bind and serve until ctrl-c.
///
/// # Errors
///
/// Returns an error if the listener cannot bind or the server loop fails.
pub async fn serve(
    addr: SocketAddr,
    dispatcher: Arc<Dispatcher>,
    name: String,
) -> anyhow::Result<()> {
    let ct = CancellationToken::new();

    let streamable = StreamableHttpService::new(
        {
            let dispatcher = dispatcher.clone();
            let name = name.clone();
            move || Ok(BridgeService::concurrent(dispatcher.clone(), name.clone()))
        },
        Arc::new(LocalSessionManager::default()),
        StreamableHttpServerConfig {
            stateful_mode: true,
            sse_keep_alive: None,
            ..StreamableHttpServerConfig::default()
        },
    );

    let tool_count = dispatcher.registry().len();
    let app = sse::router(dispatcher, name, ct.child_token())
        .nest_service(STREAMABLE_PATH, streamable)
        .route(
            "/health",
            get(move || async move {
                axum::Json(serde_json::json!({"status": "ok", "tools": tool_count}))
            }),
        );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(
        "listening on {addr} (sse: {}, streamable http: {STREAMABLE_PATH})",
        sse::SSE_PATH
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => tracing::info!("shutdown signal received"),
                Err(e) => tracing::error!("failed to listen for shutdown signal: {e}"),
            }
            // Ends every open SSE event stream so shutdown doesn't wait on
            // long-lived connections.
            ct.cancel();
        })
        .await?;

    Ok(())
}
