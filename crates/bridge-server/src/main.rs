//! `openapi-bridge`: serve an `OpenAPI`-described HTTP API as MCP tools.

use anyhow::Context as _;
use clap::Parser;
use openapi_bridge_core::config::{AuthConfig, BridgeConfig};
use openapi_bridge_core::dispatch::Dispatcher;
use std::net::SocketAddr;
use std::sync::Arc;

mod service;
mod sse;
mod transport;

#[derive(Parser, Debug)]
#[command(
    name = "openapi-bridge",
    version,
    about = "Serve an OpenAPI-described HTTP API as MCP tools"
)]
struct Cli {
    /// Path to the OpenAPI document (YAML or JSON).
    #[arg(long, env = "BRIDGE_SPEC")]
    spec: String,

    /// Name the MCP server identifies itself with.
    #[arg(long, env = "BRIDGE_NAME", default_value = "openapi-bridge")]
    name: String,

    /// Upstream base URL; defaults to the spec's first `servers` entry.
    #[arg(long, env = "BRIDGE_BASE_URL")]
    base_url: Option<String>,

    /// Address to listen on.
    #[arg(long, env = "BRIDGE_BIND", default_value = "127.0.0.1:8080")]
    bind: SocketAddr,

    /// Static header sent on every upstream request, as 'Name=Value'.
    /// Repeatable. Wins over caller-supplied headers of the same name.
    #[arg(long = "header", value_parser = parse_header)]
    headers: Vec<(String, String)>,

    /// Bearer token attached to every upstream request.
    #[arg(long, env = "BRIDGE_BEARER_TOKEN")]
    bearer_token: Option<String>,

    /// Upstream timeout in seconds; 0 disables it.
    #[arg(long, env = "BRIDGE_TIMEOUT_SECS")]
    timeout_secs: Option<u64>,

    /// Log filter, e.g. 'info' or 'openapi_bridge_core=debug'.
    #[arg(long, env = "BRIDGE_LOG", default_value = "info")]
    log_level: String,
}

fn parse_header(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .filter(|(k, _)| !k.is_empty())
        .ok_or_else(|| format!("expected 'Name=Value', got '{raw}'"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_new(&cli.log_level)
                .map_err(|e| anyhow::anyhow!("invalid log filter '{}': {e}", cli.log_level))?,
        )
        .init();

    let mut config = BridgeConfig::new(cli.spec);
    config.name = cli.name.clone();
    config.base_url = cli.base_url;
    config.headers = cli.headers.into_iter().collect();
    config.timeout_secs = cli.timeout_secs;
    config.auth = cli.bearer_token.map(|token| AuthConfig::Bearer { token });

    // Spec problems are fatal: a bridge with nothing to serve must not bind.
    let dispatcher = Dispatcher::from_config(&config).context("failed to start bridge")?;

    transport::serve(cli.bind, Arc::new(dispatcher), config.name).await
}
