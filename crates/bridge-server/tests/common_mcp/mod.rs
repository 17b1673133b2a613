#![allow(dead_code)]

use anyhow::Context as _;
use futures::StreamExt as _;
use serde_json::json;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt as _, Lines};
use tokio_util::io::StreamReader;

/// Minimal MCP client for the streamable HTTP endpoint (`/mcp`).
///
/// Exists only for integration tests; it deliberately re-implements no MCP
/// logic from the server side.
pub struct McpStreamableHttpSession {
    client: reqwest::Client,
    base_url: String,
    session_id: String,
}

impl McpStreamableHttpSession {
    pub async fn connect(base_url: &str) -> anyhow::Result<Self> {
        let client = reqwest::Client::new();
        let base_url = base_url.trim_end_matches('/').to_string();

        // initialize -> session id header plus first response over event-stream
        let init_resp = post_mcp(
            &client,
            &base_url,
            None,
            json!({
                "jsonrpc": "2.0",
                "id": 0,
                "method": "initialize",
                "params": {
                    "protocolVersion": "2024-11-05",
                    "capabilities": {},
                    "clientInfo": { "name": "openapi-bridge-integration-tests", "version": "0" }
                }
            }),
        )
        .await?;

        let session_id = init_resp
            .headers()
            .get("Mcp-Session-Id")
            .and_then(|h| h.to_str().ok())
            .context("missing Mcp-Session-Id header")?
            .to_string();

        let init_msg = read_first_event_stream_json_message(init_resp).await?;
        anyhow::ensure!(init_msg.get("id") == Some(&json!(0)), "unexpected init id");

        let initialized_resp = post_mcp(
            &client,
            &base_url,
            Some(&session_id),
            json!({"jsonrpc": "2.0", "method": "notifications/initialized"}),
        )
        .await?;
        anyhow::ensure!(
            initialized_resp.status().as_u16() == 202,
            "POST /mcp notifications/initialized returned {}",
            initialized_resp.status()
        );

        Ok(Self {
            client,
            base_url,
            session_id,
        })
    }

    pub async fn request(
        &self,
        id: u64,
        method: &str,
        params: serde_json::Value,
        timeout_dur: Duration,
    ) -> anyhow::Result<serde_json::Value> {
        let resp = post_mcp(
            &self.client,
            &self.base_url,
            Some(&self.session_id),
            json!({
                "jsonrpc": "2.0",
                "id": id,
                "method": method,
                "params": params,
            }),
        )
        .await?;

        let msg = tokio::time::timeout(timeout_dur, read_first_event_stream_json_message(resp))
            .await
            .context("timeout waiting for event-stream response")??;
        anyhow::ensure!(msg.get("id") == Some(&json!(id)), "response id mismatch");

        Ok(msg)
    }

    pub async fn call_tool(
        &self,
        id: u64,
        name: &str,
        arguments: serde_json::Value,
    ) -> anyhow::Result<serde_json::Value> {
        self.request(
            id,
            "tools/call",
            json!({"name": name, "arguments": arguments}),
            Duration::from_secs(10),
        )
        .await
    }
}

/// Minimal MCP client for the SSE endpoint (`/sse` + `/message`).
///
/// All server-to-client traffic arrives on the long-lived GET stream; POSTs
/// only carry requests.
pub struct McpSseSession {
    client: reqwest::Client,
    post_url: String,
    events: Lines<Box<dyn AsyncBufRead + Unpin + Send>>,
}

impl McpSseSession {
    pub async fn connect(base_url: &str) -> anyhow::Result<Self> {
        let client = reqwest::Client::new();
        let base_url = base_url.trim_end_matches('/').to_string();

        let resp = client
            .get(format!("{base_url}/sse"))
            .header("Accept", "text/event-stream")
            .send()
            .await
            .context("GET /sse")?
            .error_for_status()
            .context("GET /sse status")?;

        let mut events = event_lines(resp);

        // First event names the session-scoped endpoint for POSTs.
        let (event, endpoint) = next_event(&mut events).await?;
        anyhow::ensure!(
            event.as_deref() == Some("endpoint"),
            "expected endpoint event, got {event:?}"
        );
        let post_url = if endpoint.starts_with("http") {
            endpoint
        } else {
            format!("{base_url}{endpoint}")
        };

        let mut session = Self {
            client,
            post_url,
            events,
        };

        session
            .post(json!({
                "jsonrpc": "2.0",
                "id": 0,
                "method": "initialize",
                "params": {
                    "protocolVersion": "2024-11-05",
                    "capabilities": {},
                    "clientInfo": { "name": "openapi-bridge-integration-tests", "version": "0" }
                }
            }))
            .await?;
        let init_msg = session.next_message(Duration::from_secs(10)).await?;
        anyhow::ensure!(init_msg.get("id") == Some(&json!(0)), "unexpected init id");

        session
            .post(json!({"jsonrpc": "2.0", "method": "notifications/initialized"}))
            .await?;

        Ok(session)
    }

    pub async fn request(
        &mut self,
        id: u64,
        method: &str,
        params: serde_json::Value,
        timeout_dur: Duration,
    ) -> anyhow::Result<serde_json::Value> {
        self.post(json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        }))
        .await?;

        let msg = self.next_message(timeout_dur).await?;
        anyhow::ensure!(msg.get("id") == Some(&json!(id)), "response id mismatch");
        Ok(msg)
    }

    pub async fn call_tool(
        &mut self,
        id: u64,
        name: &str,
        arguments: serde_json::Value,
    ) -> anyhow::Result<serde_json::Value> {
        self.request(
            id,
            "tools/call",
            json!({"name": name, "arguments": arguments}),
            Duration::from_secs(10),
        )
        .await
    }

    async fn post(&self, body: serde_json::Value) -> anyhow::Result<()> {
        let resp = self
            .client
            .post(&self.post_url)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .context("POST message")?;
        anyhow::ensure!(
            resp.status().is_success(),
            "POST message returned {}",
            resp.status()
        );
        Ok(())
    }

    /// Next JSON-RPC message from the stream, skipping keep-alives.
    async fn next_message(&mut self, timeout_dur: Duration) -> anyhow::Result<serde_json::Value> {
        tokio::time::timeout(timeout_dur, async {
            loop {
                let (event, data) = next_event(&mut self.events).await?;
                if event.as_deref() == Some("endpoint") || data.is_empty() {
                    continue;
                }
                if let Ok(msg) = serde_json::from_str(&data) {
                    return Ok(msg);
                }
            }
        })
        .await
        .context("timeout waiting for SSE message")?
    }
}

/// Tool call result envelope: `result.structuredContent`.
pub fn structured_content(msg: &serde_json::Value) -> anyhow::Result<serde_json::Value> {
    msg.pointer("/result/structuredContent")
        .cloned()
        .context("tools/call missing result.structuredContent")
}

pub fn is_error(msg: &serde_json::Value) -> bool {
    msg.pointer("/result/isError")
        .and_then(serde_json::Value::as_bool)
        .unwrap_or(false)
}

fn event_lines(resp: reqwest::Response) -> Lines<Box<dyn AsyncBufRead + Unpin + Send>> {
    let mut stream = resp.bytes_stream();
    let byte_stream = futures::stream::poll_fn(move |cx| stream.poll_next_unpin(cx))
        .map(|r| r.map_err(std::io::Error::other));
    let reader: Box<dyn AsyncBufRead + Unpin + Send> =
        Box::new(tokio::io::BufReader::new(StreamReader::new(byte_stream)));
    reader.lines()
}

/// Read one SSE event: `(event-name, joined-data)`.
async fn next_event(
    lines: &mut Lines<Box<dyn AsyncBufRead + Unpin + Send>>,
) -> anyhow::Result<(Option<String>, String)> {
    let mut event: Option<String> = None;
    let mut data_lines: Vec<String> = Vec::new();

    while let Some(line) = lines.next_line().await? {
        let line = line.trim_end().to_string();

        if line.is_empty() {
            if data_lines.is_empty() && event.is_none() {
                continue;
            }
            return Ok((event, data_lines.join("\n")));
        }

        if let Some(v) = line.strip_prefix("event:") {
            event = Some(v.trim().to_string());
        } else if let Some(v) = line.strip_prefix("data:") {
            data_lines.push(v.trim().to_string());
        }
    }

    anyhow::bail!("event stream ended")
}

async fn post_mcp(
    client: &reqwest::Client,
    base_url: &str,
    session_id: Option<&str>,
    body: serde_json::Value,
) -> anyhow::Result<reqwest::Response> {
    let mut req = client
        .post(format!("{base_url}/mcp"))
        .header("Accept", "application/json, text/event-stream")
        .header("Content-Type", "application/json")
        .json(&body);

    if let Some(session_id) = session_id {
        req = req.header("Mcp-Session-Id", session_id);
    }

    req.send()
        .await
        .context("POST /mcp")?
        .error_for_status()
        .context("POST /mcp status")
}

async fn read_first_event_stream_json_message(
    resp: reqwest::Response,
) -> anyhow::Result<serde_json::Value> {
    let mut lines = event_lines(resp);

    loop {
        let (_, data) = next_event(&mut lines).await?;
        if data.is_empty() {
            continue;
        }
        if let Ok(msg) = serde_json::from_str(&data) {
            return Ok(msg);
        }
    }
}
