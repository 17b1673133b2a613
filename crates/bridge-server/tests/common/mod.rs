#![allow(dead_code)]

use anyhow::Context as _;
use axum::Router;
use axum::body::Bytes;
use axum::extract::{Path, Query};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use std::collections::HashMap;
use std::net::TcpListener;
use std::process::{Child, Command};
use std::time::{Duration, Instant};

pub struct KillOnDrop(pub Child);

impl Drop for KillOnDrop {
    fn drop(&mut self) {
        let _ = self.0.kill();
    }
}

/// Pick an unused TCP port on localhost. The port is not reserved; another
/// process can still grab it before the bridge binds.
pub fn pick_unused_port() -> anyhow::Result<u16> {
    let listener = TcpListener::bind("127.0.0.1:0").context("bind ephemeral port")?;
    Ok(listener.local_addr()?.port())
}

/// Poll an HTTP URL until it returns a success status.
pub async fn wait_http_ok(url: &str, timeout_dur: Duration) -> anyhow::Result<()> {
    let client = reqwest::Client::new();
    let start = Instant::now();
    loop {
        if start.elapsed() > timeout_dur {
            anyhow::bail!("timed out waiting for {url}");
        }

        match client.get(url).send().await {
            Ok(resp) if resp.status().is_success() => return Ok(()),
            _ => tokio::time::sleep(Duration::from_millis(200)).await,
        }
    }
}

/// Stand-in upstream API: a status endpoint and an echo endpoint, matching
/// the spec from [`write_demo_spec`].
pub async fn spawn_upstream_stub() -> anyhow::Result<String> {
    let app = Router::new()
        .route(
            "/status/{code}",
            get(|Path(code): Path<u16>| async move {
                (
                    StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
                    axum::Json(serde_json::json!({"echoed": code})),
                )
            }),
        )
        .route(
            "/echo",
            post(
                |headers: HeaderMap, Query(query): Query<HashMap<String, String>>, body: Bytes| async move {
                    let headers: HashMap<_, _> = headers
                        .iter()
                        .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or("").to_string()))
                        .collect();
                    let body: serde_json::Value =
                        serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
                    axum::Json(serde_json::json!({
                        "headers": headers,
                        "query": query,
                        "body": body,
                    }))
                },
            ),
        );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .context("bind upstream stub")?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok(format!("http://{addr}"))
}

/// Write the demo spec the integration tests serve.
pub fn write_demo_spec(dir: &std::path::Path) -> anyhow::Result<std::path::PathBuf> {
    let path = dir.join("demo-api.yaml");
    std::fs::write(
        &path,
        r#"
openapi: "3.0.0"
info:
  title: demo-upstream
  version: "1.0"
paths:
  /status/{code}:
    get:
      operationId: get_status
      summary: Return the given status code
      parameters:
        - name: code
          in: path
          required: true
          schema: { type: integer }
      responses:
        "200": { description: ok }
  /echo:
    post:
      operationId: echo
      summary: Echo the request back
      parameters:
        - name: X-Trace
          in: header
          required: false
          schema: { type: string }
        - name: verbose
          in: query
          required: false
          schema: { type: boolean }
      requestBody:
        required: true
        content:
          application/json:
            schema:
              type: object
              required: [message]
              properties:
                message: { type: string }
                count: { type: integer }
      responses:
        "200": { description: ok }
"#,
    )
    .context("write demo spec")?;
    Ok(path)
}

pub fn spawn_bridge(
    spec_path: &std::path::Path,
    port: u16,
    base_url: &str,
) -> anyhow::Result<Child> {
    let bin = env!("CARGO_BIN_EXE_openapi-bridge");
    Command::new(bin)
        .arg("--spec")
        .arg(spec_path)
        .arg("--base-url")
        .arg(base_url)
        .arg("--bind")
        .arg(format!("127.0.0.1:{port}"))
        .arg("--header")
        .arg("X-Static=on")
        .arg("--log-level")
        .arg("info")
        .spawn()
        .context("spawn bridge")
}

/// Full environment for one integration test: upstream stub plus a bridge
/// serving the demo spec against it.
pub struct BridgeUnderTest {
    pub base_url: String,
    pub upstream_url: String,
    _child: KillOnDrop,
    _spec_dir: tempfile::TempDir,
}

pub async fn start_bridge() -> anyhow::Result<BridgeUnderTest> {
    let upstream_url = spawn_upstream_stub().await?;
    let spec_dir = tempfile::tempdir().context("create spec dir")?;
    let spec_path = write_demo_spec(spec_dir.path())?;
    let port = pick_unused_port()?;
    let child = spawn_bridge(&spec_path, port, &upstream_url)?;

    let base_url = format!("http://127.0.0.1:{port}");
    wait_http_ok(&format!("{base_url}/health"), Duration::from_secs(15)).await?;

    Ok(BridgeUnderTest {
        base_url,
        upstream_url,
        _child: KillOnDrop(child),
        _spec_dir: spec_dir,
    })
}
