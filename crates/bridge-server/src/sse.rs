//! HTTP+SSE transport: `GET /sse` + `POST /message`.
//!
//! rmcp's server-side transports cover streamable HTTP but not this
//! flavor, so it is served directly over axum. The GET stream opens a
//! session and announces its POST endpoint as an `endpoint` event; every
//! JSON-RPC response travels back on that stream as a `message` event,
//! and POSTs are only acknowledged with 202.

use crate::service::BridgeService;
use axum::Router;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::{get, post};
use futures::StreamExt as _;
use openapi_bridge_core::dispatch::Dispatcher;
use parking_lot::Mutex;
use rmcp::model::ListToolsResult;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::convert::Infallible;
use std::future::Future as _;
use std::sync::Arc;
use std::task::Poll;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

pub const SSE_PATH: &str = "/sse";
pub const SSE_POST_PATH: &str = "/message";

/// Outbound messages buffered per session before POST handlers block.
const SESSION_BUFFER: usize = 64;

struct Session {
    /// Serializing service instance owned by this session.
    service: BridgeService,
    tx: mpsc::Sender<Value>,
}

struct SseState {
    dispatcher: Arc<Dispatcher>,
    name: String,
    ct: CancellationToken,
    sessions: Mutex<HashMap<String, Session>>,
}

pub fn router(dispatcher: Arc<Dispatcher>, name: String, ct: CancellationToken) -> Router {
    let state = Arc::new(SseState {
        dispatcher,
        name,
        ct,
        sessions: Mutex::new(HashMap::new()),
    });
    Router::new()
        .route(SSE_PATH, get(open_session))
        .route(SSE_POST_PATH, post(handle_message))
        .with_state(state)
}

/// Removes the session when its event stream is dropped, whether the
/// client disconnected or the server is shutting down.
struct SessionGuard {
    state: Arc<SseState>,
    session_id: String,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.state.sessions.lock().remove(&self.session_id);
        tracing::debug!("sse session {} closed", self.session_id);
    }
}

async fn open_session(
    State(state): State<Arc<SseState>>,
) -> Sse<impl futures::Stream<Item = Result<Event, Infallible>>> {
    let session_id = Uuid::new_v4().to_string();
    let (tx, mut rx) = mpsc::channel(SESSION_BUFFER);
    let service = BridgeService::serialized(state.dispatcher.clone(), state.name.clone());
    state
        .sessions
        .lock()
        .insert(session_id.clone(), Session { service, tx });
    tracing::debug!("sse session {session_id} opened");

    let endpoint = format!("{SSE_POST_PATH}?sessionId={session_id}");
    let mut shutdown = Box::pin(state.ct.clone().cancelled_owned());
    let guard = SessionGuard { state, session_id };

    let messages = futures::stream::poll_fn(move |cx| {
        let _open = &guard;
        if shutdown.as_mut().poll(cx).is_ready() {
            return Poll::Ready(None);
        }
        rx.poll_recv(cx)
    })
    .map(|msg| Ok::<_, Infallible>(Event::default().event("message").data(msg.to_string())));

    let hello = futures::stream::once(async move {
        Ok::<_, Infallible>(Event::default().event("endpoint").data(endpoint))
    });

    Sse::new(hello.chain(messages)).keep_alive(KeepAlive::default())
}

async fn handle_message(
    State(state): State<Arc<SseState>>,
    Query(params): Query<HashMap<String, String>>,
    axum::Json(message): axum::Json<Value>,
) -> StatusCode {
    let Some(session_id) = params.get("sessionId") else {
        return StatusCode::BAD_REQUEST;
    };
    let Some((service, tx)) = state
        .sessions
        .lock()
        .get(session_id)
        .map(|s| (s.service.clone(), s.tx.clone()))
    else {
        tracing::debug!("message for unknown sse session {session_id}");
        return StatusCode::NOT_FOUND;
    };

    let Some(method) = message.get("method").and_then(Value::as_str) else {
        return StatusCode::BAD_REQUEST;
    };
    // Notifications carry no id and expect no response.
    let Some(id) = message.get("id").cloned() else {
        return StatusCode::ACCEPTED;
    };

    let method = method.to_string();
    let params = message.get("params").cloned();
    tokio::spawn(async move {
        let response = respond(&service, &method, params, id).await;
        if tx.send(response).await.is_err() {
            tracing::debug!("sse stream closed before the response could be delivered");
        }
    });

    StatusCode::ACCEPTED
}

/// Answer one JSON-RPC request. Tool calls go through the session
/// service's dispatch gate, so they complete one at a time per session.
async fn respond(service: &BridgeService, method: &str, params: Option<Value>, id: Value) -> Value {
    let result = match method {
        "initialize" => serde_json::to_value(service.server_info()),
        "ping" => Ok(json!({})),
        "tools/list" => serde_json::to_value(ListToolsResult {
            tools: service.tool_catalog(),
            next_cursor: None,
            meta: None,
        }),
        "tools/call" => {
            let params = params.unwrap_or(Value::Null);
            let name = params
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let args = params
                .get("arguments")
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default();
            serde_json::to_value(service.invoke(&name, &args).await)
        }
        other => {
            return json!({
                "jsonrpc": "2.0",
                "id": id,
                "error": { "code": -32601, "message": format!("method not found: {other}") },
            });
        }
    };

    match result {
        Ok(result) => json!({"jsonrpc": "2.0", "id": id, "result": result}),
        Err(e) => json!({
            "jsonrpc": "2.0",
            "id": id,
            "error": { "code": -32603, "message": format!("failed to encode response: {e}") },
        }),
    }
}
