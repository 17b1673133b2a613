//! Startup configuration for the bridge.
//!
//! The configuration is an immutable value threaded explicitly into the
//! registry/executor constructors; nothing in the core reads ambient global
//! state.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Configuration for one bridge instance (one spec, one upstream API).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeConfig {
    /// `OpenAPI` spec location (file path).
    pub spec: String,

    /// Name the MCP server identifies itself with.
    #[serde(default = "default_name")]
    pub name: String,

    /// Override base URL from the spec's `servers` list.
    #[serde(default)]
    pub base_url: Option<String>,

    /// Statically configured headers, sent on every upstream request.
    /// Never overridden by caller-supplied header arguments of the same name.
    #[serde(default)]
    pub headers: HashMap<String, String>,

    /// Upstream call timeout in seconds. `0` disables the timeout.
    #[serde(default)]
    pub timeout_secs: Option<u64>,

    /// Credential passthrough for the upstream API.
    #[serde(default)]
    pub auth: Option<AuthConfig>,
}

fn default_name() -> String {
    "openapi-bridge".to_string()
}

impl BridgeConfig {
    #[must_use]
    pub fn new(spec: impl Into<String>) -> Self {
        Self {
            spec: spec.into(),
            name: default_name(),
            base_url: None,
            headers: HashMap::new(),
            timeout_secs: None,
            auth: None,
        }
    }
}

/// How configured credentials are attached to upstream requests.
///
/// This is passthrough only: the bridge never negotiates schemes declared in
/// the spec's `securitySchemes`.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum AuthConfig {
    /// `Authorization: Bearer <token>`
    Bearer { token: String },
    /// Arbitrary header credential.
    Header { name: String, value: String },
    /// HTTP basic auth.
    Basic { username: String, password: String },
    /// API key in the query string.
    Query { name: String, value: String },
    /// Explicitly no auth.
    None,
}
