//! HTTP executor: sends a [`MappedRequest`] upstream and captures the
//! response as a [`ToolOutcome`].
//!
//! An upstream response is always a successful outcome, whatever its status
//! code: the caller asked the bridge to relay a request and the relay
//! worked. Only transport failures (connect, TLS, timeout) and invocation
//! errors produce `success: false`.

use crate::config::{AuthConfig, BridgeConfig};
use crate::error::{MappingError, SpecError};
use crate::mapper::MappedRequest;
use serde_json::{Map, Value};
use std::time::Duration;
use url::Url;

const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// What a tool invocation produced, in transport-neutral form.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutcome {
    pub success: bool,
    /// Upstream HTTP status, when a response was received.
    pub status: Option<u16>,
    /// Upstream response headers.
    pub headers: Option<Map<String, Value>>,
    /// Response body bytes as received. Decoding for presentation is the
    /// transport adapter's job.
    pub body: Option<Vec<u8>>,
    /// Failure description when `success` is false.
    pub error: Option<String>,
}

impl ToolOutcome {
    #[must_use]
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            status: None,
            headers: None,
            body: None,
            error: Some(error.into()),
        }
    }
}

impl From<MappingError> for ToolOutcome {
    fn from(err: MappingError) -> Self {
        Self::failure(err.to_string())
    }
}

/// Upstream HTTP client. One instance per bridge; the underlying reqwest
/// client pools connections across invocations.
#[derive(Debug, Clone)]
pub struct HttpExecutor {
    client: reqwest::Client,
    base_url: String,
    static_headers: Vec<(String, String)>,
    auth: Option<AuthConfig>,
}

impl HttpExecutor {
    /// Build the executor from the bridge configuration. `fallback_base_url`
    /// is the spec's `servers[0].url`, used when no base URL is configured.
    ///
    /// # Errors
    ///
    /// Returns [`SpecError::Config`] when no base URL is available or the
    /// configured one does not parse.
    pub fn new(config: &BridgeConfig, fallback_base_url: Option<&str>) -> Result<Self, SpecError> {
        let base_url = config
            .base_url
            .as_deref()
            .or(fallback_base_url)
            .ok_or_else(|| {
                SpecError::Config(
                    "no base URL: configure one or add a 'servers' entry to the spec".to_string(),
                )
            })?;
        let parsed = Url::parse(base_url)
            .map_err(|e| SpecError::Config(format!("invalid base URL '{base_url}': {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(SpecError::Config(format!(
                "base URL '{base_url}' must be http or https"
            )));
        }

        let mut builder = reqwest::Client::builder();
        match config.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS) {
            0 => {}
            secs => builder = builder.timeout(Duration::from_secs(secs)),
        }
        let client = builder
            .build()
            .map_err(|e| SpecError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            static_headers: config
                .headers
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            auth: config.auth.clone(),
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Send the mapped request upstream.
    pub async fn execute(&self, request: &MappedRequest) -> ToolOutcome {
        let url = format!("{}{}", self.base_url, request.path);
        tracing::debug!("upstream request: {} {url}", request.method);

        let mut builder = self.client.request(request.method.clone(), &url);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        // Static headers go on last: between mapper-side shadowing and this
        // ordering, the configured value is the one on the wire.
        for (name, value) in &self.static_headers {
            builder = builder.header(name, value);
        }
        builder = match &self.auth {
            Some(AuthConfig::Bearer { token }) => builder.bearer_auth(token),
            Some(AuthConfig::Header { name, value }) => builder.header(name, value),
            Some(AuthConfig::Basic { username, password }) => {
                builder.basic_auth(username, Some(password))
            }
            Some(AuthConfig::Query { name, value }) => builder.query(&[(name, value)]),
            Some(AuthConfig::None) | None => builder,
        };
        if let Some(body) = &request.body {
            builder = match &request.content_type {
                // json() sets the application/json content type itself.
                Some(ct) if ct != "application/json" => match serde_json::to_vec(body) {
                    Ok(bytes) => builder
                        .header(reqwest::header::CONTENT_TYPE, ct)
                        .body(bytes),
                    Err(e) => {
                        return ToolOutcome::failure(format!("failed to serialize body: {e}"));
                    }
                },
                _ => builder.json(body),
            };
        }

        let response = match builder.send().await {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!("upstream request to {url} failed: {e}");
                return ToolOutcome::failure(format!("upstream request failed: {e}"));
            }
        };

        let status = response.status().as_u16();
        let mut headers = Map::new();
        for (name, value) in response.headers() {
            headers.insert(
                name.to_string(),
                Value::String(String::from_utf8_lossy(value.as_bytes()).into_owned()),
            );
        }

        let body = match response.bytes().await {
            Ok(bytes) if bytes.is_empty() => None,
            Ok(bytes) => Some(bytes.to_vec()),
            Err(e) => {
                tracing::warn!("failed to read upstream response body from {url}: {e}");
                return ToolOutcome::failure(format!("failed to read upstream response: {e}"));
            }
        };

        tracing::debug!("upstream response: {status} from {url}");
        ToolOutcome {
            success: true,
            status: Some(status),
            headers: Some(headers),
            body,
            error: None,
        }
    }
}
