//! Invocation routing: name lookup -> argument mapping -> upstream call.
//!
//! Both transports funnel every tool call through [`Dispatcher::dispatch`],
//! so invocation semantics cannot drift between them. Invocation problems
//! (unknown tool, validation failure, transport failure) come back as failed
//! [`ToolOutcome`]s; the session they arrived on stays usable.

use crate::config::BridgeConfig;
use crate::error::{MappingError, SpecError};
use crate::executor::{HttpExecutor, ToolOutcome};
use crate::mapper::map_arguments;
use crate::registry::ToolRegistry;
use crate::spec::load_document;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

#[derive(Debug)]
pub struct Dispatcher {
    registry: Arc<ToolRegistry>,
    executor: HttpExecutor,
    static_headers: HashMap<String, String>,
    title: String,
}

impl Dispatcher {
    #[must_use]
    pub fn new(
        registry: Arc<ToolRegistry>,
        executor: HttpExecutor,
        static_headers: HashMap<String, String>,
        title: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            executor,
            static_headers,
            title: title.into(),
        }
    }

    /// Load the spec, build the registry, and wire up the executor.
    ///
    /// # Errors
    ///
    /// Any [`SpecError`] here is fatal: the process has nothing to serve.
    pub fn from_config(config: &BridgeConfig) -> Result<Self, SpecError> {
        let doc = load_document(Path::new(&config.spec))?;
        let registry = ToolRegistry::build(&doc)?;
        if registry.is_empty() {
            tracing::warn!("spec '{}' produced no usable tools", config.spec);
        }
        let executor = HttpExecutor::new(config, doc.server_url.as_deref())?;
        tracing::info!(
            "serving {} tools from '{}' against {}",
            registry.len(),
            doc.title,
            executor.base_url()
        );

        Ok(Self::new(
            Arc::new(registry),
            executor,
            config.headers.clone(),
            doc.title,
        ))
    }

    #[must_use]
    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Title of the source document, for server self-description.
    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Run one tool invocation to completion.
    pub async fn dispatch(&self, name: &str, args: &Map<String, Value>) -> ToolOutcome {
        let Some(tool) = self.registry.get(name) else {
            tracing::debug!("call to unknown tool '{name}'");
            return MappingError::UnknownTool(name.to_string()).into();
        };

        match map_arguments(tool, args, &self.static_headers) {
            Ok(request) => self.executor.execute(&request).await,
            Err(e) => {
                tracing::debug!("rejected call to '{name}': {e}");
                e.into()
            }
        }
    }
}
