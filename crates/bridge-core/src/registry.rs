//! Tool registry: one MCP tool definition per `OpenAPI` operation.
//!
//! Built once at startup from a [`LoadedDocument`] and shared immutably
//! behind an `Arc` for the lifetime of the process. Lookup is by exact tool
//! name; listing preserves the declaration order of the source document.

use crate::error::SpecError;
use crate::spec::{LoadedDocument, OperationDescriptor, ParamLocation};
use serde_json::{Map, Value, json};
use std::collections::HashMap;

/// What the MCP catalog advertises for one tool.
#[derive(Debug, Clone)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON Schema for the tool's arguments (always an object schema).
    pub input_schema: Value,
}

/// A tool definition together with the operation it was derived from.
#[derive(Debug, Clone)]
pub struct RegisteredTool {
    pub definition: ToolDefinition,
    pub descriptor: OperationDescriptor,
}

/// Immutable name -> tool mapping.
#[derive(Debug, Default)]
pub struct ToolRegistry {
    tools: Vec<RegisteredTool>,
    by_name: HashMap<String, usize>,
}

impl ToolRegistry {
    /// Build the registry from a loaded document.
    ///
    /// # Errors
    ///
    /// Returns [`SpecError::DuplicateOperationId`] when two operations carry
    /// the same tool name. Collisions are a spec authoring bug; silently
    /// dropping or renaming one of the tools would hide it.
    pub fn build(doc: &LoadedDocument) -> Result<Self, SpecError> {
        let mut registry = Self {
            tools: Vec::with_capacity(doc.operations.len()),
            by_name: HashMap::with_capacity(doc.operations.len()),
        };

        for descriptor in &doc.operations {
            let definition = ToolDefinition {
                name: descriptor.operation_id.clone(),
                description: descriptor.tool_description(),
                input_schema: build_input_schema(descriptor),
            };
            if registry
                .by_name
                .insert(definition.name.clone(), registry.tools.len())
                .is_some()
            {
                return Err(SpecError::DuplicateOperationId(definition.name));
            }
            tracing::debug!(
                "registered tool '{}' for {} {}",
                definition.name,
                descriptor.method,
                descriptor.path_template
            );
            registry.tools.push(RegisteredTool {
                definition,
                descriptor: descriptor.clone(),
            });
        }

        Ok(registry)
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&RegisteredTool> {
        self.by_name.get(name).map(|&i| &self.tools[i])
    }

    /// Tools in source-document declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &RegisteredTool> {
        self.tools.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

/// Derive the argument schema for one operation.
///
/// Path/query/header/cookie parameters and (for object bodies) flattened
/// body properties all become top-level properties. A parameter with a
/// declared default is not listed as required: omitting it is valid and
/// the default applies. Path parameters are the exception: the template
/// cannot be resolved without them, so they stay required whatever the
/// schema declares.
fn build_input_schema(descriptor: &OperationDescriptor) -> Value {
    let mut properties = Map::new();
    let mut required: Vec<String> = Vec::new();

    for param in &descriptor.parameters {
        properties.insert(param.name.clone(), param.schema.clone());
        if param.required && (param.default.is_none() || param.location == ParamLocation::Path) {
            required.push(param.name.clone());
        }
    }

    if let Some(body) = &descriptor.request_body {
        if let Some(props) = body.object_properties() {
            let body_required = body.required_properties();
            for (name, schema) in props {
                properties.insert(name.clone(), schema.clone());
                if body.required && body_required.contains(name.as_str()) {
                    required.push(name.clone());
                }
            }
        } else {
            properties.insert("body".to_string(), body.schema.clone());
            if body.required {
                required.push("body".to_string());
            }
        }
    }

    let mut schema = json!({
        "type": "object",
        "properties": properties,
        // Arguments outside this schema are rejected, not ignored.
        "additionalProperties": false,
    });
    if !required.is_empty() {
        schema["required"] = json!(required);
    }
    schema
}
