//! `OpenAPI` spec loader.
//!
//! Parses an `OpenAPI` 3.x document (YAML or JSON) into immutable
//! [`OperationDescriptor`]s, one per (path, method) pair. Local
//! `#/components/...` `$ref`s are resolved against the raw document;
//! operations the bridge cannot represent are skipped with a warning rather
//! than failing the whole load.

use crate::error::SpecError;
use openapiv3::{OpenAPI, Operation, Parameter, ParameterSchemaOrContent, ReferenceOr, Schema};
use regex::Regex;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::collections::{HashMap, HashSet};
use std::path::Path;

/// Where a parameter goes on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamLocation {
    Path,
    Query,
    Header,
    Cookie,
}

/// One operation parameter, normalized from the source document.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterSpec {
    pub name: String,
    pub location: ParamLocation,
    pub required: bool,
    /// JSON-Schema-shaped type descriptor.
    pub schema: Value,
    pub default: Option<Value>,
}

/// Request body contract for an operation.
#[derive(Debug, Clone, PartialEq)]
pub struct BodySpec {
    pub schema: Value,
    pub required: bool,
    pub media_type: String,
}

impl BodySpec {
    /// Flattened object properties, if the body schema is an object with
    /// declared properties. Non-object bodies surface as a single `body`
    /// tool argument instead.
    #[must_use]
    pub fn object_properties(&self) -> Option<&serde_json::Map<String, Value>> {
        if self.schema.get("type").and_then(Value::as_str) != Some("object") {
            return None;
        }
        self.schema.get("properties").and_then(Value::as_object)
    }

    /// Property names listed as required by the body schema. Only meaningful
    /// together with [`Self::object_properties`].
    #[must_use]
    pub fn required_properties(&self) -> HashSet<&str> {
        self.schema
            .get("required")
            .and_then(Value::as_array)
            .map(|r| r.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default()
    }
}

/// Immutable description of one `OpenAPI` operation. Created once during
/// spec load, owned by the registry, never mutated.
#[derive(Debug, Clone)]
pub struct OperationDescriptor {
    /// Unique tool name: the `operationId`, or a synthesized identifier.
    pub operation_id: String,
    pub method: Method,
    /// Path template with `{param}` placeholders, e.g. `/pet/{petId}`.
    pub path_template: String,
    pub summary: Option<String>,
    pub description: Option<String>,
    /// Declaration order from the source document.
    pub parameters: Vec<ParameterSpec>,
    pub request_body: Option<BodySpec>,
}

impl OperationDescriptor {
    /// Human-readable description for the tool catalog:
    /// summary, then description, then a generic fallback.
    #[must_use]
    pub fn tool_description(&self) -> String {
        self.summary
            .clone()
            .or_else(|| self.description.clone())
            .unwrap_or_else(|| format!("Calls {} {}", self.method, self.path_template))
    }
}

/// Result of loading a spec: the operations in declaration order plus the
/// document-level metadata the server needs.
#[derive(Debug)]
pub struct LoadedDocument {
    pub title: String,
    /// `servers[0].url`, used as the base URL when none is configured.
    pub server_url: Option<String>,
    pub operations: Vec<OperationDescriptor>,
}

/// Load and parse an `OpenAPI` document from a file.
///
/// # Errors
///
/// Returns [`SpecError::ReadFile`] / [`SpecError::Parse`] on malformed input
/// and [`SpecError::DuplicateOperationId`] when two operations resolve to
/// the same tool name.
pub fn load_document(path: &Path) -> Result<LoadedDocument, SpecError> {
    tracing::info!("loading OpenAPI spec from {}", path.display());
    let content = std::fs::read_to_string(path).map_err(|e| SpecError::ReadFile {
        path: path.display().to_string(),
        source: e,
    })?;
    parse_document(&content, &path.display().to_string())
}

/// Parse an `OpenAPI` document from a string. JSON is a valid subset of
/// YAML, so a single YAML parse handles both formats.
///
/// # Errors
///
/// See [`load_document`].
pub fn parse_document(content: &str, location: &str) -> Result<LoadedDocument, SpecError> {
    let spec: OpenAPI = serde_yaml::from_str(content).map_err(|e| SpecError::Parse {
        location: location.to_string(),
        source: e,
    })?;

    // The raw document value backs local $ref resolution.
    let raw = serde_json::to_value(&spec)
        .map_err(|e| SpecError::Unsupported(format!("spec does not round-trip to JSON: {e}")))?;
    let resolver = LocalResolver { raw: &raw };

    let mut operations = Vec::new();
    let mut seen_names: HashSet<String> = HashSet::new();

    for (path, item_ref) in &spec.paths.paths {
        let path_item = match resolver.resolve(item_ref) {
            Ok(item) => item,
            Err(e) => {
                tracing::warn!("skipping path '{path}': {e}");
                continue;
            }
        };

        let methods = [
            (Method::GET, &path_item.get),
            (Method::POST, &path_item.post),
            (Method::PUT, &path_item.put),
            (Method::PATCH, &path_item.patch),
            (Method::DELETE, &path_item.delete),
        ];

        for (method, op) in methods {
            let Some(op) = op else { continue };

            let descriptor =
                match build_descriptor(&resolver, path, method.clone(), &path_item.parameters, op) {
                    Ok(d) => d,
                    Err(e) => {
                        tracing::warn!("skipping {method} {path}: {e}");
                        continue;
                    }
                };

            if !seen_names.insert(descriptor.operation_id.clone()) {
                return Err(SpecError::DuplicateOperationId(descriptor.operation_id));
            }
            operations.push(descriptor);
        }
    }

    tracing::info!(
        "discovered {} operations from '{location}'",
        operations.len()
    );

    Ok(LoadedDocument {
        title: spec.info.title.clone(),
        server_url: spec.servers.first().map(|s| s.url.clone()),
        operations,
    })
}

fn build_descriptor(
    resolver: &LocalResolver<'_>,
    path: &str,
    method: Method,
    path_item_params: &[ReferenceOr<Parameter>],
    op: &Operation,
) -> Result<OperationDescriptor, SpecError> {
    let name = op
        .operation_id
        .clone()
        .unwrap_or_else(|| synthesize_tool_name(method.as_str(), path));

    let merged = merge_parameters(resolver, path_item_params, &op.parameters)?;
    let mut parameters = Vec::with_capacity(merged.len());
    let mut arg_names: HashSet<String> = HashSet::new();
    for param in &merged {
        let spec = extract_parameter(resolver, param)?;
        if !arg_names.insert(spec.name.clone()) {
            return Err(SpecError::Unsupported(format!(
                "parameter '{}' appears in more than one location",
                spec.name
            )));
        }
        parameters.push(spec);
    }

    let request_body = match &op.request_body {
        Some(body_ref) => Some(extract_body(resolver, body_ref, &arg_names)?),
        None => None,
    };

    Ok(OperationDescriptor {
        operation_id: name,
        method,
        path_template: path.to_string(),
        summary: op.summary.clone(),
        description: op.description.clone(),
        parameters,
        request_body,
    })
}

/// Path-item parameters apply to every operation under the path; an
/// operation-level parameter with the same (location, name) overrides them.
fn merge_parameters(
    resolver: &LocalResolver<'_>,
    path_item_params: &[ReferenceOr<Parameter>],
    operation_params: &[ReferenceOr<Parameter>],
) -> Result<Vec<Parameter>, SpecError> {
    fn key(p: &Parameter) -> (ParamLocation, String) {
        let (loc, data) = match p {
            Parameter::Path { parameter_data, .. } => (ParamLocation::Path, parameter_data),
            Parameter::Query { parameter_data, .. } => (ParamLocation::Query, parameter_data),
            Parameter::Header { parameter_data, .. } => (ParamLocation::Header, parameter_data),
            Parameter::Cookie { parameter_data, .. } => (ParamLocation::Cookie, parameter_data),
        };
        (loc, data.name.clone())
    }

    let mut merged: Vec<Parameter> = Vec::new();
    let mut index: HashMap<(ParamLocation, String), usize> = HashMap::new();

    for p in path_item_params.iter().chain(operation_params) {
        let resolved = resolver.resolve(p)?;
        let k = key(&resolved);
        if let Some(i) = index.get(&k).copied() {
            merged[i] = resolved;
        } else {
            index.insert(k, merged.len());
            merged.push(resolved);
        }
    }

    Ok(merged)
}

fn extract_parameter(
    resolver: &LocalResolver<'_>,
    param: &Parameter,
) -> Result<ParameterSpec, SpecError> {
    let (location, data, always_required) = match param {
        Parameter::Path { parameter_data, .. } => (ParamLocation::Path, parameter_data, true),
        Parameter::Query { parameter_data, .. } => (ParamLocation::Query, parameter_data, false),
        Parameter::Header { parameter_data, .. } => (ParamLocation::Header, parameter_data, false),
        Parameter::Cookie { parameter_data, .. } => (ParamLocation::Cookie, parameter_data, false),
    };

    let (schema, default) = match &data.format {
        ParameterSchemaOrContent::Schema(schema_ref) => {
            let schema = resolver.resolve(schema_ref)?;
            let default = schema.schema_data.default.clone();
            let mut value = schema_to_json(&schema);
            if let Some(obj) = value.as_object_mut()
                && !obj.contains_key("description")
                && let Some(desc) = &data.description
            {
                obj.insert("description".to_string(), Value::String(desc.clone()));
            }
            (value, default)
        }
        // Content-typed parameters are rare; fall back to a plain string.
        ParameterSchemaOrContent::Content(_) => (json!({"type": "string"}), None),
    };

    Ok(ParameterSpec {
        name: data.name.clone(),
        location,
        // A missing path parameter cannot produce a valid URL.
        required: always_required || data.required,
        schema,
        default,
    })
}

fn extract_body(
    resolver: &LocalResolver<'_>,
    body_ref: &ReferenceOr<openapiv3::RequestBody>,
    param_names: &HashSet<String>,
) -> Result<BodySpec, SpecError> {
    let body = resolver.resolve(body_ref)?;

    // Prefer application/json, then any +json media type, then the first
    // declared one.
    let (media_type, media) = body
        .content
        .get_key_value("application/json")
        .or_else(|| {
            body.content
                .iter()
                .find(|(k, _)| k.to_ascii_lowercase().contains("json"))
        })
        .or_else(|| body.content.iter().next())
        .ok_or_else(|| SpecError::Unsupported("request body declares no content".to_string()))?;

    let schema = match &media.schema {
        Some(schema_ref) => schema_to_json(&resolver.resolve(schema_ref)?),
        None => json!({"type": "object"}),
    };

    let spec = BodySpec {
        schema,
        required: body.required,
        media_type: media_type.clone(),
    };

    // Flattened body properties become tool arguments; they must not shadow
    // path/query/header parameters.
    if let Some(props) = spec.object_properties() {
        for prop in props.keys() {
            if param_names.contains(prop.as_str()) {
                return Err(SpecError::Unsupported(format!(
                    "body property '{prop}' collides with a parameter name"
                )));
            }
        }
    } else if param_names.contains("body") {
        return Err(SpecError::Unsupported(
            "non-object body needs the 'body' argument, which collides with a parameter"
                .to_string(),
        ));
    }

    Ok(spec)
}

/// Resolves local (`#/...`) `$ref`s by JSON pointer against the raw
/// document. External file/URL refs are not supported by the bridge.
struct LocalResolver<'a> {
    raw: &'a Value,
}

impl LocalResolver<'_> {
    fn resolve<T>(&self, r: &ReferenceOr<T>) -> Result<T, SpecError>
    where
        T: Clone + DeserializeOwned,
    {
        let mut seen: HashSet<String> = HashSet::new();
        let mut cur: ReferenceOr<T> = r.clone();

        loop {
            match cur {
                ReferenceOr::Item(item) => return Ok(item),
                ReferenceOr::Reference { reference } => {
                    let pointer = reference.strip_prefix('#').ok_or_else(|| {
                        SpecError::Unsupported(format!(
                            "external $ref '{reference}' (only '#/' refs are supported)"
                        ))
                    })?;
                    if !pointer.starts_with('/') {
                        return Err(SpecError::Unsupported(format!(
                            "$ref fragment is not a JSON pointer: {reference}"
                        )));
                    }
                    if !seen.insert(reference.clone()) {
                        return Err(SpecError::Unsupported(format!(
                            "cyclic $ref '{reference}'"
                        )));
                    }

                    let target = self.raw.pointer(pointer).ok_or_else(|| {
                        SpecError::Unsupported(format!("unresolved $ref '{reference}'"))
                    })?;
                    cur = serde_json::from_value(target.clone()).map_err(|e| {
                        SpecError::Unsupported(format!(
                            "$ref '{reference}' does not have the expected shape: {e}"
                        ))
                    })?;
                }
            }
        }
    }
}

/// Deterministic tool name for operations without an `operationId`,
/// e.g. `GET /pet/{petId}` -> `get_pet_petId`.
fn synthesize_tool_name(method: &str, path: &str) -> String {
    let raw = format!(
        "{}_{}",
        method.to_ascii_lowercase(),
        path.trim_start_matches('/')
    );

    // `{param}` placeholders become `_param`; every other non-identifier run
    // collapses to a single underscore.
    let placeholder = Regex::new(r"\{([^}]+)\}").unwrap();
    let raw = placeholder.replace_all(&raw, "_$1");
    let separators = Regex::new(r"[^a-zA-Z0-9]+").unwrap();
    let name = separators.replace_all(&raw, "_");
    let name = name.trim_matches('_');

    if name.len() > 64 {
        name[..64].to_string()
    } else {
        name.to_string()
    }
}

/// Convert an `openapiv3` schema into a plain JSON Schema value. Nested
/// `$ref`s are kept verbatim (still useful to clients).
fn schema_to_json(schema: &Schema) -> Value {
    let mut result = json!({});

    if let Some(desc) = &schema.schema_data.description {
        result["description"] = json!(desc);
    }
    if let Some(default) = &schema.schema_data.default {
        result["default"] = default.clone();
    }

    match &schema.schema_kind {
        openapiv3::SchemaKind::Type(t) => match t {
            openapiv3::Type::String(s) => {
                result["type"] = json!("string");
                let enumeration: Vec<_> = s.enumeration.iter().flatten().cloned().collect();
                if !enumeration.is_empty() {
                    result["enum"] = json!(enumeration);
                }
            }
            openapiv3::Type::Number(_) => result["type"] = json!("number"),
            openapiv3::Type::Integer(_) => result["type"] = json!("integer"),
            openapiv3::Type::Boolean(_) => result["type"] = json!("boolean"),
            openapiv3::Type::Array(a) => {
                result["type"] = json!("array");
                if let Some(items) = &a.items {
                    result["items"] = match items {
                        ReferenceOr::Item(item) => schema_to_json(item),
                        ReferenceOr::Reference { reference } => json!({"$ref": reference}),
                    };
                }
            }
            openapiv3::Type::Object(o) => {
                result["type"] = json!("object");
                if !o.properties.is_empty() {
                    let mut properties = json!({});
                    for (name, prop) in &o.properties {
                        properties[name] = match prop {
                            ReferenceOr::Item(s) => schema_to_json(s),
                            ReferenceOr::Reference { reference } => json!({"$ref": reference}),
                        };
                    }
                    result["properties"] = properties;
                }
                if !o.required.is_empty() {
                    result["required"] = json!(o.required);
                }
            }
        },
        // anyOf/oneOf/allOf and friends: accept any object.
        _ => result["type"] = json!("object"),
    }

    result
}
