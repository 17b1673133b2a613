//! Argument mapper: from raw tool arguments to a concrete HTTP request.
//!
//! Mapping is a pure function of (tool, arguments, static header names): it
//! never mutates the arguments, performs no I/O, and reports every problem
//! it finds in one pass so the caller can fix all of them at once.

use crate::error::{MappingError, ValidationIssue};
use crate::registry::RegisteredTool;
use crate::spec::ParamLocation;
use reqwest::Method;
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};

/// A fully mapped upstream request, ready for the executor. The path has
/// placeholders substituted and percent-encoded; query values are kept raw
/// and encoded by the HTTP client when the URL is serialized.
#[derive(Debug, Clone, PartialEq)]
pub struct MappedRequest {
    pub method: Method,
    /// Path with all `{param}` placeholders substituted, e.g. `/status/418`.
    pub path: String,
    /// Query pairs in parameter declaration order.
    pub query: Vec<(String, String)>,
    /// Caller-supplied headers, minus any that a static header shadows.
    pub headers: Vec<(String, String)>,
    pub body: Option<Value>,
    /// Content type for `body`, from the operation's request body contract.
    pub content_type: Option<String>,
}

/// Validate `args` against the tool's contract and build the upstream
/// request.
///
/// `static_headers` are the operator-configured always-sent headers; a
/// caller header argument with the same (case-insensitive) name is dropped
/// here so the static value is the only one on the wire.
///
/// # Errors
///
/// Returns [`MappingError::Validation`] listing every missing required
/// argument, type mismatch, and unrecognized argument.
pub fn map_arguments(
    tool: &RegisteredTool,
    args: &Map<String, Value>,
    static_headers: &HashMap<String, String>,
) -> Result<MappedRequest, MappingError> {
    let descriptor = &tool.descriptor;
    let mut issues: Vec<ValidationIssue> = Vec::new();

    // Every argument must be accounted for by a declared parameter or a
    // body property. Unknown fields are rejected, not silently dropped:
    // a typo like "colour" for "color" would otherwise succeed and do the
    // wrong thing upstream.
    let mut known: HashSet<&str> = descriptor
        .parameters
        .iter()
        .map(|p| p.name.as_str())
        .collect();
    let body_props: Option<Vec<&str>> = descriptor.request_body.as_ref().and_then(|b| {
        b.object_properties()
            .map(|props| props.keys().map(String::as_str).collect())
    });
    match (&descriptor.request_body, &body_props) {
        (Some(_), Some(props)) => known.extend(props),
        (Some(_), None) => {
            known.insert("body");
        }
        (None, _) => {}
    }

    for name in args.keys() {
        if !known.contains(name.as_str()) {
            issues.push(ValidationIssue::new(
                name,
                "no such argument",
                "not declared by this operation",
            ));
        }
    }

    // Resolve each parameter to a value: supplied, defaulted, or absent.
    let mut path = descriptor.path_template.clone();
    let mut query: Vec<(String, String)> = Vec::new();
    let mut headers: Vec<(String, String)> = Vec::new();
    let mut cookies: Vec<(String, String)> = Vec::new();

    let static_names: HashSet<String> = static_headers
        .keys()
        .map(|k| k.to_ascii_lowercase())
        .collect();

    for param in &descriptor.parameters {
        let supplied = args.get(&param.name);
        if let Some(value) = supplied
            && let Some(expected) = type_mismatch(value, &param.schema)
        {
            issues.push(ValidationIssue::new(
                &param.name,
                expected,
                format!("got {}", json_type_name(value)),
            ));
            continue;
        }

        let value = match supplied.or(param.default.as_ref()) {
            Some(v) => v,
            None => {
                if param.required {
                    issues.push(ValidationIssue::new(
                        &param.name,
                        schema_type_name(&param.schema),
                        "required argument is missing",
                    ));
                }
                continue;
            }
        };

        match param.location {
            ParamLocation::Path => {
                let placeholder = format!("{{{}}}", param.name);
                path = path.replace(&placeholder, &encode_path_segment(&value_to_string(value)));
            }
            // Arrays explode form-style: one pair per element.
            ParamLocation::Query => match value {
                Value::Array(items) => {
                    for item in items {
                        query.push((param.name.clone(), value_to_string(item)));
                    }
                }
                other => query.push((param.name.clone(), value_to_string(other))),
            },
            ParamLocation::Header => {
                if static_names.contains(&param.name.to_ascii_lowercase()) {
                    tracing::debug!(
                        "dropping caller header '{}': shadowed by a static header",
                        param.name
                    );
                } else {
                    headers.push((param.name.clone(), value_to_string(value)));
                }
            }
            ParamLocation::Cookie => cookies.push((param.name.clone(), value_to_string(value))),
        }
    }

    // A placeholder that survives substitution means the template names a
    // parameter the document never declared. (A declared-but-missing path
    // parameter is already reported above.)
    if let Some(placeholder) = find_placeholder(&path)
        && !descriptor.parameters.iter().any(|p| p.name == placeholder)
    {
        issues.push(ValidationIssue::new(
            &placeholder,
            "path parameter",
            "path placeholder has no declared parameter",
        ));
    }

    let (body, content_type) = build_body(descriptor, args, &body_props, &mut issues);

    if !issues.is_empty() {
        return Err(MappingError::Validation {
            tool: descriptor.operation_id.clone(),
            issues,
        });
    }

    if !cookies.is_empty() {
        if static_names.contains("cookie") {
            tracing::debug!("dropping cookie arguments: a static Cookie header is configured");
        } else {
            let jar = cookies
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join("; ");
            headers.push(("Cookie".to_string(), jar));
        }
    }

    Ok(MappedRequest {
        method: descriptor.method.clone(),
        path,
        query,
        headers,
        body,
        content_type,
    })
}

fn build_body(
    descriptor: &crate::spec::OperationDescriptor,
    args: &Map<String, Value>,
    body_props: &Option<Vec<&str>>,
    issues: &mut Vec<ValidationIssue>,
) -> (Option<Value>, Option<String>) {
    let Some(body_spec) = &descriptor.request_body else {
        return (None, None);
    };
    let content_type = Some(body_spec.media_type.clone());

    if let Some(props) = body_props {
        let schemas = body_spec.object_properties();
        let required = body_spec.required_properties();
        let mut body = Map::new();

        for &prop in props {
            match args.get(prop) {
                Some(value) => {
                    let schema = schemas.and_then(|s| s.get(prop));
                    if let Some(schema) = schema
                        && let Some(expected) = type_mismatch(value, schema)
                    {
                        issues.push(ValidationIssue::new(
                            prop,
                            expected,
                            format!("got {}", json_type_name(value)),
                        ));
                        continue;
                    }
                    body.insert(prop.to_string(), value.clone());
                }
                None => {
                    if body_spec.required && required.contains(prop) {
                        issues.push(ValidationIssue::new(
                            prop,
                            "body property",
                            "required argument is missing",
                        ));
                    }
                }
            }
        }

        if body.is_empty() && !body_spec.required {
            (None, None)
        } else {
            (Some(Value::Object(body)), content_type)
        }
    } else {
        match args.get("body") {
            Some(value) => {
                if let Some(expected) = type_mismatch(value, &body_spec.schema) {
                    issues.push(ValidationIssue::new(
                        "body",
                        expected,
                        format!("got {}", json_type_name(value)),
                    ));
                }
                (Some(value.clone()), content_type)
            }
            None => {
                if body_spec.required {
                    issues.push(ValidationIssue::new(
                        "body",
                        schema_type_name(&body_spec.schema),
                        "required argument is missing",
                    ));
                }
                (None, None)
            }
        }
    }
}

/// Returns the expected type name if `value` does not satisfy the schema's
/// declared `type`. Schemas without a `type` accept anything.
fn type_mismatch(value: &Value, schema: &Value) -> Option<&'static str> {
    let declared = schema.get("type").and_then(Value::as_str)?;
    let ok = match declared {
        "string" => value.is_string(),
        "integer" => value.is_i64() || value.is_u64(),
        "number" => value.is_number(),
        "boolean" => value.is_boolean(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        _ => true,
    };
    if ok {
        None
    } else {
        Some(match declared {
            "string" => "string",
            "integer" => "integer",
            "number" => "number",
            "boolean" => "boolean",
            "array" => "array",
            _ => "object",
        })
    }
}

fn schema_type_name(schema: &Value) -> String {
    schema
        .get("type")
        .and_then(Value::as_str)
        .unwrap_or("value")
        .to_string()
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Scalars render bare (no JSON quoting); objects and nested arrays render
/// as compact JSON. Query arrays are exploded into repeated pairs before a
/// value reaches here.
fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// RFC 3986 unreserved characters pass through; everything else is
/// percent-encoded, byte by byte.
fn encode_path_segment(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'.' | b'_' | b'~') {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{byte:02X}"));
        }
    }
    out
}

fn find_placeholder(path: &str) -> Option<String> {
    let start = path.find('{')?;
    let end = path[start..].find('}')? + start;
    Some(path[start + 1..end].to_string())
}
