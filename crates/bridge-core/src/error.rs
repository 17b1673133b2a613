//! Error types for the bridge core.

use std::fmt;
use thiserror::Error;

/// Fatal, startup-time errors. A process that hits one of these must not
/// start serving.
#[derive(Error, Debug)]
pub enum SpecError {
    /// Configuration errors (invalid base URL, bad static header, conflicts).
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("failed to read spec file '{path}': {source}")]
    ReadFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse OpenAPI document from '{location}': {source}")]
    Parse {
        location: String,
        #[source]
        source: serde_yaml::Error,
    },

    /// Two operations resolved to the same tool name.
    #[error("duplicate operation id '{0}'")]
    DuplicateOperationId(String),

    /// `$ref` targets outside the document, or spec constructs the bridge
    /// does not support.
    #[error("unsupported spec construct: {0}")]
    Unsupported(String),
}

/// Per-invocation, recoverable errors. These are reported back to the caller
/// as a failed tool outcome; the session stays open and no upstream HTTP
/// call is made.
#[derive(Error, Debug)]
pub enum MappingError {
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("invalid arguments for '{tool}': {}", format_issues(issues))]
    Validation {
        tool: String,
        issues: Vec<ValidationIssue>,
    },
}

/// One field-level validation problem, with enough detail for the caller to
/// correct and retry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    pub field: String,
    pub expected: String,
    pub message: String,
}

impl ValidationIssue {
    #[must_use]
    pub fn new(
        field: impl Into<String>,
        expected: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            field: field.into(),
            expected: expected.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "field '{}' (expected {}): {}",
            self.field, self.expected, self.message
        )
    }
}

fn format_issues(issues: &[ValidationIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
