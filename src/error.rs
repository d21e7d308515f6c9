//! Error types for Lurry.

use thiserror::Error;

/// The main error type for Lurry operations.
#[derive(Debug, Clone, Error)]
pub enum LurryError {
    /// A definition source could not be opened or read.
    #[error("Source error in '{origin}': {message}")]
    Source { origin: String, message: String },

    /// A definition source was read but its content is malformed.
    #[error("Invalid {format} in '{origin}': {message}")]
    Format {
        format: &'static str,
        origin: String,
        message: String,
    },

    /// No definition registered for the entity/query pair.
    #[error("Query not found: {entity}::{query}")]
    QueryNotFound { entity: String, query: String },

    /// The raw template text is syntactically invalid.
    #[error("Template error at position {position}: {message}")]
    TemplateCompile { position: usize, message: String },

    /// The execution context could not report its product name.
    #[error("Dialect detection failed: {0}")]
    DialectDetection(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Connection error.
    #[error("Connection error: {0}")]
    Connection(String),

    /// Query execution error.
    #[error("Execution error: {0}")]
    Execution(String),
}

impl LurryError {
    /// Create a transport/permission error for the named source.
    pub fn source(origin: impl Into<String>, message: impl ToString) -> Self {
        Self::Source {
            origin: origin.into(),
            message: message.to_string(),
        }
    }

    /// Create a format error for the named source.
    pub fn format(format: &'static str, origin: impl Into<String>, message: impl ToString) -> Self {
        Self::Format {
            format,
            origin: origin.into(),
            message: message.to_string(),
        }
    }

    /// Create a template compile error at the given position.
    pub fn compile(position: usize, message: impl Into<String>) -> Self {
        Self::TemplateCompile {
            position,
            message: message.into(),
        }
    }

    /// Create a query-not-found error.
    pub fn not_found(entity: impl Into<String>, query: impl Into<String>) -> Self {
        Self::QueryNotFound {
            entity: entity.into(),
            query: query.into(),
        }
    }

    /// Whether this is the "no such query" condition, which callers may
    /// choose to treat as a no-op.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::QueryNotFound { .. })
    }
}

/// Result type alias for Lurry operations.
pub type LurryResult<T> = Result<T, LurryError>;
