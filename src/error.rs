//! Custom error types for mention-explorer.
//!
//! Provides structured error handling with enough context to pick an HTTP
//! status for API callers and a readable hint for CLI users.

use std::path::PathBuf;
use thiserror::Error;

/// Primary error type for mention-explorer operations.
///
/// Each variant provides specific context about what went wrong,
/// enabling better error messages and programmatic error handling.
#[derive(Error, Debug)]
pub enum ExplorerError {
    // =========================================================================
    // Database Errors
    // =========================================================================
    /// Database operation failed.
    #[error("Database error: {0}")]
    DatabaseError(#[from] rusqlite::Error),

    /// Database schema version is newer than this binary understands.
    #[error("Database schema version {found} is newer than supported version {expected}")]
    SchemaTooNew { expected: i32, found: i32 },

    /// SQL produced by the language model failed to execute.
    #[error("Generated SQL failed: {reason}")]
    GeneratedSql { sql: String, reason: String },

    // =========================================================================
    // Lookup / Validation Errors
    // =========================================================================
    /// Data not found.
    #[error("{item_type} with ID '{id}' not found")]
    NotFound { item_type: &'static str, id: String },

    /// Request payload failed validation.
    #[error("Invalid {field}: {reason}")]
    Validation { field: &'static str, reason: String },

    /// Date bound could not be parsed.
    #[error("Invalid date '{value}' for {field}")]
    InvalidDate { value: String, field: &'static str },

    /// Invalid command-line argument or import record.
    #[error("Invalid argument: {reason}")]
    InvalidArgument { reason: String },

    // =========================================================================
    // LLM Errors
    // =========================================================================
    /// No API key (or base URL) configured for the language model.
    #[error("Language model is not configured: {reason}")]
    LlmNotConfigured { reason: String },

    /// Transport-level failure talking to the language model.
    #[error("Language model request failed: {0}")]
    LlmRequest(#[from] reqwest::Error),

    /// The language model answered with a non-success status.
    #[error("Language model returned HTTP {status}: {body}")]
    LlmStatus { status: u16, body: String },

    /// The language model answered, but not in a shape we can read.
    #[error("Unreadable language model response: {reason}")]
    LlmResponse { reason: String },

    // =========================================================================
    // IO / Configuration Errors
    // =========================================================================
    /// File read/write error.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Path-specific IO error with context.
    #[error("Failed to {operation} '{path}': {source}")]
    PathError {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Configuration file parsing error.
    #[error("Invalid configuration in '{path}': {reason}")]
    ConfigError { path: PathBuf, reason: String },

    /// JSON encoding or decoding failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A blocking database task could not complete.
    #[error("Background task failed: {0}")]
    TaskFailed(String),

    // =========================================================================
    // Generic Errors
    // =========================================================================
    /// Catch-all for other errors with context.
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Wrapped anyhow error.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias for mention-explorer operations.
pub type Result<T> = std::result::Result<T, ExplorerError>;

impl ExplorerError {
    /// Create a not found error.
    pub fn not_found(item_type: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            item_type,
            id: id.into(),
        }
    }

    /// Create a validation error for a request field.
    pub fn validation(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Validation {
            field,
            reason: reason.into(),
        }
    }

    /// Create an invalid date error.
    pub fn invalid_date(field: &'static str, value: impl Into<String>) -> Self {
        Self::InvalidDate {
            value: value.into(),
            field,
        }
    }

    /// Create an invalid argument error.
    pub fn invalid_argument(reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            reason: reason.into(),
        }
    }

    /// Create an unreadable-response error.
    pub fn llm_response(reason: impl Into<String>) -> Self {
        Self::LlmResponse {
            reason: reason.into(),
        }
    }

    /// Create a path error with context.
    pub fn path_error(
        operation: &'static str,
        path: impl Into<PathBuf>,
        source: std::io::Error,
    ) -> Self {
        Self::PathError {
            operation,
            path: path.into(),
            source,
        }
    }

    /// Wrap an error with additional context.
    pub fn with_context<E>(context: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::WithContext {
            context: context.into(),
            source: Box::new(source),
        }
    }

    /// HTTP status code this error should surface as.
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::NotFound { .. } => 404,
            Self::Validation { .. }
            | Self::InvalidDate { .. }
            | Self::InvalidArgument { .. }
            | Self::GeneratedSql { .. } => 422,
            Self::LlmNotConfigured { .. } => 503,
            Self::LlmRequest(_) | Self::LlmStatus { .. } | Self::LlmResponse { .. } => 502,
            _ => 500,
        }
    }

    /// Check if the caller can fix this error by changing the request.
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        self.status_code() < 500
    }

    /// Get a suggestion for how to fix this error, if applicable.
    #[must_use]
    pub const fn suggestion(&self) -> Option<&'static str> {
        match self {
            Self::LlmNotConfigured { .. } => {
                Some("Set OPENAI_API_KEY (or [llm] api_key in the config file).")
            }
            Self::InvalidDate { .. } => {
                Some("Use YYYY-MM-DD, an RFC 3339 timestamp, or e.g. 'last 7 days'.")
            }
            Self::SchemaTooNew { .. } => {
                Some("Upgrade mention-explorer or point --db at a different database.")
            }
            Self::ConfigError { .. } => {
                Some("Run 'mention-explorer config init' to write a fresh config file.")
            }
            _ => None,
        }
    }
}

// =============================================================================
// CLI rendering
// =============================================================================

use colored::Colorize;

/// Render a failed CLI command for stderr.
///
/// ```text
/// ✗ Command failed
///
///    Rule with ID '7' not found
///
///    Hint: ...
/// ```
#[must_use]
pub fn format_error(title: &str, explanation: &str, hint: Option<&str>) -> String {
    let mut lines = vec![format!("{} {}", "✗".red().bold(), title.bold())];
    if !explanation.is_empty() {
        lines.push(format!("   {explanation}"));
    }
    if let Some(hint) = hint {
        lines.push(format!("   {} {hint}", "Hint:".cyan()));
    }
    lines.join("\n\n")
}
