//! Error type definitions for the catalog pipeline
//!
//! Hierarchical error system: `AppError` is the top-level type returned at
//! crate boundaries, with layer-specific enums (`SourceError`, `StateError`)
//! folded in via `#[from]`.

use thiserror::Error;

/// Top-level application error type
///
/// Uses `thiserror` to provide automatic error trait implementations and
/// proper error chaining.
#[derive(Error, Debug)]
pub enum AppError {
    /// Source handling errors
    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    /// Persisted state errors
    #[error("State error: {0}")]
    State(#[from] StateError),

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Source handling specific errors
#[derive(Error, Debug)]
pub enum SourceError {
    /// Network connection timeouts
    #[error("Connection timeout: {url}")]
    Timeout { url: String },

    /// Non-success HTTP responses from a source
    #[error("HTTP error: {status} - {url}")]
    Http { status: u16, url: String },

    /// Parsing errors for source data
    #[error("Parse error: {source_type} - {message}")]
    ParseError {
        source_type: String,
        message: String,
    },

    /// Invalid source configuration
    #[error("Invalid configuration: {field} - {message}")]
    InvalidConfig { field: String, message: String },
}

/// Persisted state specific errors
#[derive(Error, Debug)]
pub enum StateError {
    /// State file could not be written
    #[error("Write failed: {path} - {message}")]
    WriteFailed { path: String, message: String },
}

/// Convenience methods for creating common error types
impl AppError {
    /// Create a configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }
}

impl SourceError {
    /// Create a parse error for a given source type
    pub fn parse<S: Into<String>, M: Into<String>>(source_type: S, message: M) -> Self {
        Self::ParseError {
            source_type: source_type.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layer_errors_fold_into_app_error() {
        let source: AppError = SourceError::Timeout {
            url: "http://example.invalid/list.m3u".into(),
        }
        .into();
        assert!(source.to_string().contains("Connection timeout"));

        let state: AppError = StateError::WriteFailed {
            path: "play_state.json".into(),
            message: "disk full".into(),
        }
        .into();
        assert!(state.to_string().contains("play_state.json"));

        let config = AppError::configuration("bad url");
        assert!(config.to_string().contains("bad url"));
    }
}
