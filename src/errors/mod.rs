//! Centralized error handling for the catalog pipeline
//!
//! This module unifies error types across all layers of the crate and keeps
//! the "best effort" contract visible in the type system: errors that must
//! never abort a rebuild (a single bad source, a corrupt state file) are
//! handled at their layer and only logged; the variants here cover the cases
//! that callers genuinely need to distinguish.
//!
//! # Error Categories
//!
//! - **Source Errors**: playlist/EPG fetch and parse failures
//! - **State Errors**: persisted selection/favourites file failures
//! - **Configuration Errors**: rejected config documents
//!
//! # Usage
//!
//! ```rust
//! use iptv_catalog::errors::{AppError, AppResult};
//!
//! fn example_function() -> AppResult<String> {
//!     Ok("success".to_string())
//! }
//! ```

pub mod types;

pub use types::*;

/// Convenience type alias for Results using AppError
pub type AppResult<T> = Result<T, AppError>;

/// Convenience type alias for Source Results
pub type SourceResult<T> = Result<T, SourceError>;

/// Convenience type alias for State Results
pub type StateResult<T> = Result<T, StateError>;
