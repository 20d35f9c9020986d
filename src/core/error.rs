//! Core capability errors (identity parsing, model invariants).

use thiserror::Error;

/// Invalid identifier.
#[derive(Debug, Error, Clone)]
#[non_exhaustive]
pub enum InvalidId {
    #[error("locale key `{raw}` is invalid: {reason}")]
    Key { raw: String, reason: String },
    #[error("path `{raw}` is invalid: {reason}")]
    Path { raw: String, reason: String },
}

/// Canonical error enum for the core capability.
#[derive(Debug, Error, Clone)]
#[non_exhaustive]
pub enum CoreError {
    #[error(transparent)]
    InvalidId(#[from] InvalidId),
}
