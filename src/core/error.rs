//! Core capability errors (parsing, validation).
//!
//! These are bounded and stable: core errors represent domain/refusal
//! states, not library implementation details.

use thiserror::Error;

use crate::error::{Effect, Transience};

/// Invalid identity string.
#[derive(Debug, Error, Clone)]
#[non_exhaustive]
pub enum InvalidId {
    #[error("replica id `{raw}` is invalid: {reason}")]
    Replica { raw: String, reason: String },
    #[error("caller tag `{raw}` is invalid: {reason}")]
    Caller { raw: String, reason: String },
}

/// Invalid collab path.
#[derive(Debug, Error, Clone)]
#[non_exhaustive]
pub enum InvalidPath {
    #[error("path label `{raw}` is invalid: {reason}")]
    Label { raw: String, reason: String },
    #[error("path depth {depth} exceeds maximum {max}")]
    TooDeep { depth: usize, max: usize },
}

/// Canonical error enum for core capability.
#[derive(Debug, Error, Clone)]
#[non_exhaustive]
pub enum CoreError {
    #[error(transparent)]
    InvalidId(#[from] InvalidId),
    #[error(transparent)]
    InvalidPath(#[from] InvalidPath),
}

impl CoreError {
    pub fn transience(&self) -> Transience {
        // Core errors are pure domain/input failures.
        Transience::Permanent
    }

    pub fn effect(&self) -> Effect {
        Effect::None
    }
}
