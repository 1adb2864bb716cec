//! Runtime capability errors: delivery failures and programmer mistakes.

use thiserror::Error;

use crate::core::{ClockError, CollabId, ReplicaId};
use crate::error::{Effect, Transience};

use super::collab::PayloadError;

/// A remote transaction could not be applied.
///
/// The transaction is dropped; the vector-clock ledger is unchanged. All
/// replicas drop the same transaction the same way, so convergence is
/// preserved.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ApplyError {
    #[error("transaction ({sender}, {counter}) addresses unknown path {path}")]
    UnknownPath {
        sender: ReplicaId,
        counter: u64,
        path: CollabId,
    },

    #[error("transaction ({sender}, {counter}) payload rejected at {path}: {source}")]
    Payload {
        sender: ReplicaId,
        counter: u64,
        path: CollabId,
        source: PayloadError,
    },

    #[error("saved state rejected at {path}: {source}")]
    LoadPayload {
        path: CollabId,
        source: PayloadError,
    },

    #[error("causal buffer full: {txns} transactions / {bytes} bytes held")]
    PendingOverflow { txns: usize, bytes: usize },

    #[error(transparent)]
    Clock(#[from] ClockError),
}

impl ApplyError {
    pub fn transience(&self) -> Transience {
        match self {
            // More deliveries can drain the buffer.
            ApplyError::PendingOverflow { .. } => Transience::Retryable,
            _ => Transience::Permanent,
        }
    }

    pub fn effect(&self) -> Effect {
        match self {
            ApplyError::UnknownPath { .. } => Effect::None,
            // Payloads are validated before any collab mutates.
            ApplyError::Payload { .. } => Effect::None,
            // Load routes state node by node; a mid-tree rejection leaves
            // earlier nodes loaded.
            ApplyError::LoadPayload { .. } => Effect::Unknown,
            ApplyError::PendingOverflow { .. } => Effect::None,
            ApplyError::Clock(_) => Effect::None,
        }
    }
}

/// Programmer-level misuse; fails fast and synchronously.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum UsageError {
    #[error("duplicate child name `{name}` under {parent}")]
    DuplicateChild { parent: CollabId, name: String },

    #[error("handle belongs to another document")]
    ForeignHandle,

    #[error("local operation on frozen collab {path}")]
    FrozenCollab { path: CollabId },

    #[error("{path} is not a composite")]
    NotAComposite { path: CollabId },

    #[error("{path} is not a primitive")]
    NotAPrimitive { path: CollabId },

    #[error("{path} holds a different collab type")]
    TypeMismatch { path: CollabId },

    #[error("auto-transactions are disabled for this document")]
    AutoTransactDisabled,
}
