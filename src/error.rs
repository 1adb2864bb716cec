use thiserror::Error;

use crate::core::CoreError;
use crate::runtime::{ApplyError, UsageError};
use crate::wire::{DecodeError, EncodeError};

/// Whether retrying this operation may succeed.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Transience {
    /// Retry will never help without changing inputs/state.
    Permanent,
    /// Retry may help (e.g. after the causal buffer drains).
    Retryable,
    /// Unknown if retry will help.
    Unknown,
}

impl Transience {
    pub fn is_retryable(self) -> bool {
        matches!(self, Transience::Retryable)
    }
}

/// What we know about side effects when an error is returned.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Effect {
    /// Definitely no side effects occurred.
    None,
    /// Side effects definitely occurred (the document changed).
    Some,
    /// We don't know if side effects occurred.
    Unknown,
}

impl Effect {
    pub fn as_str(self) -> &'static str {
        match self {
            Effect::None => "none",
            Effect::Some => "some",
            Effect::Unknown => "unknown",
        }
    }
}

/// Crate-level convenience error.
///
/// Not a "god error": it is a thin wrapper over canonical capability errors.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error(transparent)]
    Apply(#[from] ApplyError),

    #[error(transparent)]
    Usage(#[from] UsageError),
}

impl Error {
    pub fn transience(&self) -> Transience {
        match self {
            Error::Core(_) => Transience::Permanent,
            Error::Decode(_) => Transience::Permanent,
            Error::Encode(_) => Transience::Permanent,
            Error::Apply(e) => e.transience(),
            Error::Usage(_) => Transience::Permanent,
        }
    }

    pub fn effect(&self) -> Effect {
        match self {
            Error::Core(_) => Effect::None,
            Error::Decode(_) => Effect::None,
            Error::Encode(_) => Effect::None,
            Error::Apply(e) => e.effect(),
            Error::Usage(_) => Effect::None,
        }
    }
}
