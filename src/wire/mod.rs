//! Wire schemas: transaction messages and saved state.
//!
//! Everything on the wire is a CBOR map with string keys. Unknown keys are
//! skipped so old replicas tolerate fields added later; indefinite-length
//! items and trailing bytes are rejected; all decoding is bounded by
//! [`Limits`](crate::core::Limits).

pub(crate) mod cbor;
pub mod saved;
pub mod txn;

use std::convert::Infallible;

use thiserror::Error;

pub use saved::{decode_saved, encode_saved, SavedDoc, SavedTree};
pub use txn::{decode_txn, encode_txn, WireOp, WireTxn};

/// Current wire version for both schemas.
pub const WIRE_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("cbor encode: {0}")]
    Cbor(#[from] minicbor::encode::Error<Infallible>),
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("decode limit exceeded: {0}")]
    DecodeLimit(&'static str),
    #[error("indefinite-length CBOR not allowed")]
    IndefiniteLength,
    #[error("missing required field: {0}")]
    MissingField(&'static str),
    #[error("invalid field {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },
    #[error("field {field} length mismatch: {keys} keys vs {vals} values")]
    LengthMismatch {
        field: &'static str,
        keys: usize,
        vals: usize,
    },
    #[error("unknown wire version {0}")]
    UnknownVersion(u32),
    #[error("trailing bytes after message body")]
    TrailingBytes,
    #[error("cbor decode: {0}")]
    Cbor(#[from] minicbor::decode::Error),
}
