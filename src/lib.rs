//! # weft
//!
//! A replication runtime for building local-first, collaborative
//! applications out of composable CRDTs.
//!
//! A [`Document`] owns a tree of sub-CRDTs ("collabs"). Local mutations are
//! grouped into transactions, stamped with causal metadata, echoed to the
//! local tree synchronously, and broadcast as a single byte message via the
//! [`DocEvent::Send`] event. Remote messages are held in a causal buffer
//! until ready and then applied exactly once, in a causally consistent
//! order. The whole document state round-trips through [`Document::save`]
//! and [`Document::load`].
//!
//! The runtime is transport-agnostic: any channel that eventually delivers
//! every `Send` payload to every other replica (duplicates and reorderings
//! included) yields convergence.

#![forbid(unsafe_code)]

pub mod config;
pub mod core;
pub mod error;
pub mod runtime;
pub mod types;
pub mod wire;

pub use error::{Effect, Error, Transience};
pub type Result<T> = std::result::Result<T, Error>;

pub use crate::config::DocOptions;
pub use crate::core::{
    CallerTag, ClockError, CollabId, CoreError, Lamport, Limits, LoadMeta, MetadataRequest,
    ReplicaId, UpdateMeta, VectorClock, WallClock,
};
pub use crate::runtime::{
    ApplyError, CollabHandle, CrdtContext, DocEvent, Document, PayloadError, PrimitiveCollab,
    ReceiveOutcome, SubscriptionId, TxnHandle, UpdateKind, UsageError,
};
pub use crate::types::{Counter, LwwRegister};
pub use crate::wire::{DecodeError, EncodeError};
