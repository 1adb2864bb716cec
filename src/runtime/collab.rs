//! The runtime <-> sub-CRDT contract.
//!
//! A primitive collab owns opaque state, applies op payloads, and
//! serializes itself for save/load. It never talks to the network: it
//! hands payloads up through a transaction and the runtime hands payloads
//! back down, locally (synchronous echo) and remotely (causal delivery).

use std::any::Any;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use thiserror::Error;

use crate::core::{LoadMeta, ReplicaId, UpdateMeta, VectorClock};

/// A payload failed to parse or violated the collab's own invariants.
///
/// Raised from [`PrimitiveCollab::validate`], which runs before any
/// mutation, so a rejected op leaves every collab untouched.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{reason}")]
pub struct PayloadError {
    pub reason: String,
}

impl PayloadError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// A leaf node in the collab tree.
///
/// Implementations express a CRDT's op-based semantics; the runtime
/// guarantees each op is delivered exactly once, in a causally consistent
/// order, with the metadata its sender requested.
pub trait PrimitiveCollab: Any {
    /// Check one op payload without mutating state.
    ///
    /// The runtime validates every op of a transaction before applying
    /// any of them, which is what makes a rejected transaction leave all
    /// collab state - not just the ledger - unchanged. Contract:
    /// [`receive`](Self::receive) must succeed for any payload this
    /// accepts.
    fn validate(&self, payload: &[u8], meta: &UpdateMeta) -> Result<(), PayloadError>;

    /// Apply one op payload. Called for the sender's own synchronous echo
    /// (`meta.is_local_echo`) and for remote delivery, always after
    /// [`validate`](Self::validate) accepted the payload.
    ///
    /// Vector-clock entries must be read through `ctx`; during the local
    /// echo those reads select the entries that travel on the wire, and on
    /// the receiving side absent entries read as a possibly-incorrect 0.
    fn receive(
        &mut self,
        payload: &[u8],
        meta: &UpdateMeta,
        ctx: &mut CrdtContext<'_>,
    ) -> Result<(), PayloadError>;

    /// Serialize own state. `None` means "nothing beyond initial state".
    fn save(&self) -> Option<Vec<u8>>;

    /// Merge saved bytes into the current state. `saved` is `None` when
    /// the saving replica omitted this collab (it was in initial state).
    /// `meta` carries both clocks so the collab can resolve, per sender,
    /// which side is ahead.
    fn load(&mut self, saved: Option<&[u8]>, meta: &LoadMeta) -> Result<(), PayloadError>;

    /// True while in initial state; lets the runtime omit this collab from
    /// save output. Must not observably change convergence.
    fn can_gc(&self) -> bool {
        false
    }

    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl fmt::Debug for dyn PrimitiveCollab {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("dyn PrimitiveCollab")
    }
}

enum CtxMode<'a> {
    /// Sender-side echo: reads go to the live ledger and are recorded so
    /// the transaction header carries exactly the entries that were used.
    LocalEcho {
        ledger: &'a VectorClock,
        used: &'a mut BTreeSet<ReplicaId>,
    },
    /// Remote apply: reads go to the transaction header's partial clock.
    Remote {
        header_vc: &'a BTreeMap<ReplicaId, u64>,
    },
}

/// Clock access handed to a collab while one of its ops is applied.
pub struct CrdtContext<'a> {
    mode: CtxMode<'a>,
}

impl<'a> CrdtContext<'a> {
    pub(crate) fn local_echo(
        ledger: &'a VectorClock,
        used: &'a mut BTreeSet<ReplicaId>,
    ) -> Self {
        Self {
            mode: CtxMode::LocalEcho { ledger, used },
        }
    }

    pub(crate) fn remote(header_vc: &'a BTreeMap<ReplicaId, u64>) -> Self {
        Self {
            mode: CtxMode::Remote { header_vc },
        }
    }

    /// The sender's knowledge of `sender` at send time.
    ///
    /// Remotely, entries the sender neither read nor requested are absent
    /// and read as 0 - a collab that depends on an entry must read it (or
    /// request it) on the sending side.
    pub fn clock(&mut self, sender: &ReplicaId) -> u64 {
        match &mut self.mode {
            CtxMode::LocalEcho { ledger, used } => {
                used.insert(sender.clone());
                ledger.get(sender)
            }
            CtxMode::Remote { header_vc } => header_vc.get(sender).copied().unwrap_or(0),
        }
    }
}
