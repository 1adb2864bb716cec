//! Transaction state and the handle passed to `transact` closures.

use std::collections::{BTreeMap, BTreeSet};

use crate::core::{MetadataRequest, ReplicaId};
use crate::wire::WireOp;
use crate::Result;

use super::doc::{CollabHandle, Document};

/// State of the currently open transaction.
///
/// Opened lazily by the first `send`; scoped to the document instance,
/// never process-global.
pub(crate) struct OpenTxn {
    pub counter: u64,
    /// The sender's full ledger at open time, own entry excluded.
    pub vc_snapshot: BTreeMap<ReplicaId, u64>,
    /// Ledger entries read by collabs during their own echo.
    pub used_keys: BTreeSet<ReplicaId>,
    /// Entries explicitly requested without being read.
    pub requested_keys: BTreeSet<ReplicaId>,
    pub wall_ms: Option<u64>,
    pub lamport: Option<u64>,
    pub ops: Vec<WireOp>,
}

/// Capability to send operations inside an open transaction.
///
/// Borrows the document mutably for the transaction's lifetime, which is
/// what makes "one transaction at a time" and "no `receive` inside a local
/// transaction" hold statically.
pub struct TxnHandle<'a> {
    pub(crate) doc: &'a mut Document,
}

impl TxnHandle<'_> {
    /// Record one operation against `target` and echo it locally before
    /// returning, so reads made inside the transaction observe it.
    pub fn send(
        &mut self,
        target: &CollabHandle,
        payload: Vec<u8>,
        request: MetadataRequest,
    ) -> Result<()> {
        self.doc.send_local(target, payload, request)
    }

    /// Read access to the document mid-transaction (self-echo checks,
    /// `id_of`, typed reads).
    pub fn doc(&self) -> &Document {
        self.doc
    }
}
