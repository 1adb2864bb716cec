//! The document: one replica's live copy, and every public entry point.
//!
//! A `Document` owns its collab tree, vector-clock ledger, causal buffer,
//! and event hub exclusively. Entry points take `&mut self`, so at most
//! one of them is active at a time and a `receive` inside an open local
//! transaction is a compile error rather than a runtime state error.

use std::collections::BTreeMap;
use std::fmt;

use bytes::Bytes;
use tracing::{debug, trace, warn};

use crate::config::DocOptions;
use crate::core::identity::validate_label;
use crate::core::{
    CallerTag, CollabId, DocId, InvalidPath, Lamport, Limits, LoadMeta, MetadataRequest,
    ReplicaId, UpdateMeta, VectorClock, WallClock,
};
use crate::wire::{decode_saved, decode_txn, encode_saved, encode_txn, SavedDoc, WireOp, WireTxn};
use crate::Result;

use super::buffer::{InsertOutcome, PendingBuffer};
use super::collab::CrdtContext;
use super::error::{ApplyError, UsageError};
use super::events::{DocEvent, EventHub, SubscriptionId, UpdateKind};
use super::tree::{CollabTree, NodeIdx, NodeKind};
use super::txn::{OpenTxn, TxnHandle};
use super::PrimitiveCollab;

/// Reference to a collab within one document.
///
/// Handles are cheap to copy and stay valid for the document's lifetime
/// (frozen collabs keep their handle; it just stops accepting local ops).
/// A handle only works on the document that issued it.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct CollabHandle {
    pub(crate) doc: DocId,
    pub(crate) idx: NodeIdx,
}

/// What one `receive`/`load` call did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReceiveOutcome {
    /// Transactions applied (the incoming one and any it unblocked).
    pub applied: usize,
    /// Transactions still held in the causal buffer afterwards.
    pub buffered: usize,
    /// Incoming transactions dropped as already known.
    pub duplicates: usize,
}

pub struct Document {
    doc_id: DocId,
    replica: ReplicaId,
    clock: VectorClock,
    lamport: Lamport,
    tree: CollabTree,
    pending: PendingBuffer,
    open: Option<OpenTxn>,
    hub: EventHub,
    batch_depth: u32,
    changed: bool,
    caller: Option<CallerTag>,
    limits: Limits,
    auto_transact: bool,
}

impl Document {
    pub fn new(options: DocOptions) -> Self {
        let replica = options.replica_id.unwrap_or_else(ReplicaId::generate);
        Self {
            doc_id: DocId::generate(),
            replica,
            clock: VectorClock::new(),
            lamport: Lamport::default(),
            tree: CollabTree::new(),
            pending: PendingBuffer::new(&options.limits),
            open: None,
            hub: EventHub::new(),
            batch_depth: 0,
            changed: false,
            caller: options.caller,
            limits: options.limits,
            auto_transact: options.auto_transact,
        }
    }

    pub fn replica_id(&self) -> &ReplicaId {
        &self.replica
    }

    /// Snapshot of the applied-transactions ledger.
    pub fn vector_clock(&self) -> BTreeMap<ReplicaId, u64> {
        self.clock.snapshot()
    }

    pub fn lamport(&self) -> u64 {
        self.lamport.get()
    }

    /// Transactions currently held in the causal buffer.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    // ---- schema ----------------------------------------------------------

    /// Handle to the document root (a composite).
    pub fn root(&self) -> CollabHandle {
        CollabHandle {
            doc: self.doc_id,
            idx: CollabTree::ROOT,
        }
    }

    /// Register a primitive collab under the root.
    pub fn register<C: PrimitiveCollab>(&mut self, name: &str, state: C) -> Result<CollabHandle> {
        let root = self.root();
        self.register_child(&root, name, state)
    }

    /// Register a primitive collab under `parent`.
    pub fn register_child<C: PrimitiveCollab>(
        &mut self,
        parent: &CollabHandle,
        name: &str,
        state: C,
    ) -> Result<CollabHandle> {
        self.check_registration(parent, name)?;
        let idx = self
            .tree
            .register_primitive(parent.idx, name, Box::new(state))?;
        Ok(CollabHandle {
            doc: self.doc_id,
            idx,
        })
    }

    /// Register a composite (pure router) under `parent`.
    pub fn register_group(&mut self, parent: &CollabHandle, name: &str) -> Result<CollabHandle> {
        self.check_registration(parent, name)?;
        let idx = self.tree.register_composite(parent.idx, name)?;
        Ok(CollabHandle {
            doc: self.doc_id,
            idx,
        })
    }

    fn check_registration(&self, parent: &CollabHandle, name: &str) -> Result<()> {
        self.check_handle(parent)?;
        validate_label(name)?;
        let depth = self.tree.path_of(parent.idx).depth() + 1;
        if depth > self.limits.max_path_depth {
            return Err(crate::core::CoreError::from(InvalidPath::TooDeep {
                depth,
                max: self.limits.max_path_depth,
            })
            .into());
        }
        Ok(())
    }

    /// Replace a collab (and its subtree) with a terminal frozen
    /// placeholder. Remote ops addressed to it become silent no-ops;
    /// local ops fail fast. Used by dynamic collection types on delete.
    pub fn freeze(&mut self, handle: &CollabHandle) -> Result<()> {
        self.check_handle(handle)?;
        if handle.idx == CollabTree::ROOT {
            return Err(UsageError::NotAPrimitive {
                path: CollabId::root(),
            }
            .into());
        }
        self.tree.freeze(handle.idx);
        Ok(())
    }

    // ---- addressing ------------------------------------------------------

    pub fn id_of(&self, handle: &CollabHandle) -> Result<CollabId> {
        self.check_handle(handle)?;
        Ok(self.tree.path_of(handle.idx))
    }

    /// Resolve a replica-stable address. `None` when no collab ever
    /// existed at that path in this document's schema; a deleted dynamic
    /// child resolves to its frozen placeholder.
    pub fn from_id(&self, id: &CollabId) -> Option<CollabHandle> {
        self.tree.resolve(id.labels()).map(|idx| CollabHandle {
            doc: self.doc_id,
            idx,
        })
    }

    pub fn is_frozen(&self, handle: &CollabHandle) -> Result<bool> {
        self.check_handle(handle)?;
        Ok(self.tree.is_frozen(handle.idx))
    }

    /// Typed read access to a primitive's state.
    pub fn primitive<T: 'static>(&self, handle: &CollabHandle) -> Result<&T> {
        self.check_handle(handle)?;
        let path = self.tree.path_of(handle.idx);
        match self.tree.kind(handle.idx) {
            NodeKind::Primitive(state) => state
                .as_any()
                .downcast_ref::<T>()
                .ok_or_else(|| UsageError::TypeMismatch { path }.into()),
            NodeKind::Frozen => Err(UsageError::FrozenCollab { path }.into()),
            NodeKind::Composite { .. } => Err(UsageError::NotAPrimitive { path }.into()),
        }
    }

    fn check_handle(&self, handle: &CollabHandle) -> Result<()> {
        if handle.doc != self.doc_id {
            return Err(UsageError::ForeignHandle.into());
        }
        Ok(())
    }

    // ---- events ----------------------------------------------------------

    pub fn on_event(&mut self, handler: impl FnMut(&DocEvent) + 'static) -> SubscriptionId {
        self.hub.subscribe(Box::new(handler))
    }

    pub fn off_event(&mut self, id: SubscriptionId) -> bool {
        self.hub.unsubscribe(id)
    }

    /// Deliver remote updates inside `f` with one coalesced `Change` at
    /// the end of the outermost batch. `Update` events stay immediate.
    pub fn batch_remote_updates<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        self.batch_depth += 1;
        let result = f(self);
        self.batch_depth -= 1;
        if self.batch_depth == 0 {
            self.changed = false;
            self.hub.emit(&DocEvent::Change);
        }
        result
    }

    fn mark_changed(&mut self) {
        self.changed = true;
    }

    fn flush_change(&mut self) {
        if self.batch_depth == 0 && self.changed {
            self.changed = false;
            self.hub.emit(&DocEvent::Change);
        }
    }

    // ---- local transactions ---------------------------------------------

    /// Run `f` inside a transaction. All ops sent through the handle form
    /// one atomic unit: remote replicas apply all of them or none, and a
    /// single `Send` event carries the serialized transaction.
    ///
    /// There is no rollback: ops already sent when `f` errors have been
    /// echoed locally and are committed before the error is returned.
    pub fn transact<R>(&mut self, f: impl FnOnce(&mut TxnHandle<'_>) -> Result<R>) -> Result<R> {
        debug_assert!(self.open.is_none(), "transaction already open");
        let mut handle = TxnHandle { doc: self };
        let result = f(&mut handle);
        let committed = self.commit_open();
        match (result, committed) {
            (Ok(value), Ok(())) => Ok(value),
            (Err(err), _) => Err(err),
            (Ok(_), Err(err)) => Err(err),
        }
    }

    /// One-shot transaction for ops performed outside an explicit
    /// `transact`. Refused when disabled in [`DocOptions`].
    pub fn auto_transact<R>(
        &mut self,
        f: impl FnOnce(&mut TxnHandle<'_>) -> Result<R>,
    ) -> Result<R> {
        if !self.auto_transact {
            return Err(UsageError::AutoTransactDisabled.into());
        }
        self.transact(f)
    }

    pub(crate) fn send_local(
        &mut self,
        target: &CollabHandle,
        payload: Vec<u8>,
        request: MetadataRequest,
    ) -> Result<()> {
        self.check_handle(target)?;
        let idx = target.idx;
        match self.tree.kind(idx) {
            NodeKind::Primitive(_) => {}
            NodeKind::Frozen => {
                return Err(UsageError::FrozenCollab {
                    path: self.tree.path_of(idx),
                }
                .into())
            }
            NodeKind::Composite { .. } => {
                return Err(UsageError::NotAPrimitive {
                    path: self.tree.path_of(idx),
                }
                .into())
            }
        }

        if self.open.is_none() {
            let counter = self.clock.get(&self.replica) + 1;
            self.clock
                .advance(&self.replica, counter)
                .map_err(ApplyError::from)?;
            let mut vc_snapshot = self.clock.snapshot();
            vc_snapshot.remove(&self.replica);
            self.open = Some(OpenTxn {
                counter,
                vc_snapshot,
                used_keys: Default::default(),
                requested_keys: Default::default(),
                wall_ms: None,
                lamport: None,
                ops: Vec::new(),
            });
        }
        let open = self.open.as_mut().expect("transaction opened above");

        if request.wall_clock && open.wall_ms.is_none() {
            open.wall_ms = Some(WallClock::now().0);
        }
        if request.lamport && open.lamport.is_none() {
            open.lamport = Some(self.lamport.tick());
        }
        open.requested_keys.extend(request.vc_keys.iter().cloned());

        let meta = UpdateMeta {
            sender: self.replica.clone(),
            counter: open.counter,
            wall_ms: open.wall_ms,
            lamport: open.lamport,
            is_local_echo: true,
        };
        let path = self.tree.path_of(idx);

        // Validate before echoing so a wrapper producing a bad payload
        // leaves the collab untouched, same as on the remote side.
        self.tree
            .primitive(idx)
            .expect("target checked as primitive")
            .validate(&payload, &meta)
            .map_err(|source| ApplyError::Payload {
                sender: meta.sender.clone(),
                counter: meta.counter,
                path: path.clone(),
                source,
            })?;

        // Synchronous local echo: the sender observes its own op
        // immediately, and ledger reads made by the collab here select the
        // vector-clock entries that go on the wire.
        let mut ctx = CrdtContext::local_echo(&self.clock, &mut open.used_keys);
        let state = self
            .tree
            .primitive_mut(idx)
            .expect("target checked as primitive");
        state
            .receive(&payload, &meta, &mut ctx)
            .map_err(|source| ApplyError::Payload {
                sender: meta.sender.clone(),
                counter: meta.counter,
                path: path.clone(),
                source,
            })?;

        open.ops.push(WireOp {
            path: path.labels().to_vec(),
            payload: Bytes::from(payload),
        });
        Ok(())
    }

    fn commit_open(&mut self) -> Result<()> {
        let Some(open) = self.open.take() else {
            return Ok(());
        };
        if open.ops.is_empty() {
            return Ok(());
        }

        // Header clock: entries the collabs read during their own echo,
        // plus explicit requests. Zero entries carry no constraint and are
        // left off the wire; receivers read absent keys as 0.
        let mut vc = BTreeMap::new();
        for key in open.used_keys.into_iter().chain(open.requested_keys) {
            if key == self.replica {
                continue;
            }
            let counter = open.vc_snapshot.get(&key).copied().unwrap_or(0);
            if counter > 0 {
                vc.insert(key, counter);
            }
        }

        let op_count = open.ops.len();
        let txn = WireTxn {
            sender: self.replica.clone(),
            counter: open.counter,
            vc,
            maximal_vc_keys: None,
            wall_ms: open.wall_ms,
            lamport: open.lamport,
            ops: open.ops,
        };
        let bytes = Bytes::from(encode_txn(&txn)?);
        debug!(
            counter = txn.counter,
            ops = op_count,
            len = bytes.len(),
            "local transaction committed"
        );

        self.hub.emit(&DocEvent::Send {
            bytes: bytes.clone(),
        });
        self.hub.emit(&DocEvent::Update {
            kind: UpdateKind::Message,
            caller: self.caller.clone(),
        });
        self.mark_changed();
        self.flush_change();
        Ok(())
    }

    // ---- remote delivery -------------------------------------------------

    /// Feed one received transaction message. Duplicates are dropped
    /// silently; causally premature transactions are buffered; everything
    /// that becomes ready is applied before returning.
    pub fn receive(&mut self, bytes: &[u8], caller: Option<&CallerTag>) -> Result<ReceiveOutcome> {
        let txn = decode_txn(bytes, &self.limits)?;
        let raw = Bytes::copy_from_slice(bytes);
        let mut outcome = ReceiveOutcome::default();
        let result = self.deliver(txn, raw, caller, &mut outcome);
        self.flush_change();
        result.map(|()| outcome)
    }

    fn deliver(
        &mut self,
        txn: WireTxn,
        raw: Bytes,
        caller: Option<&CallerTag>,
        outcome: &mut ReceiveOutcome,
    ) -> Result<()> {
        let sender = txn.sender.clone();
        let counter = txn.counter;
        match self.pending.insert(txn, raw, &self.clock) {
            InsertOutcome::Duplicate => {
                trace!(%sender, counter, "duplicate transaction dropped");
                outcome.duplicates += 1;
            }
            InsertOutcome::Overflow => {
                return Err(ApplyError::PendingOverflow {
                    txns: self.pending.len(),
                    bytes: self.pending.bytes(),
                }
                .into())
            }
            InsertOutcome::Buffered => {}
        }

        while let Some(pending) = self.pending.take_ready(&self.clock) {
            self.apply_txn(pending.txn)?;
            outcome.applied += 1;
            self.hub.emit(&DocEvent::Update {
                kind: UpdateKind::Message,
                caller: caller.cloned(),
            });
            self.mark_changed();
        }
        outcome.buffered = self.pending.len();
        Ok(())
    }

    /// Apply one causally-ready transaction. Validation failures (unknown
    /// path or rejected payload) drop the whole transaction before any op
    /// lands, leaving the ledger and every collab unchanged; all replicas
    /// drop it identically.
    fn apply_txn(&mut self, txn: WireTxn) -> Result<()> {
        let meta = UpdateMeta {
            sender: txn.sender.clone(),
            counter: txn.counter,
            wall_ms: txn.wall_ms,
            lamport: txn.lamport,
            is_local_echo: false,
        };

        // Resolve and validate every op up front so a schema mismatch or
        // malformed payload rejects the transaction before any op is
        // applied. `None` marks a frozen target (deleted dynamic child):
        // the op is skipped, the rest applies.
        let mut targets: Vec<Option<NodeIdx>> = Vec::with_capacity(txn.ops.len());
        for op in &txn.ops {
            let Some(idx) = self.tree.resolve(&op.path) else {
                warn!(
                    sender = %txn.sender,
                    counter = txn.counter,
                    path = ?op.path,
                    "transaction dropped: unknown path"
                );
                return Err(ApplyError::UnknownPath {
                    sender: txn.sender.clone(),
                    counter: txn.counter,
                    path: CollabId::from_labels_unchecked(op.path.clone()),
                }
                .into());
            };
            match self.tree.kind(idx) {
                NodeKind::Primitive(state) => {
                    state
                        .validate(&op.payload, &meta)
                        .map_err(|source| {
                            warn!(
                                sender = %txn.sender,
                                counter = txn.counter,
                                path = ?op.path,
                                "transaction dropped: payload rejected"
                            );
                            ApplyError::Payload {
                                sender: txn.sender.clone(),
                                counter: txn.counter,
                                path: CollabId::from_labels_unchecked(op.path.clone()),
                                source,
                            }
                        })?;
                    targets.push(Some(idx));
                }
                NodeKind::Frozen => targets.push(None),
                NodeKind::Composite { .. } => {
                    return Err(ApplyError::UnknownPath {
                        sender: txn.sender.clone(),
                        counter: txn.counter,
                        path: CollabId::from_labels_unchecked(op.path.clone()),
                    }
                    .into())
                }
            }
        }

        for (op, target) in txn.ops.iter().zip(targets) {
            let Some(idx) = target else {
                trace!(path = ?op.path, "op to frozen collab skipped");
                continue;
            };
            let mut ctx = CrdtContext::remote(&txn.vc);
            let state = self
                .tree
                .primitive_mut(idx)
                .expect("target resolved as primitive");
            // Every payload passed validate above; a failure here is a
            // collab breaking the validate/receive contract.
            state
                .receive(&op.payload, &meta, &mut ctx)
                .map_err(|source| ApplyError::Payload {
                    sender: txn.sender.clone(),
                    counter: txn.counter,
                    path: CollabId::from_labels_unchecked(op.path.clone()),
                    source,
                })?;
        }

        self.clock
            .advance(&txn.sender, txn.counter)
            .map_err(ApplyError::from)?;
        if let Some(lamport) = txn.lamport {
            self.lamport.observe(lamport);
        }
        debug!(sender = %txn.sender, counter = txn.counter, "transaction applied");
        Ok(())
    }

    // ---- save / load -----------------------------------------------------

    /// Serialize the whole document: ledger, causal buffer, and the
    /// recursive collab tree. Deterministic for a given state.
    pub fn save(&self) -> Result<Bytes> {
        let doc = SavedDoc {
            vc: self.clock.snapshot(),
            lamport: self.lamport.get(),
            pending: self.pending.raw_entries().cloned().collect(),
            tree: self.tree.save_tree(),
        };
        Ok(Bytes::from(encode_saved(&doc)?))
    }

    /// Merge previously saved state. Permitted at any time; idempotent
    /// with respect to already-known causal history.
    pub fn load(&mut self, bytes: &[u8], caller: Option<&CallerTag>) -> Result<ReceiveOutcome> {
        let mut outcome = ReceiveOutcome::default();
        let result = self.load_inner(bytes, caller, &mut outcome);
        self.flush_change();
        result.map(|()| outcome)
    }

    fn load_inner(
        &mut self,
        bytes: &[u8],
        caller: Option<&CallerTag>,
        outcome: &mut ReceiveOutcome,
    ) -> Result<()> {
        let saved = decode_saved(bytes, &self.limits)?;

        // Parse the saved causal buffer before touching any state so a
        // malformed blob is rejected without side effects.
        let mut parsed = Vec::with_capacity(saved.pending.len());
        for raw in &saved.pending {
            parsed.push((decode_txn(raw, &self.limits)?, raw.clone()));
        }

        let meta = LoadMeta::new(self.clock.snapshot(), saved.vc.clone());
        self.tree.load_into(&saved.tree, &meta)?;
        self.clock.merge_max(&saved.vc);
        self.lamport.observe(saved.lamport);
        debug!(
            senders = saved.vc.len(),
            pending = parsed.len(),
            "saved state merged"
        );

        self.hub.emit(&DocEvent::Update {
            kind: UpdateKind::SavedState,
            caller: caller.cloned(),
        });
        self.mark_changed();

        for (txn, raw) in parsed {
            self.deliver(txn, raw, caller, outcome)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document")
            .field("replica", &self.replica)
            .field("clock", &self.clock)
            .field("pending", &self.pending.len())
            .field("batch_depth", &self.batch_depth)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::collab::PayloadError;
    use crate::types::Counter;
    use crate::Error;
    use std::any::Any;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn doc(replica: &str) -> Document {
        Document::new(DocOptions::default().with_replica_id(ReplicaId::parse(replica).unwrap()))
    }

    fn capture_events(doc: &mut Document) -> Rc<RefCell<Vec<DocEvent>>> {
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = log.clone();
        doc.on_event(move |event| sink.borrow_mut().push(event.clone()));
        log
    }

    fn sent_bytes(log: &Rc<RefCell<Vec<DocEvent>>>) -> Vec<Bytes> {
        log.borrow()
            .iter()
            .filter_map(|event| match event {
                DocEvent::Send { bytes } => Some(bytes.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn self_echo_is_visible_inside_the_transaction() {
        let mut doc = doc("aaa");
        let counter = Counter::register(&mut doc, "hits").unwrap();
        doc.transact(|tx| {
            counter.add(tx, 3)?;
            assert_eq!(counter.value(tx.doc())?, 3);
            counter.add(tx, 2)?;
            assert_eq!(counter.value(tx.doc())?, 5);
            Ok(())
        })
        .unwrap();
        assert_eq!(counter.value(&doc).unwrap(), 5);
        assert_eq!(doc.vector_clock().get(&ReplicaId::parse("aaa").unwrap()), Some(&1));
    }

    #[test]
    fn commit_emits_send_update_change_in_order() {
        let mut doc = doc("aaa");
        let counter = Counter::register(&mut doc, "hits").unwrap();
        let log = capture_events(&mut doc);

        doc.transact(|tx| counter.add(tx, 1)).unwrap();

        let events = log.borrow();
        assert_eq!(events.len(), 3);
        assert!(matches!(events[0], DocEvent::Send { .. }));
        assert!(matches!(
            events[1],
            DocEvent::Update {
                kind: UpdateKind::Message,
                ..
            }
        ));
        assert!(matches!(events[2], DocEvent::Change));
    }

    #[test]
    fn empty_transaction_emits_nothing_and_consumes_no_counter() {
        let mut doc = doc("aaa");
        let log = capture_events(&mut doc);
        doc.transact(|_tx| Ok(())).unwrap();
        assert!(log.borrow().is_empty());
        assert!(doc.vector_clock().is_empty());
    }

    #[test]
    fn one_transaction_is_one_send_message() {
        let mut a = doc("aaa");
        let counter = Counter::register(&mut a, "hits").unwrap();
        let log = capture_events(&mut a);
        a.transact(|tx| {
            counter.add(tx, 1)?;
            counter.add(tx, 2)?;
            counter.add(tx, 3)
        })
        .unwrap();

        let sent = sent_bytes(&log);
        assert_eq!(sent.len(), 1);
        let txn = decode_txn(&sent[0], &Limits::default()).unwrap();
        assert_eq!(txn.ops.len(), 3);
        assert_eq!(txn.counter, 1);
    }

    #[test]
    fn foreign_handles_are_rejected() {
        let mut a = doc("aaa");
        let mut b = doc("bbb");
        let counter = Counter::register(&mut a, "hits").unwrap();
        let err = b
            .transact(|tx| counter.add(tx, 1))
            .unwrap_err();
        assert!(matches!(err, Error::Usage(UsageError::ForeignHandle)));
    }

    #[test]
    fn duplicate_child_name_fails_fast() {
        let mut doc = doc("aaa");
        Counter::register(&mut doc, "hits").unwrap();
        let err = Counter::register(&mut doc, "hits").unwrap_err();
        assert!(matches!(
            err,
            Error::Usage(UsageError::DuplicateChild { .. })
        ));
    }

    #[test]
    fn local_op_on_frozen_collab_fails_fast() {
        let mut doc = doc("aaa");
        let counter = Counter::register(&mut doc, "hits").unwrap();
        doc.freeze(counter.handle()).unwrap();
        assert!(doc.is_frozen(counter.handle()).unwrap());

        let err = doc.transact(|tx| counter.add(tx, 1)).unwrap_err();
        assert!(matches!(err, Error::Usage(UsageError::FrozenCollab { .. })));
    }

    #[test]
    fn auto_transact_respects_configuration() {
        let mut doc = Document::new(
            DocOptions::default()
                .with_replica_id(ReplicaId::parse("aaa").unwrap())
                .without_auto_transact(),
        );
        let counter = Counter::register(&mut doc, "hits").unwrap();
        let err = doc.auto_transact(|tx| counter.add(tx, 1)).unwrap_err();
        assert!(matches!(
            err,
            Error::Usage(UsageError::AutoTransactDisabled)
        ));

        let mut doc = self::doc("bbb");
        let counter = Counter::register(&mut doc, "hits").unwrap();
        doc.auto_transact(|tx| counter.add(tx, 1)).unwrap();
        assert_eq!(counter.value(&doc).unwrap(), 1);
    }

    #[test]
    fn addressing_round_trips_and_tolerates_unknown_paths() {
        let mut doc = doc("aaa");
        let group = doc.register_group(&doc.root(), "meta").unwrap();
        let counter = Counter::register_in(&mut doc, &group, "hits").unwrap();

        let id = doc.id_of(counter.handle()).unwrap();
        assert_eq!(id.to_string(), "/meta/hits");
        assert_eq!(doc.from_id(&id), Some(*counter.handle()));

        let missing = CollabId::from_labels(["never", "existed"]).unwrap();
        assert_eq!(doc.from_id(&missing), None);
    }

    /// Probe collab: reads another sender's clock entry during its echo so
    /// the header must carry it.
    struct ClockProbe {
        watch: ReplicaId,
        last_seen: u64,
    }

    impl super::PrimitiveCollab for ClockProbe {
        fn validate(
            &self,
            _payload: &[u8],
            _meta: &UpdateMeta,
        ) -> std::result::Result<(), PayloadError> {
            Ok(())
        }

        fn receive(
            &mut self,
            _payload: &[u8],
            _meta: &UpdateMeta,
            ctx: &mut CrdtContext<'_>,
        ) -> std::result::Result<(), PayloadError> {
            self.last_seen = ctx.clock(&self.watch);
            Ok(())
        }

        fn save(&self) -> Option<Vec<u8>> {
            None
        }

        fn load(
            &mut self,
            _saved: Option<&[u8]>,
            _meta: &LoadMeta,
        ) -> std::result::Result<(), PayloadError> {
            Ok(())
        }

        fn as_any(&self) -> &dyn Any {
            self
        }

        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
    }

    #[test]
    fn header_carries_exactly_the_read_clock_entries() {
        let bbb = ReplicaId::parse("bbb").unwrap();

        // Seed aaa's ledger with one applied tx from bbb.
        let mut b = doc("bbb");
        let b_counter = Counter::register(&mut b, "hits").unwrap();
        let b_log = capture_events(&mut b);
        b.transact(|tx| b_counter.add(tx, 1)).unwrap();

        let mut a = doc("aaa");
        Counter::register(&mut a, "hits").unwrap();
        a.register(
            "probe",
            ClockProbe {
                watch: bbb.clone(),
                last_seen: 0,
            },
        )
        .unwrap();
        a.receive(&sent_bytes(&b_log)[0], None).unwrap();

        let a_log = capture_events(&mut a);
        let probe_handle = a.from_id(&CollabId::from_labels(["probe"]).unwrap()).unwrap();
        a.transact(|tx| tx.send(&probe_handle, vec![0], MetadataRequest::none()))
            .unwrap();

        let sent = sent_bytes(&a_log);
        let txn = decode_txn(&sent[0], &Limits::default()).unwrap();
        // The probe read bbb's entry, so it must be on the wire.
        assert_eq!(txn.vc.get(&bbb), Some(&1));
        assert_eq!(a.primitive::<ClockProbe>(&probe_handle).unwrap().last_seen, 1);

        // A counter op reads nothing, so its header clock stays empty.
        let c = Counter::register(&mut a, "other").unwrap();
        let a_log2 = capture_events(&mut a);
        a.transact(|tx| c.add(tx, 1)).unwrap();
        let txn = decode_txn(&sent_bytes(&a_log2)[0], &Limits::default()).unwrap();
        assert!(txn.vc.is_empty());
    }

    #[test]
    fn explicitly_requested_keys_ride_along() {
        let bbb = ReplicaId::parse("bbb").unwrap();

        let mut b = doc("bbb");
        let b_counter = Counter::register(&mut b, "hits").unwrap();
        let b_log = capture_events(&mut b);
        b.transact(|tx| b_counter.add(tx, 1)).unwrap();

        let mut a = doc("aaa");
        let a_counter = Counter::register(&mut a, "hits").unwrap();
        a.receive(&sent_bytes(&b_log)[0], None).unwrap();

        let a_log = capture_events(&mut a);
        a.transact(|tx| {
            tx.send(
                a_counter.handle(),
                minicbor::to_vec(2i64).unwrap(),
                MetadataRequest::none().with_vc_key(bbb.clone()),
            )
        })
        .unwrap();

        let txn = decode_txn(&sent_bytes(&a_log)[0], &Limits::default()).unwrap();
        assert_eq!(txn.vc.get(&bbb), Some(&1));
    }
}
