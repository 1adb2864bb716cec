//! Causal buffering: hold remote transactions until ready.
//!
//! Entries are keyed `(sender, counter)`; the `BTreeMap` key order is the
//! frozen tie-break when several transactions are ready at once (ascending
//! sender, then counter). Callers must not depend on that order for
//! correctness - only event determinism rests on it.

use std::collections::BTreeMap;

use bytes::Bytes;

use crate::core::{Limits, ReplicaId, VectorClock};
use crate::wire::WireTxn;

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) struct TxnKey {
    pub sender: ReplicaId,
    pub counter: u64,
}

/// A received, not-yet-applied transaction: parsed header plus the raw
/// bytes it arrived as (kept verbatim for save output).
#[derive(Clone, Debug)]
pub(crate) struct PendingTxn {
    pub txn: WireTxn,
    pub raw: Bytes,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum InsertOutcome {
    Buffered,
    Duplicate,
    Overflow,
}

pub(crate) struct PendingBuffer {
    entries: BTreeMap<TxnKey, PendingTxn>,
    bytes: usize,
    max_txns: usize,
    max_bytes: usize,
}

impl PendingBuffer {
    pub(crate) fn new(limits: &Limits) -> Self {
        Self {
            entries: BTreeMap::new(),
            bytes: 0,
            max_txns: limits.max_pending_txns,
            max_bytes: limits.max_pending_bytes,
        }
    }

    /// True when `txn` may be applied at a replica whose ledger is `clock`.
    pub(crate) fn is_ready(clock: &VectorClock, txn: &WireTxn) -> bool {
        if clock.get(&txn.sender) + 1 != txn.counter {
            return false;
        }
        txn.vc
            .iter()
            .all(|(sender, counter)| sender == &txn.sender || clock.get(sender) >= *counter)
    }

    pub(crate) fn insert(
        &mut self,
        txn: WireTxn,
        raw: Bytes,
        applied: &VectorClock,
    ) -> InsertOutcome {
        if txn.counter <= applied.get(&txn.sender) {
            return InsertOutcome::Duplicate;
        }
        let key = TxnKey {
            sender: txn.sender.clone(),
            counter: txn.counter,
        };
        if self.entries.contains_key(&key) {
            return InsertOutcome::Duplicate;
        }
        if self.entries.len() >= self.max_txns || self.bytes + raw.len() > self.max_bytes {
            return InsertOutcome::Overflow;
        }
        self.bytes += raw.len();
        self.entries.insert(key, PendingTxn { txn, raw });
        InsertOutcome::Buffered
    }

    /// Remove and return the first ready transaction in key order.
    pub(crate) fn take_ready(&mut self, clock: &VectorClock) -> Option<PendingTxn> {
        let key = self
            .entries
            .iter()
            .find(|(_, pending)| Self::is_ready(clock, &pending.txn))
            .map(|(key, _)| key.clone())?;
        let pending = self.entries.remove(&key)?;
        self.bytes = self.bytes.saturating_sub(pending.raw.len());
        Some(pending)
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn bytes(&self) -> usize {
        self.bytes
    }

    /// Raw bytes of every held transaction, in key order.
    pub(crate) fn raw_entries(&self) -> impl Iterator<Item = &Bytes> {
        self.entries.values().map(|pending| &pending.raw)
    }
}
