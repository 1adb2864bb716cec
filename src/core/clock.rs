//! Layer 2: Applied-transaction vector clock and Lamport tracking.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::identity::ReplicaId;

/// The ledger of applied transactions: `sender -> highest counter applied`.
///
/// Absent senders read as 0. Applying a transaction advances its sender's
/// entry by exactly one; gaps are a logic error and are rejected.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VectorClock {
    entries: BTreeMap<ReplicaId, u64>,
}

impl VectorClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Highest applied counter for `sender` (0 when never seen).
    pub fn get(&self, sender: &ReplicaId) -> u64 {
        self.entries.get(sender).copied().unwrap_or(0)
    }

    /// Record that `sender`'s transaction `counter` was applied.
    ///
    /// Precondition: `counter == get(sender) + 1`.
    pub fn advance(&mut self, sender: &ReplicaId, counter: u64) -> Result<(), ClockError> {
        let current = self.get(sender);
        if counter != current + 1 {
            return Err(ClockError::NonContiguous {
                sender: sender.clone(),
                expected: current + 1,
                got: counter,
            });
        }
        self.entries.insert(sender.clone(), counter);
        Ok(())
    }

    /// Immutable snapshot of all entries.
    pub fn snapshot(&self) -> BTreeMap<ReplicaId, u64> {
        self.entries.clone()
    }

    /// Element-wise max merge. Only used while loading saved state.
    pub fn merge_max(&mut self, other: &BTreeMap<ReplicaId, u64>) {
        for (sender, counter) in other {
            let entry = self.entries.entry(sender.clone()).or_insert(0);
            if *counter > *entry {
                *entry = *counter;
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ReplicaId, u64)> {
        self.entries.iter().map(|(k, v)| (k, *v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ClockError {
    #[error("expected contiguous counter {expected} for {sender}, got {got}")]
    NonContiguous {
        sender: ReplicaId,
        expected: u64,
        got: u64,
    },
}

/// Document-scoped Lamport counter.
///
/// Observes every timestamp the document sees (headers, loaded state) and
/// ticks past the maximum when a local transaction requests one.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Lamport(u64);

impl Lamport {
    pub fn get(self) -> u64 {
        self.0
    }

    pub fn observe(&mut self, seen: u64) {
        if seen > self.0 {
            self.0 = seen;
        }
    }

    pub fn tick(&mut self) -> u64 {
        self.0 += 1;
        self.0
    }
}
