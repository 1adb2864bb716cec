//! Op-based counter: per-sender contribution totals.
//!
//! Exactly-once causal delivery makes a plain running sum convergent; the
//! per-sender breakdown exists so load can merge two histories by taking,
//! for each sender, whichever side's vector clock is ahead.

use std::any::Any;
use std::collections::{BTreeMap, BTreeSet};

use minicbor::{Decoder, Encoder};

use crate::core::{LoadMeta, MetadataRequest, ReplicaId, UpdateMeta};
use crate::runtime::{CollabHandle, CrdtContext, Document, PayloadError, PrimitiveCollab};
use crate::{Result, TxnHandle};

/// Typed reference to a registered counter.
#[derive(Clone, Copy, Debug)]
pub struct Counter {
    handle: CollabHandle,
}

impl Counter {
    /// Register a counter under the document root.
    pub fn register(doc: &mut Document, name: &str) -> Result<Self> {
        let handle = doc.register(name, CounterState::default())?;
        Ok(Self { handle })
    }

    /// Register a counter under `parent`.
    pub fn register_in(
        doc: &mut Document,
        parent: &CollabHandle,
        name: &str,
    ) -> Result<Self> {
        let handle = doc.register_child(parent, name, CounterState::default())?;
        Ok(Self { handle })
    }

    pub fn add(&self, tx: &mut TxnHandle<'_>, delta: i64) -> Result<()> {
        let mut payload = Vec::new();
        Encoder::new(&mut payload)
            .i64(delta)
            .expect("vec-backed cbor encode cannot fail");
        tx.send(&self.handle, payload, MetadataRequest::none())
    }

    pub fn value(&self, doc: &Document) -> Result<i64> {
        Ok(doc.primitive::<CounterState>(&self.handle)?.total())
    }

    pub fn handle(&self) -> &CollabHandle {
        &self.handle
    }
}

/// The counter's collab state.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CounterState {
    contributions: BTreeMap<ReplicaId, i64>,
}

impl CounterState {
    pub fn total(&self) -> i64 {
        self.contributions.values().sum()
    }
}

impl PrimitiveCollab for CounterState {
    fn validate(&self, payload: &[u8], _meta: &UpdateMeta) -> std::result::Result<(), PayloadError> {
        decode_delta(payload).map(|_| ())
    }

    fn receive(
        &mut self,
        payload: &[u8],
        meta: &UpdateMeta,
        _ctx: &mut CrdtContext<'_>,
    ) -> std::result::Result<(), PayloadError> {
        let delta = decode_delta(payload)?;
        *self.contributions.entry(meta.sender.clone()).or_insert(0) += delta;
        Ok(())
    }

    fn save(&self) -> Option<Vec<u8>> {
        if self.contributions.is_empty() {
            return None;
        }
        let mut buf = Vec::new();
        let mut enc = Encoder::new(&mut buf);
        enc.map(self.contributions.len() as u64)
            .expect("vec-backed cbor encode cannot fail");
        for (sender, total) in &self.contributions {
            enc.str(sender.as_str())
                .and_then(|enc| enc.i64(*total))
                .expect("vec-backed cbor encode cannot fail");
        }
        Some(buf)
    }

    fn load(&mut self, saved: Option<&[u8]>, meta: &LoadMeta) -> std::result::Result<(), PayloadError> {
        let loaded = match saved {
            Some(bytes) => decode_contributions(bytes)?,
            None => BTreeMap::new(),
        };

        // Per sender, the side whose clock is ahead holds the superset of
        // that sender's ops; adopt its contribution wholesale.
        let mut senders: BTreeSet<ReplicaId> = self.contributions.keys().cloned().collect();
        senders.extend(loaded.keys().cloned());
        for sender in senders {
            if meta.loaded(&sender) > meta.local(&sender) {
                match loaded.get(&sender) {
                    Some(total) => {
                        self.contributions.insert(sender, *total);
                    }
                    None => {
                        self.contributions.remove(&sender);
                    }
                }
            }
        }
        Ok(())
    }

    fn can_gc(&self) -> bool {
        self.contributions.is_empty()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

fn decode_delta(payload: &[u8]) -> std::result::Result<i64, PayloadError> {
    Decoder::new(payload)
        .i64()
        .map_err(|e| PayloadError::new(format!("counter delta: {e}")))
}

fn decode_contributions(bytes: &[u8]) -> std::result::Result<BTreeMap<ReplicaId, i64>, PayloadError> {
    let mut dec = Decoder::new(bytes);
    let len = dec
        .map()
        .map_err(|e| PayloadError::new(format!("counter state: {e}")))?
        .ok_or_else(|| PayloadError::new("counter state: indefinite map"))?;
    let mut out = BTreeMap::new();
    for _ in 0..len {
        let raw = dec
            .str()
            .map_err(|e| PayloadError::new(format!("counter state key: {e}")))?;
        let sender = ReplicaId::parse(raw)
            .map_err(|e| PayloadError::new(format!("counter state key: {e}")))?;
        let total = dec
            .i64()
            .map_err(|e| PayloadError::new(format!("counter state value: {e}")))?;
        out.insert(sender, total);
    }
    Ok(out)
}
