//! Last-writer-wins register.
//!
//! Conflict resolution is (wall-clock ms, sender id) lexicographic: higher
//! wall time wins, sender id breaks ties. Same-sender same-millisecond
//! writes fall back to apply order, which for one sender is causal order.

use std::any::Any;
use std::marker::PhantomData;

use minicbor::{Decode, Decoder, Encode, Encoder};

use crate::core::{LoadMeta, MetadataRequest, ReplicaId, UpdateMeta};
use crate::runtime::{CollabHandle, CrdtContext, Document, PayloadError, PrimitiveCollab};
use crate::wire::EncodeError;
use crate::{Result, TxnHandle};

/// Typed reference to a registered register.
#[derive(Debug)]
pub struct LwwRegister<T> {
    handle: CollabHandle,
    _marker: PhantomData<fn() -> T>,
}

// Manual impls: the reference is Copy regardless of `T`.
impl<T> Clone for LwwRegister<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for LwwRegister<T> {}

impl<T> LwwRegister<T>
where
    T: Clone + Encode<()> + for<'b> Decode<'b, ()> + 'static,
{
    /// Register an empty register under the document root.
    pub fn register(doc: &mut Document, name: &str) -> Result<Self> {
        let handle = doc.register(name, LwwState::<T>::default())?;
        Ok(Self {
            handle,
            _marker: PhantomData,
        })
    }

    /// Register an empty register under `parent`.
    pub fn register_in(
        doc: &mut Document,
        parent: &CollabHandle,
        name: &str,
    ) -> Result<Self> {
        let handle = doc.register_child(parent, name, LwwState::<T>::default())?;
        Ok(Self {
            handle,
            _marker: PhantomData,
        })
    }

    pub fn set(&self, tx: &mut TxnHandle<'_>, value: T) -> Result<()> {
        let payload = minicbor::to_vec(&value).map_err(EncodeError::from)?;
        tx.send(
            &self.handle,
            payload,
            MetadataRequest::none().with_wall_clock(),
        )
    }

    pub fn get(&self, doc: &Document) -> Result<Option<T>> {
        Ok(doc
            .primitive::<LwwState<T>>(&self.handle)?
            .slot
            .as_ref()
            .map(|slot| slot.value.clone()))
    }

    pub fn handle(&self) -> &CollabHandle {
        &self.handle
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct LwwSlot<T> {
    value: T,
    wall_ms: u64,
    by: ReplicaId,
}

/// The register's collab state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LwwState<T> {
    slot: Option<LwwSlot<T>>,
}

impl<T> Default for LwwState<T> {
    fn default() -> Self {
        Self { slot: None }
    }
}

impl<T> LwwState<T> {
    /// Incoming beats current on strictly greater (wall, by); equality
    /// means same sender and same millisecond, where the later apply is
    /// the causally later write.
    fn incoming_wins(&self, wall_ms: u64, by: &ReplicaId) -> bool {
        match &self.slot {
            None => true,
            Some(slot) => (wall_ms, by) >= (slot.wall_ms, &slot.by),
        }
    }
}

fn decode_value<T>(payload: &[u8]) -> std::result::Result<T, PayloadError>
where
    T: for<'b> Decode<'b, ()>,
{
    minicbor::decode(payload).map_err(|e| PayloadError::new(format!("register value: {e}")))
}

impl<T> PrimitiveCollab for LwwState<T>
where
    T: Clone + Encode<()> + for<'b> Decode<'b, ()> + 'static,
{
    fn validate(&self, payload: &[u8], _meta: &UpdateMeta) -> std::result::Result<(), PayloadError> {
        decode_value::<T>(payload).map(|_| ())
    }

    fn receive(
        &mut self,
        payload: &[u8],
        meta: &UpdateMeta,
        _ctx: &mut CrdtContext<'_>,
    ) -> std::result::Result<(), PayloadError> {
        let value: T = decode_value(payload)?;
        // Absent wall time reads as 0 ("possibly incorrect 0" contract);
        // such writes lose to any stamped write.
        let wall_ms = meta.wall_ms.unwrap_or(0);
        if self.incoming_wins(wall_ms, &meta.sender) {
            self.slot = Some(LwwSlot {
                value,
                wall_ms,
                by: meta.sender.clone(),
            });
        }
        Ok(())
    }

    fn save(&self) -> Option<Vec<u8>> {
        let slot = self.slot.as_ref()?;
        let mut buf = Vec::new();
        let mut enc = Encoder::new(&mut buf);
        enc.array(3)
            .and_then(|e| e.encode(&slot.value))
            .and_then(|e| e.u64(slot.wall_ms))
            .and_then(|e| e.str(slot.by.as_str()))
            .expect("vec-backed cbor encode cannot fail");
        Some(buf)
    }

    fn load(&mut self, saved: Option<&[u8]>, _meta: &LoadMeta) -> std::result::Result<(), PayloadError> {
        let Some(bytes) = saved else {
            // Saver held an empty register; any local write outranks it.
            return Ok(());
        };
        let mut dec = Decoder::new(bytes);
        let len = dec
            .array()
            .map_err(|e| PayloadError::new(format!("register state: {e}")))?;
        if len != Some(3) {
            return Err(PayloadError::new("register state: expected 3-tuple"));
        }
        let value: T = dec
            .decode()
            .map_err(|e| PayloadError::new(format!("register state value: {e}")))?;
        let wall_ms = dec
            .u64()
            .map_err(|e| PayloadError::new(format!("register state stamp: {e}")))?;
        let by = ReplicaId::parse(
            dec.str()
                .map_err(|e| PayloadError::new(format!("register state sender: {e}")))?,
        )
        .map_err(|e| PayloadError::new(format!("register state sender: {e}")))?;

        // Stamp comparison is convergent on its own; the clocks in `_meta`
        // are not needed to pick a winner.
        if self.incoming_wins(wall_ms, &by) {
            self.slot = Some(LwwSlot { value, wall_ms, by });
        }
        Ok(())
    }

    fn can_gc(&self) -> bool {
        self.slot.is_none()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
