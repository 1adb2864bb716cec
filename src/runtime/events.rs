//! Document events and the handler hub.
//!
//! Emission is synchronous. Handler-list mutation during emission is
//! deferred until the emit finishes, so handlers may subscribe and
//! unsubscribe from inside a callback.

use std::fmt;

use bytes::Bytes;

use crate::core::CallerTag;

/// What kind of update was applied to the document.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpdateKind {
    /// A transaction message (local commit or remote delivery).
    Message,
    /// A saved-state blob passed to `load`.
    SavedState,
}

/// Document-level events.
#[derive(Clone, Debug)]
pub enum DocEvent {
    /// A committed local transaction's serialized bytes, ready to
    /// broadcast to other replicas.
    Send { bytes: Bytes },
    /// An update was applied; `caller` is the tag the provider passed in.
    Update {
        kind: UpdateKind,
        caller: Option<CallerTag>,
    },
    /// Something changed; refresh derived views. Coalesced per batch.
    Change,
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct SubscriptionId(u64);

type Handler = Box<dyn FnMut(&DocEvent)>;

pub(crate) struct EventHub {
    handlers: Vec<(SubscriptionId, Handler)>,
    next_id: u64,
    emitting: bool,
    pending_add: Vec<(SubscriptionId, Handler)>,
    pending_remove: Vec<SubscriptionId>,
}

impl EventHub {
    pub(crate) fn new() -> Self {
        Self {
            handlers: Vec::new(),
            next_id: 0,
            emitting: false,
            pending_add: Vec::new(),
            pending_remove: Vec::new(),
        }
    }

    pub(crate) fn subscribe(&mut self, handler: Handler) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        if self.emitting {
            self.pending_add.push((id, handler));
        } else {
            self.handlers.push((id, handler));
        }
        id
    }

    pub(crate) fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        if self.emitting {
            let known = self.handlers.iter().any(|(h, _)| *h == id)
                || self.pending_add.iter().any(|(h, _)| *h == id);
            if known {
                self.pending_remove.push(id);
            }
            return known;
        }
        let before = self.handlers.len();
        self.handlers.retain(|(h, _)| *h != id);
        before != self.handlers.len()
    }

    pub(crate) fn emit(&mut self, event: &DocEvent) {
        self.emitting = true;
        for (_, handler) in self.handlers.iter_mut() {
            handler(event);
        }
        self.emitting = false;

        if !self.pending_add.is_empty() {
            self.handlers.append(&mut self.pending_add);
        }
        if !self.pending_remove.is_empty() {
            let remove = std::mem::take(&mut self.pending_remove);
            self.handlers.retain(|(h, _)| !remove.contains(h));
        }
    }
}

impl fmt::Debug for EventHub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventHub")
            .field("handlers", &self.handlers.len())
            .field("emitting", &self.emitting)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn emit_reaches_all_handlers() {
        let mut hub = EventHub::new();
        let count = Rc::new(Cell::new(0));
        for _ in 0..3 {
            let count = count.clone();
            hub.subscribe(Box::new(move |_| count.set(count.get() + 1)));
        }
        hub.emit(&DocEvent::Change);
        assert_eq!(count.get(), 3);
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let mut hub = EventHub::new();
        let count = Rc::new(Cell::new(0));
        let id = {
            let count = count.clone();
            hub.subscribe(Box::new(move |_| count.set(count.get() + 1)))
        };
        assert!(hub.unsubscribe(id));
        assert!(!hub.unsubscribe(id));
        hub.emit(&DocEvent::Change);
        assert_eq!(count.get(), 0);
    }

    #[test]
    fn subscribe_while_emitting_is_deferred() {
        // A subscription made mid-emit must not run for the event being
        // emitted; it joins the handler list once the emit finishes.
        let mut hub = EventHub::new();
        let count = Rc::new(Cell::new(0));

        hub.emitting = true;
        {
            let count = count.clone();
            hub.subscribe(Box::new(move |_| count.set(count.get() + 1)));
        }
        hub.emitting = false;

        hub.emit(&DocEvent::Change);
        hub.emit(&DocEvent::Change);
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn unsubscribe_while_emitting_is_deferred() {
        let mut hub = EventHub::new();
        let count = Rc::new(Cell::new(0));
        let id = {
            let count = count.clone();
            hub.subscribe(Box::new(move |_| count.set(count.get() + 1)))
        };

        hub.emitting = true;
        assert!(hub.unsubscribe(id));
        hub.emitting = false;

        hub.emit(&DocEvent::Change);
        // First emit still saw the handler; removal lands afterwards.
        hub.emit(&DocEvent::Change);
        assert_eq!(count.get(), 1);
    }
}
