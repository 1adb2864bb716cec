//! Shared multi-replica test harness: documents with pinned replica ids,
//! event capture, and a byte pump standing in for a transport.

#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;

use bytes::Bytes;
use weft::{DocEvent, DocOptions, Document, ReplicaId};

pub fn doc(replica: &str) -> Document {
    Document::new(
        DocOptions::default()
            .with_replica_id(ReplicaId::parse(replica).expect("valid test replica id")),
    )
}

pub fn rid(s: &str) -> ReplicaId {
    ReplicaId::parse(s).expect("valid test replica id")
}

pub type EventLog = Rc<RefCell<Vec<DocEvent>>>;

pub fn capture(doc: &mut Document) -> EventLog {
    let log: EventLog = Rc::new(RefCell::new(Vec::new()));
    let sink = log.clone();
    doc.on_event(move |event| sink.borrow_mut().push(event.clone()));
    log
}

pub fn sends(log: &EventLog) -> Vec<Bytes> {
    log.borrow()
        .iter()
        .filter_map(|event| match event {
            DocEvent::Send { bytes } => Some(bytes.clone()),
            _ => None,
        })
        .collect()
}

pub fn change_count(log: &EventLog) -> usize {
    log.borrow()
        .iter()
        .filter(|event| matches!(event, DocEvent::Change))
        .count()
}

pub fn update_count(log: &EventLog) -> usize {
    log.borrow()
        .iter()
        .filter(|event| matches!(event, DocEvent::Update { .. }))
        .count()
}

/// Deliver every Send recorded in `log` past `cursor` into `to`,
/// advancing the cursor. Panics on delivery errors: the harness only
/// pumps well-formed traffic.
pub fn pump(log: &EventLog, cursor: &mut usize, to: &mut Document) {
    let bytes = sends(log);
    while *cursor < bytes.len() {
        to.receive(&bytes[*cursor], None).expect("pump delivery");
        *cursor += 1;
    }
}
