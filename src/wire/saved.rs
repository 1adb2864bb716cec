//! Saved-state wire schema and CBOR encoding.
//!
//! A saved document is the sender-side vector clock, the raw bytes of the
//! still-pending causal buffer, and the recursive tree of per-collab
//! serializations. Inner `self` bytes are opaque to the runtime.

use std::collections::BTreeMap;

use bytes::Bytes;
use minicbor::{Decoder, Encoder};

use crate::core::{Limits, ReplicaId};

use super::cbor::{
    decode_array_len, decode_bytes, decode_map_len, decode_text, decode_u32, decode_u64,
    require_end, skip_value,
};
use super::{DecodeError, EncodeError, WIRE_VERSION};

/// Recursive per-collab state: optional own bytes plus named children.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SavedTree {
    pub self_bytes: Option<Bytes>,
    pub children: BTreeMap<String, SavedTree>,
}

/// Top-level saved document.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SavedDoc {
    pub vc: BTreeMap<ReplicaId, u64>,
    pub lamport: u64,
    pub pending: Vec<Bytes>,
    pub tree: SavedTree,
}

pub fn encode_saved(doc: &SavedDoc) -> Result<Vec<u8>, EncodeError> {
    let mut buf = Vec::new();
    let mut enc = Encoder::new(&mut buf);

    enc.map(5)?;
    enc.str("v")?;
    enc.u32(WIRE_VERSION)?;

    enc.str("vc")?;
    enc.map(doc.vc.len() as u64)?;
    for (sender, counter) in &doc.vc {
        enc.str(sender.as_str())?;
        enc.u64(*counter)?;
    }

    enc.str("lamport")?;
    enc.u64(doc.lamport)?;

    enc.str("pending")?;
    enc.array(doc.pending.len() as u64)?;
    for raw in &doc.pending {
        enc.bytes(raw.as_ref())?;
    }

    enc.str("tree")?;
    encode_tree(&mut enc, &doc.tree)?;

    Ok(buf)
}

fn encode_tree(enc: &mut Encoder<&mut Vec<u8>>, tree: &SavedTree) -> Result<(), EncodeError> {
    let mut len = 1;
    if tree.self_bytes.is_some() {
        len += 1;
    }
    enc.map(len)?;
    if let Some(bytes) = &tree.self_bytes {
        enc.str("self")?;
        enc.bytes(bytes.as_ref())?;
    }
    enc.str("children")?;
    enc.map(tree.children.len() as u64)?;
    for (name, child) in &tree.children {
        enc.str(name)?;
        encode_tree(enc, child)?;
    }
    Ok(())
}

pub fn decode_saved(bytes: &[u8], limits: &Limits) -> Result<SavedDoc, DecodeError> {
    if bytes.len() > limits.max_saved_state_bytes {
        return Err(DecodeError::DecodeLimit("saved state bytes"));
    }
    let mut dec = Decoder::new(bytes);
    let map_len = decode_map_len(&mut dec, limits, 0)?;

    let mut version = None;
    let mut vc = None;
    let mut lamport = None;
    let mut pending = None;
    let mut tree = None;

    for _ in 0..map_len {
        let key = decode_text(&mut dec, limits)?;
        match key {
            "v" => version = Some(decode_u32(&mut dec, "v")?),
            "vc" => vc = Some(decode_vc(&mut dec, limits)?),
            "lamport" => lamport = Some(decode_u64(&mut dec, "lamport")?),
            "pending" => {
                let len = decode_array_len(&mut dec, limits, 1)?;
                let mut entries = Vec::with_capacity(len as usize);
                for _ in 0..len {
                    entries.push(Bytes::copy_from_slice(decode_bytes(&mut dec, limits)?));
                }
                pending = Some(entries);
            }
            "tree" => tree = Some(decode_tree(&mut dec, limits, 0)?),
            _ => skip_value(&mut dec)?,
        }
    }

    require_end(&dec, bytes.len())?;

    let version = version.ok_or(DecodeError::MissingField("v"))?;
    if version != WIRE_VERSION {
        return Err(DecodeError::UnknownVersion(version));
    }

    Ok(SavedDoc {
        vc: vc.ok_or(DecodeError::MissingField("vc"))?,
        lamport: lamport.ok_or(DecodeError::MissingField("lamport"))?,
        pending: pending.ok_or(DecodeError::MissingField("pending"))?,
        tree: tree.ok_or(DecodeError::MissingField("tree"))?,
    })
}

fn decode_vc(
    dec: &mut Decoder<'_>,
    limits: &Limits,
) -> Result<BTreeMap<ReplicaId, u64>, DecodeError> {
    let len = decode_map_len(dec, limits, 1)?;
    let mut vc = BTreeMap::new();
    for _ in 0..len {
        let raw = decode_text(dec, limits)?;
        let sender = ReplicaId::parse(raw).map_err(|e| DecodeError::InvalidField {
            field: "vc",
            reason: e.to_string(),
        })?;
        let counter = decode_u64(dec, "vc")?;
        vc.insert(sender, counter);
    }
    Ok(vc)
}

fn decode_tree(
    dec: &mut Decoder<'_>,
    limits: &Limits,
    level: usize,
) -> Result<SavedTree, DecodeError> {
    if level > limits.max_path_depth {
        return Err(DecodeError::DecodeLimit("saved tree depth"));
    }
    // Each tree level opens two containers: its own map at CBOR depth
    // 1 + 2*level and its children map one deeper.
    let map_len = decode_map_len(dec, limits, 1 + 2 * level)?;

    let mut self_bytes = None;
    let mut children = None;

    for _ in 0..map_len {
        let key = decode_text(dec, limits)?;
        match key {
            "self" => self_bytes = Some(Bytes::copy_from_slice(decode_bytes(dec, limits)?)),
            "children" => {
                let len = decode_map_len(dec, limits, 2 + 2 * level)?;
                let mut map = BTreeMap::new();
                for _ in 0..len {
                    let name = decode_text(dec, limits)?.to_string();
                    let child = decode_tree(dec, limits, level + 1)?;
                    map.insert(name, child);
                }
                children = Some(map);
            }
            _ => skip_value(dec)?,
        }
    }

    Ok(SavedTree {
        self_bytes,
        children: children.ok_or(DecodeError::MissingField("children"))?,
    })
}
