//! Transaction wire schema and CBOR encoding.

use std::collections::BTreeMap;

use bytes::Bytes;
use minicbor::{Decoder, Encoder};

use crate::core::{Limits, ReplicaId};

use super::cbor::{
    decode_array_len, decode_bytes, decode_map_len, decode_text, decode_u32, decode_u64,
    require_end, skip_value,
};
use super::{DecodeError, EncodeError, WIRE_VERSION};

/// One operation addressed at a collab: the root-to-target path and the
/// collab's opaque payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WireOp {
    pub path: Vec<String>,
    pub payload: Bytes,
}

/// A parsed transaction header plus its ordered, non-empty op list.
///
/// `vc` is the sender's partial vector clock; the sender's own entry is
/// omitted (it equals `counter`). Receivers treat absent entries as
/// "possibly incorrect 0".
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WireTxn {
    pub sender: ReplicaId,
    pub counter: u64,
    pub vc: BTreeMap<ReplicaId, u64>,
    /// First N `vc` entries are causally maximal among the sender's known
    /// transactions. Decoded for forward compatibility; this runtime does
    /// not emit or consume it.
    pub maximal_vc_keys: Option<u32>,
    pub wall_ms: Option<u64>,
    pub lamport: Option<u64>,
    pub ops: Vec<WireOp>,
}

pub fn encode_txn(txn: &WireTxn) -> Result<Vec<u8>, EncodeError> {
    let mut buf = Vec::new();
    let mut enc = Encoder::new(&mut buf);

    let mut len = 6;
    if txn.maximal_vc_keys.is_some() {
        len += 1;
    }
    if txn.wall_ms.is_some() {
        len += 1;
    }
    if txn.lamport.is_some() {
        len += 1;
    }
    enc.map(len)?;

    enc.str("v")?;
    enc.u32(WIRE_VERSION)?;
    enc.str("sender")?;
    enc.str(txn.sender.as_str())?;
    enc.str("counter")?;
    enc.u64(txn.counter)?;

    enc.str("vc_keys")?;
    enc.array(txn.vc.len() as u64)?;
    for sender in txn.vc.keys() {
        enc.str(sender.as_str())?;
    }
    enc.str("vc_vals")?;
    enc.array(txn.vc.len() as u64)?;
    for counter in txn.vc.values() {
        enc.u64(*counter)?;
    }

    if let Some(count) = txn.maximal_vc_keys {
        enc.str("maximal_vc_keys")?;
        enc.u32(count)?;
    }
    if let Some(wall_ms) = txn.wall_ms {
        enc.str("wall_ms")?;
        enc.u64(wall_ms)?;
    }
    if let Some(lamport) = txn.lamport {
        enc.str("lamport")?;
        enc.u64(lamport)?;
    }

    enc.str("ops")?;
    enc.array(txn.ops.len() as u64)?;
    for op in &txn.ops {
        encode_op(&mut enc, op)?;
    }

    Ok(buf)
}

fn encode_op(enc: &mut Encoder<&mut Vec<u8>>, op: &WireOp) -> Result<(), EncodeError> {
    enc.map(2)?;
    enc.str("path")?;
    enc.array(op.path.len() as u64)?;
    for label in &op.path {
        enc.str(label)?;
    }
    enc.str("payload")?;
    enc.bytes(op.payload.as_ref())?;
    Ok(())
}

pub fn decode_txn(bytes: &[u8], limits: &Limits) -> Result<WireTxn, DecodeError> {
    if bytes.len() > limits.max_txn_bytes {
        return Err(DecodeError::DecodeLimit("transaction bytes"));
    }
    let mut dec = Decoder::new(bytes);
    let map_len = decode_map_len(&mut dec, limits, 0)?;

    let mut version = None;
    let mut sender = None;
    let mut counter = None;
    let mut vc_keys: Option<Vec<ReplicaId>> = None;
    let mut vc_vals: Option<Vec<u64>> = None;
    let mut maximal_vc_keys = None;
    let mut wall_ms = None;
    let mut lamport = None;
    let mut ops = None;

    for _ in 0..map_len {
        let key = decode_text(&mut dec, limits)?;
        match key {
            "v" => version = Some(decode_u32(&mut dec, "v")?),
            "sender" => {
                let raw = decode_text(&mut dec, limits)?;
                sender = Some(parse_replica(raw, "sender")?);
            }
            "counter" => counter = Some(decode_u64(&mut dec, "counter")?),
            "vc_keys" => {
                let len = decode_array_len(&mut dec, limits, 1)?;
                let mut keys = Vec::with_capacity(len as usize);
                for _ in 0..len {
                    let raw = decode_text(&mut dec, limits)?;
                    keys.push(parse_replica(raw, "vc_keys")?);
                }
                vc_keys = Some(keys);
            }
            "vc_vals" => {
                let len = decode_array_len(&mut dec, limits, 1)?;
                let mut vals = Vec::with_capacity(len as usize);
                for _ in 0..len {
                    vals.push(decode_u64(&mut dec, "vc_vals")?);
                }
                vc_vals = Some(vals);
            }
            "maximal_vc_keys" => {
                maximal_vc_keys = Some(decode_u32(&mut dec, "maximal_vc_keys")?)
            }
            "wall_ms" => wall_ms = Some(decode_u64(&mut dec, "wall_ms")?),
            "lamport" => lamport = Some(decode_u64(&mut dec, "lamport")?),
            "ops" => ops = Some(decode_ops(&mut dec, limits)?),
            _ => skip_value(&mut dec)?,
        }
    }

    require_end(&dec, bytes.len())?;

    let version = version.ok_or(DecodeError::MissingField("v"))?;
    if version != WIRE_VERSION {
        return Err(DecodeError::UnknownVersion(version));
    }

    let sender = sender.ok_or(DecodeError::MissingField("sender"))?;
    let counter = counter.ok_or(DecodeError::MissingField("counter"))?;
    if counter == 0 {
        return Err(DecodeError::InvalidField {
            field: "counter",
            reason: "must be >= 1".into(),
        });
    }

    let vc_keys = vc_keys.ok_or(DecodeError::MissingField("vc_keys"))?;
    let vc_vals = vc_vals.ok_or(DecodeError::MissingField("vc_vals"))?;
    if vc_keys.len() != vc_vals.len() {
        return Err(DecodeError::LengthMismatch {
            field: "vc",
            keys: vc_keys.len(),
            vals: vc_vals.len(),
        });
    }
    let vc: BTreeMap<ReplicaId, u64> = vc_keys.into_iter().zip(vc_vals).collect();

    let ops = ops.ok_or(DecodeError::MissingField("ops"))?;
    if ops.is_empty() {
        return Err(DecodeError::InvalidField {
            field: "ops",
            reason: "must be non-empty".into(),
        });
    }

    Ok(WireTxn {
        sender,
        counter,
        vc,
        maximal_vc_keys,
        wall_ms,
        lamport,
        ops,
    })
}

fn decode_ops(dec: &mut Decoder<'_>, limits: &Limits) -> Result<Vec<WireOp>, DecodeError> {
    let len = decode_array_len(dec, limits, 1)?;
    if len as usize > limits.max_ops_per_txn {
        return Err(DecodeError::DecodeLimit("ops per transaction"));
    }
    let mut ops = Vec::with_capacity(len as usize);
    for _ in 0..len {
        ops.push(decode_op(dec, limits)?);
    }
    Ok(ops)
}

fn decode_op(dec: &mut Decoder<'_>, limits: &Limits) -> Result<WireOp, DecodeError> {
    let map_len = decode_map_len(dec, limits, 2)?;
    let mut path = None;
    let mut payload = None;

    for _ in 0..map_len {
        let key = decode_text(dec, limits)?;
        match key {
            "path" => {
                let len = decode_array_len(dec, limits, 3)?;
                if len as usize > limits.max_path_depth {
                    return Err(DecodeError::DecodeLimit("path depth"));
                }
                let mut labels = Vec::with_capacity(len as usize);
                for _ in 0..len {
                    labels.push(decode_text(dec, limits)?.to_string());
                }
                path = Some(labels);
            }
            "payload" => payload = Some(Bytes::copy_from_slice(decode_bytes(dec, limits)?)),
            _ => skip_value(dec)?,
        }
    }

    Ok(WireOp {
        path: path.ok_or(DecodeError::MissingField("path"))?,
        payload: payload.ok_or(DecodeError::MissingField("payload"))?,
    })
}

fn parse_replica(raw: &str, field: &'static str) -> Result<ReplicaId, DecodeError> {
    ReplicaId::parse(raw).map_err(|e| DecodeError::InvalidField {
        field,
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rid(s: &str) -> ReplicaId {
        ReplicaId::parse(s).unwrap()
    }

    fn sample_txn() -> WireTxn {
        let mut vc = BTreeMap::new();
        vc.insert(rid("bbb"), 4);
        vc.insert(rid("ccc"), 1);
        WireTxn {
            sender: rid("aaa"),
            counter: 3,
            vc,
            maximal_vc_keys: None,
            wall_ms: Some(1_700_000_000_000),
            lamport: None,
            ops: vec![WireOp {
                path: vec!["counter".into()],
                payload: Bytes::from_static(&[0x03]),
            }],
        }
    }

    #[test]
    fn round_trip_with_optionals() {
        let txn = sample_txn();
        let bytes = encode_txn(&txn).unwrap();
        let decoded = decode_txn(&bytes, &Limits::default()).unwrap();
        assert_eq!(decoded, txn);
    }

    #[test]
    fn round_trip_minimal() {
        let mut txn = sample_txn();
        txn.vc.clear();
        txn.wall_ms = None;
        let bytes = encode_txn(&txn).unwrap();
        let decoded = decode_txn(&bytes, &Limits::default()).unwrap();
        assert_eq!(decoded, txn);
    }

    #[test]
    fn unknown_keys_are_skipped() {
        // A future sender adds a field this version does not know.
        let mut buf = Vec::new();
        let mut enc = Encoder::new(&mut buf);
        enc.map(7).unwrap();
        enc.str("v").unwrap();
        enc.u32(1).unwrap();
        enc.str("sender").unwrap();
        enc.str("aaa").unwrap();
        enc.str("counter").unwrap();
        enc.u64(1).unwrap();
        enc.str("vc_keys").unwrap();
        enc.array(0).unwrap();
        enc.str("vc_vals").unwrap();
        enc.array(0).unwrap();
        enc.str("shiny_new_field").unwrap();
        enc.str("ignored").unwrap();
        enc.str("ops").unwrap();
        enc.array(1).unwrap();
        enc.map(2).unwrap();
        enc.str("path").unwrap();
        enc.array(1).unwrap();
        enc.str("x").unwrap();
        enc.str("payload").unwrap();
        enc.bytes(&[1, 2]).unwrap();

        let decoded = decode_txn(&buf, &Limits::default()).unwrap();
        assert_eq!(decoded.sender, rid("aaa"));
        assert_eq!(decoded.ops.len(), 1);
    }

    #[test]
    fn vc_length_mismatch_rejected() {
        let mut buf = Vec::new();
        let mut enc = Encoder::new(&mut buf);
        enc.map(6).unwrap();
        enc.str("v").unwrap();
        enc.u32(1).unwrap();
        enc.str("sender").unwrap();
        enc.str("aaa").unwrap();
        enc.str("counter").unwrap();
        enc.u64(1).unwrap();
        enc.str("vc_keys").unwrap();
        enc.array(1).unwrap();
        enc.str("bbb").unwrap();
        enc.str("vc_vals").unwrap();
        enc.array(0).unwrap();
        enc.str("ops").unwrap();
        enc.array(1).unwrap();
        enc.map(2).unwrap();
        enc.str("path").unwrap();
        enc.array(0).unwrap();
        enc.str("payload").unwrap();
        enc.bytes(&[]).unwrap();

        let err = decode_txn(&buf, &Limits::default()).unwrap_err();
        assert!(matches!(err, DecodeError::LengthMismatch { .. }));
    }

    #[test]
    fn zero_counter_rejected() {
        let mut txn = sample_txn();
        txn.counter = 0;
        let bytes = encode_txn(&txn).unwrap();
        let err = decode_txn(&bytes, &Limits::default()).unwrap_err();
        assert!(matches!(err, DecodeError::InvalidField { field: "counter", .. }));
    }

    #[test]
    fn empty_ops_rejected() {
        let mut txn = sample_txn();
        txn.ops.clear();
        let bytes = encode_txn(&txn).unwrap();
        let err = decode_txn(&bytes, &Limits::default()).unwrap_err();
        assert!(matches!(err, DecodeError::InvalidField { field: "ops", .. }));
    }

    #[test]
    fn unknown_version_rejected() {
        let mut buf = Vec::new();
        let mut enc = Encoder::new(&mut buf);
        enc.map(1).unwrap();
        enc.str("v").unwrap();
        enc.u32(99).unwrap();
        let err = decode_txn(&buf, &Limits::default()).unwrap_err();
        assert!(matches!(err, DecodeError::UnknownVersion(99)));
    }

    #[test]
    fn trailing_bytes_rejected() {
        let txn = sample_txn();
        let mut bytes = encode_txn(&txn).unwrap();
        bytes.push(0x00);
        let err = decode_txn(&bytes, &Limits::default()).unwrap_err();
        assert!(matches!(err, DecodeError::TrailingBytes));
    }

    #[test]
    fn indefinite_map_rejected() {
        let mut buf = Vec::new();
        let mut enc = Encoder::new(&mut buf);
        enc.begin_map().unwrap();
        enc.str("v").unwrap();
        enc.u32(1).unwrap();
        enc.end().unwrap();
        let err = decode_txn(&buf, &Limits::default()).unwrap_err();
        assert!(matches!(err, DecodeError::IndefiniteLength));
    }

    #[test]
    fn oversized_input_rejected() {
        let mut limits = Limits::default();
        limits.max_txn_bytes = 4;
        let bytes = encode_txn(&sample_txn()).unwrap();
        let err = decode_txn(&bytes, &limits).unwrap_err();
        assert!(matches!(err, DecodeError::DecodeLimit(_)));
    }

    #[test]
    fn cbor_nesting_past_depth_limit_rejected() {
        // The op path array sits at nesting depth 3; capping the depth at
        // 2 must reject it even though every other limit is satisfied.
        let mut limits = Limits::default();
        limits.max_cbor_depth = 2;
        let bytes = encode_txn(&sample_txn()).unwrap();
        let err = decode_txn(&bytes, &limits).unwrap_err();
        assert!(matches!(err, DecodeError::DecodeLimit("cbor depth")));

        limits.max_cbor_depth = 3;
        assert!(decode_txn(&bytes, &limits).is_ok());
    }
}
