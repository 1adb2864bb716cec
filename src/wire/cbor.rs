//! Bounded CBOR decode helpers shared by the wire schemas.
//!
//! Container decoders take the nesting `depth` of the container being
//! opened (0 for the outermost map) so recursion is bounded by
//! `max_cbor_depth` no matter what the bytes claim.

use minicbor::data::Type;
use minicbor::Decoder;

use crate::core::Limits;

use super::DecodeError;

pub(crate) fn ensure_depth(limits: &Limits, depth: usize) -> Result<(), DecodeError> {
    if depth > limits.max_cbor_depth {
        return Err(DecodeError::DecodeLimit("cbor depth"));
    }
    Ok(())
}

pub(crate) fn decode_map_len(
    dec: &mut Decoder<'_>,
    limits: &Limits,
    depth: usize,
) -> Result<u64, DecodeError> {
    ensure_depth(limits, depth)?;
    match dec.map()? {
        Some(len) if len as usize <= limits.max_cbor_map_entries => Ok(len),
        Some(_) => Err(DecodeError::DecodeLimit("map entries")),
        None => Err(DecodeError::IndefiniteLength),
    }
}

pub(crate) fn decode_array_len(
    dec: &mut Decoder<'_>,
    limits: &Limits,
    depth: usize,
) -> Result<u64, DecodeError> {
    ensure_depth(limits, depth)?;
    match dec.array()? {
        Some(len) if len as usize <= limits.max_cbor_array_entries => Ok(len),
        Some(_) => Err(DecodeError::DecodeLimit("array entries")),
        None => Err(DecodeError::IndefiniteLength),
    }
}

pub(crate) fn decode_text<'b>(
    dec: &mut Decoder<'b>,
    limits: &Limits,
) -> Result<&'b str, DecodeError> {
    if matches!(dec.datatype()?, Type::StringIndef) {
        return Err(DecodeError::IndefiniteLength);
    }
    let s = dec.str()?;
    if s.len() > limits.max_cbor_text_len {
        return Err(DecodeError::DecodeLimit("text length"));
    }
    Ok(s)
}

pub(crate) fn decode_bytes<'b>(
    dec: &mut Decoder<'b>,
    limits: &Limits,
) -> Result<&'b [u8], DecodeError> {
    if matches!(dec.datatype()?, Type::BytesIndef) {
        return Err(DecodeError::IndefiniteLength);
    }
    let b = dec.bytes()?;
    if b.len() > limits.max_cbor_bytes_len {
        return Err(DecodeError::DecodeLimit("bytes length"));
    }
    Ok(b)
}

pub(crate) fn decode_u32(dec: &mut Decoder<'_>, field: &'static str) -> Result<u32, DecodeError> {
    dec.u32().map_err(|_| DecodeError::InvalidField {
        field,
        reason: "not a u32".into(),
    })
}

pub(crate) fn decode_u64(dec: &mut Decoder<'_>, field: &'static str) -> Result<u64, DecodeError> {
    dec.u64().map_err(|_| DecodeError::InvalidField {
        field,
        reason: "not a u64".into(),
    })
}

/// Skip one value; indefinite-length items are rejected rather than
/// silently traversed.
pub(crate) fn skip_value(dec: &mut Decoder<'_>) -> Result<(), DecodeError> {
    if is_indefinite(dec)? {
        return Err(DecodeError::IndefiniteLength);
    }
    dec.skip()?;
    Ok(())
}

fn is_indefinite(dec: &Decoder<'_>) -> Result<bool, DecodeError> {
    Ok(matches!(
        dec.datatype()?,
        Type::BytesIndef | Type::StringIndef | Type::ArrayIndef | Type::MapIndef
    ))
}

pub(crate) fn require_end(dec: &Decoder<'_>, input_len: usize) -> Result<(), DecodeError> {
    if dec.position() != input_len {
        return Err(DecodeError::TrailingBytes);
    }
    Ok(())
}
