// SPDX-License-Identifier: Apache-2.0
//! The `UArr` compact binary value encoding (`spec.md` §4.7.2, §6, glossary
//! "UArr").
//!
//! A `UArr` payload is `header | field descriptors | data region`. Scalars
//! encode as one field with the sentinel name `0`; arrays and maps encode
//! one field per element/key, each self-describing (length-prefixed) in the
//! data region so a field's extent never depends on another field's
//! presence. `header.flags_le` carries the top-level shape (scalar / array
//! / map) since a single-field scalar and a one-element array are otherwise
//! indistinguishable from the descriptor table alone.

use std::collections::BTreeMap;
use std::mem::size_of;

use bytemuck::bytes_of;

use crate::error::{FxdError, Result};
use crate::value::Value;

use super::types::{UArrFieldDescriptor, UArrHeader, UArrType};

const SHAPE_SCALAR: u16 = 0;
const SHAPE_ARRAY: u16 = 1;
const SHAPE_MAP: u16 = 2;

/// Encodes `value` as a complete `UArr` payload.
///
/// [`Value::Handle`] is dropped (encoded as an empty [`Value::None`] field)
/// per `spec.md` §3 "Ownership": handles must never reach the durable
/// layer, so the kernel filters them before calling this function, but the
/// encoder degrades gracefully rather than panicking if one slips through.
#[must_use]
pub fn encode(value: &Value) -> Vec<u8> {
    let (shape, fields): (u16, Vec<(u64, UArrType, Vec<u8>)>) = match value {
        Value::Array(items) => (
            SHAPE_ARRAY,
            items
                .iter()
                .enumerate()
                .map(|(i, v)| (i as u64, type_of(v), encode_scalar_or_nested(v)))
                .collect(),
        ),
        Value::Object(map) => (
            SHAPE_MAP,
            map.iter()
                .map(|(k, v)| (0, type_of(v), encode_map_entry(k, v)))
                .collect(),
        ),
        other => (SHAPE_SCALAR, vec![(0, type_of(other), encode_scalar_or_nested(other))]),
    };

    let header_len = size_of::<UArrHeader>();
    let descriptor_len = size_of::<UArrFieldDescriptor>() * fields.len();
    let schema_offset = header_len as u64;
    let data_offset = (header_len + descriptor_len) as u64;

    let mut data = Vec::new();
    let mut descriptors = Vec::with_capacity(fields.len());
    for (name_hash, type_tag, bytes) in &fields {
        descriptors.push(UArrFieldDescriptor {
            name_hash_le: name_hash.to_le(),
            type_tag: *type_tag as u8,
            reserved: [0; 7],
            offset_or_index_le: (data.len() as u64).to_le(),
        });
        data.extend_from_slice(bytes);
    }

    let total_bytes = data_offset + data.len() as u64;
    let header = UArrHeader {
        magic: UArrHeader::MAGIC_V1,
        version_le: 1u16.to_le(),
        flags_le: shape.to_le(),
        field_count_le: (fields.len() as u32).to_le(),
        schema_offset_le: schema_offset.to_le(),
        data_offset_le: data_offset.to_le(),
        total_bytes_le: total_bytes.to_le(),
    };

    let mut out = Vec::with_capacity(total_bytes as usize);
    out.extend_from_slice(bytes_of(&header));
    for d in &descriptors {
        out.extend_from_slice(bytes_of(d));
    }
    out.extend_from_slice(&data);
    out
}

/// Decodes a `UArr` payload previously produced by [`encode`].
///
/// # Errors
/// Returns [`FxdError::CorruptRecord`] if the magic, version, or any offset
/// is malformed or out of bounds.
pub fn decode(bytes: &[u8]) -> Result<Value> {
    let header_len = size_of::<UArrHeader>();
    if bytes.len() < header_len {
        return Err(FxdError::CorruptRecord("UArr payload shorter than header".to_string()));
    }
    let header: UArrHeader = *bytemuck::from_bytes(&bytes[..header_len]);
    if header.magic != UArrHeader::MAGIC_V1 {
        return Err(FxdError::CorruptRecord("bad UArr magic".to_string()));
    }
    if u16::from_le(header.version_le) != 1 {
        return Err(FxdError::CorruptRecord("unsupported UArr version".to_string()));
    }

    let field_count = u32::from_le(header.field_count_le) as usize;
    let schema_offset = u64::from_le(header.schema_offset_le) as usize;
    let data_offset = u64::from_le(header.data_offset_le) as usize;
    let descriptor_len = size_of::<UArrFieldDescriptor>();

    let mut descriptors = Vec::with_capacity(field_count);
    for i in 0..field_count {
        let start = schema_offset + i * descriptor_len;
        let end = start + descriptor_len;
        let slice = bytes
            .get(start..end)
            .ok_or_else(|| FxdError::CorruptRecord("UArr descriptor out of bounds".to_string()))?;
        descriptors.push(*bytemuck::from_bytes::<UArrFieldDescriptor>(slice));
    }

    let data = bytes
        .get(data_offset..)
        .ok_or_else(|| FxdError::CorruptRecord("UArr data region out of bounds".to_string()))?;

    let shape = u16::from_le(header.flags_le);
    match shape {
        SHAPE_SCALAR => {
            let d = descriptors
                .first()
                .ok_or_else(|| FxdError::CorruptRecord("scalar UArr with no field".to_string()))?;
            let ty = UArrType::from_u8(d.type_tag).ok_or_else(|| FxdError::CorruptRecord("unknown UArr type tag".to_string()))?;
            let offset = u64::from_le(d.offset_or_index_le) as usize;
            let (value, _) = decode_scalar_or_nested(data, offset, ty)?;
            Ok(value)
        }
        SHAPE_ARRAY => {
            let mut items = Vec::with_capacity(descriptors.len());
            for d in &descriptors {
                let ty = UArrType::from_u8(d.type_tag).ok_or_else(|| FxdError::CorruptRecord("unknown UArr type tag".to_string()))?;
                let offset = u64::from_le(d.offset_or_index_le) as usize;
                let (value, _) = decode_scalar_or_nested(data, offset, ty)?;
                items.push(value);
            }
            Ok(Value::Array(items))
        }
        SHAPE_MAP => {
            let mut map = BTreeMap::new();
            for d in &descriptors {
                let ty = UArrType::from_u8(d.type_tag).ok_or_else(|| FxdError::CorruptRecord("unknown UArr type tag".to_string()))?;
                let offset = u64::from_le(d.offset_or_index_le) as usize;
                let (key, value_offset) = decode_key(data, offset)?;
                let (value, _) = decode_scalar_or_nested(data, value_offset, ty)?;
                map.insert(key, value);
            }
            Ok(Value::Object(map))
        }
        _ => Err(FxdError::CorruptRecord("unknown UArr top-level shape".to_string())),
    }
}

fn type_of(value: &Value) -> UArrType {
    match value {
        Value::None | Value::Handle(_) => UArrType::None,
        Value::Bool(_) => UArrType::Bool,
        Value::I64(_) => UArrType::I64,
        Value::F64(_) => UArrType::F64,
        Value::String(_) => UArrType::StringUtf8,
        Value::Bytes(_) => UArrType::Bytes,
        Value::Array(_) => UArrType::Array,
        Value::Object(_) => UArrType::Map,
    }
}

fn encode_map_entry(key: &str, value: &Value) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&(key.len() as u32).to_le_bytes());
    out.extend_from_slice(key.as_bytes());
    out.extend_from_slice(&encode_scalar_or_nested(value));
    out
}

#[allow(clippy::expect_used)] // slice width is fixed by the preceding get(offset..offset+4) bound check
fn decode_key(data: &[u8], offset: usize) -> Result<(String, usize)> {
    let len_bytes = data
        .get(offset..offset + 4)
        .ok_or_else(|| FxdError::CorruptRecord("UArr map key length out of bounds".to_string()))?;
    let len = u32::from_le_bytes(len_bytes.try_into().expect("checked length")) as usize;
    let key_bytes = data
        .get(offset + 4..offset + 4 + len)
        .ok_or_else(|| FxdError::CorruptRecord("UArr map key bytes out of bounds".to_string()))?;
    let key = String::from_utf8(key_bytes.to_vec()).map_err(|_| FxdError::CorruptRecord("UArr map key is not valid UTF-8".to_string()))?;
    Ok((key, offset + 4 + len))
}

fn encode_scalar_or_nested(value: &Value) -> Vec<u8> {
    match value {
        Value::None | Value::Handle(_) => Vec::new(),
        Value::Bool(b) => vec![u8::from(*b)],
        Value::I64(n) => n.to_le_bytes().to_vec(),
        Value::F64(n) => n.to_le_bytes().to_vec(),
        Value::String(s) => {
            let mut out = (s.len() as u32).to_le_bytes().to_vec();
            out.extend_from_slice(s.as_bytes());
            out
        }
        Value::Bytes(b) => {
            let mut out = (b.len() as u32).to_le_bytes().to_vec();
            out.extend_from_slice(b);
            out
        }
        Value::Array(_) | Value::Object(_) => {
            let nested = encode(value);
            let mut out = (nested.len() as u32).to_le_bytes().to_vec();
            out.extend_from_slice(&nested);
            out
        }
    }
}

#[allow(clippy::expect_used)] // every slice width below is fixed by its preceding get(..) bound check
fn decode_scalar_or_nested(data: &[u8], offset: usize, ty: UArrType) -> Result<(Value, usize)> {
    match ty {
        UArrType::None => Ok((Value::None, offset)),
        UArrType::Bool => {
            let b = *data.get(offset).ok_or_else(|| FxdError::CorruptRecord("UArr bool out of bounds".to_string()))?;
            Ok((Value::Bool(b != 0), offset + 1))
        }
        UArrType::I64 => {
            let bytes = data
                .get(offset..offset + 8)
                .ok_or_else(|| FxdError::CorruptRecord("UArr i64 out of bounds".to_string()))?;
            Ok((Value::I64(i64::from_le_bytes(bytes.try_into().expect("checked length"))), offset + 8))
        }
        UArrType::F64 => {
            let bytes = data
                .get(offset..offset + 8)
                .ok_or_else(|| FxdError::CorruptRecord("UArr f64 out of bounds".to_string()))?;
            Ok((Value::F64(f64::from_le_bytes(bytes.try_into().expect("checked length"))), offset + 8))
        }
        UArrType::StringUtf8 => {
            let (len, body_start) = read_len(data, offset)?;
            let bytes = data
                .get(body_start..body_start + len)
                .ok_or_else(|| FxdError::CorruptRecord("UArr string out of bounds".to_string()))?;
            let s = String::from_utf8(bytes.to_vec()).map_err(|_| FxdError::CorruptRecord("UArr string is not valid UTF-8".to_string()))?;
            Ok((Value::String(s), body_start + len))
        }
        UArrType::Bytes => {
            let (len, body_start) = read_len(data, offset)?;
            let bytes = data
                .get(body_start..body_start + len)
                .ok_or_else(|| FxdError::CorruptRecord("UArr bytes out of bounds".to_string()))?;
            Ok((Value::Bytes(bytes::Bytes::copy_from_slice(bytes)), body_start + len))
        }
        UArrType::Array | UArrType::Map => {
            let (len, body_start) = read_len(data, offset)?;
            let nested = data
                .get(body_start..body_start + len)
                .ok_or_else(|| FxdError::CorruptRecord("UArr nested payload out of bounds".to_string()))?;
            Ok((decode(nested)?, body_start + len))
        }
        UArrType::NodeRef => {
            let bytes = data
                .get(offset..offset + 8)
                .ok_or_else(|| FxdError::CorruptRecord("UArr noderef out of bounds".to_string()))?;
            Ok((Value::I64(i64::from_le_bytes(bytes.try_into().expect("checked length"))), offset + 8))
        }
    }
}

#[allow(clippy::expect_used)] // slice width is fixed by the preceding get(offset..offset+4) bound check
fn read_len(data: &[u8], offset: usize) -> Result<(usize, usize)> {
    let bytes = data
        .get(offset..offset + 4)
        .ok_or_else(|| FxdError::CorruptRecord("UArr length prefix out of bounds".to_string()))?;
    Ok((u32::from_le_bytes(bytes.try_into().expect("checked length")) as usize, offset + 4))
}
