// SPDX-License-Identifier: Apache-2.0
//! Fixed-size wire types for the `.fxwal` format (`spec.md` §4.7.2, §6).
//!
//! Mirrors the teacher's `wsc::types` convention: `#[repr(C)]` rows with
//! `_le`-suffixed fields, `Pod`/`Zeroable` derives for safe transmutation,
//! and a `size_of` assertion pinning the layout. The field-descriptor's
//! `offset_or_index` is a direct byte offset into the record's data region
//! (Open Question 3 of `spec.md` §9, resolved as "fixed offsets" in
//! `SPEC_FULL.md` §3) rather than an indirection table.

use bytemuck::{Pod, Zeroable};

/// The `.fxwal` file magic, `b"FXWAL"`.
pub const FILE_MAGIC: [u8; 5] = *b"FXWAL";

/// The current `.fxwal` format version.
pub const FORMAT_VERSION: u16 = 1;

/// A `UArr` value's type discriminant (`spec.md` §4.7.2).
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[repr(u8)]
pub enum UArrType {
    /// [`crate::value::Value::None`].
    None = 0,
    /// [`crate::value::Value::Bool`].
    Bool = 1,
    /// [`crate::value::Value::I64`].
    I64 = 2,
    /// [`crate::value::Value::F64`].
    F64 = 3,
    /// [`crate::value::Value::String`], UTF-8.
    StringUtf8 = 4,
    /// [`crate::value::Value::Bytes`].
    Bytes = 5,
    /// [`crate::value::Value::Array`], recursively UArr-encoded.
    Array = 6,
    /// [`crate::value::Value::Object`], recursively UArr-encoded.
    Map = 7,
    /// A reference to another node, carried as a little-endian `u64`.
    NodeRef = 8,
}

impl UArrType {
    /// Recovers a [`UArrType`] from its wire discriminant.
    #[must_use]
    pub fn from_u8(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Self::None),
            1 => Some(Self::Bool),
            2 => Some(Self::I64),
            3 => Some(Self::F64),
            4 => Some(Self::StringUtf8),
            5 => Some(Self::Bytes),
            6 => Some(Self::Array),
            7 => Some(Self::Map),
            8 => Some(Self::NodeRef),
            _ => None,
        }
    }
}

/// The fixed header prefixing every `UArr`-encoded payload (32 bytes).
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct UArrHeader {
    /// Magic bytes, `b"UAR1"`.
    pub magic: [u8; 4],
    /// Format version (little-endian).
    pub version_le: u16,
    /// Reserved flag bits (little-endian), currently always zero.
    pub flags_le: u16,
    /// Number of field descriptors following this header (little-endian).
    pub field_count_le: u32,
    /// Byte offset (from the start of this header) to the field-descriptor
    /// table. Always `size_of::<UArrHeader>()` for this format's one fixed
    /// layout, but carried explicitly for forward compatibility.
    pub schema_offset_le: u64,
    /// Byte offset (from the start of this header) to the data region.
    pub data_offset_le: u64,
    /// Total encoded length of this payload, header included.
    pub total_bytes_le: u64,
}

const _: () = assert!(std::mem::size_of::<UArrHeader>() == 32);

impl UArrHeader {
    /// Magic bytes for `UArr` format version 1.
    pub const MAGIC_V1: [u8; 4] = *b"UAR1";
}

/// One field descriptor within a `UArr` payload (24 bytes).
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct UArrFieldDescriptor {
    /// A stable hash of the field's name (object key, or array index cast
    /// to `u64`), little-endian.
    pub name_hash_le: u64,
    /// The field's [`UArrType`] discriminant.
    pub type_tag: u8,
    /// Padding to keep the descriptor 8-byte aligned.
    pub reserved: [u8; 7],
    /// Fixed byte offset into the data region where this field's encoded
    /// bytes begin, little-endian.
    pub offset_or_index_le: u64,
}

const _: () = assert!(std::mem::size_of::<UArrFieldDescriptor>() == 24);

/// The kind of a `.fxwal` record (`spec.md` §4.7.2).
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[repr(u8)]
pub enum RecordKind {
    /// A new node was created.
    Create = 0,
    /// A node's value, children, or metadata changed.
    Patch = 1,
    /// An entanglement link was added.
    LinkAdd = 2,
    /// An entanglement link was disposed.
    LinkDel = 3,
    /// A raw signal-stream record, persisted verbatim.
    Signal = 4,
    /// A compaction checkpoint.
    Checkpoint = 5,
    /// A group's manual membership and reactive flag, keyed by the group's
    /// node id (`spec.md` §9 Design Note).
    GroupDef = 6,
}

impl RecordKind {
    /// Recovers a [`RecordKind`] from its wire discriminant.
    #[must_use]
    pub fn from_u8(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Self::Create),
            1 => Some(Self::Patch),
            2 => Some(Self::LinkAdd),
            3 => Some(Self::LinkDel),
            4 => Some(Self::Signal),
            5 => Some(Self::Checkpoint),
            6 => Some(Self::GroupDef),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]

    use super::*;

    #[test]
    fn record_kind_round_trips_through_wire_discriminant() {
        for kind in [
            RecordKind::Create,
            RecordKind::Patch,
            RecordKind::LinkAdd,
            RecordKind::LinkDel,
            RecordKind::Signal,
            RecordKind::Checkpoint,
            RecordKind::GroupDef,
        ] {
            assert_eq!(RecordKind::from_u8(kind as u8), Some(kind));
        }
        assert_eq!(RecordKind::from_u8(255), None);
    }

    #[test]
    fn uarr_type_round_trips_through_wire_discriminant() {
        for ty in [
            UArrType::None,
            UArrType::Bool,
            UArrType::I64,
            UArrType::F64,
            UArrType::StringUtf8,
            UArrType::Bytes,
            UArrType::Array,
            UArrType::Map,
            UArrType::NodeRef,
        ] {
            assert_eq!(UArrType::from_u8(ty as u8), Some(ty));
        }
    }
}
