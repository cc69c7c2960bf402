// SPDX-License-Identifier: Apache-2.0
//! The node value type and structural equality used by [`crate::kernel::Kernel::set`].
//!
//! Depth-0 scalars (`none`/`bool`/`i64`/`f64`/`string`/`bytes`) behave like
//! the teacher crate's typed attachment atoms: opaque to everything except
//! the caller that wrote them. `array`/`object` are the one place FXD
//! diverges from an opaque-payload model — per `spec.md` §3 invariant 4, a
//! compound value written to a node is split into child nodes rather than
//! stored as a single blob, unless the caller explicitly asks for the `json`
//! (here: [`Value::to_json_value`]) representation.

use std::collections::BTreeMap;
use std::fmt;

use bytes::Bytes;

/// A node's value. `Handle` is never persisted: the durable layer drops it
/// on save and leaves the slot empty on load (see `spec.md` §3 "Ownership").
#[derive(Clone)]
pub enum Value {
    /// The absence of a value (default for a freshly auto-vivified node).
    None,
    /// A boolean scalar.
    Bool(bool),
    /// A 64-bit signed integer scalar.
    I64(i64),
    /// A 64-bit floating point scalar.
    F64(f64),
    /// A UTF-8 string scalar.
    String(String),
    /// An opaque byte string.
    Bytes(Bytes),
    /// An ordered list of values.
    Array(Vec<Value>),
    /// A string-keyed map of values. Iteration order is the insertion order
    /// recorded at construction time (backed by a `BTreeMap` for determinism
    /// of persisted encodings; keys are sorted, not insertion-ordered — callers
    /// that need insertion order must track it via `meta.order` on the
    /// resulting child nodes, per `spec.md` §9 Open Question 2).
    Object(BTreeMap<String, Value>),
    /// An opaque, non-serialisable reference (e.g. a function). Dropped on
    /// persistence; never compares equal to anything, including itself,
    /// which is why `Handle` values always bump `version` and always fire
    /// watchers on `set` (structural equality can never short-circuit them).
    Handle(HandleValue),
}

/// Type-erased wrapper for a [`Value::Handle`] payload.
///
/// The kernel never inspects the contents; it only needs to move the
/// `Arc` around and know that two handles are never structurally equal.
#[derive(Clone)]
pub struct HandleValue(pub std::sync::Arc<dyn std::any::Any + Send + Sync>);

impl fmt::Debug for HandleValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("HandleValue(..)")
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("None"),
            Self::Bool(v) => write!(f, "Bool({v})"),
            Self::I64(v) => write!(f, "I64({v})"),
            Self::F64(v) => write!(f, "F64({v})"),
            Self::String(v) => write!(f, "String({v:?})"),
            Self::Bytes(v) => write!(f, "Bytes({} bytes)", v.len()),
            Self::Array(v) => f.debug_list().entries(v.iter()).finish(),
            Self::Object(v) => f.debug_map().entries(v.iter()).finish(),
            Self::Handle(_) => f.write_str("Handle(..)"),
        }
    }
}

impl PartialEq for Value {
    /// Structural equality, used by `Kernel::set`'s idempotence check
    /// (`spec.md` §4.1: "`set` with `value == current_value` is idempotent").
    ///
    /// `Handle` never compares equal, including to itself: a re-registered
    /// handle must always be treated as a change so lifecycle hooks re-run.
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::None, Self::None) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::I64(a), Self::I64(b)) => a == b,
            (Self::F64(a), Self::F64(b)) => a.to_bits() == b.to_bits(),
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Bytes(a), Self::Bytes(b)) => a == b,
            (Self::Array(a), Self::Array(b)) => a == b,
            (Self::Object(a), Self::Object(b)) => a == b,
            _ => false,
        }
    }
}

/// Discriminant-only view of [`Value`], used by type-tagged nodes to reject
/// mismatched writes (`spec.md` §4.1 `InvalidType`).
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ValueKind {
    /// See [`Value::None`].
    None,
    /// See [`Value::Bool`].
    Bool,
    /// See [`Value::I64`].
    I64,
    /// See [`Value::F64`].
    F64,
    /// See [`Value::String`].
    String,
    /// See [`Value::Bytes`].
    Bytes,
    /// See [`Value::Array`].
    Array,
    /// See [`Value::Object`].
    Object,
    /// See [`Value::Handle`].
    Handle,
}

impl Value {
    /// Returns the discriminant kind of this value.
    #[must_use]
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::None => ValueKind::None,
            Self::Bool(_) => ValueKind::Bool,
            Self::I64(_) => ValueKind::I64,
            Self::F64(_) => ValueKind::F64,
            Self::String(_) => ValueKind::String,
            Self::Bytes(_) => ValueKind::Bytes,
            Self::Array(_) => ValueKind::Array,
            Self::Object(_) => ValueKind::Object,
            Self::Handle(_) => ValueKind::Handle,
        }
    }

    /// Returns `true` for [`Value::Array`] and [`Value::Object`] — the two
    /// variants that `Kernel::set` splits into child nodes rather than
    /// storing directly (`spec.md` §3 invariant 4).
    #[must_use]
    pub fn is_compound(&self) -> bool {
        matches!(self, Self::Array(_) | Self::Object(_))
    }

    /// Returns `true` for [`Value::Handle`], the one variant the durable
    /// layer must drop rather than encode (`spec.md` §3 "Ownership").
    #[must_use]
    pub fn is_handle(&self) -> bool {
        matches!(self, Self::Handle(_))
    }
}
