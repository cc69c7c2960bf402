// SPDX-License-Identifier: Apache-2.0
//! The node record: identity, value, and structural bookkeeping for a
//! single vertex in the graph.
//!
//! This plays the role the teacher crate splits across `record::NodeRecord`
//! (identity + payload) and `graph::GraphStore` (structural bucket maps):
//! FXD's nodes carry their own parent pointer and child map directly, since
//! the tree (not an arbitrary edge set) is the addressing structure.

use std::collections::BTreeMap;

use crate::ids::NodeId;
use crate::value::{Value, ValueKind};

/// A single node in the graph.
///
/// Invariants (enforced by [`crate::store::NodeStore`], not by this type
/// itself — `Node` is a plain record):
/// - Every non-root node's `parent` resolves to a node whose `children[name]`
///   is this node's id (`spec.md` §3 invariant 1, §8 property 1).
/// - `version` is strictly increasing (`spec.md` §3 invariant 2).
#[derive(Debug)]
pub struct Node {
    /// This node's own identifier.
    pub id: NodeId,
    /// Parent node id, or `None` for the root.
    pub parent: Option<NodeId>,
    /// The path segment under which this node is reachable from its parent.
    /// Empty for the root.
    pub name: String,
    /// The node's current value.
    pub value: Value,
    /// Advisory type tag (e.g. `"snippet"`, `"group"`, `"view"`). Purely
    /// informative to higher layers; the kernel only consults it to reject
    /// type-mismatched writes when `Some`.
    pub type_tag: Option<String>,
    /// Short string-keyed metadata (e.g. snippet `{id,lang,file,order}`).
    pub meta: BTreeMap<String, Value>,
    /// Monotonically increasing version, bumped on any mutation of `value`,
    /// `children`, or `meta`.
    pub version: u64,
    /// Child name -> child node id. Insertion order is not guaranteed
    /// (`spec.md` §3); ordering for display is the responsibility of
    /// higher layers (see [`crate::group`]).
    pub children: BTreeMap<String, NodeId>,
}

impl Node {
    /// Constructs a freshly auto-vivified node: `Value::None`, no type tag,
    /// empty meta, version `0`, no children.
    pub(crate) fn new(id: NodeId, parent: Option<NodeId>, name: String) -> Self {
        Self {
            id,
            parent,
            name,
            value: Value::None,
            type_tag: None,
            meta: BTreeMap::new(),
            version: 0,
            children: BTreeMap::new(),
        }
    }

    /// Returns `true` if this node has `meta.id` set, i.e. it is a snippet
    /// node per `spec.md` §3 invariant 3.
    #[must_use]
    pub fn is_snippet(&self) -> bool {
        self.meta.contains_key("id")
    }

    /// Returns the node's `meta.id` as a string, if present and string-typed.
    #[must_use]
    pub fn snippet_id(&self) -> Option<&str> {
        match self.meta.get("id") {
            Some(Value::String(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Returns `true` if `candidate` satisfies this node's `type_tag`
    /// constraint (no tag means any value is accepted).
    #[must_use]
    pub fn accepts(&self, candidate: &Value) -> bool {
        match &self.type_tag {
            None => true,
            Some(tag) => type_tag_accepts(tag, candidate.kind()),
        }
    }

    /// Bumps `version` by one, returning the new value. Called after every
    /// mutation of `value`, `children`, or `meta` (`spec.md` §3 invariant 2).
    pub(crate) fn bump_version(&mut self) -> u64 {
        self.version += 1;
        self.version
    }
}

/// Maps an advisory `type_tag` to the [`ValueKind`]s it accepts.
///
/// Tags are free-form strings per `spec.md` §3 ("purely advisory"), but a
/// small set of conventional tags (`"bool"`, `"i64"`, `"f64"`, `"string"`,
/// `"bytes"`) double as type constraints, matching the common case of a
/// snippet's `meta` fields being declared with scalar tags. Any other tag
/// accepts all kinds, since the tag is then purely advisory to higher layers
/// (e.g. `"snippet"`, `"group"`, `"view"`).
fn type_tag_accepts(tag: &str, kind: ValueKind) -> bool {
    match tag {
        "bool" => kind == ValueKind::Bool,
        "i64" => kind == ValueKind::I64,
        "f64" => kind == ValueKind::F64,
        "string" => kind == ValueKind::String,
        "bytes" => kind == ValueKind::Bytes,
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]

    use super::*;

    #[test]
    fn fresh_node_has_version_zero_and_no_value() {
        let n = Node::new(NodeId::ROOT, None, String::new());
        assert_eq!(n.version, 0);
        assert!(matches!(n.value, Value::None));
    }

    #[test]
    fn snippet_detection_follows_meta_id() {
        let mut n = Node::new(NodeId::ROOT, None, "header".into());
        assert!(!n.is_snippet());
        n.meta.insert("id".into(), Value::String("abc123".into()));
        assert!(n.is_snippet());
        assert_eq!(n.snippet_id(), Some("abc123"));
    }

    #[test]
    fn type_tag_rejects_mismatched_scalar() {
        let mut n = Node::new(NodeId::ROOT, None, "x".into());
        n.type_tag = Some("i64".into());
        assert!(n.accepts(&Value::I64(5)));
        assert!(!n.accepts(&Value::String("nope".into())));
    }

    #[test]
    fn advisory_tag_accepts_everything() {
        let mut n = Node::new(NodeId::ROOT, None, "x".into());
        n.type_tag = Some("snippet".into());
        assert!(n.accepts(&Value::String("body".into())));
        assert!(n.accepts(&Value::I64(1)));
    }
}
