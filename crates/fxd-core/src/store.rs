// SPDX-License-Identifier: Apache-2.0
//! The node store: owns every [`Node`] in the graph, keyed by [`NodeId`], and
//! performs path resolution, auto-vivification, and cascading deletion.
//!
//! Grounded on the teacher's `graph::GraphStore`, which likewise keeps a flat
//! id-keyed map plus a separate name index rather than a pointer tree; FXD
//! additionally maintains a snippet-id index (`spec.md` §4.5 "Snippet-id
//! index lifecycle") since the marker engine must resolve `meta.id` to a
//! node without walking the whole tree on every patch.

use rustc_hash::FxHashMap;
use std::collections::BTreeMap;

use crate::error::{FxdError, Result};
use crate::ids::{IdAllocator, NodeId};
use crate::node::Node;
use crate::path::Path;
use crate::value::Value;

/// Owns the node graph: a flat `NodeId -> Node` map plus the indices needed
/// to resolve paths and snippet ids without a full tree walk.
#[derive(Debug)]
pub struct NodeStore {
    nodes: BTreeMap<NodeId, Node>,
    ids: IdAllocator,
    snippet_index: FxHashMap<String, NodeId>,
}

impl Default for NodeStore {
    fn default() -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert(NodeId::ROOT, Node::new(NodeId::ROOT, None, String::new()));
        Self {
            nodes,
            ids: IdAllocator::default(),
            snippet_index: FxHashMap::default(),
        }
    }
}

impl NodeStore {
    /// Creates an empty store containing only the root node.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the id of the graph root. Always [`NodeId::ROOT`].
    #[must_use]
    pub fn root_id(&self) -> NodeId {
        NodeId::ROOT
    }

    /// Borrows a node by id.
    #[must_use]
    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    /// Mutably borrows a node by id.
    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(&id)
    }

    /// Returns `true` if `id` refers to a live node.
    #[must_use]
    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Looks up a node by its snippet id (`meta.id`).
    #[must_use]
    pub fn find_by_snippet_id(&self, snippet_id: &str) -> Option<NodeId> {
        self.snippet_index.get(snippet_id).copied()
    }

    /// Resolves `path` to an existing node id, without creating anything.
    ///
    /// # Errors
    /// Returns [`FxdError::InvalidPath`] if `path` contains an empty segment.
    #[allow(clippy::expect_used)] // `cur` always names a node inserted by this store; ids are never orphaned
    pub fn resolve(&self, path: Path<'_>) -> Result<Option<NodeId>> {
        if path.has_empty_segment() {
            return Err(FxdError::InvalidPath(path.as_str().to_string()));
        }
        let mut cur = NodeId::ROOT;
        for seg in path.segments() {
            let node = self.nodes.get(&cur).expect("live node ids are always present");
            match node.children.get(seg) {
                Some(&next) => cur = next,
                None => return Ok(None),
            }
        }
        Ok(Some(cur))
    }

    /// Resolves `path`, auto-vivifying any missing intermediate or leaf nodes
    /// as empty (`Value::None`) nodes (`spec.md` §4.1 "Auto-vivification").
    ///
    /// # Errors
    /// Returns [`FxdError::InvalidPath`] if `path` contains an empty segment.
    #[allow(clippy::expect_used)] // `cur` always names a node inserted by this store; ids are never orphaned
    pub fn ensure(&mut self, path: Path<'_>) -> Result<NodeId> {
        if path.has_empty_segment() {
            return Err(FxdError::InvalidPath(path.as_str().to_string()));
        }
        let mut cur = NodeId::ROOT;
        for seg in path.segments() {
            let existing = self
                .nodes
                .get(&cur)
                .expect("live node ids are always present")
                .children
                .get(seg)
                .copied();
            cur = match existing {
                Some(next) => next,
                None => {
                    let new_id = self.ids.next();
                    let new_node = Node::new(new_id, Some(cur), seg.to_string());
                    self.nodes.insert(new_id, new_node);
                    self.nodes
                        .get_mut(&cur)
                        .expect("live node ids are always present")
                        .children
                        .insert(seg.to_string(), new_id);
                    new_id
                }
            };
        }
        Ok(cur)
    }

    /// Returns the children of `id` as `(name, NodeId)` pairs, sorted by name.
    #[must_use]
    pub fn children(&self, id: NodeId) -> Vec<(&str, NodeId)> {
        self.nodes
            .get(&id)
            .map(|n| n.children.iter().map(|(k, v)| (k.as_str(), *v)).collect())
            .unwrap_or_default()
    }

    /// Returns the parent of `id`, or `None` if `id` is the root or unknown.
    #[must_use]
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(&id).and_then(|n| n.parent)
    }

    /// Reconstructs the dotted path of `id` by walking parent pointers.
    #[must_use]
    #[allow(clippy::expect_used)] // loop only advances to `node.parent` once it has just been read as `Some`
    pub fn path_of(&self, id: NodeId) -> String {
        let mut segments = Vec::new();
        let mut cur = id;
        while let Some(node) = self.nodes.get(&cur) {
            if node.parent.is_none() {
                break;
            }
            segments.push(node.name.clone());
            cur = node.parent.expect("checked above");
        }
        segments.reverse();
        segments.join(".")
    }

    /// Updates the snippet-id index after `id`'s `meta.id` has changed.
    /// `old` is the previous snippet id, if any; `new` is the new one.
    pub(crate) fn reindex_snippet(&mut self, id: NodeId, old: Option<&str>, new: Option<&str>) {
        if let Some(old) = old {
            if self.snippet_index.get(old) == Some(&id) {
                self.snippet_index.remove(old);
            }
        }
        if let Some(new) = new {
            self.snippet_index.insert(new.to_string(), id);
        }
    }

    /// Deletes `id` and its entire subtree, removing every descendant from
    /// the store and the snippet index. Returns the ids removed, in
    /// bottom-up order (deepest descendants first, `id` last), matching the
    /// order the kernel emits `"delete"` signals (`spec.md` §4.1 invariant 6).
    ///
    /// No-op (returns an empty vec) for [`NodeId::ROOT`] and unknown ids.
    #[allow(clippy::expect_used)] // `id` was just confirmed present in the guard clause above
    pub(crate) fn delete_subtree(&mut self, id: NodeId) -> Vec<NodeId> {
        if id.is_root() || !self.nodes.contains_key(&id) {
            return Vec::new();
        }
        let mut removed = Vec::new();
        self.collect_subtree_bottom_up(id, &mut removed);

        if let Some(parent_id) = self.nodes.get(&id).and_then(|n| n.parent) {
            let name = self.nodes.get(&id).expect("checked above").name.clone();
            if let Some(parent) = self.nodes.get_mut(&parent_id) {
                parent.children.remove(&name);
            }
        }

        for removed_id in &removed {
            if let Some(node) = self.nodes.remove(removed_id) {
                if let Some(sid) = node.snippet_id() {
                    if self.snippet_index.get(sid) == Some(removed_id) {
                        self.snippet_index.remove(sid);
                    }
                }
            }
        }
        removed
    }

    fn collect_subtree_bottom_up(&self, id: NodeId, out: &mut Vec<NodeId>) {
        if let Some(node) = self.nodes.get(&id) {
            let children: Vec<NodeId> = node.children.values().copied().collect();
            for child in children {
                self.collect_subtree_bottom_up(child, out);
            }
        }
        out.push(id);
    }

    /// Returns every node's current value as `(path, value)` pairs, used by
    /// the persistence layer's full-snapshot encoder. Excludes the root.
    #[must_use]
    pub fn snapshot_values(&self) -> Vec<(String, Value)> {
        self.nodes
            .iter()
            .filter(|(id, _)| !id.is_root())
            .map(|(id, node)| (self.path_of(*id), node.value.clone()))
            .collect()
    }

    /// Replaces the entire store with an already-linked set of nodes,
    /// typically reconstructed from a persisted file. `nodes` must include
    /// the root. Resets id allocation to continue past the highest id
    /// present and clears the snippet index (callers must call
    /// [`crate::snippet::index::rebuild`] afterward, per `spec.md` §4.5
    /// "the index as derivable").
    pub(crate) fn load_nodes(&mut self, nodes: BTreeMap<NodeId, Node>) {
        let max_id = nodes.keys().map(|id| id.as_u64()).max().unwrap_or(0);
        self.nodes = nodes;
        self.ids = IdAllocator::starting_at(max_id + 1);
        self.snippet_index.clear();
    }

    /// Iterates over every live node, id-ordered.
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes.iter().map(|(id, node)| (*id, node))
    }

    /// Total number of live nodes, including the root.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns `true` if only the root node exists.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }
}
