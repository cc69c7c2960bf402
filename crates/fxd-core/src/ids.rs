// SPDX-License-Identifier: Apache-2.0
//! Identifier types for nodes, watchers, and entanglement links.
//!
//! Every identifier in this crate is a distinct newtype, following the
//! convention that ids for different entities must never be mixed even
//! though they share a representation. Unlike content-addressed systems,
//! FXD nodes are mutable and path-addressed, so ids are assigned by a
//! process-local monotonic counter rather than derived from content.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Opaque, process-wide unique identifier for a graph node.
///
/// `NodeId` values are never reused within a process: the kernel hands out
/// the next counter value on every node creation, even if an earlier node
/// at the same path was deleted.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NodeId(pub(crate) u64);

impl NodeId {
    /// The sentinel id for the graph root. The root always exists and is
    /// never returned by [`IdAllocator::next`].
    pub const ROOT: NodeId = NodeId(0);

    /// Reconstructs a [`NodeId`] from its raw counter value, as read back
    /// from a persisted record. Callers must not mint fresh ids this way;
    /// use [`IdAllocator::next`] via the node store for that.
    #[must_use]
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw counter value backing this id.
    #[must_use]
    pub fn as_u64(self) -> u64 {
        self.0
    }

    /// Returns `true` if this id refers to the graph root.
    #[must_use]
    pub fn is_root(self) -> bool {
        self == Self::ROOT
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// Monotonic allocator for [`NodeId`]s, owned by the kernel's node store.
///
/// Id `0` is reserved for the root, so the first allocated id is `1`.
#[derive(Debug)]
pub(crate) struct IdAllocator {
    next: AtomicU64,
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }
}

impl IdAllocator {
    /// Creates an allocator whose first issued id is `start`, used after
    /// loading a persisted graph to resume id allocation past the highest
    /// id already on disk.
    pub(crate) fn starting_at(start: u64) -> Self {
        Self {
            next: AtomicU64::new(start),
        }
    }

    /// Allocates the next [`NodeId`]. Never returns [`NodeId::ROOT`].
    pub(crate) fn next(&self) -> NodeId {
        NodeId(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

/// Opaque handle returned when registering a watcher via
/// [`crate::kernel::Kernel::watch`].
///
/// Handles are only meaningful to the kernel that issued them and must be
/// passed back to [`crate::kernel::Kernel::unwatch`] to stop receiving
/// callbacks.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct WatchHandle(pub(crate) u64);

/// Opaque handle identifying a live entanglement link.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct LinkHandle(pub(crate) u64);

/// Opaque handle identifying a registered reactive snippet.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct SnippetHandle(pub(crate) u64);

/// Generic monotonic counter used to mint [`WatchHandle`], [`LinkHandle`],
/// and [`SnippetHandle`] values. Kept separate from [`IdAllocator`] so that
/// watcher/link churn never perturbs node id allocation.
#[derive(Debug, Default)]
pub(crate) struct HandleAllocator {
    next: AtomicU64,
}

impl HandleAllocator {
    pub(crate) fn next(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]

    use super::*;

    #[test]
    fn node_ids_never_repeat_and_skip_root() {
        let alloc = IdAllocator::default();
        let a = alloc.next();
        let b = alloc.next();
        assert_ne!(a, b);
        assert_ne!(a, NodeId::ROOT);
        assert_ne!(b, NodeId::ROOT);
    }

    #[test]
    fn root_is_its_own_sentinel() {
        assert!(NodeId::ROOT.is_root());
        assert_eq!(NodeId::ROOT.as_u64(), 0);
    }
}
