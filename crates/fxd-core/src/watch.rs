// SPDX-License-Identifier: Apache-2.0
//! Per-node watcher registry.
//!
//! Grounded on the teacher's `inbox::Inbox`, which likewise keeps a handle-
//! indexed callback table and guards dispatch with `catch_unwind` so a
//! single misbehaving consumer cannot bring down the tick loop; here the
//! "tick loop" is the kernel's synchronous signal-emission path
//! (`spec.md` §4.1 step 5, §5 "a watcher callback panics").

use std::panic::{catch_unwind, AssertUnwindSafe};

use rustc_hash::FxHashMap;

use crate::ids::{HandleAllocator, NodeId, WatchHandle};
use crate::node::Node;

/// A watcher callback: invoked with the node's id and its current state
/// after the mutation that triggered it.
pub type WatchFn = Box<dyn FnMut(NodeId, &Node) + Send>;

/// Registry of watchers, keyed by the node they observe.
#[derive(Default)]
pub struct WatchRegistry {
    by_node: FxHashMap<NodeId, Vec<(WatchHandle, WatchFn)>>,
    handles: HandleAllocator,
}

impl WatchRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `callback` against `node`, returning a handle that can
    /// later be passed to [`WatchRegistry::unwatch`].
    pub fn watch(&mut self, node: NodeId, callback: WatchFn) -> WatchHandle {
        let handle = WatchHandle(self.handles.next());
        self.by_node.entry(node).or_default().push((handle, callback));
        handle
    }

    /// Removes a previously registered watcher. No-op if `handle` is
    /// unknown or already removed.
    pub fn unwatch(&mut self, node: NodeId, handle: WatchHandle) {
        if let Some(list) = self.by_node.get_mut(&node) {
            list.retain(|(h, _)| *h != handle);
            if list.is_empty() {
                self.by_node.remove(&node);
            }
        }
    }

    /// Returns `true` if `node` has at least one registered watcher.
    #[must_use]
    pub fn has_watchers(&self, node: NodeId) -> bool {
        self.by_node.contains_key(&node)
    }

    /// Invokes every watcher registered on `node` with its current state.
    ///
    /// Each callback runs under `catch_unwind`: a panicking watcher is
    /// logged and skipped rather than aborting the mutation that triggered
    /// it or any subsequent watcher in the list (`spec.md` §5).
    pub fn dispatch(&mut self, node_id: NodeId, node: &Node) {
        let Some(list) = self.by_node.get_mut(&node_id) else {
            return;
        };
        for (handle, callback) in list.iter_mut() {
            let result = catch_unwind(AssertUnwindSafe(|| callback(node_id, node)));
            if result.is_err() {
                tracing::warn!(
                    node = %node_id,
                    handle = handle.0,
                    "watcher callback panicked; continuing dispatch"
                );
            }
        }
    }
}

impl std::fmt::Debug for WatchRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchRegistry")
            .field("watched_nodes", &self.by_node.len())
            .finish()
    }
}
