// SPDX-License-Identifier: Apache-2.0
//! Reactive, ordered node collections (`spec.md` §4.2).
//!
//! Grounded on the teacher's `retention::RetentionSet`, which likewise
//! maintains a reconciled membership set recomputed from a predicate over
//! the live store rather than incrementally patched — FXD groups reconcile
//! wholesale on every matching structural event too, relying on the small
//! size of a typical graph rather than incremental diffing (`spec.md` §4.2
//! "Reconciliation").

use crate::ids::NodeId;
use crate::node::Node;
use crate::selector::Selector;
use crate::store::NodeStore;
use crate::value::Value;

type Predicate = Box<dyn Fn(&Node) -> bool + Send>;
type ChangeCallback = Box<dyn FnMut(&[NodeId]) + Send>;

/// A reactive, ordered collection of node ids assembled from manual
/// membership, selector queries, and a predicate filter.
pub struct Group {
    manual: Vec<NodeId>,
    selectors: Vec<Selector>,
    predicate: Option<Predicate>,
    reactive: bool,
    members: Vec<NodeId>,
    on_change: Vec<ChangeCallback>,
}

impl Default for Group {
    fn default() -> Self {
        Self {
            manual: Vec::new(),
            selectors: Vec::new(),
            predicate: None,
            reactive: true,
            members: Vec::new(),
            on_change: Vec::new(),
        }
    }
}

impl Group {
    /// Creates an empty, reactive group with no manual members or selectors.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `id` to the group's manual membership list.
    pub fn add_manual(&mut self, id: NodeId) {
        if !self.manual.contains(&id) {
            self.manual.push(id);
        }
    }

    /// Removes `id` from the group's manual membership list. Does not
    /// affect membership contributed by selectors.
    pub fn remove_manual(&mut self, id: NodeId) {
        self.manual.retain(|m| *m != id);
    }

    /// Adds a selector that the group reconciles against the live graph
    /// (`spec.md` §4.2 `include(selector)`).
    pub fn include(&mut self, selector: Selector) {
        self.selectors.push(selector);
    }

    /// Sets a client-side filter applied after selector collection
    /// (`spec.md` §4.2 `where(predicate)`).
    pub fn set_predicate(&mut self, predicate: impl Fn(&Node) -> bool + Send + 'static) {
        self.predicate = Some(Box::new(predicate));
    }

    /// Sets whether this group must reconcile within one reactive cycle of
    /// a matching structural event (`spec.md` §4.2 `reactive(bool)`).
    pub fn set_reactive(&mut self, reactive: bool) {
        self.reactive = reactive;
    }

    /// Returns `true` if this group reconciles automatically.
    #[must_use]
    pub fn is_reactive(&self) -> bool {
        self.reactive
    }

    /// Registers a callback invoked after [`Group::reconcile`] changes
    /// membership (`spec.md` §4.2 `on("change", callback)`).
    pub fn on_change(&mut self, callback: ChangeCallback) {
        self.on_change.push(callback);
    }

    /// Returns current membership, ordered by (`meta.order` ascending, then
    /// id ascending as an insertion-order proxy, then name) per
    /// `spec.md` §4.2 `list()`.
    #[must_use]
    pub fn list(&self) -> &[NodeId] {
        &self.members
    }

    /// Returns this group's manually-registered member ids, independent of
    /// any selector-derived membership. This is the slice persisted by
    /// [`crate::kernel::Kernel::save`]; selectors, predicates, and
    /// `on_change` callbacks are not durable state and must be re-registered
    /// by the caller after [`crate::kernel::Kernel::load`].
    #[must_use]
    pub fn manual_members(&self) -> &[NodeId] {
        &self.manual
    }

    /// Rebuilds a group from its persisted manual membership and reactive
    /// flag. `members` is left empty; callers must run [`Group::reconcile`]
    /// once against the reloaded store to repopulate it.
    #[must_use]
    pub fn from_persisted(manual: Vec<NodeId>, reactive: bool) -> Self {
        Self {
            manual,
            reactive,
            ..Self::default()
        }
    }

    /// Recomputes membership against `store` and fires [`Group::on_change`]
    /// callbacks if the ordered membership changed.
    ///
    /// Callers drive this once per reactive tick in which a structural event
    /// (create/delete/meta-change) matched this group's selectors;
    /// `spec.md` §4.2 requires coalescing multiple such events into a
    /// single reconciliation, which is the caller's responsibility (see
    /// [`crate::kernel::Kernel`]'s deferred-reconciliation queue).
    pub fn reconcile(&mut self, store: &NodeStore) {
        let mut candidates: Vec<NodeId> = self.manual.clone();
        if !self.selectors.is_empty() {
            for (id, node) in store.iter() {
                if id.is_root() {
                    continue;
                }
                if self.selectors.iter().all(|s| s.matches(node)) {
                    candidates.push(id);
                }
            }
        }
        candidates.sort_unstable();
        candidates.dedup();

        if let Some(pred) = &self.predicate {
            candidates.retain(|id| store.get(*id).is_some_and(pred.as_ref()));
        } else {
            candidates.retain(|id| store.get(*id).is_some());
        }

        candidates.sort_by(|a, b| order_key(store, *a).cmp(&order_key(store, *b)));

        if candidates != self.members {
            self.members = candidates;
            for callback in &mut self.on_change {
                callback(&self.members);
            }
        }
    }
}

/// `(meta.order, id, name)` — the tuple `spec.md` §4.2's `list()` ordering
/// sorts by. `id` stands in for "insertion order": ids are assigned by a
/// monotonic counter, so a lower id was always created earlier.
fn order_key(store: &NodeStore, id: NodeId) -> (i64, u64, String) {
    let node = store.get(id);
    let order = node
        .and_then(|n| n.meta.get("order"))
        .and_then(|v| match v {
            Value::I64(n) => Some(*n),
            _ => None,
        })
        .unwrap_or(0);
    let name = node.map(|n| n.name.clone()).unwrap_or_default();
    (order, id.as_u64(), name)
}

impl std::fmt::Debug for Group {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Group")
            .field("manual", &self.manual)
            .field("selectors", &self.selectors)
            .field("reactive", &self.reactive)
            .field("members", &self.members)
            .finish_non_exhaustive()
    }
}
