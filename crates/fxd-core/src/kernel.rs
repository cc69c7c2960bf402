// SPDX-License-Identifier: Apache-2.0
//! The kernel: single source of truth for node existence, structure, and
//! values, and the orchestrator that ties every other module together into
//! one coherent mutation pipeline (`spec.md` §4.1).
//!
//! Grounded on the teacher's `engine_impl::Engine`, which likewise owns its
//! state and scheduler behind one `&mut self` surface rather than behind
//! independently lockable pieces — FXD's single-threaded reactive scheduling
//! model (`spec.md` §5) makes the same choice for the same reason: a
//! mutation's side effects (watchers, entanglement, reactive snippets,
//! groups) must observe a single consistent view of the graph, which is only
//! free to guarantee under one exclusive borrow.

use std::path::Path as FsPath;
use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::entangle::{Direction, Link, PropagateOutcome};
use crate::error::{FxdError, Result};
use crate::group::Group;
use crate::ids::{HandleAllocator, LinkHandle, NodeId, SnippetHandle, WatchHandle};
use crate::path::Path;
use crate::persist::{self, Backend};
use crate::reactive_snippet::{ExecutionOutcome, ReactiveSnippet};
use crate::signal::{Cursor, Delta, Signal, SignalKind, SignalStream};
use crate::snippet::{self, ApplyOptions, ApplyOutcome, RenderOptions, SnippetInput};
use crate::store::NodeStore;
use crate::value::Value;
use crate::watch::{WatchFn, WatchRegistry};

/// Internal `meta` key recording whether a node was last written as a
/// compound value, and which shape, so [`Kernel::get`] can reconstruct the
/// `array`/`object` from its children (`spec.md` §3 invariant 4: "Writing a
/// compound value... splits it into child nodes... rather than storing an
/// opaque blob"). Never surfaced to callers and never persisted as a
/// user-visible meta entry beyond what the generic meta table already
/// carries.
const SHAPE_META_KEY: &str = "__shape";
const SHAPE_ARRAY: &str = "array";
const SHAPE_OBJECT: &str = "object";

/// Single source of truth for node existence, structure, and values.
///
/// Every public mutation (`set`, `delete`, `set_meta`, marker application)
/// runs the full reactive pipeline in order: compute delta, bump version,
/// append to the signal stream, dispatch local watchers, then propagate to
/// entanglement links, reactive snippets, and group reconciliation
/// (`spec.md` §4.1 "Mutation algorithm").
pub struct Kernel {
    store: NodeStore,
    watchers: WatchRegistry,
    signals: SignalStream,
    groups: FxHashMap<NodeId, Group>,
    links: FxHashMap<LinkHandle, Link>,
    link_ids: HandleAllocator,
    snippets: FxHashMap<SnippetHandle, ReactiveSnippet>,
    snippet_ids: HandleAllocator,
}

impl Kernel {
    /// Creates an empty kernel, timestamping signals with `clock`.
    #[must_use]
    pub fn new(clock: Arc<dyn Fn() -> u64 + Send + Sync>) -> Self {
        Self {
            store: NodeStore::new(),
            watchers: WatchRegistry::new(),
            signals: SignalStream::new(clock),
            groups: FxHashMap::default(),
            links: FxHashMap::default(),
            link_ids: HandleAllocator::default(),
            snippets: FxHashMap::default(),
            snippet_ids: HandleAllocator::default(),
        }
    }

    /// Creates an empty kernel timestamping signals from the system clock.
    /// Tests and anything that needs deterministic timestamps should use
    /// [`Kernel::new`] with an injected clock instead.
    #[must_use]
    pub fn new_with_system_clock() -> Self {
        Self::new(Arc::new(|| {
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_nanos() as u64)
                .unwrap_or(0)
        }))
    }

    // -- Node existence, structure, and values (`spec.md` §4.1) -----------

    /// The id of the graph root.
    #[must_use]
    pub fn root(&self) -> NodeId {
        self.store.root_id()
    }

    /// Resolves `path` to an existing node id, without creating anything.
    ///
    /// # Errors
    /// Returns [`FxdError::InvalidPath`] if `path` contains an empty segment.
    pub fn resolve(&self, path: Path<'_>) -> Result<Option<NodeId>> {
        self.store.resolve(path)
    }

    /// Resolves `path`, auto-vivifying any missing nodes along the way.
    ///
    /// # Errors
    /// Returns [`FxdError::InvalidPath`] if `path` contains an empty segment.
    pub fn ensure(&mut self, path: Path<'_>) -> Result<NodeId> {
        self.store.ensure(path)
    }

    /// Reads `id`'s current value, reconstructing a compound `array`/`object`
    /// from its children if the node was last written as one
    /// (`spec.md` §3 invariant 4, §8 property 4).
    ///
    /// # Errors
    /// Returns [`FxdError::NotFound`] if `id` is not live.
    pub fn get(&self, id: NodeId) -> Result<Value> {
        let node = self.store.get(id).ok_or_else(|| FxdError::NotFound(id.to_string()))?;
        match node.meta.get(SHAPE_META_KEY) {
            Some(Value::String(shape)) if shape == SHAPE_ARRAY => {
                let mut indexed: Vec<(usize, NodeId)> = self
                    .store
                    .children(id)
                    .into_iter()
                    .filter_map(|(name, child)| name.parse::<usize>().ok().map(|i| (i, child)))
                    .collect();
                indexed.sort_unstable_by_key(|(i, _)| *i);
                let mut items = Vec::with_capacity(indexed.len());
                for (_, child) in indexed {
                    items.push(self.get(child)?);
                }
                Ok(Value::Array(items))
            }
            Some(Value::String(shape)) if shape == SHAPE_OBJECT => {
                let mut map = std::collections::BTreeMap::new();
                for (name, child) in self.store.children(id) {
                    map.insert(name.to_string(), self.get(child)?);
                }
                Ok(Value::Object(map))
            }
            _ => Ok(node.value.clone()),
        }
    }

    /// Writes `value` to `id`.
    ///
    /// A no-op (no signal, no watcher dispatch) if `value` structurally
    /// equals the node's current (reconstructed) value — `Handle` values
    /// never short-circuit this way (`spec.md` §4.1 "idempotence").
    ///
    /// Compound values (`array`/`object`) are split into child nodes rather
    /// than stored directly; scalars mutate the node in place and run the
    /// full reactive pipeline: signal append, watcher dispatch, entanglement
    /// propagation, then reactive-snippet re-execution (`spec.md` §4.1).
    ///
    /// # Errors
    /// Returns [`FxdError::NotFound`] if `id` is not live, or
    /// [`FxdError::InvalidType`] if `id`'s `type_tag` rejects `value`'s kind.
    pub fn set(&mut self, id: NodeId, value: Value) -> Result<()> {
        {
            let node = self.store.get(id).ok_or_else(|| FxdError::NotFound(id.to_string()))?;
            if !node.accepts(&value) {
                return Err(FxdError::InvalidType { node: id, found: value.kind() });
            }
        }
        if !value.is_handle() {
            let current = self.get(id)?;
            if current == value {
                return Ok(());
            }
        }
        if value.is_compound() {
            self.set_compound(id, value)
        } else {
            self.set_scalar(id, value)
        }
    }

    #[allow(clippy::expect_used)] // id is resolved by `set`/`ensure` just before this is called
    fn set_scalar(&mut self, id: NodeId, value: Value) -> Result<()> {
        let (old_value, base_version, new_version) = {
            let node = self.store.get_mut(id).expect("checked by caller");
            node.meta.remove(SHAPE_META_KEY);
            let old = std::mem::replace(&mut node.value, value.clone());
            let base = node.version;
            let new_version = node.bump_version();
            (old, base, new_version)
        };
        self.signals.append(
            SignalKind::Value,
            base_version,
            new_version,
            id,
            Delta::Value { old: old_value, new: value.clone() },
        );
        self.watchers.dispatch(id, self.store.get(id).expect("just written"));
        self.propagate_entanglement(id, &value)?;
        self.reexecute_snippets(id)?;
        Ok(())
    }

    fn set_compound(&mut self, id: NodeId, value: Value) -> Result<()> {
        let (shape, entries): (&str, Vec<(String, Value)>) = match value {
            Value::Array(items) => (SHAPE_ARRAY, items.into_iter().enumerate().map(|(i, v)| (i.to_string(), v)).collect()),
            Value::Object(map) => (SHAPE_OBJECT, map.into_iter().collect()),
            _ => unreachable!("caller only routes compound values here"),
        };

        let wanted: std::collections::BTreeSet<&str> = entries.iter().map(|(k, _)| k.as_str()).collect();
        let existing_children: Vec<(String, NodeId)> =
            self.store.children(id).into_iter().map(|(name, child)| (name.to_string(), child)).collect();
        for (name, child_id) in existing_children {
            if !wanted.contains(name.as_str()) {
                self.delete(child_id)?;
            }
        }

        let base_path = self.store.path_of(id);
        for (name, child_value) in entries {
            let child_path_str = if base_path.is_empty() { name } else { format!("{base_path}.{name}") };
            let child_id = self.ensure(Path::parse(&child_path_str))?;
            self.set(child_id, child_value)?;
        }

        if let Some(node) = self.store.get_mut(id) {
            node.meta.insert(SHAPE_META_KEY.to_string(), Value::String(shape.to_string()));
        }
        Ok(())
    }

    /// Reads meta key `key` on `id`.
    #[must_use]
    pub fn meta(&self, id: NodeId, key: &str) -> Option<Value> {
        self.store.get(id).and_then(|n| n.meta.get(key).cloned())
    }

    /// Sets (or clears, when `value` is `None`) meta key `key` on `id`,
    /// running the same signal/watcher/group-reconciliation pipeline as
    /// [`Kernel::set`] (`spec.md` §4.1, §4.2 "Reconciliation").
    ///
    /// # Errors
    /// Returns [`FxdError::NotFound`] if `id` is not live.
    pub fn set_meta(&mut self, id: NodeId, key: &str, value: Option<Value>) -> Result<()> {
        self.set_meta_internal(id, key, value)?;
        self.reconcile_all_groups();
        Ok(())
    }

    #[allow(clippy::expect_used)] // id was just written to by the caller; the node cannot have vanished
    fn set_meta_internal(&mut self, id: NodeId, key: &str, value: Option<Value>) -> Result<()> {
        let (old, base_version, new_version, old_snippet_id, new_snippet_id) = {
            let node = self.store.get_mut(id).ok_or_else(|| FxdError::NotFound(id.to_string()))?;
            let old = node.meta.get(key).cloned();
            if old.as_ref() == value.as_ref() {
                return Ok(());
            }
            let old_snippet_id = if key == "id" { node.snippet_id().map(str::to_string) } else { None };
            match &value {
                Some(v) => {
                    node.meta.insert(key.to_string(), v.clone());
                }
                None => {
                    node.meta.remove(key);
                }
            }
            let base = node.version;
            let new_version = node.bump_version();
            let new_snippet_id = if key == "id" { node.snippet_id().map(str::to_string) } else { None };
            (old, base, new_version, old_snippet_id, new_snippet_id)
        };
        if key == "id" {
            self.store.reindex_snippet(id, old_snippet_id.as_deref(), new_snippet_id.as_deref());
        }
        self.signals.append(
            SignalKind::Metadata,
            base_version,
            new_version,
            id,
            Delta::Metadata { key: key.to_string(), old, new: value },
        );
        self.watchers.dispatch(id, self.store.get(id).expect("just updated"));
        Ok(())
    }

    /// Returns `id`'s children as `(name, NodeId)` pairs, name-ordered.
    #[must_use]
    pub fn children(&self, id: NodeId) -> Vec<(String, NodeId)> {
        self.store.children(id).into_iter().map(|(name, child)| (name.to_string(), child)).collect()
    }

    /// Returns `id`'s parent, or `None` for the root or an unknown id.
    #[must_use]
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.store.parent(id)
    }

    /// Deletes `id` and its entire subtree. A no-op for the root or an
    /// already-absent id.
    ///
    /// Emits one [`SignalKind::Children`] signal per removed node in
    /// bottom-up order, then one more for the parent's own children-map
    /// change, disposes any entanglement link touching a removed node
    /// (`spec.md` §4.3 "must tolerate the disappearance of an endpoint"),
    /// and reconciles reactive groups.
    ///
    /// # Errors
    /// Never errors; returns `Ok(())` unconditionally. The `Result` return
    /// type matches every other kernel mutation for API consistency.
    pub fn delete(&mut self, id: NodeId) -> Result<()> {
        if id.is_root() || !self.store.contains(id) {
            return Ok(());
        }
        let parent_id = self.store.parent(id);
        let name = self.store.get(id).map(|n| n.name.clone()).unwrap_or_default();
        let removed = self.store.delete_subtree(id);
        if removed.is_empty() {
            return Ok(());
        }

        for &removed_id in &removed {
            self.signals.append(
                SignalKind::Children,
                0,
                0,
                removed_id,
                Delta::Children { name: String::new(), child: removed_id, added: false },
            );
            self.dispose_links_for(removed_id);
        }

        if let Some(parent_id) = parent_id {
            if let Some(parent_node) = self.store.get_mut(parent_id) {
                let base = parent_node.version;
                let new_version = parent_node.bump_version();
                self.signals.append(SignalKind::Children, base, new_version, parent_id, Delta::Children { name, child: id, added: false });
            }
        }
        self.reconcile_all_groups();
        Ok(())
    }

    fn dispose_links_for(&mut self, node_id: NodeId) {
        for link in self.links.values_mut() {
            if link.source() == node_id || link.target() == node_id {
                link.dispose();
            }
        }
    }

    /// Registers `callback` to run whenever `id` is mutated.
    pub fn watch(&mut self, id: NodeId, callback: WatchFn) -> WatchHandle {
        self.watchers.watch(id, callback)
    }

    /// Unregisters a watcher previously returned by [`Kernel::watch`].
    pub fn unwatch(&mut self, id: NodeId, handle: WatchHandle) {
        self.watchers.unwatch(id, handle);
    }

    /// Returns a short-lived [`NodeProxy`] for `path`, auto-vivifying it if
    /// absent (`spec.md` §4.1 `proxy(path)`).
    ///
    /// # Errors
    /// Returns [`FxdError::InvalidPath`] if `path` contains an empty segment.
    pub fn proxy(&mut self, path: Path<'_>) -> Result<NodeProxy<'_>> {
        let id = self.ensure(path)?;
        Ok(NodeProxy { kernel: self, id })
    }

    // -- Entanglement (`spec.md` §4.3) -------------------------------------

    /// Creates an entanglement link between `source` and `target`. If
    /// `initial_sync`, performs one propagation immediately in the
    /// direction implied by `direction` (A→B unless `direction` is
    /// exclusively `BtoA`), matching the link's own note that it holds no
    /// reference to the kernel and cannot read endpoint values itself.
    ///
    /// # Errors
    /// Returns [`FxdError::NotFound`] if either endpoint is not live.
    pub fn create_link(&mut self, source: NodeId, target: NodeId, direction: Direction, initial_sync: bool) -> Result<LinkHandle> {
        if !self.store.contains(source) {
            return Err(FxdError::NotFound(source.to_string()));
        }
        if !self.store.contains(target) {
            return Err(FxdError::NotFound(target.to_string()));
        }
        let handle = LinkHandle(self.link_ids.next());
        self.links.insert(handle, Link::new(source, target, direction));
        if initial_sync {
            self.sync_link(handle)?;
        }
        Ok(handle)
    }

    #[allow(clippy::expect_used)] // handle was just inserted into self.links above
    fn sync_link(&mut self, handle: LinkHandle) -> Result<()> {
        let (source, target, direction) = {
            let link = self.links.get(&handle).ok_or_else(|| FxdError::NotFound(format!("link {}", handle.0)))?;
            (link.source(), link.target(), link.direction())
        };
        if direction == Direction::BtoA {
            let current_source = self.get(source)?;
            let current_target = self.get(target)?;
            let (outcome, value) = {
                let link = self.links.get_mut(&handle).expect("handle exists");
                link.propagate_b_to_a(&current_target, &current_source)
            };
            if outcome == PropagateOutcome::Applied {
                if let Some(v) = value {
                    self.set(source, v)?;
                }
            }
        } else {
            let current_source = self.get(source)?;
            let current_target = self.get(target)?;
            let (outcome, value) = {
                let link = self.links.get_mut(&handle).expect("handle exists");
                link.propagate_a_to_b(&current_source, &current_target)
            };
            if outcome == PropagateOutcome::Applied {
                if let Some(v) = value {
                    self.set(target, v)?;
                }
            }
        }
        if let Some(link) = self.links.get_mut(&handle) {
            link.finish_propagation();
        }
        Ok(())
    }

    #[allow(clippy::expect_used)] // handle was collected from self.links just above, in the same borrow scope
    fn propagate_entanglement(&mut self, changed: NodeId, new_value: &Value) -> Result<()> {
        let handles: Vec<LinkHandle> = self
            .links
            .iter()
            .filter(|(_, link)| !link.is_disposed() && (link.source() == changed || link.target() == changed))
            .map(|(handle, _)| *handle)
            .collect();

        for handle in handles {
            let Some(link) = self.links.get(&handle) else { continue };
            let is_source = link.source() == changed;
            let other = if is_source { link.target() } else { link.source() };
            let Ok(current_other) = self.get(other) else { continue };

            let (outcome, value) = {
                let link = self.links.get_mut(&handle).expect("handle collected above");
                if is_source {
                    link.propagate_a_to_b(new_value, &current_other)
                } else {
                    link.propagate_b_to_a(new_value, &current_other)
                }
            };
            if outcome == PropagateOutcome::Applied {
                if let Some(v) = value {
                    self.set(other, v)?;
                }
            }
            if let Some(link) = self.links.get_mut(&handle) {
                link.finish_propagation();
            }
        }
        Ok(())
    }

    /// Mutably borrows a live link for configuration (transforms, hooks,
    /// debounce, pause/resume/dispose) — see [`crate::entangle::Link`].
    pub fn link_mut(&mut self, handle: LinkHandle) -> Option<&mut Link> {
        self.links.get_mut(&handle)
    }

    /// Permanently disables a link. No-op if `handle` is unknown.
    pub fn dispose_link(&mut self, handle: LinkHandle) {
        if let Some(link) = self.links.get_mut(&handle) {
            link.dispose();
        }
    }

    // -- Reactive snippets (`spec.md` §4.4) --------------------------------

    /// Registers a reactive snippet. If `reactive()`, executes it once
    /// immediately so its output reflects current inputs without waiting
    /// for the next dependency change.
    pub fn register_snippet(&mut self, snippet: ReactiveSnippet) -> Result<SnippetHandle> {
        let handle = SnippetHandle(self.snippet_ids.next());
        let reactive = snippet.is_reactive();
        self.snippets.insert(handle, snippet);
        if reactive {
            self.execute_snippet(handle)?;
        }
        Ok(handle)
    }

    /// Unregisters a reactive snippet. No-op if `handle` is unknown.
    pub fn unregister_snippet(&mut self, handle: SnippetHandle) {
        self.snippets.remove(&handle);
    }

    /// Mutably borrows a registered snippet (e.g. to flip `reactive` or
    /// adjust its debounce window).
    pub fn snippet_mut(&mut self, handle: SnippetHandle) -> Option<&mut ReactiveSnippet> {
        self.snippets.get_mut(&handle)
    }

    fn reexecute_snippets(&mut self, changed: NodeId) -> Result<()> {
        let handles: Vec<SnippetHandle> = self
            .snippets
            .iter()
            .filter(|(_, snippet)| snippet.is_reactive() && snippet.watched_paths().contains(&changed))
            .map(|(handle, _)| *handle)
            .collect();
        for handle in handles {
            self.execute_snippet(handle)?;
        }
        Ok(())
    }

    /// Runs a snippet's bound function against its inputs' current values
    /// and writes the result to its output path, if any. Absent bound
    /// inputs skip execution silently (`spec.md` §4.4); a function error is
    /// recorded on the snippet's `last_error` and logged, not propagated.
    ///
    /// # Errors
    /// Returns [`FxdError::NotFound`] if `handle` is unknown, or whatever
    /// [`Kernel::set`] returns when writing a live output node.
    #[allow(clippy::expect_used)] // handle's existence was just checked against self.snippets above
    pub fn execute_snippet(&mut self, handle: SnippetHandle) -> Result<()> {
        let watched = {
            let snippet = self.snippets.get(&handle).ok_or_else(|| FxdError::NotFound(format!("snippet {}", handle.0)))?;
            snippet.watched_paths()
        };
        let mut raw = FxHashMap::default();
        for id in &watched {
            if let Ok(value) = self.get(*id) {
                raw.insert(*id, value);
            }
        }
        let outcome = {
            let snippet = self.snippets.get_mut(&handle).expect("checked above");
            snippet.execute(&raw)
        };
        match outcome {
            ExecutionOutcome::Produced(value) => {
                let output = self.snippets.get(&handle).and_then(ReactiveSnippet::output);
                if let Some(output_id) = output {
                    if self.store.contains(output_id) {
                        self.set(output_id, value)?;
                    } else {
                        tracing::warn!(snippet = handle.0, "reactive snippet output node no longer exists; result dropped");
                    }
                }
            }
            ExecutionOutcome::SkippedMissingParam { param } => {
                tracing::debug!(snippet = handle.0, %param, "reactive snippet skipped: missing parameter");
            }
            ExecutionOutcome::Failed { message } => {
                tracing::warn!(snippet = handle.0, error = %message, "reactive snippet execution failed");
            }
        }
        Ok(())
    }

    // -- Groups (`spec.md` §4.2) -------------------------------------------

    /// Creates (or returns the existing) group rooted at `path`.
    ///
    /// # Errors
    /// Returns [`FxdError::InvalidPath`] if `path` contains an empty segment.
    pub fn create_group(&mut self, path: Path<'_>) -> Result<NodeId> {
        let group_id = self.ensure(path)?;
        if let Some(node) = self.store.get_mut(group_id) {
            if node.type_tag.is_none() {
                node.type_tag = Some("group".to_string());
            }
        }
        self.groups.entry(group_id).or_insert_with(Group::new);
        Ok(group_id)
    }

    /// Mutably borrows a registered group for configuration (`include`,
    /// `where`, `reactive`, `on_change`, manual membership).
    pub fn group_mut(&mut self, group_id: NodeId) -> Option<&mut Group> {
        self.groups.get_mut(&group_id)
    }

    /// Returns a group's current ordered membership.
    #[must_use]
    pub fn group_list(&self, group_id: NodeId) -> Option<&[NodeId]> {
        self.groups.get(&group_id).map(Group::list)
    }

    /// Forces a reconciliation of `group_id` against the live graph,
    /// regardless of its `reactive` flag.
    pub fn reconcile_group(&mut self, group_id: NodeId) {
        if let Some(group) = self.groups.get_mut(&group_id) {
            group.reconcile(&self.store);
        }
    }

    fn reconcile_all_groups(&mut self) {
        let ids: Vec<NodeId> = self.groups.keys().copied().collect();
        for id in ids {
            if let Some(group) = self.groups.get_mut(&id) {
                if group.is_reactive() {
                    group.reconcile(&self.store);
                }
            }
        }
    }

    /// Reconciles every group regardless of its reactive flag, used once
    /// after [`Kernel::load`] to populate membership for groups restored
    /// with empty `members` (`spec.md` §9 Design Note).
    fn reconcile_all_groups_unconditionally(&mut self) {
        let ids: Vec<NodeId> = self.groups.keys().copied().collect();
        for id in ids {
            if let Some(group) = self.groups.get_mut(&id) {
                group.reconcile(&self.store);
            }
        }
    }

    // -- Signal stream passthroughs (`spec.md` §4.6) -----------------------

    /// Replays every signal matching `kind` from `from`, then registers
    /// `callback` for future records. Returns an id usable to unsubscribe.
    pub fn subscribe_signals(&mut self, kind: Option<SignalKind>, from: Cursor, callback: Box<dyn FnMut(&Signal) + Send>) -> u64 {
        self.signals.subscribe(kind, from, callback)
    }

    /// Registers `callback` for future signals only.
    pub fn tail_signals(&mut self, kind: Option<SignalKind>, callback: Box<dyn FnMut(&Signal) + Send>) -> u64 {
        self.signals.tail(kind, callback)
    }

    /// Removes a previously registered signal subscriber.
    pub fn unsubscribe_signals(&mut self, id: u64) {
        self.signals.unsubscribe(id);
    }

    /// The current end of the signal stream.
    #[must_use]
    pub fn signal_cursor(&self) -> Cursor {
        self.signals.cursor()
    }

    /// Every signal recorded from `from` to the current end.
    #[must_use]
    pub fn signals_since(&self, from: Cursor) -> &[Signal] {
        self.signals.records_since(from)
    }

    // -- Persistence passthroughs (`spec.md` §4.7) -------------------------

    /// Saves the graph to `path` using `backend`. Each group's manual
    /// membership and reactive flag are saved alongside it; selectors,
    /// predicates, and `on_change` callbacks are not data and are dropped.
    ///
    /// # Errors
    /// Propagates the underlying backend's I/O or encoding errors.
    pub fn save(&self, path: impl AsRef<FsPath>, backend: Backend) -> Result<()> {
        persist::save(path, &self.store, &self.groups, backend)
    }

    /// Loads a graph from `path` into this kernel using `backend`, replacing
    /// the node store wholesale. Each group's manual membership and reactive
    /// flag are restored and reconciled against the reloaded store, so a
    /// view built solely from manual membership re-renders identically.
    /// Entanglement links and reactive snippets, along with any group
    /// selectors, predicates, and `on_change` callbacks, are not persisted;
    /// a higher layer that wants them back must re-register them against the
    /// reloaded node ids (`spec.md` §9 Design Note).
    ///
    /// # Errors
    /// Propagates the underlying backend's I/O, schema, or decoding errors.
    pub fn load(&mut self, path: impl AsRef<FsPath>, backend: Backend) -> Result<()> {
        persist::load(path, &mut self.store, &mut self.groups, backend)?;
        self.reconcile_all_groups_unconditionally();
        Ok(())
    }

    // -- Snippet/marker view engine (`spec.md` §4.5) -----------------------

    /// Renders `group_id`'s current membership into a marker-delimited text
    /// document.
    ///
    /// # Errors
    /// Returns [`FxdError::NotFound`] if `group_id` has no registered group,
    /// or [`FxdError::InvalidType`] if a member's value is not a string.
    pub fn render_view(&self, group_id: NodeId, opts: &RenderOptions) -> Result<String> {
        let group = self.groups.get(&group_id).ok_or_else(|| FxdError::NotFound(group_id.to_string()))?;
        let mut inputs = Vec::with_capacity(group.list().len());
        for &id in group.list() {
            let node = self.store.get(id).ok_or_else(|| FxdError::NotFound(id.to_string()))?;
            let body = match self.get(id)? {
                Value::String(s) => s,
                other => return Err(FxdError::InvalidType { node: id, found: other.kind() }),
            };
            let lang = match node.meta.get("lang") {
                Some(Value::String(s)) => Some(s.clone()),
                _ => None,
            };
            let file = match node.meta.get("file") {
                Some(Value::String(s)) => Some(s.clone()),
                _ => None,
            };
            let order = match node.meta.get("order") {
                Some(Value::I64(n)) => Some(*n),
                _ => None,
            };
            inputs.push(SnippetInput {
                id: node.snippet_id().unwrap_or_default().to_string(),
                lang: lang.or_else(|| Some(opts.lang.clone())),
                file,
                order,
                version: Some(node.version),
                body,
            });
        }
        Ok(snippet::render_view(&inputs, opts))
    }

    /// Parses `text` for marker regions and applies each to the matching
    /// snippet node, running the signal/watcher/group pipeline for every
    /// node whose value actually changed.
    ///
    /// # Errors
    /// Returns [`FxdError::SnippetNotFound`] if a patch's id has no match
    /// and `opts.on_missing == OnMissing::Reject`.
    #[allow(clippy::expect_used)] // id was just re-read from self.store two lines above
    pub fn apply_view_patches(&mut self, text: &str, opts: &ApplyOptions) -> Result<ApplyOutcome> {
        let parsed = snippet::to_patches(text);
        for warning in &parsed.warnings {
            tracing::warn!(%warning, "marker parse warning");
        }

        let before: FxHashMap<String, Value> = parsed
            .patches
            .iter()
            .filter_map(|p| {
                self.store
                    .find_by_snippet_id(&p.id)
                    .and_then(|id| self.store.get(id))
                    .map(|n| (p.id.clone(), n.value.clone()))
            })
            .collect();

        let outcome = snippet::apply_patches(&mut self.store, &parsed.patches, opts)?;
        for warning in &outcome.warnings {
            tracing::warn!(%warning, "marker patch warning");
        }

        for &id in &outcome.applied {
            let (new_value, sid, version) = {
                let Some(node) = self.store.get(id) else { continue };
                (node.value.clone(), node.snippet_id().unwrap_or_default().to_string(), node.version)
            };
            let old_value = before.get(&sid).cloned().unwrap_or(Value::None);
            if old_value != new_value {
                self.signals.append(
                    SignalKind::Value,
                    version.saturating_sub(1),
                    version,
                    id,
                    Delta::Value { old: old_value, new: new_value },
                );
            }
            self.watchers.dispatch(id, self.store.get(id).expect("just read"));
            let current_value = self.get(id)?;
            self.propagate_entanglement(id, &current_value)?;
            self.reexecute_snippets(id)?;
        }
        for &id in &outcome.created {
            if let Some(node) = self.store.get(id) {
                self.watchers.dispatch(id, node);
            }
        }
        self.reconcile_all_groups();
        Ok(outcome)
    }
}

impl std::fmt::Debug for Kernel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Kernel")
            .field("nodes", &self.store.len())
            .field("groups", &self.groups.len())
            .field("links", &self.links.len())
            .field("snippets", &self.snippets.len())
            .field("signals", &self.signals.len())
            .finish_non_exhaustive()
    }
}

/// A short-lived, ergonomic handle onto one node, returned by
/// [`Kernel::proxy`] (`spec.md` §4.1 `proxy(path)`).
pub struct NodeProxy<'a> {
    kernel: &'a mut Kernel,
    id: NodeId,
}

impl NodeProxy<'_> {
    /// The underlying node id.
    #[must_use]
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Reads the node's current value.
    ///
    /// # Errors
    /// See [`Kernel::get`].
    pub fn get(&self) -> Result<Value> {
        self.kernel.get(self.id)
    }

    /// Writes the node's value.
    ///
    /// # Errors
    /// See [`Kernel::set`].
    pub fn set(&mut self, value: Value) -> Result<()> {
        self.kernel.set(self.id, value)
    }

    /// Reads a meta key on the node.
    #[must_use]
    pub fn meta(&self, key: &str) -> Option<Value> {
        self.kernel.meta(self.id, key)
    }

    /// Sets (or clears) a meta key on the node.
    ///
    /// # Errors
    /// See [`Kernel::set_meta`].
    pub fn set_meta(&mut self, key: &str, value: Option<Value>) -> Result<()> {
        self.kernel.set_meta(self.id, key, value)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]

    use super::*;
    use crate::reactive_snippet::Param;
    use std::sync::atomic::{AtomicU64, Ordering};

    fn test_kernel() -> Kernel {
        let counter = Arc::new(AtomicU64::new(0));
        Kernel::new(Arc::new(move || counter.fetch_add(1, Ordering::SeqCst)))
    }

    #[test]
    fn set_and_get_round_trip_a_scalar() {
        let mut kernel = test_kernel();
        let id = kernel.ensure(Path::parse("a.b")).unwrap();
        kernel.set(id, Value::I64(42)).unwrap();
        assert_eq!(kernel.get(id).unwrap(), Value::I64(42));
    }

    #[test]
    fn set_is_idempotent_for_equal_values() {
        let mut kernel = test_kernel();
        let id = kernel.ensure(Path::parse("a")).unwrap();
        kernel.set(id, Value::I64(1)).unwrap();
        let cursor_before = kernel.signal_cursor();
        kernel.set(id, Value::I64(1)).unwrap();
        assert_eq!(kernel.signal_cursor(), cursor_before);
    }

    #[test]
    fn set_reconstructs_compound_values_from_children() {
        let mut kernel = test_kernel();
        let id = kernel.ensure(Path::parse("config")).unwrap();
        let mut obj = std::collections::BTreeMap::new();
        obj.insert("host".to_string(), Value::String("localhost".to_string()));
        obj.insert("port".to_string(), Value::I64(8080));
        kernel.set(id, Value::Object(obj.clone())).unwrap();
        assert_eq!(kernel.get(id).unwrap(), Value::Object(obj));
    }

    #[test]
    fn array_round_trips_preserving_order() {
        let mut kernel = test_kernel();
        let id = kernel.ensure(Path::parse("list")).unwrap();
        let arr = Value::Array(vec![Value::I64(3), Value::I64(1), Value::I64(2)]);
        kernel.set(id, arr.clone()).unwrap();
        assert_eq!(kernel.get(id).unwrap(), arr);
    }

    #[test]
    fn delete_removes_subtree_and_parent_link() {
        let mut kernel = test_kernel();
        let parent = kernel.ensure(Path::parse("a")).unwrap();
        kernel.ensure(Path::parse("a.b")).unwrap();
        kernel.delete(parent).unwrap();
        assert_eq!(kernel.resolve(Path::parse("a")).unwrap(), None);
    }

    #[test]
    fn watch_fires_on_value_change() {
        let mut kernel = test_kernel();
        let id = kernel.ensure(Path::parse("x")).unwrap();
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let seen2 = Arc::clone(&seen);
        kernel.watch(
            id,
            Box::new(move |_, node| {
                seen2.lock().expect("lock").push(node.version);
            }),
        );
        kernel.set(id, Value::I64(7)).unwrap();
        assert_eq!(*seen.lock().expect("lock"), vec![1]);
    }

    #[test]
    fn celsius_fahrenheit_entanglement_propagates_one_direction_without_oscillation() {
        let mut kernel = test_kernel();
        let celsius = kernel.ensure(Path::parse("temp.celsius")).unwrap();
        let fahrenheit = kernel.ensure(Path::parse("temp.fahrenheit")).unwrap();
        kernel.set(celsius, Value::F64(0.0)).unwrap();
        kernel.set(fahrenheit, Value::F64(32.0)).unwrap();

        let handle = kernel.create_link(celsius, fahrenheit, Direction::Both, false).unwrap();
        {
            let link = kernel.link_mut(handle).unwrap();
            link.set_map_a_to_b(Box::new(|v| match v {
                Value::F64(c) => Value::F64(*c * 9.0 / 5.0 + 32.0),
                other => other.clone(),
            }));
            link.set_map_b_to_a(Box::new(|v| match v {
                Value::F64(f) => Value::F64((*f - 32.0) * 5.0 / 9.0),
                other => other.clone(),
            }));
        }

        let cursor_before = kernel.signal_cursor();
        kernel.set(celsius, Value::F64(100.0)).unwrap();
        assert_eq!(kernel.get(fahrenheit).unwrap(), Value::F64(212.0));

        let recorded = kernel.signals_since(cursor_before);
        assert_eq!(recorded.len(), 2); // celsius write, fahrenheit write — no oscillation
    }

    #[test]
    fn reactive_snippet_executes_on_registration_and_on_input_change() {
        let mut kernel = test_kernel();
        let a = kernel.ensure(Path::parse("inputs.a")).unwrap();
        let b = kernel.ensure(Path::parse("inputs.b")).unwrap();
        let sum = kernel.ensure(Path::parse("outputs.sum")).unwrap();
        kernel.set(a, Value::I64(10)).unwrap();
        kernel.set(b, Value::I64(5)).unwrap();

        let mut snippet = ReactiveSnippet::new(
            vec![Param::new("a".to_string(), a), Param::new("b".to_string(), b)],
            Box::new(|args, _ctx| match (&args[0], &args[1]) {
                (Value::I64(x), Value::I64(y)) => Ok(Value::I64(x + y)),
                _ => Err("expected two i64 params".to_string()),
            }),
            "a + b".to_string(),
        );
        snippet.set_output(sum);
        kernel.register_snippet(snippet).unwrap();
        assert_eq!(kernel.get(sum).unwrap(), Value::I64(15));

        kernel.set(a, Value::I64(20)).unwrap();
        assert_eq!(kernel.get(sum).unwrap(), Value::I64(25));
    }

    #[test]
    fn group_reconciles_on_manual_membership_and_on_delete() {
        let mut kernel = test_kernel();
        let group_id = kernel.create_group(Path::parse("views.main")).unwrap();
        let member = kernel.ensure(Path::parse("snippets.a")).unwrap();

        kernel.group_mut(group_id).unwrap().add_manual(member);
        kernel.reconcile_group(group_id);
        assert_eq!(kernel.group_list(group_id).unwrap(), &[member]);

        kernel.delete(member).unwrap();
        assert!(kernel.group_list(group_id).unwrap().is_empty());
    }

    #[test]
    fn save_and_load_round_trips_through_fxd_backend() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graph.fxd");
        let mut kernel = test_kernel();
        let id = kernel.ensure(Path::parse("a.b")).unwrap();
        kernel.set(id, Value::String("hi".to_string())).unwrap();
        kernel.save(&path, Backend::Fxd).unwrap();

        let mut reloaded = test_kernel();
        reloaded.load(&path, Backend::Fxd).unwrap();
        let reloaded_id = reloaded.resolve(Path::parse("a.b")).unwrap().unwrap();
        assert_eq!(reloaded.get(reloaded_id).unwrap(), Value::String("hi".to_string()));
    }

    #[test]
    fn a_manual_membership_view_renders_identically_after_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graph.fxwal");
        let mut kernel = test_kernel();

        let header = kernel.ensure(Path::parse("repo.header")).unwrap();
        kernel.set(header, Value::String("import { db } from './db.js'".to_string())).unwrap();
        let find = kernel.ensure(Path::parse("repo.find")).unwrap();
        kernel
            .set(find, Value::String("export async function findUser(id){ return db.users.find(u => u.id===id) }".to_string()))
            .unwrap();

        let group_id = kernel.create_group(Path::parse("views.repoFile")).unwrap();
        kernel.group_mut(group_id).unwrap().add_manual(header);
        kernel.group_mut(group_id).unwrap().add_manual(find);
        kernel.reconcile_group(group_id);

        let before = kernel.render_view(group_id, &RenderOptions::default()).unwrap();

        kernel.save(&path, Backend::Fxwal).unwrap();
        let mut reloaded = test_kernel();
        reloaded.load(&path, Backend::Fxwal).unwrap();

        let after = reloaded.render_view(group_id, &RenderOptions::default()).unwrap();
        assert_eq!(before, after);
    }
}
