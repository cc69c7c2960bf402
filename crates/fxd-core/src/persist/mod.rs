// SPDX-License-Identifier: Apache-2.0
//! Durable persistence for the node graph: two interchangeable backends
//! sharing the same `UArr` value encoding (`spec.md` §4.7).
//!
//! [`fxd`] is a SQLite-backed snapshot format suited to infrequent full
//! saves; [`fxwal`] is an append-only log suited to continuous durability
//! with crash-safe replay. Both reconstruct a [`crate::store::NodeStore`]
//! wholesale on load rather than diffing against live state.

pub mod fxd;
pub mod fxwal;

use std::collections::BTreeMap;
use std::path::Path;

use rustc_hash::FxHashMap;

use crate::error::{FxdError, Result};
use crate::group::Group;
use crate::ids::NodeId;
use crate::store::NodeStore;
use crate::value::Value;

/// Names the persistence backend a graph is durable under.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Backend {
    /// SQLite-backed `.fxd` snapshot.
    Fxd,
    /// WAL-backed `.fxwal` append log.
    Fxwal,
}

/// Saves `store` and `groups` to `path` using `backend`.
///
/// For [`Backend::Fxwal`], this writes a single [`fxwal::RecordKind::Checkpoint`]
/// record containing the full graph rather than a per-node diff, since a
/// facade-level save has no prior-state basis for an incremental write;
/// callers that want incremental WAL writes should use [`fxwal::WalWriter`]
/// directly from the kernel's mutation path. One [`fxwal::RecordKind::GroupDef`]
/// record follows per group, carrying its manual membership and reactive
/// flag (`spec.md` §9 Design Note) — selectors, predicates, and `on_change`
/// callbacks are not data and are never written.
///
/// # Errors
/// Propagates the underlying backend's I/O or encoding errors.
pub fn save(path: impl AsRef<Path>, store: &NodeStore, groups: &FxHashMap<NodeId, Group>, backend: Backend) -> Result<()> {
    match backend {
        Backend::Fxd => fxd::save(path, store, groups),
        Backend::Fxwal => {
            let path = path.as_ref();
            let mut writer = if path.exists() {
                fxwal::WalWriter::open_append(path)?
            } else {
                fxwal::WalWriter::create(path)?
            };
            let snapshot = Value::Array(
                store
                    .snapshot_values()
                    .into_iter()
                    .map(|(path, value)| {
                        Value::Object(BTreeMap::from([
                            ("path".to_string(), Value::String(path)),
                            ("value".to_string(), value),
                        ]))
                    })
                    .collect(),
            );
            let payload = fxwal::uarr::encode(&snapshot);
            writer.checkpoint(&payload, timestamp_placeholder())?;

            for (group_id, group) in groups {
                let manual = Value::Array(group.manual_members().iter().map(|id| Value::I64(id.as_u64() as i64)).collect());
                let def = Value::Object(BTreeMap::from([
                    ("reactive".to_string(), Value::Bool(group.is_reactive())),
                    ("manual".to_string(), manual),
                ]));
                let payload = fxwal::uarr::encode(&def);
                writer.append(fxwal::RecordKind::GroupDef, *group_id, &payload, timestamp_placeholder())?;
            }
            Ok(())
        }
    }
}

/// Loads a graph from `path` into `store` and `groups` using `backend`.
///
/// For [`Backend::Fxwal`], replays every record in sequence, applying the
/// most recent [`fxwal::RecordKind::Checkpoint`] as a base snapshot (if any)
/// and then reapplying subsequent `Patch`/`Create` records over it.
/// [`fxwal::RecordKind::GroupDef`] records are collected regardless of
/// position and restore each group's manual membership and reactive flag;
/// `members` is left empty and must be reconciled by the caller.
///
/// # Errors
/// Propagates the underlying backend's I/O, schema, or decoding errors.
pub fn load(path: impl AsRef<Path>, store: &mut NodeStore, groups: &mut FxHashMap<NodeId, Group>, backend: Backend) -> Result<()> {
    match backend {
        Backend::Fxd => fxd::load(path, store, groups),
        Backend::Fxwal => {
            let records = fxwal::read_all_records(path.as_ref())?;
            let mut nodes = BTreeMap::new();
            nodes.insert(NodeId::ROOT, crate::node::Node::new(NodeId::ROOT, None, String::new()));
            store.load_nodes(nodes);

            let mut last_checkpoint = None;
            for (idx, record) in records.iter().enumerate() {
                if record.kind == fxwal::RecordKind::Checkpoint {
                    last_checkpoint = Some(idx);
                }
            }
            let replay_from = last_checkpoint.unwrap_or(0);

            if let Some(idx) = last_checkpoint {
                let snapshot = fxwal::uarr::decode(&records[idx].payload)?;
                apply_snapshot(store, &snapshot)?;
            }

            for record in &records[replay_from + usize::from(last_checkpoint.is_some())..] {
                if record.kind == fxwal::RecordKind::Patch {
                    let value = fxwal::uarr::decode(&record.payload)?;
                    if let Some(node) = store.get_mut(record.node_id) {
                        node.value = value;
                    }
                }
            }

            groups.clear();
            for record in &records {
                if record.kind != fxwal::RecordKind::GroupDef {
                    continue;
                }
                let decoded = fxwal::uarr::decode(&record.payload)?;
                let Value::Object(fields) = decoded else {
                    return Err(FxdError::CorruptRecord("group definition payload is not an object".to_string()));
                };
                let reactive = matches!(fields.get("reactive"), Some(Value::Bool(true)));
                let manual = match fields.get("manual") {
                    Some(Value::Array(items)) => items
                        .iter()
                        .filter_map(|v| match v {
                            Value::I64(n) => Some(NodeId::from_raw(*n as u64)),
                            _ => None,
                        })
                        .collect(),
                    _ => Vec::new(),
                };
                groups.insert(record.node_id, Group::from_persisted(manual, reactive));
            }

            crate::snippet::index::rebuild(store);
            Ok(())
        }
    }
}

fn apply_snapshot(store: &mut NodeStore, snapshot: &crate::value::Value) -> Result<()> {
    let crate::value::Value::Array(entries) = snapshot else {
        return Err(crate::error::FxdError::CorruptRecord("checkpoint payload is not an array".to_string()));
    };
    for entry in entries {
        let crate::value::Value::Object(fields) = entry else {
            return Err(crate::error::FxdError::CorruptRecord("checkpoint entry is not an object".to_string()));
        };
        let Some(crate::value::Value::String(path)) = fields.get("path") else {
            return Err(crate::error::FxdError::CorruptRecord("checkpoint entry missing path".to_string()));
        };
        let value = fields.get("value").cloned().unwrap_or(crate::value::Value::None);
        let id = store.ensure(crate::path::Path::parse(path))?;
        if let Some(node) = store.get_mut(id) {
            node.value = value;
        }
    }
    Ok(())
}

/// Placeholder clock for facade-level saves that don't have a kernel-owned
/// timestamp source to hand. Real append paths (driven by the kernel) pass
/// their own wall-clock reading to [`fxwal::WalWriter::append`] directly.
fn timestamp_placeholder() -> u64 {
    0
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]

    use super::*;
    use crate::path::Path as FxdPath;
    use crate::value::Value;

    #[test]
    fn fxwal_facade_round_trips_a_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graph.fxwal");

        let mut store = NodeStore::new();
        let id = store.ensure(FxdPath::parse("a.b")).unwrap();
        store.get_mut(id).unwrap().value = Value::I64(9);

        save(&path, &store, &FxHashMap::default(), Backend::Fxwal).unwrap();

        let mut loaded = NodeStore::new();
        let mut loaded_groups = FxHashMap::default();
        load(&path, &mut loaded, &mut loaded_groups, Backend::Fxwal).unwrap();
        let reloaded = loaded.resolve(FxdPath::parse("a.b")).unwrap().unwrap();
        assert_eq!(loaded.get(reloaded).unwrap().value, Value::I64(9));
    }

    #[test]
    fn fxd_facade_round_trips_a_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graph.fxd");

        let mut store = NodeStore::new();
        let id = store.ensure(FxdPath::parse("a.b")).unwrap();
        store.get_mut(id).unwrap().value = Value::String("hi".to_string());

        save(&path, &store, &FxHashMap::default(), Backend::Fxd).unwrap();

        let mut loaded = NodeStore::new();
        let mut loaded_groups = FxHashMap::default();
        load(&path, &mut loaded, &mut loaded_groups, Backend::Fxd).unwrap();
        let reloaded = loaded.resolve(FxdPath::parse("a.b")).unwrap().unwrap();
        assert_eq!(loaded.get(reloaded).unwrap().value, Value::String("hi".to_string()));
    }

    #[test]
    fn fxwal_facade_round_trips_group_manual_membership() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graph.fxwal");

        let mut store = NodeStore::new();
        let view_id = store.ensure(FxdPath::parse("views.repoFile")).unwrap();
        let header = store.ensure(FxdPath::parse("snippets.header")).unwrap();
        store.get_mut(header).unwrap().value = Value::String("import x".to_string());

        let mut group = Group::new();
        group.add_manual(header);
        group.reconcile(&store);
        let mut groups = FxHashMap::default();
        groups.insert(view_id, group);

        save(&path, &store, &groups, Backend::Fxwal).unwrap();

        let mut loaded = NodeStore::new();
        let mut loaded_groups = FxHashMap::default();
        load(&path, &mut loaded, &mut loaded_groups, Backend::Fxwal).unwrap();

        let reloaded_view = loaded.resolve(FxdPath::parse("views.repoFile")).unwrap().unwrap();
        assert_eq!(reloaded_view, view_id);
        let restored = loaded_groups.get_mut(&view_id).unwrap();
        assert!(restored.list().is_empty());
        restored.reconcile(&loaded);
        let reloaded_header = loaded.resolve(FxdPath::parse("snippets.header")).unwrap().unwrap();
        assert_eq!(restored.list(), &[reloaded_header]);
    }
}
