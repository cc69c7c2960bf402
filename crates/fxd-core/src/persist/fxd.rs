// SPDX-License-Identifier: Apache-2.0
//! The SQLite-backed `.fxd` persistence format (`spec.md` §4.7.1).
//!
//! Grounded on the teacher's `snapshot` module, which likewise traverses
//! the live graph under one transaction to produce a durable snapshot and
//! clears/reconstructs in-memory state wholesale on load rather than
//! diffing against what is already resident.

use std::collections::BTreeMap;
use std::path::Path;

use rusqlite::{params, Connection, OptionalExtension};
use rustc_hash::FxHashMap;

use crate::error::{FxdError, Result};
use crate::group::Group;
use crate::ids::NodeId;
use crate::node::Node;
use crate::snippet::index as snippet_index;
use crate::store::NodeStore;

/// The `.fxd` schema version this crate writes and the highest it accepts
/// on load (`spec.md` §6 "Schema version is stored in a `metadata` row;
/// readers must refuse higher versions").
pub const SCHEMA_VERSION: i64 = 1;

/// Aggregate counts returned by [`stats`] (`spec.md` §4.7.1 `stats()`).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Stats {
    /// Total live nodes, root excluded.
    pub nodes: u64,
    /// Nodes with `meta.id` set.
    pub snippets: u64,
    /// Nodes tagged `type_tag == "view"`.
    pub views: u64,
    /// Nodes tagged `type_tag == "group"`.
    pub groups: u64,
}

fn create_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS metadata (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );
        CREATE TABLE IF NOT EXISTS nodes (
            id INTEGER PRIMARY KEY,
            parent INTEGER,
            name TEXT NOT NULL,
            type_tag TEXT,
            version INTEGER NOT NULL,
            FOREIGN KEY(parent) REFERENCES nodes(id)
        );
        CREATE TABLE IF NOT EXISTS values_ (
            node_id INTEGER PRIMARY KEY,
            payload BLOB NOT NULL,
            FOREIGN KEY(node_id) REFERENCES nodes(id)
        );
        CREATE TABLE IF NOT EXISTS meta (
            node_id INTEGER NOT NULL,
            key TEXT NOT NULL,
            payload BLOB NOT NULL,
            PRIMARY KEY(node_id, key),
            FOREIGN KEY(node_id) REFERENCES nodes(id)
        );
        CREATE TABLE IF NOT EXISTS snippets (
            node_id INTEGER PRIMARY KEY,
            snippet_id TEXT NOT NULL UNIQUE,
            FOREIGN KEY(node_id) REFERENCES nodes(id)
        );
        CREATE TABLE IF NOT EXISTS groups (
            node_id INTEGER PRIMARY KEY,
            reactive INTEGER NOT NULL,
            FOREIGN KEY(node_id) REFERENCES nodes(id)
        );
        CREATE TABLE IF NOT EXISTS group_items (
            group_id INTEGER NOT NULL,
            node_id INTEGER NOT NULL,
            position INTEGER NOT NULL,
            FOREIGN KEY(group_id) REFERENCES groups(node_id),
            FOREIGN KEY(node_id) REFERENCES nodes(id)
        );
        ",
    )?;
    Ok(())
}

/// Writes `store`'s full state and `groups`' manual membership to `path`,
/// atomically, under one transaction. Creates the file and schema if it does
/// not exist.
///
/// Only `manual` membership and the `reactive` flag survive per group
/// (`spec.md` §9 Design Note); selectors, predicates, and `on_change`
/// callbacks are not data and must be re-registered by the caller after
/// [`load`].
///
/// # Errors
/// Returns [`FxdError::IoFailure`] on any underlying SQLite error.
pub fn save(path: impl AsRef<Path>, store: &NodeStore, groups: &FxHashMap<NodeId, Group>) -> Result<()> {
    let path = path.as_ref();
    let mut conn = Connection::open(path)?;
    create_schema(&conn)?;

    let tx = conn.transaction()?;
    tx.execute("DELETE FROM meta", [])?;
    tx.execute("DELETE FROM snippets", [])?;
    tx.execute("DELETE FROM values_", [])?;
    tx.execute("DELETE FROM nodes", [])?;
    tx.execute("DELETE FROM group_items", [])?;
    tx.execute("DELETE FROM groups", [])?;
    tx.execute(
        "INSERT OR REPLACE INTO metadata (key, value) VALUES ('schema_version', ?1)",
        params![SCHEMA_VERSION.to_string()],
    )?;

    for (id, node) in store.iter() {
        tx.execute(
            "INSERT OR REPLACE INTO nodes (id, parent, name, type_tag, version) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                id.as_u64() as i64,
                node.parent.map(|p| p.as_u64() as i64),
                node.name,
                node.type_tag,
                node.version as i64,
            ],
        )?;
        if !node.value.is_handle() {
            let payload = crate::persist::fxwal::uarr::encode(&node.value);
            tx.execute(
                "INSERT OR REPLACE INTO values_ (node_id, payload) VALUES (?1, ?2)",
                params![id.as_u64() as i64, payload],
            )?;
        }
        for (key, value) in &node.meta {
            let payload = crate::persist::fxwal::uarr::encode(value);
            tx.execute(
                "INSERT OR REPLACE INTO meta (node_id, key, payload) VALUES (?1, ?2, ?3)",
                params![id.as_u64() as i64, key, payload],
            )?;
        }
        if let Some(sid) = node.snippet_id() {
            tx.execute(
                "INSERT OR REPLACE INTO snippets (node_id, snippet_id) VALUES (?1, ?2)",
                params![id.as_u64() as i64, sid],
            )?;
        }
    }

    for (group_id, group) in groups {
        tx.execute(
            "INSERT OR REPLACE INTO groups (node_id, reactive) VALUES (?1, ?2)",
            params![group_id.as_u64() as i64, group.is_reactive()],
        )?;
        for (position, member) in group.manual_members().iter().enumerate() {
            tx.execute(
                "INSERT INTO group_items (group_id, node_id, position) VALUES (?1, ?2, ?3)",
                params![group_id.as_u64() as i64, member.as_u64() as i64, position as i64],
            )?;
        }
    }
    tx.commit()?;

    cleanup_journal_files(path);
    Ok(())
}

/// Replaces `store`'s state and `groups`' manual membership with the graph
/// persisted at `path`. Restored groups have empty `members`; callers must
/// reconcile them against `store` afterward (`spec.md` §9 Design Note).
///
/// # Errors
/// Returns [`FxdError::SchemaMismatch`] if the file's schema version is
/// newer than [`SCHEMA_VERSION`], or [`FxdError::CorruptRecord`] if a row's
/// `UArr` payload is malformed.
pub fn load(path: impl AsRef<Path>, store: &mut NodeStore, groups: &mut FxHashMap<NodeId, Group>) -> Result<()> {
    let conn = Connection::open(path.as_ref())?;
    let version: Option<String> = conn
        .query_row("SELECT value FROM metadata WHERE key = 'schema_version'", [], |row| row.get(0))
        .optional()?;
    if let Some(version) = version {
        let version: i64 = version
            .parse()
            .map_err(|_| FxdError::CorruptRecord("non-numeric schema_version in metadata".to_string()))?;
        if version > SCHEMA_VERSION {
            return Err(FxdError::SchemaMismatch {
                found: version as u32,
                supported: SCHEMA_VERSION as u32,
            });
        }
    }

    let mut stmt = conn.prepare("SELECT id, parent, name, type_tag, version FROM nodes")?;
    let mut nodes: BTreeMap<NodeId, Node> = BTreeMap::new();
    let rows = stmt.query_map([], |row| {
        let id: i64 = row.get(0)?;
        let parent: Option<i64> = row.get(1)?;
        let name: String = row.get(2)?;
        let type_tag: Option<String> = row.get(3)?;
        let version: i64 = row.get(4)?;
        Ok((id, parent, name, type_tag, version))
    })?;
    for row in rows {
        let (id, parent, name, type_tag, version) = row?;
        let node_id = NodeId::from_raw(id as u64);
        let mut node = Node::new(node_id, parent.map(|p| NodeId::from_raw(p as u64)), name);
        node.type_tag = type_tag;
        node.version = version as u64;
        nodes.insert(node_id, node);
    }

    if !nodes.contains_key(&NodeId::ROOT) {
        nodes.insert(NodeId::ROOT, Node::new(NodeId::ROOT, None, String::new()));
    }

    let mut value_stmt = conn.prepare("SELECT node_id, payload FROM values_")?;
    let value_rows = value_stmt.query_map([], |row| {
        let node_id: i64 = row.get(0)?;
        let payload: Vec<u8> = row.get(1)?;
        Ok((node_id, payload))
    })?;
    for row in value_rows {
        let (node_id, payload) = row?;
        if let Some(node) = nodes.get_mut(&NodeId::from_raw(node_id as u64)) {
            node.value = crate::persist::fxwal::uarr::decode(&payload)?;
        }
    }

    let mut meta_stmt = conn.prepare("SELECT node_id, key, payload FROM meta")?;
    let meta_rows = meta_stmt.query_map([], |row| {
        let node_id: i64 = row.get(0)?;
        let key: String = row.get(1)?;
        let payload: Vec<u8> = row.get(2)?;
        Ok((node_id, key, payload))
    })?;
    for row in meta_rows {
        let (node_id, key, payload) = row?;
        if let Some(node) = nodes.get_mut(&NodeId::from_raw(node_id as u64)) {
            node.meta.insert(key, crate::persist::fxwal::uarr::decode(&payload)?);
        }
    }

    // Re-link children maps from the recovered parent pointers.
    let links: Vec<(NodeId, NodeId, String)> = nodes
        .values()
        .filter_map(|n| n.parent.map(|p| (p, n.id, n.name.clone())))
        .collect();
    for (parent, child, name) in links {
        if let Some(parent_node) = nodes.get_mut(&parent) {
            parent_node.children.insert(name, child);
        }
    }

    store.load_nodes(nodes);
    snippet_index::rebuild(store);

    groups.clear();
    let mut reactive_by_group: BTreeMap<NodeId, bool> = BTreeMap::new();
    let mut group_stmt = conn.prepare("SELECT node_id, reactive FROM groups")?;
    let group_rows = group_stmt.query_map([], |row| {
        let node_id: i64 = row.get(0)?;
        let reactive: bool = row.get(1)?;
        Ok((node_id, reactive))
    })?;
    for row in group_rows {
        let (node_id, reactive) = row?;
        reactive_by_group.insert(NodeId::from_raw(node_id as u64), reactive);
    }

    let mut manual_by_group: BTreeMap<NodeId, Vec<NodeId>> = BTreeMap::new();
    let mut item_stmt = conn.prepare("SELECT group_id, node_id FROM group_items ORDER BY group_id, position")?;
    let item_rows = item_stmt.query_map([], |row| {
        let group_id: i64 = row.get(0)?;
        let node_id: i64 = row.get(1)?;
        Ok((group_id, node_id))
    })?;
    for row in item_rows {
        let (group_id, node_id) = row?;
        manual_by_group
            .entry(NodeId::from_raw(group_id as u64))
            .or_default()
            .push(NodeId::from_raw(node_id as u64));
    }

    for (group_id, reactive) in reactive_by_group {
        let manual = manual_by_group.remove(&group_id).unwrap_or_default();
        groups.insert(group_id, Group::from_persisted(manual, reactive));
    }

    Ok(())
}

/// Returns aggregate counts over `store`'s live nodes
/// (`spec.md` §4.7.1 `stats()`).
#[must_use]
pub fn stats(store: &NodeStore) -> Stats {
    let mut stats = Stats::default();
    for (id, node) in store.iter() {
        if id.is_root() {
            continue;
        }
        stats.nodes += 1;
        if node.is_snippet() {
            stats.snippets += 1;
        }
        match node.type_tag.as_deref() {
            Some("view") => stats.views += 1,
            Some("group") => stats.groups += 1,
            _ => {}
        }
    }
    stats
}

/// Validates referential integrity of a persisted `.fxd` file: every
/// non-root node's parent must exist, and every `snippets.node_id` must
/// reference a live node (`spec.md` §4.7.1 `validate_integrity()`).
///
/// # Errors
/// Returns [`FxdError::CorruptRecord`] describing the first violation found.
pub fn validate_integrity(path: impl AsRef<Path>) -> Result<()> {
    let conn = Connection::open(path.as_ref())?;
    let mut stmt = conn.prepare(
        "SELECT n.id FROM nodes n LEFT JOIN nodes p ON n.parent = p.id WHERE n.parent IS NOT NULL AND p.id IS NULL",
    )?;
    let mut orphans = stmt.query_map([], |row| row.get::<_, i64>(0))?;
    if let Some(orphan) = orphans.next() {
        return Err(FxdError::CorruptRecord(format!("node {} has a dangling parent reference", orphan?)));
    }

    let mut stmt = conn.prepare(
        "SELECT s.node_id FROM snippets s LEFT JOIN nodes n ON s.node_id = n.id WHERE n.id IS NULL",
    )?;
    let mut dangling = stmt.query_map([], |row| row.get::<_, i64>(0))?;
    if let Some(node_id) = dangling.next() {
        return Err(FxdError::CorruptRecord(format!(
            "snippet index entry references missing node {}",
            node_id?
        )));
    }

    Ok(())
}

/// Removes SQLite journal files left behind on some platforms after the
/// connection handle is dropped. On Windows, the handle must be released
/// before deleting these; we simply best-effort clean up after `save`
/// completes, matching `spec.md` §4.7.1's note on Windows journal cleanup.
fn cleanup_journal_files(db_path: &Path) {
    for suffix in ["-journal", "-wal", "-shm"] {
        let mut candidate = db_path.as_os_str().to_os_string();
        candidate.push(suffix);
        let candidate = Path::new(&candidate);
        if candidate.exists() {
            let _ = std::fs::remove_file(candidate);
        }
    }
}
