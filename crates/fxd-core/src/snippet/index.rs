// SPDX-License-Identifier: Apache-2.0
//! The snippet-id index and the `apply_patches` contract built on top of it
//! (`spec.md` §4.5 "Apply contract", "Snippet-id index lifecycle").

use crate::error::{FxdError, Result};
use crate::ids::NodeId;
use crate::path::Path;
use crate::store::NodeStore;
use crate::value::Value;

use super::marker::checksum;
use super::parse::Patch;

/// What to do with a patch whose snippet id is not found in the index.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OnMissing {
    /// Create a new snippet node under `orphan_root` with `meta.id` set to
    /// the patch's id.
    Create,
    /// Surface [`FxdError::SnippetNotFound`].
    Reject,
}

/// Options controlling [`apply_patches`].
#[derive(Clone, Debug)]
pub struct ApplyOptions {
    /// What to do for patches whose snippet id has no matching node.
    pub on_missing: OnMissing,
    /// The path new orphaned snippets are created under when `on_missing`
    /// is [`OnMissing::Create`]. Defaults to `"snippets.orphans"`.
    pub orphan_root: String,
}

impl Default for ApplyOptions {
    fn default() -> Self {
        Self {
            on_missing: OnMissing::Reject,
            orphan_root: "snippets.orphans".to_string(),
        }
    }
}

/// The result of applying a batch of patches.
#[derive(Clone, Debug, Default)]
pub struct ApplyOutcome {
    /// Node ids whose value was updated from an existing snippet match.
    pub applied: Vec<NodeId>,
    /// Node ids created under `orphan_root` for unmatched patches.
    pub created: Vec<NodeId>,
    /// Warnings for checksum divergences (policy: editor wins, applied
    /// anyway — `spec.md` §4.5, §7).
    pub warnings: Vec<String>,
}

/// Rebuilds the snippet-id index from scratch by scanning every live node.
/// The index is derivable; implementations must call this after load
/// (`spec.md` §4.5 "Snippet-id index lifecycle").
pub fn rebuild(store: &mut NodeStore) {
    let snippet_nodes: Vec<(NodeId, String)> = store
        .iter()
        .filter_map(|(id, node)| node.snippet_id().map(|sid| (id, sid.to_string())))
        .collect();
    for (id, sid) in snippet_nodes {
        store.reindex_snippet(id, None, Some(&sid));
    }
}

/// Reassembles a patch's final body: hoisted import lines (if any) followed
/// by the captured marker-region text, matching the layout
/// [`super::render::render_view`] stripped them from.
fn reassemble_body(patch: &Patch) -> String {
    if patch.imports.is_empty() {
        return patch.value.clone();
    }
    if patch.value.is_empty() {
        patch.imports.join("\n")
    } else {
        format!("{}\n{}", patch.imports.join("\n"), patch.value)
    }
}

/// Applies `patches` to `store`, per `spec.md` §4.5 "Apply contract".
///
/// # Errors
/// Returns [`FxdError::SnippetNotFound`] on the first patch whose id has no
/// matching node, when `opts.on_missing == OnMissing::Reject`.
#[allow(clippy::expect_used)] // node_id always comes straight from a lookup or an ensure() just above
pub fn apply_patches(store: &mut NodeStore, patches: &[Patch], opts: &ApplyOptions) -> Result<ApplyOutcome> {
    let mut outcome = ApplyOutcome::default();
    for patch in patches {
        match store.find_by_snippet_id(&patch.id) {
            Some(node_id) => {
                if let Some(expected) = &patch.checksum {
                    let actual = checksum(&patch.value);
                    if *expected != actual {
                        outcome
                            .warnings
                            .push(format!("checksum divergence on snippet {}: expected {expected}, got {actual}", patch.id));
                    }
                }
                let node = store
                    .get_mut(node_id)
                    .expect("index entries always reference a live node");
                node.value = Value::String(reassemble_body(patch));
                node.bump_version();
                outcome.applied.push(node_id);
            }
            None => match opts.on_missing {
                OnMissing::Create => {
                    let path = format!("{}.{}", opts.orphan_root, patch.id);
                    let node_id = store.ensure(Path::parse(&path))?;
                    let node = store.get_mut(node_id).expect("just created");
                    node.value = Value::String(reassemble_body(patch));
                    node.meta.insert("id".to_string(), Value::String(patch.id.clone()));
                    node.bump_version();
                    store.reindex_snippet(node_id, None, Some(&patch.id));
                    outcome.created.push(node_id);
                }
                OnMissing::Reject => {
                    return Err(FxdError::SnippetNotFound(patch.id.clone()));
                }
            },
        }
    }
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]

    use super::*;

    fn seed_snippet(store: &mut NodeStore, path: &str, id: &str) -> NodeId {
        let node_id = store.ensure(Path::parse(path)).unwrap();
        store.get_mut(node_id).unwrap().meta.insert("id".to_string(), Value::String(id.to_string()));
        store.reindex_snippet(node_id, None, Some(id));
        node_id
    }

    #[test]
    fn applies_patch_to_existing_snippet() {
        let mut store = NodeStore::new();
        let node_id = seed_snippet(&mut store, "snippets.header", "abc");
        let patches = vec![Patch {
            id: "abc".to_string(),
            value: "new body".to_string(),
            checksum: None,
            imports: Vec::new(),
        }];
        let outcome = apply_patches(&mut store, &patches, &ApplyOptions::default()).unwrap();
        assert_eq!(outcome.applied, vec![node_id]);
        assert!(matches!(store.get(node_id).unwrap().value, Value::String(ref s) if s == "new body"));
    }

    #[test]
    fn missing_snippet_rejects_by_default() {
        let mut store = NodeStore::new();
        let patches = vec![Patch {
            id: "ghost".to_string(),
            value: "x".to_string(),
            checksum: None,
            imports: Vec::new(),
        }];
        assert!(apply_patches(&mut store, &patches, &ApplyOptions::default()).is_err());
    }

    #[test]
    fn missing_snippet_creates_orphan_when_requested() {
        let mut store = NodeStore::new();
        let patches = vec![Patch {
            id: "ghost".to_string(),
            value: "x".to_string(),
            checksum: None,
            imports: Vec::new(),
        }];
        let opts = ApplyOptions {
            on_missing: OnMissing::Create,
            orphan_root: "snippets.orphans".to_string(),
        };
        let outcome = apply_patches(&mut store, &patches, &opts).unwrap();
        assert_eq!(outcome.created.len(), 1);
        assert_eq!(store.find_by_snippet_id("ghost"), Some(outcome.created[0]));
    }

    #[test]
    fn checksum_divergence_is_warned_but_still_applied() {
        let mut store = NodeStore::new();
        seed_snippet(&mut store, "snippets.header", "abc");
        let patches = vec![Patch {
            id: "abc".to_string(),
            value: "new body".to_string(),
            checksum: Some("deadbeefdeadbeef".to_string()),
            imports: Vec::new(),
        }];
        let outcome = apply_patches(&mut store, &patches, &ApplyOptions::default()).unwrap();
        assert_eq!(outcome.applied.len(), 1);
        assert_eq!(outcome.warnings.len(), 1);
    }

    #[test]
    fn hoisted_imports_are_reattached_ahead_of_the_captured_body() {
        let mut store = NodeStore::new();
        let node_id = seed_snippet(&mut store, "snippets.find", "find");
        let patches = vec![Patch {
            id: "find".to_string(),
            value: "export const y = 2;".to_string(),
            checksum: None,
            imports: vec!["import { db } from './db.js'".to_string()],
        }];
        apply_patches(&mut store, &patches, &ApplyOptions::default()).unwrap();
        let value = &store.get(node_id).unwrap().value;
        assert!(matches!(value, Value::String(s) if s == "import { db } from './db.js'\nexport const y = 2;"));
    }

    #[test]
    fn a_pure_import_snippet_round_trips_to_just_the_import_line() {
        let mut store = NodeStore::new();
        let node_id = seed_snippet(&mut store, "snippets.header", "header");
        let patches = vec![Patch {
            id: "header".to_string(),
            value: String::new(),
            checksum: None,
            imports: vec!["import { db } from './db.js'".to_string()],
        }];
        apply_patches(&mut store, &patches, &ApplyOptions::default()).unwrap();
        let value = &store.get(node_id).unwrap().value;
        assert!(matches!(value, Value::String(s) if s == "import { db } from './db.js'"));
    }

    #[test]
    fn rebuild_recovers_index_from_node_meta() {
        let mut store = NodeStore::new();
        let node_id = store.ensure(Path::parse("snippets.header")).unwrap();
        store.get_mut(node_id).unwrap().meta.insert("id".to_string(), Value::String("abc".to_string()));
        assert_eq!(store.find_by_snippet_id("abc"), None);
        rebuild(&mut store);
        assert_eq!(store.find_by_snippet_id("abc"), Some(node_id));
    }
}
