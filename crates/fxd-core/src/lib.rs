// SPDX-License-Identifier: Apache-2.0
//! fxd-core: reactive in-memory node graph with a snippet/marker view engine
//! and a durable signal + persistence layer.
//!
//! A [`Kernel`] owns a path-addressed tree of typed [`Node`]s. Writes run
//! through one mutation pipeline: compute a delta, bump the node's version,
//! append it to the [`SignalStream`], dispatch local watchers, then
//! propagate to entanglement links, reactive snippets, and reactive groups.
//! Graphs persist to either a SQLite-backed `.fxd` snapshot or a WAL-backed
//! `.fxwal` append log, and round-trip through source text via marker
//! comments (`FX:BEGIN`/`FX:END`) for editor-visible snippet views.
#![forbid(unsafe_code)]
#![deny(missing_docs, rust_2018_idioms, unused_must_use)]
#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    clippy::cargo,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::dbg_macro,
    clippy::print_stdout,
    clippy::print_stderr
)]
#![allow(
    clippy::must_use_candidate,
    clippy::return_self_not_must_use,
    clippy::unreadable_literal,
    clippy::missing_const_for_fn,
    clippy::redundant_pub_crate,
    clippy::many_single_char_names,
    clippy::module_name_repetitions,
    clippy::use_self,
    clippy::cognitive_complexity,
    clippy::option_if_let_else,
    clippy::significant_drop_tightening,
    clippy::doc_markdown,
    clippy::too_many_lines,
    clippy::struct_excessive_bools,
    clippy::too_long_first_doc_paragraph,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::similar_names,
    clippy::trivially_copy_pass_by_ref,
    clippy::needless_collect,
    clippy::manual_let_else,
    clippy::needless_pass_by_value,
    clippy::multiple_crate_versions
)]

mod entangle;
mod error;
mod group;
mod ids;
mod kernel;
mod node;
mod path;
mod persist;
mod reactive_snippet;
mod selector;
mod signal;
/// Snippet/marker round-trip view engine: renders node values into
/// `FX:BEGIN`/`FX:END`-delimited text and parses edited text back into
/// patches.
pub mod snippet;
mod store;
mod value;
mod watch;

/// Entanglement links: bidirectional value mirrors between two nodes.
pub use entangle::{BeforeSetHook, Decision, Direction, Link, PropagateOutcome, SetHook, SideHooks, Transform};
/// Crate-wide error and result types.
pub use error::{FxdError, Result};
/// Reactive groups: ordered, selector- or predicate-driven node membership.
pub use group::Group;
/// Opaque identifiers for nodes, watch registrations, links, and snippets.
pub use ids::{LinkHandle, NodeId, SnippetHandle, WatchHandle};
/// The kernel: single source of truth for the node graph and its reactive
/// pipeline.
pub use kernel::{Kernel, NodeProxy};
/// A single node in the graph.
pub use node::Node;
/// Dotted path parsing and segment iteration.
pub use path::Path;
/// Persistence backends (`.fxd` SQLite snapshot, `.fxwal` append log).
pub use persist::{Backend, fxd, fxwal};
/// Reactive snippets: native functions bound to watched graph paths.
pub use reactive_snippet::{ExecutionOutcome, Param, ParamContext, ReactiveSnippet};
/// Node selector grammar (`.type[meta=value]`) used by reactive groups.
pub use selector::Selector;
/// The append-only signal stream: versioned change events with replay.
pub use signal::{Cursor, Delta, Signal, SignalKind, SignalStream};
/// Graph values: scalars, bytes, compound arrays/objects, and opaque
/// handles.
pub use value::{Value, ValueKind};
/// Per-node watcher registration and dispatch.
pub use watch::{WatchFn, WatchRegistry};
