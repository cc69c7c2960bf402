// SPDX-License-Identifier: Apache-2.0
//! The crate-wide error taxonomy (`spec.md` §7).
//!
//! One `thiserror`-derived enum per the teacher's convention of small,
//! explicit error types per failure domain (`attachment::DecodeError`,
//! `provenance_store::HistoryError`, `tick_patch::TickPatchError`) — FXD
//! collapses these into a single enum because, unlike `warp-core`'s many
//! independent subsystems, every FXD error ultimately surfaces through the
//! same embeddable API (`spec.md` §6).

use thiserror::Error;

use crate::ids::NodeId;
use crate::value::ValueKind;

/// The crate-wide error type.
#[derive(Debug, Error)]
pub enum FxdError {
    /// A path, id, or snippet id was absent when resolution was required.
    #[error("not found: {0}")]
    NotFound(String),

    /// A path string was structurally invalid (e.g. contained an empty
    /// segment).
    #[error("invalid path: {0:?}")]
    InvalidPath(String),

    /// A value did not satisfy a type-tagged node's constraint.
    #[error("invalid type: node {node} is tagged for a different kind than {found:?}")]
    InvalidType {
        /// The node whose type tag rejected the write.
        node: NodeId,
        /// The kind of the rejected value.
        found: ValueKind,
    },

    /// A marker region was malformed, orphaned, or mismatched. Per-snippet:
    /// callers should record this as a warning and continue parsing the
    /// rest of the document (`spec.md` §4.5).
    #[error("marker parse error: {0}")]
    MarkerParse(String),

    /// A marker's `checksum` attribute disagreed with the computed checksum
    /// of its body. Warning-level: policy is "editor wins," so the patch is
    /// still applied (`spec.md` §4.5, §7).
    #[error("checksum divergence on snippet {snippet_id}")]
    ChecksumDivergence {
        /// The snippet id whose checksum diverged.
        snippet_id: String,
    },

    /// Two entanglement links would form a synchronous propagation cycle on
    /// first activation (`spec.md` §7).
    #[error("link cycle detected between {a} and {b}")]
    LinkCycle {
        /// One endpoint path of the cyclic pair.
        a: String,
        /// The other endpoint path of the cyclic pair.
        b: String,
    },

    /// A `.fxd`/`.fxwal` file's schema/format version is newer than this
    /// crate understands.
    #[error("schema mismatch: file version {found} is newer than supported version {supported}")]
    SchemaMismatch {
        /// The version found in the file.
        found: u32,
        /// The highest version this crate supports.
        supported: u32,
    },

    /// A persisted record failed integrity validation (CRC mismatch for
    /// `.fxwal`, a broken foreign key for `.fxd`) and the affected file
    /// cannot be mounted.
    #[error("corrupt record: {0}")]
    CorruptRecord(String),

    /// An underlying storage error (filesystem or SQLite).
    #[error("io failure: {0}")]
    IoFailure(String),

    /// A persistence operation did not complete before its deadline.
    #[error("timeout exceeded")]
    TimeoutExceeded,

    /// A snippet id referenced by a patch was not found in the index and
    /// the caller did not request `on_missing == "create"`.
    #[error("snippet not found: {0}")]
    SnippetNotFound(String),
}

impl From<std::io::Error> for FxdError {
    fn from(e: std::io::Error) -> Self {
        Self::IoFailure(e.to_string())
    }
}

impl From<rusqlite::Error> for FxdError {
    fn from(e: rusqlite::Error) -> Self {
        Self::IoFailure(e.to_string())
    }
}

/// Convenience alias used throughout the crate's public API.
pub type Result<T> = std::result::Result<T, FxdError>;
