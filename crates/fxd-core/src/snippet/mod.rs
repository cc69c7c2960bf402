// SPDX-License-Identifier: Apache-2.0
//! The snippet/marker round-trip engine (`spec.md` §4.5): rendering snippet
//! groups into marker-delimited text and parsing edited text back into
//! per-snippet patches.

pub mod index;
pub mod marker;
pub mod parse;
pub mod render;

pub use index::{apply_patches, rebuild as rebuild_index, ApplyOptions, ApplyOutcome, OnMissing};
pub use marker::{checksum, comment_style_for, CommentStyle};
pub use parse::{to_patches, ParseOutcome, Patch};
pub use render::{render_view, Eol, RenderOptions, SnippetInput};
