// SPDX-License-Identifier: Apache-2.0
//! Parses a rendered text document back into per-snippet patches
//! (`spec.md` §4.5 "Parse contract").

use super::marker::{parse_marker_line, MarkerLine};

/// One parsed snippet region, ready to feed into
/// [`super::index::apply_patches`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Patch {
    /// The snippet id the region was delimited for.
    pub id: String,
    /// The captured inner text, excluding the marker lines themselves.
    pub value: String,
    /// The checksum recorded on the `FX:BEGIN` line, if any.
    pub checksum: Option<String>,
    /// Import lines hoisted out of this region at render time, recorded on
    /// its `FX:BEGIN` line's `imports=` attribute. Reattached to `value`'s
    /// front by [`super::index::apply_patches`] so hoisting round-trips.
    pub imports: Vec<String>,
}

/// The outcome of [`to_patches`]: the successfully parsed regions plus any
/// warnings for regions that had to be skipped.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ParseOutcome {
    /// One patch per successfully captured marker region, in document order.
    pub patches: Vec<Patch>,
    /// Human-readable warnings for skipped regions (mismatched id, unterminated
    /// region, or a stray `FX:END` with no matching `FX:BEGIN`).
    pub warnings: Vec<String>,
}

/// Stream-scans `text` for `FX:BEGIN`/`FX:END` regions.
///
/// A mismatched or unterminated region is skipped with a recorded warning;
/// other well-formed regions in the same text are still emitted
/// (`spec.md` §4.5: "other snippets in the text are still emitted").
#[must_use]
pub fn to_patches(text: &str) -> ParseOutcome {
    let mut outcome = ParseOutcome::default();
    let mut open: Option<(String, Option<String>, Vec<String>, Vec<&str>)> = None;

    for line in text.lines() {
        match parse_marker_line(line) {
            Some(MarkerLine::Begin(attrs)) => {
                if let Some((pending_id, ..)) = &open {
                    outcome
                        .warnings
                        .push(format!("unterminated region for snippet {pending_id:?}; discarding"));
                }
                open = Some((attrs.id, attrs.checksum, attrs.imports, Vec::new()));
            }
            Some(MarkerLine::End { id }) => match open.take() {
                Some((pending_id, checksum, imports, body_lines)) if pending_id == id => {
                    outcome.patches.push(Patch {
                        id: pending_id,
                        value: body_lines.join("\n"),
                        checksum,
                        imports,
                    });
                }
                Some((pending_id, ..)) => {
                    outcome
                        .warnings
                        .push(format!("mismatched FX:END id={id} inside region for {pending_id:?}; discarding"));
                }
                None => {
                    outcome.warnings.push(format!("stray FX:END id={id} with no open region"));
                }
            },
            None => {
                if let Some((_, _, _, body_lines)) = &mut open {
                    body_lines.push(line);
                }
            }
        }
    }

    if let Some((pending_id, ..)) = open {
        outcome
            .warnings
            .push(format!("unterminated region for snippet {pending_id:?} at end of document; discarding"));
    }

    outcome
}
