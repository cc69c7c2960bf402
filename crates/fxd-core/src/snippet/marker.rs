// SPDX-License-Identifier: Apache-2.0
//! `FX:BEGIN`/`FX:END` marker format (`spec.md` §4.5 "Marker format").
//!
//! Grounded on the teacher's `wsc::types` fixed-layout record header, in
//! spirit rather than in binary layout: both treat a small, explicit,
//! versioned wrapper as the contract boundary between the engine and an
//! external byte stream (here, a text file instead of a binary blob).

/// A language's comment delimiters.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CommentStyle {
    /// The comment-opening token (e.g. `/*`, `#`, `;`).
    pub open: &'static str,
    /// The comment-closing token, if the language uses block comments.
    pub close: Option<&'static str>,
}

/// Looks up the comment style for `lang`. Unknown languages fall back to
/// C-style block comments, since that covers the large majority of the
/// languages named in `spec.md` §4.5.
#[must_use]
pub fn comment_style_for(lang: &str) -> CommentStyle {
    match lang {
        "py" | "python" | "sh" | "bash" | "shell" => CommentStyle { open: "#", close: None },
        "ini" | "toml" => CommentStyle { open: ";", close: None },
        _ => CommentStyle {
            open: "/*",
            close: Some("*/"),
        },
    }
}

/// Computes the marker checksum over a snippet body: BLAKE3, truncated to
/// its first 8 bytes, hex-encoded (Open Question 1 of `spec.md` §9,
/// resolved in `SPEC_FULL.md` §3).
#[must_use]
pub fn checksum(body: &str) -> String {
    let hash = blake3::hash(body.as_bytes());
    hex::encode(&hash.as_bytes()[..8])
}

/// The parsed attributes of an `FX:BEGIN` line.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct BeginAttrs {
    /// The snippet id (`id=`), always present on a well-formed marker.
    pub id: String,
    /// The snippet's language (`lang=`), if present.
    pub lang: Option<String>,
    /// The logical file this snippet belongs to (`file=`), if present.
    pub file: Option<String>,
    /// The checksum recorded at render time (`checksum=`), if present.
    pub checksum: Option<String>,
    /// The group/view ordering tie-breaker (`order=`), if present.
    pub order: Option<i64>,
    /// The node version recorded at render time (`version=`), if present.
    pub version: Option<u64>,
    /// Import lines hoisted out of this snippet's body at render time
    /// (`imports=`), recorded so [`super::parse::to_patches`] can reattach
    /// them on the way back in. Empty when `hoist_imports` was off.
    pub imports: Vec<String>,
}

/// A recognised marker line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MarkerLine {
    /// An `FX:BEGIN` line and its parsed attributes.
    Begin(BeginAttrs),
    /// An `FX:END` line and the snippet id it closes.
    End {
        /// The snippet id the `FX:END` line names.
        id: String,
    },
}

/// Formats an `FX:BEGIN` line for `attrs` using `style`'s comment delimiters.
#[must_use]
pub fn format_begin(style: CommentStyle, attrs: &BeginAttrs) -> String {
    let mut parts = vec![format!("id={}", attrs.id)];
    if let Some(lang) = &attrs.lang {
        parts.push(format!("lang={lang}"));
    }
    if let Some(file) = &attrs.file {
        parts.push(format!("file={file}"));
    }
    if let Some(checksum) = &attrs.checksum {
        parts.push(format!("checksum={checksum}"));
    }
    if let Some(order) = attrs.order {
        parts.push(format!("order={order}"));
    }
    if let Some(version) = attrs.version {
        parts.push(format!("version={version}"));
    }
    if !attrs.imports.is_empty() {
        let joined = attrs.imports.join(IMPORTS_SEP);
        parts.push(format!("imports={}", hex::encode(joined.as_bytes())));
    }
    wrap(style, &format!("FX:BEGIN {}", parts.join(" ")))
}

/// Formats an `FX:END` line for `id` using `style`'s comment delimiters.
#[must_use]
pub fn format_end(style: CommentStyle, id: &str) -> String {
    wrap(style, &format!("FX:END id={id}"))
}

/// Separator joined between hoisted import lines before hex-encoding them
/// into the `imports=` attribute. Chosen to never appear inside a source
/// line; the attribute tokenizer below splits `FX:BEGIN` on whitespace, so
/// the encoded form must itself be whitespace-free.
const IMPORTS_SEP: &str = "\u{1f}";

fn wrap(style: CommentStyle, inner: &str) -> String {
    match style.close {
        Some(close) => format!("{} {} {}", style.open, inner, close),
        None => format!("{} {}", style.open, inner),
    }
}

/// Recognises `line` as an `FX:BEGIN`/`FX:END` marker, if it starts with a
/// recognised comment token and contains `FX:BEGIN` or `FX:END`
/// (`spec.md` §4.5 "The parser treats a line as a marker only when...").
#[must_use]
pub fn parse_marker_line(line: &str) -> Option<MarkerLine> {
    const OPEN_TOKENS: &[&str] = &["/*", "//", "#", ";"];
    let trimmed = line.trim_start();
    let starts_with_comment = OPEN_TOKENS.iter().any(|t| trimmed.starts_with(t));
    if !starts_with_comment {
        return None;
    }
    if let Some(rest) = trimmed.split("FX:BEGIN").nth(1) {
        return Some(MarkerLine::Begin(parse_begin_attrs(rest)));
    }
    if let Some(rest) = trimmed.split("FX:END").nth(1) {
        let attrs = parse_begin_attrs(rest);
        return Some(MarkerLine::End { id: attrs.id });
    }
    None
}

fn parse_begin_attrs(rest: &str) -> BeginAttrs {
    let body = rest.trim_end_matches(['*', '/']).trim();
    let mut attrs = BeginAttrs::default();
    for token in body.split_whitespace() {
        let Some((key, val)) = token.split_once('=') else {
            continue;
        };
        let val = val.trim_matches(['"', '\'']);
        match key {
            "id" => attrs.id = val.to_string(),
            "lang" => attrs.lang = Some(val.to_string()),
            "file" => attrs.file = Some(val.to_string()),
            "checksum" => attrs.checksum = Some(val.to_string()),
            "order" => attrs.order = val.parse().ok(),
            "version" => attrs.version = val.parse().ok(),
            "imports" => {
                if let Some(joined) = hex::decode(val).ok().and_then(|bytes| String::from_utf8(bytes).ok()) {
                    attrs.imports = joined.split(IMPORTS_SEP).map(str::to_string).collect();
                }
            }
            _ => {}
        }
    }
    attrs
}
