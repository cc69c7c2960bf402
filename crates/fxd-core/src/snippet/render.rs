// SPDX-License-Identifier: Apache-2.0
//! Renders an ordered list of snippets into a single marker-delimited text
//! file (`spec.md` §4.5 "Render contract").

use super::marker::{checksum, comment_style_for, format_begin, format_end, BeginAttrs};

/// Line-ending style for the rendered document.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Eol {
    /// `\n`.
    Lf,
    /// `\r\n`.
    CrLf,
}

/// One snippet to render, already resolved from the graph by the caller.
#[derive(Clone, Debug)]
pub struct SnippetInput {
    /// The snippet id (`meta.id`).
    pub id: String,
    /// The snippet's language, if set.
    pub lang: Option<String>,
    /// The logical file this snippet belongs to, if set.
    pub file: Option<String>,
    /// The group/view ordering tie-breaker, if set.
    pub order: Option<i64>,
    /// The node's current version, recorded on the marker for diagnostics.
    pub version: Option<u64>,
    /// The snippet's text body.
    pub body: String,
}

/// Options controlling [`render_view`].
#[derive(Clone, Debug)]
pub struct RenderOptions {
    /// The language used to pick comment delimiters and to gate
    /// `hoist_imports`.
    pub lang: String,
    /// The separator joined between rendered snippet blocks.
    pub sep: String,
    /// The line-ending style to normalise the final document to.
    pub eol: Eol,
    /// Whether to hoist single-line top-of-snippet `import` statements to
    /// the document preamble.
    pub hoist_imports: bool,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            lang: "js".to_string(),
            sep: "\n\n".to_string(),
            eol: Eol::Lf,
            hoist_imports: false,
        }
    }
}

const HOISTABLE_LANGS: &[&str] = &["js", "ts", "jsx", "tsx"];

/// Renders `snippets` (already in the view's membership order) into a
/// single marker-delimited text document.
#[must_use]
pub fn render_view(snippets: &[SnippetInput], opts: &RenderOptions) -> String {
    if snippets.is_empty() {
        return String::new();
    }
    let style = comment_style_for(&opts.lang);

    let mut preamble: Vec<String> = Vec::new();
    let mut seen_imports = std::collections::HashSet::new();
    let mut bodies: Vec<String> = Vec::with_capacity(snippets.len());
    let mut own_imports: Vec<Vec<String>> = Vec::with_capacity(snippets.len());
    for s in snippets {
        if opts.hoist_imports && HOISTABLE_LANGS.contains(&opts.lang.as_str()) {
            let (rest, mine) = strip_leading_imports(&s.body, &mut preamble, &mut seen_imports);
            bodies.push(rest);
            own_imports.push(mine);
        } else {
            bodies.push(s.body.clone());
            own_imports.push(Vec::new());
        }
    }

    let mut blocks = Vec::with_capacity(snippets.len());
    for ((snippet, body), imports) in snippets.iter().zip(bodies.iter()).zip(own_imports) {
        let attrs = BeginAttrs {
            id: snippet.id.clone(),
            lang: snippet.lang.clone(),
            file: snippet.file.clone(),
            checksum: Some(checksum(body)),
            order: snippet.order,
            version: snippet.version,
            imports,
        };
        let begin = format_begin(style, &attrs);
        let end = format_end(style, &snippet.id);
        blocks.push(format!("{begin}\n{body}\n{end}"));
    }

    let mut doc = if preamble.is_empty() {
        blocks.join(&opts.sep)
    } else {
        format!("{}\n\n{}", preamble.join("\n"), blocks.join(&opts.sep))
    };

    if opts.eol == Eol::CrLf {
        doc = doc.replace('\n', "\r\n");
    }
    doc
}

/// Removes contiguous single-line `import ...` statements from the top of
/// `body`, appending newly seen ones (in first-appearance order) to the
/// document-wide `preamble`. Returns the body with those leading lines
/// removed, together with this snippet's own stripped lines (independent of
/// `preamble`'s cross-snippet dedup) so the caller can record them on the
/// snippet's own marker and reattach them on parse.
fn strip_leading_imports(
    body: &str,
    preamble: &mut Vec<String>,
    seen: &mut std::collections::HashSet<String>,
) -> (String, Vec<String>) {
    let mut own = Vec::new();
    let mut rest_start = 0;
    let mut consumed_any = false;
    let mut cursor = 0;
    for line in body.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with("import ") {
            own.push(trimmed.to_string());
            if seen.insert(trimmed.to_string()) {
                preamble.push(trimmed.to_string());
            }
            consumed_any = true;
            cursor += line.len() + 1;
            rest_start = cursor;
        } else {
            break;
        }
    }
    if !consumed_any {
        return (body.to_string(), own);
    }
    let rest = body.get(rest_start..).unwrap_or("").trim_start_matches('\n').to_string();
    (rest, own)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]

    use super::*;

    fn input(id: &str, body: &str) -> SnippetInput {
        SnippetInput {
            id: id.to_string(),
            lang: Some("js".to_string()),
            file: None,
            order: None,
            version: None,
            body: body.to_string(),
        }
    }

    #[test]
    fn empty_view_renders_to_empty_string() {
        assert_eq!(render_view(&[], &RenderOptions::default()), "");
    }

    #[test]
    fn renders_markers_around_each_body_joined_by_sep() {
        let snippets = vec![input("a", "const a = 1;"), input("b", "const b = 2;")];
        let doc = render_view(&snippets, &RenderOptions::default());
        assert!(doc.contains("FX:BEGIN id=a"));
        assert!(doc.contains("FX:END id=a"));
        assert!(doc.contains("FX:BEGIN id=b"));
        assert!(doc.contains("\n\n"));
    }

    #[test]
    fn hoists_leading_import_lines_preserving_first_appearance_order() {
        let snippets = vec![
            input("header", "import { db } from './db.js'\nexport const x = 1;"),
            input("find", "import { db } from './db.js'\nimport { z } from './z.js'\nexport const y = 2;"),
        ];
        let opts = RenderOptions {
            hoist_imports: true,
            ..RenderOptions::default()
        };
        let doc = render_view(&snippets, &opts);
        let preamble_end = doc.find("\n\n").unwrap();
        let preamble = &doc[..preamble_end];
        assert_eq!(preamble, "import { db } from './db.js'\nimport { z } from './z.js'");
        assert!(!doc.contains("FX:BEGIN id=header\nimport"));
    }

    #[test]
    fn hoisted_import_lines_are_recorded_on_their_own_snippets_begin_marker() {
        use super::super::marker::parse_marker_line;
        use super::super::marker::MarkerLine;

        let snippets = vec![input("header", "import { db } from './db.js'")];
        let opts = RenderOptions {
            hoist_imports: true,
            ..RenderOptions::default()
        };
        let doc = render_view(&snippets, &opts);
        let begin_line = doc.lines().find(|l| l.contains("FX:BEGIN")).expect("begin line present");
        match parse_marker_line(begin_line) {
            Some(MarkerLine::Begin(attrs)) => {
                assert_eq!(attrs.imports, vec!["import { db } from './db.js'".to_string()]);
            }
            other => panic!("expected a Begin marker in test, got {other:?}"),
        }
    }

    #[test]
    fn crlf_normalises_all_newlines() {
        let snippets = vec![input("a", "const a = 1;")];
        let opts = RenderOptions {
            eol: Eol::CrLf,
            ..RenderOptions::default()
        };
        let doc = render_view(&snippets, &opts);
        assert!(doc.contains("\r\n"));
        assert!(!doc.replace("\r\n", "").contains('\n'));
    }
}
