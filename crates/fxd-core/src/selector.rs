// SPDX-License-Identifier: Apache-2.0
//! CSS-like selector grammar for matching nodes (`spec.md` §4.2).
//!
//! Grounded on the teacher's `rule::Predicate` matcher, which likewise
//! compiles a small conjunctive grammar into a closure-free struct that is
//! evaluated per candidate rather than interpreted token-by-token at match
//! time.

use crate::node::Node;
use crate::value::Value;

/// A single selector token.
#[derive(Clone, Debug, PartialEq, Eq)]
enum Token {
    /// `#name` — match by terminal name.
    Name(String),
    /// `.type` — match by `type_tag`.
    Type(String),
    /// `[key=val]` — match `meta[key] == val` (string compare).
    MetaEquals(String, String),
    /// `[key]` — match `meta[key]` present.
    MetaPresent(String),
}

/// A compiled selector: an implicit conjunction of [`Token`]s.
///
/// Per `spec.md` §4.2, adjacent tokens all-must-match; there is no
/// union/negation operator in the core grammar.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Selector {
    tokens: Vec<Token>,
}

impl Selector {
    /// Parses a selector string such as `".snippet[lang=js]"`.
    ///
    /// # Errors
    /// Returns a parse error string if a token is not recognised, or a
    /// `[key=val]`/`[key]` clause is unterminated.
    pub fn parse(raw: &str) -> Result<Self, String> {
        let mut tokens = Vec::new();
        let mut chars = raw.char_indices().peekable();
        while let Some(&(i, c)) = chars.peek() {
            match c {
                '#' => {
                    let (name, consumed) = take_run(&raw[i + 1..]);
                    tokens.push(Token::Name(name.to_string()));
                    advance(&mut chars, 1 + consumed);
                }
                '.' => {
                    let (ty, consumed) = take_run(&raw[i + 1..]);
                    tokens.push(Token::Type(ty.to_string()));
                    advance(&mut chars, 1 + consumed);
                }
                '[' => {
                    let close = raw[i..]
                        .find(']')
                        .ok_or_else(|| format!("unterminated '[' clause in selector {raw:?}"))?;
                    let inner = &raw[i + 1..i + close];
                    if let Some((key, val)) = inner.split_once('=') {
                        let val = val.trim_matches(['"', '\'']);
                        tokens.push(Token::MetaEquals(key.trim().to_string(), val.trim().to_string()));
                    } else {
                        tokens.push(Token::MetaPresent(inner.trim().to_string()));
                    }
                    advance(&mut chars, close + 1);
                }
                c if c.is_whitespace() => {
                    advance(&mut chars, 1);
                }
                _ => {
                    return Err(format!("unrecognised selector token starting at {c:?} in {raw:?}"));
                }
            }
        }
        Ok(Self { tokens })
    }

    /// Returns `true` if `node` satisfies every token in this selector.
    #[must_use]
    pub fn matches(&self, node: &Node) -> bool {
        self.tokens.iter().all(|t| token_matches(t, node))
    }
}

fn advance(chars: &mut std::iter::Peekable<std::str::CharIndices<'_>>, n: usize) {
    for _ in 0..n {
        chars.next();
    }
}

/// Consumes a run of identifier-like characters (alnum, `_`, `-`) from the
/// start of `s`. Returns the run and its byte length.
fn take_run(s: &str) -> (&str, usize) {
    let end = s
        .find(|c: char| !(c.is_alphanumeric() || c == '_' || c == '-'))
        .unwrap_or(s.len());
    (&s[..end], end)
}

fn token_matches(token: &Token, node: &Node) -> bool {
    match token {
        Token::Name(name) => node.name == *name,
        Token::Type(ty) => node.type_tag.as_deref() == Some(ty.as_str()),
        Token::MetaEquals(key, val) => match node.meta.get(key) {
            Some(Value::String(s)) => s == val,
            Some(Value::I64(n)) => n.to_string() == *val,
            Some(Value::Bool(b)) => b.to_string() == *val,
            _ => false,
        },
        Token::MetaPresent(key) => node.meta.contains_key(key),
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]

    use super::*;
    use crate::ids::NodeId;

    fn node_with(name: &str, type_tag: Option<&str>) -> Node {
        let mut n = Node::new(NodeId::ROOT, None, name.to_string());
        n.type_tag = type_tag.map(str::to_string);
        n
    }

    #[test]
    fn name_selector_matches_terminal_name() {
        let sel = Selector::parse("#header").unwrap();
        assert!(sel.matches(&node_with("header", None)));
        assert!(!sel.matches(&node_with("footer", None)));
    }

    #[test]
    fn type_selector_matches_type_tag() {
        let sel = Selector::parse(".snippet").unwrap();
        assert!(sel.matches(&node_with("x", Some("snippet"))));
        assert!(!sel.matches(&node_with("x", Some("group"))));
    }

    #[test]
    fn meta_equals_selector_compares_as_string() {
        let sel = Selector::parse("[lang=js]").unwrap();
        let mut n = node_with("x", None);
        n.meta.insert("lang".into(), Value::String("js".into()));
        assert!(sel.matches(&n));
        n.meta.insert("lang".into(), Value::String("ts".into()));
        assert!(!sel.matches(&n));
    }

    #[test]
    fn meta_equals_selector_accepts_quoted_values() {
        let sel = Selector::parse(r#"[lang="js"]"#).unwrap();
        let mut n = node_with("x", None);
        n.meta.insert("lang".into(), Value::String("js".into()));
        assert!(sel.matches(&n));
    }

    #[test]
    fn meta_present_selector_ignores_value() {
        let sel = Selector::parse("[order]").unwrap();
        let mut n = node_with("x", None);
        assert!(!sel.matches(&n));
        n.meta.insert("order".into(), Value::I64(3));
        assert!(sel.matches(&n));
    }

    #[test]
    fn conjunction_requires_all_tokens() {
        let sel = Selector::parse(".snippet[lang=js]").unwrap();
        let mut n = node_with("x", Some("snippet"));
        n.meta.insert("lang".into(), Value::String("ts".into()));
        assert!(!sel.matches(&n));
        n.meta.insert("lang".into(), Value::String("js".into()));
        assert!(sel.matches(&n));
    }

    #[test]
    fn unterminated_bracket_is_a_parse_error() {
        assert!(Selector::parse("[lang=js").is_err());
    }
}
