// SPDX-License-Identifier: Apache-2.0
//! Reactive snippets: a function whose parameters are bound to graph paths
//! and whose return value is written to a graph path, re-executing when any
//! bound input changes (`spec.md` §4.4).
//!
//! Grounded on the teacher's `tick_patch::PatchFn` pipeline stage, which
//! likewise binds a closure's inputs to named slots and records a
//! re-derivable description string alongside the closure for diagnostics;
//! here that description is `meta.source`, since per `spec.md` §9 Design
//! Note the closure itself is never reconstructible from persisted state.

use rustc_hash::FxHashMap;

use crate::ids::NodeId;
use crate::value::Value;

/// A pure transform applied to a parameter's raw node value before it
/// reaches the function.
pub type ParamTransform = Box<dyn Fn(&Value) -> Value + Send>;

/// One bound parameter: the path it reads from and an optional transform.
pub struct Param {
    /// The parameter's name, used for `this`-like lookup inside the
    /// function and for diagnostic reporting.
    pub name: String,
    /// The node this parameter reads its current value from.
    pub external: NodeId,
    /// An optional transform applied to the raw node value.
    pub transform: Option<ParamTransform>,
}

impl Param {
    /// Creates a parameter with no transform (identity).
    #[must_use]
    pub fn new(name: impl Into<String>, external: NodeId) -> Self {
        Self {
            name: name.into(),
            external,
            transform: None,
        }
    }

    /// Attaches a transform to this parameter.
    #[must_use]
    pub fn with_transform(mut self, transform: ParamTransform) -> Self {
        self.transform = Some(transform);
        self
    }

    fn apply(&self, raw: &Value) -> Value {
        self.transform.as_ref().map_or_else(|| raw.clone(), |f| f(raw))
    }
}

/// `this`-like context exposing every parameter's current (transformed)
/// value by name, passed to the bound function alongside its positional
/// arguments (`spec.md` §4.4 "The function receives also a `this`-like
/// context").
pub struct ParamContext<'a> {
    values: &'a FxHashMap<String, Value>,
}

impl<'a> ParamContext<'a> {
    /// Looks up a parameter's current value by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }
}

/// The bound function: arity-N, pure, returning the new output value or an
/// error message recorded to `meta.last_error`.
pub type SnippetFn = Box<dyn Fn(&[Value], &ParamContext<'_>) -> Result<Value, String> + Send>;

/// A reactive snippet: a function bound to named graph-path parameters and
/// an optional output path.
pub struct ReactiveSnippet {
    params: Vec<Param>,
    output: Option<NodeId>,
    func: SnippetFn,
    reactive: bool,
    debounce_microseconds: u64,
    last_error: Option<String>,
    source: String,
}

/// What a single [`ReactiveSnippet::execute`] attempt produced.
pub enum ExecutionOutcome {
    /// The function ran and produced a value to write to `output`.
    Produced(Value),
    /// At least one bound parameter was absent; execution was skipped and
    /// the output was left untouched (`spec.md` §4.4).
    SkippedMissingParam {
        /// The name of the first missing parameter encountered.
        param: String,
    },
    /// The function returned an error; it is recorded on `meta.last_error`
    /// and the output is left untouched.
    Failed {
        /// The error message the function returned.
        message: String,
    },
}

impl ReactiveSnippet {
    /// Creates a reactive snippet from its bound parameters, function, and
    /// re-derivable source text.
    #[must_use]
    pub fn new(params: Vec<Param>, func: SnippetFn, source: impl Into<String>) -> Self {
        Self {
            params,
            output: None,
            func,
            reactive: true,
            debounce_microseconds: 0,
            last_error: None,
            source: source.into(),
        }
    }

    /// Sets the output path this snippet writes its return value to.
    pub fn set_output(&mut self, output: NodeId) {
        self.output = Some(output);
    }

    /// The configured output path, if any.
    #[must_use]
    pub fn output(&self) -> Option<NodeId> {
        self.output
    }

    /// Sets whether this snippet re-executes automatically on input change.
    /// When `false`, execution only happens via an explicit
    /// [`ReactiveSnippet::execute`] call (`spec.md` §4.4 `reactive`).
    pub fn set_reactive(&mut self, reactive: bool) {
        self.reactive = reactive;
    }

    /// Returns `true` if this snippet re-executes automatically.
    #[must_use]
    pub fn is_reactive(&self) -> bool {
        self.reactive
    }

    /// Sets the debounce window for re-execution.
    pub fn set_debounce_microseconds(&mut self, micros: u64) {
        self.debounce_microseconds = micros;
    }

    /// The configured debounce window.
    #[must_use]
    pub fn debounce_microseconds(&self) -> u64 {
        self.debounce_microseconds
    }

    /// The node ids every bound parameter watches, in declared order.
    #[must_use]
    pub fn watched_paths(&self) -> Vec<NodeId> {
        self.params.iter().map(|p| p.external).collect()
    }

    /// The most recent execution error, if any (`meta.last_error`).
    #[must_use]
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// The re-derivable text surface for view rendering (`meta.source`,
    /// `spec.md` §4.4 "`toString` facility").
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Executes the bound function against `raw_values` (each bound
    /// parameter's current raw node value, keyed by node id).
    ///
    /// Skips execution if any bound parameter is absent from
    /// `raw_values`, per `spec.md` §4.4. On success, clears `last_error`.
    /// On function error, records it and returns
    /// [`ExecutionOutcome::Failed`] without touching the output.
    pub fn execute(&mut self, raw_values: &FxHashMap<NodeId, Value>) -> ExecutionOutcome {
        let mut ordered = Vec::with_capacity(self.params.len());
        let mut by_name = FxHashMap::default();
        for param in &self.params {
            let Some(raw) = raw_values.get(&param.external) else {
                return ExecutionOutcome::SkippedMissingParam {
                    param: param.name.clone(),
                };
            };
            let value = param.apply(raw);
            ordered.push(value.clone());
            by_name.insert(param.name.clone(), value);
        }
        let ctx = ParamContext { values: &by_name };
        match (self.func)(&ordered, &ctx) {
            Ok(value) => {
                self.last_error = None;
                ExecutionOutcome::Produced(value)
            }
            Err(message) => {
                self.last_error = Some(message.clone());
                ExecutionOutcome::Failed { message }
            }
        }
    }
}

impl std::fmt::Debug for ReactiveSnippet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReactiveSnippet")
            .field("params", &self.params.iter().map(|p| &p.name).collect::<Vec<_>>())
            .field("output", &self.output)
            .field("reactive", &self.reactive)
            .field("last_error", &self.last_error)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]

    use super::*;

    fn add_fn() -> SnippetFn {
        Box::new(|args, _ctx| match (&args[0], &args[1]) {
            (Value::I64(a), Value::I64(b)) => Ok(Value::I64(a + b)),
            _ => Err("expected two i64 params".to_string()),
        })
    }

    #[test]
    fn executes_and_produces_sum() {
        let a = NodeId(1);
        let b = NodeId(2);
        let mut snippet = ReactiveSnippet::new(
            vec![Param::new("a", a), Param::new("b", b)],
            add_fn(),
            "a + b",
        );
        let mut raw = FxHashMap::default();
        raw.insert(a, Value::I64(10));
        raw.insert(b, Value::I64(5));
        match snippet.execute(&raw) {
            ExecutionOutcome::Produced(Value::I64(15)) => {}
            _ => panic!("expected sum of 15 in test"),
        }
    }

    #[test]
    fn skips_when_param_absent() {
        let a = NodeId(1);
        let b = NodeId(2);
        let mut snippet = ReactiveSnippet::new(
            vec![Param::new("a", a), Param::new("b", b)],
            add_fn(),
            "a + b",
        );
        let mut raw = FxHashMap::default();
        raw.insert(a, Value::I64(10));
        match snippet.execute(&raw) {
            ExecutionOutcome::SkippedMissingParam { param } => assert_eq!(param, "b"),
            _ => panic!("expected skip in test"),
        }
    }

    #[test]
    fn records_last_error_on_failure() {
        let a = NodeId(1);
        let b = NodeId(2);
        let mut snippet = ReactiveSnippet::new(
            vec![Param::new("a", a), Param::new("b", b)],
            add_fn(),
            "a + b",
        );
        let mut raw = FxHashMap::default();
        raw.insert(a, Value::String("nope".into()));
        raw.insert(b, Value::I64(5));
        match snippet.execute(&raw) {
            ExecutionOutcome::Failed { .. } => {}
            _ => panic!("expected failure in test"),
        }
        assert!(snippet.last_error().is_some());
    }

    #[test]
    fn transform_applies_before_function_sees_value() {
        let a = NodeId(1);
        let b = NodeId(2);
        let param_a = Param::new("a", a).with_transform(Box::new(|v| match v {
            Value::I64(n) => Value::I64(n * 2),
            other => other.clone(),
        }));
        let mut snippet = ReactiveSnippet::new(vec![param_a, Param::new("b", b)], add_fn(), "a*2 + b");
        let mut raw = FxHashMap::default();
        raw.insert(a, Value::I64(10));
        raw.insert(b, Value::I64(1));
        match snippet.execute(&raw) {
            ExecutionOutcome::Produced(Value::I64(21)) => {}
            _ => panic!("expected 21 in test"),
        }
    }
}
