// SPDX-License-Identifier: Apache-2.0
//! Entanglement (atomic) links: bidirectional value mirroring between two
//! nodes with transforms, lifecycle hooks, and re-entrancy guards
//! (`spec.md` §4.3).
//!
//! Grounded on the teacher's `tick_patch::PatchLink`, which similarly models
//! a directional propagation edge with a before/after hook pair and an
//! in-flight guard to prevent feedback within one tick; FXD generalises it
//! to the optional bidirectional case the spec requires for Celsius/
//! Fahrenheit-style mirrors.

use crate::ids::NodeId;
use crate::value::Value;

/// Which side(s) of a link actively propagate.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Direction {
    /// Only source → target.
    AtoB,
    /// Only target → source.
    BtoA,
    /// Both directions.
    Both,
}

/// The decision a `before_set` hook makes for an incoming propagation.
pub enum Decision {
    /// Proceed with (possibly replaced) `value`.
    Proceed(Value),
    /// Silently drop this propagation; no error recorded.
    Skip,
    /// Abort this propagation and record `reason` in the link's error
    /// counter (`spec.md` §4.3 "Failure semantics").
    Reject(String),
}

/// A pure value transform applied before writing to the other endpoint.
pub type Transform = Box<dyn Fn(&Value) -> Value + Send>;

/// A `before_set` lifecycle hook for one side of a link.
pub type BeforeSetHook = Box<dyn FnMut(&Value, &Value) -> Decision + Send>;

/// A `set`/`after_set` lifecycle hook for one side of a link.
pub type SetHook = Box<dyn FnMut(&Value) + Send>;

#[derive(Default)]
struct SideHooks {
    before_set: Option<BeforeSetHook>,
    set: Option<SetHook>,
    after_set: Option<SetHook>,
}

/// Which direction is currently mid-propagation, used to suppress the
/// reciprocal write and prevent infinite echo (`spec.md` §4.3
/// "Re-entrancy and ordering").
#[derive(Clone, Copy, PartialEq, Eq)]
enum InFlight {
    None,
    AtoB,
    BtoA,
}

/// A single entanglement link between two node paths.
pub struct Link {
    source: NodeId,
    target: NodeId,
    direction: Direction,
    map_a_to_b: Option<Transform>,
    map_b_to_a: Option<Transform>,
    a_hooks: SideHooks,
    b_hooks: SideHooks,
    debounce_microseconds: u64,
    paused: bool,
    disposed: bool,
    in_flight: InFlight,
    error_count: u64,
}

/// The outcome of attempting to propagate a value across a link.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum PropagateOutcome {
    /// The transformed value was written to the other endpoint.
    Applied,
    /// Propagation was skipped (direction disallows it, link paused or
    /// disposed, reciprocal suppression, or a hook chose `Skip`).
    Skipped,
    /// A `before_set` hook rejected the propagation.
    Rejected,
}

impl Link {
    /// Creates a new link between `source` and `target`. `initial_sync`, if
    /// requested, is the caller's responsibility to perform via an explicit
    /// [`Link::propagate_a_to_b`]/[`Link::propagate_b_to_a`] call right after
    /// construction — the link itself holds no reference to the kernel and
    /// cannot read the current value of either endpoint.
    #[must_use]
    pub fn new(source: NodeId, target: NodeId, direction: Direction) -> Self {
        Self {
            source,
            target,
            direction,
            map_a_to_b: None,
            map_b_to_a: None,
            a_hooks: SideHooks::default(),
            b_hooks: SideHooks::default(),
            debounce_microseconds: 0,
            paused: false,
            disposed: false,
            in_flight: InFlight::None,
            error_count: 0,
        }
    }

    /// The source node path's id.
    #[must_use]
    pub fn source(&self) -> NodeId {
        self.source
    }

    /// This link's configured propagation direction.
    #[must_use]
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// The target node path's id.
    #[must_use]
    pub fn target(&self) -> NodeId {
        self.target
    }

    /// Sets the A→B transform (default identity).
    pub fn set_map_a_to_b(&mut self, f: Transform) {
        self.map_a_to_b = Some(f);
    }

    /// Sets the B→A transform (default identity).
    pub fn set_map_b_to_a(&mut self, f: Transform) {
        self.map_b_to_a = Some(f);
    }

    /// Sets the `before_set` hook for the A-side.
    pub fn set_before_set_a(&mut self, hook: BeforeSetHook) {
        self.a_hooks.before_set = Some(hook);
    }

    /// Sets the `before_set` hook for the B-side.
    pub fn set_before_set_b(&mut self, hook: BeforeSetHook) {
        self.b_hooks.before_set = Some(hook);
    }

    /// Sets the `after_set` hook for the A-side.
    pub fn set_after_set_a(&mut self, hook: SetHook) {
        self.a_hooks.after_set = Some(hook);
    }

    /// Sets the `after_set` hook for the B-side.
    pub fn set_after_set_b(&mut self, hook: SetHook) {
        self.b_hooks.after_set = Some(hook);
    }

    /// Sets the debounce window; `0` means synchronous propagation.
    pub fn set_debounce_microseconds(&mut self, micros: u64) {
        self.debounce_microseconds = micros;
    }

    /// The configured debounce window.
    #[must_use]
    pub fn debounce_microseconds(&self) -> u64 {
        self.debounce_microseconds
    }

    /// Suspends propagation in both directions without removing the link.
    pub fn pause(&mut self) {
        self.paused = true;
    }

    /// Resumes propagation after [`Link::pause`].
    pub fn resume(&mut self) {
        self.paused = false;
    }

    /// Permanently disables this link. Does not modify either endpoint's
    /// current value (`spec.md` §4.3 "Lifecycle controls").
    pub fn dispose(&mut self) {
        self.disposed = true;
    }

    /// Returns `true` if this link has been disposed.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// The number of propagation failures recorded since creation
    /// (`spec.md` §4.3 "Failure semantics").
    #[must_use]
    pub fn error_count(&self) -> u64 {
        self.error_count
    }

    /// Attempts to propagate a new source value to the target, running the
    /// A-side hooks and the A→B transform. Returns the value to write to the
    /// target on [`PropagateOutcome::Applied`].
    pub fn propagate_a_to_b(&mut self, incoming: &Value, current_target: &Value) -> (PropagateOutcome, Option<Value>) {
        if self.disposed || self.paused || self.direction == Direction::BtoA {
            return (PropagateOutcome::Skipped, None);
        }
        if self.in_flight == InFlight::BtoA {
            return (PropagateOutcome::Skipped, None);
        }
        let decided = match &mut self.a_hooks.before_set {
            Some(hook) => hook(incoming, current_target),
            None => Decision::Proceed(incoming.clone()),
        };
        let value = match decided {
            Decision::Proceed(v) => v,
            Decision::Skip => return (PropagateOutcome::Skipped, None),
            Decision::Reject(_) => {
                self.error_count += 1;
                return (PropagateOutcome::Rejected, None);
            }
        };
        let transformed = self.map_a_to_b.as_ref().map_or_else(|| value.clone(), |f| f(&value));
        self.in_flight = InFlight::AtoB;
        if let Some(hook) = &mut self.a_hooks.set {
            hook(&transformed);
        }
        if let Some(hook) = &mut self.b_hooks.after_set {
            hook(&transformed);
        }
        (PropagateOutcome::Applied, Some(transformed))
    }

    /// The B→A mirror of [`Link::propagate_a_to_b`].
    pub fn propagate_b_to_a(&mut self, incoming: &Value, current_source: &Value) -> (PropagateOutcome, Option<Value>) {
        if self.disposed || self.paused || self.direction == Direction::AtoB {
            return (PropagateOutcome::Skipped, None);
        }
        if self.in_flight == InFlight::AtoB {
            return (PropagateOutcome::Skipped, None);
        }
        let decided = match &mut self.b_hooks.before_set {
            Some(hook) => hook(incoming, current_source),
            None => Decision::Proceed(incoming.clone()),
        };
        let value = match decided {
            Decision::Proceed(v) => v,
            Decision::Skip => return (PropagateOutcome::Skipped, None),
            Decision::Reject(_) => {
                self.error_count += 1;
                return (PropagateOutcome::Rejected, None);
            }
        };
        let transformed = self.map_b_to_a.as_ref().map_or_else(|| value.clone(), |f| f(&value));
        self.in_flight = InFlight::BtoA;
        if let Some(hook) = &mut self.b_hooks.set {
            hook(&transformed);
        }
        if let Some(hook) = &mut self.a_hooks.after_set {
            hook(&transformed);
        }
        (PropagateOutcome::Applied, Some(transformed))
    }

    /// Clears the in-flight guard after the kernel has finished writing the
    /// propagated value to the other endpoint. Callers must call this once
    /// the recursive write (and any reciprocal propagation it triggered) has
    /// returned, so the guard spans the entire write rather than just the
    /// hook invocations (`spec.md` §4.3 "Re-entrancy and ordering").
    pub fn finish_propagation(&mut self) {
        self.in_flight = InFlight::None;
    }
}

impl std::fmt::Debug for Link {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Link")
            .field("source", &self.source)
            .field("target", &self.target)
            .field("direction", &self.direction)
            .field("paused", &self.paused)
            .field("disposed", &self.disposed)
            .field("error_count", &self.error_count)
            .finish_non_exhaustive()
    }
}
