// SPDX-License-Identifier: Apache-2.0
//! The signal stream: an append-only, versioned log of every mutation the
//! kernel performs (`spec.md` §4.6).
//!
//! Grounded on the teacher's `tick_delta`/`provenance_store` pair — a
//! versioned delta record plus an append-only history keyed by source — but
//! collapsed into one type here since FXD has no tick boundary to stage
//! deltas against; every mutation is its own record.

use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::ids::NodeId;
use crate::value::Value;

/// The kind of mutation a [`Signal`] describes.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum SignalKind {
    /// A node's `value` changed.
    Value,
    /// A node's `children` map changed (child added or removed).
    Children,
    /// A node's `meta` map changed.
    Metadata,
    /// A caller-defined event not tied to a structural mutation.
    Custom,
}

/// The delta payload carried by a [`Signal`], shaped per `kind`
/// (`spec.md` §4.6 "Record").
#[derive(Clone, Debug)]
pub enum Delta {
    /// Old and new value for a [`SignalKind::Value`] signal.
    Value {
        /// The value before the mutation.
        old: Value,
        /// The value after the mutation.
        new: Value,
    },
    /// A child was added to or removed from the parent's `children` map.
    Children {
        /// The child's name.
        name: String,
        /// The child's node id.
        child: NodeId,
        /// `true` if the child was added, `false` if removed.
        added: bool,
    },
    /// A `meta` key's value changed.
    Metadata {
        /// The meta key that changed.
        key: String,
        /// The value before the mutation, if the key existed.
        old: Option<Value>,
        /// The value after the mutation, if the key still exists.
        new: Option<Value>,
    },
    /// An arbitrary tagged payload for [`SignalKind::Custom`] signals.
    Custom {
        /// A caller-chosen tag identifying the kind of custom event.
        tag: String,
        /// The event payload.
        value: Value,
    },
}

/// A single append-only signal record (`spec.md` §4.6).
#[derive(Clone, Debug)]
pub struct Signal {
    /// Wall-clock timestamp in nanoseconds, assigned at append time.
    pub timestamp_ns: u64,
    /// The kind of mutation this record describes.
    pub kind: SignalKind,
    /// The node's version immediately before this mutation.
    pub base_version: u64,
    /// The node's version immediately after this mutation.
    pub new_version: u64,
    /// The node that originated this mutation.
    pub source_id: NodeId,
    /// The mutation's payload.
    pub delta: Delta,
}

/// An opaque, monotonic position in the signal stream.
///
/// `Cursor(0)` denotes the beginning of the stream.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub struct Cursor(pub(crate) u64);

impl Cursor {
    /// The cursor denoting the very start of the stream.
    pub const START: Cursor = Cursor(0);
}

type Subscriber = Box<dyn FnMut(&Signal) + Send>;

/// The append-only signal stream.
///
/// Subscribers are plain callbacks invoked synchronously from
/// [`SignalStream::append`], matching the kernel's single-threaded reactive
/// scheduling model (`spec.md` §5): there is no background dispatch thread,
/// so `append` only returns once every subscriber has observed the record.
pub struct SignalStream {
    records: Vec<Signal>,
    subscribers: FxHashMap<u64, (Option<SignalKind>, Subscriber)>,
    next_subscriber_id: u64,
    clock: Arc<dyn Fn() -> u64 + Send + Sync>,
}

impl SignalStream {
    /// Creates an empty stream, timestamping records with `clock`.
    ///
    /// Taking the clock as a dependency (rather than calling a wall-clock
    /// API directly) keeps the stream deterministic and testable, matching
    /// the teacher's preference for injected time sources over ambient ones.
    #[must_use]
    pub fn new(clock: Arc<dyn Fn() -> u64 + Send + Sync>) -> Self {
        Self {
            records: Vec::new(),
            subscribers: FxHashMap::default(),
            next_subscriber_id: 0,
            clock,
        }
    }

    /// Appends a record to the stream and synchronously notifies every
    /// matching subscriber, in registration order.
    ///
    /// `append` is atomic: the record is pushed before any subscriber runs,
    /// so a panicking subscriber (caught by the caller, not here — signal
    /// subscribers are trusted kernel-internal code, unlike user watchers)
    /// never leaves the stream in a state where the record is invisible.
    #[allow(clippy::expect_used)] // the push two lines above guarantees `records` is non-empty
    pub fn append(&mut self, kind: SignalKind, base_version: u64, new_version: u64, source_id: NodeId, delta: Delta) {
        let signal = Signal {
            timestamp_ns: (self.clock)(),
            kind,
            base_version,
            new_version,
            source_id,
            delta,
        };
        self.records.push(signal);
        let last = self.records.last().expect("just pushed");
        for (filter, callback) in self.subscribers.values_mut() {
            if filter.is_none_or(|k| k == last.kind) {
                callback(last);
            }
        }
    }

    /// Returns the current end of the stream, usable as a replay starting
    /// point for future subscribers that only want new records.
    #[must_use]
    pub fn cursor(&self) -> Cursor {
        Cursor(self.records.len() as u64)
    }

    /// Replays every record matching `kind` from `from` to the current end,
    /// then registers `callback` to continue receiving live records.
    /// Returns an opaque id usable to unregister later.
    pub fn subscribe(&mut self, kind: Option<SignalKind>, from: Cursor, mut callback: Subscriber) -> u64 {
        for record in &self.records[from.0 as usize..] {
            if kind.is_none_or(|k| k == record.kind) {
                callback(record);
            }
        }
        let id = self.next_subscriber_id;
        self.next_subscriber_id += 1;
        self.subscribers.insert(id, (kind, callback));
        id
    }

    /// Registers `callback` for only future records (equivalent to
    /// `subscribe(kind, self.cursor(), callback)`).
    pub fn tail(&mut self, kind: Option<SignalKind>, callback: Subscriber) -> u64 {
        let end = self.cursor();
        self.subscribe(kind, end, callback)
    }

    /// Removes a previously registered subscriber.
    pub fn unsubscribe(&mut self, id: u64) {
        self.subscribers.remove(&id);
    }

    /// Returns every record from `from` to the current end, without
    /// registering a live subscription.
    #[must_use]
    pub fn records_since(&self, from: Cursor) -> &[Signal] {
        &self.records[from.0 as usize..]
    }

    /// Total number of records ever appended.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns `true` if no records have been appended.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl std::fmt::Debug for SignalStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalStream")
            .field("records", &self.records.len())
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]

    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    fn test_clock() -> Arc<dyn Fn() -> u64 + Send + Sync> {
        let counter = Arc::new(AtomicU64::new(0));
        Arc::new(move || counter.fetch_add(1, Ordering::SeqCst))
    }

    #[test]
    fn subscribe_from_zero_replays_all_then_continues_live() {
        let mut stream = SignalStream::new(test_clock());
        stream.append(
            SignalKind::Value,
            0,
            1,
            NodeId::ROOT,
            Delta::Value {
                old: Value::None,
                new: Value::I64(1),
            },
        );
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let seen2 = Arc::clone(&seen);
        stream.subscribe(
            None,
            Cursor::START,
            Box::new(move |s| seen2.lock().expect("lock").push(s.new_version)),
        );
        assert_eq!(*seen.lock().expect("lock"), vec![1]);

        stream.append(
            SignalKind::Value,
            1,
            2,
            NodeId::ROOT,
            Delta::Value {
                old: Value::I64(1),
                new: Value::I64(2),
            },
        );
        assert_eq!(*seen.lock().expect("lock"), vec![1, 2]);
    }

    #[test]
    fn tail_skips_historical_records() {
        let mut stream = SignalStream::new(test_clock());
        stream.append(
            SignalKind::Value,
            0,
            1,
            NodeId::ROOT,
            Delta::Value {
                old: Value::None,
                new: Value::I64(1),
            },
        );
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let seen2 = Arc::clone(&seen);
        stream.tail(None, Box::new(move |s| seen2.lock().expect("lock").push(s.new_version)));
        assert!(seen.lock().expect("lock").is_empty());

        stream.append(
            SignalKind::Value,
            1,
            2,
            NodeId::ROOT,
            Delta::Value {
                old: Value::I64(1),
                new: Value::I64(2),
            },
        );
        assert_eq!(*seen.lock().expect("lock"), vec![2]);
    }

    #[test]
    fn kind_filter_excludes_non_matching_records() {
        let mut stream = SignalStream::new(test_clock());
        let seen = Arc::new(std::sync::Mutex::new(0));
        let seen2 = Arc::clone(&seen);
        stream.subscribe(
            Some(SignalKind::Metadata),
            Cursor::START,
            Box::new(move |_| *seen2.lock().expect("lock") += 1),
        );
        stream.append(
            SignalKind::Value,
            0,
            1,
            NodeId::ROOT,
            Delta::Value {
                old: Value::None,
                new: Value::I64(1),
            },
        );
        assert_eq!(*seen.lock().expect("lock"), 0);
        stream.append(
            SignalKind::Metadata,
            1,
            2,
            NodeId::ROOT,
            Delta::Metadata {
                key: "lang".into(),
                old: None,
                new: Some(Value::String("js".into())),
            },
        );
        assert_eq!(*seen.lock().expect("lock"), 1);
    }

    #[test]
    fn cursor_advances_with_each_append() {
        let mut stream = SignalStream::new(test_clock());
        assert_eq!(stream.cursor(), Cursor::START);
        stream.append(
            SignalKind::Custom,
            0,
            0,
            NodeId::ROOT,
            Delta::Custom {
                tag: "noop".into(),
                value: Value::None,
            },
        );
        assert_eq!(stream.cursor(), Cursor(1));
    }
}
