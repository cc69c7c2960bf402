// SPDX-License-Identifier: Apache-2.0
//! Signal stream replay and reactive-addition scenarios (`spec.md` §8).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use fxd_core::{Cursor, Kernel, Path, Selector, SignalKind, Value};

fn deterministic_kernel() -> Kernel {
    let counter = Arc::new(AtomicU64::new(0));
    Kernel::new(Arc::new(move || counter.fetch_add(1, Ordering::SeqCst)))
}

#[test]
fn subscribing_from_the_start_replays_history_then_continues_live() {
    let mut kernel = deterministic_kernel();
    let id = kernel.ensure(Path::parse("counter")).expect("ensure counter");
    kernel.set(id, Value::I64(1)).expect("write 1");
    kernel.set(id, Value::I64(2)).expect("write 2");

    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen2 = Arc::clone(&seen);
    kernel.subscribe_signals(
        None,
        Cursor::START,
        Box::new(move |signal| seen2.lock().expect("lock").push(signal.new_version)),
    );
    assert_eq!(*seen.lock().expect("lock"), vec![1, 2], "replay must cover every prior mutation in order");

    kernel.set(id, Value::I64(3)).expect("write 3");
    assert_eq!(*seen.lock().expect("lock"), vec![1, 2, 3]);
}

#[test]
fn tailing_only_sees_signals_appended_after_registration() {
    let mut kernel = deterministic_kernel();
    let id = kernel.ensure(Path::parse("counter")).expect("ensure counter");
    kernel.set(id, Value::I64(1)).expect("write before tail");

    let seen = Arc::new(Mutex::new(0usize));
    let seen2 = Arc::clone(&seen);
    kernel.tail_signals(None, Box::new(move |_| *seen2.lock().expect("lock") += 1));
    assert_eq!(*seen.lock().expect("lock"), 0);

    kernel.set(id, Value::I64(2)).expect("write after tail");
    assert_eq!(*seen.lock().expect("lock"), 1);
}

#[test]
fn signal_kind_filter_excludes_other_kinds_during_replay_and_live() {
    let mut kernel = deterministic_kernel();
    let id = kernel.ensure(Path::parse("x")).expect("ensure x");
    kernel.set(id, Value::I64(1)).expect("value signal");
    kernel.set_meta(id, "lang", Some(Value::String("js".to_string()))).expect("metadata signal");

    let metadata_only = kernel.signals_since(Cursor::START).iter().filter(|s| s.kind == SignalKind::Metadata).count();
    assert_eq!(metadata_only, 1);
    let value_only = kernel.signals_since(Cursor::START).iter().filter(|s| s.kind == SignalKind::Value).count();
    assert_eq!(value_only, 1);
}

#[test]
fn a_newly_added_snippet_matching_a_selector_joins_a_reactive_group_without_manual_registration() {
    let mut kernel = deterministic_kernel();
    let group_id = kernel.create_group(Path::parse("views.js_files")).expect("create group");
    kernel
        .group_mut(group_id)
        .expect("group exists")
        .include(Selector::parse("[lang=js]").expect("parse selector"));
    kernel.reconcile_group(group_id);
    assert!(kernel.group_list(group_id).expect("list").is_empty());

    let added = kernel.ensure(Path::parse("snippets.new_one")).expect("ensure new snippet");
    kernel.set(added, Value::String("export const x = 1;".to_string())).expect("set body");
    // `set` alone doesn't touch `meta`, so the group must still be empty.
    assert!(kernel.group_list(group_id).expect("list").is_empty());

    // Tagging it with the selector's matching meta triggers reconciliation
    // automatically, without any manual `add_manual` call.
    kernel.set_meta(added, "lang", Some(Value::String("js".to_string()))).expect("tag lang");
    assert_eq!(kernel.group_list(group_id).expect("list"), &[added]);
}

#[test]
fn unsubscribing_stops_further_delivery() {
    let mut kernel = deterministic_kernel();
    let id = kernel.ensure(Path::parse("x")).expect("ensure x");

    let seen = Arc::new(Mutex::new(0usize));
    let seen2 = Arc::clone(&seen);
    let sub_id = kernel.tail_signals(None, Box::new(move |_| *seen2.lock().expect("lock") += 1));
    kernel.set(id, Value::I64(1)).expect("first write");
    assert_eq!(*seen.lock().expect("lock"), 1);

    kernel.unsubscribe_signals(sub_id);
    kernel.set(id, Value::I64(2)).expect("second write");
    assert_eq!(*seen.lock().expect("lock"), 1, "no delivery after unsubscribe");
}
