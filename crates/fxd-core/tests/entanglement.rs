// SPDX-License-Identifier: Apache-2.0
//! Celsius/Fahrenheit entanglement scenario (`spec.md` §8): a bidirectional
//! link with transforms on both sides must propagate in exactly one
//! direction per write, with no oscillation.

use fxd_core::{Direction, Kernel, Path, Value};

fn celsius_to_fahrenheit(v: &Value) -> Value {
    match v {
        Value::F64(c) => Value::F64(c * 9.0 / 5.0 + 32.0),
        other => other.clone(),
    }
}

fn fahrenheit_to_celsius(v: &Value) -> Value {
    match v {
        Value::F64(f) => Value::F64((f - 32.0) * 5.0 / 9.0),
        other => other.clone(),
    }
}

#[test]
fn writing_celsius_updates_fahrenheit_without_oscillation() {
    let mut kernel = Kernel::new_with_system_clock();
    let celsius = kernel.ensure(Path::parse("temp.celsius")).expect("ensure celsius");
    let fahrenheit = kernel.ensure(Path::parse("temp.fahrenheit")).expect("ensure fahrenheit");
    kernel.set(celsius, Value::F64(0.0)).expect("seed celsius");
    kernel.set(fahrenheit, Value::F64(32.0)).expect("seed fahrenheit");

    let handle = kernel.create_link(celsius, fahrenheit, Direction::Both, false).expect("create link");
    let link = kernel.link_mut(handle).expect("link exists");
    link.set_map_a_to_b(Box::new(celsius_to_fahrenheit));
    link.set_map_b_to_a(Box::new(fahrenheit_to_celsius));

    let cursor = kernel.signal_cursor();
    kernel.set(celsius, Value::F64(100.0)).expect("write celsius");
    assert_eq!(kernel.get(fahrenheit).expect("read fahrenheit"), Value::F64(212.0));
    assert_eq!(kernel.signals_since(cursor).len(), 2, "exactly one write per endpoint, no echo");

    let cursor = kernel.signal_cursor();
    kernel.set(fahrenheit, Value::F64(32.0)).expect("write fahrenheit back");
    assert_eq!(kernel.get(celsius).expect("read celsius"), Value::F64(0.0));
    assert_eq!(kernel.signals_since(cursor).len(), 2);
}

#[test]
fn a_to_b_only_link_leaves_source_untouched_by_target_writes() {
    let mut kernel = Kernel::new_with_system_clock();
    let source = kernel.ensure(Path::parse("a")).expect("ensure a");
    let target = kernel.ensure(Path::parse("b")).expect("ensure b");
    kernel.set(source, Value::I64(1)).expect("seed a");
    kernel.set(target, Value::I64(1)).expect("seed b");
    kernel.create_link(source, target, Direction::AtoB, false).expect("create link");

    kernel.set(target, Value::I64(99)).expect("write b directly");
    assert_eq!(kernel.get(source).expect("read a"), Value::I64(1), "AtoB link must not mirror B writes back to A");

    kernel.set(source, Value::I64(7)).expect("write a");
    assert_eq!(kernel.get(target).expect("read b"), Value::I64(7));
}

#[test]
fn disposing_a_link_stops_further_propagation() {
    let mut kernel = Kernel::new_with_system_clock();
    let a = kernel.ensure(Path::parse("a")).expect("ensure a");
    let b = kernel.ensure(Path::parse("b")).expect("ensure b");
    kernel.set(a, Value::I64(1)).expect("seed a");
    kernel.set(b, Value::I64(1)).expect("seed b");
    let handle = kernel.create_link(a, b, Direction::Both, false).expect("create link");

    kernel.dispose_link(handle);
    kernel.set(a, Value::I64(42)).expect("write a after dispose");
    assert_eq!(kernel.get(b).expect("read b"), Value::I64(1), "disposed link must not propagate");
}

#[test]
fn deleting_an_endpoint_disposes_the_link_without_panicking() {
    let mut kernel = Kernel::new_with_system_clock();
    let a = kernel.ensure(Path::parse("a")).expect("ensure a");
    let b = kernel.ensure(Path::parse("b")).expect("ensure b");
    kernel.create_link(a, b, Direction::Both, false).expect("create link");

    kernel.delete(a).expect("delete a");
    // The surviving endpoint must still accept writes without the kernel
    // trying to propagate through a link whose source no longer exists.
    kernel.set(b, Value::I64(5)).expect("write b after source deleted");
    assert_eq!(kernel.get(b).expect("read b"), Value::I64(5));
}
