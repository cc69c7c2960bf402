// SPDX-License-Identifier: Apache-2.0
//! Round-trip editing and view-reordering scenarios (`spec.md` §8).

use fxd_core::snippet::{ApplyOptions, RenderOptions};
use fxd_core::{Kernel, Path, Value};

fn seed_snippet(kernel: &mut Kernel, path: &str, id: &str, order: i64, body: &str) -> fxd_core::NodeId {
    let node = kernel.ensure(Path::parse(path)).expect("ensure snippet path");
    kernel.set(node, Value::String(body.to_string())).expect("set snippet body");
    kernel.set_meta(node, "id", Some(Value::String(id.to_string()))).expect("set snippet id");
    kernel.set_meta(node, "lang", Some(Value::String("js".to_string()))).expect("set snippet lang");
    kernel.set_meta(node, "order", Some(Value::I64(order))).expect("set snippet order");
    node
}

#[test]
fn rendered_view_round_trips_an_edited_body_back_to_the_graph() {
    let mut kernel = Kernel::new_with_system_clock();
    let header = seed_snippet(&mut kernel, "snippets.header", "header", 0, "const a = 1;");
    seed_snippet(&mut kernel, "snippets.footer", "footer", 1, "const b = 2;");

    let group_id = kernel.create_group(Path::parse("views.file")).expect("create group");
    kernel.group_mut(group_id).expect("group exists").add_manual(header);
    let footer = kernel.resolve(Path::parse("snippets.footer")).expect("resolve").expect("footer exists");
    kernel.group_mut(group_id).expect("group exists").add_manual(footer);
    kernel.reconcile_group(group_id);

    let rendered = kernel.render_view(group_id, &RenderOptions::default()).expect("render view");
    assert!(rendered.contains("FX:BEGIN id=header"));
    assert!(rendered.contains("FX:END id=header"));
    assert!(rendered.contains("const a = 1;"));

    let edited = rendered.replace("const a = 1;", "const a = 100;");
    let outcome = kernel.apply_view_patches(&edited, &ApplyOptions::default()).expect("apply patches");
    assert_eq!(outcome.applied.len(), 2);
    assert!(outcome.warnings.is_empty());
    assert_eq!(kernel.get(header).expect("read header"), Value::String("const a = 100;".to_string()));
}

#[test]
fn hoisting_imports_round_trips_a_pure_import_snippet_losslessly() {
    let mut kernel = Kernel::new_with_system_clock();
    let header = seed_snippet(&mut kernel, "repo.header", "header", 0, "import { db } from './db.js'");
    seed_snippet(&mut kernel, "repo.find", "find", 1, "import { db } from './db.js'\nexport function find() { return db.get(); }");

    let group_id = kernel.create_group(Path::parse("views.repoFile")).expect("create group");
    kernel.group_mut(group_id).expect("group exists").add_manual(header);
    let find = kernel.resolve(Path::parse("repo.find")).expect("resolve").expect("find exists");
    kernel.group_mut(group_id).expect("group exists").add_manual(find);
    kernel.reconcile_group(group_id);

    let opts = RenderOptions {
        hoist_imports: true,
        ..RenderOptions::default()
    };
    let rendered = kernel.render_view(group_id, &opts).expect("render view");
    // The hoisted import is lifted into the document preamble, not repeated
    // inside `header`'s own marker region.
    assert!(!rendered.contains("FX:BEGIN id=header\nimport"));

    let outcome = kernel.apply_view_patches(&rendered, &ApplyOptions::default()).expect("apply patches");
    assert_eq!(outcome.applied.len(), 2);
    assert!(outcome.warnings.is_empty());
    // The origin node must recover its import line, not lose it to the
    // stripped marker body (spec §8 scenario 1).
    assert_eq!(kernel.get(header).expect("read header"), Value::String("import { db } from './db.js'".to_string()));
}

#[test]
fn changing_meta_order_reorders_the_rendered_view() {
    let mut kernel = Kernel::new_with_system_clock();
    let first = seed_snippet(&mut kernel, "snippets.a", "a", 0, "a_body");
    let second = seed_snippet(&mut kernel, "snippets.b", "b", 1, "b_body");

    let group_id = kernel.create_group(Path::parse("views.file")).expect("create group");
    kernel.group_mut(group_id).expect("group exists").add_manual(first);
    kernel.group_mut(group_id).expect("group exists").add_manual(second);
    kernel.reconcile_group(group_id);
    assert_eq!(kernel.group_list(group_id).expect("list"), &[first, second]);

    kernel.set_meta(first, "order", Some(Value::I64(5))).expect("bump order past second");
    assert_eq!(kernel.group_list(group_id).expect("list"), &[second, first]);

    let rendered = kernel.render_view(group_id, &RenderOptions::default()).expect("render view");
    let a_pos = rendered.find("FX:BEGIN id=a").expect("a present");
    let b_pos = rendered.find("FX:BEGIN id=b").expect("b present");
    assert!(b_pos < a_pos, "b should render before a once a's order is pushed back");
}

#[test]
fn checksum_divergence_still_applies_but_warns() {
    let mut kernel = Kernel::new_with_system_clock();
    seed_snippet(&mut kernel, "snippets.header", "header", 0, "const a = 1;");

    let tampered = "// FX:BEGIN id=header checksum=deadbeefdeadbeef\nconst a = 999;\n// FX:END id=header";
    let outcome = kernel.apply_view_patches(tampered, &ApplyOptions::default()).expect("apply patches");
    assert_eq!(outcome.applied.len(), 1);
    assert_eq!(outcome.warnings.len(), 1);
}

#[test]
fn unmatched_snippet_id_is_rejected_by_default() {
    let mut kernel = Kernel::new_with_system_clock();
    let text = "// FX:BEGIN id=ghost\nconst z = 0;\n// FX:END id=ghost";
    let result = kernel.apply_view_patches(text, &ApplyOptions::default());
    assert!(result.is_err());
}
