use std::time::Instant;

use criterion::{criterion_group, criterion_main, Criterion, Throughput};

use confedit::{ConfigEditor, ConfigTree, EditorConfig, MetadataTree, SettingId};

const CHAIN_LEN: usize = 200;

/// A chain `env=O0 -> env=O1 -> ...` plus a duplicate family with one trigger
/// per instance, so reconciliation walks a realistic graph.
fn make_editor() -> ConfigEditor {
    let mut schema = MetadataTree::new()
        .with("namelist:job", "duplicate", "true")
        .with("namelist:job=enabled", "trigger", "namelist:job=steps: this > 0")
        .declare("namelist:job=steps");
    let mut tree = ConfigTree::new();
    for i in 0..CHAIN_LEN {
        let id = format!("env=O{i}");
        schema = schema.with(&id, "trigger", &format!("env=O{}: 1", i + 1));
        tree = tree.with(&id, "1");
    }
    schema = schema.declare(&format!("env=O{CHAIN_LEN}"));
    for i in 1..=64 {
        tree = tree
            .with(&format!("namelist:job({i})=enabled"), &(i % 3).to_string())
            .with(&format!("namelist:job({i})=steps"), "4");
    }
    ConfigEditor::load(tree, schema, EditorConfig::default()).unwrap()
}

fn bench_reconcile_full(c: &mut Criterion) {
    let mut group = c.benchmark_group("reconcile");
    group.throughput(Throughput::Elements(CHAIN_LEN as u64));

    group.bench_function("full_pass", |b| {
        b.iter_custom(|iters| {
            let mut editor = make_editor();
            let start = Instant::now();
            for _ in 0..iters {
                let _ = editor.reconcile();
            }
            start.elapsed()
        });
    });
    group.finish();
}

fn bench_set_value_and_undo(c: &mut Criterion) {
    c.bench_function("command/set_value_undo", |b| {
        // Setup excluded from timing; each iteration flips the chain head.
        b.iter_custom(|iters| {
            let mut editor = make_editor();
            let head = SettingId::option("env", "O0");
            let start = Instant::now();
            for _ in 0..iters {
                editor.set_value(&head, "0").unwrap();
                editor.undo().unwrap();
            }
            start.elapsed()
        });
    });
}

criterion_group!(reconcile, bench_reconcile_full, bench_set_value_and_undo);
criterion_main!(reconcile);
