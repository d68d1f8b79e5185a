//! Performance benchmarks for diffsync-engine

use diffsync_engine::{
    diff, Collection, CollectionSchema, FieldDef, FieldType, InMemoryRepository,
    InMemoryShadowStore, Operation, Patch, PatchContext, Pointer, Reconciler,
};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use serde_json::json;

fn create_test_schema() -> CollectionSchema {
    CollectionSchema::new(
        "todos",
        vec![
            FieldDef::optional("description", FieldType::String),
            FieldDef::required("complete", FieldType::Bool),
        ],
    )
}

fn create_collection(size: usize) -> Collection {
    let records: Vec<_> = (0..size)
        .map(|i| json!({"id": i + 1, "description": format!("Todo {}", i), "complete": false}))
        .collect();
    serde_json::from_value(json!(records)).expect("valid collection")
}

/// Flip `complete` on every other record.
fn create_status_patch(size: usize) -> Patch {
    (0..size)
        .step_by(2)
        .flat_map(|i| {
            let path = format!("/{}/complete", i);
            vec![
                Operation::test(&path, json!(false)).expect("valid pointer"),
                Operation::replace(&path, json!(true)).expect("valid pointer"),
            ]
        })
        .collect()
}

fn bench_pointer(c: &mut Criterion) {
    let mut group = c.benchmark_group("pointer");
    let schema = create_test_schema();
    let collection = create_collection(100);

    group.bench_function("parse", |b| {
        b.iter(|| Pointer::parse(black_box("/42/description")))
    });

    group.bench_function("resolve", |b| {
        let pointer = Pointer::parse("/42/description").expect("valid pointer");
        b.iter(|| pointer.resolve(black_box(&collection), &schema))
    });

    group.finish();
}

fn bench_apply(c: &mut Criterion) {
    let mut group = c.benchmark_group("apply");
    let schema = create_test_schema();

    for size in [10, 100, 1000].iter() {
        group.bench_with_input(BenchmarkId::new("status_patch", size), size, |b, &size| {
            let collection = create_collection(size);
            let patch = create_status_patch(size);
            let ctx = PatchContext::new(&schema);
            b.iter(|| {
                let mut working = collection.clone();
                patch.apply(black_box(&mut working), &ctx)
            })
        });
    }

    group.bench_function("move_records", |b| {
        let collection = create_collection(100);
        let patch = Patch::from(vec![
            Operation::move_from("/99", "/0").expect("valid pointers"),
            Operation::move_from("/0", "/50").expect("valid pointers"),
        ]);
        let ctx = PatchContext::new(&schema);
        b.iter(|| {
            let mut working = collection.clone();
            patch.apply(black_box(&mut working), &ctx)
        })
    });

    group.finish();
}

fn bench_reconciliation(c: &mut Criterion) {
    let mut group = c.benchmark_group("reconciliation");

    for size in [10, 100, 500].iter() {
        group.bench_with_input(BenchmarkId::new("round", size), size, |b, &size| {
            let patch = create_status_patch(size);
            b.iter(|| {
                let repo = InMemoryRepository::with_records(create_collection(size).into_records());
                let reconciler = Reconciler::new(create_test_schema(), InMemoryShadowStore::new());
                reconciler.reconcile(
                    "todos",
                    black_box(&patch),
                    || Ok(repo.find_all()),
                    &repo,
                )
            })
        });
    }

    group.finish();
}

fn bench_diff(c: &mut Criterion) {
    let mut group = c.benchmark_group("diff");
    let schema = create_test_schema();

    for size in [10, 100, 1000].iter() {
        group.bench_with_input(BenchmarkId::new("half_changed", size), size, |b, &size| {
            let shadow = create_collection(size);
            let mut current = shadow.clone();
            create_status_patch(size)
                .apply(&mut current, &PatchContext::new(&schema))
                .expect("patch applies");
            b.iter(|| diff(black_box(&shadow), black_box(&current), &schema))
        });
    }

    group.finish();
}

fn bench_serialization(c: &mut Criterion) {
    let mut group = c.benchmark_group("serialization");

    group.bench_function("patch_to_json", |b| {
        let patch = create_status_patch(100);
        b.iter(|| black_box(&patch).to_json())
    });

    group.bench_function("patch_from_json", |b| {
        let json = r#"[{"op":"test","path":"/1/complete","value":false},{"op":"replace","path":"/1/complete","value":true},{"op":"add","path":"/-","value":{"description":"D","complete":false}}]"#;

        b.iter(|| Patch::from_json(black_box(json)))
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_pointer,
    bench_apply,
    bench_reconciliation,
    bench_diff,
    bench_serialization,
);
criterion_main!(benches);
