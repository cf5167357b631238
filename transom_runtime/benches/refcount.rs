//! Reference Counting and Field Access Benchmarks
//!
//! Measures the hot paths an extension call crosses: retain/release pairs,
//! field reads and writes through the capability surface, and schema-driven
//! argument binding.

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use std::sync::OnceLock;
use transom_runtime::{
    register_type, ArgSchema, CallArgs, FieldAccess, ObjRef, TypeHandle, TypeSpec, Value,
    ValueKind,
};

// =============================================================================
// Benchmark Helpers
// =============================================================================

fn bench_type() -> &'static TypeHandle {
    static TY: OnceLock<TypeHandle> = OnceLock::new();
    TY.get_or_init(|| {
        register_type(
            TypeSpec::new("BenchRecord")
                .field("count", ValueKind::Int, FieldAccess::ReadWrite)
                .field("label", ValueKind::Str, FieldAccess::ReadWrite),
        )
        .unwrap()
    })
}

fn bench_obj() -> ObjRef {
    let ty = bench_type();
    let obj = ty.instantiate(&CallArgs::empty()).unwrap();
    ty.set_field(&obj, "count", Value::Int(0)).unwrap();
    ty.set_field(&obj, "label", Value::str("bench")).unwrap();
    obj
}

// =============================================================================
// Benchmarks
// =============================================================================

fn bench_retain_release(c: &mut Criterion) {
    let obj = bench_obj();
    c.bench_function("refcount/retain_release", |b| {
        b.iter(|| {
            let alias = black_box(&obj).clone();
            black_box(&alias);
        });
    });
}

fn bench_borrow(c: &mut Criterion) {
    let obj = bench_obj();
    c.bench_function("refcount/borrow", |b| {
        b.iter(|| black_box(black_box(&obj).borrow()));
    });
}

fn bench_field_read(c: &mut Criterion) {
    let ty = bench_type();
    let obj = bench_obj();
    c.bench_function("fields/get_int", |b| {
        b.iter(|| ty.get_field(black_box(&obj), "count").unwrap());
    });
}

fn bench_field_write(c: &mut Criterion) {
    let ty = bench_type();
    let obj = bench_obj();
    c.bench_function("fields/set_int", |b| {
        b.iter(|| ty.set_field(black_box(&obj), "count", Value::Int(7)).unwrap());
    });
}

fn bench_schema_bind(c: &mut Criterion) {
    let schema = ArgSchema::build("bench")
        .required("x", ValueKind::Int)
        .required("y", ValueKind::Int)
        .optional("label", ValueKind::Str)
        .finish()
        .unwrap();
    let positional = [Value::Int(3), Value::Int(4)];
    let args = CallArgs::positional(&positional);

    c.bench_function("marshal/bind_positional", |b| {
        b.iter(|| schema.bind(black_box(&args)).unwrap());
    });
}

criterion_group!(
    benches,
    bench_retain_release,
    bench_borrow,
    bench_field_read,
    bench_field_write,
    bench_schema_bind
);
criterion_main!(benches);
