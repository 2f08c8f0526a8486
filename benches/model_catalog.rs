//! Benchmarks for the model-name bitmask lookups the scheduler hits on
//! every dispatch (`pollux::model_catalog::{mask, model_names_from_mask}`).

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use pollux::model_catalog::{ModelRegistry, format_model_mask, model_names_from_mask};

fn sample_registry() -> ModelRegistry {
    let names: Vec<String> = [
        "gemini-2.5-pro",
        "gemini-2.5-flash",
        "gemini-2.0-flash",
        "claude-sonnet-4-5",
        "claude-opus-4-1",
        "gpt-5",
        "gpt-5-mini",
        "o3",
        "o4-mini",
        "gemini-2.5-flash-lite",
    ]
    .into_iter()
    .map(str::to_string)
    .collect();
    ModelRegistry::new(&names)
}

fn bench_mask_lookup(c: &mut Criterion) {
    let registry = sample_registry();
    c.bench_function("model_registry_get_index_hit", |b| {
        b.iter(|| registry.get_index(black_box("claude-sonnet-4-5")));
    });
    c.bench_function("model_registry_get_index_miss", |b| {
        b.iter(|| registry.get_index(black_box("unknown-model")));
    });
}

fn bench_mask_to_names(c: &mut Criterion) {
    // Exercises the process-wide registry (config-driven), not the sample
    // one above -- these two functions only ever read `MODEL_REGISTRY`.
    let sparse_mask: u64 = 0b0101_0101;
    c.bench_function("model_names_from_mask_sparse", |b| {
        b.iter(|| model_names_from_mask(black_box(sparse_mask)));
    });
    c.bench_function("format_model_mask_sparse", |b| {
        b.iter(|| format_model_mask(black_box(sparse_mask)));
    });
}

criterion_group!(benches, bench_mask_lookup, bench_mask_to_names);
criterion_main!(benches);
