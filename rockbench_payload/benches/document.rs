//! Benchmarks for document and patch generation.

use std::{sync::Arc, time::Duration};

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use rand::{SeedableRng, rngs::SmallRng};
use rockbench_payload::{
    Generator, IdMode, IdSpace, PatchStyle, PatchTemplates, Spec, generate_patches,
};

fn document_batch(c: &mut Criterion) {
    let mut group = c.benchmark_group("document_batch");
    for batch_size in &[1usize, 10, 100, 1_000] {
        group.throughput(Throughput::Elements(*batch_size as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(batch_size),
            batch_size,
            |b, &batch_size| {
                let mut spec = Spec::new("benchmark", batch_size);
                spec.id_mode = IdMode::Sequential;
                let generator = Generator::new(spec, Arc::new(IdSpace::new()));
                let mut rng = SmallRng::seed_from_u64(19690716);
                b.iter(|| {
                    generator
                        .generate_batch(&mut rng, batch_size)
                        .expect("failed to generate batch")
                });
            },
        );
    }
    group.finish();
}

fn patch_batch(c: &mut Criterion) {
    let mut group = c.benchmark_group("patch_batch");
    for batch_size in &[10usize, 100, 1_000] {
        group.throughput(Throughput::Elements(*batch_size as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(batch_size),
            batch_size,
            |b, &batch_size| {
                let id_space = IdSpace::new();
                id_space.set_bound(1_000_000);
                let mut templates =
                    PatchTemplates::new(PatchStyle::Replace, SmallRng::seed_from_u64(19690716));
                let mut rng = SmallRng::seed_from_u64(19690716);
                b.iter(|| {
                    generate_patches(&id_space, &mut templates, &mut rng, batch_size)
                        .expect("failed to generate patches")
                });
            },
        );
    }
    group.finish();
}

criterion_group!(
    name = benches;
    config = Criterion::default().measurement_time(Duration::from_secs(30));
    targets = document_batch, patch_batch,
);
criterion_main!(benches);
