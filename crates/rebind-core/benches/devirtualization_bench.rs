use criterion::{black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use rebind_core::optimizer::DevirtualizationPass;
use rebind_core::{
    DevirtualizationOptions, DispatchKind, Nullability, OptimizerConfig, ResolutionOracle,
    TypeElement,
};
use rebind_test_helpers::fixtures;
use std::sync::Arc;

fn devirtualization_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("devirtualization");

    // Call sites along a chain of blocks, a third of them guarded by a handler
    for call_sites in [16, 64, 256].iter() {
        let program = fixtures::long_call_chain(8, *call_sites);

        group.bench_with_input(
            BenchmarkId::new("call_chain", call_sites),
            &program,
            |b, program| {
                b.iter_batched(
                    || {
                        let oracle = Arc::new(ResolutionOracle::new(program.hierarchy.clone()));
                        let pass = DevirtualizationPass::new(oracle, DevirtualizationOptions::default());
                        (pass, program.entry_body().clone())
                    },
                    |(pass, mut code)| black_box(pass.devirtualize(&mut code).map(|r| r.changed)),
                    BatchSize::SmallInput,
                );
            },
        );
    }

    group.finish();
}

fn resolution_cache_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("resolution");

    for implementors in [4, 32, 128].iter() {
        let program = fixtures::long_call_chain(*implementors, 1);
        let oracle = ResolutionOracle::new(program.hierarchy.clone());
        let declared = program.method("I", "foo");
        let main = program.class("Main");
        let receivers: Vec<TypeElement> = (0..*implementors)
            .map(|i| TypeElement::exact_class(program.class(&format!("Impl{i}")), Nullability::DefinitelyNotNull))
            .collect();

        group.bench_with_input(
            BenchmarkId::new("interface_exact", implementors),
            &receivers,
            |b, receivers| {
                b.iter(|| {
                    for receiver in receivers {
                        black_box(oracle.resolve(DispatchKind::Interface, &declared, receiver, main));
                    }
                });
            },
        );
    }

    group.finish();
}

fn whole_phase_benchmark(c: &mut Criterion) {
    let program = fixtures::long_call_chain(8, 128);

    c.bench_function("optimize_phase", |b| {
        b.iter_batched(
            || program.clone(),
            |mut program| black_box(program.optimize(OptimizerConfig::default()).is_ok()),
            BatchSize::SmallInput,
        );
    });
}

criterion_group!(
    benches,
    devirtualization_benchmark,
    resolution_cache_benchmark,
    whole_phase_benchmark
);
criterion_main!(benches);
