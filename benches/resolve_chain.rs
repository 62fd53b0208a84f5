use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};

use modwire::module::{ModuleDescriptor, ModuleId, Resolver};

/// m0 <- m1 <- ... <- m(n-1), each importing the previous one's package
fn chain(length: usize) -> (Resolver, ModuleId) {
    let resolver = Resolver::new();
    let mut last = None;
    for i in 0..length {
        let mut descriptor =
            ModuleDescriptor::new(&format!("m{}", i), "1.0").export(&format!("p{}", i), "1.0");
        if i > 0 {
            descriptor = descriptor.import(&format!("p{}", i - 1), "1.0");
        }
        last = Some(resolver.install(&descriptor).unwrap());
    }
    (resolver, last.unwrap())
}

/// One importer over `providers` competing exporters of every package
fn fan_in(providers: usize, packages: usize) -> (Resolver, ModuleId) {
    let resolver = Resolver::new();
    for i in 0..providers {
        let mut descriptor = ModuleDescriptor::new(&format!("e{}", i), &format!("{}.0", i + 1));
        for p in 0..packages {
            descriptor = descriptor.export(&format!("pkg{}", p), &format!("{}.0", i + 1));
        }
        resolver.install(&descriptor).unwrap();
    }
    let mut importer = ModuleDescriptor::new("importer", "1.0");
    for p in 0..packages {
        importer = importer.import(&format!("pkg{}", p), "1.0");
    }
    let id = resolver.install(&importer).unwrap();
    (resolver, id)
}

fn bench_resolve(c: &mut Criterion) {
    let mut group = c.benchmark_group("resolve");

    for length in [8usize, 32] {
        group.bench_function(format!("chain_{}", length), |b| {
            b.iter_batched(
                || chain(length),
                |(resolver, top)| black_box(resolver.resolve(top).unwrap()),
                BatchSize::SmallInput,
            )
        });
    }

    group.bench_function("fan_in_16x16", |b| {
        b.iter_batched(
            || fan_in(16, 16),
            |(resolver, top)| black_box(resolver.resolve(top).unwrap()),
            BatchSize::SmallInput,
        )
    });

    group.finish();
}

criterion_group!(benches, bench_resolve);
criterion_main!(benches);
