//! Benchmarks for placeholder resolution and resource pairing

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use std::hint::black_box;

use reconflow::catalog::Catalog;
use reconflow::options::{OptionSet, OptionSetBuilder};
use reconflow::resolve::resolve;
use reconflow::resources::pair_lists;
use reconflow::workflow::get_routine;

fn options_with(extra_keys: usize) -> OptionSet {
    let extra: OptionSet = (0..extra_keys)
        .map(|i| (format!("EXTRA_{}", i), format!("value_{}", i)))
        .collect();
    OptionSetBuilder::new("https://example.com", std::path::Path::new("/srv/workspaces"))
        .data_path(std::path::Path::new("/srv/data"))
        .extra(extra)
        .build()
}

fn bench_resolve(c: &mut Criterion) {
    let template = "nmap -sV -p- $IP -oA $WORKSPACE/portscan/$OUTPUT-$CURRENT_SPEED \
                    --script-args=target=$STRIP_TARGET $UNKNOWN_TOKEN";
    let mut group = c.benchmark_group("resolve");
    for keys in [0, 50, 500] {
        let options = options_with(keys).for_stage("portscan", "quick");
        group.bench_with_input(BenchmarkId::new("option_keys", keys), &options, |b, options| {
            b.iter(|| resolve(black_box(template), options))
        });
    }
    group.finish();
}

fn bench_pairing(c: &mut Criterion) {
    let mut group = c.benchmark_group("pair_lists");
    for size in [100, 10_000] {
        let first: Vec<String> = (0..size).map(|i| format!("host{}.example.com", i)).collect();
        let second: Vec<String> = (0..7).map(|i| format!("/lists/words{}.txt", i)).collect();
        group.bench_with_input(BenchmarkId::new("cycled", size), &size, |b, _| {
            b.iter(|| pair_lists(black_box(&first), Some(&second)))
        });
    }
    group.finish();
}

fn bench_routine(c: &mut Criterion) {
    let catalog = Catalog::builtin().expect("built-in catalog");
    let options = options_with(10);
    c.bench_function("builtin_routine_general", |b| {
        b.iter(|| get_routine(black_box(&catalog), &options, "general"))
    });
}

criterion_group!(benches, bench_resolve, bench_pairing, bench_routine);
criterion_main!(benches);
