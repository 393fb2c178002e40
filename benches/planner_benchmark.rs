//! Performance benchmarks for the planners and the HPL output parser
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use hpcbench::hpl::{parse_summaries, rank};
use hpcbench::system::{affinity_map, matrix_dimension, process_grid};
use hpcbench::tuner::SweepSpace;

/// HPL output with `count` result blocks
fn hpl_output(count: usize) -> String {
    (0..count)
        .map(|i| {
            format!(
                "WR{}{}C2R{}  100000  256  4  8  {:.2}  {:.4e}\n\
                 ||Ax-b||_oo/(eps*(||A||_oo*||x||_oo+||b||_oo)*N)=  3.1e-03 ...... {}\n",
                i % 3,
                i % 6,
                i % 8 + 1,
                120.0 + i as f64,
                4.0e3 + (i * 37 % 101) as f64,
                if i % 5 == 0 { "FAILED" } else { "PASSED" }
            )
        })
        .collect()
}

fn bench_process_grid(c: &mut Criterion) {
    let mut group = c.benchmark_group("process_grid");

    for ranks in [64usize, 4096, 65_521, 1 << 20].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(ranks), ranks, |b, &ranks| {
            b.iter(|| process_grid(black_box(ranks)))
        });
    }

    group.finish();
}

fn bench_sizing(c: &mut Criterion) {
    c.bench_function("matrix_dimension_512_gpus", |b| {
        let total = 80.0 * 1024f64.powi(3) * 8.0 * 64.0;
        b.iter(|| matrix_dimension(black_box(total), 0.9, 8, 10_000))
    });

    c.bench_function("affinity_map_8_sockets", |b| {
        let sockets = [2usize, 2, 0, 2, 2, 0, 2, 2];
        b.iter(|| affinity_map(black_box(12), &sockets))
    });
}

fn bench_batch_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("batch_parse");
    let points = SweepSpace::hpl_default().len();

    for count in [points, points * 10].iter() {
        let output = hpl_output(*count);
        group.throughput(Throughput::Bytes(output.len() as u64));
        group.bench_with_input(BenchmarkId::new("rank", count), &output, |b, output| {
            b.iter(|| rank(parse_summaries(black_box(output))))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_process_grid, bench_sizing, bench_batch_parse);
criterion_main!(benches);
