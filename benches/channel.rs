// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Channel throughput benchmarks.
//
// Run with:
//   cargo bench --bench channel
//
// Groups:
//   uncontended — send + recv on one thread, buffered channel
//   pipeline    — producer thread vs consumer thread over a small ring
//
// Each group exercises the same workload at three payload sizes.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use libchan::Channel;

const SIZES: &[(&str, usize)] = &[("small_16", 16), ("medium_128", 128), ("large_1024", 1024)];

fn payload(size: usize) -> String {
    "x".repeat(size)
}

fn bench_uncontended(c: &mut Criterion) {
    let mut group = c.benchmark_group("uncontended");

    for &(label, size) in SIZES {
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(label), &size, |b, &sz| {
            let ch: Channel<String> = Channel::bounded(8, (sz * 4) as u32).expect("create");
            let msg = payload(sz);
            b.iter(|| {
                ch.send(&msg).expect("send");
                black_box(ch.recv().expect("recv"))
            });
        });
    }

    group.finish();
}

fn bench_pipeline(c: &mut Criterion) {
    let mut group = c.benchmark_group("pipeline");
    group.sample_size(20);

    const BATCH: usize = 1_000;

    for &(label, size) in SIZES {
        group.throughput(Throughput::Bytes((size * BATCH) as u64));
        group.bench_with_input(BenchmarkId::from_parameter(label), &size, |b, &sz| {
            let msg = payload(sz);
            b.iter(|| {
                let ch: Channel<String> = Channel::bounded(8, (sz * 4) as u32).expect("create");
                let producer = {
                    let ch = ch.clone();
                    let msg = msg.clone();
                    std::thread::spawn(move || {
                        for _ in 0..BATCH {
                            ch.send(&msg).expect("send");
                        }
                        ch.close();
                    })
                };
                let mut n = 0usize;
                for v in ch.iter() {
                    black_box(v.expect("recv"));
                    n += 1;
                }
                producer.join().unwrap();
                assert_eq!(n, BATCH);
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_uncontended, bench_pipeline);
criterion_main!(benches);
