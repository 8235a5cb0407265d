//! Push/pop latency benchmarks

use cbuff_shared_memory::{BufferOptions, SharedCircularBuffer, ShmDir};
use criterion::{Criterion, criterion_group, criterion_main};
use std::hint::black_box;
use tempfile::TempDir;

fn create(dir: &TempDir, name: &str, capacity: usize) -> SharedCircularBuffer<ShmDir> {
    BufferOptions::new()
        .shm_dir(dir.path())
        .create(name, capacity)
        .unwrap()
}

/// Single item through one handle
fn bench_push_pop(c: &mut Criterion) {
    let dir = TempDir::new().unwrap();
    let mut buffer = create(&dir, "bench_push_pop", 256);

    c.bench_function("push_popitem", |b| {
        b.iter(|| {
            buffer.push(black_box(0xAA)).unwrap();
            black_box(buffer.popitem().unwrap());
        });
    });
}

/// Writer fills, separate reader handle drains in one call
fn bench_fill_drain(c: &mut Criterion) {
    let dir = TempDir::new().unwrap();
    let mut writer = create(&dir, "bench_fill_drain", 256);
    let mut reader = BufferOptions::new()
        .shm_dir(dir.path())
        .attach("bench_fill_drain")
        .unwrap();

    for batch in [16usize, 256] {
        c.bench_function(&format!("fill_popmany_{batch}"), |b| {
            b.iter(|| {
                for i in 0..batch {
                    writer.push(i as u8).unwrap();
                }
                black_box(reader.popmany(batch).unwrap());
            });
        });
    }
}

/// Lock round trip without touching slots
fn bench_len(c: &mut Criterion) {
    let dir = TempDir::new().unwrap();
    let buffer = create(&dir, "bench_len", 8);

    c.bench_function("len", |b| {
        b.iter(|| black_box(buffer.len().unwrap()));
    });
}

criterion_group!(benches, bench_push_pop, bench_fill_drain, bench_len);
criterion_main!(benches);
