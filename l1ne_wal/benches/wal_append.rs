//! Append-path throughput: entry construction, CRC, write + fsync.

use criterion::{Criterion, criterion_group, criterion_main};
use l1ne_wal::{WalEntry, WalWriter};
use std::hint::black_box;

fn bench_entry_construction(c: &mut Criterion) {
    c.bench_function("entry_construct_and_verify", |b| {
        let mut timestamp = 1u64;
        b.iter(|| {
            timestamp += 1;
            let entry = WalEntry::proxy_close(timestamp, 42, 1024, 512);
            black_box(entry.verify_crc32())
        });
    });
}

fn bench_append_fsync(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bench.wal");
    let mut writer = WalWriter::create(&path).unwrap();
    let mut timestamp = 1u64;

    c.bench_function("append_with_durability_barrier", |b| {
        b.iter(|| {
            timestamp += 1;
            let entry = WalEntry::checkpoint(timestamp);
            writer.write_entry(black_box(&entry)).unwrap();
        });
    });
}

criterion_group!(benches, bench_entry_construction, bench_append_fsync);
criterion_main!(benches);
