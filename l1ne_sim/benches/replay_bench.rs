//! Replay-loop and PRNG throughput.

use criterion::{Criterion, criterion_group, criterion_main};
use l1ne_sim::{Event, Pcg32, Simulator};
use l1ne_wal::Payload;
use std::hint::black_box;

fn full_event_buffer() -> Simulator {
    let mut sim = Simulator::new();
    for i in 0..1024u64 {
        let payload = if i % 2 == 0 {
            Payload::ProxyAccept {
                connection_id: i / 2,
                service_id: 1,
                client_port: 50_000,
            }
        } else {
            Payload::ProxyClose {
                connection_id: i / 2,
                bytes_sent: 1024,
                bytes_received: 512,
            }
        };
        sim.push_event(Event::new(1_000 + i, payload)).unwrap();
    }
    sim
}

fn bench_replay(c: &mut Criterion) {
    let mut sim = full_event_buffer();
    c.bench_function("replay_1024_events", |b| {
        b.iter(|| {
            sim.reset();
            black_box(sim.replay_all().unwrap())
        });
    });
}

fn bench_prng(c: &mut Criterion) {
    let mut rng = Pcg32::new(42);
    c.bench_function("pcg32_next_u32", |b| b.iter(|| black_box(rng.next_u32())));
    c.bench_function("pcg32_fill_4k", |b| {
        let mut buffer = [0u8; 4096];
        b.iter(|| {
            rng.fill_bytes(&mut buffer);
            black_box(buffer[0])
        });
    });
}

criterion_group!(benches, bench_replay, bench_prng);
criterion_main!(benches);
