//! # Transaction Replay Tests
//!
//! Atomic commit, abort discard and the maximum-size transaction, driven
//! both from in-memory events and from records round-tripped through a
//! real WAL file.

use l1ne_sim::{SimError, Simulator};
use l1ne_wal::{WalEntry, WalReader, WalWriter};

fn load(sim: &mut Simulator, entries: &[WalEntry]) {
    for entry in entries {
        sim.load_entry(entry).unwrap();
    }
}

#[test]
fn committed_transaction_applies_atomically() {
    let mut sim = Simulator::new();
    load(
        &mut sim,
        &[
            WalEntry::tx_begin(1_001_000, 1, 3),
            WalEntry::service_start(1_002_000, 1, 8080),
            WalEntry::service_start(1_002_100, 2, 8081),
            WalEntry::service_start(1_002_200, 3, 8082),
            WalEntry::tx_commit(1_003_000, 1, 3),
        ],
    );

    // Nothing is visible while the transaction is open.
    sim.replay_next().unwrap();
    sim.replay_next().unwrap();
    sim.replay_next().unwrap();
    assert_eq!(sim.state().services_started(), 0);
    assert!(sim.in_transaction());
    assert_eq!(sim.pending_count(), 2);

    sim.replay_next().unwrap();
    sim.replay_next().unwrap();
    assert_eq!(sim.state().services_started(), 3);
    assert!(!sim.in_transaction());
    assert_eq!(sim.pending_count(), 0);
}

#[test]
fn aborted_transaction_leaves_state_untouched() {
    let mut sim = Simulator::new();
    let before = *sim.state();
    load(
        &mut sim,
        &[
            WalEntry::tx_begin(1_001_000, 1, 3),
            WalEntry::service_start(1_002_000, 1, 8080),
            WalEntry::service_start(1_002_100, 2, 8081),
            WalEntry::service_start(1_002_200, 3, 8082),
            WalEntry::tx_abort(1_003_000, 1, 1),
        ],
    );

    assert_eq!(sim.replay_all().unwrap(), 5);
    assert_eq!(sim.state().services_started(), 0);
    assert!(!sim.in_transaction());
    assert_eq!(*sim.state(), before);
}

#[test]
fn maximum_size_transaction_commits() {
    let mut sim = Simulator::new();
    sim.load_entry(&WalEntry::tx_begin(1_000_000, 6, 64)).unwrap();
    for i in 0..64u64 {
        sim.load_entry(&WalEntry::service_start(
            1_000_500 + i * 500,
            (i + 1) as u32,
            (8000 + i) as u16,
        ))
        .unwrap();
    }
    sim.load_entry(&WalEntry::tx_commit(1_040_000, 6, 64)).unwrap();

    assert_eq!(sim.replay_all().unwrap(), 66);
    assert_eq!(sim.state().services_started(), 64);
    assert!(!sim.in_transaction());
}

#[test]
fn transactions_replay_identically_from_a_real_log() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tx.wal");
    let mut writer = WalWriter::create(&path).unwrap();
    for entry in [
        WalEntry::tx_begin(1_001_000, 1, 2),
        WalEntry::service_start(1_002_000, 1, 8080),
        WalEntry::proxy_accept(1_002_100, 7, 1, 50_001),
        WalEntry::tx_commit(1_003_000, 1, 2),
        WalEntry::proxy_close(1_004_000, 7, 2048, 128),
    ] {
        writer.write_entry(&entry).unwrap();
    }

    let mut sim = Simulator::new();
    let mut reader = WalReader::open(&path).unwrap();
    assert_eq!(sim.load_wal(&mut reader).unwrap(), 5);
    assert_eq!(sim.replay_all().unwrap(), 5);

    assert_eq!(sim.state().services_started(), 1);
    assert_eq!(sim.state().connections_opened(), 1);
    assert_eq!(sim.state().connections_closed(), 1);
    assert_eq!(sim.state().bytes_sent_total(), 2048);
    assert_eq!(sim.state().bytes_received_total(), 128);
}

#[test]
fn uncommitted_tail_has_no_counter_effect() {
    // A log ending inside a transaction replays cleanly: the buffered
    // events are discarded rather than applied.
    let mut sim = Simulator::new();
    load(
        &mut sim,
        &[
            WalEntry::service_start(1_000_000, 1, 8080),
            WalEntry::tx_begin(1_001_000, 2, 3),
            WalEntry::service_start(1_002_000, 2, 8081),
        ],
    );
    assert_eq!(sim.replay_all().unwrap(), 3);
    assert_eq!(sim.state().services_started(), 1);
    assert!(sim.in_transaction());
    assert_eq!(sim.pending_count(), 1);

    // Reset recovers the simulator for the next run.
    sim.reset();
    assert!(!sim.in_transaction());
    assert_eq!(sim.pending_count(), 0);
}

#[test]
fn replay_is_pure_across_resets() {
    let mut sim = Simulator::new();
    load(
        &mut sim,
        &[
            WalEntry::tx_begin(1_001_000, 1, 2),
            WalEntry::service_start(1_002_000, 1, 8080),
            WalEntry::service_start(1_002_100, 2, 8081),
            WalEntry::tx_commit(1_003_000, 1, 2),
            WalEntry::service_stop(1_004_000, 1, 0),
        ],
    );

    sim.replay_all().unwrap();
    let first_state = *sim.state();
    let first_registry = sim.registry().clone();

    for _ in 0..3 {
        sim.reset();
        sim.replay_all().unwrap();
        assert_eq!(*sim.state(), first_state);
        assert_eq!(*sim.registry(), first_registry);
    }
}

#[test]
fn oversized_declaration_fails_before_buffering() {
    let mut sim = Simulator::new();
    sim.load_entry(&WalEntry::tx_begin(1_000_000, 9, 65)).unwrap();
    assert!(matches!(
        sim.replay_next(),
        Err(SimError::TransactionTooLarge {
            tx_id: 9,
            event_count: 65,
            ..
        })
    ));
}
