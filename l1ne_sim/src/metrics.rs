//! Replay counters and a bounded latency reservoir.

use l1ne_common::bounded::BoundedArray;
use l1ne_common::consts::LATENCY_SAMPLES_MAX;
use l1ne_wal::Payload;
use serde::Serialize;

/// Summary over the recorded latency samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct LatencyStats {
    pub min_us: u64,
    pub max_us: u64,
    pub avg_us: u64,
}

/// Pure counters plus at most 1024 latency samples; additional samples
/// are silently dropped.
#[derive(Debug, Clone, Default)]
pub struct SimMetrics {
    events_total: u64,
    tx_commits: u64,
    tx_aborts: u64,
    faults_recorded: u64,
    services_started: u64,
    services_stopped: u64,
    latencies: Box<BoundedArray<u64, LATENCY_SAMPLES_MAX>>,
}

impl SimMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one replayed event by kind.
    pub fn record_event(&mut self, payload: &Payload) {
        self.events_total += 1;
        match payload {
            Payload::TxCommit { .. } => self.tx_commits += 1,
            Payload::TxAbort { .. } => self.tx_aborts += 1,
            Payload::ServiceStart { .. } => self.services_started += 1,
            Payload::ServiceStop { .. } => self.services_stopped += 1,
            _ => {}
        }
    }

    pub fn record_fault(&mut self) {
        self.faults_recorded += 1;
    }

    /// Add a latency sample; past capacity the sample is dropped.
    pub fn record_latency_us(&mut self, latency_us: u64) {
        let _ = self.latencies.push(latency_us);
    }

    /// Min/max/average over the reservoir; zeros when empty.
    pub fn latency_stats(&self) -> LatencyStats {
        if self.latencies.is_empty() {
            return LatencyStats::default();
        }
        let mut min_us = u64::MAX;
        let mut max_us = 0u64;
        let mut sum = 0u64;
        for &sample in self.latencies.as_slice() {
            min_us = min_us.min(sample);
            max_us = max_us.max(sample);
            sum += sample;
        }
        LatencyStats {
            min_us,
            max_us,
            avg_us: sum / self.latencies.len() as u64,
        }
    }

    pub fn events_total(&self) -> u64 {
        self.events_total
    }

    pub fn tx_commits(&self) -> u64 {
        self.tx_commits
    }

    pub fn tx_aborts(&self) -> u64 {
        self.tx_aborts
    }

    pub fn faults_recorded(&self) -> u64 {
        self.faults_recorded
    }

    pub fn services_started(&self) -> u64 {
        self.services_started
    }

    pub fn services_stopped(&self) -> u64 {
        self.services_stopped
    }

    pub fn latency_samples(&self) -> usize {
        self.latencies.len()
    }
}
