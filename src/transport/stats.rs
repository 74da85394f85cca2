use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct TransportStats {
    admitted: AtomicU64,
    rate_limited: AtomicU64,
    delivered: AtomicU64,
    beacon_deliveries: AtomicU64,
    retries: AtomicU64,
    exhausted: AtomicU64,
    queued: AtomicU64,
    discarded: AtomicU64,
    flushed: AtomicU64,
}

/// Point-in-time counters for one transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct TransportStatsSnapshot {
    pub admitted: u64,
    pub rate_limited: u64,
    pub delivered: u64,
    pub beacon_deliveries: u64,
    pub retries: u64,
    pub exhausted: u64,
    pub queued: u64,
    pub discarded: u64,
    /// Queued events later delivered by a flush.
    pub flushed: u64,
    pub pending: usize,
}

impl TransportStats {
    pub fn record_admitted(&self) {
        self.admitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rate_limited(&self) {
        self.rate_limited.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_delivered(&self, via_beacon: bool) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
        if via_beacon {
            self.beacon_deliveries.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_retry(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_exhausted(&self) {
        self.exhausted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_queued(&self) {
        self.queued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_discarded(&self) {
        self.discarded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_flushed(&self, count: usize) {
        self.flushed.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self, pending: usize) -> TransportStatsSnapshot {
        TransportStatsSnapshot {
            admitted: self.admitted.load(Ordering::Relaxed),
            rate_limited: self.rate_limited.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            beacon_deliveries: self.beacon_deliveries.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            exhausted: self.exhausted.load(Ordering::Relaxed),
            queued: self.queued.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
            flushed: self.flushed.load(Ordering::Relaxed),
            pending,
        }
    }
}
