//! Process-wide atomic counters.
//!
//! Incremented at the call site; [`Metrics::flush`] emits them as one
//! `info!` event at the end of a run.

use std::sync::atomic::{AtomicU64, Ordering};

pub static METRICS: Metrics = Metrics::new();

pub struct Metrics {
    agents_probed: AtomicU64,
    attestations_issued: AtomicU64,
    attestation_failures: AtomicU64,
    uploads_failed: AtomicU64,
    chunks_failed: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            agents_probed: AtomicU64::new(0),
            attestations_issued: AtomicU64::new(0),
            attestation_failures: AtomicU64::new(0),
            uploads_failed: AtomicU64::new(0),
            chunks_failed: AtomicU64::new(0),
        }
    }

    pub fn inc_agents_probed(&self) {
        self.agents_probed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_attestations_issued(&self) {
        self.attestations_issued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_attestation_failures(&self) {
        self.attestation_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_uploads_failed(&self) {
        self.uploads_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_chunks_failed(&self) {
        self.chunks_failed.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "chunks_failed", "counter incremented");
    }

    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            agents_probed = self.agents_probed(),
            attestations_issued = self.attestations_issued(),
            attestation_failures = self.attestation_failures(),
            uploads_failed = self.uploads_failed(),
            chunks_failed = self.chunks_failed(),
        );
    }

    pub fn agents_probed(&self) -> u64 {
        self.agents_probed.load(Ordering::Relaxed)
    }

    pub fn attestations_issued(&self) -> u64 {
        self.attestations_issued.load(Ordering::Relaxed)
    }

    pub fn attestation_failures(&self) -> u64 {
        self.attestation_failures.load(Ordering::Relaxed)
    }

    pub fn uploads_failed(&self) -> u64 {
        self.uploads_failed.load(Ordering::Relaxed)
    }

    pub fn chunks_failed(&self) -> u64 {
        self.chunks_failed.load(Ordering::Relaxed)
    }

    /// Zero every counter (tests).
    pub fn reset(&self) {
        self.agents_probed.store(0, Ordering::Relaxed);
        self.attestations_issued.store(0, Ordering::Relaxed);
        self.attestation_failures.store(0, Ordering::Relaxed);
        self.uploads_failed.store(0, Ordering::Relaxed);
        self.chunks_failed.store(0, Ordering::Relaxed);
    }
}
