// ABOUTME: Metrics and observability for the state pool
//
// Tracks:
// - Sessions: created, closed, close failures, factory failures
// - References: gets and puts served
// - Entries: currently pooled models

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use serde::Serialize;

/// Pool-level metrics
#[derive(Debug, Default)]
pub struct PoolMetrics {
    pub sessions_created: AtomicU64,
    pub sessions_closed: AtomicU64,
    pub close_errors: AtomicU64,
    pub create_errors: AtomicU64,
    pub total_gets: AtomicU64,
    pub total_puts: AtomicU64,
    pub active_models: AtomicU32,
}

/// Point-in-time copy of `PoolMetrics`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub sessions_created: u64,
    pub sessions_closed: u64,
    pub close_errors: u64,
    pub create_errors: u64,
    pub total_gets: u64,
    pub total_puts: u64,
    pub active_models: u32,
}

impl PoolMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn session_created(&self) {
        self.sessions_created.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a close attempt; failed closes still count as closed
    pub fn session_closed(&self, failed: bool) {
        self.sessions_closed.fetch_add(1, Ordering::Relaxed);
        if failed {
            self.close_errors.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn create_failed(&self) {
        self.create_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_gets(&self) {
        self.total_gets.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_puts(&self) {
        self.total_puts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_active_models(&self, count: u32) {
        self.active_models.store(count, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            sessions_created: self.sessions_created.load(Ordering::Relaxed),
            sessions_closed: self.sessions_closed.load(Ordering::Relaxed),
            close_errors: self.close_errors.load(Ordering::Relaxed),
            create_errors: self.create_errors.load(Ordering::Relaxed),
            total_gets: self.total_gets.load(Ordering::Relaxed),
            total_puts: self.total_puts.load(Ordering::Relaxed),
            active_models: self.active_models.load(Ordering::Relaxed),
        }
    }
}
