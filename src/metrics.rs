//! Process-wide request counters for Portico.
//!
//! A single [`GatewayMetrics`] instance is shared by every concurrent request
//! handler. Counters are plain atomics so increments never race and readers
//! never observe torn values; the only read path is [`GatewayMetrics::snapshot`],
//! which feeds the status endpoint.
use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::Instant,
};

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Monotonically non-decreasing gateway counters plus a fixed start time.
#[derive(Debug)]
pub struct GatewayMetrics {
    total_requests: AtomicU64,
    cache_hits: AtomicU64,
    errors: AtomicU64,
    started_at: DateTime<Utc>,
    start_instant: Instant,
}

impl Default for GatewayMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl GatewayMetrics {
    pub fn new() -> Self {
        Self {
            total_requests: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            started_at: Utc::now(),
            start_instant: Instant::now(),
        }
    }

    /// Count one inbound request reaching the router, regardless of outcome.
    pub fn increment_total_requests(&self) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
    }

    /// Count one request served from the response cache.
    pub fn increment_cache_hits(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Count one forwarding failure (transport-level only; backend error
    /// statuses are passed through and not counted here).
    pub fn increment_errors(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn total_requests(&self) -> u64 {
        self.total_requests.load(Ordering::Relaxed)
    }

    pub fn cache_hits(&self) -> u64 {
        self.cache_hits.load(Ordering::Relaxed)
    }

    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    /// Point-in-time copy of all counters for the status endpoint.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            total_requests: self.total_requests(),
            cache_hits: self.cache_hits(),
            errors: self.errors(),
            started_at: self.started_at,
            uptime_secs: self.start_instant.elapsed().as_secs(),
        }
    }
}

/// Serializable view of [`GatewayMetrics`].
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub total_requests: u64,
    pub cache_hits: u64,
    pub errors: u64,
    pub started_at: DateTime<Utc>,
    pub uptime_secs: u64,
}
