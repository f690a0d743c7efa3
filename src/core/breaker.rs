//! Per-instance circuit breaker.
//!
//! Each backend instance carries its own [`CircuitBreaker`]: a tri-state
//! status plus a consecutive-failure counter, updated by the request proxy
//! after every forwarded request. An open breaker excludes the instance from
//! load-balancing rotation until a cooldown (measured from the most recent
//! failure) elapses, at which point the instance is allowed a half-open trial:
//! the next forwarding outcome decides between closing the breaker and
//! re-opening it.
//!
//! All fields are atomics; transitions are safe against concurrent request
//! handlers and readers never observe a torn counter/state pair in a way that
//! affects correctness (state is authoritative for eligibility).
use std::{
    sync::atomic::{AtomicU8, AtomicU32, AtomicU64, Ordering},
    time::{Duration, Instant},
};

use serde::Serialize;

// Constants for breaker state to replace magic numbers
const STATE_CLOSED: u8 = 0;
const STATE_OPEN: u8 = 1;
const STATE_HALF_OPEN: u8 = 2;

/// Breaker status of a backend instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Normal operation; the instance receives traffic.
    Closed,
    /// Too many consecutive forwarding failures; excluded from rotation.
    Open,
    /// Cooldown elapsed; provisionally eligible for a trial request.
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half_open"),
        }
    }
}

#[derive(Debug)]
pub struct CircuitBreaker {
    state: AtomicU8, // Uses STATE_* constants
    consecutive_failures: AtomicU32,
    /// Milliseconds from `epoch` to the most recent forwarding failure; 0 = never.
    last_failure_ms: AtomicU64,
    epoch: Instant,
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new()
    }
}

impl CircuitBreaker {
    /// A fresh breaker: closed with zero failures.
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(STATE_CLOSED),
            consecutive_failures: AtomicU32::new(0),
            last_failure_ms: AtomicU64::new(0),
            epoch: Instant::now(),
        }
    }

    pub fn state(&self) -> CircuitState {
        match self.state.load(Ordering::Acquire) {
            STATE_OPEN => CircuitState::Open,
            STATE_HALF_OPEN => CircuitState::HalfOpen,
            _ => CircuitState::Closed,
        }
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::Relaxed)
    }

    /// A forwarding success resets the breaker unconditionally, even from Open.
    pub fn record_success(&self) {
        self.consecutive_failures.store(0, Ordering::Release);
        self.state.store(STATE_CLOSED, Ordering::Release);
    }

    /// A transport-level forwarding failure. Opens the breaker once the
    /// counter exceeds `threshold`, or immediately when a half-open trial
    /// fails.
    pub fn record_failure(&self, threshold: u32) {
        self.record_failure_at(threshold, Instant::now());
    }

    pub fn record_failure_at(&self, threshold: u32, now: Instant) {
        let failures = self.consecutive_failures.fetch_add(1, Ordering::AcqRel) + 1;
        self.last_failure_ms
            .store(self.millis_since_epoch(now), Ordering::Release);

        if self.state.load(Ordering::Acquire) == STATE_HALF_OPEN {
            // Failed trial request: straight back to Open with a fresh cooldown.
            self.state.store(STATE_OPEN, Ordering::Release);
        } else if failures > threshold {
            self.state.store(STATE_OPEN, Ordering::Release);
        }
    }

    /// Whether the breaker currently admits traffic. Closed and HalfOpen
    /// admit; Open admits once `cooldown` has elapsed since the last failure,
    /// transitioning to HalfOpen as a side effect. The compare-exchange
    /// ensures only one caller performs the Open -> HalfOpen transition.
    pub fn allows_traffic(&self, cooldown: Duration) -> bool {
        self.allows_traffic_at(cooldown, Instant::now())
    }

    pub fn allows_traffic_at(&self, cooldown: Duration, now: Instant) -> bool {
        if self.state.load(Ordering::Acquire) != STATE_OPEN {
            return true;
        }

        let last_failure_ms = self.last_failure_ms.load(Ordering::Acquire);
        let elapsed_ms = self.millis_since_epoch(now).saturating_sub(last_failure_ms);
        if elapsed_ms < cooldown.as_millis() as u64 {
            return false;
        }

        // Cooldown elapsed. Whether we win the race or another caller already
        // flipped the state, the instance is now half-open and eligible.
        let _ = self.state.compare_exchange(
            STATE_OPEN,
            STATE_HALF_OPEN,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
        true
    }

    fn millis_since_epoch(&self, now: Instant) -> u64 {
        now.saturating_duration_since(self.epoch).as_millis() as u64
    }
}
