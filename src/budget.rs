//! Call budget guard
//!
//! Pre-admission control for outbound calls: per-endpoint and global call
//! ceilings within a trailing window, plus an in-flight concurrency ceiling.
//!
//! This is a fixed-window approximate limiter with lazy pruning, not an
//! exact sliding window or token bucket. Entries age out on the next check
//! rather than eagerly. The active-request set is cooperative: every
//! admitted call must be matched by exactly one `untrack` or the slot leaks.

use dashmap::DashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::NetConfig;

/// Default trailing accounting window
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(600);

/// Default global call ceiling within one window
pub const DEFAULT_GLOBAL_MAX: usize = 100;

/// Default per-endpoint call ceiling within one window
pub const DEFAULT_ENDPOINT_MAX: usize = 10;

/// Default in-flight concurrency ceiling
pub const DEFAULT_CONCURRENCY_MAX: usize = 5;

/// Why a call was denied admission
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DenyReason {
    /// Global ceiling reached within the current window
    GlobalCeiling,
    /// Per-endpoint ceiling reached within the current window
    EndpointCeiling(String),
    /// Too many requests already in flight
    TooManyInFlight,
}

impl std::fmt::Display for DenyReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DenyReason::GlobalCeiling => write!(f, "global call ceiling reached"),
            DenyReason::EndpointCeiling(endpoint) => {
                write!(f, "call ceiling reached for {}", endpoint)
            }
            DenyReason::TooManyInFlight => write!(f, "too many requests in flight"),
        }
    }
}

/// Fixed-window call budget with cooperative in-flight tracking
pub struct CallBudget {
    window: Duration,
    global_max: usize,
    endpoint_max: usize,
    concurrency_max: usize,
    /// Per-endpoint ordered timestamp ledgers
    endpoint_ledgers: DashMap<String, Vec<Instant>>,
    /// Global ordered timestamp ledger
    global_ledger: Mutex<Vec<Instant>>,
    /// In-flight request identifiers
    active: DashMap<Uuid, Instant>,
}

impl CallBudget {
    /// Create a budget with explicit ceilings
    pub fn new(
        window: Duration,
        global_max: usize,
        endpoint_max: usize,
        concurrency_max: usize,
    ) -> Self {
        Self {
            window,
            global_max,
            endpoint_max,
            concurrency_max,
            endpoint_ledgers: DashMap::new(),
            global_ledger: Mutex::new(Vec::new()),
            active: DashMap::new(),
        }
    }

    /// Create a budget from runtime configuration
    pub fn from_config(config: &NetConfig) -> Self {
        Self::new(
            config.rate_window(),
            config.rate_global_max,
            config.rate_endpoint_max,
            config.max_concurrent_requests,
        )
    }

    /// Check whether a call to `endpoint` may proceed right now.
    ///
    /// Prunes aged-out entries, then denies on the first ceiling hit:
    /// global, per-endpoint, then concurrency.
    pub fn admit(&self, endpoint: &str) -> Result<(), DenyReason> {
        self.admit_at(endpoint, Instant::now())
    }

    /// Record one attempted call against both ledgers.
    ///
    /// Called once per attempt regardless of outcome.
    pub fn record(&self, endpoint: &str) {
        self.record_at(endpoint, Instant::now());
    }

    /// Add a request to the active set for the duration of one call.
    pub fn track(&self, id: Uuid) {
        self.active.insert(id, Instant::now());
    }

    /// Remove a request from the active set. Must be called exactly once per
    /// `track`.
    pub fn untrack(&self, id: Uuid) {
        if self.active.remove(&id).is_none() {
            warn!("Untracked unknown request id {}", id);
        }
    }

    /// Number of requests currently in flight
    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    fn admit_at(&self, endpoint: &str, now: Instant) -> Result<(), DenyReason> {
        let cutoff = |at: &Instant| now.duration_since(*at) <= self.window;

        {
            let mut global = self.global_ledger.lock().expect("budget ledger lock poisoned");
            global.retain(cutoff);
            if global.len() >= self.global_max {
                debug!("Denying {}: global ceiling ({})", endpoint, self.global_max);
                return Err(DenyReason::GlobalCeiling);
            }
        }

        if let Some(mut ledger) = self.endpoint_ledgers.get_mut(endpoint) {
            ledger.retain(cutoff);
            if ledger.len() >= self.endpoint_max {
                debug!("Denying {}: endpoint ceiling ({})", endpoint, self.endpoint_max);
                return Err(DenyReason::EndpointCeiling(endpoint.to_string()));
            }
        }

        if self.active.len() >= self.concurrency_max {
            debug!("Denying {}: {} requests in flight", endpoint, self.active.len());
            return Err(DenyReason::TooManyInFlight);
        }

        Ok(())
    }

    fn record_at(&self, endpoint: &str, now: Instant) {
        self.global_ledger
            .lock()
            .expect("budget ledger lock poisoned")
            .push(now);
        self.endpoint_ledgers
            .entry(endpoint.to_string())
            .or_default()
            .push(now);
    }
}
