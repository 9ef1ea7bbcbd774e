//! Shared counters for the /health endpoint.
//! Updated by the proxy handlers, read by the health handler.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Request counters. Handlers hold no other shared mutable state.
#[derive(Default)]
pub struct ProxyStats {
    /// Proxied requests received, any outcome.
    pub requests_total: AtomicU64,
    /// Requests that failed upstream or in transport.
    pub upstream_failures: AtomicU64,
    /// Requests rejected before any upstream call.
    pub validation_failures: AtomicU64,
    /// Status of the most recent upstream response (0 = none yet, or no response).
    pub last_upstream_status: AtomicU64,
}

impl ProxyStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_requests(&self) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_upstream_failures(&self) {
        self.upstream_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_validation_failures(&self) {
        self.validation_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_last_upstream_status(&self, status: u16) {
        self.last_upstream_status.store(u64::from(status), Ordering::Relaxed);
    }

    pub fn requests_total(&self) -> u64 {
        self.requests_total.load(Ordering::Relaxed)
    }

    pub fn upstream_failures(&self) -> u64 {
        self.upstream_failures.load(Ordering::Relaxed)
    }

    pub fn validation_failures(&self) -> u64 {
        self.validation_failures.load(Ordering::Relaxed)
    }

    pub fn last_upstream_status(&self) -> Option<u16> {
        match self.last_upstream_status.load(Ordering::Relaxed) {
            0 => None,
            s => Some(s as u16),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    /// Whether a key is configured. The key itself is never reported.
    pub has_api_key: bool,
    pub upstream_url: String,
    pub requests_total: u64,
    pub upstream_failures: u64,
    pub validation_failures: u64,
    pub last_upstream_status: Option<u16>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_status_starts_unset() {
        let stats = ProxyStats::new();
        assert_eq!(stats.last_upstream_status(), None);
        stats.set_last_upstream_status(429);
        assert_eq!(stats.last_upstream_status(), Some(429));
    }

    #[test]
    fn counters_increment_independently() {
        let stats = ProxyStats::new();
        stats.inc_requests();
        stats.inc_requests();
        stats.inc_validation_failures();
        assert_eq!(stats.requests_total(), 2);
        assert_eq!(stats.validation_failures(), 1);
        assert_eq!(stats.upstream_failures(), 0);
    }
}
