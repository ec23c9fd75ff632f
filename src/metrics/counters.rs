//! Atomic counters for hot-path metrics
//!
//! Lock-free counters that can be safely updated from any thread.

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics instance
pub static METRICS: Metrics = Metrics::new();

/// Atomic metrics counters
pub struct Metrics {
    // Client session metrics
    pub sessions_opened: AtomicU64,
    pub sessions_active: AtomicU64,
    pub connect_failures: AtomicU64,

    // Request metrics
    pub requests_sent: AtomicU64,
    pub stale_responses: AtomicU64,
    pub remote_errors: AtomicU64,

    // Push metrics
    pub pushes_received: AtomicU64,
    pub pushes_dropped: AtomicU64,

    // Traffic metrics
    pub bytes_received: AtomicU64,
    pub bytes_sent: AtomicU64,

    // Error metrics
    pub errors_total: AtomicU64,
    pub timeouts_total: AtomicU64,

    // Server metrics
    pub server_connections_total: AtomicU64,
    pub server_connections_active: AtomicU64,
    pub server_requests: AtomicU64,
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            sessions_opened: AtomicU64::new(0),
            sessions_active: AtomicU64::new(0),
            connect_failures: AtomicU64::new(0),
            requests_sent: AtomicU64::new(0),
            stale_responses: AtomicU64::new(0),
            remote_errors: AtomicU64::new(0),
            pushes_received: AtomicU64::new(0),
            pushes_dropped: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            errors_total: AtomicU64::new(0),
            timeouts_total: AtomicU64::new(0),
            server_connections_total: AtomicU64::new(0),
            server_connections_active: AtomicU64::new(0),
            server_requests: AtomicU64::new(0),
        }
    }

    // Session tracking
    #[inline]
    pub fn session_opened(&self) {
        self.sessions_opened.fetch_add(1, Ordering::Relaxed);
        self.sessions_active.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn session_closed(&self) {
        self.sessions_active.fetch_sub(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn connect_failed(&self) {
        self.connect_failures.fetch_add(1, Ordering::Relaxed);
    }

    // Request tracking
    #[inline]
    pub fn request_sent(&self) {
        self.requests_sent.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn stale_response(&self) {
        self.stale_responses.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn remote_error(&self) {
        self.remote_errors.fetch_add(1, Ordering::Relaxed);
    }

    // Push tracking
    #[inline]
    pub fn push_received(&self) {
        self.pushes_received.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn push_dropped(&self) {
        self.pushes_dropped.fetch_add(1, Ordering::Relaxed);
    }

    // Traffic tracking
    #[inline]
    pub fn bytes_rx(&self, count: u64) {
        self.bytes_received.fetch_add(count, Ordering::Relaxed);
    }

    #[inline]
    pub fn bytes_tx(&self, count: u64) {
        self.bytes_sent.fetch_add(count, Ordering::Relaxed);
    }

    // Error tracking
    #[inline]
    pub fn error(&self) {
        self.errors_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn timeout(&self) {
        self.timeouts_total.fetch_add(1, Ordering::Relaxed);
    }

    // Server tracking
    #[inline]
    pub fn server_connection_opened(&self) {
        self.server_connections_total.fetch_add(1, Ordering::Relaxed);
        self.server_connections_active.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn server_connection_closed(&self) {
        self.server_connections_active.fetch_sub(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn server_request(&self) {
        self.server_requests.fetch_add(1, Ordering::Relaxed);
    }

    /// Get snapshot of all metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            sessions_opened: self.sessions_opened.load(Ordering::Relaxed),
            sessions_active: self.sessions_active.load(Ordering::Relaxed),
            connect_failures: self.connect_failures.load(Ordering::Relaxed),
            requests_sent: self.requests_sent.load(Ordering::Relaxed),
            stale_responses: self.stale_responses.load(Ordering::Relaxed),
            remote_errors: self.remote_errors.load(Ordering::Relaxed),
            pushes_received: self.pushes_received.load(Ordering::Relaxed),
            pushes_dropped: self.pushes_dropped.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            errors_total: self.errors_total.load(Ordering::Relaxed),
            timeouts_total: self.timeouts_total.load(Ordering::Relaxed),
            server_connections_total: self.server_connections_total.load(Ordering::Relaxed),
            server_connections_active: self.server_connections_active.load(Ordering::Relaxed),
            server_requests: self.server_requests.load(Ordering::Relaxed),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of metrics for reporting
#[derive(Debug, Clone, Default)]
pub struct MetricsSnapshot {
    pub sessions_opened: u64,
    pub sessions_active: u64,
    pub connect_failures: u64,
    pub requests_sent: u64,
    pub stale_responses: u64,
    pub remote_errors: u64,
    pub pushes_received: u64,
    pub pushes_dropped: u64,
    pub bytes_received: u64,
    pub bytes_sent: u64,
    pub errors_total: u64,
    pub timeouts_total: u64,
    pub server_connections_total: u64,
    pub server_connections_active: u64,
    pub server_requests: u64,
}
