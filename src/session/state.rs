//! Session state

use serde::Serialize;
use std::net::SocketAddr;
use std::time::Instant;

use crate::transport::Address;

/// Opaque identifier of a registered session.
///
/// Allocated by the registry starting at 1; `0` is reserved as the
/// invalid-handle sentinel handed out by the boundary layer on failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionHandle(u64);

impl SessionHandle {
    /// The sentinel that never refers to a session
    pub const INVALID: Self = Self(0);

    /// Create from raw u64
    pub fn from_raw(id: u64) -> Self {
        Self(id)
    }

    /// Get raw value
    pub fn as_u64(&self) -> u64 {
        self.0
    }

    pub fn is_valid(&self) -> bool {
        self.0 != 0
    }
}

impl std::fmt::Display for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Session lifecycle: `Disconnected -> Connected -> Closed`.
///
/// `Closed` is terminal; there is no way back to `Disconnected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionPhase {
    /// Constructed but not yet published in the registry
    Disconnected,
    /// Transport is up and requests may be issued
    Connected,
    /// Closed explicitly or after a fatal transport error
    Closed,
}

/// Per-session bookkeeping
#[derive(Debug)]
pub struct SessionState {
    pub handle: SessionHandle,
    pub address: Address,
    /// Socket address the transport actually connected to
    pub peer: SocketAddr,
    pub phase: SessionPhase,
    pub connected_at: Instant,
    pub last_active: Instant,
    pub bytes_rx: u64,
    pub bytes_tx: u64,
    pub requests_ok: u64,
    pub requests_failed: u64,
}

impl SessionState {
    pub fn new(handle: SessionHandle, address: Address, peer: SocketAddr) -> Self {
        let now = Instant::now();
        Self {
            handle,
            address,
            peer,
            phase: SessionPhase::Disconnected,
            connected_at: now,
            last_active: now,
            bytes_rx: 0,
            bytes_tx: 0,
            requests_ok: 0,
            requests_failed: 0,
        }
    }

    /// Move to `Connected`. Has no effect once closed.
    pub fn set_connected(&mut self) {
        if self.phase == SessionPhase::Disconnected {
            self.phase = SessionPhase::Connected;
            self.connected_at = Instant::now();
            self.touch();
        }
    }

    /// Move to `Closed`. Returns whether the session was connected before.
    pub fn set_closed(&mut self) -> bool {
        let was_connected = self.phase == SessionPhase::Connected;
        self.phase = SessionPhase::Closed;
        was_connected
    }

    pub fn touch(&mut self) {
        self.last_active = Instant::now();
    }

    /// Record a completed request/response exchange
    pub fn record_exchange(&mut self, tx: u64, rx: u64) {
        self.bytes_tx = self.bytes_tx.saturating_add(tx);
        self.bytes_rx = self.bytes_rx.saturating_add(rx);
        self.touch();
    }

    pub fn record_outcome(&mut self, ok: bool) {
        if ok {
            self.requests_ok = self.requests_ok.saturating_add(1);
        } else {
            self.requests_failed = self.requests_failed.saturating_add(1);
        }
    }

    pub fn is_connected(&self) -> bool {
        self.phase == SessionPhase::Connected
    }

    pub fn duration(&self) -> std::time::Duration {
        self.connected_at.elapsed()
    }

    pub fn idle_duration(&self) -> std::time::Duration {
        self.last_active.elapsed()
    }

    /// Convert to serializable info
    pub fn to_info(&self) -> SessionInfo {
        SessionInfo {
            handle: self.handle.as_u64(),
            address: self.address.to_string(),
            peer: self.peer.to_string(),
            phase: self.phase,
            duration_secs: self.duration().as_secs_f64(),
            idle_secs: self.idle_duration().as_secs_f64(),
            bytes_rx: self.bytes_rx,
            bytes_tx: self.bytes_tx,
            requests_ok: self.requests_ok,
            requests_failed: self.requests_failed,
        }
    }
}

/// Serializable snapshot of a session
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub handle: u64,
    /// Address as given by the caller
    pub address: String,
    /// Resolved remote IP:port
    pub peer: String,
    pub phase: SessionPhase,
    pub duration_secs: f64,
    pub idle_secs: f64,
    pub bytes_rx: u64,
    pub bytes_tx: u64,
    pub requests_ok: u64,
    pub requests_failed: u64,
}
