//! Connected client session
//!
//! Serializes requests over one transport and correlates replies by
//! request id. Single-message pushes that arrive on the same connection
//! are handed to the session's subscriber.

use bytes::Bytes;
use once_cell::sync::OnceCell;
use parking_lot::{Mutex, MutexGuard};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, trace, warn};

use super::state::{SessionHandle, SessionInfo, SessionPhase, SessionState};
use crate::error::{ClientError, Result};
use crate::metrics::METRICS;
use crate::protocol::{ControlKind, Frame, ProtocolError, Reply, Request, Response};
use crate::transport::{Address, Transport, TransportCloser};

/// Budget for the goodbye frame sent on close
const CLOSE_FRAME_TIMEOUT: Duration = Duration::from_millis(100);

type DetachHook = Box<dyn Fn(SessionHandle) + Send + Sync>;

/// A stateful client context built on one transport
pub struct Session {
    handle: SessionHandle,
    address: Address,
    state: Mutex<SessionState>,
    /// Held for the whole request/response exchange
    transport: Mutex<Transport>,
    closer: TransportCloser,
    next_request_id: AtomicU64,
    subscriber: Mutex<Option<mpsc::Sender<Bytes>>>,
    /// Runs once the session can no longer be used
    on_detach: OnceCell<DetachHook>,
}

/// `None` when `timeout` is too large to represent, meaning no deadline
fn deadline_after(timeout: Duration) -> Option<Instant> {
    Instant::now().checked_add(timeout)
}

fn remote_closed() -> ClientError {
    ClientError::ReadFailed(std::io::Error::new(
        std::io::ErrorKind::ConnectionAborted,
        "remote closed the session",
    ))
}

impl Session {
    /// Wrap a connected transport. The session starts `Disconnected` until
    /// [`Session::activate`] publishes it.
    pub fn new(handle: SessionHandle, address: Address, transport: Transport) -> Self {
        let state = SessionState::new(handle, address.clone(), transport.peer_addr());
        let closer = transport.closer();

        Self {
            handle,
            address,
            state: Mutex::new(state),
            transport: Mutex::new(transport),
            closer,
            next_request_id: AtomicU64::new(1),
            subscriber: Mutex::new(None),
            on_detach: OnceCell::new(),
        }
    }

    pub(crate) fn activate(&self) {
        self.state.lock().set_connected();
        debug!(session = %self.handle, address = %self.address, "Session connected");
    }

    /// Install the hook run when the session closes or fails. Only the
    /// first hook is kept.
    pub(crate) fn set_detach_hook(&self, hook: impl Fn(SessionHandle) + Send + Sync + 'static) {
        let _ = self.on_detach.set(Box::new(hook));
    }

    pub fn handle(&self) -> SessionHandle {
        self.handle
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn phase(&self) -> SessionPhase {
        self.state.lock().phase
    }

    pub fn is_connected(&self) -> bool {
        self.state.lock().is_connected()
    }

    pub fn info(&self) -> SessionInfo {
        self.state.lock().to_info()
    }

    fn ensure_connected(&self) -> Result<()> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(ClientError::NotConnected(self.handle))
        }
    }

    /// Take the transport, queueing behind earlier callers until `deadline`
    fn acquire(&self, deadline: Option<Instant>) -> Result<MutexGuard<'_, Transport>> {
        let transport = match deadline {
            Some(deadline) => self
                .transport
                .try_lock_until(deadline)
                .ok_or(ClientError::Timeout)?,
            None => self.transport.lock(),
        };
        // Closed while we were queued
        self.ensure_connected()?;
        Ok(transport)
    }

    /// Hand the transport straight to the next queued caller
    fn release(transport: MutexGuard<'_, Transport>) {
        MutexGuard::unlock_fair(transport);
    }

    /// Send `request` and wait up to `timeout` for its reply.
    ///
    /// Time spent queueing behind other callers counts against `timeout`.
    /// Queued callers are served in arrival order. A timeout too large to
    /// add to the current instant (such as `Duration::MAX`) waits forever.
    #[instrument(skip(self), fields(session = %self.handle))]
    pub fn invoke(&self, request: &Request, timeout: Duration) -> Result<Reply> {
        self.ensure_connected()?;
        let deadline = deadline_after(timeout);

        let mut transport = match self.acquire(deadline) {
            Ok(transport) => transport,
            Err(ClientError::Timeout) => {
                METRICS.timeout();
                self.state.lock().record_outcome(false);
                return Err(ClientError::Timeout);
            }
            Err(e) => return Err(e),
        };

        let request_id = self.next_request_id.fetch_add(1, Ordering::Relaxed);
        let result = self.exchange(&mut transport, request, request_id, deadline);
        Self::release(transport);

        self.finish(request, result)
    }

    /// Remote Add
    pub fn add(&self, a: i64, b: i64, timeout: Duration) -> Result<i64> {
        match self.invoke(&Request::Add { a, b }, timeout)? {
            Reply::Sum(sum) => Ok(sum),
            Reply::Pong => Err(ProtocolError::Unexpected("pong in reply to add").into()),
        }
    }

    /// Round-trip liveness check. Returns the measured round-trip time.
    pub fn ping(&self, timeout: Duration) -> Result<Duration> {
        let started = Instant::now();
        self.invoke(&Request::Ping, timeout)?;
        Ok(started.elapsed())
    }

    fn exchange(
        &self,
        transport: &mut Transport,
        request: &Request,
        request_id: u64,
        deadline: Option<Instant>,
    ) -> Result<(Response, u64, u64)> {
        let frame = Frame::request_response(self.handle.as_u64(), request_id, request.encode());
        let sent = transport.send_until(&frame, deadline)?;
        METRICS.request_sent();
        trace!(request_id, operation = %request.operation(), bytes = sent, "Request sent");

        loop {
            let reply = transport.receive(deadline)?;
            let received = reply.encoded_len() as u64;
            match reply {
                Frame::RequestResponse { correlation, body } => {
                    if correlation.request_id != request_id
                        || correlation.connection_id != self.handle.as_u64()
                    {
                        // Reply to an earlier request that timed out
                        METRICS.stale_response();
                        debug!(
                            request_id = correlation.request_id,
                            expected = request_id,
                            "Discarding stale response"
                        );
                        continue;
                    }

                    let response = Response::decode(&body)?;
                    return Ok((response, sent as u64, received));
                }
                Frame::SingleMessage { body } => self.deliver(body),
                Frame::Control(ControlKind::Close | ControlKind::EndOfStream) => {
                    return Err(remote_closed());
                }
                Frame::Control(ControlKind::KeepAlive) => trace!("Keep-alive received"),
            }
        }
    }

    fn finish(&self, request: &Request, result: Result<(Response, u64, u64)>) -> Result<Reply> {
        let result = result.and_then(|(response, tx, rx)| {
            self.state.lock().record_exchange(tx, rx);
            let reply = response.into_result()?;
            if reply.operation() != request.operation() {
                return Err(ProtocolError::Unexpected("reply does not match request").into());
            }
            Ok(reply)
        });

        self.state.lock().record_outcome(result.is_ok());

        match result {
            Ok(reply) => Ok(reply),
            Err(err) => Err(self.fail(err, request.operation().name())),
        }
    }

    /// Classify a failed call, closing the session on fatal errors
    fn fail(&self, err: ClientError, operation: &str) -> ClientError {
        // Closed by another thread while the call was in flight
        if self.phase() == SessionPhase::Closed {
            return ClientError::NotConnected(self.handle);
        }

        match &err {
            ClientError::Timeout => {
                METRICS.timeout();
                debug!(session = %self.handle, operation, "Request timed out");
            }
            ClientError::RemoteError { code, message } => {
                METRICS.remote_error();
                debug!(session = %self.handle, code, %message, "Remote error");
            }
            e if e.is_fatal() => {
                METRICS.error();
                warn!(session = %self.handle, operation, error = %e, "Session failed, closing");
                self.terminate();
            }
            _ => METRICS.error(),
        }

        err
    }

    /// Route pushed messages to a new channel holding up to `capacity`
    /// undelivered messages. Replaces any earlier subscriber.
    ///
    /// Pushes are read off the connection while a request is in flight or
    /// during [`Session::poll`]. They are dropped when no subscriber is
    /// attached or its channel is full.
    pub fn subscribe(&self, capacity: usize) -> mpsc::Receiver<Bytes> {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        *self.subscriber.lock() = Some(tx);
        debug!(session = %self.handle, capacity, "Subscriber attached");
        rx
    }

    /// Detach the current subscriber, ending its channel
    pub fn unsubscribe(&self) {
        self.subscriber.lock().take();
    }

    fn deliver(&self, body: Bytes) {
        let mut subscriber = self.subscriber.lock();
        let Some(tx) = subscriber.as_ref() else {
            METRICS.push_dropped();
            trace!(session = %self.handle, "No subscriber, dropping push");
            return;
        };

        match tx.try_send(body) {
            Ok(()) => METRICS.push_received(),
            Err(mpsc::error::TrySendError::Full(_)) => {
                METRICS.push_dropped();
                warn!(session = %self.handle, "Subscriber lagging, dropping push");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                METRICS.push_dropped();
                debug!(session = %self.handle, "Subscriber gone");
                *subscriber = None;
            }
        }
    }

    /// Read pushed messages for up to `timeout` while no request is in
    /// flight. Returns how many pushes arrived.
    #[instrument(skip(self), fields(session = %self.handle))]
    pub fn poll(&self, timeout: Duration) -> Result<usize> {
        self.ensure_connected()?;
        let deadline = deadline_after(timeout);

        let mut transport = self.acquire(deadline)?;
        let mut pushes = 0;
        let result = loop {
            match transport.receive(deadline) {
                Ok(Frame::SingleMessage { body }) => {
                    self.deliver(body);
                    pushes += 1;
                }
                Ok(Frame::RequestResponse { correlation, .. }) => {
                    METRICS.stale_response();
                    debug!(request_id = correlation.request_id, "Discarding stale response");
                }
                Ok(Frame::Control(ControlKind::KeepAlive)) => trace!("Keep-alive received"),
                Ok(Frame::Control(_)) => break Err(remote_closed()),
                Err(ClientError::Timeout) => break Ok(pushes),
                Err(e) => break Err(e),
            }
        };
        Self::release(transport);

        if pushes > 0 {
            self.state.lock().touch();
        }
        result.map_err(|e| self.fail(e, "poll"))
    }

    /// Send a keep-alive control frame
    pub fn keep_alive(&self, timeout: Duration) -> Result<()> {
        self.ensure_connected()?;
        let deadline = deadline_after(timeout);

        let mut transport = self.acquire(deadline)?;
        let result = transport.send_control(ControlKind::KeepAlive, deadline);
        Self::release(transport);

        result
            .map(|_| self.state.lock().touch())
            .map_err(|e| self.fail(e, "keep_alive"))
    }

    /// Close the session: mark it closed, say goodbye if the transport is
    /// idle, and shut the socket down. Never fails; repeated calls are no-ops.
    pub fn close(&self) {
        let was_connected = self.state.lock().set_closed();

        if was_connected {
            // Only when no request holds the transport
            if let Some(mut transport) = self.transport.try_lock() {
                let deadline = deadline_after(CLOSE_FRAME_TIMEOUT);
                let _ = transport.send_control(ControlKind::Close, deadline);
            }
        }
        self.shut_down();

        if was_connected {
            let info = self.info();
            info!(
                session = %self.handle,
                address = %self.address,
                duration_secs = info.duration_secs,
                requests_ok = info.requests_ok,
                requests_failed = info.requests_failed,
                "Session closed"
            );
        }
    }

    /// Close after a fatal transport error without attempting any I/O
    fn terminate(&self) {
        self.state.lock().set_closed();
        self.shut_down();
    }

    fn shut_down(&self) {
        self.closer.close();
        self.unsubscribe();
        if let Some(hook) = self.on_detach.get() {
            hook(self.handle);
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("handle", &self.handle)
            .field("address", &self.address)
            .field("phase", &self.phase())
            .finish()
    }
}
