//! Blocking TCP transport
//!
//! Owns one connection, writes whole frames and reads until a complete
//! frame is buffered. Bytes of a partially received frame stay in the read
//! buffer across a timeout, so the stream never loses framing.

use bytes::BytesMut;
use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

use super::address::Address;
use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::metrics::METRICS;
use crate::protocol::{ControlKind, Frame};
use crate::util::connect_tcp;

const READ_CHUNK: usize = 4096;

/// A single framed connection to a remote endpoint
pub struct Transport {
    stream: TcpStream,
    peer: SocketAddr,
    read_buf: BytesMut,
    write_buf: BytesMut,
    max_frame_len: usize,
    closer: TransportCloser,
}

impl Transport {
    /// Connect to `address`, trying each resolved socket address in turn
    pub fn connect(address: &Address, config: &ClientConfig) -> Result<Self> {
        let candidates = address
            .resolve()
            .map_err(|e| ClientError::connect_failed(address.to_string(), e))?;

        let mut last_error = None;
        for addr in candidates {
            match connect_tcp(addr, config) {
                Ok(stream) => {
                    debug!(%address, peer = %addr, "Transport connected");
                    return Self::from_stream(stream, config.max_frame_len)
                        .map_err(|e| ClientError::connect_failed(address.to_string(), e));
                }
                Err(e) => {
                    trace!(%address, peer = %addr, error = %e, "Connect attempt failed");
                    last_error = Some(e);
                }
            }
        }

        let reason = last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "no candidate addresses".to_string());
        Err(ClientError::connect_failed(address.to_string(), reason))
    }

    /// Wrap an already connected stream
    pub fn from_stream(stream: TcpStream, max_frame_len: usize) -> io::Result<Self> {
        let peer = stream.peer_addr()?;
        let closer = TransportCloser::new(stream.try_clone()?);

        Ok(Self {
            stream,
            peer,
            read_buf: BytesMut::with_capacity(READ_CHUNK),
            write_buf: BytesMut::with_capacity(READ_CHUNK),
            max_frame_len,
            closer,
        })
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Handle that can shut this transport down from another thread
    pub fn closer(&self) -> TransportCloser {
        self.closer.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closer.is_closed()
    }

    /// Write one frame. Returns the number of bytes put on the wire.
    pub fn send(&mut self, frame: &Frame) -> Result<usize> {
        self.send_until(frame, None)
    }

    /// Write one frame, giving up at `deadline`.
    ///
    /// Fails with `Timeout` if the deadline has already passed and nothing
    /// was written. A write that stalls part way through fails with
    /// `WriteFailed`: the stream is no longer framed after a partial write.
    pub fn send_until(&mut self, frame: &Frame, deadline: Option<Instant>) -> Result<usize> {
        if self.is_closed() {
            return Err(ClientError::WriteFailed(closed_error()));
        }

        let timeout = remaining(deadline)?;
        self.stream
            .set_write_timeout(timeout)
            .map_err(ClientError::WriteFailed)?;

        self.write_buf.clear();
        frame.encode(&mut self.write_buf);

        self.stream
            .write_all(&self.write_buf)
            .and_then(|_| self.stream.flush())
            .map_err(ClientError::WriteFailed)?;

        METRICS.bytes_tx(self.write_buf.len() as u64);
        Ok(self.write_buf.len())
    }

    /// Block until a complete frame arrives or `deadline` passes.
    ///
    /// A `None` deadline waits indefinitely.
    pub fn receive(&mut self, deadline: Option<Instant>) -> Result<Frame> {
        let mut chunk = [0u8; READ_CHUNK];

        loop {
            if let Some(frame) = Frame::decode(&mut self.read_buf, self.max_frame_len)? {
                return Ok(frame);
            }

            if self.is_closed() {
                return Err(ClientError::ReadFailed(closed_error()));
            }

            let timeout = remaining(deadline)?;
            self.stream
                .set_read_timeout(timeout)
                .map_err(ClientError::ReadFailed)?;

            match self.stream.read(&mut chunk) {
                Ok(0) => {
                    return Err(ClientError::ReadFailed(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "connection closed by peer",
                    )))
                }
                Ok(n) => {
                    METRICS.bytes_rx(n as u64);
                    self.read_buf.extend_from_slice(&chunk[..n]);
                }
                Err(e) if is_timeout(&e) => return Err(ClientError::Timeout),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(ClientError::ReadFailed(e)),
            }
        }
    }

    /// Send a payload-less control frame
    pub fn send_control(&mut self, kind: ControlKind, deadline: Option<Instant>) -> Result<usize> {
        self.send_until(&Frame::Control(kind), deadline)
    }

    /// Release the socket. Closing twice is a no-op.
    pub fn close(&mut self) {
        self.closer.close();
        self.read_buf.clear();
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("peer", &self.peer)
            .field("buffered", &self.read_buf.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Shuts a transport's socket down without holding the transport.
///
/// Shutting the socket down wakes any thread blocked reading from it.
#[derive(Clone)]
pub struct TransportCloser {
    inner: Arc<CloserInner>,
}

struct CloserInner {
    stream: TcpStream,
    closed: AtomicBool,
}

impl TransportCloser {
    fn new(stream: TcpStream) -> Self {
        Self {
            inner: Arc::new(CloserInner {
                stream,
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Shut the socket down. Only the first call has an effect.
    pub fn close(&self) {
        if !self.inner.closed.swap(true, Ordering::AcqRel) {
            // The peer may already be gone; nothing useful to do with the error
            let _ = self.inner.stream.shutdown(Shutdown::Both);
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }
}

/// Socket timeout for the time left until `deadline`; `None` blocks forever
fn remaining(deadline: Option<Instant>) -> Result<Option<Duration>> {
    match deadline {
        Some(deadline) => {
            let left = deadline.saturating_duration_since(Instant::now());
            // A zero socket timeout means "block forever" to the OS
            if left.is_zero() {
                return Err(ClientError::Timeout);
            }
            Ok(Some(left.max(Duration::from_millis(1))))
        }
        None => Ok(None),
    }
}

fn is_timeout(e: &io::Error) -> bool {
    matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut)
}

fn closed_error() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "transport is closed")
}
