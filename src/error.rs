//! Client error taxonomy
//!
//! Every fallible client operation returns [`ClientError`]. The boundary
//! layer flattens it into the two-value `(value, Option<String>)` form.

use std::io;

use thiserror::Error;

use crate::protocol::ProtocolError;
use crate::session::SessionHandle;

/// Result alias for client operations
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors surfaced by transports, sessions and the registry
#[derive(Debug, Error)]
pub enum ClientError {
    /// Address unparseable, unresolvable, refused or timed out
    #[error("failed to connect to {address}: {reason}")]
    ConnectFailed { address: String, reason: String },

    /// Operation attempted on a closed or never-connected session
    #[error("session {0} is not connected")]
    NotConnected(SessionHandle),

    /// Unknown or already-removed handle
    #[error("invalid session handle {0}")]
    InvalidHandle(SessionHandle),

    #[error("write failed: {0}")]
    WriteFailed(#[source] io::Error),

    #[error("read failed: {0}")]
    ReadFailed(#[source] io::Error),

    /// Received bytes that do not form a valid frame or message
    #[error("protocol violation: {0}")]
    Protocol(#[from] ProtocolError),

    /// No response within the caller's deadline
    #[error("request timed out")]
    Timeout,

    /// The remote end answered with an application-level failure
    #[error("remote error {code}: {message}")]
    RemoteError { code: u16, message: String },

    #[error("unknown operation: {0}")]
    UnknownOperation(String),

    #[error("{operation} expects {expected} argument(s), got {got}")]
    InvalidArguments {
        operation: &'static str,
        expected: usize,
        got: usize,
    },

    /// A blocking call run on the background pool panicked or was cancelled
    #[error("background task failed: {0}")]
    Background(#[from] tokio::task::JoinError),
}

impl ClientError {
    pub(crate) fn connect_failed(address: impl Into<String>, reason: impl ToString) -> Self {
        Self::ConnectFailed {
            address: address.into(),
            reason: reason.to_string(),
        }
    }

    /// Whether the error leaves the underlying connection unusable.
    ///
    /// Fatal errors close the session and remove it from the registry.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::WriteFailed(_) | Self::ReadFailed(_) | Self::Protocol(_)
        )
    }

    /// Whether a caller may reasonably try the same call again.
    ///
    /// Only used by the opt-in helpers in [`crate::retry`].
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ConnectFailed { .. } | Self::Timeout)
    }
}
