//! Wire protocol
//!
//! Frame layout and message body encoding shared by the client transport
//! and the reference server.

mod frame;
mod message;

use thiserror::Error;

pub use frame::*;
pub use message::*;

/// Errors raised while decoding frames or message bodies
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("unsupported protocol version {0}")]
    UnsupportedVersion(u8),

    #[error("unknown frame type {0}")]
    UnknownFrameType(u16),

    #[error("unknown transport protocol id {0}")]
    UnknownProtocol(u16),

    #[error("frame length {len} exceeds limit of {max} bytes")]
    FrameTooLarge { len: usize, max: usize },

    #[error("truncated {what}: need {needed} bytes, have {available}")]
    Truncated {
        what: &'static str,
        needed: usize,
        available: usize,
    },

    #[error("unknown message kind 0x{0:02x}")]
    UnknownMessageKind(u8),

    #[error("unknown operation code {0}")]
    UnknownOperation(u16),

    #[error("unexpected message: {0}")]
    Unexpected(&'static str),

    #[error("failure message is not valid UTF-8")]
    InvalidUtf8,
}

/// Fail with [`ProtocolError::Truncated`] unless `buf` holds `needed` bytes.
pub(crate) fn ensure_remaining(
    buf: &impl bytes::Buf,
    needed: usize,
    what: &'static str,
) -> Result<(), ProtocolError> {
    if buf.remaining() < needed {
        return Err(ProtocolError::Truncated {
            what,
            needed,
            available: buf.remaining(),
        });
    }
    Ok(())
}
