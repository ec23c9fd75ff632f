//! Frame encoding/decoding
//!
//! Every frame on the wire has the layout (all integers little-endian):
//! - Frame header: [Length(4)][Version(1)][Flags(1)][Type(2)][StreamId(4)]
//! - Message frames: [ProtocolId(2)] then, for request/response,
//!   [ConnectionId(8)][RequestId(8)], then the body
//! - Zero padding up to the next multiple of 8 bytes
//!
//! `Length` counts the bytes after the frame header, excluding padding.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::{ensure_remaining, ProtocolError};

/// Frame header size in bytes
pub const FRAME_HEADER_LEN: usize = 12;
/// Transport header size in bytes
pub const TRANSPORT_HEADER_LEN: usize = 2;
/// Request/response correlation header size in bytes
pub const CORRELATION_HEADER_LEN: usize = 16;
/// Frames are padded to this boundary
pub const FRAME_ALIGNMENT: usize = 8;
/// Protocol version written into every frame header
pub const PROTOCOL_VERSION: u8 = 1;

/// Round `len` up to the frame alignment
pub const fn aligned(len: usize) -> usize {
    (len + FRAME_ALIGNMENT - 1) & !(FRAME_ALIGNMENT - 1)
}

/// Frame type field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum FrameType {
    Message = 0,
    Padding = 1,
    ControlClose = 101,
    ControlEndOfStream = 102,
    ControlKeepAlive = 103,
}

impl TryFrom<u16> for FrameType {
    type Error = ProtocolError;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Message),
            1 => Ok(Self::Padding),
            101 => Ok(Self::ControlClose),
            102 => Ok(Self::ControlEndOfStream),
            103 => Ok(Self::ControlKeepAlive),
            other => Err(ProtocolError::UnknownFrameType(other)),
        }
    }
}

/// Transport header protocol id
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum TransportProtocol {
    RequestResponse = 0,
    SingleMessage = 1,
}

impl TryFrom<u16> for TransportProtocol {
    type Error = ProtocolError;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::RequestResponse),
            1 => Ok(Self::SingleMessage),
            other => Err(ProtocolError::UnknownProtocol(other)),
        }
    }
}

/// Fixed 12-byte frame header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub length: u32,
    pub version: u8,
    pub flags: u8,
    pub frame_type: FrameType,
    pub stream_id: u32,
}

impl FrameHeader {
    pub fn new(length: u32, frame_type: FrameType) -> Self {
        Self {
            length,
            version: PROTOCOL_VERSION,
            flags: 0,
            frame_type,
            stream_id: 0,
        }
    }

    pub fn encode(&self, dst: &mut impl BufMut) {
        dst.put_u32_le(self.length);
        dst.put_u8(self.version);
        dst.put_u8(self.flags);
        dst.put_u16_le(self.frame_type as u16);
        dst.put_u32_le(self.stream_id);
    }

    pub fn decode(src: &mut impl Buf) -> Result<Self, ProtocolError> {
        ensure_remaining(&*src, FRAME_HEADER_LEN, "frame header")?;
        let length = src.get_u32_le();
        let version = src.get_u8();
        if version != PROTOCOL_VERSION {
            return Err(ProtocolError::UnsupportedVersion(version));
        }
        let flags = src.get_u8();
        let frame_type = FrameType::try_from(src.get_u16_le())?;
        let stream_id = src.get_u32_le();

        Ok(Self {
            length,
            version,
            flags,
            frame_type,
            stream_id,
        })
    }
}

/// Ties a response to the request that caused it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Correlation {
    /// Session the request was issued on
    pub connection_id: u64,
    /// Per-session request sequence number
    pub request_id: u64,
}

/// Control signals carried in payload-less frames
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlKind {
    Close,
    EndOfStream,
    KeepAlive,
}

impl ControlKind {
    fn frame_type(self) -> FrameType {
        match self {
            Self::Close => FrameType::ControlClose,
            Self::EndOfStream => FrameType::ControlEndOfStream,
            Self::KeepAlive => FrameType::ControlKeepAlive,
        }
    }
}

/// A decoded frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    RequestResponse { correlation: Correlation, body: Bytes },
    SingleMessage { body: Bytes },
    Control(ControlKind),
}

impl Frame {
    /// Build a request/response frame
    pub fn request_response(connection_id: u64, request_id: u64, body: impl Into<Bytes>) -> Self {
        Self::RequestResponse {
            correlation: Correlation {
                connection_id,
                request_id,
            },
            body: body.into(),
        }
    }

    /// Correlation header, if this is a request/response frame
    pub fn correlation(&self) -> Option<Correlation> {
        match self {
            Self::RequestResponse { correlation, .. } => Some(*correlation),
            _ => None,
        }
    }

    /// Message body (empty for control frames)
    pub fn body(&self) -> &[u8] {
        match self {
            Self::RequestResponse { body, .. } | Self::SingleMessage { body } => body,
            Self::Control(_) => &[],
        }
    }

    /// Bytes following the frame header, before padding
    pub fn payload_len(&self) -> usize {
        match self {
            Self::RequestResponse { body, .. } => {
                TRANSPORT_HEADER_LEN + CORRELATION_HEADER_LEN + body.len()
            }
            Self::SingleMessage { body } => TRANSPORT_HEADER_LEN + body.len(),
            Self::Control(_) => 0,
        }
    }

    /// Total bytes on the wire including header and padding
    pub fn encoded_len(&self) -> usize {
        aligned(FRAME_HEADER_LEN + self.payload_len())
    }

    /// Append the encoded frame, padded to the frame alignment
    pub fn encode(&self, dst: &mut BytesMut) {
        let start = dst.len();
        dst.reserve(self.encoded_len());

        let frame_type = match self {
            Self::Control(kind) => kind.frame_type(),
            _ => FrameType::Message,
        };
        FrameHeader::new(self.payload_len() as u32, frame_type).encode(dst);

        match self {
            Self::RequestResponse { correlation, body } => {
                dst.put_u16_le(TransportProtocol::RequestResponse as u16);
                dst.put_u64_le(correlation.connection_id);
                dst.put_u64_le(correlation.request_id);
                dst.extend_from_slice(body);
            }
            Self::SingleMessage { body } => {
                dst.put_u16_le(TransportProtocol::SingleMessage as u16);
                dst.extend_from_slice(body);
            }
            Self::Control(_) => {}
        }

        let written = dst.len() - start;
        dst.put_bytes(0, aligned(written) - written);
    }

    /// Encode into a standalone buffer
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        self.encode(&mut buf);
        buf.freeze()
    }

    /// Decode the next complete frame from `src`.
    ///
    /// Returns `Ok(None)` when more bytes are needed; consumed bytes
    /// (including padding and skipped padding frames) are removed from `src`.
    pub fn decode(src: &mut BytesMut, max_len: usize) -> Result<Option<Self>, ProtocolError> {
        loop {
            if src.len() < FRAME_HEADER_LEN {
                return Ok(None);
            }

            let header = FrameHeader::decode(&mut &src[..FRAME_HEADER_LEN])?;
            let len = header.length as usize;
            if len > max_len {
                return Err(ProtocolError::FrameTooLarge { len, max: max_len });
            }

            let total = aligned(FRAME_HEADER_LEN + len);
            if src.len() < total {
                src.reserve(total - src.len());
                return Ok(None);
            }

            let mut payload = src.split_to(total).freeze();
            payload.advance(FRAME_HEADER_LEN);
            payload.truncate(len);

            return match header.frame_type {
                FrameType::Padding => continue,
                FrameType::Message => Self::decode_message(payload).map(Some),
                FrameType::ControlClose => Ok(Some(Self::Control(ControlKind::Close))),
                FrameType::ControlEndOfStream => Ok(Some(Self::Control(ControlKind::EndOfStream))),
                FrameType::ControlKeepAlive => Ok(Some(Self::Control(ControlKind::KeepAlive))),
            };
        }
    }

    fn decode_message(mut payload: Bytes) -> Result<Self, ProtocolError> {
        ensure_remaining(&payload, TRANSPORT_HEADER_LEN, "transport header")?;
        match TransportProtocol::try_from(payload.get_u16_le())? {
            TransportProtocol::RequestResponse => {
                ensure_remaining(&payload, CORRELATION_HEADER_LEN, "correlation header")?;
                let connection_id = payload.get_u64_le();
                let request_id = payload.get_u64_le();
                Ok(Self::request_response(connection_id, request_id, payload))
            }
            TransportProtocol::SingleMessage => Ok(Self::SingleMessage { body: payload }),
        }
    }
}
