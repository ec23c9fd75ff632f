//! Message body encoding/decoding
//!
//! Body layout inside a request/response frame:
//! - Request: [Kind=0x00][Op(2)][Args]
//! - Success: [Kind=0x01][Op(2)][Result]
//! - Failure: [Kind=0xFF][Op(2)][Code(2)][MsgLen(2)][Msg(N)]

use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::{ensure_remaining, ProtocolError};
use crate::error::ClientError;

/// Message kinds
pub const KIND_REQUEST: u8 = 0x00;
pub const KIND_SUCCESS: u8 = 0x01;
pub const KIND_FAILURE: u8 = 0xFF;

/// Failure codes returned by the remote end
pub const FAILURE_OVERFLOW: u16 = 1;
pub const FAILURE_UNSUPPORTED: u16 = 2;
pub const FAILURE_MALFORMED: u16 = 3;

/// Operations understood by the protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum Operation {
    Add = 1,
    Ping = 2,
}

impl Operation {
    /// Look up an operation by name, ignoring case
    pub fn from_name(name: &str) -> Option<Self> {
        if name.eq_ignore_ascii_case("add") {
            Some(Self::Add)
        } else if name.eq_ignore_ascii_case("ping") {
            Some(Self::Ping)
        } else {
            None
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Add => "Add",
            Self::Ping => "Ping",
        }
    }

    /// Number of integer arguments the operation takes
    pub fn arity(self) -> usize {
        match self {
            Self::Add => 2,
            Self::Ping => 0,
        }
    }
}

impl TryFrom<u16> for Operation {
    type Error = ProtocolError;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Add),
            2 => Ok(Self::Ping),
            other => Err(ProtocolError::UnknownOperation(other)),
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Operation code of an encoded body, if it is long enough to carry one
pub fn peek_operation(body: &[u8]) -> Option<u16> {
    body.get(1..3).map(|op| u16::from_le_bytes([op[0], op[1]]))
}

/// A request sent by a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request {
    Add { a: i64, b: i64 },
    Ping,
}

impl Request {
    /// Build a request from an operation name and integer arguments
    pub fn from_parts(name: &str, args: &[i64]) -> Result<Self, ClientError> {
        let operation = Operation::from_name(name)
            .ok_or_else(|| ClientError::UnknownOperation(name.to_string()))?;

        if args.len() != operation.arity() {
            return Err(ClientError::InvalidArguments {
                operation: operation.name(),
                expected: operation.arity(),
                got: args.len(),
            });
        }

        Ok(match operation {
            Operation::Add => Self::Add {
                a: args[0],
                b: args[1],
            },
            Operation::Ping => Self::Ping,
        })
    }

    pub fn operation(&self) -> Operation {
        match self {
            Self::Add { .. } => Operation::Add,
            Self::Ping => Operation::Ping,
        }
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(19);
        buf.put_u8(KIND_REQUEST);
        buf.put_u16_le(self.operation() as u16);
        if let Self::Add { a, b } = self {
            buf.put_i64_le(*a);
            buf.put_i64_le(*b);
        }
        buf.freeze()
    }

    pub fn decode(mut body: &[u8]) -> Result<Self, ProtocolError> {
        ensure_remaining(&body, 3, "request header")?;
        let kind = body.get_u8();
        if kind != KIND_REQUEST {
            return Err(ProtocolError::Unexpected("expected a request"));
        }

        match Operation::try_from(body.get_u16_le())? {
            Operation::Add => {
                ensure_remaining(&body, 16, "add arguments")?;
                let a = body.get_i64_le();
                let b = body.get_i64_le();
                Ok(Self::Add { a, b })
            }
            Operation::Ping => Ok(Self::Ping),
        }
    }
}

/// Successful result of an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    Sum(i64),
    Pong,
}

impl Reply {
    pub fn operation(&self) -> Operation {
        match self {
            Self::Sum(_) => Operation::Add,
            Self::Pong => Operation::Ping,
        }
    }

    /// Integer view used by the boundary layer; `Pong` maps to 0
    pub fn as_i64(&self) -> i64 {
        match self {
            Self::Sum(sum) => *sum,
            Self::Pong => 0,
        }
    }
}

/// A response body as sent by the remote end
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    Success(Reply),
    Failure {
        operation: u16,
        code: u16,
        message: String,
    },
}

impl Response {
    pub fn failure(operation: u16, code: u16, message: impl Into<String>) -> Self {
        Self::Failure {
            operation,
            code,
            message: message.into(),
        }
    }

    /// Map a failure reply to [`ClientError::RemoteError`]
    pub fn into_result(self) -> Result<Reply, ClientError> {
        match self {
            Self::Success(reply) => Ok(reply),
            Self::Failure { code, message, .. } => Err(ClientError::RemoteError { code, message }),
        }
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(16);
        match self {
            Self::Success(reply) => {
                buf.put_u8(KIND_SUCCESS);
                buf.put_u16_le(reply.operation() as u16);
                if let Reply::Sum(sum) = reply {
                    buf.put_i64_le(*sum);
                }
            }
            Self::Failure {
                operation,
                code,
                message,
            } => {
                // Messages longer than a u16 length field are cut at a char boundary
                let mut end = message.len().min(u16::MAX as usize);
                while !message.is_char_boundary(end) {
                    end -= 1;
                }
                buf.put_u8(KIND_FAILURE);
                buf.put_u16_le(*operation);
                buf.put_u16_le(*code);
                buf.put_u16_le(end as u16);
                buf.extend_from_slice(&message.as_bytes()[..end]);
            }
        }
        buf.freeze()
    }

    pub fn decode(mut body: &[u8]) -> Result<Self, ProtocolError> {
        ensure_remaining(&body, 3, "response header")?;
        let kind = body.get_u8();
        let operation = body.get_u16_le();

        match kind {
            KIND_SUCCESS => match Operation::try_from(operation)? {
                Operation::Add => {
                    ensure_remaining(&body, 8, "add result")?;
                    Ok(Self::Success(Reply::Sum(body.get_i64_le())))
                }
                Operation::Ping => Ok(Self::Success(Reply::Pong)),
            },
            KIND_FAILURE => {
                ensure_remaining(&body, 4, "failure header")?;
                let code = body.get_u16_le();
                let len = body.get_u16_le() as usize;
                ensure_remaining(&body, len, "failure message")?;
                let message = std::str::from_utf8(&body[..len])
                    .map_err(|_| ProtocolError::InvalidUtf8)?
                    .to_string();
                Ok(Self::Failure {
                    operation,
                    code,
                    message,
                })
            }
            KIND_REQUEST => Err(ProtocolError::Unexpected("expected a response")),
            other => Err(ProtocolError::UnknownMessageKind(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_add_request() {
        let body = Request::Add { a: 40, b: 2 }.encode();
        assert_eq!(body.len(), 19);
        assert_eq!(body[0], KIND_REQUEST);
        assert_eq!(peek_operation(&body), Some(Operation::Add as u16));
        assert_eq!(i64::from_le_bytes(body[3..11].try_into().unwrap()), 40);
        assert_eq!(i64::from_le_bytes(body[11..19].try_into().unwrap()), 2);
        assert_eq!(Request::decode(&body).unwrap(), Request::Add { a: 40, b: 2 });
    }

    #[test]
    fn test_from_parts() {
        assert_eq!(
            Request::from_parts("ADD", &[-5, 5]).unwrap(),
            Request::Add { a: -5, b: 5 }
        );
        assert_eq!(Request::from_parts("ping", &[]).unwrap(), Request::Ping);
        assert!(matches!(
            Request::from_parts("add", &[1]),
            Err(ClientError::InvalidArguments {
                operation: "Add",
                expected: 2,
                got: 1
            })
        ));
        assert!(matches!(
            Request::from_parts("multiply", &[1, 2]),
            Err(ClientError::UnknownOperation(name)) if name == "multiply"
        ));
    }

    #[test]
    fn test_decode_request_rejects_unknown_operation() {
        let body = [KIND_REQUEST, 0x09, 0x00];
        assert_eq!(
            Request::decode(&body),
            Err(ProtocolError::UnknownOperation(9))
        );
    }

    #[test]
    fn test_decode_request_rejects_short_add() {
        let mut body = Request::Add { a: 1, b: 2 }.encode().to_vec();
        body.truncate(10);
        assert!(matches!(
            Request::decode(&body),
            Err(ProtocolError::Truncated { what: "add arguments", .. })
        ));
    }

    #[test]
    fn test_failure_response() {
        let response = Response::failure(Operation::Add as u16, FAILURE_OVERFLOW, "sum overflows i64");
        let decoded = Response::decode(&response.encode()).unwrap();
        assert_eq!(decoded, response);

        match decoded.into_result() {
            Err(ClientError::RemoteError { code, message }) => {
                assert_eq!(code, FAILURE_OVERFLOW);
                assert_eq!(message, "sum overflows i64");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_success_responses() {
        let sum = Response::Success(Reply::Sum(42)).encode();
        assert_eq!(Response::decode(&sum).unwrap().into_result().unwrap(), Reply::Sum(42));

        let pong = Response::Success(Reply::Pong).encode();
        assert_eq!(pong.len(), 3);
        assert_eq!(Reply::Pong.as_i64(), 0);
        assert_eq!(Response::decode(&pong).unwrap(), Response::Success(Reply::Pong));
    }

    #[test]
    fn test_response_rejects_request_body() {
        let body = Request::Ping.encode();
        assert_eq!(
            Response::decode(&body),
            Err(ProtocolError::Unexpected("expected a response"))
        );
    }
}
