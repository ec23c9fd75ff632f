//! Request dispatcher
//!
//! Turns a request body into the response body the server sends back.

use tracing::trace;

use crate::protocol::{
    peek_operation, ProtocolError, Reply, Request, Response, FAILURE_MALFORMED,
    FAILURE_OVERFLOW, FAILURE_UNSUPPORTED,
};

/// Answers `Add` and `Ping` requests
#[derive(Debug, Default, Clone, Copy)]
pub struct RequestDispatcher;

impl RequestDispatcher {
    pub fn new() -> Self {
        Self
    }

    /// Dispatch an encoded request body. Never fails: bad requests get a
    /// failure response.
    pub fn dispatch(&self, body: &[u8]) -> Response {
        match Request::decode(body) {
            Ok(request) => self.execute(request),
            Err(e) => {
                let operation = peek_operation(body).unwrap_or(0);
                let code = match e {
                    ProtocolError::UnknownOperation(_) => FAILURE_UNSUPPORTED,
                    _ => FAILURE_MALFORMED,
                };
                trace!(operation, code, error = %e, "Rejecting request");
                Response::failure(operation, code, e.to_string())
            }
        }
    }

    /// Run a decoded request
    pub fn execute(&self, request: Request) -> Response {
        match request {
            Request::Add { a, b } => match a.checked_add(b) {
                Some(sum) => Response::Success(Reply::Sum(sum)),
                None => Response::failure(
                    request.operation() as u16,
                    FAILURE_OVERFLOW,
                    format!("{} + {} overflows i64", a, b),
                ),
            },
            Request::Ping => Response::Success(Reply::Pong),
        }
    }
}
