//! Two-value call convention
//!
//! Flat functions for callers on the far side of a process or language
//! boundary. Every fallible call returns `(value, Option<error string>)`;
//! when the error is `Some`, the value is meaningless (`0` for handles).
//! All calls go through [`ClientRegistry::global`].

use tracing::debug;

use crate::error::ClientError;
use crate::registry::ClientRegistry;
use crate::session::SessionHandle;

/// Handle value returned when `new_client` fails
pub const INVALID_HANDLE: i64 = 0;

fn to_handle(handle: i64) -> Result<SessionHandle, ClientError> {
    match u64::try_from(handle) {
        Ok(raw) if raw != 0 => Ok(SessionHandle::from_raw(raw)),
        _ => Err(ClientError::InvalidHandle(SessionHandle::INVALID)),
    }
}

/// Connect to `address` (`host:port`) and return a session handle
pub fn new_client(address: &str) -> (i64, Option<String>) {
    let registry = ClientRegistry::global();
    match registry.create(address) {
        Ok(handle) => match i64::try_from(handle.as_u64()) {
            Ok(raw) => (raw, None),
            Err(_) => {
                registry.close(handle);
                (INVALID_HANDLE, Some("session handle space exhausted".to_string()))
            }
        },
        Err(e) => (INVALID_HANDLE, Some(e.to_string())),
    }
}

/// Add two integers locally, saturating at the `i64` bounds.
///
/// Needs no session; useful to check that the boundary is wired up.
pub fn add(a: i64, b: i64) -> i64 {
    let sum = a.saturating_add(b);
    debug!(a, b, sum, "add");
    sum
}

/// Invoke a named operation on a session.
///
/// `Add` yields the sum, `Ping` yields 0.
pub fn invoke(handle: i64, operation: &str, args: &[i64]) -> (i64, Option<String>) {
    let result = to_handle(handle).and_then(|handle| {
        ClientRegistry::global().invoke_named(handle, operation, args, None)
    });

    match result {
        Ok(reply) => (reply.as_i64(), None),
        Err(e) => (0, Some(e.to_string())),
    }
}

/// Release a session handle. Unknown or invalid handles are ignored.
pub fn close(handle: i64) {
    if let Ok(handle) = to_handle(handle) {
        ClientRegistry::global().close(handle);
    }
}
