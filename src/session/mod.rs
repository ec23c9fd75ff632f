//! Client sessions
//!
//! Session state, lifecycle and request/response exchange.

mod client;
mod state;

pub use client::Session;
pub use state::{SessionHandle, SessionInfo, SessionPhase, SessionState};
