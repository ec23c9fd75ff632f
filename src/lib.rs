//! zbc-client - handle-based TCP client sessions
//!
//! A caller creates a session from a `host:port` address and gets back an
//! opaque handle. Requests (`Add`, `Ping`) are invoked through the handle
//! over a framed request/response protocol, and `close` releases it.
//!
//! The core is blocking; [`nonblocking::AsyncClient`] wraps it for tokio
//! callers and [`boundary`] flattens it into `(value, error)` pairs.

pub mod boundary;
pub mod config;
pub mod error;
pub mod metrics;
pub mod nonblocking;
pub mod protocol;
pub mod registry;
pub mod retry;
pub mod server;
pub mod session;
pub mod transport;
pub mod util;

pub use config::Config;
pub use error::{ClientError, Result};
pub use nonblocking::AsyncClient;
pub use registry::ClientRegistry;
pub use server::Server;
pub use session::{Session, SessionHandle, SessionInfo, SessionPhase};

/// Crate version for display
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
