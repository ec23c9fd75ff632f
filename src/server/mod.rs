//! Reference server
//!
//! A tokio TCP responder speaking the client's framing, used by the CLI's
//! `serve` command and the integration tests.

mod dispatcher;
mod handler;
mod listener;

pub use dispatcher::RequestDispatcher;
pub use handler::ConnectionHandler;
pub use listener::Server;
