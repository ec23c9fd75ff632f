//! Session registry
//!
//! Tracks live sessions by handle.

mod manager;

pub use manager::ClientRegistry;
