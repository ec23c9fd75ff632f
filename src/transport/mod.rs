//! Transport layer
//!
//! Address parsing and the blocking framed TCP connection.

mod address;
mod connection;

pub use address::{Address, AddressError};
pub use connection::{Transport, TransportCloser};
