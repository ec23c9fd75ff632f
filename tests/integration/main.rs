//! Integration tests against the reference server

mod async_tests;
mod boundary_tests;
mod common;
mod session_tests;
