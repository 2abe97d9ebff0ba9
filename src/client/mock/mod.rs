//! Mock transport implementations for testing.
//!
//! This module provides `MockTransport` and pre-built scenarios for testing
//! collectors without a reachable management server.

pub mod scenarios;
mod transport;

pub use transport::{MockTransport, RecordedCall};
