//! radiolink-test-harness: mock transports for testing the radiolink
//! protocol engine and session without a base controller attached.
//!
//! [`MockTransport`] plays back scripted controller output and records what
//! the host wrote. [`MockHandle`] keeps access to both after the transport
//! has been moved into a session.

pub mod mock_serial;

pub use mock_serial::{MockHandle, MockTransport};
