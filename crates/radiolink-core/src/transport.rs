//! Transport trait for base-controller communication.
//!
//! The [`Transport`] trait abstracts over the physical link to the radio base
//! controller. The production implementation is the serial port in
//! `radiolink-transport`; tests use `MockTransport` from
//! `radiolink-test-harness`.
//!
//! The protocol engine never touches a serial port directly. It writes whole
//! encoded commands with [`Transport::send`] and pulls raw bytes with
//! [`Transport::receive`], reassembling lines itself.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::Result;

/// Asynchronous byte-level transport to a base controller.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send raw bytes to the controller.
    ///
    /// Implementations should not return until all bytes have been handed
    /// to the underlying device.
    async fn send(&mut self, data: &[u8]) -> Result<()>;

    /// Receive bytes from the controller into the provided buffer.
    ///
    /// Returns the number of bytes read. Waits up to `timeout` for data;
    /// returns [`Error::Timeout`](crate::error::Error::Timeout) if nothing
    /// arrives within the deadline.
    async fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize>;

    /// Close the transport.
    ///
    /// Subsequent `send()` and `receive()` calls should return
    /// [`Error::NotConnected`](crate::error::Error::NotConnected).
    async fn close(&mut self) -> Result<()>;

    /// Check whether the transport is currently connected.
    fn is_connected(&self) -> bool;
}
