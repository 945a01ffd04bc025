//! Mock serial transport for deterministic session tests.
//!
//! [`MockTransport`] implements [`Transport`] in one of two modes:
//!
//! - **scripted**: every `send()` must match the next pre-loaded expectation,
//!   whose response is then returned by `receive()`.
//! - **permissive**: any `send()` is accepted and logged. Controller output
//!   is queued with [`MockHandle::push_inbound`].
//!
//! Unsolicited inbound chunks are delivered in both modes, after any pending
//! scripted response.
//!
//! # Example
//!
//! ```
//! use radiolink_test_harness::MockTransport;
//!
//! let mut mock = MockTransport::new();
//! // When the host sends SET_TIME to A1, the controller acknowledges.
//! mock.expect(b">A1:5:57,48,87.\r\n", b"<+\r\n");
//! ```

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use radiolink_core::error::{Error, Result};
use radiolink_core::transport::Transport;

#[derive(Debug, Clone)]
struct Expectation {
    request: Vec<u8>,
    response: Vec<u8>,
}

#[derive(Debug, Default)]
struct Shared {
    sent_log: Vec<Vec<u8>>,
    inbound: VecDeque<Vec<u8>>,
    connected: bool,
}

/// Shared view of a [`MockTransport`] that outlives moving it into a session.
#[derive(Debug, Clone)]
pub struct MockHandle {
    shared: Arc<Mutex<Shared>>,
}

impl MockHandle {
    /// Queue bytes the "controller" emits on its own.
    ///
    /// Each call is returned by a separate `receive()`, so a line can be
    /// split across several pushes to exercise reassembly.
    pub fn push_inbound(&self, data: &[u8]) {
        lock(&self.shared).inbound.push_back(data.to_vec());
    }

    /// Every buffer passed to `send()` so far, in order.
    pub fn sent_data(&self) -> Vec<Vec<u8>> {
        lock(&self.shared).sent_log.clone()
    }

    /// Number of queued inbound chunks not yet received.
    pub fn pending_inbound(&self) -> usize {
        lock(&self.shared).inbound.len()
    }

    /// Simulate unplugging the device.
    ///
    /// Further `receive()` calls fail with [`Error::ConnectionLost`].
    pub fn disconnect(&self) {
        lock(&self.shared).connected = false;
    }
}

/// A mock [`Transport`] for testing without hardware.
#[derive(Debug)]
pub struct MockTransport {
    expectations: VecDeque<Expectation>,
    permissive: bool,
    pending_response: Option<Vec<u8>>,
    response_cursor: usize,
    closed: bool,
    shared: Arc<Mutex<Shared>>,
}

impl MockTransport {
    /// Create a scripted mock transport in the connected state.
    pub fn new() -> Self {
        MockTransport {
            expectations: VecDeque::new(),
            permissive: false,
            pending_response: None,
            response_cursor: 0,
            closed: false,
            shared: Arc::new(Mutex::new(Shared {
                connected: true,
                ..Shared::default()
            })),
        }
    }

    /// Create a mock that accepts any outbound data.
    pub fn permissive() -> Self {
        MockTransport {
            permissive: true,
            ..Self::new()
        }
    }

    /// Add an expected request/response pair.
    ///
    /// In permissive mode expectations are ignored.
    pub fn expect(&mut self, request: &[u8], response: &[u8]) {
        self.expectations.push_back(Expectation {
            request: request.to_vec(),
            response: response.to_vec(),
        });
    }

    /// Queue unsolicited inbound bytes. See [`MockHandle::push_inbound`].
    pub fn push_inbound(&mut self, data: &[u8]) {
        lock(&self.shared).inbound.push_back(data.to_vec());
    }

    /// A handle sharing this transport's logs and inbound queue.
    pub fn handle(&self) -> MockHandle {
        MockHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// All data sent through this transport.
    pub fn sent_data(&self) -> Vec<Vec<u8>> {
        lock(&self.shared).sent_log.clone()
    }

    /// Number of expectations that have not yet been consumed.
    pub fn remaining_expectations(&self) -> usize {
        self.expectations.len()
    }

    /// Set the connected state. When `false`, `send()` and `receive()`
    /// return [`Error::NotConnected`].
    pub fn set_connected(&mut self, connected: bool) {
        self.closed = !connected;
    }

    fn take_response(&mut self, buf: &mut [u8]) -> Option<usize> {
        let response = self.pending_response.as_ref()?;
        let remaining = &response[self.response_cursor..];
        if remaining.is_empty() {
            self.pending_response = None;
            self.response_cursor = 0;
            return None;
        }
        let n = remaining.len().min(buf.len());
        buf[..n].copy_from_slice(&remaining[..n]);
        self.response_cursor += n;
        if self.response_cursor >= response.len() {
            self.pending_response = None;
            self.response_cursor = 0;
        }
        Some(n)
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

fn lock(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    // A panicking test thread must not hide the log from other assertions.
    shared.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, data: &[u8]) -> Result<()> {
        if self.closed {
            return Err(Error::NotConnected);
        }
        lock(&self.shared).sent_log.push(data.to_vec());

        if self.permissive {
            return Ok(());
        }

        match self.expectations.pop_front() {
            Some(expectation) => {
                if data != expectation.request.as_slice() {
                    return Err(Error::Protocol(format!(
                        "unexpected send data: expected {:?}, got {:?}",
                        String::from_utf8_lossy(&expectation.request),
                        String::from_utf8_lossy(data)
                    )));
                }
                self.pending_response = Some(expectation.response);
                self.response_cursor = 0;
                Ok(())
            }
            None => Err(Error::Protocol(
                "no more expectations in mock transport".into(),
            )),
        }
    }

    async fn receive(&mut self, buf: &mut [u8], _timeout: Duration) -> Result<usize> {
        if self.closed {
            return Err(Error::NotConnected);
        }
        if let Some(n) = self.take_response(buf) {
            return Ok(n);
        }

        let mut shared = lock(&self.shared);
        if !shared.connected {
            return Err(Error::ConnectionLost);
        }
        match shared.inbound.pop_front() {
            Some(mut chunk) => {
                let n = chunk.len().min(buf.len());
                buf[..n].copy_from_slice(&chunk[..n]);
                if n < chunk.len() {
                    shared.inbound.push_front(chunk.split_off(n));
                }
                Ok(n)
            }
            None => Err(Error::Timeout),
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.closed = true;
        self.pending_response = None;
        self.response_cursor = 0;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        !self.closed && lock(&self.shared).connected
    }
}
