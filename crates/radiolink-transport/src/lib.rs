//! Transport implementations for radiolink.
//!
//! This crate provides the serial-port implementation of the
//! [`Transport`](radiolink_core::Transport) trait from `radiolink-core`.
//! Base controllers attach over a USB serial adapter or a native RS-232 port
//! and speak 8N1 with no flow control.
//!
//! # Example
//!
//! ```no_run
//! use radiolink_transport::SerialTransport;
//! use radiolink_core::transport::Transport;
//! use std::time::Duration;
//!
//! # async fn example() -> radiolink_core::Result<()> {
//! let mut transport = SerialTransport::open("/dev/ttyUSB0", 38400).await?;
//!
//! // Ask the controller for its static status.
//! transport.send(b">T\r\n").await?;
//!
//! let mut buf = [0u8; 256];
//! let n = transport.receive(&mut buf, Duration::from_secs(1)).await?;
//! # Ok(())
//! # }
//! ```

pub mod serial;

pub use serial::{FlowControl, SerialConfig, SerialTransport};
