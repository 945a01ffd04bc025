//! Error types for radiolink.
//!
//! All fallible operations across the workspace return [`Result<T>`], which
//! uses [`Error`] as the error type. Transport-layer, protocol-layer,
//! configuration and supervision failures are all captured here.
//!
//! Decode-level problems (garbled bytes, unparseable numeric fields) are not
//! errors: the frame codec absorbs them and produces a best-effort frame.

use crate::types::AbortReason;

/// The error type for all radiolink operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A transport-level error (serial port, USB adapter).
    #[error("transport error: {0}")]
    Transport(String),

    /// The serial device could not be opened.
    #[error("device unavailable: {0}")]
    DeviceUnavailable(String),

    /// A protocol-level error (unexpected reply, wrong opcode).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A status payload was too short for the report it claims to carry.
    #[error("incomplete {kind} status: need {needed} fields, got {got}")]
    Incomplete {
        kind: &'static str,
        needed: usize,
        got: usize,
    },

    /// A channel number with no wire letter (only 0..=25 are valid).
    #[error("invalid channel: {0}")]
    InvalidChannel(u8),

    /// An invalid parameter was passed to a command builder.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// Device or session configuration is missing or malformed.
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    /// The link supervisor tore the session down.
    #[error("link aborted: {0}")]
    LinkAborted(AbortReason),

    /// Timed out waiting for data from the controller.
    #[error("timeout waiting for response")]
    Timeout,

    /// No connection to the controller has been established.
    #[error("not connected")]
    NotConnected,

    /// The connection to the controller was lost unexpectedly.
    #[error("connection lost")]
    ConnectionLost,

    /// An underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A convenience `Result` alias using [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;
