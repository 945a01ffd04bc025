//! Session event types.
//!
//! Events are emitted by the IO task through a [`tokio::sync::broadcast`]
//! channel. Monitors and loggers subscribe to them to watch the link without
//! touching the transport.

use radiolink_core::{AbortReason, Address, LinkState};
use radiolink_protocol::{Frame, StatusReport};

/// An event emitted while a session runs.
///
/// Subscribe via [`crate::Session::subscribe()`]. Delivery is best effort:
/// a slow subscriber may miss events when the channel fills up.
#[derive(Debug, Clone)]
pub enum LinkEvent {
    /// A complete line arrived from the controller (lossily decoded).
    LineReceived { line: String },

    /// A received line was classified.
    FrameDecoded(Frame),

    /// A node answered a status request.
    StatusReport {
        /// Node that sent the report.
        from: Address,
        report: StatusReport,
    },

    /// A command was written to the transport.
    CommandSent {
        /// Wire text without the line terminator.
        line: String,
    },

    /// The supervisor moved the link to a different state.
    HealthChanged {
        state: LinkState,
        consecutive_bad_count: u32,
    },

    /// The session is being torn down.
    Aborted(AbortReason),
}
