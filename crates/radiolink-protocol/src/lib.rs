//! Text protocol engine for radio base controllers.
//!
//! The base controller sits on a serial line and relays commands to nodes on
//! lettered radio channels. This crate provides:
//!
//! - **Frame codec** ([`protocol`]) -- encode addressed commands and decode
//!   inbound lines into [`Frame`]s, leniently.
//! - **Line reassembly** ([`line`]) -- turn serial reads into lines.
//! - **Status decoder** ([`status`]) -- dynamic and static status reports.
//! - **Catalog** ([`catalog`]) -- names for error codes and radio states.
//! - **Command builders** ([`commands`]) -- activation, clock, channel and
//!   status-request commands.
//!
//! # Example
//!
//! ```
//! use radiolink_protocol::protocol::{decode_line, Frame};
//! use radiolink_protocol::status::{decode_status, StatusReport};
//!
//! if let Frame::Node(frame) = decode_line(b"<A1:27798:9:1,1,1,1,1,2,4") {
//!     let report = decode_status(&frame).unwrap();
//!     assert!(matches!(report, StatusReport::Static { version_major: 2, .. }));
//! }
//! ```

pub mod catalog;
pub mod commands;
pub mod line;
pub mod protocol;
pub mod status;

pub use commands::{Command, CommandBuilder, Outbound, StatusKind};
pub use line::LineBuffer;
pub use protocol::{Frame, NodeFrame, ResetStyle, decode_line, encode_command};
pub use status::{StatusReport, decode_status};
