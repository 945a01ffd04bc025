//! radiolink-core: core traits, types, and error definitions for radiolink.
//!
//! This crate defines the pieces every other radiolink crate shares: the
//! addressing and opcode vocabulary of the radio base controller, the
//! byte-level [`Transport`] abstraction, and the workspace-wide error type.
//!
//! # Key types
//!
//! - [`Address`] / [`CommandCode`] -- who a command is for and what it does
//! - [`Transport`] -- byte-level communication channel
//! - [`LinkState`] / [`AbortReason`] -- link supervision outcomes
//! - [`Error`] / [`Result`] -- error handling

pub mod error;
pub mod transport;
pub mod types;

pub use error::{Error, Result};
pub use transport::Transport;
pub use types::*;
