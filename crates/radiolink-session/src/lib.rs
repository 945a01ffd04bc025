//! radiolink-session: supervised sessions with a radio base controller.
//!
//! A session resets and activates the controller, keeps its clock and
//! channel table set, polls for status on a fixed cadence, and tears itself
//! down when the link goes bad. The pieces:
//!
//! - [`LinkSupervisor`] -- bad-frame counting, fatal error codes, health
//! - [`Sequencer`] -- the step-by-step command choreography
//! - [`Session`] / [`SessionBuilder`] -- the running IO and sequencer tasks
//! - [`LinkEvent`] -- broadcast stream of what the session sees and does
//! - [`DeviceSpec`] -- `path:baud` device configuration

pub mod builder;
pub mod config;
pub mod events;
mod io;
pub mod sequencer;
pub mod session;
pub mod supervisor;

pub use builder::SessionBuilder;
pub use config::{DEVICE_ENV, DeviceSpec};
pub use events::LinkEvent;
pub use sequencer::{Action, SequencePlan, Sequencer};
pub use session::{Session, SessionConfig, reset_controller};
pub use supervisor::{LinkHealth, LinkSupervisor, RecoveryPolicy, Verdict};
