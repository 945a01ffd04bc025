//! SessionBuilder -- fluent builder for starting a [`Session`].
//!
//! Separates configuration from construction so that callers can choose the
//! device, cadence, tolerances and choreography before the serial port is
//! opened.
//!
//! # Example
//!
//! ```no_run
//! use radiolink_session::{DeviceSpec, RecoveryPolicy, SessionBuilder};
//! use std::time::Duration;
//!
//! # async fn example() -> radiolink_core::Result<()> {
//! let device: DeviceSpec = "/dev/ttyUSB0:38400".parse()?;
//! let session = SessionBuilder::new()
//!     .device(device)
//!     .step_interval(Duration::from_secs(2))
//!     .recovery_policy(RecoveryPolicy::tolerate_busy())
//!     .build()
//!     .await?;
//! session.wait().await?;
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use radiolink_core::error::{Error, Result};
use radiolink_core::transport::Transport;
use radiolink_protocol::protocol::ResetStyle;
use radiolink_transport::SerialTransport;
use tokio::sync::broadcast;

use crate::config::DeviceSpec;
use crate::events::LinkEvent;
use crate::sequencer::SequencePlan;
use crate::session::{Session, SessionConfig};
use crate::supervisor::RecoveryPolicy;

/// Fluent builder for [`Session`].
///
/// Defaults: 1 s steps, 2 s settle time, 10 bad frames tolerated, 60 s
/// activity timeout enforced after 20 steps, only error code 5 recoverable,
/// short reset, 100 ms reads and the default [`SequencePlan`].
#[derive(Debug, Clone, Default)]
pub struct SessionBuilder {
    device: Option<DeviceSpec>,
    config: SessionConfig,
    event_tx: Option<broadcast::Sender<LinkEvent>>,
}

impl SessionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serial device to open in [`build()`](Self::build).
    pub fn device(mut self, device: DeviceSpec) -> Self {
        self.device = Some(device);
        self
    }

    /// Time between sequencer steps (default: 1 s).
    pub fn step_interval(mut self, interval: Duration) -> Self {
        self.config.step_interval = interval;
        self
    }

    /// Wait between reset and activation (default: 2 s).
    pub fn settle_time(mut self, settle: Duration) -> Self {
        self.config.settle_time = settle;
        self
    }

    /// Consecutive bad frames tolerated before aborting (default: 10).
    pub fn bad_frame_limit(mut self, limit: u32) -> Self {
        self.config.bad_frame_limit = limit;
        self
    }

    /// Longest silence from the controller before aborting (default: 60 s).
    pub fn activity_timeout(mut self, timeout: Duration) -> Self {
        self.config.activity_timeout = timeout;
        self
    }

    /// Steps to run before the activity timeout applies (default: 20).
    pub fn grace_steps(mut self, steps: u64) -> Self {
        self.config.grace_steps = steps;
        self
    }

    pub fn recovery_policy(mut self, policy: RecoveryPolicy) -> Self {
        self.config.recovery_policy = policy;
        self
    }

    pub fn reset_style(mut self, style: ResetStyle) -> Self {
        self.config.reset_style = style;
        self
    }

    /// Timeout for one transport read (default: 100 ms).
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.config.read_timeout = timeout;
        self
    }

    pub fn plan(mut self, plan: SequencePlan) -> Self {
        self.config.plan = plan;
        self
    }

    /// Publish session events on `tx` instead of a fresh channel.
    ///
    /// Receivers subscribed before `build` see every event, including the
    /// startup reset.
    pub fn events(mut self, tx: broadcast::Sender<LinkEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    /// The configuration the session will run with.
    pub fn session_config(&self) -> &SessionConfig {
        &self.config
    }

    fn validate(&self) -> Result<()> {
        if self.config.step_interval.is_zero() {
            return Err(Error::ConfigInvalid("step interval must be non-zero".into()));
        }
        if self.config.read_timeout.is_zero() {
            return Err(Error::ConfigInvalid("read timeout must be non-zero".into()));
        }
        if self.config.activity_timeout < self.config.step_interval {
            return Err(Error::ConfigInvalid(format!(
                "activity timeout {:?} is shorter than the step interval {:?}",
                self.config.activity_timeout, self.config.step_interval
            )));
        }
        self.config.plan.validate()
    }

    /// Start a session on a caller-provided transport.
    ///
    /// This is the entry point for tests (pass a `MockTransport` from
    /// `radiolink-test-harness`) and for callers managing the transport
    /// themselves.
    pub async fn build_with_transport(self, transport: Box<dyn Transport>) -> Result<Session> {
        self.validate()?;
        Ok(self.start(transport))
    }

    /// Open the configured serial device and start a session on it.
    ///
    /// The configuration is validated before the device is touched.
    pub async fn build(self) -> Result<Session> {
        self.validate()?;
        let device = self
            .device
            .as_ref()
            .ok_or_else(|| Error::ConfigInvalid("a serial device is required".into()))?;
        let transport = SerialTransport::open(&device.path, device.baud_rate).await?;
        Ok(self.start(Box::new(transport)))
    }

    fn start(self, transport: Box<dyn Transport>) -> Session {
        match self.event_tx {
            Some(event_tx) => Session::start_with_events(transport, self.config, event_tx),
            None => Session::start(transport, self.config),
        }
    }
}
