//! Link supervision.
//!
//! [`LinkSupervisor`] watches every decoded frame and decides whether the
//! link is still usable. It is owned by the IO task, the only place frames
//! are observed, and publishes its [`LinkHealth`] for the rest of the session.
//!
//! ```text
//!              bad (count <= limit)
//!   Healthy ---------------------------> Degraded
//!      ^  \                                 |
//!      |   \ bad (count > limit)            | any other frame
//!      |    \ fatal error frame             v
//!      |     `-----------------> Aborted  Healthy
//! ```
//!
//! `Aborted` is terminal: once reached, every later observation repeats the
//! same verdict.

use std::time::Duration;

use radiolink_core::{AbortReason, LinkState};
use radiolink_protocol::Frame;
use radiolink_protocol::catalog;
use tokio::time::Instant;
use tracing::{debug, error, warn};

/// Default number of consecutive bad frames tolerated before aborting.
pub const DEFAULT_BAD_FRAME_LIMIT: u32 = 10;

/// "Newline": the controller saw an empty command line.
const NEWLINE_ERROR: u32 = 5;
/// Controller error code for a busy radio.
const BUSY_ERROR: u32 = 2;

/// Which controller error codes leave the link usable.
///
/// Any `<-code/state` frame whose code is not in the set aborts the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryPolicy {
    recoverable: Vec<u32>,
}

impl RecoveryPolicy {
    /// Only "Newline" (5) is recoverable. This is the default.
    pub fn strict() -> Self {
        RecoveryPolicy {
            recoverable: vec![NEWLINE_ERROR],
        }
    }

    /// "Newline" (5) and "Busy" (2) are recoverable.
    pub fn tolerate_busy() -> Self {
        RecoveryPolicy {
            recoverable: vec![NEWLINE_ERROR, BUSY_ERROR],
        }
    }

    /// An explicit set of recoverable codes.
    pub fn with_codes(codes: &[u32]) -> Self {
        RecoveryPolicy {
            recoverable: codes.to_vec(),
        }
    }

    pub fn is_recoverable(&self, code: u32) -> bool {
        self.recoverable.contains(&code)
    }
}

impl Default for RecoveryPolicy {
    fn default() -> Self {
        Self::strict()
    }
}

/// Snapshot of link health, published after every observed frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkHealth {
    pub state: LinkState,
    pub consecutive_bad_count: u32,
    /// When the last non-bad frame arrived. `None` until the first one.
    pub last_activity: Option<Instant>,
    /// When the last frame of any kind arrived, bad frames included.
    pub last_frame: Option<Instant>,
}

impl LinkHealth {
    pub fn new() -> Self {
        LinkHealth {
            state: LinkState::Healthy,
            consecutive_bad_count: 0,
            last_activity: None,
            last_frame: None,
        }
    }

    /// Time since the last frame of any kind, or since `started` if nothing
    /// has been heard yet.
    pub fn idle_for(&self, started: Instant, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_frame.unwrap_or(started))
    }
}

impl Default for LinkHealth {
    fn default() -> Self {
        Self::new()
    }
}

/// Outcome of observing one frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Link is healthy.
    Continue,
    /// Link is degraded but within tolerance.
    Warn,
    /// Tear the session down.
    Abort(AbortReason),
}

/// The link supervision state machine.
#[derive(Debug)]
pub struct LinkSupervisor {
    health: LinkHealth,
    bad_frame_limit: u32,
    policy: RecoveryPolicy,
    abort_reason: Option<AbortReason>,
}

impl LinkSupervisor {
    pub fn new(bad_frame_limit: u32, policy: RecoveryPolicy) -> Self {
        LinkSupervisor {
            health: LinkHealth::new(),
            bad_frame_limit,
            policy,
            abort_reason: None,
        }
    }

    pub fn health(&self) -> &LinkHealth {
        &self.health
    }

    pub fn state(&self) -> LinkState {
        self.health.state
    }

    /// Feed one decoded frame observed at `now`.
    pub fn observe(&mut self, frame: &Frame, now: Instant) -> Verdict {
        if let Some(reason) = &self.abort_reason {
            return Verdict::Abort(reason.clone());
        }
        self.health.last_frame = Some(now);

        match frame {
            Frame::Bad { raw } => {
                self.health.consecutive_bad_count += 1;
                let count = self.health.consecutive_bad_count;
                if count > self.bad_frame_limit {
                    error!(count, limit = self.bad_frame_limit, "bad frame limit exceeded");
                    return self.abort(AbortReason::BadFrames { count });
                }
                warn!(count, raw = %raw, "bad frame");
                self.health.state = LinkState::Degraded;
                Verdict::Warn
            }
            Frame::Error { code, state } if !self.policy.is_recoverable(*code) => {
                error!(
                    code,
                    state,
                    error = catalog::error_name(*code),
                    radio_state = catalog::radio_state_name(*state),
                    "controller reported unrecoverable error"
                );
                self.abort(AbortReason::ControllerError {
                    code: *code,
                    state: *state,
                })
            }
            _ => {
                if self.health.state == LinkState::Degraded {
                    debug!(
                        after = self.health.consecutive_bad_count,
                        "link recovered"
                    );
                }
                self.health.consecutive_bad_count = 0;
                self.health.last_activity = Some(now);
                self.health.state = LinkState::Healthy;
                Verdict::Continue
            }
        }
    }

    fn abort(&mut self, reason: AbortReason) -> Verdict {
        self.health.state = LinkState::Aborted;
        self.abort_reason = Some(reason.clone());
        Verdict::Abort(reason)
    }
}

/// Decide whether the controller has gone quiet for too long.
///
/// Measured from the last frame of any kind, or from `started` if no frame
/// was ever received. Bad frames keep the link alive here; they are bounded
/// by the bad-frame limit instead.
pub fn check_activity(
    health: &LinkHealth,
    started: Instant,
    now: Instant,
    timeout: Duration,
) -> Option<AbortReason> {
    let idle = health.idle_for(started, now);
    if idle > timeout {
        Some(AbortReason::ActivityTimeout { idle })
    } else {
        None
    }
}
