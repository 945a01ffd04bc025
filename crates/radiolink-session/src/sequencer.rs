//! Session choreography.
//!
//! The [`Sequencer`] decides what the host sends and when. A session starts
//! by resetting the controller, waiting for it to settle and activating the
//! host's own radio address. After that one step runs per step interval:
//!
//! | step      | command                                   |
//! |-----------|-------------------------------------------|
//! | 1         | SET_TIME                                  |
//! | 2         | SET_DATE                                  |
//! | 4..=9     | channel plan, one USER0 per step          |
//! | 10..      | polling cycle on `step % 8` (below)       |
//!
//! Polling cycle slots: 0 local dynamic status (`>S`), 1 local static status
//! (`>T`), 2 remote device activation, 3..=6 status requests to the status
//! target, 7 idle.

use std::time::Duration;

use chrono::{DateTime, TimeZone};
use radiolink_core::{Address, Error, MAX_CHANNEL, MAX_PAYLOAD, Result};
use radiolink_protocol::commands::{self, Outbound, StatusKind};
use radiolink_protocol::protocol::ResetStyle;

/// First step of the channel plan.
const CHANNEL_PLAN_START: u64 = 4;
/// First step of the polling cycle.
const POLL_START: u64 = 10;
/// Most channel entries that fit before the polling cycle begins.
pub const MAX_CHANNEL_PLAN: usize = (POLL_START - CHANNEL_PLAN_START) as usize;

/// What the session should do with the transport next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Send(Outbound),
    Pause(Duration),
}

/// Addresses and payloads used by the choreography.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequencePlan {
    /// Channel and node the host activates itself as.
    pub local_channel: u8,
    pub local_node: u8,
    /// `(channel, state)` pairs sent as USER0 to `A1` from step 4.
    pub channels: Vec<(u8, u8)>,
    /// Activation record forwarded for the remote device.
    pub remote_activation: Vec<u8>,
    /// Node polled for status, and where its replies go.
    pub status_target: Address,
    pub status_reply_to: Address,
    /// Report kinds requested in cycle slots 3, 4, 5 and 6.
    pub status_kinds: [u8; 4],
}

impl Default for SequencePlan {
    fn default() -> Self {
        SequencePlan {
            local_channel: 0,
            local_node: 1,
            channels: vec![(0, 2)],
            remote_activation: vec![1, 3, 34, 5, 35, 1],
            status_target: Address {
                channel: 1,
                node: 3,
            },
            status_reply_to: Address {
                channel: 1,
                node: 1,
            },
            status_kinds: [1, 1, 1, 2],
        }
    }
}

impl SequencePlan {
    /// Check that every command the plan produces can be built.
    pub fn validate(&self) -> Result<()> {
        if self.channels.len() > MAX_CHANNEL_PLAN {
            return Err(Error::ConfigInvalid(format!(
                "channel plan has {} entries, at most {MAX_CHANNEL_PLAN} fit before polling starts",
                self.channels.len()
            )));
        }
        if let Some((channel, _)) = self.channels.iter().find(|(c, _)| *c > MAX_CHANNEL) {
            return Err(Error::InvalidChannel(*channel));
        }
        if self.local_channel > MAX_CHANNEL {
            return Err(Error::InvalidChannel(self.local_channel));
        }
        if self.remote_activation.len() > MAX_PAYLOAD {
            return Err(Error::ConfigInvalid(format!(
                "remote activation record of {} bytes exceeds {MAX_PAYLOAD}",
                self.remote_activation.len()
            )));
        }
        commands::cmd_request_status(self.status_target, self.status_reply_to, 0)?;
        Ok(())
    }
}

/// Produces the command stream for one session.
#[derive(Debug)]
pub struct Sequencer {
    plan: SequencePlan,
    reset_style: ResetStyle,
    settle_time: Duration,
    step: u64,
}

impl Sequencer {
    pub fn new(plan: SequencePlan, reset_style: ResetStyle, settle_time: Duration) -> Self {
        Sequencer {
            plan,
            reset_style,
            settle_time,
            step: 0,
        }
    }

    /// Reset, settle, activate.
    pub fn startup(&self) -> Result<Vec<Action>> {
        let activate = commands::cmd_activate(self.plan.local_channel, self.plan.local_node)?;
        Ok(vec![
            Action::Send(Outbound::Reset(self.reset_style)),
            Action::Pause(self.settle_time),
            Action::Send(activate.into()),
        ])
    }

    /// Number of the next step to run.
    pub fn current_step(&self) -> u64 {
        self.step
    }

    /// Run the current step and advance. `now` supplies time and date for
    /// the clock commands.
    pub fn step<Tz: TimeZone>(&mut self, now: &DateTime<Tz>) -> Result<Option<Outbound>> {
        let step = self.step;
        self.step += 1;

        let outbound = match step {
            1 => Some(commands::cmd_set_time(now)?.into()),
            2 => Some(commands::cmd_set_date(now)?.into()),
            CHANNEL_PLAN_START..POLL_START => {
                let index = (step - CHANNEL_PLAN_START) as usize;
                match self.plan.channels.get(index) {
                    Some(&(channel, state)) => {
                        Some(commands::cmd_set_channel(channel, state)?.into())
                    }
                    None => None,
                }
            }
            POLL_START.. => self.poll(step & 7)?,
            _ => None,
        };
        Ok(outbound)
    }

    fn poll(&self, slot: u64) -> Result<Option<Outbound>> {
        let plan = &self.plan;
        let outbound = match slot {
            0 => Outbound::LocalStatus(StatusKind::Dynamic),
            1 => Outbound::LocalStatus(StatusKind::Static),
            2 => commands::cmd_client_activate(&plan.remote_activation)?.into(),
            3..=6 => commands::cmd_request_status(
                plan.status_target,
                plan.status_reply_to,
                plan.status_kinds[(slot - 3) as usize],
            )?
            .into(),
            _ => return Ok(None),
        };
        Ok(Some(outbound))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn wire(outbound: Option<Outbound>) -> Option<String> {
        outbound.map(|o| String::from_utf8(o.encode().unwrap()).unwrap())
    }

    fn sequencer() -> Sequencer {
        Sequencer::new(
            SequencePlan::default(),
            ResetStyle::Short,
            Duration::from_secs(2),
        )
    }

    #[test]
    fn startup_resets_settles_and_activates() {
        let actions = sequencer().startup().unwrap();
        assert_eq!(actions.len(), 3);
        assert_eq!(actions[0], Action::Send(Outbound::Reset(ResetStyle::Short)));
        assert_eq!(actions[1], Action::Pause(Duration::from_secs(2)));
        match &actions[2] {
            Action::Send(out) => assert_eq!(out.encode().unwrap(), b">A0:3:0,1,0.\r\n"),
            other => panic!("expected activation, got {other:?}"),
        }
    }

    #[test]
    fn setup_steps() {
        let now = Utc.with_ymd_and_hms(2024, 10, 14, 14, 33, 39).unwrap();
        let mut seq = sequencer();
        let lines: Vec<Option<String>> = (0..10).map(|_| wire(seq.step(&now).unwrap())).collect();

        assert_eq!(lines[0], None);
        assert!(lines[1].as_deref().unwrap().starts_with(">A1:5:"));
        // 9518 = 37 * 256 + 46
        assert_eq!(lines[2].as_deref(), Some(">A1:6:46,37.\r\n"));
        assert_eq!(lines[3], None);
        assert_eq!(lines[4].as_deref(), Some(">A1:16:0,2.\r\n"));
        for line in &lines[5..10] {
            assert_eq!(*line, None);
        }
        assert_eq!(seq.current_step(), 10);
    }

    #[test]
    fn polling_cycle() {
        let now = Utc::now();
        let mut seq = sequencer();
        for _ in 0..10 {
            seq.step(&now).unwrap();
        }
        // Steps 10..=17 cover slots 2..=7, 0, 1.
        let lines: Vec<Option<String>> = (10..18).map(|_| wire(seq.step(&now).unwrap())).collect();
        assert_eq!(lines[0].as_deref(), Some(">A0:3:1,3,34,5,35,1.\r\n"));
        assert_eq!(lines[1].as_deref(), Some(">B3:2:1,1,1.\r\n"));
        assert_eq!(lines[2].as_deref(), Some(">B3:2:1,1,1.\r\n"));
        assert_eq!(lines[3].as_deref(), Some(">B3:2:1,1,1.\r\n"));
        assert_eq!(lines[4].as_deref(), Some(">B3:2:1,1,2.\r\n"));
        assert_eq!(lines[5], None);
        assert_eq!(lines[6].as_deref(), Some(">S\r\n"));
        assert_eq!(lines[7].as_deref(), Some(">T\r\n"));
    }

    #[test]
    fn channel_plan_spreads_over_steps() {
        let plan = SequencePlan {
            channels: vec![(0, 2), (1, 2), (3, 1)],
            ..SequencePlan::default()
        };
        plan.validate().unwrap();
        let mut seq = Sequencer::new(plan, ResetStyle::ControlBytes, Duration::ZERO);
        let now = Utc::now();
        let lines: Vec<Option<String>> = (0..10).map(|_| wire(seq.step(&now).unwrap())).collect();
        assert_eq!(lines[4].as_deref(), Some(">A1:16:0,2.\r\n"));
        assert_eq!(lines[5].as_deref(), Some(">A1:16:1,2.\r\n"));
        assert_eq!(lines[6].as_deref(), Some(">A1:16:3,1.\r\n"));
        assert_eq!(lines[7], None);
    }

    #[test]
    fn validate_rejects_oversized_channel_plan() {
        let plan = SequencePlan {
            channels: vec![(0, 2); MAX_CHANNEL_PLAN + 1],
            ..SequencePlan::default()
        };
        assert!(matches!(plan.validate(), Err(Error::ConfigInvalid(_))));
    }

    #[test]
    fn validate_rejects_bad_addresses() {
        let plan = SequencePlan {
            channels: vec![(26, 2)],
            ..SequencePlan::default()
        };
        assert!(matches!(plan.validate(), Err(Error::InvalidChannel(26))));

        let plan = SequencePlan {
            status_reply_to: Address {
                channel: 1,
                node: 1000,
            },
            ..SequencePlan::default()
        };
        assert!(matches!(plan.validate(), Err(Error::InvalidParameter(_))));
    }
}
