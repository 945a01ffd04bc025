//! Running sessions.
//!
//! A [`Session`] is two tokio tasks joined by a channel and a cancellation
//! token:
//!
//! - the **IO task** owns the transport, reads and supervises the link, and
//!   writes whatever it is handed;
//! - the **sequencer task** runs the [`Sequencer`] on a fixed cadence and
//!   watches for controller silence.
//!
//! Whichever task decides the link is dead cancels the token, the other
//! winds down, and [`Session::wait`] reports why.

use std::time::Duration;

use chrono::Local;
use radiolink_core::LinkState;
use radiolink_core::error::{Error, Result};
use radiolink_core::transport::Transport;
use radiolink_protocol::commands::Outbound;
use radiolink_protocol::protocol::{ResetStyle, encode_reset};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::events::LinkEvent;
use crate::io::{IoConfig, spawn_io_task};
use crate::sequencer::{Action, SequencePlan, Sequencer};
use crate::supervisor::{
    DEFAULT_BAD_FRAME_LIMIT, LinkHealth, LinkSupervisor, RecoveryPolicy, check_activity,
};

/// Capacity of the event broadcast channel.
pub const EVENT_CAPACITY: usize = 256;

/// Capacity of the sequencer-to-IO command queue.
const OUTBOUND_CAPACITY: usize = 16;

/// Tunables for a session. See [`crate::SessionBuilder`] for the defaults.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Time between sequencer steps.
    pub step_interval: Duration,
    /// Wait after the reset before activating.
    pub settle_time: Duration,
    /// Consecutive bad frames tolerated before aborting.
    pub bad_frame_limit: u32,
    /// Longest silence from the controller before aborting.
    pub activity_timeout: Duration,
    /// Steps to run before the activity timeout is enforced.
    pub grace_steps: u64,
    pub recovery_policy: RecoveryPolicy,
    pub reset_style: ResetStyle,
    /// Timeout for a single transport read.
    pub read_timeout: Duration,
    pub plan: SequencePlan,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            step_interval: Duration::from_secs(1),
            settle_time: Duration::from_secs(2),
            bad_frame_limit: DEFAULT_BAD_FRAME_LIMIT,
            activity_timeout: Duration::from_secs(60),
            grace_steps: 20,
            recovery_policy: RecoveryPolicy::default(),
            reset_style: ResetStyle::default(),
            read_timeout: Duration::from_millis(100),
            plan: SequencePlan::default(),
        }
    }
}

/// Handle to a running session.
pub struct Session {
    cancel: CancellationToken,
    io_task: JoinHandle<Result<()>>,
    sequencer_task: JoinHandle<Result<()>>,
    health_rx: watch::Receiver<LinkHealth>,
    event_tx: broadcast::Sender<LinkEvent>,
}

impl Session {
    /// Spawn the IO and sequencer tasks on the current runtime.
    pub fn start(transport: Box<dyn Transport>, config: SessionConfig) -> Session {
        let (event_tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self::start_with_events(transport, config, event_tx)
    }

    /// Like [`Session::start`], publishing on an existing event channel so
    /// subscribers created beforehand see the startup commands.
    pub fn start_with_events(
        transport: Box<dyn Transport>,
        config: SessionConfig,
        event_tx: broadcast::Sender<LinkEvent>,
    ) -> Session {
        let cancel = CancellationToken::new();
        let (health_tx, health_rx) = watch::channel(LinkHealth::new());
        let (out_tx, out_rx) = mpsc::channel(OUTBOUND_CAPACITY);
        let started = Instant::now();

        let io_task = spawn_io_task(
            transport,
            IoConfig {
                read_timeout: config.read_timeout,
            },
            LinkSupervisor::new(config.bad_frame_limit, config.recovery_policy.clone()),
            out_rx,
            health_tx.clone(),
            event_tx.clone(),
            cancel.clone(),
        );

        let sequencer = Sequencer::new(config.plan.clone(), config.reset_style, config.settle_time);
        let driver = SequencerTask {
            sequencer,
            step_interval: config.step_interval,
            activity_timeout: config.activity_timeout,
            grace_steps: config.grace_steps,
            started,
            out_tx,
            health_tx,
            health_rx: health_rx.clone(),
            event_tx: event_tx.clone(),
            cancel: cancel.clone(),
        };
        let sequencer_task = tokio::spawn(driver.run());

        info!("session started");
        Session {
            cancel,
            io_task,
            sequencer_task,
            health_rx,
            event_tx,
        }
    }

    /// Subscribe to session events.
    pub fn subscribe(&self) -> broadcast::Receiver<LinkEvent> {
        self.event_tx.subscribe()
    }

    /// Latest published link health.
    pub fn health(&self) -> LinkHealth {
        self.health_rx.borrow().clone()
    }

    /// Token that ends the session when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Ask both tasks to stop. Use [`Session::wait`] to join them.
    pub fn shutdown(&self) {
        debug!("session shutdown requested");
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.io_task.is_finished() && self.sequencer_task.is_finished()
    }

    /// Join both tasks.
    ///
    /// Returns `Ok(())` after a requested shutdown, [`Error::LinkAborted`]
    /// if the link was torn down, or the transport error that ended it.
    pub async fn wait(self) -> Result<()> {
        let io = join(self.io_task).await;
        let sequencer = join(self.sequencer_task).await;
        io.and(sequencer)
    }
}

async fn join(task: JoinHandle<Result<()>>) -> Result<()> {
    task.await
        .map_err(|e| Error::Transport(format!("session task failed: {e}")))?
}

/// Send only the reset sequence, outside of any session.
pub async fn reset_controller(transport: &mut dyn Transport, style: ResetStyle) -> Result<()> {
    info!(?style, "resetting controller");
    transport.send(&encode_reset(style)).await
}

struct SequencerTask {
    sequencer: Sequencer,
    step_interval: Duration,
    activity_timeout: Duration,
    grace_steps: u64,
    started: Instant,
    out_tx: mpsc::Sender<Outbound>,
    health_tx: watch::Sender<LinkHealth>,
    health_rx: watch::Receiver<LinkHealth>,
    event_tx: broadcast::Sender<LinkEvent>,
    cancel: CancellationToken,
}

impl SequencerTask {
    async fn run(mut self) -> Result<()> {
        let cancel = self.cancel.clone();
        let result = self.run_steps().await;
        if result.is_err() {
            cancel.cancel();
        }
        result
    }

    async fn run_steps(&mut self) -> Result<()> {
        for action in self.sequencer.startup()? {
            if !self.perform(action).await {
                return Ok(());
            }
        }
        info!("controller activated");

        loop {
            let step = self.sequencer.current_step();
            if step > self.grace_steps {
                let silent = check_activity(
                    &self.health_rx.borrow(),
                    self.started,
                    Instant::now(),
                    self.activity_timeout,
                );
                if let Some(reason) = silent {
                    error!("aborting session: {reason}");
                    self.health_tx
                        .send_modify(|health| health.state = LinkState::Aborted);
                    let _ = self.event_tx.send(LinkEvent::HealthChanged {
                        state: LinkState::Aborted,
                        consecutive_bad_count: self.health_rx.borrow().consecutive_bad_count,
                    });
                    let _ = self.event_tx.send(LinkEvent::Aborted(reason.clone()));
                    return Err(Error::LinkAborted(reason));
                }
            }

            if let Some(out) = self.sequencer.step(&Local::now())? {
                debug!(step, "sequencer step");
                if !self.perform(Action::Send(out)).await {
                    return Ok(());
                }
            }
            if !self.perform(Action::Pause(self.step_interval)).await {
                return Ok(());
            }
        }
    }

    /// Carry out one action. Returns `false` once the session is ending.
    async fn perform(&self, action: Action) -> bool {
        match action {
            Action::Send(out) => tokio::select! {
                biased;
                _ = self.cancel.cancelled() => false,
                sent = self.out_tx.send(out) => sent.is_ok(),
            },
            Action::Pause(duration) => tokio::select! {
                biased;
                _ = self.cancel.cancelled() => false,
                _ = tokio::time::sleep(duration) => true,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use radiolink_core::AbortReason;
    use radiolink_protocol::StatusReport;
    use radiolink_test_harness::{MockHandle, MockTransport};

    fn fast_config() -> SessionConfig {
        SessionConfig {
            step_interval: Duration::from_millis(20),
            settle_time: Duration::from_millis(10),
            read_timeout: Duration::from_millis(5),
            ..SessionConfig::default()
        }
    }

    async fn wait_for_sent(handle: &MockHandle, count: usize) -> Vec<Vec<u8>> {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let sent = handle.sent_data();
                if sent.len() >= count {
                    return sent;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap()
    }

    async fn finish(session: Session) -> Result<()> {
        tokio::time::timeout(Duration::from_secs(5), session.wait())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn startup_resets_then_activates() {
        let mock = MockTransport::permissive();
        let handle = mock.handle();
        let session = Session::start(Box::new(mock), fast_config());

        let sent = wait_for_sent(&handle, 2).await;
        assert_eq!(sent[0], b">R\r\n");
        assert_eq!(sent[1], b">A0:3:0,1,0.\r\n");

        session.shutdown();
        assert!(finish(session).await.is_ok());
    }

    #[tokio::test]
    async fn control_byte_reset() {
        let mock = MockTransport::permissive();
        let handle = mock.handle();
        let config = SessionConfig {
            reset_style: ResetStyle::ControlBytes,
            ..fast_config()
        };
        let session = Session::start(Box::new(mock), config);

        let sent = wait_for_sent(&handle, 1).await;
        assert_eq!(sent[0], b"\x05\\\r\n");

        session.shutdown();
        assert!(finish(session).await.is_ok());
    }

    #[tokio::test]
    async fn setup_commands_follow_activation() {
        let mock = MockTransport::permissive();
        let handle = mock.handle();
        let session = Session::start(Box::new(mock), fast_config());

        // reset, activate, time, date, channel 0
        let sent = wait_for_sent(&handle, 5).await;
        assert!(sent[2].starts_with(b">A1:5:"));
        assert!(sent[3].starts_with(b">A1:6:"));
        assert_eq!(sent[4], b">A1:16:0,2.\r\n");

        session.shutdown();
        assert!(finish(session).await.is_ok());
    }

    #[tokio::test]
    async fn silent_controller_times_out() {
        let mock = MockTransport::permissive();
        let config = SessionConfig {
            activity_timeout: Duration::from_millis(100),
            grace_steps: 2,
            ..fast_config()
        };
        let session = Session::start(Box::new(mock), config);

        tokio::time::timeout(Duration::from_secs(5), session.cancellation_token().cancelled())
            .await
            .unwrap();
        assert_eq!(session.health().state, LinkState::Aborted);

        let result = finish(session).await;
        assert!(matches!(
            result,
            Err(Error::LinkAborted(AbortReason::ActivityTimeout { .. }))
        ));
    }

    #[tokio::test]
    async fn traffic_keeps_link_alive() {
        let mock = MockTransport::permissive();
        let handle = mock.handle();
        let config = SessionConfig {
            activity_timeout: Duration::from_millis(300),
            grace_steps: 0,
            ..fast_config()
        };
        let session = Session::start(Box::new(mock), config);

        for _ in 0..25 {
            handle.push_inbound(b"<+\r\n");
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(!session.is_finished());
        assert!(session.health().last_activity.is_some());

        session.shutdown();
        assert!(finish(session).await.is_ok());
    }

    #[tokio::test]
    async fn bad_frames_end_session() {
        let mock = MockTransport::permissive();
        let handle = mock.handle();
        let session = Session::start(Box::new(mock), fast_config());
        let mut events = session.subscribe();

        for _ in 0..11 {
            handle.push_inbound(b"@-corrupt\r\n");
        }

        let result = finish(session).await;
        assert!(matches!(
            result,
            Err(Error::LinkAborted(AbortReason::BadFrames { count: 11 }))
        ));

        let mut saw_abort = false;
        while let Ok(event) = events.try_recv() {
            if matches!(event, LinkEvent::Aborted(_)) {
                saw_abort = true;
            }
        }
        assert!(saw_abort);
    }

    #[tokio::test]
    async fn status_reports_reach_subscribers() {
        let mock = MockTransport::permissive();
        let handle = mock.handle();
        let session = Session::start(Box::new(mock), fast_config());
        let mut events = session.subscribe();

        handle.push_inbound(b"<B1:27798:9:1,1,1,1,1,2,4\r\n");

        let report = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if let LinkEvent::StatusReport { report, .. } = events.recv().await.unwrap() {
                    return report;
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(
            report,
            StatusReport::Static {
                id_parts: [1, 1, 1, 1],
                version_major: 2,
                version_minor: 4,
            }
        );

        session.shutdown();
        assert!(finish(session).await.is_ok());
    }

    #[tokio::test]
    async fn unplugged_device_ends_session() {
        let mock = MockTransport::permissive();
        let handle = mock.handle();
        let session = Session::start(Box::new(mock), fast_config());

        handle.disconnect();
        assert!(matches!(finish(session).await, Err(Error::ConnectionLost)));
    }

    #[tokio::test]
    async fn early_subscriber_sees_reset() {
        let (event_tx, mut events) = broadcast::channel(EVENT_CAPACITY);
        let session = Session::start_with_events(
            Box::new(MockTransport::permissive()),
            fast_config(),
            event_tx,
        );

        let first_sent = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if let LinkEvent::CommandSent { line } = events.recv().await.unwrap() {
                    return line;
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(first_sent, ">R");

        session.shutdown();
        assert!(finish(session).await.is_ok());
    }

    #[tokio::test]
    async fn reset_controller_sends_only_reset() {
        let mut mock = MockTransport::new();
        mock.expect(b">R\r\n", b"");
        reset_controller(&mut mock, ResetStyle::Short).await.unwrap();
        assert_eq!(mock.remaining_expectations(), 0);
        assert_eq!(mock.sent_data().len(), 1);
    }
}
