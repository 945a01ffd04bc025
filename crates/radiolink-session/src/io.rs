//! IO task.
//!
//! One tokio task owns the transport exclusively. It writes whatever the
//! sequencer hands it, reads controller output between writes, reassembles
//! lines, decodes them and feeds every frame to the [`LinkSupervisor`].
//!
//! The loop priorities are, in order: cancellation, outbound commands, idle
//! reads. A supervisor abort cancels the session token so the sequencer
//! stops as well.

use std::time::Duration;

use radiolink_core::error::{Error, Result};
use radiolink_core::transport::Transport;
use radiolink_core::{AbortReason, CommandCode, LinkState};
use radiolink_protocol::commands::Outbound;
use radiolink_protocol::protocol::{Frame, NodeFrame, decode_line};
use radiolink_protocol::status::decode_status;
use radiolink_protocol::{LineBuffer, catalog};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::events::LinkEvent;
use crate::supervisor::{LinkHealth, LinkSupervisor, Verdict};

/// Pause after an empty read before polling the transport again.
const IDLE_BACKOFF: Duration = Duration::from_millis(10);

/// Read chunk size. Controller lines are well under this.
const READ_CHUNK: usize = 256;

pub(crate) struct IoConfig {
    pub read_timeout: Duration,
}

/// Spawn the IO task.
pub(crate) fn spawn_io_task(
    transport: Box<dyn Transport>,
    config: IoConfig,
    supervisor: LinkSupervisor,
    outbound_rx: mpsc::Receiver<Outbound>,
    health_tx: watch::Sender<LinkHealth>,
    event_tx: broadcast::Sender<LinkEvent>,
    cancel: CancellationToken,
) -> JoinHandle<Result<()>> {
    let link = Link {
        supervisor,
        health_tx,
        event_tx,
        lines: LineBuffer::new(),
    };
    tokio::spawn(io_loop(transport, config, link, outbound_rx, cancel))
}

/// Receive-side state: line reassembly, supervision and publication.
struct Link {
    supervisor: LinkSupervisor,
    health_tx: watch::Sender<LinkHealth>,
    event_tx: broadcast::Sender<LinkEvent>,
    lines: LineBuffer,
}

async fn io_loop(
    mut transport: Box<dyn Transport>,
    config: IoConfig,
    mut link: Link,
    mut outbound_rx: mpsc::Receiver<Outbound>,
    cancel: CancellationToken,
) -> Result<()> {
    let mut read_buf = [0u8; READ_CHUNK];

    let result = loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                debug!("IO task cancelled");
                break Ok(());
            }

            out = outbound_rx.recv() => {
                match out {
                    Some(out) => {
                        if let Err(e) = send_outbound(&mut *transport, &out, &link.event_tx).await {
                            break Err(e);
                        }
                    }
                    None => {
                        debug!("outbound channel closed, exiting IO task");
                        break Ok(());
                    }
                }
            }

            received = async {
                let received = transport.receive(&mut read_buf, config.read_timeout).await;
                if matches!(received, Err(Error::Timeout)) {
                    tokio::time::sleep(IDLE_BACKOFF).await;
                }
                received
            } => {
                match received {
                    Ok(n) => {
                        trace!(bytes = n, "received");
                        link.lines.push(&read_buf[..n]);
                        if let Err(e) = link.drain_lines() {
                            break Err(e);
                        }
                    }
                    Err(Error::Timeout) => {}
                    Err(e) => {
                        error!("transport read failed: {e}");
                        break Err(e);
                    }
                }
            }
        }
    };

    if result.is_err() {
        cancel.cancel();
    }
    if let Err(e) = transport.close().await {
        debug!("closing transport: {e}");
    }
    result
}

async fn send_outbound(
    transport: &mut dyn Transport,
    out: &Outbound,
    event_tx: &broadcast::Sender<LinkEvent>,
) -> Result<()> {
    let bytes = match out.encode() {
        Ok(bytes) => bytes,
        Err(e) => {
            // A command that cannot be encoded is dropped, not fatal.
            warn!("dropping unencodable command {out:?}: {e}");
            return Ok(());
        }
    };
    let line = String::from_utf8_lossy(&bytes).trim_end().to_string();

    transport.send(&bytes).await.map_err(|e| {
        error!(line = %line, "transport write failed: {e}");
        e
    })?;
    debug!(line = %line, "sent");
    let _ = event_tx.send(LinkEvent::CommandSent { line });
    Ok(())
}

impl Link {
    /// Process every complete line in the buffer.
    ///
    /// Returns `Err(LinkAborted)` as soon as the supervisor gives up.
    fn drain_lines(&mut self) -> Result<()> {
        while let Some(raw) = self.lines.next_line() {
            let frame = decode_line(&raw);
            let line = String::from_utf8_lossy(&raw).into_owned();
            debug!(line = %line, "received line");
            let _ = self.event_tx.send(LinkEvent::LineReceived { line });

            self.report(&frame);
            let _ = self.event_tx.send(LinkEvent::FrameDecoded(frame.clone()));

            if let Verdict::Abort(reason) = self.supervise(&frame) {
                return Err(self.abort(reason));
            }
        }
        Ok(())
    }

    /// Log a frame and publish anything derived from it.
    fn report(&self, frame: &Frame) {
        match frame {
            Frame::Node(node) => self.report_node(node),
            Frame::Error { code, state } => warn!(
                code,
                state,
                error = catalog::error_name(*code),
                radio_state = catalog::radio_state_name(*state),
                "controller error"
            ),
            Frame::Ack => trace!("ack"),
            Frame::Bad { .. } => {}
            Frame::Unrecognized { raw } => debug!(raw = %raw, "unrecognized line"),
        }
    }

    fn report_node(&self, node: &NodeFrame) {
        let from = node.address();
        debug!(
            from = %from,
            opcode = %node.command_code(),
            timestamp = node.timestamp,
            args = ?node.args,
            "node frame"
        );
        if node.command_code() != CommandCode::StatusResponse {
            return;
        }
        match decode_status(node) {
            Ok(report) => {
                info!(from = %from, "{report}");
                let _ = self.event_tx.send(LinkEvent::StatusReport { from, report });
            }
            Err(e) => warn!(from = %from, "undecodable status: {e}"),
        }
    }

    fn supervise(&mut self, frame: &Frame) -> Verdict {
        let before = self.supervisor.state();
        let verdict = self.supervisor.observe(frame, Instant::now());
        let health = self.supervisor.health().clone();
        if health.state != before {
            if health.state != LinkState::Aborted {
                info!(from = %before, to = %health.state, "link state changed");
            }
            let _ = self.event_tx.send(LinkEvent::HealthChanged {
                state: health.state,
                consecutive_bad_count: health.consecutive_bad_count,
            });
        }
        self.health_tx.send_if_modified(|published| {
            if published.state == LinkState::Aborted || *published == health {
                return false;
            }
            *published = health;
            true
        });
        verdict
    }

    fn abort(&self, reason: AbortReason) -> Error {
        error!("aborting session: {reason}");
        let _ = self.event_tx.send(LinkEvent::Aborted(reason.clone()));
        Error::LinkAborted(reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::supervisor::{DEFAULT_BAD_FRAME_LIMIT, RecoveryPolicy};
    use radiolink_core::Address;
    use radiolink_protocol::StatusReport;
    use radiolink_protocol::commands::StatusKind;
    use radiolink_test_harness::MockTransport;

    struct Harness {
        out_tx: mpsc::Sender<Outbound>,
        health_rx: watch::Receiver<LinkHealth>,
        events: broadcast::Receiver<LinkEvent>,
        cancel: CancellationToken,
        task: JoinHandle<Result<()>>,
    }

    fn start(mock: MockTransport) -> Harness {
        let (out_tx, out_rx) = mpsc::channel(8);
        let (health_tx, health_rx) = watch::channel(LinkHealth::new());
        let (event_tx, events) = broadcast::channel(64);
        let cancel = CancellationToken::new();
        let task = spawn_io_task(
            Box::new(mock),
            IoConfig {
                read_timeout: Duration::from_millis(10),
            },
            LinkSupervisor::new(DEFAULT_BAD_FRAME_LIMIT, RecoveryPolicy::default()),
            out_rx,
            health_tx,
            event_tx,
            cancel.clone(),
        );
        Harness {
            out_tx,
            health_rx,
            events,
            cancel,
            task,
        }
    }

    async fn next_matching(
        events: &mut broadcast::Receiver<LinkEvent>,
        pred: impl Fn(&LinkEvent) -> bool,
    ) -> LinkEvent {
        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                let event = events.recv().await.unwrap();
                if pred(&event) {
                    return event;
                }
            }
        })
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn sends_outbound_commands() {
        let mut mock = MockTransport::new();
        mock.expect(b">S\r\n", b"");
        let h = start(mock);
        let mut events = h.events;

        h.out_tx
            .send(Outbound::LocalStatus(StatusKind::Dynamic))
            .await
            .unwrap();
        let event = next_matching(&mut events, |e| matches!(e, LinkEvent::CommandSent { .. })).await;
        match event {
            LinkEvent::CommandSent { line } => assert_eq!(line, ">S"),
            other => panic!("unexpected {other:?}"),
        }

        h.cancel.cancel();
        assert!(h.task.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn publishes_status_reports() {
        let mock = MockTransport::permissive();
        let inbound = mock.handle();
        let h = start(mock);
        let mut events = h.events;

        inbound.push_inbound(b"<A1:27598:9:0,6,102,");
        inbound.push_inbound(b"3,112,0,0,0,6\r\n");

        let event = next_matching(&mut events, |e| matches!(e, LinkEvent::StatusReport { .. })).await;
        match event {
            LinkEvent::StatusReport { from, report } => {
                assert_eq!(from, Address { channel: 0, node: 1 });
                assert!(matches!(report, StatusReport::Dynamic { battery: 880, .. }));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(h.health_rx.borrow().last_activity.is_some());

        h.cancel.cancel();
        assert!(h.task.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn bad_frames_degrade_then_abort() {
        let mock = MockTransport::permissive();
        let inbound = mock.handle();
        let h = start(mock);
        let mut events = h.events;

        inbound.push_inbound(b"@-corrupt\r\n");
        let event =
            next_matching(&mut events, |e| matches!(e, LinkEvent::HealthChanged { .. })).await;
        assert!(matches!(
            event,
            LinkEvent::HealthChanged {
                state: LinkState::Degraded,
                consecutive_bad_count: 1
            }
        ));

        for _ in 0..10 {
            inbound.push_inbound(b"@-corrupt\r\n");
        }
        let result = h.task.await.unwrap();
        assert!(matches!(
            result,
            Err(Error::LinkAborted(AbortReason::BadFrames { count: 11 }))
        ));
        assert!(h.cancel.is_cancelled());
        assert_eq!(h.health_rx.borrow().state, LinkState::Aborted);
    }

    #[tokio::test]
    async fn fatal_controller_error_aborts() {
        let mock = MockTransport::permissive();
        mock.handle().push_inbound(b"<-5/6\r\n<-3/2\r\n");
        let h = start(mock);

        let result = h.task.await.unwrap();
        assert!(matches!(
            result,
            Err(Error::LinkAborted(AbortReason::ControllerError { code: 3, state: 2 }))
        ));
        assert!(h.cancel.is_cancelled());
    }

    #[tokio::test]
    async fn lost_connection_ends_task() {
        let mock = MockTransport::permissive();
        mock.handle().disconnect();
        let h = start(mock);

        let result = h.task.await.unwrap();
        assert!(matches!(result, Err(Error::ConnectionLost)));
        assert!(h.cancel.is_cancelled());
    }

    #[tokio::test]
    async fn closed_outbound_channel_ends_task() {
        let h = start(MockTransport::permissive());
        drop(h.out_tx);
        assert!(h.task.await.unwrap().is_ok());
    }
}
