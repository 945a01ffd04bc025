// radiolink monitor -- drives a radio base controller over a serial line and
// prints what it reports.
//
// Usage:
//   radiolink-monitor /dev/ttyUSB0:38400
//   SERIAL_DEVICE=/dev/ttyUSB0:38400 radiolink-monitor --verbose
//   radiolink-monitor /dev/ttyUSB0:38400 --channel 0:2 --channel 1:2 run
//   radiolink-monitor /dev/ttyUSB0:38400 --reset-style control-bytes reset
//
// Exit status: 0 after Ctrl-C, 1 when the link is aborted or the device
// fails, 2 for missing or malformed configuration.

use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tokio::sync::broadcast;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use radiolink_core::{AbortReason, Error};
use radiolink_protocol::catalog::{error_name, radio_state_name};
use radiolink_protocol::{Frame, ResetStyle};
use radiolink_session::session::EVENT_CAPACITY;
use radiolink_session::{
    DEVICE_ENV, DeviceSpec, LinkEvent, RecoveryPolicy, SequencePlan, SessionBuilder,
    reset_controller,
};
use radiolink_transport::SerialTransport;

const EXIT_ABORTED: i32 = 1;
const EXIT_CONFIG: i32 = 2;

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// Drive a radio base controller and monitor its link.
#[derive(Parser)]
#[command(name = "radiolink-monitor", version, about)]
struct Cli {
    /// Serial device as path:baud (e.g. /dev/ttyUSB0:38400).
    #[arg(env = DEVICE_ENV)]
    device: Option<String>,

    /// Log at debug level unless RUST_LOG says otherwise.
    #[arg(short, long)]
    verbose: bool,

    /// Do not echo sent and received lines.
    #[arg(short, long)]
    quiet: bool,

    /// Seconds between sequencer steps.
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u64).range(1..=5))]
    step_secs: u64,

    /// Milliseconds to wait after the reset before activating.
    #[arg(long, default_value_t = 2000)]
    settle_ms: u64,

    /// Consecutive bad frames tolerated before aborting.
    #[arg(long, default_value_t = 10)]
    bad_frame_limit: u32,

    /// Seconds of controller silence before aborting.
    #[arg(long, default_value_t = 60)]
    activity_timeout_secs: u64,

    /// Steps to run before the activity timeout applies.
    #[arg(long, default_value_t = 20)]
    grace_steps: u64,

    /// Treat controller error 2 (Busy) as recoverable as well as 5 (Newline).
    #[arg(long)]
    tolerate_busy: bool,

    /// How to reset the controller.
    #[arg(long, value_enum, default_value_t = ResetArg::Short)]
    reset_style: ResetArg,

    /// Channel to activate as CHANNEL:STATE. Repeatable; default 0:2.
    #[arg(long = "channel", value_parser = parse_channel)]
    channels: Vec<(u8, u8)>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Clone, Copy)]
enum Command {
    /// Run a supervised session until Ctrl-C or link abort (default).
    Run,
    /// Send the reset sequence and exit.
    Reset,
}

#[derive(ValueEnum, Clone, Copy)]
enum ResetArg {
    /// `>R`
    Short,
    /// ENQ followed by a backslash.
    ControlBytes,
}

impl From<ResetArg> for ResetStyle {
    fn from(arg: ResetArg) -> Self {
        match arg {
            ResetArg::Short => ResetStyle::Short,
            ResetArg::ControlBytes => ResetStyle::ControlBytes,
        }
    }
}

/// Parse "CHANNEL:STATE", e.g. "1:2".
fn parse_channel(s: &str) -> std::result::Result<(u8, u8), String> {
    let (channel, state) = s
        .split_once(':')
        .ok_or_else(|| format!("expected CHANNEL:STATE, got {s:?}"))?;
    let channel = channel
        .parse()
        .map_err(|e| format!("invalid channel {channel:?}: {e}"))?;
    let state = state
        .parse()
        .map_err(|e| format!("invalid state {state:?}: {e}"))?;
    Ok((channel, state))
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if let Err(e) = run(cli).await {
        eprintln!("error: {e:#}");
        std::process::exit(exit_status(&e));
    }
}

fn exit_status(e: &anyhow::Error) -> i32 {
    match e.downcast_ref::<Error>() {
        Some(Error::ConfigInvalid(_) | Error::InvalidChannel(_)) => EXIT_CONFIG,
        _ => EXIT_ABORTED,
    }
}

async fn run(cli: Cli) -> Result<()> {
    let device = device_spec(&cli)?;

    match cli.command.unwrap_or(Command::Run) {
        Command::Reset => cmd_reset(&device, cli.reset_style.into()).await,
        Command::Run => cmd_run(&cli, device).await,
    }
}

fn device_spec(cli: &Cli) -> Result<DeviceSpec> {
    let raw = cli.device.as_deref().ok_or_else(|| {
        Error::ConfigInvalid(format!("no device given; pass path:baud or set {DEVICE_ENV}"))
    })?;
    let device: DeviceSpec = raw.parse()?;
    Ok(device)
}

fn session_builder(cli: &Cli, device: DeviceSpec) -> SessionBuilder {
    let mut plan = SequencePlan::default();
    if !cli.channels.is_empty() {
        plan.channels = cli.channels.clone();
    }
    let policy = if cli.tolerate_busy {
        RecoveryPolicy::tolerate_busy()
    } else {
        RecoveryPolicy::strict()
    };

    SessionBuilder::new()
        .device(device)
        .step_interval(Duration::from_secs(cli.step_secs))
        .settle_time(Duration::from_millis(cli.settle_ms))
        .bad_frame_limit(cli.bad_frame_limit)
        .activity_timeout(Duration::from_secs(cli.activity_timeout_secs))
        .grace_steps(cli.grace_steps)
        .recovery_policy(policy)
        .reset_style(cli.reset_style.into())
        .plan(plan)
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

async fn cmd_reset(device: &DeviceSpec, style: ResetStyle) -> Result<()> {
    let mut transport = SerialTransport::open(&device.path, device.baud_rate)
        .await
        .with_context(|| format!("opening {device}"))?;
    reset_controller(&mut transport, style).await?;
    println!("Reset sent to {device}.");
    Ok(())
}

async fn cmd_run(cli: &Cli, device: DeviceSpec) -> Result<()> {
    info!("radiolink-monitor v{}", env!("CARGO_PKG_VERSION"));
    info!(device = %device, "opening controller link");

    let (event_tx, events) = broadcast::channel(EVENT_CAPACITY);
    let printer = tokio::spawn(print_events(events, !cli.quiet));

    let session = session_builder(cli, device.clone())
        .events(event_tx)
        .build()
        .await
        .with_context(|| format!("starting session on {device}"))?;

    let cancel = session.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupted, shutting down");
            cancel.cancel();
        }
    });

    let result = session.wait().await;
    // The printer ends once every sender is gone.
    let _ = printer.await;

    match result {
        Ok(()) => {
            println!("Session closed.");
            Ok(())
        }
        Err(Error::LinkAborted(reason)) => {
            print_abort(&reason);
            Err(Error::LinkAborted(reason).into())
        }
        Err(e) => Err(e.into()),
    }
}

async fn print_events(mut events: broadcast::Receiver<LinkEvent>, echo: bool) {
    loop {
        match events.recv().await {
            Ok(LinkEvent::StatusReport { from, report }) => println!(">> {from}: {report}"),
            Ok(LinkEvent::LineReceived { line }) if echo => println!("RX: [{line}]"),
            Ok(LinkEvent::CommandSent { line }) if echo => println!("SEND: [{line}]"),
            Ok(LinkEvent::FrameDecoded(Frame::Error { code, state })) => {
                println!(
                    ">> Error {code}: {} (radio state {state}: {})",
                    error_name(code),
                    radio_state_name(state)
                );
            }
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!("event printer fell behind, {n} events skipped");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

fn print_abort(reason: &AbortReason) {
    match reason {
        AbortReason::ControllerError { code, state } => eprintln!(
            "Link aborted: controller error {code} ({}), radio state {state} ({})",
            error_name(*code),
            radio_state_name(*state)
        ),
        other => eprintln!("Link aborted: {other}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_channel_pairs() {
        assert_eq!(parse_channel("0:2"), Ok((0, 2)));
        assert_eq!(parse_channel("3:1"), Ok((3, 1)));
        assert!(parse_channel("3").is_err());
        assert!(parse_channel("x:1").is_err());
        assert!(parse_channel("1:300").is_err());
    }

    #[test]
    fn positional_device_and_defaults() {
        let cli = Cli::try_parse_from(["radiolink-monitor", "/dev/ttyUSB0:38400"]).unwrap();
        assert_eq!(cli.device.as_deref(), Some("/dev/ttyUSB0:38400"));
        assert_eq!(cli.step_secs, 1);
        assert_eq!(cli.bad_frame_limit, 10);
        assert!(cli.command.is_none());

        let device = device_spec(&cli).unwrap();
        assert_eq!(device.baud_rate, 38400);
    }

    #[test]
    fn reset_subcommand_and_channels() {
        let cli = Cli::try_parse_from([
            "radiolink-monitor",
            "COM3:9600",
            "--channel",
            "0:2",
            "--channel",
            "1:2",
            "--reset-style",
            "control-bytes",
            "reset",
        ])
        .unwrap();
        assert!(matches!(cli.command, Some(Command::Reset)));
        assert_eq!(cli.channels, vec![(0, 2), (1, 2)]);
        assert_eq!(ResetStyle::from(cli.reset_style), ResetStyle::ControlBytes);
    }

    #[test]
    fn step_secs_is_bounded() {
        assert!(Cli::try_parse_from(["radiolink-monitor", "--step-secs", "9"]).is_err());
    }

    #[test]
    fn malformed_device_is_a_config_error() {
        let cli = Cli::try_parse_from(["radiolink-monitor", "/dev/ttyUSB0:12345"]).unwrap();
        let err = device_spec(&cli).unwrap_err();
        assert_eq!(exit_status(&err), EXIT_CONFIG);
    }

    #[test]
    fn abort_is_exit_status_one() {
        let err = anyhow::Error::from(Error::LinkAborted(AbortReason::BadFrames { count: 11 }));
        assert_eq!(exit_status(&err), EXIT_ABORTED);
    }

    #[test]
    fn builder_carries_flags() {
        let cli = Cli::try_parse_from([
            "radiolink-monitor",
            "COM3:9600",
            "--tolerate-busy",
            "--grace-steps",
            "5",
        ])
        .unwrap();
        let device = device_spec(&cli).unwrap();
        let builder = session_builder(&cli, device);
        let config = builder.session_config();
        assert!(config.recovery_policy.is_recoverable(2));
        assert_eq!(config.grace_steps, 5);
        assert_eq!(config.plan.channels, vec![(0, 2)]);
    }
}
