//! Command values and command builders for the base controller.
//!
//! A [`Command`] is an addressed opcode with a small byte payload. Commands
//! are built once, encoded once by [`protocol::encode_command`], and then
//! discarded. Besides addressed commands, the controller understands a few
//! short control sequences (reset, local status); [`Outbound`] covers all
//! of them so the session can treat every transmission alike.
//!
//! All functions here are pure. Time and date are passed in by the caller.

use chrono::{DateTime, Datelike, NaiveDate, TimeZone};
use radiolink_core::{Address, CommandCode, Error, MAX_CHANNEL, MAX_PAYLOAD, Result};

use crate::protocol::{self, ResetStyle};

/// Which of the two status reports to ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusKind {
    /// Radio state, clock, battery and packet counters.
    Dynamic,
    /// Device identity and firmware version.
    Static,
}

impl StatusKind {
    /// Value of the leading payload flag that selects this report.
    pub fn flag(&self) -> u8 {
        match self {
            StatusKind::Dynamic => 0,
            StatusKind::Static => 1,
        }
    }
}

/// An addressed command for the base controller or one of its nodes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    destination: Address,
    opcode: CommandCode,
    payload: Vec<u8>,
}

impl Command {
    /// Start building a command for `opcode`, addressed to `A0` by default.
    pub fn builder(opcode: CommandCode) -> CommandBuilder {
        CommandBuilder {
            destination: Address::CONTROLLER,
            opcode,
            payload: Vec::new(),
        }
    }

    pub fn destination(&self) -> Address {
        self.destination
    }

    pub fn opcode(&self) -> CommandCode {
        self.opcode
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }
}

/// Fluent builder for [`Command`].
///
/// Channel and node default to 0. [`CommandBuilder::build`] rejects channels
/// without a wire letter and payloads longer than [`MAX_PAYLOAD`].
#[derive(Debug, Clone)]
pub struct CommandBuilder {
    destination: Address,
    opcode: CommandCode,
    payload: Vec<u8>,
}

impl CommandBuilder {
    pub fn channel(mut self, channel: u8) -> Self {
        self.destination.channel = channel;
        self
    }

    pub fn node(mut self, node: u32) -> Self {
        self.destination.node = node;
        self
    }

    pub fn to(mut self, destination: Address) -> Self {
        self.destination = destination;
        self
    }

    pub fn payload(mut self, payload: &[u8]) -> Self {
        self.payload = payload.to_vec();
        self
    }

    pub fn build(self) -> Result<Command> {
        if self.destination.channel > MAX_CHANNEL {
            return Err(Error::InvalidChannel(self.destination.channel));
        }
        if let CommandCode::User(n) = self.opcode {
            CommandCode::user(n)?;
        }
        if self.payload.len() > MAX_PAYLOAD {
            return Err(Error::InvalidParameter(format!(
                "payload of {} bytes exceeds the {MAX_PAYLOAD}-byte limit",
                self.payload.len()
            )));
        }
        Ok(Command {
            destination: self.destination,
            opcode: self.opcode,
            payload: self.payload,
        })
    }
}

/// Anything the host can put on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// An addressed command (`>A1:5:...`).
    Command(Command),
    /// Ask the base controller for its own status (`>S` / `>T`).
    LocalStatus(StatusKind),
    /// Reset the base controller.
    Reset(ResetStyle),
}

impl Outbound {
    /// Encode to wire bytes, including the line terminator.
    pub fn encode(&self) -> Result<Vec<u8>> {
        match self {
            Outbound::Command(cmd) => protocol::encode_command(cmd),
            Outbound::LocalStatus(kind) => Ok(protocol::encode_local_status(*kind)),
            Outbound::Reset(style) => Ok(protocol::encode_reset(*style)),
        }
    }
}

impl From<Command> for Outbound {
    fn from(cmd: Command) -> Self {
        Outbound::Command(cmd)
    }
}

// ---------------------------------------------------------------
// Clock encodings
// ---------------------------------------------------------------

/// Encode a wall-clock instant into the controller's SET_TIME payload.
///
/// `ticks` counts hundredths of a second within the current ten-minute
/// window (`floor(seconds * 100) mod 60000`), `tod` counts ten-minute units
/// since midnight UTC (`floor(seconds / 600) mod 144`). The payload is
/// `[ticks % 256, ticks / 256, tod]`.
pub fn time_payload(epoch_millis: i64) -> [u8; 3] {
    let ticks = (epoch_millis.div_euclid(10)).rem_euclid(60_000);
    let tod = (epoch_millis.div_euclid(1000).div_euclid(600)).rem_euclid(144);
    [(ticks % 256) as u8, (ticks / 256) as u8, tod as u8]
}

/// Encode a calendar date into the controller's SET_DATE payload.
///
/// `date_code = ((year - 2000) * 12 + (month - 1)) * 32 + day`, sent as
/// `[date_code % 256, date_code / 256]`. Dates before 2000 are rejected.
pub fn date_payload(date: NaiveDate) -> Result<[u8; 2]> {
    let years = date.year() - 2000;
    if years < 0 {
        return Err(Error::InvalidParameter(format!(
            "date {date} precedes the controller epoch (2000)"
        )));
    }
    let code = (years * 12 + date.month0() as i32) * 32 + date.day() as i32;
    if code > i32::from(u16::MAX) {
        return Err(Error::InvalidParameter(format!(
            "date {date} does not fit in the controller date code"
        )));
    }
    Ok([(code % 256) as u8, (code / 256) as u8])
}

// ---------------------------------------------------------------
// Command builders
// ---------------------------------------------------------------

/// Node that owns the controller's clock and channel table (`A1`).
const CLOCK_NODE: Address = Address {
    channel: 0,
    node: 1,
};

/// Activate the base controller as node `node` on channel `channel`.
///
/// Sent to `A0` with payload `[channel, node, 0]`.
pub fn cmd_activate(channel: u8, node: u8) -> Result<Command> {
    Command::builder(CommandCode::Activate)
        .payload(&[channel, node, 0])
        .build()
}

/// Forward an activation record for a remote device through the controller.
///
/// The payload is passed through unchanged, e.g. `[1, 3, 34, 5, 35, 1]`.
pub fn cmd_client_activate(record: &[u8]) -> Result<Command> {
    Command::builder(CommandCode::Activate)
        .payload(record)
        .build()
}

/// Ask `target` for a status report, delivered to `reply_to`.
///
/// Payload is `[reply_channel, reply_node, kind]`; `kind` is passed raw
/// since nodes define their own report numbers beyond the two standard ones.
pub fn cmd_request_status(target: Address, reply_to: Address, kind: u8) -> Result<Command> {
    let reply_node = u8::try_from(reply_to.node).map_err(|_| {
        Error::InvalidParameter(format!("reply node {} does not fit in a byte", reply_to.node))
    })?;
    Command::builder(CommandCode::Status)
        .to(target)
        .payload(&[reply_to.channel, reply_node, kind])
        .build()
}

/// Set the controller clock from `now`.
pub fn cmd_set_time<Tz: TimeZone>(now: &DateTime<Tz>) -> Result<Command> {
    Command::builder(CommandCode::SetTime)
        .to(CLOCK_NODE)
        .payload(&time_payload(now.timestamp_millis()))
        .build()
}

/// Set the controller calendar from `now`, using the date in `now`'s zone.
pub fn cmd_set_date<Tz: TimeZone>(now: &DateTime<Tz>) -> Result<Command> {
    let payload = date_payload(now.date_naive())?;
    Command::builder(CommandCode::SetDate)
        .to(CLOCK_NODE)
        .payload(&payload)
        .build()
}

/// Put radio channel `channel` into `state` (USER0 to `A1`).
pub fn cmd_set_channel(channel: u8, state: u8) -> Result<Command> {
    Command::builder(CommandCode::User(0))
        .to(CLOCK_NODE)
        .payload(&[channel, state])
        .build()
}
