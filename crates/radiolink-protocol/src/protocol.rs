//! Base-controller text protocol encoder/decoder.
//!
//! The controller speaks line-oriented ASCII over its serial port.
//!
//! # Outbound format
//!
//! ```text
//! >{channel}{node}:{opcode}[:{b0},{b1},...].\r\n
//! ```
//!
//! - `channel`: one uppercase letter, `A` + channel number.
//! - `node`, `opcode`, payload bytes: decimal.
//! - The payload segment is omitted entirely when there is no payload.
//!
//! Three short sequences bypass the addressed format: `>R` (reset), `>S`
//! and `>T` (local dynamic/static status). Older firmware resets on the
//! control bytes ENQ `\`.
//!
//! # Inbound format
//!
//! ```text
//! <{channel}{node}:{timestamp}:{opcode}:{a0},{a1},... [ignored suffix]
//! <-{error}/{radio state}
//! <+
//! @-{anything}
//! ```
//!
//! `@-` is written by the serial layer of the controller when it received a
//! corrupted radio packet. Any other line (debug output, echo) carries no
//! protocol meaning.
//!
//! # Lenient numeric fields
//!
//! Numeric fields are read the way the controller's own host tooling reads
//! them: leading decimal digits are taken and anything else yields 0. A
//! mangled field therefore degrades to 0 instead of discarding the whole
//! frame. Decoding never fails.

use bytes::{BufMut, BytesMut};
use radiolink_core::{Address, CommandCode, Result};

use crate::commands::{Command, StatusKind};

/// Line terminator the controller expects after every command.
pub const LINE_TERMINATOR: &[u8] = b"\r\n";

/// Marker that closes an addressed command before the line terminator.
pub const COMMAND_END: u8 = b'.';

/// Prefix of a transport-reported corrupted packet.
pub const BAD_FRAME_PREFIX: &str = "@-";

/// Prefix of a controller error report.
pub const ERROR_PREFIX: &str = "<-";

/// Prefix of a controller acknowledgment.
pub const ACK_PREFIX: &str = "<+";

/// How to reset the base controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ResetStyle {
    /// `>R`, understood by current firmware.
    #[default]
    Short,
    /// ENQ followed by a backslash, for the bootloader-era firmware.
    ControlBytes,
}

/// A response line from a node, relayed by the base controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeFrame {
    /// Channel the response arrived on (`'A'`..=`'Z'`).
    pub channel_letter: char,
    pub node: u32,
    /// Controller clock ticks when the packet was received.
    pub timestamp: u32,
    pub opcode: u32,
    pub args: Vec<u32>,
}

impl NodeFrame {
    /// Origin of this frame.
    ///
    /// Decoded frames always carry `'A'`..=`'Z'`. A hand-built frame with any
    /// other letter yields an out-of-range channel, which fails
    /// [`Address::channel_letter`].
    pub fn address(&self) -> Address {
        Address::from_letter(self.channel_letter, self.node).unwrap_or(Address {
            channel: u8::MAX,
            node: self.node,
        })
    }

    pub fn command_code(&self) -> CommandCode {
        CommandCode::from_code(self.opcode)
    }
}

/// One decoded line from the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A response relayed from a node (`<A1:...`).
    Node(NodeFrame),
    /// The controller rejected a command (`<-code/state`).
    Error { code: u32, state: u32 },
    /// The controller accepted a command (`<+`).
    Ack,
    /// A corrupted or malformed frame.
    Bad { raw: String },
    /// Text with no protocol meaning (debug output, echo, noise).
    Unrecognized { raw: String },
}

impl Frame {
    pub fn is_bad(&self) -> bool {
        matches!(self, Frame::Bad { .. })
    }
}

/// Encode an addressed command into wire bytes.
///
/// Fails with [`Error::InvalidChannel`](radiolink_core::Error::InvalidChannel)
/// if the destination channel has no letter.
///
/// # Example
///
/// ```
/// use radiolink_core::CommandCode;
/// use radiolink_protocol::commands::Command;
/// use radiolink_protocol::protocol::encode_command;
///
/// let cmd = Command::builder(CommandCode::SetTime)
///     .node(1)
///     .payload(&[57, 48, 87])
///     .build()
///     .unwrap();
/// assert_eq!(encode_command(&cmd).unwrap(), b">A1:5:57,48,87.\r\n");
/// ```
pub fn encode_command(cmd: &Command) -> Result<Vec<u8>> {
    let destination = cmd.destination();
    let letter = destination.channel_letter()?;

    let mut head = format!(">{letter}{}:{}", destination.node, cmd.opcode().code());
    for (i, byte) in cmd.payload().iter().enumerate() {
        head.push(if i == 0 { ':' } else { ',' });
        head.push_str(&byte.to_string());
    }

    let mut buf = BytesMut::with_capacity(head.len() + 1 + LINE_TERMINATOR.len());
    buf.put_slice(head.as_bytes());
    buf.put_u8(COMMAND_END);
    buf.put_slice(LINE_TERMINATOR);
    Ok(buf.to_vec())
}

/// Encode a controller reset sequence.
pub fn encode_reset(style: ResetStyle) -> Vec<u8> {
    let body: &[u8] = match style {
        ResetStyle::Short => b">R",
        ResetStyle::ControlBytes => b"\x05\\",
    };
    [body, LINE_TERMINATOR].concat()
}

/// Encode a request for the base controller's own status (`>S` or `>T`).
pub fn encode_local_status(kind: StatusKind) -> Vec<u8> {
    let letter = b'S' + kind.flag();
    [&[b'>', letter][..], LINE_TERMINATOR].concat()
}

/// Decode one line received from the controller.
///
/// Trailing CR/LF is stripped and invalid UTF-8 is replaced with U+FFFD
/// before classification. This function is pure and never fails.
///
/// # Example
///
/// ```
/// use radiolink_protocol::protocol::{decode_line, Frame};
///
/// assert_eq!(decode_line(b"<-5/2\n"), Frame::Error { code: 5, state: 2 });
///
/// match decode_line(b"<A1:27598:9:0,6,102,3,112,0,0,0,6") {
///     Frame::Node(frame) => {
///         assert_eq!(frame.node, 1);
///         assert_eq!(frame.opcode, 9);
///         assert_eq!(frame.args.len(), 9);
///     }
///     other => panic!("unexpected frame {other:?}"),
/// }
/// ```
pub fn decode_line(line: &[u8]) -> Frame {
    let text = String::from_utf8_lossy(line);
    let text = text.trim_end_matches(['\r', '\n']);

    if text.starts_with(BAD_FRAME_PREFIX) {
        return Frame::Bad {
            raw: text.to_string(),
        };
    }
    if let Some(rest) = text.strip_prefix(ERROR_PREFIX) {
        return decode_error(rest).unwrap_or_else(|| Frame::Bad {
            raw: text.to_string(),
        });
    }
    if text.starts_with(ACK_PREFIX) {
        return Frame::Ack;
    }
    if let Some(rest) = text.strip_prefix('<') {
        return decode_node(rest)
            .map(Frame::Node)
            .unwrap_or_else(|| Frame::Bad {
                raw: text.to_string(),
            });
    }
    Frame::Unrecognized {
        raw: text.to_string(),
    }
}

/// `code/state`, both fields required.
fn decode_error(rest: &str) -> Option<Frame> {
    let mut fields = rest.split('/');
    let code = fields.next()?;
    let state = fields.next()?;
    Some(Frame::Error {
        code: lenient_u32(code),
        state: lenient_u32(state),
    })
}

/// `A1:timestamp:opcode[:csv[ suffix]]`
fn decode_node(rest: &str) -> Option<NodeFrame> {
    let mut chars = rest.chars();
    let channel_letter = chars.next().filter(char::is_ascii_uppercase)?;
    chars.next().filter(char::is_ascii_digit)?;

    let mut fields = rest.splitn(4, ':');
    let address = fields.next()?;
    let timestamp = fields.next()?;
    let opcode = fields.next()?;
    let payload = fields.next().unwrap_or("");

    Some(NodeFrame {
        channel_letter,
        node: lenient_u32(&address[1..]),
        timestamp: lenient_u32(timestamp),
        opcode: lenient_u32(opcode),
        args: decode_args(payload),
    })
}

/// Comma-separated payload, cut at the first space.
fn decode_args(payload: &str) -> Vec<u32> {
    let payload = payload.split(' ').next().unwrap_or("");
    let payload = payload.trim_end_matches(',');
    if payload.is_empty() {
        return Vec::new();
    }
    payload.split(',').map(lenient_u32).collect()
}

/// Parse the leading decimal digits of `field`, or 0 if there are none.
///
/// Leading whitespace is skipped and values saturate at `u32::MAX`.
pub fn lenient_u32(field: &str) -> u32 {
    field
        .trim_start()
        .bytes()
        .take_while(u8::is_ascii_digit)
        .fold(0u32, |acc, digit| {
            acc.saturating_mul(10).saturating_add(u32::from(digit - b'0'))
        })
}
