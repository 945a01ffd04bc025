//! Core types shared by every radiolink crate.
//!
//! These types describe the addressing and command vocabulary of a radio base
//! controller: lettered channels, numbered nodes, and the small set of
//! opcodes the controller firmware understands.

use std::fmt;
use std::time::Duration;

use crate::error::{Error, Result};

/// Highest channel number that can be expressed as a single letter (`Z`).
pub const MAX_CHANNEL: u8 = 25;

/// Largest payload the base controller will accept in one command.
pub const MAX_PAYLOAD: usize = 46;

/// Highest application-defined opcode (`USER4`).
pub const MAX_USER_OPCODE: u8 = 4;

/// Destination of a command or origin of a response.
///
/// The channel is carried on the wire as an uppercase letter
/// (`'A' + channel`), the node as decimal digits. An `Address` can hold any
/// channel value; [`Address::new`] and [`Address::channel_letter`] enforce the
/// `0..=25` range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Address {
    /// Channel number, `0` for `A` through `25` for `Z`.
    pub channel: u8,
    /// Node number within the channel.
    pub node: u32,
}

impl Address {
    /// The base controller itself (`A0`).
    pub const CONTROLLER: Address = Address {
        channel: 0,
        node: 0,
    };

    /// Create an address, rejecting channels that have no letter.
    pub fn new(channel: u8, node: u32) -> Result<Self> {
        if channel > MAX_CHANNEL {
            return Err(Error::InvalidChannel(channel));
        }
        Ok(Address { channel, node })
    }

    /// Build an address from a wire channel letter.
    ///
    /// Returns `None` for anything other than `A`..=`Z`.
    pub fn from_letter(letter: char, node: u32) -> Option<Self> {
        if letter.is_ascii_uppercase() {
            Some(Address {
                channel: letter as u8 - b'A',
                node,
            })
        } else {
            None
        }
    }

    /// The wire letter for this address's channel.
    pub fn channel_letter(&self) -> Result<char> {
        if self.channel > MAX_CHANNEL {
            return Err(Error::InvalidChannel(self.channel));
        }
        Ok((b'A' + self.channel) as char)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.channel_letter() {
            Ok(letter) => write!(f, "{letter}{}", self.node),
            Err(_) => write!(f, "ch{}/{}", self.channel, self.node),
        }
    }
}

/// Opcode carried by a command or a node frame.
///
/// Codes outside the known set pass through as [`CommandCode::Unknown`] so
/// that traffic from newer firmware can still be logged and forwarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandCode {
    Noop,
    Firmware,
    Status,
    Activate,
    Deactivate,
    SetTime,
    SetDate,
    ReadEeprom,
    WriteEeprom,
    StatusResponse,
    EepromResponse,
    /// Application-defined opcodes `USER0`..=`USER4` (16..=20).
    User(u8),
    Unknown(u32),
}

impl CommandCode {
    /// Application opcode `USER{n}`. Only `0..=4` exist on the wire.
    pub fn user(n: u8) -> Result<Self> {
        if n > MAX_USER_OPCODE {
            return Err(Error::InvalidParameter(format!(
                "USER{n} is not an opcode (USER0..=USER{MAX_USER_OPCODE})"
            )));
        }
        Ok(CommandCode::User(n))
    }

    /// Numeric value of this opcode as sent on the wire.
    pub fn code(&self) -> u32 {
        match self {
            CommandCode::Noop => 0,
            CommandCode::Firmware => 1,
            CommandCode::Status => 2,
            CommandCode::Activate => 3,
            CommandCode::Deactivate => 4,
            CommandCode::SetTime => 5,
            CommandCode::SetDate => 6,
            CommandCode::ReadEeprom => 7,
            CommandCode::WriteEeprom => 8,
            CommandCode::StatusResponse => 9,
            CommandCode::EepromResponse => 10,
            CommandCode::User(n) => 16 + u32::from(*n),
            CommandCode::Unknown(code) => *code,
        }
    }

    /// Map a wire value back to an opcode.
    pub fn from_code(code: u32) -> Self {
        match code {
            0 => CommandCode::Noop,
            1 => CommandCode::Firmware,
            2 => CommandCode::Status,
            3 => CommandCode::Activate,
            4 => CommandCode::Deactivate,
            5 => CommandCode::SetTime,
            6 => CommandCode::SetDate,
            7 => CommandCode::ReadEeprom,
            8 => CommandCode::WriteEeprom,
            9 => CommandCode::StatusResponse,
            10 => CommandCode::EepromResponse,
            16..=20 => CommandCode::User((code - 16) as u8),
            other => CommandCode::Unknown(other),
        }
    }

    /// `true` for opcodes that survive a trip through [`CommandCode::from_code`].
    pub fn is_known(&self) -> bool {
        match self {
            CommandCode::User(n) => *n <= MAX_USER_OPCODE,
            CommandCode::Unknown(_) => false,
            _ => true,
        }
    }
}

impl fmt::Display for CommandCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandCode::Noop => write!(f, "NOOP"),
            CommandCode::Firmware => write!(f, "FIRMWARE"),
            CommandCode::Status => write!(f, "STATUS"),
            CommandCode::Activate => write!(f, "ACTIVATE"),
            CommandCode::Deactivate => write!(f, "DEACTIVATE"),
            CommandCode::SetTime => write!(f, "SET_TIME"),
            CommandCode::SetDate => write!(f, "SET_DATE"),
            CommandCode::ReadEeprom => write!(f, "READ_EEPROM"),
            CommandCode::WriteEeprom => write!(f, "WRITE_EEPROM"),
            CommandCode::StatusResponse => write!(f, "STATUS_RESPONSE"),
            CommandCode::EepromResponse => write!(f, "EEPROM_RESPONSE"),
            CommandCode::User(n) => write!(f, "USER{n}"),
            CommandCode::Unknown(code) => write!(f, "UNKNOWN({code})"),
        }
    }
}

/// Health of the serial link as judged by the link supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LinkState {
    #[default]
    Healthy,
    /// Corrupted frames are arriving but the tolerance is not exhausted.
    Degraded,
    /// Terminal. The session must stop.
    Aborted,
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkState::Healthy => write!(f, "healthy"),
            LinkState::Degraded => write!(f, "degraded"),
            LinkState::Aborted => write!(f, "aborted"),
        }
    }
}

/// Why a session was torn down.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbortReason {
    /// More consecutive corrupted frames than the configured tolerance.
    BadFrames { count: u32 },
    /// The controller reported an error code outside the recoverable set.
    ControllerError { code: u32, state: u32 },
    /// Nothing was heard from the controller for longer than the timeout.
    ActivityTimeout { idle: Duration },
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbortReason::BadFrames { count } => {
                write!(f, "{count} consecutive bad frames")
            }
            AbortReason::ControllerError { code, state } => {
                write!(f, "controller error code {code} (radio state {state})")
            }
            AbortReason::ActivityTimeout { idle } => {
                write!(f, "no traffic from controller for {}s", idle.as_secs())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_letters_cover_alphabet() {
        for channel in 0..=MAX_CHANNEL {
            let addr = Address::new(channel, 1).unwrap();
            assert_eq!(addr.channel_letter().unwrap(), (b'A' + channel) as char);
        }
    }

    #[test]
    fn address_rejects_channel_26() {
        assert!(matches!(Address::new(26, 0), Err(Error::InvalidChannel(26))));
        let raw = Address {
            channel: 26,
            node: 0,
        };
        assert!(matches!(raw.channel_letter(), Err(Error::InvalidChannel(26))));
    }

    #[test]
    fn address_from_letter() {
        assert_eq!(
            Address::from_letter('B', 3),
            Some(Address {
                channel: 1,
                node: 3
            })
        );
        assert_eq!(Address::from_letter('b', 3), None);
        assert_eq!(Address::from_letter('-', 3), None);
    }

    #[test]
    fn address_display() {
        assert_eq!(Address::CONTROLLER.to_string(), "A0");
        assert_eq!(Address::new(1, 3).unwrap().to_string(), "B3");
        let raw = Address {
            channel: 40,
            node: 2,
        };
        assert_eq!(raw.to_string(), "ch40/2");
    }

    #[test]
    fn command_code_values() {
        assert_eq!(CommandCode::Noop.code(), 0);
        assert_eq!(CommandCode::Status.code(), 2);
        assert_eq!(CommandCode::StatusResponse.code(), 9);
        assert_eq!(CommandCode::EepromResponse.code(), 10);
        assert_eq!(CommandCode::User(0).code(), 16);
        assert_eq!(CommandCode::User(4).code(), 20);
    }

    #[test]
    fn command_code_from_wire() {
        for code in (0..=10).chain(16..=20) {
            let cc = CommandCode::from_code(code);
            assert!(cc.is_known());
            assert_eq!(cc.code(), code);
        }
        assert_eq!(CommandCode::from_code(12), CommandCode::Unknown(12));
        assert_eq!(CommandCode::from_code(300).code(), 300);
    }

    #[test]
    fn user_opcodes_are_bounded() {
        assert_eq!(CommandCode::user(4).unwrap(), CommandCode::User(4));
        assert!(matches!(
            CommandCode::user(5),
            Err(Error::InvalidParameter(_))
        ));
        assert!(!CommandCode::User(9).is_known());
    }

    #[test]
    fn command_code_display() {
        assert_eq!(CommandCode::SetTime.to_string(), "SET_TIME");
        assert_eq!(CommandCode::User(2).to_string(), "USER2");
        assert_eq!(CommandCode::Unknown(99).to_string(), "UNKNOWN(99)");
    }

    #[test]
    fn abort_reason_display() {
        let r = AbortReason::ControllerError { code: 3, state: 2 };
        assert_eq!(r.to_string(), "controller error code 3 (radio state 2)");
        let r = AbortReason::ActivityTimeout {
            idle: Duration::from_secs(61),
        };
        assert_eq!(r.to_string(), "no traffic from controller for 61s");
    }
}
