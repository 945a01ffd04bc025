//! Status report decoding.
//!
//! A node answers a STATUS request with a STATUS_RESPONSE frame (opcode 9).
//! The first payload field selects the report shape:
//!
//! ```text
//! dynamic: 0, radio_state, time_of_minute, batt_hi, batt_lo, rx_hi, rx_lo, tx_hi, tx_lo
//! static:  n, id0, id1, id2, id3, fw_major, fw_minor
//! ```
//!
//! Sixteen-bit counters are sent high byte first.

use std::fmt;

use radiolink_core::{CommandCode, Error, Result};

use crate::protocol::NodeFrame;

const DYNAMIC_FIELDS: usize = 9;
const STATIC_FIELDS: usize = 7;

/// A decoded status report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusReport {
    Dynamic {
        /// Radio state code, see [`catalog::radio_state_name`](crate::catalog::radio_state_name).
        radio_state: u32,
        time_of_minute: u32,
        /// Battery voltage in controller ADC units.
        battery: u32,
        rx_count: u32,
        tx_count: u32,
    },
    Static {
        id_parts: [u32; 4],
        version_major: u32,
        version_minor: u32,
    },
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusReport::Dynamic {
                radio_state,
                time_of_minute,
                battery,
                rx_count,
                tx_count,
            } => write!(
                f,
                "dynamic: state {radio_state} ({}), ToM {time_of_minute}, battery {battery}, rx {rx_count}, tx {tx_count}",
                crate::catalog::radio_state_name(*radio_state)
            ),
            StatusReport::Static {
                id_parts,
                version_major,
                version_minor,
            } => write!(
                f,
                "static: id {}/{}/{}/{}, firmware v{version_major}.{version_minor}",
                id_parts[0], id_parts[1], id_parts[2], id_parts[3]
            ),
        }
    }
}

/// Decode the payload of a STATUS_RESPONSE frame.
///
/// Returns [`Error::Protocol`] if the frame carries a different opcode and
/// [`Error::Incomplete`] if the payload is shorter than its report shape.
pub fn decode_status(frame: &NodeFrame) -> Result<StatusReport> {
    if frame.command_code() != CommandCode::StatusResponse {
        return Err(Error::Protocol(format!(
            "opcode {} is not a status response",
            frame.opcode
        )));
    }
    let args = &frame.args;
    match args.first() {
        None => Err(Error::Incomplete {
            kind: "status",
            needed: 1,
            got: 0,
        }),
        Some(0) => {
            if args.len() < DYNAMIC_FIELDS {
                return Err(Error::Incomplete {
                    kind: "dynamic",
                    needed: DYNAMIC_FIELDS,
                    got: args.len(),
                });
            }
            Ok(StatusReport::Dynamic {
                radio_state: args[1],
                time_of_minute: args[2],
                battery: word(args[3], args[4]),
                rx_count: word(args[5], args[6]),
                tx_count: word(args[7], args[8]),
            })
        }
        Some(_) => {
            if args.len() < STATIC_FIELDS {
                return Err(Error::Incomplete {
                    kind: "static",
                    needed: STATIC_FIELDS,
                    got: args.len(),
                });
            }
            Ok(StatusReport::Static {
                id_parts: [args[1], args[2], args[3], args[4]],
                version_major: args[5],
                version_minor: args[6],
            })
        }
    }
}

fn word(high: u32, low: u32) -> u32 {
    (high << 8) | low
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_frame(args: &[u32]) -> NodeFrame {
        NodeFrame {
            channel_letter: 'A',
            node: 1,
            timestamp: 27598,
            opcode: 9,
            args: args.to_vec(),
        }
    }

    #[test]
    fn decode_dynamic_report() {
        let report = decode_status(&status_frame(&[0, 6, 102, 3, 112, 0, 0, 0, 6])).unwrap();
        assert_eq!(
            report,
            StatusReport::Dynamic {
                radio_state: 6,
                time_of_minute: 102,
                battery: 880,
                rx_count: 0,
                tx_count: 6,
            }
        );
    }

    #[test]
    fn decode_dynamic_high_byte_first() {
        let report = decode_status(&status_frame(&[0, 5, 0, 0, 1, 1, 0, 2, 3])).unwrap();
        match report {
            StatusReport::Dynamic {
                battery,
                rx_count,
                tx_count,
                ..
            } => {
                assert_eq!(battery, 1);
                assert_eq!(rx_count, 256);
                assert_eq!(tx_count, 515);
            }
            other => panic!("expected dynamic report, got {other:?}"),
        }
    }

    #[test]
    fn decode_static_report() {
        let report = decode_status(&status_frame(&[1, 1, 1, 1, 1, 2, 4])).unwrap();
        assert_eq!(
            report,
            StatusReport::Static {
                id_parts: [1, 1, 1, 1],
                version_major: 2,
                version_minor: 4,
            }
        );
    }

    #[test]
    fn short_dynamic_is_incomplete() {
        let result = decode_status(&status_frame(&[0, 6, 102, 3]));
        assert!(matches!(
            result,
            Err(Error::Incomplete {
                kind: "dynamic",
                needed: 9,
                got: 4
            })
        ));
    }

    #[test]
    fn short_static_is_incomplete() {
        let result = decode_status(&status_frame(&[1, 1, 1]));
        assert!(matches!(
            result,
            Err(Error::Incomplete {
                kind: "static",
                needed: 7,
                got: 3
            })
        ));
    }

    #[test]
    fn empty_payload_is_incomplete() {
        assert!(matches!(
            decode_status(&status_frame(&[])),
            Err(Error::Incomplete { got: 0, .. })
        ));
    }

    #[test]
    fn other_opcodes_are_rejected() {
        let mut frame = status_frame(&[0, 6, 102, 3, 112, 0, 0, 0, 6]);
        frame.opcode = 10;
        assert!(matches!(decode_status(&frame), Err(Error::Protocol(_))));
    }

    #[test]
    fn display_names_radio_state() {
        let report = decode_status(&status_frame(&[0, 6, 102, 3, 112, 0, 0, 0, 6])).unwrap();
        assert_eq!(
            report.to_string(),
            "dynamic: state 6 (Active), ToM 102, battery 880, rx 0, tx 6"
        );
        let report = decode_status(&status_frame(&[1, 1, 1, 1, 1, 2, 4])).unwrap();
        assert_eq!(report.to_string(), "static: id 1/1/1/1, firmware v2.4");
    }
}
