//! Serial device configuration.
//!
//! The device is given as `path:baud`, for example `/dev/ttyUSB0:38400`.
//! The split happens at the last colon so paths containing colons still
//! parse.

use std::fmt;
use std::str::FromStr;

use radiolink_core::{Error, Result};

/// Baud rates a serial adapter can be asked for.
pub const STANDARD_BAUD_RATES: &[u32] = &[
    50, 75, 110, 134, 150, 200, 300, 600, 1200, 1800, 2400, 4800, 9600, 19200, 38400, 57600,
    115200, 230400,
];

/// Environment variable consulted for the device when none is given.
pub const DEVICE_ENV: &str = "SERIAL_DEVICE";

/// A serial device path and baud rate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceSpec {
    pub path: String,
    pub baud_rate: u32,
}

impl DeviceSpec {
    pub fn new(path: &str, baud_rate: u32) -> Result<Self> {
        if path.is_empty() {
            return Err(Error::ConfigInvalid("device path is empty".into()));
        }
        if !STANDARD_BAUD_RATES.contains(&baud_rate) {
            return Err(Error::ConfigInvalid(format!(
                "unsupported baud rate {baud_rate}"
            )));
        }
        Ok(DeviceSpec {
            path: path.to_string(),
            baud_rate,
        })
    }
}

impl FromStr for DeviceSpec {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let (path, baud) = s.rsplit_once(':').ok_or_else(|| {
            Error::ConfigInvalid(format!("expected path:baud, got {s:?}"))
        })?;
        let baud_rate = baud
            .parse::<u32>()
            .map_err(|_| Error::ConfigInvalid(format!("baud rate {baud:?} is not a number")))?;
        DeviceSpec::new(path, baud_rate)
    }
}

impl fmt::Display for DeviceSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.path, self.baud_rate)
    }
}
