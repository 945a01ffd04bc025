//! Names for controller error codes and radio states.

/// Placeholder returned for codes outside either table.
pub const UNKNOWN_CODE: &str = "Unknown Code";

const CONTROL_ERRORS: [&str; 9] = [
    "No Error",
    "Invalid Channel",
    "Busy",
    "Too Much Data",
    "Too Big",
    "Newline",
    "Radio Not Active",
    "Power Failure",
    "Bad Command",
];

const RADIO_STATES: [&str; 7] = [
    "Startup",
    "Error State",
    "Low Battery",
    "Cold Start",
    "Warm Start",
    "Listening",
    "Active",
];

/// Meaning of an error code from a `<-code/state` frame.
pub fn error_name(code: u32) -> &'static str {
    lookup(&CONTROL_ERRORS, code)
}

/// Meaning of a radio state code (error frames and dynamic status).
pub fn radio_state_name(state: u32) -> &'static str {
    lookup(&RADIO_STATES, state)
}

fn lookup(table: &[&'static str], code: u32) -> &'static str {
    usize::try_from(code)
        .ok()
        .and_then(|i| table.get(i))
        .copied()
        .unwrap_or(UNKNOWN_CODE)
}
