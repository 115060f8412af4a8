//! Device log line parser
//!
//! Both devices report over their serial console in the Zephyr log format:
//!
//! ```text
//! [<time_ms>] <<level>> <device>: <payload>
//! ```
//!
//! A line wrapped in `***` on both ends is a boot banner. It means the device
//! reset and is reported separately from regular events.

use std::fmt;
use std::num::ParseIntError;

use thiserror::Error;

const BOOT_BANNER_MARKER: &str = "***";

/// Severity token of a device log line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogLevel {
    Err,
    Wrn,
    Inf,
    Dbg,
    Other(String),
}

impl LogLevel {
    fn from_token(token: &str) -> Self {
        match token {
            "err" => Self::Err,
            "wrn" => Self::Wrn,
            "inf" => Self::Inf,
            "dbg" => Self::Dbg,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Err => "err",
            Self::Wrn => "wrn",
            Self::Inf => "inf",
            Self::Dbg => "dbg",
            Self::Other(token) => token,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Logical origin of an event, independent of the link it arrived on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceRole {
    Sut,
    Tester,
}

impl DeviceRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sut => "sut",
            Self::Tester => "tester",
        }
    }

    /// Case-insensitive match against a device tag
    pub fn matches(self, device: &str) -> bool {
        device.eq_ignore_ascii_case(self.as_str())
    }
}

impl fmt::Display for DeviceRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One structured event reported by a device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialMessage {
    /// Device-local uptime in milliseconds
    pub time_ms: u64,
    pub level: LogLevel,
    /// Device tag as printed by the firmware
    pub device: String,
    pub payload: String,
}

impl SerialMessage {
    pub fn is_from(&self, role: DeviceRole) -> bool {
        role.matches(&self.device)
    }

    pub fn is_error(&self) -> bool {
        self.level == LogLevel::Err
    }

    /// Last payload character, compared by the UART and LIN checks
    pub fn last_char(&self) -> Option<char> {
        self.payload.chars().last()
    }
}

impl fmt::Display for SerialMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] <{}> {}: {}",
            self.time_ms, self.level, self.device, self.payload
        )
    }
}

/// Outcome of parsing a single line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedLine {
    Message(SerialMessage),
    /// The full banner line; the device rebooted
    BootBanner(String),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("Expected \"[time] <level> device: payload\", got \"{line}\"")]
    MissingFields { line: String },

    #[error("Invalid timestamp in \"{line}\": {source}")]
    InvalidTimestamp {
        line: String,
        #[source]
        source: ParseIntError,
    },
}

/// Parse one line with its terminator already stripped
pub fn parse_line(line: &str) -> Result<ParsedLine, ParseError> {
    if line.starts_with(BOOT_BANNER_MARKER) && line.ends_with(BOOT_BANNER_MARKER) {
        return Ok(ParsedLine::BootBanner(line.to_string()));
    }

    let missing = || ParseError::MissingFields {
        line: line.to_string(),
    };

    let (raw_timestamp, rest) = next_field(line).ok_or_else(missing)?;
    let (raw_level, rest) = next_field(rest).ok_or_else(missing)?;
    let (raw_device, rest) = next_field(rest).ok_or_else(missing)?;
    let payload = rest.trim();
    if payload.is_empty() {
        return Err(missing());
    }

    let time_ms = raw_timestamp
        .trim_matches(|c| c == '[' || c == ']')
        .parse::<u64>()
        .map_err(|source| ParseError::InvalidTimestamp {
            line: line.to_string(),
            source,
        })?;

    Ok(ParsedLine::Message(SerialMessage {
        time_ms,
        level: LogLevel::from_token(raw_level.trim_matches(|c| c == '<' || c == '>')),
        device: raw_device.trim_end_matches(':').to_string(),
        payload: payload.to_string(),
    }))
}

/// Split off the next whitespace-delimited field, keeping the remainder verbatim
fn next_field(input: &str) -> Option<(&str, &str)> {
    let input = input.trim_start();
    let end = input.find(char::is_whitespace)?;
    Some((&input[..end], &input[end..]))
}
