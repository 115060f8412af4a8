//! Link layer errors

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("Failed to open {port}: {reason}")]
    Open { port: String, reason: String },

    #[error("Write to {port} failed: {source}")]
    Write {
        port: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Read from {port} failed: {source}")]
    Read {
        port: String,
        #[source]
        source: std::io::Error,
    },

    #[error("No response from {port} within {timeout_ms}ms")]
    Timeout { port: String, timeout_ms: u64 },

    #[error("Connection to {port} closed")]
    Closed { port: String },

    #[error("Received non-ascii line from {port}: {line:?}")]
    NonAscii { port: String, line: String },
}

impl LinkError {
    /// Port the error originated from
    pub fn port(&self) -> &str {
        match self {
            Self::Open { port, .. }
            | Self::Write { port, .. }
            | Self::Read { port, .. }
            | Self::Timeout { port, .. }
            | Self::Closed { port }
            | Self::NonAscii { port, .. } => port,
        }
    }
}
