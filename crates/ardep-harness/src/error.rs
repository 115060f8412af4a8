//! Harness errors
//!
//! Everything in here is fatal to the run. Protocol and timing violations
//! found by the evaluators are data, not errors, and never show up here.

use std::path::PathBuf;

use thiserror::Error;

use crate::identity::IdentityError;
use crate::link::LinkError;
use crate::message::ParseError;

#[derive(Debug, Error)]
pub enum HarnessError {
    /// Link I/O failure (closed port, read timeout, write error)
    #[error(transparent)]
    Link(#[from] LinkError),

    /// Malformed non-banner line during a phase
    #[error("Error parsing line from {port}: {source}")]
    Parse {
        port: String,
        #[source]
        source: ParseError,
    },

    #[error("Read empty line from {port}")]
    EmptyLine { port: String },

    #[error("{port} did not report idle true after {attempts} attempts")]
    NotIdle { port: String, attempts: u32 },

    /// At least one link never reported the stop payload in time
    #[error(
        "Phase \"{}\" incomplete after {}ms: no stop message from {} ({} events collected)",
        .start,
        .timeout_ms,
        .pending.join(", "),
        .collected
    )]
    PhaseIncomplete {
        start: String,
        timeout_ms: u64,
        pending: Vec<String>,
        collected: usize,
    },

    #[error("Merge queue closed while {port} was still reading")]
    MergeClosed { port: String },

    #[error(transparent)]
    Identity(#[from] IdentityError),

    #[error("Failed to write report {}: {}", .path.display(), .source)]
    Report {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type HarnessResult<T> = Result<T, HarnessError>;
