//! Hardware identity handshake
//!
//! Both devices print their unique id (`id: <hex>`) during the `hwInfo`
//! phase. Exactly one id must come from the SUT and exactly one from the
//! Tester; the SUT id names the report file.

use std::fmt;

use thiserror::Error;
use tracing::{error, info};

use crate::error::HarnessError;
use crate::message::{DeviceRole, SerialMessage};
use crate::runner::{MergedLog, PhaseExecutor};

pub const HW_INFO_START: &str = "hwInfo start";
pub const HW_INFO_STOP: &str = "hwInfo stop";

const ID_MARKER: &str = "id:";
const ID_PREFIX: &str = "id: ";
const EXPECTED_ID_MESSAGES: usize = 2;

/// What is wrong with the id messages of one role
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoleProblem {
    Missing(DeviceRole),
    Duplicate(DeviceRole, usize),
}

impl fmt::Display for RoleProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing(role) => write!(f, "{} lookup failed: no id message", role),
            Self::Duplicate(role, count) => {
                write!(f, "{} lookup failed: {} id messages, expected 1", role, count)
            }
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdentityError {
    #[error(
        "Error reading hardware information. Expected {} messages. Got {}: [{}]",
        EXPECTED_ID_MESSAGES,
        .found,
        .messages.join("; ")
    )]
    MessageCount { found: usize, messages: Vec<String> },

    #[error("Hardware info lookup failed: {}", join_problems(.0))]
    Roles(Vec<RoleProblem>),
}

fn join_problems(problems: &[RoleProblem]) -> String {
    problems
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Validated identity of both devices
#[derive(Debug, Clone)]
pub struct HardwareInfo {
    output: MergedLog,
    sut: SerialMessage,
    tester: SerialMessage,
}

impl HardwareInfo {
    /// Run the `hwInfo` phase and validate the reported ids
    pub async fn fetch(executor: &mut dyn PhaseExecutor) -> Result<Self, HarnessError> {
        let output = executor.run_phase(HW_INFO_START, HW_INFO_STOP).await?;
        let info = Self::from_log(output)?;
        info!(sut_id = info.sut_id(), tester_id = info.tester_id(), "Hardware information fetched");
        Ok(info)
    }

    /// Validate the id messages of an already collected `hwInfo` log
    pub fn from_log(output: MergedLog) -> Result<Self, IdentityError> {
        let id_messages: Vec<&SerialMessage> = output
            .iter()
            .filter(|m| m.payload.contains(ID_MARKER))
            .collect();

        if id_messages.len() != EXPECTED_ID_MESSAGES {
            let messages: Vec<String> = id_messages.iter().map(ToString::to_string).collect();
            error!(
                found = id_messages.len(),
                ?messages,
                "Unexpected number of hardware information messages"
            );
            return Err(IdentityError::MessageCount {
                found: id_messages.len(),
                messages,
            });
        }

        let mut problems = Vec::new();
        let sut = single_role_message(&id_messages, DeviceRole::Sut, &mut problems);
        let tester = single_role_message(&id_messages, DeviceRole::Tester, &mut problems);

        match (sut, tester) {
            (Some(sut), Some(tester)) => {
                let (sut, tester) = (sut.clone(), tester.clone());
                Ok(Self {
                    output,
                    sut,
                    tester,
                })
            }
            _ => {
                error!(problems = %join_problems(&problems), "Hardware information lookup failed");
                Err(IdentityError::Roles(problems))
            }
        }
    }

    pub fn sut_id(&self) -> &str {
        strip_id(&self.sut)
    }

    pub fn tester_id(&self) -> &str {
        strip_id(&self.tester)
    }

    pub fn output(&self) -> &[SerialMessage] {
        &self.output
    }

    pub fn serialize_information(&self) -> String {
        [
            format!("SUT ID: {}", self.sut_id()),
            format!("Tester ID: {}", self.tester_id()),
        ]
        .join("\n")
    }

    pub fn serialize_logs(&self) -> String {
        let mut lines = vec!["Hardware Information Log:".to_string()];
        lines.extend(self.output.iter().map(|m| format!("  {}", m)));
        lines.join("\n")
    }
}

fn single_role_message<'a>(
    messages: &[&'a SerialMessage],
    role: DeviceRole,
    problems: &mut Vec<RoleProblem>,
) -> Option<&'a SerialMessage> {
    let matches: Vec<&SerialMessage> = messages
        .iter()
        .copied()
        .filter(|m| m.is_from(role))
        .collect();

    match matches.as_slice() {
        [single] => Some(*single),
        [] => {
            problems.push(RoleProblem::Missing(role));
            None
        }
        many => {
            problems.push(RoleProblem::Duplicate(role, many.len()));
            None
        }
    }
}

fn strip_id(message: &SerialMessage) -> &str {
    message
        .payload
        .strip_prefix(ID_PREFIX)
        .unwrap_or(&message.payload)
}
