//! CAN broadcast evaluation
//!
//! The SUT transmits periodic frames on every controller and logs each one;
//! the Tester logs the frames it receives. Logged payloads must be identical
//! and the received frames must keep their period.

use super::{channels, on_channel, select, Evaluation, Findings, Subsystem, SubsystemEvaluator};
use crate::config::TimingBounds;
use crate::message::{DeviceRole, SerialMessage};
use crate::runner::MergedLog;

const CAN_MARKER: &str = "can@";
/// Width of `can@40006400`
const CHANNEL_WIDTH: usize = 12;

#[derive(Debug, Clone)]
pub struct CanEvaluator {
    frame_spacing: TimingBounds,
}

impl CanEvaluator {
    pub fn new(frame_spacing: TimingBounds) -> Self {
        Self { frame_spacing }
    }

    fn check(&self, output: &[SerialMessage], findings: &mut Findings) {
        let sent = select(output, DeviceRole::Sut, |p| p.contains(CAN_MARKER));
        let received = select(output, DeviceRole::Tester, |p| p.contains(CAN_MARKER));

        for channel in channels(&[received.as_slice(), sent.as_slice()], CHANNEL_WIDTH) {
            let sent = on_channel(&sent, channel, CHANNEL_WIDTH);
            let received = on_channel(&received, channel, CHANNEL_WIDTH);

            if !findings.check_counts(
                channel,
                &[
                    ("sent frames", sent.len()),
                    ("received frames", received.len()),
                ],
            ) {
                findings.error(format!(
                    "{}: Skipping equality check since number of messages do not match",
                    channel
                ));
                continue;
            }

            for (index, (s, r)) in sent.iter().zip(&received).enumerate() {
                if s.payload != r.payload {
                    findings.error(format!(
                        "{}: Payload mismatch at index {}. Send {}, Received {}",
                        channel, index, s.payload, r.payload
                    ));
                }
            }

            if received.len() < 2 {
                findings.error(format!(
                    "{}: can not assert frequency because sample size is < 2 messages",
                    channel
                ));
                continue;
            }
            findings.check_spacing(channel, "frame", &received, self.frame_spacing);
        }
    }
}

impl SubsystemEvaluator for CanEvaluator {
    fn subsystem(&self) -> Subsystem {
        Subsystem::Can
    }

    fn evaluate(&self, output: MergedLog) -> Evaluation {
        let mut findings = Findings::default();
        self.check(&output, &mut findings);
        Evaluation::new(Subsystem::Can, output, findings)
    }
}
