//! LIN frame evaluation
//!
//! The SUT acts as commander and sends frames over its LIN UARTs; the Tester
//! logs every frame it receives. Only the last data byte is logged in a
//! comparable form, so equality is checked on the last character.

use super::{
    channels, last_char, on_channel, select, Evaluation, Findings, Subsystem, SubsystemEvaluator,
};
use crate::config::TimingBounds;
use crate::message::{DeviceRole, SerialMessage};
use crate::runner::MergedLog;

const SERIAL_MARKER: &str = "serial@";
const CHANNEL_WIDTH: usize = 15;

#[derive(Debug, Clone)]
pub struct LinEvaluator {
    frame_spacing: TimingBounds,
}

impl LinEvaluator {
    pub fn new(frame_spacing: TimingBounds) -> Self {
        Self { frame_spacing }
    }

    fn check(&self, output: &[SerialMessage], findings: &mut Findings) {
        let sent = select(output, DeviceRole::Sut, |p| {
            p.contains(SERIAL_MARKER) && p.contains("sending")
        });
        let received = select(output, DeviceRole::Tester, |p| {
            p.contains(SERIAL_MARKER) && p.contains("received")
        });

        if sent.is_empty() {
            findings.error("No messages sent by SUT");
        }
        if received.is_empty() {
            findings.error("No messages received by tester");
        }
        if sent.is_empty() || received.is_empty() {
            return;
        }

        for channel in channels(&[sent.as_slice(), received.as_slice()], CHANNEL_WIDTH) {
            let sent = on_channel(&sent, channel, CHANNEL_WIDTH);
            let received = on_channel(&received, channel, CHANNEL_WIDTH);

            if !findings.check_counts(
                channel,
                &[
                    ("sent messages", sent.len()),
                    ("received messages", received.len()),
                ],
            ) {
                findings.error(format!(
                    "{}: Skipping equality check since number of messages do not match",
                    channel
                ));
                continue;
            }

            for (index, (s, r)) in sent.iter().zip(&received).enumerate() {
                if s.last_char() != r.last_char() {
                    findings.error(format!(
                        "{}: Send message '{}' does not match received message '{}' at index {} ({} != {})",
                        channel,
                        s.payload,
                        r.payload,
                        index,
                        last_char(s),
                        last_char(r)
                    ));
                }
            }

            findings.check_spacing(channel, "frame", &received, self.frame_spacing);
        }
    }
}

impl SubsystemEvaluator for LinEvaluator {
    fn subsystem(&self) -> Subsystem {
        Subsystem::Lin
    }

    fn evaluate(&self, output: MergedLog) -> Evaluation {
        let mut findings = Findings::default();
        self.check(&output, &mut findings);
        Evaluation::new(Subsystem::Lin, output, findings)
    }
}
