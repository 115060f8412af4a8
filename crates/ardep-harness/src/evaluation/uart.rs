//! UART echo evaluation
//!
//! The Tester sends one character at a time on each of its UARTs. The SUT
//! echoes what it receives and the Tester logs the echo coming back, so every
//! channel has three sequences: sent, received by SUT, received by Tester.
//!
//! The firmware paces characters only a few milliseconds apart, so send
//! spacing is checked only when bounds are configured.

use super::{
    channels, last_char, on_channel, select, Evaluation, Findings, Subsystem, SubsystemEvaluator,
};
use crate::config::TimingBounds;
use crate::message::{DeviceRole, SerialMessage};
use crate::runner::MergedLog;

const SERIAL_MARKER: &str = "serial@";
/// Width of `serial@40013800`
const CHANNEL_WIDTH: usize = 15;

#[derive(Debug, Clone)]
pub struct UartEvaluator {
    send_spacing: Option<TimingBounds>,
}

impl UartEvaluator {
    pub fn new(send_spacing: Option<TimingBounds>) -> Self {
        Self { send_spacing }
    }

    fn check(&self, output: &[SerialMessage], findings: &mut Findings) {
        let sent = select(output, DeviceRole::Tester, |p| {
            p.contains(SERIAL_MARKER) && p.contains("send")
        });
        let tester_received = select(output, DeviceRole::Tester, |p| {
            p.contains(SERIAL_MARKER) && p.contains("received")
        });
        let sut_received = select(output, DeviceRole::Sut, |p| {
            p.contains(SERIAL_MARKER) && p.contains("received")
        });

        if sent.is_empty() {
            findings.error("No messages sent by tester");
            return;
        }

        let all = [
            sent.as_slice(),
            tester_received.as_slice(),
            sut_received.as_slice(),
        ];
        for channel in channels(&all, CHANNEL_WIDTH) {
            let sent = on_channel(&sent, channel, CHANNEL_WIDTH);
            let sut_received = on_channel(&sut_received, channel, CHANNEL_WIDTH);
            let tester_received = on_channel(&tester_received, channel, CHANNEL_WIDTH);

            let counts_match = findings.check_counts(
                channel,
                &[
                    ("sent messages", sent.len()),
                    ("received messages (on SUT)", sut_received.len()),
                    ("received messages (on tester)", tester_received.len()),
                ],
            );
            if !counts_match {
                findings.error(format!(
                    "{}: Skipping equality check since number of messages do not match",
                    channel
                ));
                continue;
            }

            for (index, ((s, sut), tester)) in
                sent.iter().zip(&sut_received).zip(&tester_received).enumerate()
            {
                if s.last_char() != sut.last_char() {
                    findings.error(format!(
                        "{}: Character at index {} sent by tester ({}) does not match character received by SUT ({})",
                        channel,
                        index,
                        last_char(s),
                        last_char(sut)
                    ));
                }
                if s.last_char() != tester.last_char() {
                    findings.error(format!(
                        "{}: Character at index {} sent by tester ({}) does not match character received by tester ({})",
                        channel,
                        index,
                        last_char(s),
                        last_char(tester)
                    ));
                }
            }

            if let Some(bounds) = self.send_spacing {
                findings.check_spacing(channel, "send", &sent, bounds);
            }
        }
    }
}

impl SubsystemEvaluator for UartEvaluator {
    fn subsystem(&self) -> Subsystem {
        Subsystem::Uart
    }

    fn evaluate(&self, output: MergedLog) -> Evaluation {
        let mut findings = Findings::default();
        self.check(&output, &mut findings);
        Evaluation::new(Subsystem::Uart, output, findings)
    }
}
