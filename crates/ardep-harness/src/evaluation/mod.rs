//! Subsystem evaluators
//!
//! Each evaluator consumes the merged log of its phase and checks the
//! protocol invariants of one peripheral class:
//!
//! - existence: the phase produced the activity it is supposed to
//! - count correlation: per channel, every role reports the same number of
//!   events (a mismatch skips the remaining checks for that channel)
//! - pairwise equality: matched sequences agree index by index
//! - timing: consecutive events of one device stay within a spacing window
//!
//! Violations are collected as human-readable diagnostics. They never abort
//! the run; they only make [`Evaluation::has_errors`] true.

pub mod can;
pub mod gpio;
pub mod lin;
pub mod uart;

pub use can::CanEvaluator;
pub use gpio::GpioEvaluator;
pub use lin::LinEvaluator;
pub use uart::UartEvaluator;

use std::fmt;

use async_trait::async_trait;
use tracing::{error, info};

use crate::config::TimingBounds;
use crate::error::HarnessError;
use crate::message::{DeviceRole, SerialMessage};
use crate::runner::{MergedLog, PhaseExecutor};

/// Peripheral class exercised by one phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Subsystem {
    Gpio,
    Uart,
    Can,
    Lin,
}

impl Subsystem {
    /// Command token understood by the firmware
    pub fn command(self) -> &'static str {
        match self {
            Self::Gpio => "gpio",
            Self::Uart => "uart",
            Self::Can => "can",
            Self::Lin => "lin",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Gpio => "GPIO",
            Self::Uart => "UART",
            Self::Can => "CAN",
            Self::Lin => "LIN",
        }
    }

    pub fn start_command(self) -> String {
        format!("{} start", self.command())
    }

    pub fn stop_payload(self) -> String {
        format!("{} stop", self.command())
    }
}

impl fmt::Display for Subsystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Checker for one subsystem
///
/// Evaluators hold only configuration. Every run produces a fresh
/// [`Evaluation`], so results of different runs can never alias.
#[async_trait]
pub trait SubsystemEvaluator: Send + Sync {
    fn subsystem(&self) -> Subsystem;

    /// Check the merged log of this subsystem's phase
    fn evaluate(&self, output: MergedLog) -> Evaluation;

    /// Run the phase through `executor` and evaluate its log
    async fn run(&self, executor: &mut dyn PhaseExecutor) -> Result<Evaluation, HarnessError> {
        let subsystem = self.subsystem();
        let output = executor
            .run_phase(&subsystem.start_command(), &subsystem.stop_payload())
            .await?;

        let evaluation = self.evaluate(output);
        if evaluation.has_errors() {
            error!(
                %subsystem,
                diagnostics = evaluation.diagnostics().len(),
                serial_errors = evaluation.serial_errors().len(),
                "Evaluation found errors"
            );
        } else {
            info!(%subsystem, "Evaluation passed");
        }
        Ok(evaluation)
    }
}

/// Diagnostics and notes collected while checking one log
#[derive(Debug, Default)]
pub struct Findings {
    diagnostics: Vec<String>,
    notes: Vec<String>,
}

impl Findings {
    /// Record an invariant violation
    pub fn error(&mut self, diagnostic: impl Into<String>) {
        self.diagnostics.push(diagnostic.into());
    }

    /// Record an informational line for the summary
    pub fn note(&mut self, note: impl Into<String>) {
        self.notes.push(note.into());
    }

    /// Compare every count against the first one
    ///
    /// Returns `true` when all counts match.
    pub fn check_counts(&mut self, channel: &str, counts: &[(&str, usize)]) -> bool {
        let Some(&(reference_label, reference)) = counts.first() else {
            return true;
        };

        let mut matching = true;
        for &(label, count) in &counts[1..] {
            if count != reference {
                self.error(format!(
                    "{}: Number of {} ({}) does not match number of {} ({})",
                    channel, reference_label, reference, label, count
                ));
                matching = false;
            }
        }
        matching
    }

    /// Check the spacing of consecutive events of one device
    ///
    /// Returns `true` when every delta is within `bounds`.
    pub fn check_spacing(
        &mut self,
        channel: &str,
        what: &str,
        events: &[&SerialMessage],
        bounds: TimingBounds,
    ) -> bool {
        let mut within = true;
        for (index, pair) in events.windows(2).enumerate() {
            let (previous, current) = (pair[0].time_ms, pair[1].time_ms);
            let delta = current as i64 - previous as i64;
            if !bounds.contains(delta) {
                self.error(format!(
                    "{}: {} spacing of {}ms at index {} not in interval [{}, {}] ms (previous: {}ms, current: {}ms)",
                    channel,
                    what,
                    delta,
                    index + 1,
                    bounds.min_ms,
                    bounds.max_ms,
                    previous,
                    current
                ));
                within = false;
            }
        }
        within
    }

    pub fn diagnostics(&self) -> &[String] {
        &self.diagnostics
    }
}

/// Result of evaluating one phase
#[derive(Debug, Clone)]
pub struct Evaluation {
    subsystem: Subsystem,
    output: MergedLog,
    serial_errors: Vec<SerialMessage>,
    diagnostics: Vec<String>,
    notes: Vec<String>,
}

impl Evaluation {
    pub fn new(subsystem: Subsystem, output: MergedLog, findings: Findings) -> Self {
        let Findings {
            diagnostics,
            mut notes,
        } = findings;

        let serial_errors: Vec<SerialMessage> =
            output.iter().filter(|m| m.is_error()).cloned().collect();

        if diagnostics.is_empty() {
            notes.push("All tests passed".to_string());
        } else {
            notes.push(format!(
                "Errors Found during evaluation: {}",
                diagnostics.len()
            ));
        }
        if !serial_errors.is_empty() {
            notes.push(format!(
                "Error messages logged during test: {}",
                serial_errors.len()
            ));
        }

        Self {
            subsystem,
            output,
            serial_errors,
            diagnostics,
            notes,
        }
    }

    pub fn subsystem(&self) -> Subsystem {
        self.subsystem
    }

    /// True if any invariant was violated or any device logged an error
    pub fn has_errors(&self) -> bool {
        !self.diagnostics.is_empty() || !self.serial_errors.is_empty()
    }

    pub fn diagnostics(&self) -> &[String] {
        &self.diagnostics
    }

    pub fn notes(&self) -> &[String] {
        &self.notes
    }

    pub fn serial_errors(&self) -> &[SerialMessage] {
        &self.serial_errors
    }

    pub fn output(&self) -> &[SerialMessage] {
        &self.output
    }

    /// Verdict line followed by the summary notes
    pub fn serialize_information(&self) -> String {
        let verdict = if self.has_errors() { "ERROR" } else { "OK" };
        let mut lines = vec![format!("{}: {}", self.subsystem.label(), verdict)];
        lines.extend(self.notes.iter().map(|note| format!("  {}", note)));
        lines.join("\n")
    }

    /// Full transcript: diagnostics, error-level events, merged log
    pub fn serialize_logs(&self) -> String {
        let label = self.subsystem.label();
        let mut lines = vec![format!("{} Errors:", label)];
        lines.extend(self.diagnostics.iter().map(|d| format!("  {}", d)));
        lines.push(format!("{} serial errors during test:", label));
        lines.extend(self.serial_errors.iter().map(|m| format!("  {}", m)));
        lines.push(format!("{} Log:", label));
        lines.extend(self.output.iter().map(|m| format!("  {}", m)));
        lines.join("\n")
    }
}

/// Events of `role` whose payload satisfies `predicate`, in log order
pub(crate) fn select<'a>(
    output: &'a [SerialMessage],
    role: DeviceRole,
    predicate: impl Fn(&str) -> bool,
) -> Vec<&'a SerialMessage> {
    output
        .iter()
        .filter(|m| m.is_from(role) && predicate(&m.payload))
        .collect()
}

/// Fixed-width payload prefix naming the peripheral instance
pub(crate) fn channel_of(message: &SerialMessage, width: usize) -> &str {
    message.payload.get(..width).unwrap_or(&message.payload)
}

/// Every channel seen in any category, in order of first appearance
pub(crate) fn channels<'a>(categories: &[&[&'a SerialMessage]], width: usize) -> Vec<&'a str> {
    let mut seen: Vec<&'a str> = Vec::new();
    for message in categories.iter().flat_map(|c| c.iter().copied()) {
        let channel = channel_of(message, width);
        if !seen.contains(&channel) {
            seen.push(channel);
        }
    }
    seen
}

/// Events of one category on `channel`
pub(crate) fn on_channel<'a>(
    events: &[&'a SerialMessage],
    channel: &str,
    width: usize,
) -> Vec<&'a SerialMessage> {
    events
        .iter()
        .copied()
        .filter(|m| channel_of(m, width) == channel)
        .collect()
}

/// Last payload character for display in diagnostics
pub(crate) fn last_char(message: &SerialMessage) -> String {
    message.last_char().map(String::from).unwrap_or_default()
}


#[cfg(test)]
mod tests {
    use super::test_support::log;
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn spaced(deltas: &[u64]) -> MergedLog {
        let mut time = 1000;
        let mut lines = vec![format!("[{}] <inf> tester: can@40006400: x", time)];
        for delta in deltas {
            time += delta;
            lines.push(format!("[{}] <inf> tester: can@40006400: x", time));
        }
        log(&lines)
    }

    #[rstest]
    #[case(&[50, 50, 50, 50], true)]
    #[case(&[40, 60], true)]
    #[case(&[50, 39, 50], false)]
    #[case(&[50, 61], false)]
    fn test_check_spacing(#[case] deltas: &[u64], #[case] within: bool) {
        let output = spaced(deltas);
        let events: Vec<&SerialMessage> = output.iter().collect();
        let mut findings = Findings::default();

        let result =
            findings.check_spacing("can@40006400", "frame", &events, TimingBounds::new(40, 60));

        assert_eq!(result, within);
        assert_eq!(findings.diagnostics().is_empty(), within);
    }

    #[test]
    fn test_spacing_diagnostic_cites_both_timestamps() {
        let output = spaced(&[50, 61]);
        let events: Vec<&SerialMessage> = output.iter().collect();
        let mut findings = Findings::default();

        findings.check_spacing("can@40006400", "frame", &events, TimingBounds::new(40, 60));

        assert_eq!(
            findings.diagnostics(),
            &["can@40006400: frame spacing of 61ms at index 2 not in interval [40, 60] ms (previous: 1050ms, current: 1111ms)"
                .to_string()]
        );
    }

    #[test]
    fn test_backwards_clock_is_out_of_bounds() {
        let output = log(&["[100] <inf> sut: a", "[90] <inf> sut: b"]);
        let events: Vec<&SerialMessage> = output.iter().collect();
        let mut findings = Findings::default();

        assert!(!findings.check_spacing("x", "event", &events, TimingBounds::new(0, 10)));
    }

    #[test]
    fn test_check_counts_reports_each_mismatch() {
        let mut findings = Findings::default();

        assert!(findings.check_counts("ch", &[("sent", 3), ("received", 3)]));
        assert!(!findings.check_counts("ch", &[("sent", 3), ("a", 2), ("b", 4)]));
        assert_eq!(findings.diagnostics().len(), 2);
    }

    #[test]
    fn test_channels_in_first_appearance_order() {
        let output = log(&[
            "[1] <inf> sut: serial@40004400 sending: f",
            "[2] <inf> sut: serial@40013800 sending: f",
            "[3] <inf> tester: serial@40005000 received f",
            "[4] <inf> sut: serial@40004400 sending: r",
        ]);
        let sent = select(&output, DeviceRole::Sut, |p| p.contains("sending"));
        let received = select(&output, DeviceRole::Tester, |p| p.contains("received"));

        assert_eq!(
            channels(&[sent.as_slice(), received.as_slice()], 15),
            vec!["serial@40004400", "serial@40013800", "serial@40005000"]
        );
        assert_eq!(on_channel(&sent, "serial@40004400", 15).len(), 2);
    }

    #[test]
    fn test_short_payload_is_its_own_channel() {
        let output = log(&["[1] <inf> sut: can@1"]);
        assert_eq!(channel_of(&output[0], 12), "can@1");
    }

    #[test]
    fn test_error_level_event_fails_evaluation() {
        let output = log(&[
            "[1] <inf> sut: gpio start",
            "[2] <err> tester: pin 3 of device gpio@48000800 did not get active",
        ]);

        let evaluation = Evaluation::new(Subsystem::Gpio, output, Findings::default());

        assert!(evaluation.has_errors());
        assert!(evaluation.diagnostics().is_empty());
        assert_eq!(evaluation.serial_errors().len(), 1);
        assert!(evaluation.serialize_information().starts_with("GPIO: ERROR"));
    }

    #[test]
    fn test_serialize_logs_layout() {
        let output = log(&["[1] <inf> sut: can stop"]);
        let mut findings = Findings::default();
        findings.error("can@40006400: broken");

        let evaluation = Evaluation::new(Subsystem::Can, output, findings);

        assert_eq!(
            evaluation.serialize_logs(),
            "CAN Errors:\n  can@40006400: broken\nCAN serial errors during test:\nCAN Log:\n  [1] <inf> sut: can stop"
        );
        assert_eq!(
            evaluation.serialize_information(),
            "CAN: ERROR\n  Errors Found during evaluation: 1"
        );
    }

    #[test]
    fn test_subsystem_commands() {
        assert_eq!(Subsystem::Lin.start_command(), "lin start");
        assert_eq!(Subsystem::Uart.stop_payload(), "uart stop");
    }
}
