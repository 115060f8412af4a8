//! GPIO evaluation
//!
//! The SUT drives its pins one after another (`gpio@48000800 pin 1 on`) and
//! the Tester reports the rising and falling edge it sees on the wired
//! counterpart. All three sequences must agree in length and pin order, and
//! the Tester's rising edges must be evenly spaced.

use super::{channel_of, select, Evaluation, Findings, Subsystem, SubsystemEvaluator};
use crate::config::TimingBounds;
use crate::message::{DeviceRole, SerialMessage};
use crate::runner::MergedLog;

const GPIO_MARKER: &str = "gpio@";
/// Width of `gpio@48000800 pin 1`
const PORT_PIN_WIDTH: usize = 19;

#[derive(Debug, Clone)]
pub struct GpioEvaluator {
    rising_edge_spacing: TimingBounds,
}

impl GpioEvaluator {
    pub fn new(rising_edge_spacing: TimingBounds) -> Self {
        Self {
            rising_edge_spacing,
        }
    }

    fn check(&self, output: &[SerialMessage], findings: &mut Findings) {
        let pin_on = select(output, DeviceRole::Sut, |p| {
            p.contains(GPIO_MARKER) && p.ends_with("on")
        });
        let rising = select(output, DeviceRole::Tester, |p| {
            p.contains(GPIO_MARKER) && p.contains("rising")
        });
        let falling = select(output, DeviceRole::Tester, |p| {
            p.contains(GPIO_MARKER) && p.contains("falling")
        });

        if pin_on.is_empty() {
            findings.error("No pin toggles on SUT");
            return;
        }

        findings.note(format!("Found {} rising edges on Tester", rising.len()));
        findings.note(format!("Found {} falling edges on Tester", falling.len()));

        let counts_match = findings.check_counts(
            "GPIO",
            &[
                ("pin toggles on SUT", pin_on.len()),
                ("rising edges on Tester", rising.len()),
                ("falling edges on Tester", falling.len()),
            ],
        );

        if !findings.check_spacing("Tester", "rising edge", &rising, self.rising_edge_spacing) {
            findings.note(format!(
                "Rising edge timing not in interval [{}, {}]",
                self.rising_edge_spacing.min_ms, self.rising_edge_spacing.max_ms
            ));
        }

        if !counts_match {
            findings.error("GPIO: Skipping port order check since number of messages do not match");
            return;
        }

        let mut port_order_ok = true;
        for (index, ((sut, up), down)) in pin_on.iter().zip(&rising).zip(&falling).enumerate() {
            let (sut, up, down) = (
                channel_of(sut, PORT_PIN_WIDTH),
                channel_of(up, PORT_PIN_WIDTH),
                channel_of(down, PORT_PIN_WIDTH),
            );

            if up != down {
                findings.error(format!(
                    "Unmatching rising and falling pins on tester: {} != {} at index {}",
                    up, down, index
                ));
                port_order_ok = false;
            }
            if up != sut {
                findings.error(format!(
                    "Unmatching rising pins on tester and sut: {} != {} at index {}",
                    up, sut, index
                ));
                port_order_ok = false;
            }
            if down != sut {
                findings.error(format!(
                    "Unmatching falling pins on tester and sut: {} != {} at index {}",
                    down, sut, index
                ));
                port_order_ok = false;
            }
        }

        findings.note(if port_order_ok {
            "Port order is OK"
        } else {
            "Port order has ERRORs"
        });
    }
}

impl SubsystemEvaluator for GpioEvaluator {
    fn subsystem(&self) -> Subsystem {
        Subsystem::Gpio
    }

    fn evaluate(&self, output: MergedLog) -> Evaluation {
        let mut findings = Findings::default();
        self.check(&output, &mut findings);
        Evaluation::new(Subsystem::Gpio, output, findings)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::log;
    use super::*;
    use pretty_assertions::assert_eq;

    const PINS: [&str; 3] = [
        "gpio@48000800 pin 1",
        "gpio@48000800 pin 2",
        "gpio@48000c00 pin 7",
    ];

    fn evaluator() -> GpioEvaluator {
        GpioEvaluator::new(TimingBounds::new(17, 23))
    }

    /// One toggle per pin, rising edges `spacing` ms apart
    fn toggles(pins: &[&str], tester_pins: &[&str], spacing: u64) -> Vec<String> {
        let mut lines = vec![
            "[0] <inf> sut: gpio start".to_string(),
            "[0] <inf> tester: gpio start".to_string(),
        ];
        for (i, (pin, tester_pin)) in pins.iter().zip(tester_pins).enumerate() {
            let t = 100 + i as u64 * spacing;
            lines.push(format!("[{}] <inf> sut: {} on", t, pin));
            lines.push(format!("[{}] <inf> tester: {} rising", t + 1, tester_pin));
            lines.push(format!("[{}] <inf> tester: {} falling", t + 11, tester_pin));
            lines.push(format!("[{}] <inf> sut: {} off", t + 10, pin));
        }
        lines.push("[900] <inf> sut: gpio stop".to_string());
        lines.push("[900] <inf> tester: gpio stop".to_string());
        lines
    }

    #[test]
    fn test_matching_toggles_pass() {
        let evaluation = evaluator().evaluate(log(&toggles(&PINS, &PINS, 20)));

        assert!(!evaluation.has_errors(), "{:?}", evaluation.diagnostics());
        assert!(evaluation.notes().contains(&"Port order is OK".to_string()));
        assert!(evaluation
            .notes()
            .contains(&"Found 3 rising edges on Tester".to_string()));
    }

    #[test]
    fn test_no_toggles_on_sut() {
        let evaluation = evaluator().evaluate(log(&[
            "[0] <inf> sut: gpio start",
            "[1] <inf> sut: gpio stop",
        ]));

        assert_eq!(evaluation.diagnostics(), &["No pin toggles on SUT".to_string()]);
    }

    #[test]
    fn test_swapped_pin_is_reported_with_index() {
        let tester_pins = [PINS[0], PINS[2], PINS[1]];
        let evaluation = evaluator().evaluate(log(&toggles(&PINS, &tester_pins, 20)));

        assert!(evaluation.has_errors());
        assert!(evaluation.diagnostics().contains(
            &"Unmatching rising pins on tester and sut: gpio@48000c00 pin 7 != gpio@48000800 pin 2 at index 1"
                .to_string()
        ));
        assert!(evaluation.notes().contains(&"Port order has ERRORs".to_string()));
    }

    #[test]
    fn test_missing_falling_edge_skips_port_order() {
        let mut lines = toggles(&PINS, &PINS, 20);
        lines.retain(|l| !l.ends_with("pin 7 falling"));

        let evaluation = evaluator().evaluate(log(&lines));

        assert_eq!(
            evaluation.diagnostics(),
            &[
                "GPIO: Number of pin toggles on SUT (3) does not match number of falling edges on Tester (2)"
                    .to_string(),
                "GPIO: Skipping port order check since number of messages do not match".to_string(),
            ]
        );
    }

    #[test]
    fn test_rising_edge_spacing_bounds() {
        assert!(!evaluator()
            .evaluate(log(&toggles(&PINS, &PINS, 17)))
            .has_errors());
        assert!(!evaluator()
            .evaluate(log(&toggles(&PINS, &PINS, 23)))
            .has_errors());
        assert!(evaluator()
            .evaluate(log(&toggles(&PINS, &PINS, 16)))
            .has_errors());
        assert!(evaluator()
            .evaluate(log(&toggles(&PINS, &PINS, 24)))
            .has_errors());
    }
}
