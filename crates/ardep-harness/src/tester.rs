//! Test orchestrator
//!
//! Runs the identity handshake followed by the LIN, UART, GPIO and CAN
//! phases, strictly one after another, and collects the evaluations into a
//! [`TestRun`]. Evaluation failures never stop the sequence; only fatal
//! harness errors (dead link, parse failure, incomplete phase) do.

use chrono::{DateTime, Local};
use tracing::{info, warn};

use crate::config::HarnessConfig;
use crate::error::HarnessError;
use crate::evaluation::{
    CanEvaluator, Evaluation, GpioEvaluator, LinEvaluator, Subsystem, SubsystemEvaluator,
    UartEvaluator,
};
use crate::identity::HardwareInfo;
use crate::report::Report;
use crate::runner::PhaseExecutor;

/// Order in which summaries and transcripts appear in the report
const REPORT_ORDER: [Subsystem; 4] = [
    Subsystem::Gpio,
    Subsystem::Uart,
    Subsystem::Can,
    Subsystem::Lin,
];

pub struct Tester<E> {
    executor: E,
    idle_check: bool,
    evaluators: Vec<Box<dyn SubsystemEvaluator>>,
}

impl<E: PhaseExecutor> Tester<E> {
    pub fn new(executor: E, config: &HarnessConfig) -> Self {
        let timing = &config.timing;
        let evaluators: Vec<Box<dyn SubsystemEvaluator>> = vec![
            Box::new(LinEvaluator::new(timing.lin)),
            Box::new(UartEvaluator::new(timing.uart)),
            Box::new(GpioEvaluator::new(timing.gpio)),
            Box::new(CanEvaluator::new(timing.can)),
        ];

        Self {
            executor,
            idle_check: config.idle.enabled,
            evaluators,
        }
    }

    /// Run every phase and evaluate it
    pub async fn run_tests(&mut self) -> Result<TestRun, HarnessError> {
        info!(phases = self.evaluators.len() + 1, "Starting board test");

        self.ensure_idle().await?;
        let hardware_info = HardwareInfo::fetch(&mut self.executor).await?;

        let mut evaluations = Vec::with_capacity(self.evaluators.len());
        for evaluator in &self.evaluators {
            if self.idle_check {
                self.executor.ensure_idle().await?;
            }
            evaluations.push(evaluator.run(&mut self.executor).await?);
        }

        let run = TestRun {
            hardware_info,
            evaluations,
        };
        if run.has_errors() {
            warn!("Board test finished with errors");
        } else {
            info!("Board test passed");
        }
        Ok(run)
    }

    async fn ensure_idle(&mut self) -> Result<(), HarnessError> {
        if self.idle_check {
            self.executor.ensure_idle().await?;
        }
        Ok(())
    }
}

/// Outcome of a complete test run
#[derive(Debug, Clone)]
pub struct TestRun {
    hardware_info: HardwareInfo,
    evaluations: Vec<Evaluation>,
}

impl TestRun {
    pub fn hardware_info(&self) -> &HardwareInfo {
        &self.hardware_info
    }

    pub fn evaluation(&self, subsystem: Subsystem) -> Option<&Evaluation> {
        self.evaluations
            .iter()
            .find(|e| e.subsystem() == subsystem)
    }

    /// Evaluations in execution order
    pub fn evaluations(&self) -> &[Evaluation] {
        &self.evaluations
    }

    pub fn has_errors(&self) -> bool {
        self.evaluations.iter().any(Evaluation::has_errors)
    }

    fn in_report_order(&self) -> impl Iterator<Item = &Evaluation> {
        REPORT_ORDER
            .into_iter()
            .filter_map(move |subsystem| self.evaluation(subsystem))
    }

    pub fn summaries(&self) -> Vec<String> {
        std::iter::once(self.hardware_info.serialize_information())
            .chain(self.in_report_order().map(Evaluation::serialize_information))
            .collect()
    }

    pub fn transcripts(&self) -> Vec<String> {
        std::iter::once(self.hardware_info.serialize_logs())
            .chain(self.in_report_order().map(Evaluation::serialize_logs))
            .collect()
    }

    pub fn report(&self, created: DateTime<Local>) -> Report {
        Report::new(
            created,
            self.hardware_info.sut_id(),
            &self.summaries(),
            &self.transcripts(),
        )
    }
}
