//! Dual-link phase runner
//!
//! A phase is bracketed by a start command and a stop payload. The start
//! command is written to both links at once, then one reader per link parses
//! incoming lines and forwards events into a bounded queue. A single consumer
//! drains the queue into the merged log, so the log reflects arrival order
//! across both devices. Device clocks are independent and never compared.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::config::HarnessConfig;
use crate::error::HarnessError;
use crate::idle::IdleGate;
use crate::link::SerialLink;
use crate::message::{parse_line, ParsedLine, SerialMessage};

/// Events of one phase from both devices, in arrival order
pub type MergedLog = Vec<SerialMessage>;

/// Capability to run phases against the two devices
///
/// Evaluators depend on this instead of on concrete links, so they can be
/// driven by [`PhaseRunner`] or by any test double.
#[async_trait]
pub trait PhaseExecutor: Send {
    /// Make sure neither device is still busy with a previous phase
    async fn ensure_idle(&mut self) -> Result<(), HarnessError>;

    /// Run one phase on both links and return the merged log
    async fn run_phase(&mut self, start: &str, stop: &str) -> Result<MergedLog, HarnessError>;
}

/// Runs phases on two serial links concurrently
pub struct PhaseRunner {
    first: Box<dyn SerialLink>,
    second: Box<dyn SerialLink>,
    idle: IdleGate,
    timeout_ms: u64,
    channel_capacity: usize,
}

impl PhaseRunner {
    pub fn new(
        first: Box<dyn SerialLink>,
        second: Box<dyn SerialLink>,
        config: &HarnessConfig,
    ) -> Self {
        Self {
            first,
            second,
            idle: IdleGate::new(&config.idle),
            timeout_ms: config.phase.timeout_ms,
            channel_capacity: config.phase.channel_capacity.max(1),
        }
    }

    /// Drop whatever the devices printed before the run started
    pub async fn clear_input(&mut self) -> Result<(), HarnessError> {
        self.first.clear_input().await?;
        self.second.clear_input().await?;
        Ok(())
    }
}

#[async_trait]
impl PhaseExecutor for PhaseRunner {
    async fn ensure_idle(&mut self) -> Result<(), HarnessError> {
        self.idle
            .ensure_idle(self.first.as_mut(), self.second.as_mut())
            .await
    }

    async fn run_phase(&mut self, start: &str, stop: &str) -> Result<MergedLog, HarnessError> {
        info!(start, stop, "Running phase");

        let names = [self.first.name().to_string(), self.second.name().to_string()];
        let (tx, mut rx) = mpsc::channel::<(usize, SerialMessage)>(self.channel_capacity);
        let mut merged = MergedLog::new();
        let mut finished = [false; 2];

        let first = stream_until_stop(self.first.as_mut(), 0, start, stop, tx.clone());
        let second = stream_until_stop(self.second.as_mut(), 1, start, stop, tx);
        let collect = async {
            while let Some((index, message)) = rx.recv().await {
                if message.payload == stop {
                    finished[index] = true;
                }
                merged.push(message);
            }
            Ok::<(), HarnessError>(())
        };

        let outcome = tokio::time::timeout(Duration::from_millis(self.timeout_ms), async {
            tokio::try_join!(first, second, collect).map(|_| ())
        })
        .await;

        match outcome {
            Ok(Ok(())) => {
                info!(start, events = merged.len(), "Phase finished");
                Ok(merged)
            }
            Ok(Err(e)) => {
                error!(start, error = %e, "Phase aborted");
                Err(e)
            }
            Err(_) => {
                let pending: Vec<String> = names
                    .into_iter()
                    .zip(finished)
                    .filter(|(_, done)| !done)
                    .map(|(name, _)| name)
                    .collect();
                error!(start, ?pending, "Phase timed out");
                Err(HarnessError::PhaseIncomplete {
                    start: start.to_string(),
                    timeout_ms: self.timeout_ms,
                    pending,
                    collected: merged.len(),
                })
            }
        }
    }
}

/// Reader for one link: forwards parsed events until the stop payload
async fn stream_until_stop(
    link: &mut dyn SerialLink,
    index: usize,
    start: &str,
    stop: &str,
    tx: mpsc::Sender<(usize, SerialMessage)>,
) -> Result<(), HarnessError> {
    debug!(port = %link.name(), start, "Sending start command");
    link.write_line(start).await?;

    loop {
        let line = link.read_line().await?;
        if line.is_empty() {
            return Err(HarnessError::EmptyLine {
                port: link.name().to_string(),
            });
        }
        if line == start {
            continue;
        }

        let message = match parse_line(&line) {
            Ok(ParsedLine::Message(message)) => message,
            Ok(ParsedLine::BootBanner(banner)) => {
                warn!(port = %link.name(), banner = %banner, "Boot banner during phase");
                continue;
            }
            Err(source) => {
                error!(port = %link.name(), start, error = %source, "Unparseable line during phase");
                return Err(HarnessError::Parse {
                    port: link.name().to_string(),
                    source,
                });
            }
        };

        let done = message.payload == stop;
        tx.send((index, message))
            .await
            .map_err(|_| HarnessError::MergeClosed {
                port: link.name().to_string(),
            })?;

        if done {
            debug!(port = %link.name(), stop, "Received stop message");
            return Ok(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::{LinkError, MockLink};
    use crate::message::DeviceRole;
    use pretty_assertions::assert_eq;

    fn config(timeout_ms: u64) -> HarnessConfig {
        let mut config = HarnessConfig::default();
        config.phase.timeout_ms = timeout_ms;
        config.idle.retry_delay_ms = 0;
        config
    }

    fn device_lines(device: &str, command: &str, events: usize) -> Vec<String> {
        let mut lines = vec![command.to_string()];
        lines.push(format!("[0] <inf> {}: {}", device, command));
        for i in 1..events {
            lines.push(format!("[{}] <inf> {}: event {}", i * 10, device, i));
        }
        lines.push(format!("[{}] <inf> {}: uart stop", events * 10, device));
        lines
    }

    fn runner(first: MockLink, second: MockLink, timeout_ms: u64) -> PhaseRunner {
        PhaseRunner::new(Box::new(first), Box::new(second), &config(timeout_ms))
    }

    #[tokio::test]
    async fn test_merges_both_links_preserving_order() {
        let n = 5;
        let sut = MockLink::new("ttyACM0")
            .respond("uart start", device_lines("sut", "uart start", n))
            .with_line_delay(Duration::from_millis(1));
        let tester = MockLink::new("ttyACM1")
            .respond("uart start", device_lines("tester", "uart start", n))
            .with_line_delay(Duration::from_millis(1));

        let log = runner(sut, tester, 5_000)
            .run_phase("uart start", "uart stop")
            .await
            .unwrap();

        assert_eq!(log.len(), 2 * n + 2);
        for role in [DeviceRole::Sut, DeviceRole::Tester] {
            let times: Vec<u64> = log
                .iter()
                .filter(|m| m.is_from(role))
                .map(|m| m.time_ms)
                .collect();
            let expected: Vec<u64> = (0..=n as u64).map(|i| i * 10).collect();
            assert_eq!(times, expected);
        }
    }

    #[tokio::test]
    async fn test_start_command_written_to_both_links() {
        let sut = MockLink::new("ttyACM0").respond("can start", ["[1] <inf> sut: can stop"]);
        let tester = MockLink::new("ttyACM1").respond("can start", ["[1] <inf> tester: can stop"]);
        let (sut_written, tester_written) = (sut.written(), tester.written());

        let log = runner(sut, tester, 1_000)
            .run_phase("can start", "can stop")
            .await
            .unwrap();

        assert_eq!(log.len(), 2);
        assert_eq!(*sut_written.lock(), vec!["can start".to_string()]);
        assert_eq!(*tester_written.lock(), vec!["can start".to_string()]);
    }

    #[tokio::test]
    async fn test_boot_banner_is_skipped() {
        let sut = MockLink::new("ttyACM0").respond(
            "lin start",
            ["*** Booting Zephyr OS build v3.7.0 ***", "[1] <inf> sut: lin stop"],
        );
        let tester = MockLink::new("ttyACM1").respond("lin start", ["[1] <inf> tester: lin stop"]);

        let log = runner(sut, tester, 1_000)
            .run_phase("lin start", "lin stop")
            .await
            .unwrap();

        assert_eq!(log.len(), 2);
    }

    #[tokio::test]
    async fn test_parse_failure_aborts_phase() {
        let sut = MockLink::new("ttyACM0")
            .respond("gpio start", ["[1] <inf> sut: gpio start"])
            .hang_when_drained();
        let tester = MockLink::new("ttyACM1").respond("gpio start", ["[x] <inf> tester: oops"]);

        let err = runner(sut, tester, 10_000)
            .run_phase("gpio start", "gpio stop")
            .await
            .unwrap_err();

        match err {
            HarnessError::Parse { port, .. } => assert_eq!(port, "ttyACM1"),
            other => panic!("Expected Parse, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_empty_line_is_fatal() {
        let sut = MockLink::new("ttyACM0").respond("gpio start", [""]);
        let tester = MockLink::new("ttyACM1").hang_when_drained();

        let err = runner(sut, tester, 10_000)
            .run_phase("gpio start", "gpio stop")
            .await
            .unwrap_err();

        assert!(matches!(err, HarnessError::EmptyLine { ref port } if port == "ttyACM0"));
    }

    #[tokio::test]
    async fn test_non_ascii_line_is_fatal() {
        let mut sut = MockLink::new("ttyACM0").respond("lin start", ["[1] <inf> sut: lin stop"]);
        sut.push_non_ascii("[1] <inf> sut: \u{fffd}");
        let tester = MockLink::new("ttyACM1").hang_when_drained();

        let err = runner(sut, tester, 10_000)
            .run_phase("lin start", "lin stop")
            .await
            .unwrap_err();

        assert!(
            matches!(err, HarnessError::Link(LinkError::NonAscii { ref port, .. }) if port == "ttyACM0"),
            "{:?}",
            err
        );
    }

    #[tokio::test]
    async fn test_missing_stop_reports_incomplete_phase() {
        let sut = MockLink::new("ttyACM0").respond("can start", ["[1] <inf> sut: can stop"]);
        let tester = MockLink::new("ttyACM1")
            .respond("can start", ["[1] <inf> tester: can@40006400: frame id: 1, data: 1"])
            .hang_when_drained();

        let err = runner(sut, tester, 50)
            .run_phase("can start", "can stop")
            .await
            .unwrap_err();

        match err {
            HarnessError::PhaseIncomplete {
                start,
                timeout_ms,
                pending,
                collected,
            } => {
                assert_eq!(start, "can start");
                assert_eq!(timeout_ms, 50);
                assert_eq!(pending, vec!["ttyACM1".to_string()]);
                assert_eq!(collected, 2);
            }
            other => panic!("Expected PhaseIncomplete, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_clear_input_drains_both_links() {
        let mut sut = MockLink::new("ttyACM0");
        sut.push_incoming("[1] <inf> sut: stale");
        let mut tester = MockLink::new("ttyACM1");
        tester.push_incoming("[1] <inf> tester: stale");
        let tester = tester.respond("hwInfo start", ["[2] <inf> tester: hwInfo stop"]);
        let sut = sut.respond("hwInfo start", ["[2] <inf> sut: hwInfo stop"]);

        let mut runner = runner(sut, tester, 1_000);
        runner.clear_input().await.unwrap();
        let log = runner.run_phase("hwInfo start", "hwInfo stop").await.unwrap();

        assert!(log.iter().all(|m| m.payload != "stale"));
    }
}
