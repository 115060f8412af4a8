//! Idle gate
//!
//! Before a phase starts, each device is asked whether it is still busy with
//! a previous command. A busy device answers `idle false` and is polled again
//! after a short delay, up to a bounded number of attempts.

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::IdleConfig;
use crate::error::HarnessError;
use crate::link::{LinkError, SerialLink};
use crate::message::{parse_line, ParsedLine};

const IDLE_COMMAND: &str = "idle";
const IDLE_TRUE: &str = "idle true";
const IDLE_FALSE: &str = "idle false";

#[derive(Debug, Clone)]
pub struct IdleGate {
    max_attempts: u32,
    retry_delay: Duration,
}

enum IdleReply {
    Idle,
    Busy,
}

impl IdleGate {
    pub fn new(config: &IdleConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            retry_delay: config.retry_delay(),
        }
    }

    /// Wait until both links report idle, link 1 first
    pub async fn ensure_idle(
        &self,
        first: &mut dyn SerialLink,
        second: &mut dyn SerialLink,
    ) -> Result<(), HarnessError> {
        self.wait_until_idle(first).await?;
        self.wait_until_idle(second).await?;
        Ok(())
    }

    /// Poll one link until it answers `idle true`
    ///
    /// Returns the attempt on which the device reported idle.
    pub async fn wait_until_idle(&self, link: &mut dyn SerialLink) -> Result<u32, HarnessError> {
        for attempt in 1..=self.max_attempts {
            link.write_line(IDLE_COMMAND).await?;
            debug!(port = %link.name(), attempt, "Sent idle request");

            match Self::read_idle_reply(link).await? {
                IdleReply::Idle => {
                    info!(port = %link.name(), attempt, "Link is idle");
                    return Ok(attempt);
                }
                IdleReply::Busy => {
                    info!(port = %link.name(), attempt, "Link busy (idle false)");
                }
            }

            if attempt < self.max_attempts {
                tokio::time::sleep(self.retry_delay).await;
            }
        }

        Err(HarnessError::NotIdle {
            port: link.name().to_string(),
            attempts: self.max_attempts,
        })
    }

    async fn read_idle_reply(link: &mut dyn SerialLink) -> Result<IdleReply, HarnessError> {
        loop {
            let line = match link.read_line().await {
                Ok(line) => line,
                Err(LinkError::NonAscii { port, line }) => {
                    warn!(%port, line = %line, "Ignoring non-ascii line while waiting for idle");
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            if line.is_empty() || line == IDLE_COMMAND {
                continue;
            }

            let message = match parse_line(&line) {
                Ok(ParsedLine::Message(message)) => message,
                Ok(ParsedLine::BootBanner(banner)) => {
                    debug!(port = %link.name(), banner = %banner, "Ignoring boot banner while waiting for idle");
                    continue;
                }
                Err(e) => {
                    warn!(port = %link.name(), error = %e, "Skipping malformed line while waiting for idle");
                    continue;
                }
            };

            let payload = message.payload.to_ascii_lowercase();
            if payload == IDLE_TRUE {
                return Ok(IdleReply::Idle);
            }
            if payload == IDLE_FALSE {
                return Ok(IdleReply::Busy);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::MockLink;

    const IDLE_FALSE_LINE: &str = "[10] <inf> sut: idle false";
    const IDLE_TRUE_LINE: &str = "[20] <inf> sut: Idle True";

    fn gate() -> IdleGate {
        IdleGate::new(&IdleConfig {
            enabled: true,
            max_attempts: 10,
            retry_delay_ms: 0,
        })
    }

    fn idle_requests(link: &MockLink) -> usize {
        link.written()
            .lock()
            .iter()
            .filter(|line| line.as_str() == IDLE_COMMAND)
            .count()
    }

    #[tokio::test]
    async fn test_idle_on_first_attempt() {
        let mut link = MockLink::new("ttyACM0").respond(
            IDLE_COMMAND,
            [
                "idle",
                "*** Booting Zephyr OS ***",
                "",
                "[1] <inf> sut: unrelated",
                "garbage",
                IDLE_TRUE_LINE,
            ],
        );

        assert_eq!(gate().wait_until_idle(&mut link).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_non_ascii_reply_is_skipped() {
        let mut link = MockLink::new("ttyACM0").respond(IDLE_COMMAND, [IDLE_TRUE_LINE]);
        link.push_non_ascii("[5] <inf> sut: \u{fffd}\u{fffd}");

        assert_eq!(gate().wait_until_idle(&mut link).await.unwrap(), 1);
        assert_eq!(idle_requests(&link), 1);
    }

    #[tokio::test]
    async fn test_idle_after_nine_busy_replies() {
        let mut link = MockLink::new("ttyACM0");
        for _ in 0..9 {
            link.add_response(IDLE_COMMAND, [IDLE_FALSE_LINE]);
        }
        link.add_response(IDLE_COMMAND, [IDLE_TRUE_LINE]);

        let attempt = gate().wait_until_idle(&mut link).await.unwrap();

        assert_eq!(attempt, 10);
        assert_eq!(idle_requests(&link), 10);
    }

    #[tokio::test]
    async fn test_always_busy_fails_after_max_attempts() {
        let mut link = MockLink::new("ttyACM0").respond(IDLE_COMMAND, [IDLE_FALSE_LINE]);

        let err = gate().wait_until_idle(&mut link).await.unwrap_err();

        match err {
            HarnessError::NotIdle { port, attempts } => {
                assert_eq!(port, "ttyACM0");
                assert_eq!(attempts, 10);
            }
            other => panic!("Expected NotIdle, got {:?}", other),
        }
        assert_eq!(idle_requests(&link), 10);
    }

    #[tokio::test]
    async fn test_silent_link_fails_immediately() {
        let mut link = MockLink::new("ttyACM1");

        let err = gate().wait_until_idle(&mut link).await.unwrap_err();

        match err {
            HarnessError::Link(e) => assert_eq!(e.port(), "ttyACM1"),
            other => panic!("Expected link error, got {:?}", other),
        }
        assert_eq!(idle_requests(&link), 1);
    }

    #[tokio::test]
    async fn test_ensure_idle_checks_both_links() {
        let mut first = MockLink::new("ttyACM0").respond(IDLE_COMMAND, [IDLE_TRUE_LINE]);
        let mut second = MockLink::new("ttyACM1").respond(IDLE_COMMAND, [IDLE_FALSE_LINE]);

        let err = gate().ensure_idle(&mut first, &mut second).await.unwrap_err();

        assert!(matches!(err, HarnessError::NotIdle { ref port, .. } if port == "ttyACM1"));
        assert_eq!(idle_requests(&first), 1);
    }
}
