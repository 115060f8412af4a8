//! Mock serial link for testing

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{LinkError, SerialLink};

/// Scripted in-memory device
///
/// Replies are registered per command. Every write of a command queues the
/// next registered reply batch; the last batch is sticky and repeats for
/// further writes of the same command.
pub struct MockLink {
    name: String,
    /// Command -> reply batches
    responses: HashMap<String, VecDeque<Vec<String>>>,
    pending: VecDeque<Incoming>,
    written: Arc<Mutex<Vec<String>>>,
    line_delay: Duration,
    hang_when_drained: bool,
}

/// Queued input, either a clean line or one the port would reject
enum Incoming {
    Line(String),
    NonAscii(String),
}

impl MockLink {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            responses: HashMap::new(),
            pending: VecDeque::new(),
            written: Arc::new(Mutex::new(Vec::new())),
            line_delay: Duration::ZERO,
            hang_when_drained: false,
        }
    }

    /// Register a reply batch for `command`
    pub fn respond<I, S>(mut self, command: &str, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.add_response(command, lines);
        self
    }

    pub fn add_response<I, S>(&mut self, command: &str, lines: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.responses
            .entry(command.to_string())
            .or_default()
            .push_back(lines.into_iter().map(Into::into).collect());
    }

    /// Queue a line that is readable without any prior command
    pub fn push_incoming(&mut self, line: impl Into<String>) {
        self.pending.push_back(Incoming::Line(line.into()));
    }

    /// Queue a line that fails the ASCII check on read
    pub fn push_non_ascii(&mut self, line: impl Into<String>) {
        self.pending.push_back(Incoming::NonAscii(line.into()));
    }

    /// Delay every read by `delay` (interleaves two mock devices)
    pub fn with_line_delay(mut self, delay: Duration) -> Self {
        self.line_delay = delay;
        self
    }

    /// Block forever once the queue is empty instead of timing out
    pub fn hang_when_drained(mut self) -> Self {
        self.hang_when_drained = true;
        self
    }

    /// Shared view of every line written to this link
    pub fn written(&self) -> Arc<Mutex<Vec<String>>> {
        self.written.clone()
    }

    fn next_batch(&mut self, command: &str) -> Option<Vec<String>> {
        let batches = self.responses.get_mut(command)?;
        if batches.len() > 1 {
            batches.pop_front()
        } else {
            batches.front().cloned()
        }
    }
}

#[async_trait]
impl SerialLink for MockLink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn write_line(&mut self, line: &str) -> Result<(), LinkError> {
        self.written.lock().push(line.to_string());

        match self.next_batch(line) {
            Some(batch) => self.pending.extend(batch.into_iter().map(Incoming::Line)),
            None => tracing::debug!(port = %self.name, line, "Mock link: no reply configured"),
        }
        Ok(())
    }

    async fn read_line(&mut self) -> Result<String, LinkError> {
        if !self.line_delay.is_zero() {
            tokio::time::sleep(self.line_delay).await;
        }

        match self.pending.pop_front() {
            Some(Incoming::Line(line)) => return Ok(line),
            Some(Incoming::NonAscii(line)) => {
                return Err(LinkError::NonAscii {
                    port: self.name.clone(),
                    line,
                })
            }
            None => {}
        }

        if self.hang_when_drained {
            std::future::pending::<()>().await;
        }

        Err(LinkError::Timeout {
            port: self.name.clone(),
            timeout_ms: 0,
        })
    }

    async fn clear_input(&mut self) -> Result<(), LinkError> {
        self.pending.clear();
        Ok(())
    }
}
