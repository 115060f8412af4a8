//! Serial port link backed by `tokio-serial`

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio_serial::{ClearBuffer, SerialPort, SerialPortBuilderExt, SerialStream};

use super::{LinkError, SerialLink};
use crate::config::SerialConfig;

/// Link to a device on a local serial port (USB CDC ACM on the ARDEP boards)
pub struct SerialPortLink {
    name: String,
    stream: BufReader<SerialStream>,
    read_timeout: Duration,
}

impl SerialPortLink {
    pub fn open(path: &str, config: &SerialConfig) -> Result<Self, LinkError> {
        let stream = tokio_serial::new(path, config.baud_rate)
            .open_native_async()
            .map_err(|e| LinkError::Open {
                port: path.to_string(),
                reason: e.to_string(),
            })?;

        tracing::debug!(port = %path, baud_rate = config.baud_rate, "Opened serial port");

        Ok(Self::from_stream(
            path,
            stream,
            Duration::from_millis(config.read_timeout_ms),
        ))
    }

    /// Wrap an already open stream
    pub(crate) fn from_stream(
        name: impl Into<String>,
        stream: SerialStream,
        read_timeout: Duration,
    ) -> Self {
        Self {
            name: name.into(),
            stream: BufReader::new(stream),
            read_timeout,
        }
    }
}

#[async_trait]
impl SerialLink for SerialPortLink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn write_line(&mut self, line: &str) -> Result<(), LinkError> {
        let data = format!("{}\n", line);
        let writer = self.stream.get_mut();
        writer
            .write_all(data.as_bytes())
            .await
            .map_err(|source| LinkError::Write {
                port: self.name.clone(),
                source,
            })?;
        writer.flush().await.map_err(|source| LinkError::Write {
            port: self.name.clone(),
            source,
        })
    }

    async fn read_line(&mut self) -> Result<String, LinkError> {
        let mut buf = Vec::new();
        let read = tokio::time::timeout(self.read_timeout, self.stream.read_until(b'\n', &mut buf))
            .await
            .map_err(|_| LinkError::Timeout {
                port: self.name.clone(),
                timeout_ms: u64::try_from(self.read_timeout.as_millis()).unwrap_or(u64::MAX),
            })?
            .map_err(|source| LinkError::Read {
                port: self.name.clone(),
                source,
            })?;

        if read == 0 {
            return Err(LinkError::Closed {
                port: self.name.clone(),
            });
        }

        let line = String::from_utf8_lossy(&buf).trim().to_string();
        if !buf.is_ascii() {
            return Err(LinkError::NonAscii {
                port: self.name.clone(),
                line,
            });
        }

        Ok(line)
    }

    async fn clear_input(&mut self) -> Result<(), LinkError> {
        let buffered = self.stream.buffer().len();
        Pin::new(&mut self.stream).consume(buffered);

        self.stream
            .get_ref()
            .clear(ClearBuffer::Input)
            .map_err(|e| LinkError::Read {
                port: self.name.clone(),
                source: e.into(),
            })?;

        tracing::debug!(port = %self.name, "Cleared input buffer");
        Ok(())
    }
}
