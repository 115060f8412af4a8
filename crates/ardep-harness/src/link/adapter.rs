//! Serial link trait

use async_trait::async_trait;

use super::LinkError;

/// Line-oriented, newline-terminated ASCII link to one device
///
/// Implementations own their port exclusively; the phase runner borrows
/// each link mutably for the duration of one phase.
#[async_trait]
pub trait SerialLink: Send {
    /// Port name used in logs and error messages (e.g. `/dev/ttyACM0`)
    fn name(&self) -> &str;

    /// Write `line` followed by a newline
    async fn write_line(&mut self, line: &str) -> Result<(), LinkError>;

    /// Read the next line, with the terminator and surrounding whitespace
    /// stripped
    ///
    /// An empty read (no data within the read timeout, or end of stream) is
    /// reported as [`LinkError::Timeout`] / [`LinkError::Closed`], never as
    /// an empty string.
    async fn read_line(&mut self) -> Result<String, LinkError>;

    /// Discard anything already buffered on the input side
    async fn clear_input(&mut self) -> Result<(), LinkError> {
        Ok(())
    }
}
