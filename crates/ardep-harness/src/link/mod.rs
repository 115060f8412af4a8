//! Serial links to the SUT and the Tester
//!
//! - [`SerialPortLink`] talks to a real device through `tokio-serial`
//! - [`MockLink`] is a scripted in-memory device for tests
//!
//! # Example
//!
//! ```ignore
//! use ardep_harness::link::{open_serial_link, SerialLink};
//!
//! let mut link = open_serial_link("/dev/ttyACM0", &config.serial)?;
//! link.write_line("idle").await?;
//! let reply = link.read_line().await?;
//! ```

mod adapter;
pub mod error;
pub mod mock;
pub mod serial;

pub use adapter::SerialLink;
pub use error::LinkError;
pub use mock::MockLink;
pub use serial::SerialPortLink;

use crate::config::SerialConfig;

/// Open the device at `path` with the configured baud rate and read timeout
pub fn open_serial_link(
    path: &str,
    config: &SerialConfig,
) -> Result<Box<dyn SerialLink>, LinkError> {
    let link = SerialPortLink::open(path, config)?;
    Ok(Box::new(link))
}
