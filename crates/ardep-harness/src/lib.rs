//! ardep-harness - hardware-in-the-loop validation for ARDEP boards
//!
//! This crate drives a System-Under-Test (SUT) and a companion test device
//! (Tester) over two independent serial links, runs scripted peripheral
//! phases on both and cross-checks the event streams the devices report.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                          Tester                             │
//! │  identity → LIN → UART → GPIO → CAN, aggregates verdicts    │
//! │                                                             │
//! │  ┌──────────────┐  ┌────────────────────────────────────┐   │
//! │  │HardwareInfo  │  │ Gpio/Uart/Can/Lin evaluators       │   │
//! │  │(ids)         │  │ (count, equality, timing checks)   │   │
//! │  └──────┬───────┘  └─────────────────┬──────────────────┘   │
//! │         └──────────────┬─────────────┘                      │
//! │                 ┌──────┴──────┐                             │
//! │                 │ PhaseRunner │  IdleGate                   │
//! │                 │ (2 readers) │                             │
//! │                 └──────┬──────┘                             │
//! │              ┌─────────┴─────────┐                          │
//! │              │ SerialLink × 2    │  parse_line              │
//! │              │ (serial / mock)   │                          │
//! │              └───────────────────┘                          │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod error;
pub mod evaluation;
pub mod identity;
pub mod idle;
pub mod link;
pub mod message;
pub mod report;
pub mod runner;
pub mod tester;

pub use config::HarnessConfig;
pub use error::{HarnessError, HarnessResult};
pub use evaluation::{
    CanEvaluator, Evaluation, GpioEvaluator, LinEvaluator, Subsystem, SubsystemEvaluator,
    UartEvaluator,
};
pub use identity::{HardwareInfo, IdentityError};
pub use idle::IdleGate;
pub use link::{open_serial_link, LinkError, MockLink, SerialLink};
pub use message::{parse_line, DeviceRole, LogLevel, ParseError, ParsedLine, SerialMessage};
pub use report::Report;
pub use runner::{MergedLog, PhaseExecutor, PhaseRunner};
pub use tester::{TestRun, Tester};
