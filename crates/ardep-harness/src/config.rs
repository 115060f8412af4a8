//! Harness configuration
//!
//! Every field has a default matching the reference board setup, so an empty
//! TOML file (or no file at all) yields a working configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::HarnessError;

/// Complete harness configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HarnessConfig {
    #[serde(default)]
    pub serial: SerialConfig,
    #[serde(default)]
    pub phase: PhaseConfig,
    #[serde(default)]
    pub idle: IdleConfig,
    #[serde(default)]
    pub timing: TimingConfig,
    #[serde(default)]
    pub report: ReportConfig,
}

impl HarnessConfig {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, HarnessError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            HarnessError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, HarnessError> {
        let config: Self = toml::from_str(content)
            .map_err(|e| HarnessError::Config(format!("Invalid configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), HarnessError> {
        if self.idle.max_attempts == 0 {
            return Err(HarnessError::Config(
                "idle.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.phase.channel_capacity == 0 {
            return Err(HarnessError::Config(
                "phase.channel_capacity must be at least 1".to_string(),
            ));
        }
        for (name, bounds) in [
            ("gpio", Some(self.timing.gpio)),
            ("uart", self.timing.uart),
            ("can", Some(self.timing.can)),
            ("lin", Some(self.timing.lin)),
        ] {
            let Some(bounds) = bounds else {
                continue;
            };
            if bounds.min_ms > bounds.max_ms {
                return Err(HarnessError::Config(format!(
                    "timing.{}: min_ms ({}) exceeds max_ms ({})",
                    name, bounds.min_ms, bounds.max_ms
                )));
            }
        }
        Ok(())
    }
}

// =============================================================================
// Serial Configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerialConfig {
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    /// A read returning nothing within this window counts as a broken link
    #[serde(default = "default_read_timeout")]
    pub read_timeout_ms: u64,
}

fn default_baud_rate() -> u32 {
    115200
}

fn default_read_timeout() -> u64 {
    10_000
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            baud_rate: default_baud_rate(),
            read_timeout_ms: default_read_timeout(),
        }
    }
}

// =============================================================================
// Phase Configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseConfig {
    /// Upper bound for both links to report their stop payload
    #[serde(default = "default_phase_timeout")]
    pub timeout_ms: u64,
    /// Capacity of the queue merging both link readers
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_phase_timeout() -> u64 {
    30_000
}

fn default_channel_capacity() -> usize {
    256
}

impl Default for PhaseConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_phase_timeout(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

// =============================================================================
// Idle Gate Configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdleConfig {
    /// Run the idle gate before every phase
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_retry_delay")]
    pub retry_delay_ms: u64,
}

fn default_true() -> bool {
    true
}

fn default_max_attempts() -> u32 {
    10
}

fn default_retry_delay() -> u64 {
    1000
}

impl IdleConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

impl Default for IdleConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            max_attempts: default_max_attempts(),
            retry_delay_ms: default_retry_delay(),
        }
    }
}

// =============================================================================
// Timing Configuration
// =============================================================================

/// Inclusive bounds for the spacing of consecutive events, in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimingBounds {
    pub min_ms: i64,
    pub max_ms: i64,
}

impl TimingBounds {
    pub const fn new(min_ms: i64, max_ms: i64) -> Self {
        Self { min_ms, max_ms }
    }

    pub fn contains(&self, delta_ms: i64) -> bool {
        (self.min_ms..=self.max_ms).contains(&delta_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingConfig {
    /// Spacing of consecutive rising edges seen by the Tester
    #[serde(default = "default_gpio_bounds")]
    pub gpio: TimingBounds,
    /// Spacing of characters sent by the Tester; unchecked unless set
    #[serde(default)]
    pub uart: Option<TimingBounds>,
    #[serde(default = "default_can_bounds")]
    pub can: TimingBounds,
    #[serde(default = "default_serial_bounds")]
    pub lin: TimingBounds,
}

fn default_gpio_bounds() -> TimingBounds {
    TimingBounds::new(17, 23)
}

fn default_can_bounds() -> TimingBounds {
    TimingBounds::new(40, 60)
}

fn default_serial_bounds() -> TimingBounds {
    TimingBounds::new(90, 110)
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            gpio: default_gpio_bounds(),
            uart: None,
            can: default_can_bounds(),
            lin: default_serial_bounds(),
        }
    }
}

// =============================================================================
// Report Configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
        }
    }
}
