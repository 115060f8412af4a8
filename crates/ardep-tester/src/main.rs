//! ardep-tester - ARDEP board hardware test
//!
//! Drives a SUT board and a Tester board, both attached over USB serial,
//! through the identity, LIN, UART, GPIO and CAN phases and writes a report.
//!
//! # Usage
//!
//! ```bash
//! ./ardep-tester /dev/ttyACM0 /dev/ttyACM1
//! ```
//!
//! With config file and report directory:
//! ```bash
//! ./ardep-tester --config tester.toml --output-dir reports /dev/ttyACM0 /dev/ttyACM1
//! ```
//!
//! Exits with 1 if any subsystem reported errors.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use ardep_harness::{open_serial_link, HarnessConfig, PhaseRunner, Tester};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "ardep-tester")]
#[command(about = "Hardware-in-the-loop test for ARDEP boards")]
struct Args {
    /// Serial device of the first board
    #[arg(default_value = "/dev/ttyACM0")]
    port1: String,

    /// Serial device of the second board
    #[arg(default_value = "/dev/ttyACM1")]
    port2: String,

    /// Configuration file path (TOML format)
    #[arg(short, long, env = "ARDEP_TESTER_CONFIG")]
    config: Option<PathBuf>,

    /// Directory the report is written to
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Upper bound for a single phase, in seconds
    #[arg(long)]
    phase_timeout: Option<u64>,

    /// Do not poll the boards for idle before each phase
    #[arg(long)]
    no_idle_check: bool,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn load_config(&self) -> Result<HarnessConfig> {
        let mut config = match &self.config {
            Some(path) => {
                info!("Loading config from: {}", path.display());
                HarnessConfig::load(path)
                    .with_context(|| format!("Failed to load config {}", path.display()))?
            }
            None => HarnessConfig::default(),
        };

        if let Some(dir) = &self.output_dir {
            config.report.output_dir = dir.clone();
        }
        if let Some(secs) = self.phase_timeout {
            config.phase.timeout_ms = secs.saturating_mul(1000);
        }
        if self.no_idle_check {
            config.idle.enabled = false;
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    let default_filter = if args.verbose {
        "ardep_tester=debug,ardep_harness=debug"
    } else {
        "ardep_tester=info,ardep_harness=info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = args.load_config()?;

    info!(port1 = %args.port1, port2 = %args.port2, "Starting ARDEP board test");

    let first = open_serial_link(&args.port1, &config.serial)
        .with_context(|| format!("Failed to open {}", args.port1))?;
    let second = open_serial_link(&args.port2, &config.serial)
        .with_context(|| format!("Failed to open {}", args.port2))?;

    let mut runner = PhaseRunner::new(first, second, &config);
    runner
        .clear_input()
        .await
        .context("Failed to clear serial input")?;

    let mut tester = Tester::new(runner, &config);
    let run = tester.run_tests().await.context("Board test aborted")?;

    let report = run.report(chrono::Local::now());
    let path = report
        .write(&config.report.output_dir)
        .await
        .context("Failed to save results")?;

    println!("{}", report.results());
    println!("Results saved to: {}", path.display());
    println!("\n\n");

    if run.has_errors() {
        println!("Test exited with errors!");
        Ok(ExitCode::FAILURE)
    } else {
        println!("Test successful");
        Ok(ExitCode::SUCCESS)
    }
}
