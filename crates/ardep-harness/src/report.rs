//! Test report
//!
//! The report is a plain text file with a results block (one summary per
//! phase) followed by a logs block (full transcripts). Its name carries the
//! run's local timestamp and the SUT id so reports of different boards never
//! collide.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use tracing::info;

use crate::error::HarnessError;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";

const RESULTS_BANNER: &str = "\
======================
||   TEST RESULTS   ||
======================";

const LOGS_BANNER: &str = "\
======================
||       LOGS       ||
======================";

#[derive(Debug, Clone)]
pub struct Report {
    created: DateTime<Local>,
    sut_id: String,
    results: String,
    logs: String,
}

impl Report {
    /// Build a report from per-phase summaries and transcripts
    ///
    /// Summaries are joined line by line, transcripts are separated by a
    /// blank line.
    pub fn new(
        created: DateTime<Local>,
        sut_id: impl Into<String>,
        summaries: &[String],
        transcripts: &[String],
    ) -> Self {
        Self {
            created,
            sut_id: sut_id.into(),
            results: banner_block(RESULTS_BANNER, &summaries.join("\n")),
            logs: banner_block(LOGS_BANNER, &transcripts.join("\n\n")),
        }
    }

    pub fn file_name(&self) -> String {
        format!(
            "{}_ardep_board_{}_hw_test_results.txt",
            self.created.format(TIMESTAMP_FORMAT),
            self.sut_id
        )
    }

    /// The results block, as printed to the console
    pub fn results(&self) -> &str {
        &self.results
    }

    pub fn logs(&self) -> &str {
        &self.logs
    }

    pub fn contents(&self) -> String {
        format!("{}{}", self.results, self.logs)
    }

    /// Write the report into `dir`, creating it if needed
    pub async fn write(&self, dir: &Path) -> Result<PathBuf, HarnessError> {
        let path = dir.join(self.file_name());

        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|source| HarnessError::Report {
                path: dir.to_path_buf(),
                source,
            })?;
        tokio::fs::write(&path, self.contents())
            .await
            .map_err(|source| HarnessError::Report {
                path: path.clone(),
                source,
            })?;

        info!(path = %path.display(), "Report written");
        Ok(path)
    }
}

fn banner_block(banner: &str, body: &str) -> String {
    format!("\n{}\n{}\n", banner, body)
}
