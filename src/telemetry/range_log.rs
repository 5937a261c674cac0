//! JSONL range log
//!
//! One JSON object per line:
//!
//! ```text
//! {"timestamp":"2026-10-15T09:12:44.120Z","src":2,"dest":1,"range_m":1.4075}
//! ```
//!
//! A new file is started every `max_records_per_file` lines; only the newest
//! `max_files_to_keep` files are retained.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::TelemetryConfig;
use crate::error::Result;
use crate::pprz::protocol::RangeReport;

const FILE_PREFIX: &str = "ranges_";
const FILE_SUFFIX: &str = ".jsonl";

#[derive(Debug, Serialize)]
struct RangeRecord {
    timestamp: String,
    src: u8,
    dest: u8,
    range_m: f64,
}

/// Rotating writer for delivered range reports
pub struct RangeLogger {
    dir: PathBuf,
    max_records_per_file: usize,
    max_files_to_keep: usize,
    session: String,
    file_index: u32,
    records_in_file: usize,
    writer: Option<BufWriter<File>>,
    total_records: u64,
}

impl std::fmt::Debug for RangeLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RangeLogger")
            .field("dir", &self.dir)
            .field("file_index", &self.file_index)
            .field("records_in_file", &self.records_in_file)
            .finish_non_exhaustive()
    }
}

impl RangeLogger {
    /// Create the log directory if needed
    ///
    /// No file is opened until the first record arrives.
    ///
    /// # Errors
    ///
    /// Returns error if the directory cannot be created
    pub fn new<P: AsRef<Path>>(dir: P, max_records_per_file: usize, max_files_to_keep: usize) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        info!("Range log directory: {}", dir.display());

        Ok(Self {
            dir,
            max_records_per_file: max_records_per_file.max(1),
            max_files_to_keep: max_files_to_keep.max(1),
            session: Utc::now().format("%Y%m%dT%H%M%S").to_string(),
            file_index: 0,
            records_in_file: 0,
            writer: None,
            total_records: 0,
        })
    }

    /// Logger for the `[telemetry]` section, or `None` when disabled
    pub fn from_config(config: &TelemetryConfig) -> Result<Option<Self>> {
        if !config.enabled {
            return Ok(None);
        }
        Self::new(&config.log_dir, config.max_records_per_file, config.max_files_to_keep).map(Some)
    }

    /// Append one report, rotating first if the current file is full
    pub fn record(&mut self, report: &RangeReport) -> Result<()> {
        if self.writer.is_none() || self.records_in_file >= self.max_records_per_file {
            self.rotate()?;
        }

        let line = serde_json::to_string(&RangeRecord {
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            src: report.src,
            dest: report.dest,
            range_m: report.range,
        })?;

        if let Some(writer) = self.writer.as_mut() {
            writeln!(writer, "{}", line)?;
            writer.flush()?;
        }

        self.records_in_file += 1;
        self.total_records += 1;
        Ok(())
    }

    /// Records written since creation
    pub fn total_records(&self) -> u64 {
        self.total_records
    }

    fn rotate(&mut self) -> Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
        }

        self.file_index += 1;
        let path = self.dir.join(format!(
            "{}{}_{:06}{}",
            FILE_PREFIX, self.session, self.file_index, FILE_SUFFIX
        ));
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        debug!("Opened range log {}", path.display());

        self.writer = Some(BufWriter::new(file));
        self.records_in_file = 0;
        self.prune()
    }

    /// Remove the oldest log files beyond the retention limit
    fn prune(&self) -> Result<()> {
        let mut files: Vec<PathBuf> = fs::read_dir(&self.dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.file_name()
                    .and_then(|name| name.to_str())
                    .map(|name| name.starts_with(FILE_PREFIX) && name.ends_with(FILE_SUFFIX))
                    .unwrap_or(false)
            })
            .collect();

        if files.len() <= self.max_files_to_keep {
            return Ok(());
        }

        // Names embed start time and index, so lexical order is age order
        files.sort();
        let excess = files.len() - self.max_files_to_keep;
        for path in files.into_iter().take(excess) {
            if let Err(e) = fs::remove_file(&path) {
                warn!("Failed to remove old range log {}: {}", path.display(), e);
            }
        }
        Ok(())
    }
}
