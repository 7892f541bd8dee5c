//! Append-only pose timestamp log.
//!
//! One line per accepted raw pose: `elapsed_secs x y z qw qx qy qz`.
//! The file is a diagnostic trace; write failures are logged and dropped.

use needleview_env::table::format_row;
use needleview_env::PoseSample;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

/// Default log file name, placed next to the session inputs.
pub const DEFAULT_LOG_NAME: &str = "needle-timestamps.txt";

pub struct PoseLog {
    path: PathBuf,
    file: File,
    lines: u64,
    failures: u64,
}

impl PoseLog {
    /// Opens `path` for appending, creating it if needed.
    pub fn open(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            file,
            lines: 0,
            failures: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Lines written since the log was opened.
    pub fn lines(&self) -> u64 {
        self.lines
    }

    pub fn failures(&self) -> u64 {
        self.failures
    }

    /// Appends one pose. Never fails the caller.
    pub fn record(&mut self, elapsed: Duration, sample: &PoseSample) {
        let mut row = Vec::with_capacity(8);
        row.push(elapsed.as_secs_f64());
        row.extend_from_slice(&sample.to_fields());

        match writeln!(self.file, "{}", format_row(&row)) {
            Ok(()) => self.lines += 1,
            Err(e) => {
                self.failures += 1;
                warn!("Pose log write to {} failed: {}", self.path.display(), e);
            }
        }
    }
}

impl std::fmt::Debug for PoseLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoseLog")
            .field("path", &self.path)
            .field("lines", &self.lines)
            .finish()
    }
}
