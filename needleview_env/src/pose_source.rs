//! Pose source abstraction for NeedleView sessions.

use crate::error::EnvError;
use crate::table::{last_content_line, parse_fields, read_table, Table};
use crate::types::{PoseRead, PoseSample, POSE_FIELDS};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// How a session obtains needle poses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoseMode {
    /// Pre-recorded rows served in order
    Replay,

    /// Latest pose re-read from an externally rewritten file
    Live,
}

/// Abstraction for pose input polled once per session tick.
///
/// # Implementations
///
/// - **Replay**: `ReplaySource` - an in-memory table of recorded rows
/// - **Live**: `LivePoseFile` - the last line of a file a tracker bridge rewrites
///
/// # Tick Flow
///
/// ```text
/// Tracker / recording          PoseSource                 Session
///   |                             |                          |
///   |-- rewrite / table --------->|                          |
///   |                             |<-- poll() ---------------|
///   |                             |-- Pose / NoData / Err -->|
/// ```
///
/// Polling is synchronous: a tick must finish well within its interval.
pub trait PoseSource: Send {
    /// Reads the pose for this tick.
    ///
    /// # Returns
    /// * `Ok(PoseRead::Pose)` - a pose to evaluate
    /// * `Ok(PoseRead::NoData)` - nothing new, the caller keeps its last result
    /// * `Ok(PoseRead::Exhausted)` - a finite source ran out
    /// * `Err(EnvError::PoseSourceUnavailable)` - missing/unreadable input
    /// * `Err(EnvError::UnexpectedPoseFormat)` - a row without 7 fields
    /// * `Err(EnvError::NonFinitePose)` - a row holding NaN or an infinity
    fn poll(&mut self) -> Result<PoseRead, EnvError>;

    /// Returns the mode this source implements.
    fn mode(&self) -> PoseMode;

    /// True once a finite source has served its final row.
    fn is_exhausted(&self) -> bool {
        false
    }

    /// Restarts a finite source from its first row.
    fn rewind(&mut self) {}

    /// Human-readable description for logs.
    fn describe(&self) -> String;
}

/// Pre-recorded needle motion served one row per poll.
#[derive(Debug, Clone)]
pub struct ReplaySource {
    rows: Table,
    cursor: usize,
    label: String,
}

impl ReplaySource {
    /// Creates a replay source from already parsed rows.
    pub fn from_rows(rows: Table) -> Self {
        Self {
            rows,
            cursor: 0,
            label: "in-memory recording".to_string(),
        }
    }

    /// Creates a replay source from pose samples.
    pub fn from_samples(samples: &[PoseSample]) -> Self {
        Self::from_rows(samples.iter().map(|s| s.to_fields().to_vec()).collect())
    }

    /// Loads a recording file, skipping `header_lines`.
    pub fn load(path: impl AsRef<Path>, header_lines: usize) -> Result<Self, EnvError> {
        let path = path.as_ref();
        let rows = read_table(path, header_lines).map_err(|e| match e {
            EnvError::Io(io) => EnvError::unavailable(path, io),
            other => other,
        })?;
        Ok(Self {
            rows,
            cursor: 0,
            label: path.display().to_string(),
        })
    }

    /// Number of recorded rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// True if the recording has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Index of the next row to be served.
    pub fn cursor(&self) -> usize {
        self.cursor
    }
}

impl PoseSource for ReplaySource {
    fn poll(&mut self) -> Result<PoseRead, EnvError> {
        let Some(row) = self.rows.get(self.cursor) else {
            return Ok(PoseRead::Exhausted);
        };
        self.cursor += 1;
        PoseSample::from_fields(row).map(PoseRead::Pose)
    }

    fn mode(&self) -> PoseMode {
        PoseMode::Replay
    }

    fn is_exhausted(&self) -> bool {
        self.cursor >= self.rows.len()
    }

    fn rewind(&mut self) {
        self.cursor = 0;
    }

    fn describe(&self) -> String {
        format!("replay '{}' ({}/{} rows)", self.label, self.cursor, self.rows.len())
    }
}

/// A file holding the tracker's latest pose on its last line.
///
/// The file is re-read on every poll. A writer may be mid-update, so an
/// unterminated last line that does not parse into a full pose is treated
/// as "no new data" rather than an error.
#[derive(Debug, Clone)]
pub struct LivePoseFile {
    path: PathBuf,
}

impl LivePoseFile {
    /// Creates a live source for the given path. The file need not exist yet.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path being polled.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PoseSource for LivePoseFile {
    fn poll(&mut self) -> Result<PoseRead, EnvError> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::InvalidData => return Ok(PoseRead::NoData),
            Err(e) => return Err(EnvError::unavailable(&self.path, e)),
        };

        let Some((line, terminated)) = last_content_line(&text) else {
            return Ok(PoseRead::NoData);
        };

        let fields: Vec<&str> = line.split_whitespace().collect();
        let parsed = parse_fields(&fields, text.lines().count());

        match parsed {
            Ok(values) if values.len() == POSE_FIELDS => {
                PoseSample::from_fields(&values).map(PoseRead::Pose)
            }
            Ok(_) | Err(_) if !terminated => Ok(PoseRead::NoData),
            Ok(values) => Err(EnvError::UnexpectedPoseFormat {
                expected: POSE_FIELDS,
                found: values.len(),
            }),
            Err(e) => Err(e),
        }
    }

    fn mode(&self) -> PoseMode {
        PoseMode::Live
    }

    fn describe(&self) -> String {
        format!("live '{}'", self.path.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity_row(x: f64) -> Vec<f64> {
        vec![x, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0]
    }

    #[test]
    fn test_replay_serves_rows_in_order() {
        let mut source = ReplaySource::from_rows(vec![identity_row(1.0), identity_row(2.0)]);
        assert_eq!(source.mode(), PoseMode::Replay);

        match source.poll().unwrap() {
            PoseRead::Pose(p) => assert_eq!(p.position[0], 1.0),
            other => panic!("unexpected read: {other:?}"),
        }
        assert!(!source.is_exhausted());

        match source.poll().unwrap() {
            PoseRead::Pose(p) => assert_eq!(p.position[0], 2.0),
            other => panic!("unexpected read: {other:?}"),
        }
        assert!(source.is_exhausted());
        assert_eq!(source.poll().unwrap(), PoseRead::Exhausted);

        source.rewind();
        assert_eq!(source.cursor(), 0);
        assert!(!source.is_exhausted());
    }

    #[test]
    fn test_replay_malformed_row_advances_cursor() {
        let mut source = ReplaySource::from_rows(vec![vec![1.0, 2.0, 3.0], identity_row(4.0)]);
        assert!(matches!(
            source.poll(),
            Err(EnvError::UnexpectedPoseFormat { found: 3, .. })
        ));
        assert_eq!(source.cursor(), 1);
        assert!(matches!(source.poll(), Ok(PoseRead::Pose(_))));
    }

    #[test]
    fn test_replay_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("motion.txt");
        std::fs::write(&path, "1 2 3 1 0 0 0\n4 5 6 1 0 0 0\n").unwrap();

        let source = ReplaySource::load(&path, 0).unwrap();
        assert_eq!(source.len(), 2);

        let missing = ReplaySource::load(dir.path().join("nope.txt"), 0);
        assert!(matches!(missing, Err(EnvError::PoseSourceUnavailable { .. })));
    }

    #[test]
    fn test_live_reads_last_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("needle-tracker.txt");
        std::fs::write(&path, "0 0 0 1 0 0 0\n7 8 9 1 0 0 0\n").unwrap();

        let mut source = LivePoseFile::new(&path);
        match source.poll().unwrap() {
            PoseRead::Pose(p) => assert_eq!(p.position, [7.0, 8.0, 9.0]),
            other => panic!("unexpected read: {other:?}"),
        }
        assert_eq!(source.mode(), PoseMode::Live);
        assert!(!source.is_exhausted());
    }

    #[test]
    fn test_live_missing_file_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let mut source = LivePoseFile::new(dir.path().join("absent.txt"));
        assert!(matches!(
            source.poll(),
            Err(EnvError::PoseSourceUnavailable { .. })
        ));
    }

    #[test]
    fn test_live_empty_or_partial_is_no_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("needle-tracker.txt");
        let mut source = LivePoseFile::new(&path);

        std::fs::write(&path, "").unwrap();
        assert_eq!(source.poll().unwrap(), PoseRead::NoData);

        std::fs::write(&path, "1 2 3 1 0").unwrap();
        assert_eq!(source.poll().unwrap(), PoseRead::NoData);

        std::fs::write(&path, "1 2 3 1 0 0 0\n4 5 -").unwrap();
        assert_eq!(source.poll().unwrap(), PoseRead::NoData);
    }

    #[test]
    fn test_live_complete_short_line_is_format_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("needle-tracker.txt");
        std::fs::write(&path, "1 2 3 4 5\n").unwrap();

        let mut source = LivePoseFile::new(&path);
        assert!(matches!(
            source.poll(),
            Err(EnvError::UnexpectedPoseFormat { expected: 7, found: 5 })
        ));
    }

    #[test]
    fn test_live_nan_line_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("needle-tracker.txt");
        std::fs::write(&path, "nan 0 0 1 0 0 0\n").unwrap();

        let mut source = LivePoseFile::new(&path);
        assert!(matches!(
            source.poll(),
            Err(EnvError::NonFinitePose { field: 0 })
        ));
    }
}
