//! JSON exporter for session frames.
//!
//! Exports one frame per tick so a recorded session can be plotted or
//! replayed by an external viewer.

use needleview_core::{SessionDriver, SessionStats, TickOutcome};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::time::Duration;

/// A single tick of session data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionFrame {
    /// Session time in seconds
    pub time_sec: f64,

    /// What the tick did: evaluated, held:<reason>, finished, inactive
    pub outcome: String,

    /// Driver state after the tick
    pub state: String,

    /// Nearest waypoint of the displayed result
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<usize>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub position_quality: Option<u8>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub angle_quality: Option<u8>,

    /// [position color, angle color]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub colors: Option<[[f64; 3]; 2]>,

    /// Needle tip of the displayed result
    #[serde(skip_serializing_if = "Option::is_none")]
    pub needle: Option<[f64; 3]>,
}

impl SessionFrame {
    /// Snapshot of what a display would show after this tick.
    pub fn capture(now: Duration, outcome: &TickOutcome, driver: &SessionDriver) -> Self {
        let result = driver.last_result();
        Self {
            time_sec: now.as_secs_f64(),
            outcome: outcome_label(outcome),
            state: driver.state().name().to_string(),
            index: result.map(|r| r.nearest_waypoint_index),
            position_quality: result.map(|r| r.position_quality()),
            angle_quality: result.map(|r| r.angle_quality()),
            colors: result.map(|r| [r.position.color.to_array(), r.orientation.color.to_array()]),
            needle: driver.last_pose().map(|p| [p.position.x, p.position.y, p.position.z]),
        }
    }
}

/// Short label for a tick outcome.
pub fn outcome_label(outcome: &TickOutcome) -> String {
    match outcome {
        TickOutcome::Evaluated(_) => "evaluated".to_string(),
        TickOutcome::Held(reason) => format!("held:{}", hold_label(*reason)),
        TickOutcome::Finished => "finished".to_string(),
        TickOutcome::Inactive => "inactive".to_string(),
    }
}

fn hold_label(reason: needleview_core::HoldReason) -> &'static str {
    use needleview_core::HoldReason::*;
    match reason {
        NoData => "no_data",
        Unavailable => "unavailable",
        Malformed => "malformed",
    }
}

/// Complete session export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionExport {
    /// Scenario or session name
    pub scenario: String,

    /// Seed used
    pub seed: u64,

    /// Duration in seconds
    pub duration_sec: f64,

    /// All frames
    pub frames: Vec<SessionFrame>,

    /// Final results
    pub passed: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<SessionStats>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

impl SessionExport {
    /// Creates a new export container.
    pub fn new(scenario: &str, seed: u64) -> Self {
        Self {
            scenario: scenario.to_string(),
            seed,
            duration_sec: 0.0,
            frames: Vec::new(),
            passed: false,
            stats: None,
            failure_reason: None,
        }
    }

    /// Adds a frame.
    pub fn add_frame(&mut self, frame: SessionFrame) {
        self.duration_sec = frame.time_sec;
        self.frames.push(frame);
    }

    /// Finalizes the export.
    pub fn finalize(&mut self, passed: bool, stats: SessionStats, failure_reason: Option<String>) {
        self.passed = passed;
        self.stats = Some(stats);
        self.failure_reason = failure_reason;
    }

    /// Writes to a JSON file.
    pub fn write_to_file(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use needleview_core::HoldReason;

    #[test]
    fn test_outcome_labels() {
        assert_eq!(outcome_label(&TickOutcome::Held(HoldReason::NoData)), "held:no_data");
        assert_eq!(outcome_label(&TickOutcome::Finished), "finished");
        assert_eq!(outcome_label(&TickOutcome::Inactive), "inactive");
    }

    #[test]
    fn test_write_and_read_back() {
        let mut export = SessionExport::new("on_plan", 42);
        export.add_frame(SessionFrame {
            time_sec: 0.02,
            outcome: "evaluated".to_string(),
            state: "tracking".to_string(),
            index: Some(3),
            position_quality: Some(88),
            angle_quality: Some(97),
            colors: Some([[0.2, 1.0, 0.0], [0.0, 1.0, 0.0]]),
            needle: Some([0.0, 0.0, 1.5]),
        });
        export.finalize(true, SessionStats::default(), None);
        assert_eq!(export.duration_sec, 0.02);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        export.write_to_file(&path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let back: SessionExport = serde_json::from_str(&text).unwrap();
        assert_eq!(back.frames.len(), 1);
        assert_eq!(back.frames[0].index, Some(3));
        assert!(back.passed);
        assert!(!text.contains("failure_reason"));
    }
}
