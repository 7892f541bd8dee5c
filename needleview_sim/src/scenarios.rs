//! Tracking session scenarios.

/// Scenario identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioId {
    /// SIM-001: noisy needle follows the plan
    OnPlan,

    /// SIM-002: needle drifts out of the funnel and tilts off the plan heading
    Drift,

    /// SIM-003: live pose file disappears mid-session
    LiveDropout,

    /// SIM-004: replay recording with corrupted rows
    CorruptStream,

    /// SIM-005: replay runs out and the session pauses
    ReplayEnd,
}

impl ScenarioId {
    /// Returns a list of all scenarios.
    pub fn all() -> Vec<ScenarioId> {
        vec![
            ScenarioId::OnPlan,
            ScenarioId::Drift,
            ScenarioId::LiveDropout,
            ScenarioId::CorruptStream,
            ScenarioId::ReplayEnd,
        ]
    }

    /// Returns the scenario name.
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::OnPlan => "on_plan",
            ScenarioId::Drift => "drift",
            ScenarioId::LiveDropout => "live_dropout",
            ScenarioId::CorruptStream => "corrupt_stream",
            ScenarioId::ReplayEnd => "replay_end",
        }
    }

    /// Returns a description of the scenario.
    pub fn description(&self) -> &'static str {
        match self {
            ScenarioId::OnPlan => "Noisy needle on the plan, no channel leaves its tolerance",
            ScenarioId::Drift => "Needle drifts sideways and tilts until both channels turn red",
            ScenarioId::LiveDropout => "Live pose file removed and rewritten partially, results held",
            ScenarioId::CorruptStream => "10% of replay rows corrupted, each skipped without stopping",
            ScenarioId::ReplayEnd => "Replay reaches its last row, pauses, and resumes from the start",
        }
    }
}

impl std::fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for ScenarioId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "on_plan" | "onplan" | "sim-001" => Ok(ScenarioId::OnPlan),
            "drift" | "sim-002" => Ok(ScenarioId::Drift),
            "live_dropout" | "livedropout" | "sim-003" => Ok(ScenarioId::LiveDropout),
            "corrupt_stream" | "corruptstream" | "sim-004" => Ok(ScenarioId::CorruptStream),
            "replay_end" | "replayend" | "sim-005" => Ok(ScenarioId::ReplayEnd),
            _ => Err(format!("Unknown scenario: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_parse_back() {
        for id in ScenarioId::all() {
            assert_eq!(id.name().parse::<ScenarioId>().unwrap(), id);
            assert_eq!(id.to_string(), id.name());
        }
        assert_eq!("SIM-003".parse::<ScenarioId>().unwrap(), ScenarioId::LiveDropout);
        assert!("time_warp".parse::<ScenarioId>().is_err());
    }
}
