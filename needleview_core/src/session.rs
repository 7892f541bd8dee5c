//! Session Driver - Orchestrates plan, pose source and scorer on a fixed tick.
//!
//! # State Machine
//!
//! ```text
//!            load            start               pause
//!   Idle ──────────► Loaded ───────► Tracking ◄─────────► Paused
//!    ▲                                   │        start      │
//!    │                                   │ replay ends       │
//!    │                                   └──────────────────►┤
//!    └────────────────────── reset (from any state) ─────────┘
//! ```
//!
//! # Tick
//!
//! Each tick polls the pose source once, registers the pose, finds the
//! nearest waypoint and scores it. Per-tick input problems (no data, missing
//! file, malformed row) never leave `Tracking`; the previous result is held.
//!
//! # Usage
//!
//! ```ignore
//! use needleview_core::session::{SessionConfig, SessionDriver};
//! use needleview_env::{LivePoseFile, TokioContext};
//!
//! let mut driver = SessionDriver::new(SessionConfig::default());
//! driver.load(plan, Box::new(LivePoseFile::new("needle_pose.txt")))?;
//! driver.start()?;
//! driver.run(&TokioContext::new()).await;
//! ```

use crate::error::{CoreError, Result};
use crate::insertion::InsertionTargets;
use crate::needle::{NeedleModel, NeedlePose};
use crate::plan::{Plan, PlanSchema};
use crate::recorder::PoseLog;
use crate::registration::NeedleRegistration;
use crate::scoring::{DeviationResult, DeviationScorer};
use needleview_env::{EnvError, NeedleViewContext, PoseMode, PoseRead, PoseSource};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Configuration for a tracking session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Session name (for logging)
    pub name: String,

    /// Polling interval in milliseconds (default: 20)
    pub tick_interval_ms: u64,

    /// How plan files are read
    pub plan_schema: PlanSchema,

    /// Header lines skipped in replay recordings (default: 0)
    pub replay_header_lines: usize,

    /// Header lines skipped in region / angle files (default: 1)
    pub target_header_lines: usize,

    /// Tracker-to-plan transform
    pub registration: NeedleRegistration,

    /// Composite needle dimensions
    pub needle: NeedleModel,

    /// Append accepted poses to this file when set
    pub pose_log: Option<PathBuf>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            name: "needleview-session".to_string(),
            tick_interval_ms: 20,
            plan_schema: PlanSchema::default(),
            replay_header_lines: 0,
            target_header_lines: 1,
            registration: NeedleRegistration::identity(),
            needle: NeedleModel::default(),
            pose_log: None,
        }
    }
}

impl SessionConfig {
    /// Reads a JSON config. Missing fields take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(EnvError::from)?;
        Self::from_json_str(&text)
            .map_err(|e| CoreError::Config(format!("{}: {}", path.display(), e)))
    }

    pub fn from_json_str(text: &str) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn with_plan_schema(mut self, schema: PlanSchema) -> Self {
        self.plan_schema = schema;
        self
    }

    pub fn with_registration(mut self, registration: NeedleRegistration) -> Self {
        self.registration = registration;
        self
    }

    pub fn with_pose_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.pose_log = Some(path.into());
        self
    }
}

/// Driver lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// No plan loaded, no polling
    Idle,
    /// Plan and needle model ready, polling not started
    Loaded,
    /// Polling every tick
    Tracking,
    /// Polling stopped, last result retained
    Paused,
}

impl SessionState {
    pub fn name(self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Loaded => "loaded",
            SessionState::Tracking => "tracking",
            SessionState::Paused => "paused",
        }
    }
}

/// Why a tick kept the previous result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HoldReason {
    /// Source had nothing new (empty or partially written)
    NoData,
    /// Source missing or unreadable
    Unavailable,
    /// Row without a complete pose
    Malformed,
}

/// What a single tick did.
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// A pose was scored; the result is now `last_result`
    Evaluated(DeviationResult),
    /// Nothing scored, previous result retained
    Held(HoldReason),
    /// Replay reached its end; the driver is now paused
    Finished,
    /// Not tracking
    Inactive,
}

/// Counters for one session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionStats {
    pub ticks: u64,
    pub evaluations: u64,
    pub held: u64,
    pub out_of_bounds: u64,
    /// Poses appended to the pose log
    pub logged: u64,
    /// Pose log writes that failed
    pub log_failures: u64,
}

/// Owns the plan, pose source and latest result of a tracking session.
pub struct SessionDriver {
    config: SessionConfig,
    state: SessionState,
    plan: Option<Plan>,
    source: Option<Box<dyn PoseSource>>,
    targets: InsertionTargets,
    scorer: DeviationScorer,
    pose_log: Option<PoseLog>,
    last_result: Option<DeviationResult>,
    last_pose: Option<NeedlePose>,
    ticks: u64,
    held: u64,
}

impl SessionDriver {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            state: SessionState::Idle,
            plan: None,
            source: None,
            targets: InsertionTargets::default(),
            scorer: DeviationScorer::new(),
            pose_log: None,
            last_result: None,
            last_pose: None,
            ticks: 0,
            held: 0,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn plan(&self) -> Option<&Plan> {
        self.plan.as_ref()
    }

    pub fn needle_model(&self) -> &NeedleModel {
        &self.config.needle
    }

    pub fn targets(&self) -> &InsertionTargets {
        &self.targets
    }

    /// Most recent evaluation, held across skipped ticks and pauses.
    pub fn last_result(&self) -> Option<&DeviationResult> {
        self.last_result.as_ref()
    }

    /// Pose behind `last_result`.
    pub fn last_pose(&self) -> Option<&NeedlePose> {
        self.last_pose.as_ref()
    }

    pub fn mode(&self) -> Option<PoseMode> {
        self.source.as_ref().map(|s| s.mode())
    }

    pub fn pose_log(&self) -> Option<&PoseLog> {
        self.pose_log.as_ref()
    }

    pub fn stats(&self) -> SessionStats {
        let scorer = self.scorer.stats();
        SessionStats {
            ticks: self.ticks,
            evaluations: scorer.evaluations,
            held: self.held,
            out_of_bounds: scorer.out_of_bounds,
            logged: self.pose_log.as_ref().map_or(0, |log| log.lines()),
            log_failures: self.pose_log.as_ref().map_or(0, |log| log.failures()),
        }
    }

    /// Installs a plan and pose source. Idle/Loaded → Loaded.
    pub fn load(&mut self, plan: Plan, source: Box<dyn PoseSource>) -> Result<()> {
        if !matches!(self.state, SessionState::Idle | SessionState::Loaded) {
            return Err(self.invalid("load"));
        }

        info!(
            "[{}] Loaded plan ({} waypoints), source {}",
            self.config.name,
            plan.len(),
            source.describe()
        );

        if let Some(path) = &self.config.pose_log {
            match PoseLog::open(path) {
                Ok(log) => self.pose_log = Some(log),
                Err(e) => warn!("[{}] Pose log {} disabled: {}", self.config.name, path.display(), e),
            }
        }

        self.plan = Some(plan);
        self.source = Some(source);
        self.state = SessionState::Loaded;
        Ok(())
    }

    /// Sets the insertion targets scored alongside the plan.
    pub fn set_targets(&mut self, targets: InsertionTargets) {
        self.targets = targets;
    }

    /// Loaded/Paused → Tracking.
    pub fn start(&mut self) -> Result<()> {
        if !matches!(self.state, SessionState::Loaded | SessionState::Paused) {
            return Err(self.invalid("start"));
        }
        info!("[{}] Tracking started", self.config.name);
        self.state = SessionState::Tracking;
        Ok(())
    }

    /// Tracking → Paused. The last result stays available.
    pub fn pause(&mut self) -> Result<()> {
        if self.state != SessionState::Tracking {
            return Err(self.invalid("pause"));
        }
        info!("[{}] Tracking paused", self.config.name);
        self.state = SessionState::Paused;
        Ok(())
    }

    /// Any state → Idle. Drops plan, source, targets and results.
    pub fn reset(&mut self) {
        info!("[{}] Session reset", self.config.name);
        *self = Self::new(self.config.clone());
    }

    /// Runs one polling cycle. `now` stamps the pose and the pose log.
    pub fn tick(&mut self, now: Duration) -> TickOutcome {
        if self.state != SessionState::Tracking {
            return TickOutcome::Inactive;
        }
        let Some(source) = self.source.as_mut() else {
            return TickOutcome::Inactive;
        };
        self.ticks += 1;

        let read = source.poll();
        let finished = source.mode() == PoseMode::Replay && source.is_exhausted();

        let outcome = match read {
            Ok(PoseRead::Pose(sample)) => {
                if let Some(log) = self.pose_log.as_mut() {
                    log.record(now, &sample);
                }
                let pose = NeedlePose::from_sample(&sample, &self.config.registration).with_timestamp(now);
                self.evaluate(pose)
            }
            Ok(PoseRead::NoData) => {
                debug!("[{}] No pose data this tick", self.config.name);
                TickOutcome::Held(HoldReason::NoData)
            }
            Ok(PoseRead::Exhausted) => {
                self.finish();
                return TickOutcome::Finished;
            }
            Err(
                e @ (EnvError::UnexpectedPoseFormat { .. }
                | EnvError::NonFinitePose { .. }
                | EnvError::MalformedTable { .. }),
            ) => {
                warn!("[{}] Skipping tick: {}", self.config.name, e);
                TickOutcome::Held(HoldReason::Malformed)
            }
            Err(e) => {
                warn!("[{}] Skipping tick: {}", self.config.name, e);
                TickOutcome::Held(HoldReason::Unavailable)
            }
        };

        if matches!(outcome, TickOutcome::Held(_)) {
            self.held += 1;
        }
        if finished {
            self.finish();
        }
        outcome
    }

    fn evaluate(&mut self, pose: NeedlePose) -> TickOutcome {
        let Some(plan) = self.plan.as_ref() else {
            return TickOutcome::Inactive;
        };
        match self.scorer.evaluate(plan, &pose) {
            Ok(mut result) => {
                result.targets = self.targets.evaluate(&pose);
                self.last_result = Some(result.clone());
                self.last_pose = Some(pose);
                TickOutcome::Evaluated(result)
            }
            Err(e) => {
                warn!("[{}] Evaluation failed: {}", self.config.name, e);
                TickOutcome::Held(HoldReason::Malformed)
            }
        }
    }

    /// Replay ran out: stop and rewind for the next start.
    fn finish(&mut self) {
        if let Some(source) = self.source.as_mut() {
            source.rewind();
        }
        self.state = SessionState::Paused;
        let stats = self.stats();
        info!(
            "[{}] Replay finished after {} evaluations ({} held)",
            self.config.name, stats.evaluations, stats.held
        );
    }

    fn invalid(&self, action: &'static str) -> CoreError {
        CoreError::InvalidTransition {
            from: self.state.name(),
            action,
        }
    }

    /// Ticks until the driver leaves `Tracking`.
    pub async fn run<Ctx: NeedleViewContext>(&mut self, ctx: &Ctx) -> SessionStats {
        self.run_with(ctx, None, |_, _, _| {}).await
    }

    /// Ticks until the driver leaves `Tracking` or `max_ticks` elapse,
    /// calling `on_tick` after every tick.
    pub async fn run_with<Ctx, F>(
        &mut self,
        ctx: &Ctx,
        max_ticks: Option<u64>,
        mut on_tick: F,
    ) -> SessionStats
    where
        Ctx: NeedleViewContext,
        F: FnMut(Duration, &TickOutcome, &SessionDriver),
    {
        let interval = self.config.tick_interval();
        let mut count = 0u64;

        while self.state == SessionState::Tracking {
            if max_ticks.is_some_and(|max| count >= max) {
                break;
            }
            let now = ctx.now();
            let outcome = self.tick(now);
            on_tick(now, &outcome, self);
            count += 1;

            if self.state != SessionState::Tracking {
                break;
            }
            ctx.sleep(interval).await;
        }

        self.stats()
    }
}

impl std::fmt::Debug for SessionDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionDriver")
            .field("name", &self.config.name)
            .field("state", &self.state)
            .field("source", &self.source.as_ref().map(|s| s.describe()))
            .field("stats", &self.stats())
            .finish()
    }
}
