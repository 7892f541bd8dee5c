//! Scenario runner - executes tracking session scenarios on a virtual clock.

use crate::context::SimContext;
use crate::exporter::{SessionExport, SessionFrame};
use crate::oracle::{OracleConfig, TrajectoryOracle};
use crate::scenarios::ScenarioId;

use needleview_core::{
    palette, CoreError, HoldReason, SessionConfig, SessionDriver, SessionState,
    SessionStats, TickOutcome,
};
use needleview_env::table::format_row;
use needleview_env::{LivePoseFile, NeedleViewContext, ReplaySource};
use nalgebra::Vector3;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Setup failures that prevent a scenario from running at all.
#[derive(Debug, Error)]
pub enum SimError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("Scratch file error: {0}")]
    Io(#[from] std::io::Error),
}

/// Results from running a scenario.
#[derive(Debug, Clone)]
pub struct ScenarioResult {
    /// Scenario that was run
    pub scenario: ScenarioId,

    /// Seed used
    pub seed: u64,

    /// Whether scenario passed all assertions
    pub passed: bool,

    /// Total ticks executed
    pub total_ticks: u64,

    /// Final simulation time in seconds
    pub final_time_secs: f64,

    /// Failure message if any
    pub failure_reason: Option<String>,

    /// Metrics collected during run
    pub metrics: ScenarioMetrics,
}

/// Metrics collected during scenario execution.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScenarioMetrics {
    pub evaluations: u64,
    pub held: u64,
    pub out_of_bounds: u64,
    pub min_position_quality: Option<u8>,
    pub mean_position_quality: f64,
    pub mean_angle_quality: f64,
}

/// A driver on a virtual clock, stepping one tick at a time.
struct Harness {
    ctx: SimContext,
    interval: Duration,
    driver: SessionDriver,
    export: Option<SessionExport>,
    ticks: u64,
    position_quality_sum: u64,
    angle_quality_sum: u64,
    min_position_quality: Option<u8>,
}

impl Harness {
    fn new(seed: u64, interval: Duration, name: &str, export: bool) -> Self {
        let config = SessionConfig::default()
            .with_name(name)
            .with_tick_interval(interval);
        Self {
            ctx: SimContext::new(seed),
            interval,
            driver: SessionDriver::new(config),
            export: export.then(|| SessionExport::new(name, seed)),
            ticks: 0,
            position_quality_sum: 0,
            angle_quality_sum: 0,
            min_position_quality: None,
        }
    }

    fn step(&mut self) -> TickOutcome {
        let now = self.ctx.now();
        let outcome = self.driver.tick(now);

        if let TickOutcome::Evaluated(result) = &outcome {
            self.position_quality_sum += result.position_quality() as u64;
            self.angle_quality_sum += result.angle_quality() as u64;
            self.min_position_quality = Some(
                self.min_position_quality
                    .map_or(result.position_quality(), |q| q.min(result.position_quality())),
            );
        }
        if let Some(export) = self.export.as_mut() {
            export.add_frame(SessionFrame::capture(now, &outcome, &self.driver));
        }

        self.ticks += 1;
        if self.ticks % 50 == 0 {
            debug!(
                "  t={:.2}s | state={} | result={:?}",
                now.as_secs_f64(),
                self.driver.state().name(),
                self.driver.last_result().map(|r| r.position_quality())
            );
        }
        self.ctx.advance_time(self.interval);
        outcome
    }

    fn tracking(&self) -> bool {
        self.driver.state() == SessionState::Tracking
    }

    fn metrics(&self) -> ScenarioMetrics {
        let stats = self.driver.stats();
        let n = stats.evaluations.max(1) as f64;
        ScenarioMetrics {
            evaluations: stats.evaluations,
            held: stats.held,
            out_of_bounds: stats.out_of_bounds,
            min_position_quality: self.min_position_quality,
            mean_position_quality: self.position_quality_sum as f64 / n,
            mean_angle_quality: self.angle_quality_sum as f64 / n,
        }
    }
}

/// Collects failed assertions for one scenario.
#[derive(Default)]
struct Checks {
    failures: Vec<String>,
}

impl Checks {
    fn expect(&mut self, ok: bool, reason: impl FnOnce() -> String) {
        if !ok {
            self.failures.push(reason());
        }
    }

    fn into_reason(self) -> Option<String> {
        if self.failures.is_empty() {
            None
        } else {
            Some(self.failures.join("; "))
        }
    }
}

/// Runs tracking scenarios.
pub struct ScenarioRunner {
    /// Configuration seed
    seed: u64,

    /// Session tick interval
    tick_interval: Duration,

    /// Simulated duration in seconds
    max_duration_secs: f64,

    /// Synthetic plan and needle parameters
    oracle: OracleConfig,
}

impl ScenarioRunner {
    /// Creates a new scenario runner.
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            tick_interval: Duration::from_millis(20),
            max_duration_secs: 10.0,
            oracle: OracleConfig::default(),
        }
    }

    /// Sets the tick interval.
    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    /// Sets the simulated duration.
    pub fn with_duration(mut self, secs: f64) -> Self {
        self.max_duration_secs = secs;
        self
    }

    /// Sets the synthetic plan / needle parameters.
    pub fn with_oracle_config(mut self, config: OracleConfig) -> Self {
        self.oracle = config;
        self
    }

    /// Number of ticks in the configured duration.
    pub fn target_ticks(&self) -> u64 {
        let interval = self.tick_interval.as_secs_f64().max(1e-6);
        ((self.max_duration_secs / interval).round() as u64).max(3)
    }

    fn physics_seed(&self) -> u64 {
        self.seed.wrapping_mul(0x9e3779b97f4a7c15)
    }

    /// Runs a scenario and returns the result.
    pub fn run(&self, scenario: ScenarioId) -> ScenarioResult {
        self.execute(scenario, false).0
    }

    /// Runs a scenario and also returns every tick as an export.
    pub fn run_with_export(&self, scenario: ScenarioId) -> (ScenarioResult, SessionExport) {
        let (result, export) = self.execute(scenario, true);
        (result, export.unwrap_or_else(|| SessionExport::new(scenario.name(), self.seed)))
    }

    fn execute(&self, scenario: ScenarioId, export: bool) -> (ScenarioResult, Option<SessionExport>) {
        info!("Starting scenario: {} (seed={})", scenario.name(), self.seed);

        let mut harness = Harness::new(self.seed, self.tick_interval, scenario.name(), export);
        let outcome = match scenario {
            ScenarioId::OnPlan => self.run_on_plan(&mut harness),
            ScenarioId::Drift => self.run_drift(&mut harness),
            ScenarioId::LiveDropout => self.run_live_dropout(&mut harness),
            ScenarioId::CorruptStream => self.run_corrupt_stream(&mut harness),
            ScenarioId::ReplayEnd => self.run_replay_end(&mut harness),
        };

        let failure_reason = match outcome {
            Ok(checks) => checks.into_reason(),
            Err(e) => {
                warn!("Scenario {} could not run: {}", scenario.name(), e);
                Some(format!("setup failed: {}", e))
            }
        };
        let passed = failure_reason.is_none();
        let metrics = harness.metrics();

        info!(
            "{} complete: {} evaluations, {} held, mean quality {:.0}% / {:.0}%",
            scenario.name(),
            metrics.evaluations,
            metrics.held,
            metrics.mean_position_quality,
            metrics.mean_angle_quality
        );

        let mut export = harness.export.take();
        if let Some(export) = export.as_mut() {
            export.finalize(passed, harness.driver.stats(), failure_reason.clone());
        }

        let result = ScenarioResult {
            scenario,
            seed: self.seed,
            passed,
            total_ticks: harness.ticks,
            final_time_secs: harness.ctx.now().as_secs_f64(),
            failure_reason,
            metrics,
        };
        (result, export)
    }

    /// SIM-001: OnPlan - a noisy needle following the plan stays in tolerance.
    fn run_on_plan(&self, h: &mut Harness) -> Result<Checks, SimError> {
        let mut oracle = TrajectoryOracle::new(self.physics_seed(), self.oracle.clone());
        let ticks = self.target_ticks();
        let samples = oracle.samples(ticks as usize);

        h.driver
            .load(oracle.plan()?, Box::new(ReplaySource::from_samples(&samples)))?;
        h.driver.start()?;
        while h.tracking() {
            h.step();
        }

        let m = h.metrics();
        let mut checks = Checks::default();
        checks.expect(m.evaluations == ticks, || {
            format!("{} evaluations for {} samples", m.evaluations, ticks)
        });
        checks.expect(m.out_of_bounds == 0, || {
            format!("{} out-of-bounds evaluations", m.out_of_bounds)
        });
        checks.expect(m.mean_position_quality >= 70.0, || {
            format!("mean position quality {:.1}% below 70%", m.mean_position_quality)
        });
        checks.expect(m.mean_angle_quality >= 70.0, || {
            format!("mean angle quality {:.1}% below 70%", m.mean_angle_quality)
        });
        Ok(checks)
    }

    /// SIM-002: Drift - sideways drift and tilt turn both channels red.
    fn run_drift(&self, h: &mut Harness) -> Result<Checks, SimError> {
        let ticks = self.target_ticks();
        // Three tolerances off the plan by the last sample, in both channels
        let per_tick = 3.0 * self.oracle.position_tolerance / ticks as f64;
        let tilt_per_tick = 3.0 * self.oracle.angle_tolerance_deg / ticks as f64;
        let config = self
            .oracle
            .clone()
            .with_drift(Vector3::new(0.0, per_tick, 0.0))
            .with_angle_drift(tilt_per_tick);
        let mut oracle = TrajectoryOracle::new(self.physics_seed(), config);
        let samples = oracle.samples(ticks as usize);

        h.driver
            .load(oracle.plan()?, Box::new(ReplaySource::from_samples(&samples)))?;
        h.driver.start()?;

        let mut first_quality = None;
        while h.tracking() {
            if let TickOutcome::Evaluated(r) = h.step() {
                first_quality.get_or_insert((r.position_quality(), r.angle_quality()));
            }
        }

        let mut checks = Checks::default();
        checks.expect(first_quality.is_some_and(|(p, a)| p >= 50 && a >= 50), || {
            format!("initial quality {:?} below 50%", first_quality)
        });
        match h.driver.last_result() {
            Some(r) => {
                checks.expect(r.position_quality() == 0, || {
                    format!("final position quality {}% after drifting", r.position_quality())
                });
                checks.expect(r.position.color == palette::WORST, || {
                    "final position color is not red".to_string()
                });
                checks.expect(r.angle_quality() == 0 && r.orientation.color == palette::WORST, || {
                    format!("final angle quality {}% after tilting", r.angle_quality())
                });
            }
            None => checks.expect(false, || "no result after drift".to_string()),
        }
        Ok(checks)
    }

    /// SIM-003: LiveDropout - missing and half-written pose files hold the result.
    fn run_live_dropout(&self, h: &mut Harness) -> Result<Checks, SimError> {
        let mut oracle = TrajectoryOracle::new(self.physics_seed(), self.oracle.clone());
        let ticks = self.target_ticks();
        let samples = oracle.samples(ticks as usize);

        let dir = tempfile::tempdir()?;
        let path = dir.path().join("needle_pose.txt");
        h.driver.load(oracle.plan()?, Box::new(LivePoseFile::new(&path)))?;
        h.driver.start()?;

        let dropout = ticks / 3..2 * ticks / 3;
        let mut checks = Checks::default();
        let mut dropout_ticks = 0u64;
        let mut resumed = 0u64;

        for (t, sample) in samples.iter().enumerate() {
            let t = t as u64;
            let line = format_row(&sample.to_fields());
            let partial = t > dropout.end && t % 10 == 0;

            if dropout.contains(&t) {
                if path.exists() {
                    std::fs::remove_file(&path)?;
                }
            } else if partial {
                // A writer caught mid-line
                let fields: Vec<&str> = line.split_whitespace().take(3).collect();
                std::fs::write(&path, fields.join(" "))?;
            } else {
                std::fs::write(&path, format!("{}\n", line))?;
            }

            let before = h.driver.last_result().cloned();
            let outcome = h.step();

            if dropout.contains(&t) {
                dropout_ticks += 1;
                checks.expect(outcome == TickOutcome::Held(HoldReason::Unavailable), || {
                    format!("tick {} during dropout: {:?}", t, outcome)
                });
                checks.expect(h.driver.last_result().cloned() == before, || {
                    format!("result changed during dropout at tick {}", t)
                });
            } else if partial {
                checks.expect(outcome == TickOutcome::Held(HoldReason::NoData), || {
                    format!("tick {} with partial line: {:?}", t, outcome)
                });
                checks.expect(h.driver.last_result().cloned() == before, || {
                    format!("result changed on partial line at tick {}", t)
                });
            } else if t >= dropout.end && matches!(outcome, TickOutcome::Evaluated(_)) {
                resumed += 1;
            }
            checks.expect(h.tracking(), || format!("left tracking at tick {}", t));
        }

        checks.expect(dropout_ticks > 0, || "dropout window never ran".to_string());
        checks.expect(resumed > 0, || "no evaluations after the file returned".to_string());
        Ok(checks)
    }

    /// SIM-004: CorruptStream - malformed replay rows are skipped one by one.
    fn run_corrupt_stream(&self, h: &mut Harness) -> Result<Checks, SimError> {
        let mut oracle = TrajectoryOracle::new(self.physics_seed(), self.oracle.clone());
        let ticks = self.target_ticks();
        let samples = oracle.samples(ticks as usize);

        let mut rng = ChaCha8Rng::seed_from_u64(self.physics_seed() ^ 0x5eed_c0de);
        let mut corrupted = 0u64;
        let rows: Vec<Vec<f64>> = samples
            .iter()
            .map(|s| {
                let mut row = s.to_fields().to_vec();
                if rng.gen_bool(0.1) {
                    corrupted += 1;
                    if rng.gen_bool(0.5) {
                        row.truncate(rng.gen_range(3..7));
                    } else {
                        row.push(0.0);
                    }
                }
                row
            })
            .collect();

        h.driver
            .load(oracle.plan()?, Box::new(ReplaySource::from_rows(rows)))?;
        h.driver.start()?;

        let mut malformed = 0u64;
        while h.tracking() {
            if h.step() == TickOutcome::Held(HoldReason::Malformed) {
                malformed += 1;
            }
        }

        let m = h.metrics();
        let mut checks = Checks::default();
        checks.expect(malformed == corrupted, || {
            format!("{} rows corrupted, {} skipped", corrupted, malformed)
        });
        checks.expect(m.evaluations == ticks - corrupted, || {
            format!("{} evaluations, expected {}", m.evaluations, ticks - corrupted)
        });
        checks.expect(h.driver.state() == SessionState::Paused, || {
            format!("ended in {:?}", h.driver.state())
        });
        Ok(checks)
    }

    /// SIM-005: ReplayEnd - the last row pauses the session and rewinds it.
    fn run_replay_end(&self, h: &mut Harness) -> Result<Checks, SimError> {
        let mut oracle = TrajectoryOracle::new(self.physics_seed(), self.oracle.clone());
        let ticks = self.target_ticks();
        let rows = (ticks / 2).max(1);
        let samples = oracle.samples(rows as usize);

        h.driver
            .load(oracle.plan()?, Box::new(ReplaySource::from_samples(&samples)))?;
        h.driver.start()?;

        let mut first = None;
        let mut used = 0u64;
        while h.tracking() && used < ticks {
            if let TickOutcome::Evaluated(r) = h.step() {
                first.get_or_insert(r);
            }
            used += 1;
        }

        let mut checks = Checks::default();
        checks.expect(used == rows, || format!("{} ticks for {} rows", used, rows));
        checks.expect(h.driver.state() == SessionState::Paused, || {
            format!("ended in {:?}", h.driver.state())
        });
        checks.expect(h.step() == TickOutcome::Inactive, || {
            "paused driver still ticking".to_string()
        });

        h.driver.start()?;
        let replayed = match h.step() {
            TickOutcome::Evaluated(r) => Some(r),
            _ => None,
        };
        checks.expect(first.is_some() && replayed == first, || {
            "resumed replay did not restart at the first row".to_string()
        });
        Ok(checks)
    }
}

/// Drives a started session on any context until it stops or `max_ticks`
/// elapse, appending a frame per tick to `export` when given.
pub async fn run_session<Ctx: NeedleViewContext>(
    driver: &mut SessionDriver,
    ctx: &Ctx,
    max_ticks: Option<u64>,
    mut export: Option<&mut SessionExport>,
) -> SessionStats {
    driver
        .run_with(ctx, max_ticks, |now, outcome, d| {
            if let Some(export) = export.as_deref_mut() {
                export.add_frame(SessionFrame::capture(now, outcome, d));
            }
        })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runner(seed: u64) -> ScenarioRunner {
        ScenarioRunner::new(seed).with_duration(2.0)
    }

    #[test]
    fn test_target_ticks() {
        assert_eq!(ScenarioRunner::new(1).target_ticks(), 500);
        assert_eq!(runner(1).target_ticks(), 100);
        assert_eq!(
            runner(1).with_tick_interval(Duration::from_millis(50)).target_ticks(),
            40
        );
    }

    #[test]
    fn test_all_scenarios_pass() {
        for seed in [1, 42, 1234] {
            for scenario in ScenarioId::all() {
                let result = runner(seed).run(scenario);
                assert!(
                    result.passed,
                    "{} seed={} failed: {:?}",
                    scenario,
                    seed,
                    result.failure_reason
                );
            }
        }
    }

    #[test]
    fn test_on_plan_metrics() {
        let result = runner(42).run(ScenarioId::OnPlan);
        assert_eq!(result.metrics.evaluations, 100);
        assert_eq!(result.metrics.held, 0);
        assert_eq!(result.total_ticks, 100);
        assert!((result.final_time_secs - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_live_dropout_holds() {
        let result = runner(7).run(ScenarioId::LiveDropout);
        assert!(result.metrics.held >= 33);
        assert!(result.metrics.evaluations > 0);
    }

    #[test]
    fn test_same_seed_same_result() {
        let a = runner(99).run(ScenarioId::CorruptStream);
        let b = runner(99).run(ScenarioId::CorruptStream);
        assert_eq!(a.metrics.evaluations, b.metrics.evaluations);
        assert_eq!(a.metrics.held, b.metrics.held);
        assert_eq!(a.metrics.mean_position_quality, b.metrics.mean_position_quality);
    }

    #[test]
    fn test_export_has_a_frame_per_tick() {
        let (result, export) = runner(5).run_with_export(ScenarioId::Drift);
        assert_eq!(export.frames.len() as u64, result.total_ticks);
        assert_eq!(export.scenario, "drift");
        assert_eq!(export.passed, result.passed);
        assert_eq!(export.frames.last().unwrap().position_quality, Some(0));
    }

    #[tokio::test]
    async fn test_run_session_on_virtual_clock() {
        let mut oracle = TrajectoryOracle::new(3, OracleConfig::default());
        let samples = oracle.samples(25);
        let mut driver = SessionDriver::new(SessionConfig::default());
        driver
            .load(oracle.plan().unwrap(), Box::new(ReplaySource::from_samples(&samples)))
            .unwrap();
        driver.start().unwrap();

        let ctx = SimContext::new(3);
        let mut export = SessionExport::new("virtual", 3);
        let stats = run_session(&mut driver, &ctx, None, Some(&mut export)).await;

        assert_eq!(stats.evaluations, 25);
        assert_eq!(export.frames.len(), 25);
        // 24 sleeps between 25 ticks
        assert_eq!(ctx.now(), Duration::from_millis(24 * 20));
        assert_eq!(export.frames.last().unwrap().state, "paused");
    }
}
