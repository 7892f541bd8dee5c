//! NeedleView Simulator CLI
//!
//! Run deterministic session scenarios, or drive a real session from plan
//! and pose files on the wall clock.

use anyhow::{bail, Context, Result};
use clap::Parser;
use needleview_core::recorder::DEFAULT_LOG_NAME;
use needleview_core::{
    InsertionCone, InsertionRegion, InsertionTargets, Plan, SessionConfig, SessionDriver,
};
use needleview_env::{LivePoseFile, PoseSource, ReplaySource, TokioContext};
use needleview_sim::scenarios::ScenarioId;
use needleview_sim::{run_session, ScenarioResult, ScenarioRunner, SessionExport};
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// NeedleView session simulator
#[derive(Parser, Debug)]
#[command(name = "needleview-sim")]
#[command(about = "Run NeedleView tracking scenarios or drive a session from files", long_about = None)]
struct Args {
    /// Master seed for determinism (0 = random from time)
    #[arg(short, long, default_value = "42")]
    seed: u64,

    /// Scenario to run (on_plan, drift, live_dropout, corrupt_stream, replay_end, all)
    #[arg(short = 'S', long, default_value = "all")]
    scenario: String,

    /// Number of consecutive seeds to test
    #[arg(long, default_value = "1")]
    seeds: usize,

    /// Simulated duration in seconds
    #[arg(short, long, default_value = "10")]
    duration: f64,

    /// Plan file; switches to a real-time session
    #[arg(long)]
    plan: Option<PathBuf>,

    /// Recorded pose rows to replay (with --plan)
    #[arg(long, conflicts_with = "live")]
    replay: Option<PathBuf>,

    /// Live pose file rewritten by a tracker bridge (with --plan)
    #[arg(long)]
    live: Option<PathBuf>,

    /// Insertion region file (x y z radius)
    #[arg(long)]
    region: Option<PathBuf>,

    /// Insertion angle file (x y z height angle theta phi)
    #[arg(long)]
    angle: Option<PathBuf>,

    /// Session configuration (JSON)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Append accepted poses to this file (default name when given bare)
    #[arg(long, num_args = 0..=1, default_missing_value = DEFAULT_LOG_NAME)]
    pose_log: Option<PathBuf>,

    /// Stop a real-time session after this many ticks
    #[arg(long)]
    max_ticks: Option<u64>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// JSON output for CI parsing
    #[arg(long)]
    json: bool,

    /// Export per-tick frames to a JSON file
    #[arg(long)]
    export: Option<PathBuf>,
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Drives a session from files in real time.
async fn run_file_session(args: &Args, plan_path: &PathBuf) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => SessionConfig::from_json_file(path)?,
        None => SessionConfig::default(),
    };
    if let Some(log) = &args.pose_log {
        config = config.with_pose_log(log);
    }

    let plan = Plan::load(plan_path, &config.plan_schema)
        .with_context(|| format!("loading plan {}", plan_path.display()))?;

    let source: Box<dyn PoseSource> = match (&args.replay, &args.live) {
        (Some(path), _) => Box::new(
            ReplaySource::load(path, config.replay_header_lines)
                .with_context(|| format!("loading recording {}", path.display()))?,
        ),
        (None, Some(path)) => Box::new(LivePoseFile::new(path)),
        (None, None) => bail!("--plan needs either --replay or --live"),
    };

    let mut targets = InsertionTargets::default();
    if let Some(path) = &args.region {
        targets = targets.with_region(InsertionRegion::load(path, config.target_header_lines)?);
    }
    if let Some(path) = &args.angle {
        targets = targets.with_cone(InsertionCone::load(path, config.target_header_lines)?);
    }

    let mut driver = SessionDriver::new(config);
    driver.load(plan, source)?;
    driver.set_targets(targets);
    driver.start()?;

    let mut export = args.export.as_ref().map(|_| SessionExport::new("session", 0));
    let ctx = TokioContext::new();
    let stats = run_session(&mut driver, &ctx, args.max_ticks, export.as_mut()).await;

    if let (Some(path), Some(export)) = (&args.export, export.as_mut()) {
        export.finalize(true, stats, None);
        export
            .write_to_file(path)
            .with_context(|| format!("writing export {}", path.display()))?;
        info!("Exported {} frames to {}", export.frames.len(), path.display());
    }

    if args.json {
        let summary = serde_json::json!({
            "state": driver.state().name(),
            "stats": stats,
            "last_result": driver.last_result(),
        });
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        info!(
            "Session '{}' ended ({}): {} ticks, {} evaluations, {} held, {} out of bounds",
            driver.config().name,
            driver.state().name(),
            stats.ticks,
            stats.evaluations,
            stats.held,
            stats.out_of_bounds
        );
        if let Some(log) = driver.pose_log() {
            info!(
                "Logged {} poses to {} ({} failed writes)",
                log.lines(),
                log.path().display(),
                log.failures()
            );
        }
        if let Some(r) = driver.last_result() {
            info!(
                "Last result: waypoint {} | position {}% | angle {}%",
                r.nearest_waypoint_index,
                r.position_quality(),
                r.angle_quality()
            );
        }
    }
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    if let Some(plan_path) = &args.plan {
        return run_file_session(&args, plan_path).await;
    }

    if !args.json {
        info!("NeedleView Simulator v{}", env!("CARGO_PKG_VERSION"));
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    }

    // Parse scenarios
    let scenarios: Vec<ScenarioId> = if args.scenario == "all" {
        ScenarioId::all()
    } else {
        match args.scenario.parse() {
            Ok(id) => vec![id],
            Err(e) => bail!(
                "{} (available: {})",
                e,
                ScenarioId::all()
                    .iter()
                    .map(|s| s.name())
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        }
    };

    // Determine base seed
    let base_seed = if args.seed == 0 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(42)
    } else {
        args.seed
    };

    // Handle --export mode
    if let Some(export_path) = &args.export {
        if scenarios.len() > 1 {
            bail!("--export only supports a single scenario, not 'all'");
        }
        let runner = ScenarioRunner::new(base_seed).with_duration(args.duration);
        let (result, export) = runner.run_with_export(scenarios[0]);
        export
            .write_to_file(export_path)
            .with_context(|| format!("writing export {}", export_path.display()))?;
        info!("Exported {} frames to {}", export.frames.len(), export_path.display());

        report(&result);
        if !result.passed {
            std::process::exit(1);
        }
        return Ok(());
    }

    // Run simulations
    let mut all_results: Vec<ScenarioResult> = Vec::new();
    for seed_offset in 0..args.seeds {
        let seed = base_seed.wrapping_add(seed_offset as u64);
        let runner = ScenarioRunner::new(seed).with_duration(args.duration);

        for scenario in &scenarios {
            let result = runner.run(*scenario);
            if !args.json {
                report(&result);
            }
            all_results.push(result);
        }
    }

    // Summary
    let total = all_results.len();
    let failed_count = all_results.iter().filter(|r| !r.passed).count();

    if args.json {
        let summary = serde_json::json!({
            "total": total,
            "passed": total - failed_count,
            "failed": failed_count,
            "results": all_results.iter().map(|r| {
                serde_json::json!({
                    "scenario": r.scenario.name(),
                    "seed": r.seed,
                    "passed": r.passed,
                    "ticks": r.total_ticks,
                    "time_secs": r.final_time_secs,
                    "metrics": r.metrics,
                    "failure_reason": r.failure_reason,
                })
            }).collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        if failed_count == 0 {
            info!("All {} scenario runs passed", total);
        } else {
            error!("{}/{} scenario runs failed", failed_count, total);
        }
    }

    // Exit with proper code for CI
    if failed_count > 0 {
        std::process::exit(1);
    }
    Ok(())
}

fn report(result: &ScenarioResult) {
    if result.passed {
        info!("✓ {} (seed={}) PASSED - {}", result.scenario, result.seed, result.scenario.description());
    } else {
        error!(
            "✗ {} (seed={}) FAILED: {}",
            result.scenario,
            result.seed,
            result.failure_reason.as_deref().unwrap_or("unknown")
        );
    }
}
