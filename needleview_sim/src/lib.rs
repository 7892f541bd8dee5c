//! NeedleView Deterministic Simulation Harness
//!
//! Runs complete tracking sessions against a synthetic needle so the
//! driver's guarantees can be checked tick by tick:
//! - **Time**: a virtual clock; `sleep` advances it instantly
//! - **Needle**: an oracle moving along the plan with seeded noise and drift
//! - **Input faults**: vanished files, half-written lines, corrupted rows
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                   ScenarioRunner                     │
//! │   ┌────────────┐   samples    ┌──────────────────┐   │
//! │   │  Oracle    │─────────────►│  PoseSource      │   │
//! │   │ (ChaCha8)  │   plan       │ (replay / live)  │   │
//! │   └─────┬──────┘              └────────┬─────────┘   │
//! │         │                              │ poll        │
//! │         ▼                              ▼             │
//! │   ┌──────────────────────────────────────────────┐   │
//! │   │ SessionDriver  ◄── tick(now) ── SimContext   │   │
//! │   └──────────────────────┬───────────────────────┘   │
//! │                          ▼                           │
//! │                   SessionExport (JSON)               │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use needleview_sim::{ScenarioRunner, scenarios::ScenarioId};
//!
//! let result = ScenarioRunner::new(42).run(ScenarioId::LiveDropout);
//! assert!(result.passed);
//! ```

mod context;
mod exporter;
mod oracle;
mod runner;
pub mod scenarios;

pub use context::SimContext;
pub use exporter::{outcome_label, SessionExport, SessionFrame};
pub use oracle::{OracleConfig, TrajectoryOracle};
pub use runner::{run_session, ScenarioMetrics, ScenarioResult, ScenarioRunner, SimError};
