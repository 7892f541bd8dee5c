//! NeedleView Environment Abstraction Layer
//!
//! This crate isolates everything a tracking session touches outside of
//! pure math:
//! - Time (`now()`, `sleep()`)
//! - Pose input (`PoseSource::poll()`)
//! - Numeric data tables (plans, recordings, insertion targets)
//!
//! The engines in `needleview_core` only see these traits, so the same
//! session code runs against a real tracker file in production and against
//! a virtual clock with synthetic poses in the simulation harness.
//!
//! # Example
//!
//! ```ignore
//! use needleview_env::{NeedleViewContext, PoseSource, PoseRead};
//!
//! async fn poll_loop<Ctx: NeedleViewContext, Src: PoseSource>(ctx: &Ctx, src: &mut Src) {
//!     loop {
//!         if let Ok(PoseRead::Pose(sample)) = src.poll() {
//!             evaluate(sample);
//!         }
//!         ctx.sleep(Duration::from_millis(20)).await;
//!     }
//! }
//! ```

mod context;
mod error;
mod pose_source;
pub mod table;
mod tokio_impl;
mod types;

pub use context::NeedleViewContext;
pub use error::EnvError;
pub use pose_source::{LivePoseFile, PoseMode, PoseSource, ReplaySource};
pub use tokio_impl::TokioContext;
pub use types::{PoseRead, PoseSample, POSE_FIELDS};
