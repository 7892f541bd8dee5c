//! NeedleView Core - Needle-to-Plan Tracking and Deviation Scoring
//!
//! Given a stream of tracked needle poses and a pre-computed insertion plan,
//! this library answers one question every tick: how far is the needle from
//! where the plan says it should be, and what color should that be?
//!
//! 1. **Plan Store**: waypoints with positional / angular tolerance envelopes
//! 2. **Spatial Index**: static R*-tree for nearest-waypoint queries
//! 3. **Deviation Scorer**: ratio → quality percentage → palette color
//! 4. **Session Driver**: fixed-interval polling of replay or live pose input

pub mod error;
pub mod geometry;
pub mod insertion;
pub mod needle;
pub mod palette;
pub mod plan;
pub mod recorder;
pub mod registration;
pub mod scoring;
pub mod session;
pub mod spatial;

// Re-export key types for convenience
pub use error::{CoreError, Result};
pub use insertion::{InsertionCone, InsertionRegion, InsertionTargets, TargetFeedback};
pub use needle::{NeedleModel, NeedlePose};
pub use palette::Rgb;
pub use plan::{AngleUnit, NearestWaypoint, Plan, PlanSchema, Waypoint};
pub use registration::NeedleRegistration;
pub use scoring::{ChannelFeedback, DeviationResult, DeviationScorer};
pub use session::{HoldReason, SessionConfig, SessionDriver, SessionState, SessionStats, TickOutcome};
pub use spatial::SpatialIndex;
