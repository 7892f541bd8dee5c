//! Deviation scorer - maps needle-to-waypoint deviation onto the feedback palette.
//!
//! Each channel (position, angle, and the optional insertion targets) is a
//! ratio of observed deviation to allowed deviation:
//!
//! ```text
//! ratio > 1   -> quality 0, palette[0] (red)
//! ratio <= 1  -> quality = round((1 - ratio) * 100)
//!                index   = floor((1 - ratio) * (size - 1))
//! ```
//!
//! The mapping is linear with no smoothing or hysteresis.

use crate::error::{CoreError, Result};
use crate::geometry::angle_between;
use crate::insertion::TargetFeedback;
use crate::needle::NeedlePose;
use crate::palette::{self, Rgb};
use crate::plan::{Plan, Waypoint};
use serde::{Deserialize, Serialize};

/// Ratio of `deviation` to `tolerance`.
///
/// A zero tolerance gives `+inf` for any positive deviation and `0` when
/// the deviation is zero as well. A NaN input gives a NaN ratio, which
/// scores as out of bounds.
pub fn deviation_ratio(deviation: f64, tolerance: f64) -> f64 {
    if deviation.is_nan() || tolerance.is_nan() {
        f64::NAN
    } else if tolerance > 0.0 {
        (deviation / tolerance).max(0.0)
    } else if deviation > 0.0 {
        f64::INFINITY
    } else {
        0.0
    }
}

/// Feedback for one channel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChannelFeedback {
    /// Deviation / tolerance; above 1 is out of bounds
    pub ratio: f64,

    /// 0-100
    pub quality: u8,

    pub palette_index: usize,
    pub color: Rgb,
}

impl ChannelFeedback {
    pub fn from_ratio(ratio: f64) -> Self {
        // NaN lands in the out-of-bounds branch
        if !(ratio <= 1.0) {
            return Self {
                ratio,
                quality: 0,
                palette_index: 0,
                color: palette::WORST,
            };
        }
        let goodness = 1.0 - ratio;
        let palette_index = palette::palette_index_for(goodness);
        Self {
            ratio,
            quality: (goodness * 100.0).round().clamp(0.0, 100.0) as u8,
            palette_index,
            color: palette::palette(palette_index),
        }
    }

    pub fn from_deviation(deviation: f64, tolerance: f64) -> Self {
        Self::from_ratio(deviation_ratio(deviation, tolerance))
    }

    pub fn is_out_of_bounds(&self) -> bool {
        !(self.ratio <= 1.0)
    }
}

/// Output of one evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviationResult {
    pub nearest_waypoint_index: usize,

    /// Distance from needle tip to the waypoint
    pub distance: f64,

    /// Angle between needle and waypoint forward axes, radians
    pub angle: f64,

    pub position: ChannelFeedback,
    pub orientation: ChannelFeedback,

    /// Insertion region / cone feedback when targets are configured
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub targets: Option<TargetFeedback>,
}

impl DeviationResult {
    pub fn positional_ratio(&self) -> f64 {
        self.position.ratio
    }

    pub fn angular_ratio(&self) -> f64 {
        self.orientation.ratio
    }

    pub fn position_quality(&self) -> u8 {
        self.position.quality
    }

    pub fn angle_quality(&self) -> u8 {
        self.orientation.quality
    }

    /// True if either plan channel is outside its tolerance.
    pub fn is_out_of_bounds(&self) -> bool {
        self.position.is_out_of_bounds() || self.orientation.is_out_of_bounds()
    }
}

/// Scores `pose` against a single waypoint.
pub fn score(index: usize, waypoint: &Waypoint, pose: &NeedlePose) -> DeviationResult {
    let distance = (pose.position - waypoint.position).norm();
    let angle = angle_between(&waypoint.forward_axis(), &pose.forward_axis());

    DeviationResult {
        nearest_waypoint_index: index,
        distance,
        angle,
        position: ChannelFeedback::from_deviation(distance, waypoint.position_tolerance),
        orientation: ChannelFeedback::from_deviation(angle, waypoint.angle_tolerance),
        targets: None,
    }
}

/// Running counters kept by the scorer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ScorerStats {
    pub evaluations: u64,
    pub out_of_bounds: u64,
}

impl ScorerStats {
    /// Fraction of evaluations with a channel out of bounds.
    pub fn out_of_bounds_rate(&self) -> f64 {
        if self.evaluations == 0 {
            0.0
        } else {
            self.out_of_bounds as f64 / self.evaluations as f64
        }
    }
}

/// Nearest-waypoint query plus scoring: the work of one tick.
#[derive(Debug, Default)]
pub struct DeviationScorer {
    stats: ScorerStats,
}

impl DeviationScorer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Finds the waypoint nearest to `pose` and scores against it.
    pub fn evaluate(&mut self, plan: &Plan, pose: &NeedlePose) -> Result<DeviationResult> {
        let nearest = plan.nearest(&pose.position);
        let waypoint = plan.waypoint(nearest.index).ok_or(CoreError::NoPlanLoaded)?;
        let result = score(nearest.index, waypoint, pose);

        self.stats.evaluations += 1;
        if result.is_out_of_bounds() {
            self.stats.out_of_bounds += 1;
        }
        Ok(result)
    }

    pub fn stats(&self) -> ScorerStats {
        self.stats
    }

    pub fn reset_stats(&mut self) {
        self.stats = ScorerStats::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::rotation_about_x;
    use crate::plan::tests::{line_plan, row_at};
    use crate::plan::PlanSchema;
    use approx::assert_relative_eq;
    use nalgebra::{Matrix3, Vector3};

    fn waypoint(position_tol: f64, angle_tol: f64) -> Waypoint {
        let plan = Plan::from_rows(&[row_at([0.0; 3], position_tol, angle_tol)], &PlanSchema::default())
            .unwrap();
        plan.waypoints()[0].clone()
    }

    #[test]
    fn test_half_tolerance() {
        let w = waypoint(5.0, 0.5);
        let pose = NeedlePose::new(Vector3::new(2.5, 0.0, 0.0), Matrix3::identity());
        let r = score(0, &w, &pose);

        assert_relative_eq!(r.positional_ratio(), 0.5);
        assert_eq!(r.position_quality(), 50);
        assert_eq!(r.position.palette_index, 14);
        assert_eq!(r.position.color, palette::palette(14));
        assert_eq!(r.angle_quality(), 100);
        assert_eq!(r.orientation.palette_index, 29);
    }

    #[test]
    fn test_beyond_tolerance_is_red() {
        let w = waypoint(5.0, 0.5);
        let pose = NeedlePose::new(Vector3::new(6.0, 0.0, 0.0), Matrix3::identity());
        let r = score(0, &w, &pose);

        assert_relative_eq!(r.positional_ratio(), 1.2);
        assert_eq!(r.position_quality(), 0);
        assert_eq!(r.position.palette_index, 0);
        assert_eq!(r.position.color, Rgb::new(1.0, 0.0, 0.0));
        assert!(r.is_out_of_bounds());
    }

    #[test]
    fn test_angle_channel() {
        let w = waypoint(5.0, 0.4);
        let pose = NeedlePose::new(Vector3::zeros(), rotation_about_x(0.1));
        let r = score(0, &w, &pose);
        assert_relative_eq!(r.angle, 0.1, epsilon = 1e-12);
        assert_relative_eq!(r.angular_ratio(), 0.25, epsilon = 1e-12);
        assert_eq!(r.angle_quality(), 75);
        assert_eq!(r.orientation.palette_index, 21);
    }

    #[test]
    fn test_exact_boundary_is_red_index_but_not_out_of_bounds() {
        let fb = ChannelFeedback::from_ratio(1.0);
        assert_eq!(fb.quality, 0);
        assert_eq!(fb.palette_index, 0);
        assert!(!fb.is_out_of_bounds());
    }

    #[test]
    fn test_zero_tolerance() {
        assert_eq!(deviation_ratio(0.0, 0.0), 0.0);
        assert_eq!(deviation_ratio(0.1, 0.0), f64::INFINITY);

        let fb = ChannelFeedback::from_deviation(0.1, 0.0);
        assert_eq!(fb.quality, 0);
        assert_eq!(fb.color, palette::WORST);

        let fb = ChannelFeedback::from_deviation(0.0, 0.0);
        assert_eq!(fb.quality, 100);
        assert_eq!(fb.color, palette::BEST);
    }

    #[test]
    fn test_nan_ratio_is_out_of_bounds() {
        let fb = ChannelFeedback::from_ratio(f64::NAN);
        assert!(fb.is_out_of_bounds());
        assert_eq!(fb.palette_index, 0);
    }

    #[test]
    fn test_nan_deviation_is_red() {
        assert!(deviation_ratio(f64::NAN, 5.0).is_nan());
        let fb = ChannelFeedback::from_deviation(f64::NAN, 5.0);
        assert_eq!(fb.quality, 0);
        assert_eq!(fb.palette_index, 0);
        assert_eq!(fb.color, palette::WORST);
        assert!(fb.is_out_of_bounds());
    }

    #[test]
    fn test_evaluate_uses_nearest_waypoint() {
        let plan = line_plan();
        let mut scorer = DeviationScorer::new();

        let pose = NeedlePose::new(Vector3::new(9.0, 0.0, 0.0), Matrix3::identity());
        let r = scorer.evaluate(&plan, &pose).unwrap();
        assert_eq!(r.nearest_waypoint_index, 1);
        assert_relative_eq!(r.distance, 1.0);
        assert_eq!(r.position_quality(), 80);

        let far = NeedlePose::new(Vector3::new(10.0, 9.0, 0.0), Matrix3::identity());
        scorer.evaluate(&plan, &far).unwrap();

        let stats = scorer.stats();
        assert_eq!(stats.evaluations, 2);
        assert_eq!(stats.out_of_bounds, 1);
        assert_relative_eq!(stats.out_of_bounds_rate(), 0.5);

        scorer.reset_stats();
        assert_eq!(scorer.stats(), ScorerStats::default());
    }
}
