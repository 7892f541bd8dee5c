//! Insertion target feedback - the entry region and the allowed-angle cone.
//!
//! Both targets are single-row tables:
//!
//! ```text
//! region.txt : x y z radius
//! angle.txt  : x y z height angle theta phi
//! ```
//!
//! Angles in `angle.txt` are degrees. The cone axis is the local +Z axis
//! after tilting by `theta` about X and swinging by `phi` about Z.

use crate::error::{CoreError, Result};
use crate::geometry::{angle_between, spherical_direction, tilt_swing_rotation};
use crate::needle::NeedlePose;
use crate::scoring::ChannelFeedback;
use nalgebra::{Matrix3, Vector3};
use needleview_env::table;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// Rendered shape of the insertion region. Scoring is the same for both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegionShape {
    #[default]
    Sphere,
    /// Flat cylinder lying in the region's XZ plane
    Disc,
}

/// Where the needle should enter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InsertionRegion {
    pub center: Vector3<f64>,
    pub radius: f64,
    pub shape: RegionShape,
}

impl InsertionRegion {
    pub const FIELDS: usize = 4;

    pub fn new(center: Vector3<f64>, radius: f64) -> Self {
        Self {
            center,
            radius,
            shape: RegionShape::Sphere,
        }
    }

    pub fn with_shape(mut self, shape: RegionShape) -> Self {
        self.shape = shape;
        self
    }

    pub fn from_row(row: &[f64]) -> Result<Self> {
        check_row("region", row, Self::FIELDS)?;
        if row[3] < 0.0 {
            return Err(malformed("region", format!("negative radius {}", row[3])));
        }
        Ok(Self::new(Vector3::new(row[0], row[1], row[2]), row[3]))
    }

    /// Loads the first data row of a region file.
    pub fn load(path: impl AsRef<Path>, header_lines: usize) -> Result<Self> {
        let path = path.as_ref();
        let region = Self::from_row(&first_row("region", path, header_lines)?)?;
        info!("Loaded insertion region r={} from {}", region.radius, path.display());
        Ok(region)
    }

    /// `|needle - center| / radius` mapped onto the palette.
    pub fn feedback(&self, pose: &NeedlePose) -> ChannelFeedback {
        ChannelFeedback::from_deviation((pose.position - self.center).norm(), self.radius)
    }
}

/// Cone of acceptable needle orientations at the entry point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InsertionCone {
    pub apex: Vector3<f64>,
    pub height: f64,
    /// Half-angle of the cone, degrees
    pub half_angle_deg: f64,
    /// Tilt about X, degrees
    pub theta_deg: f64,
    /// Swing about Z, degrees
    pub phi_deg: f64,
}

impl InsertionCone {
    pub const FIELDS: usize = 7;

    pub fn from_row(row: &[f64]) -> Result<Self> {
        check_row("cone", row, Self::FIELDS)?;
        if row[3] < 0.0 || row[4] < 0.0 {
            return Err(malformed(
                "cone",
                format!("negative height {} or angle {}", row[3], row[4]),
            ));
        }
        Ok(Self {
            apex: Vector3::new(row[0], row[1], row[2]),
            height: row[3],
            half_angle_deg: row[4],
            theta_deg: row[5],
            phi_deg: row[6],
        })
    }

    /// Loads the first data row of an angle file.
    pub fn load(path: impl AsRef<Path>, header_lines: usize) -> Result<Self> {
        let path = path.as_ref();
        let cone = Self::from_row(&first_row("cone", path, header_lines)?)?;
        info!(
            "Loaded insertion cone {}° (theta={}, phi={}) from {}",
            cone.half_angle_deg,
            cone.theta_deg,
            cone.phi_deg,
            path.display()
        );
        Ok(cone)
    }

    pub fn orientation(&self) -> Matrix3<f64> {
        tilt_swing_rotation(self.theta_deg, self.phi_deg)
    }

    pub fn axis(&self) -> Vector3<f64> {
        spherical_direction(self.theta_deg, self.phi_deg)
    }

    /// Base radius of the rendered cone.
    pub fn base_radius(&self) -> f64 {
        self.half_angle_deg.to_radians().tan() * self.height
    }

    /// Angle in degrees between the cone axis and the reversed needle axis.
    pub fn angle_to(&self, pose: &NeedlePose) -> f64 {
        angle_between(&self.axis(), &-pose.forward_axis()).to_degrees()
    }

    pub fn feedback(&self, pose: &NeedlePose) -> ChannelFeedback {
        ChannelFeedback::from_deviation(self.angle_to(pose), self.half_angle_deg)
    }
}

/// Feedback for whichever insertion targets are configured.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TargetFeedback {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<ChannelFeedback>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cone: Option<ChannelFeedback>,
}

/// The optional insertion targets of a session.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct InsertionTargets {
    pub region: Option<InsertionRegion>,
    pub cone: Option<InsertionCone>,
}

impl InsertionTargets {
    pub fn with_region(mut self, region: InsertionRegion) -> Self {
        self.region = Some(region);
        self
    }

    pub fn with_cone(mut self, cone: InsertionCone) -> Self {
        self.cone = Some(cone);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.region.is_none() && self.cone.is_none()
    }

    /// Scores every configured target; `None` when there are none.
    pub fn evaluate(&self, pose: &NeedlePose) -> Option<TargetFeedback> {
        if self.is_empty() {
            return None;
        }
        Some(TargetFeedback {
            region: self.region.map(|r| r.feedback(pose)),
            cone: self.cone.map(|c| c.feedback(pose)),
        })
    }
}

fn malformed(target: &'static str, reason: impl Into<String>) -> CoreError {
    CoreError::MalformedTargetData {
        target,
        reason: reason.into(),
    }
}

fn check_row(target: &'static str, row: &[f64], fields: usize) -> Result<()> {
    if row.len() < fields {
        return Err(malformed(
            target,
            format!("expected {} fields, found {}", fields, row.len()),
        ));
    }
    if row[..fields].iter().any(|v| !v.is_finite()) {
        return Err(malformed(target, "non-finite value"));
    }
    Ok(())
}

fn first_row(target: &'static str, path: &Path, header_lines: usize) -> Result<Vec<f64>> {
    table::read_table(path, header_lines)?
        .into_iter()
        .next()
        .ok_or_else(|| malformed(target, format!("{} has no data rows", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::rotation_about_x;
    use crate::palette;
    use approx::assert_relative_eq;

    fn pose_at(p: [f64; 3], rotation: Matrix3<f64>) -> NeedlePose {
        NeedlePose::new(Vector3::from(p), rotation)
    }

    #[test]
    fn test_region_feedback() {
        let region = InsertionRegion::new(Vector3::new(0.0, 0.0, 0.0), 4.0);
        let fb = region.feedback(&pose_at([2.0, 0.0, 0.0], Matrix3::identity()));
        assert_relative_eq!(fb.ratio, 0.5);
        assert_eq!(fb.quality, 50);
        assert_eq!(fb.palette_index, 14);

        let fb = region.feedback(&pose_at([0.0, 5.0, 0.0], Matrix3::identity()));
        assert_eq!(fb.color, palette::WORST);
    }

    #[test]
    fn test_cone_uses_reversed_needle_axis() {
        // Untilted cone opens along +Z; a needle pointing down -Z is on axis.
        let cone = InsertionCone::from_row(&[0.0, 0.0, 0.0, 10.0, 20.0, 0.0, 0.0]).unwrap();
        let down = rotation_about_x(std::f64::consts::PI);
        assert_relative_eq!(cone.angle_to(&pose_at([0.0; 3], down)), 0.0, epsilon = 1e-9);
        assert_eq!(cone.feedback(&pose_at([0.0; 3], down)).quality, 100);

        let up = cone.feedback(&pose_at([0.0; 3], Matrix3::identity()));
        assert!(up.is_out_of_bounds());
    }

    #[test]
    fn test_cone_half_angle_ratio() {
        let cone = InsertionCone::from_row(&[0.0, 0.0, 0.0, 10.0, 20.0, 0.0, 0.0]).unwrap();
        let tilted = rotation_about_x((180.0f64 - 5.0).to_radians());
        let fb = cone.feedback(&pose_at([0.0; 3], tilted));
        assert_relative_eq!(fb.ratio, 0.25, epsilon = 1e-9);
        assert_eq!(fb.quality, 75);
    }

    #[test]
    fn test_cone_geometry() {
        let cone = InsertionCone::from_row(&[1.0, 2.0, 3.0, 10.0, 45.0, 90.0, 90.0]).unwrap();
        assert_relative_eq!(cone.axis(), Vector3::x(), epsilon = 1e-12);
        assert_relative_eq!(cone.base_radius(), 10.0, epsilon = 1e-12);
        assert_eq!(cone.apex, Vector3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn test_rows_validated() {
        assert!(InsertionRegion::from_row(&[0.0, 0.0, 0.0]).is_err());
        assert!(InsertionRegion::from_row(&[0.0, 0.0, 0.0, -1.0]).is_err());
        assert!(InsertionCone::from_row(&[0.0; 6]).is_err());
        assert!(InsertionCone::from_row(&[0.0, 0.0, 0.0, 1.0, f64::NAN, 0.0, 0.0]).is_err());
    }

    #[test]
    fn test_load_from_files() {
        let dir = tempfile::tempdir().unwrap();
        let region_path = dir.path().join("region.txt");
        std::fs::write(&region_path, "x y z radius\n10 20 30 5\n").unwrap();
        let angle_path = dir.path().join("angle.txt");
        std::fs::write(&angle_path, "x y z height angle theta phi\n0 0 0 10 15 30 45\n").unwrap();

        let region = InsertionRegion::load(&region_path, 1).unwrap();
        assert_eq!(region.center, Vector3::new(10.0, 20.0, 30.0));
        assert_eq!(region.radius, 5.0);

        let cone = InsertionCone::load(&angle_path, 1).unwrap();
        assert_eq!(cone.half_angle_deg, 15.0);
        assert_eq!(cone.phi_deg, 45.0);

        let empty = dir.path().join("empty.txt");
        std::fs::write(&empty, "header only\n").unwrap();
        assert!(matches!(
            InsertionRegion::load(&empty, 1),
            Err(CoreError::MalformedTargetData { .. })
        ));
    }

    #[test]
    fn test_targets_evaluate() {
        assert!(InsertionTargets::default().evaluate(&pose_at([0.0; 3], Matrix3::identity())).is_none());

        let targets = InsertionTargets::default()
            .with_region(InsertionRegion::new(Vector3::zeros(), 10.0).with_shape(RegionShape::Disc));
        let fb = targets.evaluate(&pose_at([1.0, 0.0, 0.0], Matrix3::identity())).unwrap();
        assert_eq!(fb.region.unwrap().quality, 90);
        assert!(fb.cone.is_none());
    }
}
