//! Needle pose and the composite needle model.

use crate::geometry::{compose_rigid_transform, is_degenerate_quaternion, quaternion_to_rotation_matrix};
use crate::registration::NeedleRegistration;
use nalgebra::{Matrix3, Matrix4, Vector3};
use needleview_env::PoseSample;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// A registered needle pose for one tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NeedlePose {
    /// Needle tip in plan coordinates
    pub position: Vector3<f64>,

    /// Needle orientation in plan coordinates
    pub rotation: Matrix3<f64>,

    /// Session-relative time the pose was read
    pub timestamp: Option<Duration>,
}

impl NeedlePose {
    pub fn new(position: Vector3<f64>, rotation: Matrix3<f64>) -> Self {
        Self {
            position,
            rotation,
            timestamp: None,
        }
    }

    /// Converts a raw tracker sample and registers it into the plan frame.
    ///
    /// A degenerate quaternion falls back to the identity rotation.
    pub fn from_sample(sample: &PoseSample, registration: &NeedleRegistration) -> Self {
        if is_degenerate_quaternion(sample.quaternion) {
            debug!("Degenerate needle quaternion {:?}, using identity", sample.quaternion);
        }
        let rotation = quaternion_to_rotation_matrix(sample.quaternion);
        let (position, rotation) = registration.apply(&Vector3::from(sample.position), &rotation);
        Self::new(position, rotation)
    }

    pub fn with_timestamp(mut self, timestamp: Duration) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Pointing direction of the needle: the local +Z axis.
    pub fn forward_axis(&self) -> Vector3<f64> {
        self.rotation.column(2).into_owned()
    }

    pub fn transform(&self) -> Matrix4<f64> {
        compose_rigid_transform(&self.position, &self.rotation)
    }
}

/// Dimensions of the composite needle drawn at the tracked pose.
///
/// The tip sits at the pose origin and the body extends along local -Z.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NeedleModel {
    pub tip_length: f64,
    /// Half-angle of the tip cone in degrees
    pub tip_angle_deg: f64,
    pub shaft_length: f64,
    /// Semi-axis of the handle ellipsoid along the needle
    pub handle_length: f64,
}

impl Default for NeedleModel {
    fn default() -> Self {
        Self {
            tip_length: 2.5,
            tip_angle_deg: 7.5,
            shaft_length: 35.0,
            handle_length: 20.0,
        }
    }
}

/// World-space anchor points of the composite needle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NeedleOutline {
    pub tip: Vector3<f64>,
    pub tip_base: Vector3<f64>,
    pub shaft_end: Vector3<f64>,
    pub handle_center: Vector3<f64>,
}

impl NeedleModel {
    /// Radius of the tip cone base, shared by the shaft.
    pub fn tip_radius(&self) -> f64 {
        self.tip_angle_deg.to_radians().tan() * self.tip_length
    }

    /// Semi-axes of the handle ellipsoid in the needle frame.
    pub fn handle_semi_axes(&self) -> Vector3<f64> {
        let r = self.handle_length / 10.0;
        Vector3::new(r, r, self.handle_length)
    }

    /// Places the model at `pose`.
    pub fn outline(&self, pose: &NeedlePose) -> NeedleOutline {
        let back = -pose.forward_axis();
        NeedleOutline {
            tip: pose.position,
            tip_base: pose.position + back * self.tip_length,
            shaft_end: pose.position + back * (self.tip_length + self.shaft_length),
            handle_center: pose.position + back * (self.shaft_length + self.handle_length),
        }
    }
}
