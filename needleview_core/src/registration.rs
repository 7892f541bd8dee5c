//! Tracker-to-plan registration.
//!
//! Convention: `world = registration * tracker`. The registration is applied
//! on the left of every raw tracker pose before it is evaluated.

use crate::error::{CoreError, Result};
use crate::geometry::{compose_rigid_transform, decompose_rigid_transform};
use nalgebra::{Matrix3, Matrix4, Vector3};
use serde::{Deserialize, Serialize};

/// Translation the recorded-data tooling resets the registration to.
pub const DEFAULT_RESET_OFFSET: [f64; 3] = [330.0, -20.0, 250.0];

/// Fixed rigid transform from tracker frame to plan frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NeedleRegistration {
    pub rotation: Matrix3<f64>,
    pub translation: Vector3<f64>,
}

impl Default for NeedleRegistration {
    fn default() -> Self {
        Self::identity()
    }
}

impl NeedleRegistration {
    pub fn identity() -> Self {
        Self {
            rotation: Matrix3::identity(),
            translation: Vector3::zeros(),
        }
    }

    /// Pure translation, rotation left as identity.
    pub fn from_translation(translation: Vector3<f64>) -> Self {
        Self {
            rotation: Matrix3::identity(),
            translation,
        }
    }

    /// The registration used after a tracker reset.
    pub fn reset_offset() -> Self {
        Self::from_translation(Vector3::from(DEFAULT_RESET_OFFSET))
    }

    /// Builds a registration from a homogeneous 4×4 matrix.
    ///
    /// The bottom row must be `[0, 0, 0, 1]` and the rotation block
    /// orthonormal with determinant +1.
    pub fn from_matrix(m: &Matrix4<f64>) -> Result<Self> {
        const EPS: f64 = 1e-6;

        let bottom = m.row(3).into_owned();
        if (bottom - nalgebra::RowVector4::new(0.0, 0.0, 0.0, 1.0)).amax() > EPS {
            return Err(CoreError::Config(
                "registration matrix bottom row must be [0 0 0 1]".to_string(),
            ));
        }
        let (translation, rotation) = decompose_rigid_transform(m);
        let orthogonality = (rotation * rotation.transpose() - Matrix3::identity()).amax();
        if orthogonality > EPS || (rotation.determinant() - 1.0).abs() > EPS {
            return Err(CoreError::Config(
                "registration rotation block is not a proper rotation".to_string(),
            ));
        }
        Ok(Self {
            rotation,
            translation,
        })
    }

    pub fn to_matrix(&self) -> Matrix4<f64> {
        compose_rigid_transform(&self.translation, &self.rotation)
    }

    /// Maps a tracker position and rotation into the plan frame.
    pub fn apply(
        &self,
        position: &Vector3<f64>,
        rotation: &Matrix3<f64>,
    ) -> (Vector3<f64>, Matrix3<f64>) {
        (
            self.rotation * position + self.translation,
            self.rotation * rotation,
        )
    }
}
