//! Common types for the NeedleView environment abstraction.

use crate::error::EnvError;
use serde::{Deserialize, Serialize};

/// Number of fields in a tracker pose row: `x y z qw qx qy qz`.
pub const POSE_FIELDS: usize = 7;

/// A raw tracker pose as read from a pose source.
///
/// This is a transport-layer value - the rotation has not been derived
/// and no registration has been applied yet.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PoseSample {
    /// Needle position [x, y, z] in tracker units
    pub position: [f64; 3],

    /// Orientation quaternion [qw, qx, qy, qz] (not necessarily normalized)
    pub quaternion: [f64; 4],
}

impl PoseSample {
    /// Creates a sample from position and quaternion.
    pub fn new(position: [f64; 3], quaternion: [f64; 4]) -> Self {
        Self {
            position,
            quaternion,
        }
    }

    /// Builds a sample from a 7-field row. Every field must be finite.
    pub fn from_fields(fields: &[f64]) -> Result<Self, EnvError> {
        if fields.len() != POSE_FIELDS {
            return Err(EnvError::UnexpectedPoseFormat {
                expected: POSE_FIELDS,
                found: fields.len(),
            });
        }
        if let Some(field) = fields.iter().position(|v| !v.is_finite()) {
            return Err(EnvError::NonFinitePose { field });
        }
        Ok(Self {
            position: [fields[0], fields[1], fields[2]],
            quaternion: [fields[3], fields[4], fields[5], fields[6]],
        })
    }

    /// Returns the sample as a 7-field row.
    pub fn to_fields(&self) -> [f64; POSE_FIELDS] {
        let [x, y, z] = self.position;
        let [qw, qx, qy, qz] = self.quaternion;
        [x, y, z, qw, qx, qy, qz]
    }
}

/// Result of polling a pose source once.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PoseRead {
    /// A fresh pose is available
    Pose(PoseSample),

    /// The source has nothing new this tick (empty or partially written)
    NoData,

    /// A finite source has no rows left
    Exhausted,
}
