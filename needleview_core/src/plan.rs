//! Plan store - the ordered waypoint sequence a needle insertion follows.
//!
//! A plan file row packs 18 columns:
//!
//! ```text
//! [trajectoryPos(3), trajectoryQuat(4), planPos(3), planQuat(4),
//!  positionalDeviation(2), angularDeviation(2)]
//! ```
//!
//! Each deviation pair is `(observed, allowed)`; only the allowed value (the
//! second column of the pair) drives feedback. The trajectory columns and
//! observed deviations are kept verbatim so a plan re-serializes to the
//! exact layout it was read from.

use crate::error::{CoreError, Result};
use crate::geometry::{compose_rigid_transform, quaternion_to_rotation_matrix};
use crate::spatial::SpatialIndex;
use nalgebra::{Matrix3, Matrix4, Vector3};
use needleview_env::table::{self, Table};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

/// Column offsets of the plan file.
pub mod columns {
    pub const TRAJECTORY_POSITION: usize = 0;
    pub const TRAJECTORY_QUATERNION: usize = 3;
    pub const PLAN_POSITION: usize = 7;
    pub const PLAN_QUATERNION: usize = 10;
    pub const POSITIONAL_DEVIATION: usize = 14;
    pub const POSITION_TOLERANCE: usize = 15;
    pub const ANGULAR_DEVIATION: usize = 16;
    pub const ANGLE_TOLERANCE: usize = 17;
    pub const ROW_WIDTH: usize = 18;
}

/// Unit of the angular columns in a plan file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AngleUnit {
    /// Recorded deployment data stores radians
    #[default]
    Radians,
    Degrees,
}

impl AngleUnit {
    pub fn to_radians(self, value: f64) -> f64 {
        match self {
            AngleUnit::Radians => value,
            AngleUnit::Degrees => value.to_radians(),
        }
    }

    pub fn from_radians(self, value: f64) -> f64 {
        match self {
            AngleUnit::Radians => value,
            AngleUnit::Degrees => value.to_degrees(),
        }
    }
}

/// How a plan file is read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanSchema {
    /// Header lines skipped before the first row (default: 1)
    pub header_lines: usize,

    /// Unit of the angular deviation columns (default: radians)
    pub angle_unit: AngleUnit,
}

impl Default for PlanSchema {
    fn default() -> Self {
        Self {
            header_lines: 1,
            angle_unit: AngleUnit::Radians,
        }
    }
}

impl PlanSchema {
    pub fn with_header_lines(mut self, lines: usize) -> Self {
        self.header_lines = lines;
        self
    }

    pub fn with_angle_unit(mut self, unit: AngleUnit) -> Self {
        self.angle_unit = unit;
        self
    }
}

/// Columns carried through from the recording a plan was generated with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedSample {
    pub trajectory_position: [f64; 3],
    pub trajectory_quaternion: [f64; 4],
    /// Observed distance to the plan, as stored
    pub position_deviation: f64,
    /// Observed angle to the plan, in the schema's unit
    pub angle_deviation: f64,
}

/// One plan sample and its tolerance envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    /// Waypoint position in plan coordinates
    pub position: Vector3<f64>,

    /// Orientation quaternion [qw, qx, qy, qz] as stored
    pub quaternion: [f64; 4],

    /// Rotation derived from `quaternion`
    pub rotation: Matrix3<f64>,

    /// Allowed positional deviation radius
    pub position_tolerance: f64,

    /// Allowed angular deviation in radians
    pub angle_tolerance: f64,

    pub recorded: RecordedSample,
}

impl Waypoint {
    /// Intended needle direction: the local +Z axis.
    pub fn forward_axis(&self) -> Vector3<f64> {
        self.rotation.column(2).into_owned()
    }

    /// Homogeneous pose of the waypoint.
    pub fn transform(&self) -> Matrix4<f64> {
        compose_rigid_transform(&self.position, &self.rotation)
    }

    fn from_row(row: &[f64], row_idx: usize, schema: &PlanSchema) -> Result<Self> {
        use columns::*;

        if row.len() < ROW_WIDTH {
            return Err(CoreError::malformed_plan(
                row_idx,
                format!("expected {} columns, found {}", ROW_WIDTH, row.len()),
            ));
        }
        if let Some(col) = row[..ROW_WIDTH].iter().position(|v| !v.is_finite()) {
            return Err(CoreError::malformed_plan(
                row_idx,
                format!("non-finite value in column {}", col),
            ));
        }
        if row.len() > ROW_WIDTH {
            debug!("Plan row {} has {} extra columns, ignoring", row_idx, row.len() - ROW_WIDTH);
        }

        let position_tolerance = row[POSITION_TOLERANCE];
        if position_tolerance < 0.0 {
            return Err(CoreError::malformed_plan(
                row_idx,
                format!("negative position tolerance {}", position_tolerance),
            ));
        }
        let angle_tolerance = row[ANGLE_TOLERANCE];
        if angle_tolerance < 0.0 {
            return Err(CoreError::malformed_plan(
                row_idx,
                format!("negative angle tolerance {}", angle_tolerance),
            ));
        }

        let quaternion = quat_at(row, PLAN_QUATERNION);

        Ok(Self {
            position: Vector3::new(row[PLAN_POSITION], row[PLAN_POSITION + 1], row[PLAN_POSITION + 2]),
            quaternion,
            rotation: quaternion_to_rotation_matrix(quaternion),
            position_tolerance,
            angle_tolerance: schema.angle_unit.to_radians(angle_tolerance),
            recorded: RecordedSample {
                trajectory_position: [
                    row[TRAJECTORY_POSITION],
                    row[TRAJECTORY_POSITION + 1],
                    row[TRAJECTORY_POSITION + 2],
                ],
                trajectory_quaternion: quat_at(row, TRAJECTORY_QUATERNION),
                position_deviation: row[POSITIONAL_DEVIATION],
                angle_deviation: row[ANGULAR_DEVIATION],
            },
        })
    }

    fn to_row(&self, schema: &PlanSchema) -> Vec<f64> {
        let r = &self.recorded;
        let mut row = Vec::with_capacity(columns::ROW_WIDTH);
        row.extend_from_slice(&r.trajectory_position);
        row.extend_from_slice(&r.trajectory_quaternion);
        row.extend_from_slice(self.position.as_slice());
        row.extend_from_slice(&self.quaternion);
        row.push(r.position_deviation);
        row.push(self.position_tolerance);
        row.push(r.angle_deviation);
        row.push(schema.angle_unit.from_radians(self.angle_tolerance));
        row
    }
}

fn quat_at(row: &[f64], at: usize) -> [f64; 4] {
    [row[at], row[at + 1], row[at + 2], row[at + 3]]
}

/// Result of a nearest-waypoint query.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NearestWaypoint {
    pub index: usize,
    pub distance: f64,
}

/// An immutable plan: waypoints in file order plus their spatial index.
#[derive(Debug, Clone)]
pub struct Plan {
    waypoints: Vec<Waypoint>,
    index: SpatialIndex,
    schema: PlanSchema,
}

impl Plan {
    /// Builds a plan from parsed table rows.
    ///
    /// Fails with `MalformedPlanData` on an empty table, a short or
    /// non-finite row, or a negative tolerance.
    pub fn from_rows(rows: &[Vec<f64>], schema: &PlanSchema) -> Result<Self> {
        if rows.is_empty() {
            return Err(CoreError::malformed_plan(0, "plan has no rows"));
        }

        let waypoints = rows
            .iter()
            .enumerate()
            .map(|(i, row)| Waypoint::from_row(row, i, schema))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self::from_waypoints(waypoints, schema.clone()))
    }

    /// Reads and builds a plan from a file.
    pub fn load(path: impl AsRef<Path>, schema: &PlanSchema) -> Result<Self> {
        let path = path.as_ref();
        let rows = table::read_table(path, schema.header_lines)?;
        let plan = Self::from_rows(&rows, schema)?;
        info!(
            "Loaded plan from {} ({} waypoints, {:.1} units long)",
            path.display(),
            plan.len(),
            plan.path_length()
        );
        Ok(plan)
    }

    fn from_waypoints(waypoints: Vec<Waypoint>, schema: PlanSchema) -> Self {
        let positions: Vec<Vector3<f64>> = waypoints.iter().map(|w| w.position).collect();
        let index = build_spatial_index(&positions);
        Self {
            waypoints,
            index,
            schema,
        }
    }

    /// Number of waypoints (never zero).
    pub fn len(&self) -> usize {
        self.waypoints.len()
    }

    /// Always false: a plan cannot be built without waypoints.
    pub fn is_empty(&self) -> bool {
        self.waypoints.is_empty()
    }

    pub fn waypoints(&self) -> &[Waypoint] {
        &self.waypoints
    }

    pub fn waypoint(&self, index: usize) -> Option<&Waypoint> {
        self.waypoints.get(index)
    }

    pub fn schema(&self) -> &PlanSchema {
        &self.schema
    }

    /// The final waypoint, the insertion goal.
    pub fn goal(&self) -> &Waypoint {
        // from_rows rejects empty tables
        &self.waypoints[self.waypoints.len() - 1]
    }

    /// Closest waypoint to `query`; ties go to the lowest index.
    pub fn nearest(&self, query: &Vector3<f64>) -> NearestWaypoint {
        let (index, distance) = self.index.nearest(query).unwrap_or((0, f64::INFINITY));
        NearestWaypoint { index, distance }
    }

    /// Waypoints within `radius` of `query`, closest first.
    pub fn within_radius(&self, query: &Vector3<f64>, radius: f64) -> Vec<NearestWaypoint> {
        self.index
            .within_radius(query, radius)
            .into_iter()
            .map(|(index, distance)| NearestWaypoint { index, distance })
            .collect()
    }

    /// Polyline length through all waypoints.
    pub fn path_length(&self) -> f64 {
        self.arc_length_to(self.waypoints.len() - 1)
    }

    /// Polyline length from the first waypoint to `index` (clamped).
    pub fn arc_length_to(&self, index: usize) -> f64 {
        let end = index.min(self.waypoints.len() - 1);
        self.waypoints[..=end]
            .windows(2)
            .map(|w| (w[1].position - w[0].position).norm())
            .sum()
    }

    /// Re-serializes the waypoints to the 18-column file layout.
    pub fn to_rows(&self) -> Table {
        self.waypoints
            .iter()
            .map(|w| w.to_row(&self.schema))
            .collect()
    }
}

/// Builds the nearest-neighbour index over waypoint positions.
pub fn build_spatial_index(positions: &[Vector3<f64>]) -> SpatialIndex {
    SpatialIndex::build(positions)
}
