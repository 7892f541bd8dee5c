//! Ground truth oracle for simulation.
//!
//! The oracle knows the "true" insertion path:
//! - Generates the plan the session scores against
//! - Moves a synthetic needle along that path
//! - Adds seeded Gaussian tracker noise and optional drift

use nalgebra::{UnitQuaternion, Vector3};
use needleview_core::plan::columns;
use needleview_core::{CoreError, Plan, PlanSchema};
use needleview_env::PoseSample;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, StandardNormal};
use serde::{Deserialize, Serialize};

/// Shape of the synthetic plan and the needle's behaviour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OracleConfig {
    /// Number of plan waypoints (default: 200)
    pub waypoints: usize,

    /// Arc length of the insertion path (default: 100)
    pub length: f64,

    /// Path curvature in the XZ plane, 0 = straight (default: 0.004)
    pub curvature: f64,

    /// Funnel radius at every waypoint (default: 3)
    pub position_tolerance: f64,

    /// Allowed angular deviation at every waypoint, degrees (default: 10)
    pub angle_tolerance_deg: f64,

    /// Tracker position noise standard deviation (default: 0.2)
    pub position_noise_std: f64,

    /// Tracker orientation noise standard deviation, degrees (default: 0.5)
    pub angle_noise_std_deg: f64,

    /// Position offset accumulated per generated sample
    pub drift_per_tick: Vector3<f64>,

    /// Heading offset accumulated per generated sample, degrees
    pub angle_drift_deg_per_tick: f64,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            waypoints: 200,
            length: 100.0,
            curvature: 0.004,
            position_tolerance: 3.0,
            angle_tolerance_deg: 10.0,
            position_noise_std: 0.2,
            angle_noise_std_deg: 0.5,
            drift_per_tick: Vector3::zeros(),
            angle_drift_deg_per_tick: 0.0,
        }
    }
}

impl OracleConfig {
    pub fn with_drift(mut self, drift_per_tick: Vector3<f64>) -> Self {
        self.drift_per_tick = drift_per_tick;
        self
    }

    pub fn with_angle_drift(mut self, deg_per_tick: f64) -> Self {
        self.angle_drift_deg_per_tick = deg_per_tick;
        self
    }

    pub fn with_noise(mut self, position_std: f64, angle_std_deg: f64) -> Self {
        self.position_noise_std = position_std;
        self.angle_noise_std_deg = angle_std_deg;
        self
    }

    pub fn straight(mut self) -> Self {
        self.curvature = 0.0;
        self
    }
}

/// Point and heading (rotation about Y, radians) at arc length `s`.
fn path_point(curvature: f64, s: f64) -> (Vector3<f64>, f64) {
    if curvature.abs() < 1e-9 {
        return (Vector3::new(0.0, 0.0, s), 0.0);
    }
    let heading = curvature * s;
    let point = Vector3::new(
        (1.0 - heading.cos()) / curvature,
        0.0,
        heading.sin() / curvature,
    );
    (point, heading)
}

fn to_quaternion(q: &UnitQuaternion<f64>) -> [f64; 4] {
    [q.w, q.i, q.j, q.k]
}

/// The Oracle - owns the true path and generates noisy tracker samples.
pub struct TrajectoryOracle {
    rng: ChaCha8Rng,
    config: OracleConfig,
    /// Samples generated so far (drives drift)
    generated: u64,
}

impl TrajectoryOracle {
    pub fn new(seed: u64, config: OracleConfig) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            config,
            generated: 0,
        }
    }

    /// True tip position and heading at `progress` in `[0, 1]`.
    pub fn true_pose(&self, progress: f64) -> (Vector3<f64>, f64) {
        path_point(self.config.curvature, progress.clamp(0.0, 1.0) * self.config.length)
    }

    /// Plan rows in the 18-column file layout (angles in radians).
    pub fn plan_rows(&self) -> Vec<Vec<f64>> {
        let n = self.config.waypoints.max(2);
        (0..n)
            .map(|i| {
                let (p, heading) = self.true_pose(i as f64 / (n - 1) as f64);
                let q = to_quaternion(&UnitQuaternion::from_euler_angles(0.0, heading, 0.0));

                let mut row = vec![0.0; columns::ROW_WIDTH];
                row[columns::TRAJECTORY_POSITION..columns::TRAJECTORY_POSITION + 3]
                    .copy_from_slice(p.as_slice());
                row[columns::TRAJECTORY_QUATERNION..columns::TRAJECTORY_QUATERNION + 4]
                    .copy_from_slice(&q);
                row[columns::PLAN_POSITION..columns::PLAN_POSITION + 3].copy_from_slice(p.as_slice());
                row[columns::PLAN_QUATERNION..columns::PLAN_QUATERNION + 4].copy_from_slice(&q);
                row[columns::POSITION_TOLERANCE] = self.config.position_tolerance;
                row[columns::ANGLE_TOLERANCE] = self.config.angle_tolerance_deg.to_radians();
                row
            })
            .collect()
    }

    /// Builds the plan the synthetic needle follows.
    pub fn plan(&self) -> Result<Plan, CoreError> {
        Plan::from_rows(&self.plan_rows(), &PlanSchema::default())
    }

    fn gaussian(&mut self, std: f64) -> f64 {
        let z: f64 = StandardNormal.sample(&mut self.rng);
        z * std
    }

    /// One noisy tracker sample at `progress` along the path.
    pub fn sample(&mut self, progress: f64) -> PoseSample {
        let (true_position, heading) = self.true_pose(progress);
        let ticks = self.generated as f64;
        self.generated += 1;

        let pos_std = self.config.position_noise_std;
        let noise = Vector3::new(self.gaussian(pos_std), self.gaussian(pos_std), self.gaussian(pos_std));
        let position = true_position + self.config.drift_per_tick * ticks + noise;

        let angle_std = self.config.angle_noise_std_deg.to_radians();
        let pitch = heading
            + (self.config.angle_drift_deg_per_tick * ticks).to_radians()
            + self.gaussian(angle_std);
        let roll = self.gaussian(angle_std);
        let q = UnitQuaternion::from_euler_angles(roll, pitch, 0.0);

        PoseSample::new([position.x, position.y, position.z], to_quaternion(&q))
    }

    /// `count` samples spread evenly from the start to the end of the path.
    pub fn samples(&mut self, count: usize) -> Vec<PoseSample> {
        let span = count.saturating_sub(1).max(1) as f64;
        (0..count).map(|i| self.sample(i as f64 / span)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use needleview_core::{DeviationScorer, NeedlePose, NeedleRegistration};
    use proptest::prelude::*;

    #[test]
    fn test_plan_shape() {
        let oracle = TrajectoryOracle::new(42, OracleConfig::default());
        let plan = oracle.plan().unwrap();
        assert_eq!(plan.len(), 200);
        assert_relative_eq!(plan.path_length(), 100.0, epsilon = 0.01);
        assert_relative_eq!(plan.waypoints()[0].position, Vector3::zeros());
        assert_relative_eq!(
            plan.waypoints()[0].angle_tolerance,
            10f64.to_radians(),
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_straight_path_points_along_z() {
        let oracle = TrajectoryOracle::new(1, OracleConfig::default().straight());
        let plan = oracle.plan().unwrap();
        assert_relative_eq!(plan.goal().position, Vector3::new(0.0, 0.0, 100.0), epsilon = 1e-9);
        assert_relative_eq!(plan.goal().forward_axis(), Vector3::z(), epsilon = 1e-12);
    }

    #[test]
    fn test_heading_matches_path_tangent() {
        let oracle = TrajectoryOracle::new(1, OracleConfig::default());
        let plan = oracle.plan().unwrap();
        let w = &plan.waypoints()[100];
        let next = &plan.waypoints()[101];
        let tangent = (next.position - w.position).normalize();
        assert!(tangent.dot(&w.forward_axis()) > 0.9999);
    }

    #[test]
    fn test_deterministic_noise() {
        let mut a = TrajectoryOracle::new(42, OracleConfig::default());
        let mut b = TrajectoryOracle::new(42, OracleConfig::default());
        let mut c = TrajectoryOracle::new(43, OracleConfig::default());
        let sa = a.samples(10);
        assert_eq!(sa, b.samples(10));
        assert_ne!(sa, c.samples(10));
    }

    #[test]
    fn test_noiseless_samples_score_perfectly() {
        let config = OracleConfig::default().with_noise(0.0, 0.0);
        let mut oracle = TrajectoryOracle::new(3, config.clone());
        let plan = oracle.plan().unwrap();
        let mut scorer = DeviationScorer::new();

        for sample in oracle.samples(config.waypoints) {
            let pose = NeedlePose::from_sample(&sample, &NeedleRegistration::identity());
            let r = scorer.evaluate(&plan, &pose).unwrap();
            assert!(r.distance < 1e-9);
            assert_eq!(r.position_quality(), 100);
            assert_eq!(r.angle_quality(), 100);
        }
    }

    #[test]
    fn test_drift_accumulates() {
        let config = OracleConfig::default()
            .with_noise(0.0, 0.0)
            .with_drift(Vector3::new(0.5, 0.0, 0.0));
        let mut oracle = TrajectoryOracle::new(3, config);
        let first = oracle.sample(0.0);
        let _ = oracle.sample(0.0);
        let third = oracle.sample(0.0);
        assert_eq!(first.position[0], 0.0);
        assert_relative_eq!(third.position[0], 1.0);
    }

    #[test]
    fn test_angle_drift_tilts_needle() {
        let config = OracleConfig::default().with_noise(0.0, 0.0).with_angle_drift(1.0);
        let mut oracle = TrajectoryOracle::new(3, config);
        let plan = oracle.plan().unwrap();
        let _ = oracle.sample(0.0);
        let _ = oracle.sample(0.0);
        let third = oracle.sample(0.0);

        let pose = NeedlePose::from_sample(&third, &NeedleRegistration::identity());
        let r = DeviationScorer::new().evaluate(&plan, &pose).unwrap();
        assert_eq!(r.nearest_waypoint_index, 0);
        assert_relative_eq!(r.angle, 2f64.to_radians(), epsilon = 1e-9);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn prop_noisy_needle_stays_in_funnel(seed in any::<u64>(), progress in 0.0f64..1.0) {
            let mut oracle = TrajectoryOracle::new(seed, OracleConfig::default());
            let plan = oracle.plan().unwrap();
            let sample = oracle.sample(progress);
            let pose = NeedlePose::from_sample(&sample, &NeedleRegistration::identity());
            let r = DeviationScorer::new().evaluate(&plan, &pose).unwrap();
            // 0.2 noise against a radius 3 funnel
            prop_assert!(r.positional_ratio() < 1.0);
        }
    }
}
