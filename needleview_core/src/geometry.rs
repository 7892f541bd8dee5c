//! Geometry utilities shared by the plan, scoring and insertion engines.
//!
//! All functions are pure. Quaternions use the tracker's `[qw, qx, qy, qz]`
//! ordering throughout.

use nalgebra::{Matrix3, Matrix4, Vector3, Vector4};

/// Squared norm below which a quaternion is treated as degenerate.
pub const DEGENERATE_QUATERNION_EPS: f64 = 1e-7;

/// Returns true if `q` is too close to zero to define a rotation.
pub fn is_degenerate_quaternion(q: [f64; 4]) -> bool {
    let n = Vector4::from(q).norm_squared();
    // NaN compares false, so it lands here too
    !(n >= DEGENERATE_QUATERNION_EPS)
}

/// Converts a `[qw, qx, qy, qz]` quaternion into a rotation matrix.
///
/// The quaternion does not need to be normalized. Degenerate input
/// (squared norm < 1e-7, or NaN) yields the identity exactly.
pub fn quaternion_to_rotation_matrix(q: [f64; 4]) -> Matrix3<f64> {
    if is_degenerate_quaternion(q) {
        return Matrix3::identity();
    }

    let q = Vector4::from(q);
    let q = q * (2.0 / q.norm_squared()).sqrt();
    let o = q * q.transpose();

    Matrix3::new(
        1.0 - o[(2, 2)] - o[(3, 3)],
        o[(1, 2)] - o[(3, 0)],
        o[(1, 3)] + o[(2, 0)],
        o[(1, 2)] + o[(3, 0)],
        1.0 - o[(1, 1)] - o[(3, 3)],
        o[(2, 3)] - o[(1, 0)],
        o[(1, 3)] - o[(2, 0)],
        o[(2, 3)] + o[(1, 0)],
        1.0 - o[(1, 1)] - o[(2, 2)],
    )
}

/// Builds a 4×4 homogeneous transform from a translation and rotation.
pub fn compose_rigid_transform(position: &Vector3<f64>, rotation: &Matrix3<f64>) -> Matrix4<f64> {
    let mut m = Matrix4::identity();
    m.fixed_view_mut::<3, 3>(0, 0).copy_from(rotation);
    m.fixed_view_mut::<3, 1>(0, 3).copy_from(position);
    m
}

/// Splits a homogeneous transform into translation and rotation blocks.
pub fn decompose_rigid_transform(m: &Matrix4<f64>) -> (Vector3<f64>, Matrix3<f64>) {
    let translation = m.fixed_view::<3, 1>(0, 3).into_owned();
    let rotation = m.fixed_view::<3, 3>(0, 0).into_owned();
    (translation, rotation)
}

/// Angle between two vectors in radians, in `[0, π]`.
///
/// The cosine is clamped to `[-1, 1]` before `acos`. A zero-length input
/// has no direction and yields 0.
pub fn angle_between(u: &Vector3<f64>, v: &Vector3<f64>) -> f64 {
    let denom = u.norm() * v.norm();
    if denom == 0.0 {
        return 0.0;
    }
    (u.dot(v) / denom).clamp(-1.0, 1.0).acos()
}

/// Rotation about the X axis.
pub fn rotation_about_x(angle: f64) -> Matrix3<f64> {
    let (s, c) = angle.sin_cos();
    Matrix3::new(1.0, 0.0, 0.0, 0.0, c, -s, 0.0, s, c)
}

/// Rotation about the Z axis.
pub fn rotation_about_z(angle: f64) -> Matrix3<f64> {
    let (s, c) = angle.sin_cos();
    Matrix3::new(c, -s, 0.0, s, c, 0.0, 0.0, 0.0, 1.0)
}

/// Rotates `v` by `beta` radians about the unit vector `axis` (Rodrigues).
pub fn rodrigues_rotation(axis: &Vector3<f64>, v: &Vector3<f64>, beta: f64) -> Vector3<f64> {
    let (s, c) = beta.sin_cos();
    v * c + axis.cross(v) * s + axis * (axis.dot(v) * (1.0 - c))
}

/// Orientation used by insertion poses and cones: tilt `theta_deg` about X,
/// then swing `phi_deg` about Z.
pub fn tilt_swing_rotation(theta_deg: f64, phi_deg: f64) -> Matrix3<f64> {
    rotation_about_z(phi_deg.to_radians()) * rotation_about_x(theta_deg.to_radians())
}

/// The local +Z axis after `tilt_swing_rotation`.
pub fn spherical_direction(theta_deg: f64, phi_deg: f64) -> Vector3<f64> {
    tilt_swing_rotation(theta_deg, phi_deg).column(2).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::{Quaternion, UnitQuaternion};
    use proptest::prelude::*;
    use std::f64::consts::{FRAC_PI_2, PI};

    #[test]
    fn test_identity_quaternion() {
        let r = quaternion_to_rotation_matrix([1.0, 0.0, 0.0, 0.0]);
        assert_relative_eq!(r, Matrix3::identity(), epsilon = 1e-12);
    }

    #[test]
    fn test_degenerate_quaternion_returns_exact_identity() {
        assert_eq!(quaternion_to_rotation_matrix([0.0; 4]), Matrix3::identity());
        assert_eq!(
            quaternion_to_rotation_matrix([1e-4, 1e-4, 0.0, 0.0]),
            Matrix3::identity()
        );
        assert_eq!(
            quaternion_to_rotation_matrix([f64::NAN, 0.0, 0.0, 0.0]),
            Matrix3::identity()
        );
        assert!(is_degenerate_quaternion([0.0; 4]));
        assert!(!is_degenerate_quaternion([1.0, 0.0, 0.0, 0.0]));
    }

    #[test]
    fn test_unnormalized_quaternion_is_normalized() {
        let a = quaternion_to_rotation_matrix([2.0, 0.0, 0.0, 2.0]);
        let b = quaternion_to_rotation_matrix([1.0, 0.0, 0.0, 1.0]);
        assert_relative_eq!(a, b, epsilon = 1e-12);
    }

    #[test]
    fn test_quarter_turn_about_z() {
        let h = FRAC_PI_2 / 2.0;
        let r = quaternion_to_rotation_matrix([h.cos(), 0.0, 0.0, h.sin()]);
        let x = r * Vector3::x();
        assert_relative_eq!(x, Vector3::y(), epsilon = 1e-12);
    }

    #[test]
    fn test_matches_nalgebra_conversion() {
        let q = [0.3, -0.5, 0.7, 0.1];
        let unit = UnitQuaternion::from_quaternion(Quaternion::new(q[0], q[1], q[2], q[3]));
        let ours = quaternion_to_rotation_matrix(q);
        assert_relative_eq!(ours, unit.to_rotation_matrix().into_inner(), epsilon = 1e-12);
    }

    #[test]
    fn test_compose_rigid_transform() {
        let r = rotation_about_z(FRAC_PI_2);
        let t = Vector3::new(1.0, 2.0, 3.0);
        let m = compose_rigid_transform(&t, &r);

        assert_eq!(m.row(3).into_owned(), nalgebra::RowVector4::new(0.0, 0.0, 0.0, 1.0));
        let p = m * nalgebra::Vector4::new(1.0, 0.0, 0.0, 1.0);
        assert_relative_eq!(p.xyz(), Vector3::new(1.0, 3.0, 3.0), epsilon = 1e-12);

        let (t2, r2) = decompose_rigid_transform(&m);
        assert_eq!(t2, t);
        assert_eq!(r2, r);
    }

    #[test]
    fn test_angle_between_edges() {
        let v = Vector3::new(1.0, 2.0, 3.0);
        assert_relative_eq!(angle_between(&v, &v), 0.0, epsilon = 1e-7);
        assert_relative_eq!(angle_between(&v, &-v), PI, epsilon = 1e-7);
        assert_relative_eq!(angle_between(&Vector3::x(), &Vector3::y()), FRAC_PI_2);
        assert_eq!(angle_between(&Vector3::zeros(), &v), 0.0);
    }

    #[test]
    fn test_rodrigues_matches_rotation_matrix() {
        let v = Vector3::new(1.0, 0.5, -0.25);
        let rotated = rodrigues_rotation(&Vector3::z(), &v, 0.7);
        assert_relative_eq!(rotated, rotation_about_z(0.7) * v, epsilon = 1e-12);
    }

    #[test]
    fn test_spherical_direction() {
        assert_relative_eq!(spherical_direction(0.0, 0.0), Vector3::z(), epsilon = 1e-12);
        // Tilt 90° about X sends +Z to -Y; swing 90° about Z sends -Y to +X.
        assert_relative_eq!(spherical_direction(90.0, 90.0), Vector3::x(), epsilon = 1e-12);
    }

    proptest! {
        #[test]
        fn prop_rotation_is_orthonormal(
            qw in -1.0f64..1.0, qx in -1.0f64..1.0, qy in -1.0f64..1.0, qz in -1.0f64..1.0,
        ) {
            prop_assume!(!is_degenerate_quaternion([qw, qx, qy, qz]));
            let r = quaternion_to_rotation_matrix([qw, qx, qy, qz]);
            let rrt = r * r.transpose();
            prop_assert!((rrt - Matrix3::identity()).norm() < 1e-9);
            prop_assert!((r.determinant() - 1.0).abs() < 1e-9);
        }

        #[test]
        fn prop_angle_between_is_symmetric_and_bounded(
            a in prop::array::uniform3(-10.0f64..10.0),
            b in prop::array::uniform3(-10.0f64..10.0),
        ) {
            let u = Vector3::from(a);
            let v = Vector3::from(b);
            let ab = angle_between(&u, &v);
            prop_assert!((0.0..=PI).contains(&ab));
            prop_assert!((ab - angle_between(&v, &u)).abs() < 1e-12);
        }
    }
}
