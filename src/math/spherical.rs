//! Spherical-coordinate geometry for the head model.
//!
//! The head frame has its origin at the center of the sphere. Angles follow the
//! physics convention: `theta` is measured from the +z axis, `phi` from +x in the
//! xy-plane.
//!
//! Positions and directions are `nalgebra::Vector3`. Three-component products
//! are summed left to right, so results are reproducible bit-for-bit across runs
//! and against stored fixtures.

use nalgebra::{Matrix3, Vector3};

/// Cartesian coordinates of the point `(radius, theta, phi)`.
pub fn spherical_to_cartesian(radius: f64, theta: f64, phi: f64) -> Vector3<f64> {
    Vector3::new(
        radius * theta.sin() * phi.cos(),
        radius * theta.sin() * phi.sin(),
        radius * theta.cos(),
    )
}

/// Unit vector with spherical angles `(theta, phi)`.
pub fn unit_vector(theta: f64, phi: f64) -> Vector3<f64> {
    Vector3::new(theta.sin() * phi.cos(), theta.sin() * phi.sin(), theta.cos())
}

/// Rotation taking a direction expressed in the local frame of a point at
/// `(theta, phi)` (local z-axis radial) into the head frame.
///
/// Columns are the local x, y and z axes written in head coordinates.
pub fn local_to_head_rotation(theta: f64, phi: f64) -> Matrix3<f64> {
    Matrix3::new(
        phi.sin(),
        theta.cos() * phi.cos(),
        theta.sin() * phi.cos(),
        -phi.cos(),
        theta.cos() * phi.sin(),
        theta.sin() * phi.sin(),
        0.0,
        -theta.sin(),
        theta.cos(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    #[test]
    fn north_pole_is_on_z_axis() {
        let p = spherical_to_cartesian(11.5, 0.0, 0.0);
        assert_eq!(p, Vector3::new(0.0, 0.0, 11.5));
    }

    #[test]
    fn rotation_maps_local_z_to_radial() {
        for &(theta, phi) in &[(0.3, 1.1), (PI / 2.0, 0.0), (1.2, 4.0)] {
            let radial = local_to_head_rotation(theta, phi) * Vector3::z();
            assert!((radial - unit_vector(theta, phi)).amax() < 1e-12);
        }
    }

    #[test]
    fn rotation_is_orthonormal() {
        let rot = local_to_head_rotation(0.7, 2.3);
        let gram = rot.transpose() * rot;
        assert!((gram - Matrix3::identity()).amax() < 1e-12);
        assert!((rot.determinant() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn products_sum_left_to_right() {
        let a: Vector3<f64> = Vector3::new(0.1, 0.2, 0.3);
        let b = Vector3::new(1.7, -2.9, 3.3);
        assert_eq!(a.dot(&b), a[0] * b[0] + a[1] * b[1] + a[2] * b[2]);
        assert_eq!(a.norm(), (a[0] * a[0] + a[1] * a[1] + a[2] * a[2]).sqrt());
    }
}
