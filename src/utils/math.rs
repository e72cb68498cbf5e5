//! Additional math helpers layered on top of `glam`.

use glam::{Mat3, Quat, Vec3};

/// Converts angular velocity vector (radians/sec) into a quaternion delta.
pub fn angular_velocity_to_quat(angular: Vec3, dt: f32) -> Quat {
    let angle = angular.length() * dt;
    if angle.abs() < 1e-6 {
        return Quat::IDENTITY;
    }
    let axis = angular.normalize();
    Quat::from_axis_angle(axis, angle)
}

/// Any unit vector perpendicular to `v`.
pub fn perpendicular(v: Vec3) -> Vec3 {
    let n = v.normalize_or_zero();
    let axis = if n.x.abs() < 0.57 { Vec3::X } else { Vec3::Y };
    n.cross(axis).normalize_or_zero()
}

/// `(a x b) x c`, the search-direction building block of GJK.
pub fn triple_product(a: Vec3, b: Vec3, c: Vec3) -> Vec3 {
    a.cross(b).cross(c)
}

/// Barycentric coordinates of `point` with respect to triangle `abc`.
///
/// Degenerate triangles fall back to weighting the first vertex.
pub fn barycentric(point: Vec3, a: Vec3, b: Vec3, c: Vec3) -> Vec3 {
    let v0 = b - a;
    let v1 = c - a;
    let v2 = point - a;
    let d00 = v0.dot(v0);
    let d01 = v0.dot(v1);
    let d11 = v1.dot(v1);
    let d20 = v2.dot(v0);
    let d21 = v2.dot(v1);
    let denom = d00 * d11 - d01 * d01;
    if denom.abs() < 1e-12 {
        return Vec3::X;
    }
    let v = (d11 * d20 - d01 * d21) / denom;
    let w = (d00 * d21 - d01 * d20) / denom;
    Vec3::new(1.0 - v - w, v, w)
}

/// World-space inverse inertia `R * I^-1 * R^T`.
pub fn world_inverse_inertia(local_inverse: Mat3, rotation: Quat) -> Mat3 {
    let basis = Mat3::from_quat(rotation);
    basis * local_inverse * basis.transpose()
}

/// Orthonormal tangent pair spanning the plane perpendicular to `normal`.
pub fn tangent_basis(normal: Vec3) -> (Vec3, Vec3) {
    let u = perpendicular(normal);
    (u, normal.cross(u))
}
