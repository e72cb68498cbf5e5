//! Coulomb friction for cached contacts and for velocity projection against
//! static geometry.

use glam::Vec3;

use crate::{
    collision::contact::ContactPoint,
    core::physics_object::PhysicsObject,
    dynamics::solver::{apply_pair_impulse, relative_velocity},
};

/// Solves the two tangent rows of one contact point, clamping the
/// accumulated impulse to the friction cone of the current normal impulse.
/// Only sides flagged in `pushable` receive impulses.
#[allow(clippy::too_many_arguments)]
pub fn solve_tangent_impulses(
    point: &mut ContactPoint,
    tangents: &[Vec3; 2],
    friction: f32,
    body_a: &mut PhysicsObject,
    body_b: &mut PhysicsObject,
    arm_a: Vec3,
    arm_b: Vec3,
    pushable: [bool; 2],
) {
    let limit = friction.max(0.0) * point.normal_impulse.max(0.0);
    if limit <= f32::EPSILON {
        point.tangent_impulse = [0.0; 2];
        return;
    }

    for (axis, tangent) in tangents.iter().enumerate() {
        let speed = relative_velocity(body_a, body_b, arm_a, arm_b).dot(*tangent);
        let lambda = -speed * point.tangent_mass[axis];

        let previous = point.tangent_impulse[axis];
        let accumulated = (previous + lambda).clamp(-limit, limit);
        let delta = accumulated - previous;
        if delta.abs() <= 1e-10 {
            continue;
        }
        point.tangent_impulse[axis] = accumulated;

        apply_pair_impulse(body_a, body_b, *tangent * delta, arm_a, arm_b, pushable);
    }
}

/// Velocity after hitting an immovable surface with outward `normal`:
/// the approaching normal component is reflected and scaled by `bounce`,
/// and the tangential component loses up to `friction` times the normal
/// speed change.
pub fn project_velocity(velocity: Vec3, normal: Vec3, bounce: f32, friction: f32) -> Vec3 {
    let approach = velocity.dot(normal);
    if approach >= 0.0 {
        return velocity;
    }

    let tangential = velocity - normal * approach;
    let normal_change = -approach * (1.0 + bounce);
    let speed = tangential.length();
    let slowed = if speed > f32::EPSILON {
        tangential * ((speed - friction.max(0.0) * normal_change).max(0.0) / speed)
    } else {
        Vec3::ZERO
    };

    slowed - normal * (approach * bounce)
}
