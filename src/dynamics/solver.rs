//! Sequential-impulse contact solver with warm starting.

use glam::{Mat3, Vec3};

use crate::{
    collision::contact::{ContactConstraint, ContactPool},
    config::PhysicsConfig,
    core::physics_object::PhysicsObject,
    dynamics::friction::solve_tangent_impulses,
    utils::allocator::SlotArena,
};

/// Approach speed below which restitution is ignored, so resting contacts
/// do not jitter.
pub const RESTITUTION_THRESHOLD: f32 = 0.5;

/// Velocity of B's contact point relative to A's.
pub fn relative_velocity(a: &PhysicsObject, b: &PhysicsObject, arm_a: Vec3, arm_b: Vec3) -> Vec3 {
    let velocity_a = a.velocity() + a.angular_velocity().cross(arm_a);
    let velocity_b = b.velocity() + b.angular_velocity().cross(arm_b);
    velocity_b - velocity_a
}

/// Inverse mass and world inverse inertia as seen by the solver for one
/// contact.
#[derive(Debug, Clone, Copy)]
struct SolverMass {
    /// Per world axis; frozen position axes carry zero.
    linear: Vec3,
    angular: Mat3,
}

impl SolverMass {
    const IMMOVABLE: SolverMass = SolverMass {
        linear: Vec3::ZERO,
        angular: Mat3::ZERO,
    };

    /// Zero for anything that cannot be pushed along `normal` this tick.
    fn of(object: &PhysicsObject, normal: Vec3) -> Self {
        if !pushable_along(object, normal) {
            return Self::IMMOVABLE;
        }
        SolverMass {
            linear: object.linear_inverse_mass(),
            angular: object.world_inverse_inertia(),
        }
    }
}

fn pushable_along(object: &PhysicsObject, normal: Vec3) -> bool {
    object.receives_impulses() && !object.is_sleeping() && !object.is_frozen_along(normal)
}

/// Applies `impulse` to B and its reaction to A, skipping sides that
/// cannot be pushed along the contact normal.
pub(crate) fn apply_pair_impulse(
    a: &mut PhysicsObject,
    b: &mut PhysicsObject,
    impulse: Vec3,
    arm_a: Vec3,
    arm_b: Vec3,
    pushable: [bool; 2],
) {
    if pushable[0] {
        a.apply_impulse_at_arm(-impulse, arm_a);
    }
    if pushable[1] {
        b.apply_impulse_at_arm(impulse, arm_b);
    }
}

fn effective_mass(axis: Vec3, a: SolverMass, b: SolverMass, arm_a: Vec3, arm_b: Vec3) -> f32 {
    let linear = (a.linear + b.linear).dot(axis * axis);
    let angular_a = (a.angular * arm_a.cross(axis)).cross(arm_a);
    let angular_b = (b.angular * arm_b.cross(axis)).cross(arm_b);
    let k = linear + (angular_a + angular_b).dot(axis);
    if k > f32::EPSILON {
        1.0 / k
    } else {
        0.0
    }
}

#[derive(Debug, Clone)]
pub struct ContactSolver {
    pub iterations: u32,
    pub baumgarte_factor: f32,
    pub penetration_slop: f32,
    pub max_bias_velocity: f32,
}

impl Default for ContactSolver {
    fn default() -> Self {
        Self::from_config(&PhysicsConfig::default())
    }
}

impl ContactSolver {
    pub fn from_config(config: &PhysicsConfig) -> Self {
        Self {
            iterations: config.solver_iterations,
            baumgarte_factor: config.baumgarte_factor,
            penetration_slop: config.penetration_slop,
            max_bias_velocity: config.max_bias_velocity,
        }
    }

    /// Whether a contact between `a` and `b` produces impulses at all.
    pub fn should_solve(contact: &ContactConstraint, a: &PhysicsObject, b: &PhysicsObject) -> bool {
        if contact.is_trigger || contact.is_static_mesh() || contact.is_empty() || !contact.touched {
            return false;
        }
        if a.is_trigger || b.is_trigger {
            return false;
        }
        // A side frozen along the normal cannot answer the contact, and its
        // free rotation must not absorb the impulse instead.
        pushable_along(a, contact.normal) || pushable_along(b, contact.normal)
    }

    /// Computes effective masses and velocity targets, then applies last
    /// tick's accumulated impulses. Returns the number of contacts prepared.
    pub fn prestep(&self, contacts: &mut ContactPool, objects: &mut SlotArena<PhysicsObject>, dt: f32) -> usize {
        let inverse_dt = if dt > 0.0 { 1.0 / dt } else { 0.0 };
        let mut prepared = 0;

        for (_, contact) in contacts.iter_mut() {
            let Some((a, b)) = objects.get2_mut(contact.object_a, contact.object_b) else {
                continue;
            };
            if !Self::should_solve(contact, a, b) {
                continue;
            }
            prepared += 1;

            let (mass_a, mass_b) = (SolverMass::of(a, contact.normal), SolverMass::of(b, contact.normal));
            let (center_a, center_b) = (a.center(), b.center());
            let normal = contact.normal;
            let tangents = contact.tangents;
            let bounce = contact.bounce;
            let pushable = [pushable_along(a, normal), pushable_along(b, normal)];

            for point in contact.points_mut() {
                let arm_a = point.world_a - center_a;
                let arm_b = point.world_b - center_b;

                point.normal_mass = effective_mass(normal, mass_a, mass_b, arm_a, arm_b);
                for (axis, tangent) in tangents.iter().enumerate() {
                    point.tangent_mass[axis] = effective_mass(*tangent, mass_a, mass_b, arm_a, arm_b);
                }

                let approach = relative_velocity(a, b, arm_a, arm_b).dot(normal);
                let correction = (self.baumgarte_factor * inverse_dt
                    * (point.penetration - self.penetration_slop).max(0.0))
                .min(self.max_bias_velocity);
                let restitution = if approach < -RESTITUTION_THRESHOLD {
                    -bounce * approach
                } else {
                    0.0
                };
                point.bias = correction.max(restitution);

                // Stale impulses would pull a separating pair back together.
                if approach > 0.0 && point.penetration <= self.penetration_slop {
                    point.normal_impulse = 0.0;
                    point.tangent_impulse = [0.0; 2];
                    continue;
                }

                let cached = normal * point.normal_impulse
                    + tangents[0] * point.tangent_impulse[0]
                    + tangents[1] * point.tangent_impulse[1];
                if cached.length_squared() > f32::EPSILON * f32::EPSILON {
                    apply_pair_impulse(a, b, cached, arm_a, arm_b, pushable);
                }
            }
        }

        prepared
    }

    /// Runs the configured number of impulse iterations over all prepared
    /// contacts.
    pub fn solve(&self, contacts: &mut ContactPool, objects: &mut SlotArena<PhysicsObject>) {
        for _ in 0..self.iterations {
            for (_, contact) in contacts.iter_mut() {
                let Some((a, b)) = objects.get2_mut(contact.object_a, contact.object_b) else {
                    continue;
                };
                if !Self::should_solve(contact, a, b) {
                    continue;
                }
                Self::solve_contact(contact, a, b);
            }
        }
    }

    fn solve_contact(contact: &mut ContactConstraint, a: &mut PhysicsObject, b: &mut PhysicsObject) {
        let normal = contact.normal;
        let tangents = contact.tangents;
        let friction = contact.friction;
        let pushable = [pushable_along(a, normal), pushable_along(b, normal)];

        for point in contact.points_mut() {
            let arm_a = point.world_a - a.center();
            let arm_b = point.world_b - b.center();

            let approach = relative_velocity(a, b, arm_a, arm_b).dot(normal);
            let lambda = point.normal_mass * (point.bias - approach);
            let previous = point.normal_impulse;
            point.normal_impulse = (previous + lambda).max(0.0);
            let delta = point.normal_impulse - previous;
            if delta != 0.0 {
                apply_pair_impulse(a, b, normal * delta, arm_a, arm_b, pushable);
            }

            solve_tangent_impulses(point, &tangents, friction, a, b, arm_a, arm_b, pushable);
        }
    }
}
