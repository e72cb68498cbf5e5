use glam::Vec3;
use log::trace;

use crate::{
    config::PhysicsConfig,
    core::physics_object::PhysicsObject,
    utils::math::angular_velocity_to_quat,
};

/// Position-verlet integrator with per-tick damping and sleep tracking.
#[derive(Debug, Clone)]
pub struct Integrator {
    pub gravity: Vec3,
    pub velocity_damping: f32,
    pub angular_damping: f32,
    pub sleep_threshold: f32,
    pub sleep_ticks: u16,
}

impl Default for Integrator {
    fn default() -> Self {
        Self::from_config(&PhysicsConfig::default())
    }
}

impl Integrator {
    pub fn from_config(config: &PhysicsConfig) -> Self {
        Self {
            gravity: config.gravity,
            velocity_damping: config.velocity_damping,
            angular_damping: config.angular_damping,
            sleep_threshold: config.sleep_threshold,
            sleep_ticks: config.sleep_ticks,
        }
    }

    /// Advances one awake dynamic object by `dt`:
    /// `new = pos + damping * (pos - prev) + accel * dt^2`.
    ///
    /// Force accumulators are cleared whether or not the object moved.
    pub fn integrate(&self, object: &mut PhysicsObject, dt: f32) {
        if !object.is_simulated() {
            object.acceleration = Vec3::ZERO;
            object.angular_acceleration = Vec3::ZERO;
            return;
        }

        object.last_valid_position = object.position;

        let acceleration = object.acceleration + self.gravity * object.gravity_scale;
        let carried = (object.position - object.previous_position) * self.velocity_damping;
        let displacement = object.masked_linear(carried + acceleration * dt * dt);

        object.previous_position = object.position;
        object.position += displacement;
        object.velocity = displacement / dt;

        let angular = (object.angular_velocity + object.angular_acceleration * dt) * self.angular_damping;
        object.angular_velocity = object.masked_angular(angular);
        if object.angular_velocity != Vec3::ZERO {
            let delta = angular_velocity_to_quat(object.angular_velocity, dt);
            object.rotation = (delta * object.rotation).normalize();
        }

        object.acceleration = Vec3::ZERO;
        object.angular_acceleration = Vec3::ZERO;
    }

    /// Counts still ticks and puts the object to sleep once it has been
    /// still for long enough. Returns true on the tick it falls asleep.
    pub fn update_sleep(&self, object: &mut PhysicsObject, dt: f32) -> bool {
        if !object.is_simulated() {
            return false;
        }

        let motion = (object.velocity.length() + object.angular_velocity.length()) * dt;
        if motion >= self.sleep_threshold {
            object.sleep_counter = 0;
            return false;
        }

        object.sleep_counter = object.sleep_counter.saturating_add(1);
        if object.sleep_counter < self.sleep_ticks {
            return false;
        }

        object.put_to_sleep();
        trace!("entity {:?} fell asleep", object.entity);
        true
    }
}
