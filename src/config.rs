//! Global configuration constants and the tunables a scene is built with.

use glam::Vec3;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default gravity vector applied in the collision scene (Y-up).
pub const DEFAULT_GRAVITY: [f32; 3] = [0.0, -9.8, 0.0];

/// Default integration timestep (in seconds).
pub const DEFAULT_TIME_STEP: f32 = 1.0 / 30.0;

/// Verlet damping applied to the implicit velocity every tick.
pub const DEFAULT_VELOCITY_DAMPING: f32 = 0.995;

/// Damping applied to angular velocity every tick.
pub const DEFAULT_ANGULAR_DAMPING: f32 = 0.98;

/// Number of sequential impulse iterations performed per tick.
pub const DEFAULT_SOLVER_ITERATIONS: u32 = 4;

/// Baumgarte stabilization factor (fraction of penetration fixed per tick).
pub const DEFAULT_BAUMGARTE_FACTOR: f32 = 0.2;

/// Penetration tolerated before the Baumgarte bias kicks in.
pub const DEFAULT_PENETRATION_SLOP: f32 = 0.005;

/// Upper bound of the Baumgarte bias velocity.
pub const DEFAULT_MAX_BIAS_VELOCITY: f32 = 4.0;

/// Fixed margin added around every leaf of the AABB tree.
pub const BVH_MARGIN: f32 = 0.1;

/// How far ahead (in ticks of displacement) a moving leaf is extended.
pub const BVH_DISPLACEMENT_MULTIPLIER: f32 = 4.0;

/// Depth of the explicit traversal stack used by tree queries.
pub const BVH_STACK_DEPTH: usize = 64;

/// GJK stops after this many support evaluations and treats the shapes as
/// touching.
pub const GJK_MAX_ITERATIONS: usize = 20;

/// Relative distance from a tetrahedron face within which GJK treats the
/// origin as enclosed.
pub const GJK_TOLERANCE: f32 = 1e-5;

/// EPA expansion cap; polytope storage is sized from it.
pub const EPA_MAX_ITERATIONS: usize = 64;

/// Convergence threshold of the EPA support distance.
pub const EPA_TOLERANCE: f32 = 1e-4;

/// Number of swept retries against the static mesh before snapping back.
pub const MAX_SWEPT_ITERATIONS: usize = 4;

/// Candidate buffer size for dynamic-object broad-phase queries.
pub const MAX_BROADPHASE_CANDIDATES: usize = 32;

/// Candidate buffer size for static-mesh triangle queries.
pub const MAX_TRIANGLE_CANDIDATES: usize = 32;

/// Candidate buffer size for raycast traversal of either tree.
pub const MAX_RAYCAST_CANDIDATES: usize = 64;

/// Per-tick motion (linear + angular) below which an object counts as still.
pub const DEFAULT_SLEEP_THRESHOLD: f32 = 0.001;

/// Consecutive still ticks before an object falls asleep.
pub const DEFAULT_SLEEP_TICKS: u16 = 32;

/// Initial capacity of the contact pool.
pub const DEFAULT_CONTACT_CAPACITY: usize = 64;

/// Initial capacity of the object arena and the dynamic tree.
pub const DEFAULT_OBJECT_CAPACITY: usize = 128;

/// Errors produced while loading a [`PhysicsConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse physics config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid physics config: {0}")]
    Invalid(&'static str),
}

/// Tunables a [`CollisionScene`](crate::scene::CollisionScene) is constructed with.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicsConfig {
    pub gravity: Vec3,
    pub time_step: f32,
    pub velocity_damping: f32,
    pub angular_damping: f32,
    pub solver_iterations: u32,
    pub baumgarte_factor: f32,
    pub penetration_slop: f32,
    pub max_bias_velocity: f32,
    pub sleep_threshold: f32,
    pub sleep_ticks: u16,
    pub contact_capacity: usize,
    /// Objects the scene stores before its arena and tree grow.
    pub object_capacity: usize,
    /// Tick count between full rebuilds of the dynamic tree, 0 disables them.
    pub rebuild_interval: u32,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            gravity: Vec3::from_array(DEFAULT_GRAVITY),
            time_step: DEFAULT_TIME_STEP,
            velocity_damping: DEFAULT_VELOCITY_DAMPING,
            angular_damping: DEFAULT_ANGULAR_DAMPING,
            solver_iterations: DEFAULT_SOLVER_ITERATIONS,
            baumgarte_factor: DEFAULT_BAUMGARTE_FACTOR,
            penetration_slop: DEFAULT_PENETRATION_SLOP,
            max_bias_velocity: DEFAULT_MAX_BIAS_VELOCITY,
            sleep_threshold: DEFAULT_SLEEP_THRESHOLD,
            sleep_ticks: DEFAULT_SLEEP_TICKS,
            contact_capacity: DEFAULT_CONTACT_CAPACITY,
            object_capacity: DEFAULT_OBJECT_CAPACITY,
            rebuild_interval: 0,
        }
    }
}

impl PhysicsConfig {
    /// Parses a config from JSON; missing fields fall back to the defaults.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.time_step > 0.0) {
            return Err(ConfigError::Invalid("time_step must be positive"));
        }
        if !(self.velocity_damping > 0.0 && self.velocity_damping <= 1.0) {
            return Err(ConfigError::Invalid("velocity_damping must be in (0, 1]"));
        }
        if !(self.angular_damping > 0.0 && self.angular_damping <= 1.0) {
            return Err(ConfigError::Invalid("angular_damping must be in (0, 1]"));
        }
        if self.solver_iterations == 0 {
            return Err(ConfigError::Invalid("solver_iterations must be at least 1"));
        }
        Ok(())
    }

    pub fn with_gravity(mut self, gravity: Vec3) -> Self {
        self.gravity = gravity;
        self
    }

    pub fn with_time_step(mut self, time_step: f32) -> Self {
        self.time_step = time_step;
        self
    }

    pub fn with_velocity_damping(mut self, damping: f32) -> Self {
        self.velocity_damping = damping;
        self
    }
}
