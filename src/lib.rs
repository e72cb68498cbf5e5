//! Tiny Collide – real-time collision engine for Rust.
//!
//! Dynamic objects live in an incrementally updated AABB tree. Overlaps are
//! found with GJK, resolved with EPA, cached as persistent contacts and
//! answered with sequential impulses. A static triangle mesh provides the
//! level geometry, with swept tests keeping fast movers from tunnelling.

pub mod collision;
pub mod config;
pub mod core;
pub mod dynamics;
pub mod scene;
pub mod utils;

pub use glam::{Quat, Vec2, Vec3};

pub use collision::{
    contact::{ContactConstraint, ContactPool},
    queries::{RaycastHit, RaycastQuery},
    shapes::{Shape, ShapeKind},
};
pub use config::{ConfigError, PhysicsConfig};
pub use core::{
    mesh::{MeshCollider, MeshLoadError},
    physics_object::{BodyKind, CollisionLayers, FreezeFlags, PhysicsObject, PhysicsObjectBuilder},
    types::{Material, Transform, TransformHandle},
};
pub use scene::{CollisionScene, NearestContact};
pub use utils::allocator::{EntityId, Handle};

/// High-level convenience wrapper that owns a [`CollisionScene`].
pub struct Simulation {
    scene: CollisionScene,
}

impl Default for Simulation {
    fn default() -> Self {
        Self {
            scene: CollisionScene::default(),
        }
    }
}

impl Simulation {
    /// Creates a simulation with default tunables and the provided fixed timestep.
    pub fn new(time_step: f32) -> Result<Self, ConfigError> {
        Self::with_config(PhysicsConfig::default().with_time_step(time_step))
    }

    /// Creates a simulation from validated tunables.
    pub fn with_config(config: PhysicsConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            scene: CollisionScene::new(config),
        })
    }

    /// Reads tunables from a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Self::with_config(PhysicsConfig::from_json_str(json)?)
    }

    /// Adds an object; `false` when its entity id is reserved or taken.
    pub fn add_object(&mut self, object: PhysicsObject) -> bool {
        self.scene.add(object).is_some()
    }

    pub fn remove_object(&mut self, entity: EntityId) -> Option<PhysicsObject> {
        self.scene.remove(entity)
    }

    /// Advances the simulation by the provided wall-clock delta.
    pub fn step(&mut self, dt: f32) -> u32 {
        self.scene.step(dt)
    }

    pub fn object(&self, entity: EntityId) -> Option<&PhysicsObject> {
        self.scene.object(entity)
    }

    pub fn object_mut(&mut self, entity: EntityId) -> Option<&mut PhysicsObject> {
        self.scene.object_mut(entity)
    }

    pub fn scene(&self) -> &CollisionScene {
        &self.scene
    }

    pub fn scene_mut(&mut self) -> &mut CollisionScene {
        &mut self.scene
    }
}
