//! Core data: bounds, poses, materials, mesh geometry and physics objects.

pub mod aabb;
pub mod mesh;
pub mod physics_object;
pub mod types;

pub use aabb::Aabb;
pub use mesh::{MeshCollider, MeshLoadError, Triangle};
pub use physics_object::{
    BodyKind, CollisionLayers, FreezeFlags, PhysicsObject, PhysicsObjectBuilder, SleepState,
};
pub use types::{Material, Transform, TransformHandle};
