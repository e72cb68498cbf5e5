use std::sync::Arc;

use glam::{Mat3, Mat4, Quat, Vec3};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Position and orientation of an entity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Quat,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
        }
    }
}

impl Transform {
    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            rotation: Quat::IDENTITY,
        }
    }

    pub fn new(position: Vec3, rotation: Quat) -> Self {
        Self { position, rotation }
    }

    /// Builds a homogeneous matrix representation of the transform.
    pub fn to_matrix(&self) -> Mat4 {
        Mat4::from_rotation_translation(self.rotation, self.position)
    }

    pub fn basis(&self) -> Mat3 {
        Mat3::from_quat(self.rotation)
    }

    pub fn transform_point(&self, local: Vec3) -> Vec3 {
        self.position + self.rotation * local
    }

    pub fn inverse_transform_point(&self, world: Vec3) -> Vec3 {
        self.rotation.inverse() * (world - self.position)
    }
}

/// Shared, non-owning view of a transform owned by the collaborator that
/// places the entity (renderer, animation, gameplay).
///
/// The scene reads it at the start of a tick and writes the integrated pose
/// back at the end; collaborators may move the entity between ticks.
#[derive(Debug, Clone, Default)]
pub struct TransformHandle(Arc<RwLock<Transform>>);

impl TransformHandle {
    pub fn new(transform: Transform) -> Self {
        Self(Arc::new(RwLock::new(transform)))
    }

    pub fn get(&self) -> Transform {
        *self.0.read()
    }

    pub fn set(&self, transform: Transform) {
        *self.0.write() = transform;
    }

    pub fn position(&self) -> Vec3 {
        self.0.read().position
    }

    pub fn set_position(&self, position: Vec3) {
        self.0.write().position = position;
    }

    pub fn rotation(&self) -> Quat {
        self.0.read().rotation
    }

    /// True when both handles view the same transform.
    pub fn ptr_eq(&self, other: &TransformHandle) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl From<Transform> for TransformHandle {
    fn from(transform: Transform) -> Self {
        Self::new(transform)
    }
}

/// Surface response coefficients.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Material {
    pub friction: f32,
    /// Restitution in `[0, 1]`.
    pub bounce: f32,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            friction: 0.5,
            bounce: 0.0,
        }
    }
}

impl Material {
    pub fn new(friction: f32, bounce: f32) -> Self {
        Self { friction, bounce }
    }

    pub fn frictionless() -> Self {
        Self {
            friction: 0.0,
            bounce: 0.0,
        }
    }

    pub fn bouncy() -> Self {
        Self {
            friction: 0.2,
            bounce: 0.9,
        }
    }

    /// Combined coefficients for a touching pair: geometric mean friction,
    /// largest bounce.
    pub fn combine(&self, other: &Material) -> Material {
        Material {
            friction: (self.friction * other.friction).max(0.0).sqrt(),
            bounce: self.bounce.max(other.bounce),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handle_is_shared_between_clones() {
        let handle = TransformHandle::new(Transform::from_position(Vec3::X));
        let view = handle.clone();
        handle.set_position(Vec3::Y);
        assert_eq!(view.position(), Vec3::Y);
        assert!(view.ptr_eq(&handle));
    }

    #[test]
    fn transform_point_round_trips() {
        let transform = Transform::new(Vec3::new(1.0, 2.0, 3.0), Quat::from_rotation_y(0.7));
        let local = Vec3::new(0.5, -1.0, 2.0);
        let world = transform.transform_point(local);
        assert!((transform.inverse_transform_point(world) - local).length() < 1e-5);
    }

    #[test]
    fn combined_material_takes_largest_bounce() {
        let mixed = Material::new(0.4, 0.2).combine(&Material::new(0.9, 0.6));
        assert!((mixed.friction - 0.6).abs() < 1e-5);
        assert_eq!(mixed.bounce, 0.6);
    }
}
