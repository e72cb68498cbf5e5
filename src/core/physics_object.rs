use glam::{BVec3, Mat3, Quat, Vec3};
use serde::{Deserialize, Serialize};

use crate::{
    collision::{
        bvh::NodeId,
        contact::ContactId,
        shapes::{PlacedShape, Shape},
    },
    config::DEFAULT_TIME_STEP,
    core::{
        aabb::Aabb,
        types::{Material, Transform, TransformHandle},
    },
    utils::{allocator::EntityId, math::world_inverse_inertia},
};

/// How an object takes part in the simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BodyKind {
    /// Integrated and pushed around by contacts.
    #[default]
    Dynamic,
    /// Moved only through its transform handle; pushes dynamic objects.
    Kinematic,
    /// Never moves on its own.
    Fixed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SleepState {
    #[default]
    Active,
    Sleeping,
}

/// Collision filtering. Two objects interact when they share at least one
/// layer bit and do not belong to the same non-zero group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollisionLayers {
    pub layers: u32,
    pub group: u32,
}

impl Default for CollisionLayers {
    fn default() -> Self {
        Self {
            layers: 1,
            group: 0,
        }
    }
}

impl CollisionLayers {
    pub fn new(layers: u32, group: u32) -> Self {
        Self { layers, group }
    }

    pub fn can_collide(&self, other: &CollisionLayers) -> bool {
        if self.layers & other.layers == 0 {
            return false;
        }
        self.group == 0 || self.group != other.group
    }

    pub fn matches_mask(&self, mask: u32) -> bool {
        self.layers & mask != 0
    }
}

/// Per-axis locks. Position axes are world-space, rotation axes are local.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FreezeFlags {
    pub position: BVec3,
    pub rotation: BVec3,
}

impl Default for FreezeFlags {
    fn default() -> Self {
        Self::NONE
    }
}

impl FreezeFlags {
    pub const NONE: FreezeFlags = FreezeFlags {
        position: BVec3::FALSE,
        rotation: BVec3::FALSE,
    };

    pub const ROTATION: FreezeFlags = FreezeFlags {
        position: BVec3::FALSE,
        rotation: BVec3::TRUE,
    };

    pub fn is_fully_frozen(&self) -> bool {
        self.position.all() && self.rotation.all()
    }

    /// One on free world position axes, zero on frozen ones.
    pub fn position_freedom(&self) -> Vec3 {
        Vec3::select(self.position, Vec3::ZERO, Vec3::ONE)
    }

    /// One on free local rotation axes, zero on frozen ones.
    pub fn rotation_freedom(&self) -> Vec3 {
        Vec3::select(self.rotation, Vec3::ZERO, Vec3::ONE)
    }
}

fn mask(value: Vec3, frozen: BVec3) -> Vec3 {
    Vec3::select(frozen, Vec3::ZERO, value)
}

/// Collision and motion state of one entity.
///
/// The entity's transform is owned by its collaborator and shared through a
/// [`TransformHandle`]; the scene pulls it at the start of a tick and pushes
/// the integrated pose back at the end.
#[derive(Debug, Clone)]
pub struct PhysicsObject {
    pub entity: EntityId,
    pub shape: Shape,
    /// Shape center relative to the entity origin, in the local frame.
    pub center_offset: Vec3,
    pub layers: CollisionLayers,
    pub kind: BodyKind,
    pub is_trigger: bool,
    pub freeze: FreezeFlags,
    pub material: Material,
    pub gravity_scale: f32,

    pub(crate) transform: TransformHandle,
    pub(crate) position: Vec3,
    pub(crate) rotation: Quat,
    pub(crate) previous_position: Vec3,
    pub(crate) last_valid_position: Vec3,
    pub(crate) velocity: Vec3,
    pub(crate) angular_velocity: Vec3,
    pub(crate) acceleration: Vec3,
    pub(crate) angular_acceleration: Vec3,

    mass: f32,
    inverse_mass: f32,
    local_inverse_inertia: Mat3,
    pub(crate) time_step: f32,

    pub(crate) sleep_counter: u16,
    pub(crate) sleep_state: SleepState,
    pub(crate) contact_head: Option<ContactId>,
    pub(crate) leaf: NodeId,
}

impl PhysicsObject {
    pub fn builder(entity: EntityId, shape: Shape) -> PhysicsObjectBuilder {
        PhysicsObjectBuilder::new(entity, shape)
    }

    /// Dynamic object with default layers and material.
    pub fn new(entity: EntityId, shape: Shape, transform: TransformHandle, mass: f32) -> Self {
        PhysicsObjectBuilder::new(entity, shape)
            .transform(transform)
            .mass(mass)
            .build()
    }

    pub fn transform_handle(&self) -> &TransformHandle {
        &self.transform
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn rotation(&self) -> Quat {
        self.rotation
    }

    /// World-space shape center.
    pub fn center(&self) -> Vec3 {
        self.position + self.rotation * self.center_offset
    }

    pub fn velocity(&self) -> Vec3 {
        self.velocity
    }

    pub fn angular_velocity(&self) -> Vec3 {
        self.angular_velocity
    }

    pub fn mass(&self) -> f32 {
        self.mass
    }

    pub fn inverse_mass(&self) -> f32 {
        if self.kind == BodyKind::Dynamic {
            self.inverse_mass
        } else {
            0.0
        }
    }

    /// World inverse inertia with frozen local rotation axes removed.
    pub fn world_inverse_inertia(&self) -> Mat3 {
        if self.kind != BodyKind::Dynamic {
            return Mat3::ZERO;
        }
        let free = Mat3::from_diagonal(self.freeze.rotation_freedom());
        world_inverse_inertia(free * self.local_inverse_inertia * free, self.rotation)
    }

    /// Per-axis inverse mass: zero along frozen world axes.
    pub fn linear_inverse_mass(&self) -> Vec3 {
        self.freeze.position_freedom() * self.inverse_mass()
    }

    /// True when no linear motion is possible along `axis`.
    pub fn is_frozen_along(&self, axis: Vec3) -> bool {
        self.masked_linear(axis).length_squared() <= 1e-12
    }

    pub fn sleep_state(&self) -> SleepState {
        self.sleep_state
    }

    pub fn is_sleeping(&self) -> bool {
        self.sleep_state == SleepState::Sleeping
    }

    pub fn is_dynamic(&self) -> bool {
        self.kind == BodyKind::Dynamic
    }

    /// Dynamic and awake: the integrator steps it this tick.
    pub fn is_simulated(&self) -> bool {
        self.kind == BodyKind::Dynamic && self.sleep_state == SleepState::Active
    }

    /// Whether impulses may change this object's motion.
    pub fn receives_impulses(&self) -> bool {
        self.kind == BodyKind::Dynamic && !self.is_trigger && !self.freeze.is_fully_frozen()
    }

    pub fn placed_shape(&self) -> PlacedShape {
        PlacedShape::new(self.shape, self.center(), self.rotation)
    }

    /// World bounds of the shape at the current pose.
    pub fn world_bounds(&self) -> Aabb {
        self.shape.bounding_box(self.rotation).translated(self.center())
    }

    pub fn wake(&mut self) {
        self.sleep_state = SleepState::Active;
        self.sleep_counter = 0;
    }

    pub(crate) fn put_to_sleep(&mut self) {
        self.sleep_state = SleepState::Sleeping;
        self.velocity = Vec3::ZERO;
        self.angular_velocity = Vec3::ZERO;
        self.previous_position = self.position;
    }

    /// Accumulates a force through the center for the next tick.
    pub fn apply_force(&mut self, force: Vec3) {
        if self.kind != BodyKind::Dynamic {
            return;
        }
        self.acceleration += force * self.inverse_mass;
        self.wake();
    }

    /// Accumulates a force applied at a world point for the next tick.
    pub fn apply_force_at(&mut self, force: Vec3, world_point: Vec3) {
        if self.kind != BodyKind::Dynamic {
            return;
        }
        self.acceleration += force * self.inverse_mass;
        let torque = (world_point - self.center()).cross(force);
        self.angular_acceleration += self.world_inverse_inertia() * torque;
        self.wake();
    }

    /// Instant change of momentum at a world point.
    pub fn apply_impulse(&mut self, impulse: Vec3, world_point: Vec3) {
        if self.kind == BodyKind::Dynamic {
            self.wake();
        }
        let arm = world_point - self.center();
        self.apply_impulse_at_arm(impulse, arm);
    }

    /// Impulse at `arm` from the shape center; used by the contact solver,
    /// which must not wake sleepers. Sleeping objects are left untouched.
    pub(crate) fn apply_impulse_at_arm(&mut self, impulse: Vec3, arm: Vec3) {
        if !self.receives_impulses() || self.is_sleeping() {
            return;
        }
        let linear = self.velocity + impulse * self.inverse_mass;
        let angular = self.angular_velocity + self.world_inverse_inertia() * arm.cross(impulse);
        self.set_motion(linear, angular);
    }

    /// Overrides linear velocity.
    pub fn set_velocity(&mut self, velocity: Vec3) {
        let angular = self.angular_velocity;
        self.set_motion(velocity, angular);
        if self.kind == BodyKind::Dynamic && velocity != Vec3::ZERO {
            self.wake();
        }
    }

    pub fn set_angular_velocity(&mut self, angular_velocity: Vec3) {
        let linear = self.velocity;
        self.set_motion(linear, angular_velocity);
    }

    /// Moves the object without implying motion.
    pub fn teleport(&mut self, position: Vec3) {
        self.position = position;
        self.previous_position = position - self.velocity * self.time_step;
        self.last_valid_position = position;
        self.transform.set_position(position);
        self.wake();
    }

    /// Applies freeze masks and keeps the verlet history consistent with the
    /// new linear velocity.
    pub(crate) fn set_motion(&mut self, linear: Vec3, angular: Vec3) {
        self.velocity = mask(linear, self.freeze.position);
        let local = self.rotation.conjugate() * angular;
        self.angular_velocity = self.rotation * mask(local, self.freeze.rotation);
        self.previous_position = self.position - self.velocity * self.time_step;
    }

    pub(crate) fn masked_linear(&self, value: Vec3) -> Vec3 {
        mask(value, self.freeze.position)
    }

    pub(crate) fn masked_angular(&self, value: Vec3) -> Vec3 {
        let local = self.rotation.conjugate() * value;
        self.rotation * mask(local, self.freeze.rotation)
    }

    /// Pulls a pose the collaborator may have changed since the last tick.
    pub(crate) fn pull_transform(&mut self, dt: f32) {
        let Transform { position, rotation } = self.transform.get();
        if position != self.position {
            match self.kind {
                BodyKind::Kinematic => {
                    self.velocity = (position - self.position) / dt;
                    self.previous_position = self.position;
                }
                BodyKind::Dynamic => {
                    let delta = position - self.position;
                    self.previous_position += delta;
                    self.wake();
                }
                BodyKind::Fixed => {
                    self.previous_position = position;
                }
            }
            self.position = position;
        } else if self.kind == BodyKind::Kinematic {
            self.velocity = Vec3::ZERO;
            self.previous_position = position;
        }
        self.rotation = rotation;
        self.time_step = dt;
    }

    pub(crate) fn push_transform(&self) {
        self.transform.set(Transform::new(self.position, self.rotation));
    }

    pub fn leaf(&self) -> NodeId {
        self.leaf
    }
}

/// Builder for [`PhysicsObject`].
#[derive(Debug, Clone)]
pub struct PhysicsObjectBuilder {
    entity: EntityId,
    shape: Shape,
    transform: Option<TransformHandle>,
    mass: f32,
    center_offset: Vec3,
    layers: CollisionLayers,
    kind: BodyKind,
    is_trigger: bool,
    freeze: FreezeFlags,
    material: Material,
    gravity_scale: f32,
    velocity: Vec3,
}

impl PhysicsObjectBuilder {
    pub fn new(entity: EntityId, shape: Shape) -> Self {
        Self {
            entity,
            shape,
            transform: None,
            mass: 1.0,
            center_offset: Vec3::ZERO,
            layers: CollisionLayers::default(),
            kind: BodyKind::Dynamic,
            is_trigger: false,
            freeze: FreezeFlags::NONE,
            material: Material::default(),
            gravity_scale: 1.0,
            velocity: Vec3::ZERO,
        }
    }

    pub fn transform(mut self, transform: TransformHandle) -> Self {
        self.transform = Some(transform);
        self
    }

    pub fn position(mut self, position: Vec3) -> Self {
        self.transform = Some(TransformHandle::new(Transform::from_position(position)));
        self
    }

    pub fn mass(mut self, mass: f32) -> Self {
        self.mass = mass;
        self
    }

    pub fn center_offset(mut self, offset: Vec3) -> Self {
        self.center_offset = offset;
        self
    }

    pub fn layers(mut self, layers: u32, group: u32) -> Self {
        self.layers = CollisionLayers::new(layers, group);
        self
    }

    pub fn kind(mut self, kind: BodyKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn fixed(self) -> Self {
        self.kind(BodyKind::Fixed)
    }

    pub fn kinematic(self) -> Self {
        self.kind(BodyKind::Kinematic)
    }

    pub fn trigger(mut self, is_trigger: bool) -> Self {
        self.is_trigger = is_trigger;
        self
    }

    pub fn freeze(mut self, freeze: FreezeFlags) -> Self {
        self.freeze = freeze;
        self
    }

    pub fn material(mut self, material: Material) -> Self {
        self.material = material;
        self
    }

    pub fn gravity_scale(mut self, scale: f32) -> Self {
        self.gravity_scale = scale;
        self
    }

    pub fn velocity(mut self, velocity: Vec3) -> Self {
        self.velocity = velocity;
        self
    }

    pub fn build(self) -> PhysicsObject {
        debug_assert!(
            self.kind != BodyKind::Dynamic || self.mass > 0.0,
            "dynamic objects need a positive mass"
        );

        let transform = self.transform.unwrap_or_default();
        let Transform { position, rotation } = transform.get();
        let mass = self.mass.max(f32::EPSILON);
        let local_inverse_inertia = {
            let inertia = self.shape.inertia(mass);
            if inertia.determinant().abs() > f32::EPSILON {
                inertia.inverse()
            } else {
                Mat3::ZERO
            }
        };

        let mut object = PhysicsObject {
            entity: self.entity,
            shape: self.shape,
            center_offset: self.center_offset,
            layers: self.layers,
            kind: self.kind,
            is_trigger: self.is_trigger,
            freeze: self.freeze,
            material: self.material,
            gravity_scale: self.gravity_scale,
            transform,
            position,
            rotation,
            previous_position: position,
            last_valid_position: position,
            velocity: Vec3::ZERO,
            angular_velocity: Vec3::ZERO,
            acceleration: Vec3::ZERO,
            angular_acceleration: Vec3::ZERO,
            mass,
            inverse_mass: 1.0 / mass,
            local_inverse_inertia,
            time_step: DEFAULT_TIME_STEP,
            sleep_counter: 0,
            sleep_state: SleepState::Active,
            contact_head: None,
            leaf: NodeId::NULL,
        };
        object.set_motion(self.velocity, Vec3::ZERO);
        object
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layers_and_groups_filter_pairs() {
        let a = CollisionLayers::new(0b01, 0);
        let b = CollisionLayers::new(0b11, 0);
        let c = CollisionLayers::new(0b10, 0);
        assert!(a.can_collide(&b));
        assert!(!a.can_collide(&c));

        let same_group = CollisionLayers::new(1, 7);
        assert!(!same_group.can_collide(&same_group));
        assert!(same_group.can_collide(&CollisionLayers::new(1, 8)));
    }

    #[test]
    fn impulse_changes_velocity_and_history() {
        let mut object = PhysicsObject::builder(EntityId(1), Shape::sphere(0.5))
            .mass(2.0)
            .build();
        object.time_step = 0.1;
        object.apply_impulse(Vec3::new(4.0, 0.0, 0.0), object.center());
        assert!((object.velocity().x - 2.0).abs() < 1e-6);
        assert!((object.previous_position.x + 0.2).abs() < 1e-6);
        assert_eq!(object.angular_velocity(), Vec3::ZERO);
    }

    #[test]
    fn frozen_axes_ignore_impulses() {
        let mut object = PhysicsObject::builder(EntityId(1), Shape::cuboid(Vec3::ONE))
            .freeze(FreezeFlags {
                position: BVec3::new(false, true, false),
                rotation: BVec3::TRUE,
            })
            .build();
        object.apply_impulse(Vec3::new(1.0, 1.0, 0.0), object.center() + Vec3::Z);
        assert!(object.velocity().y.abs() < 1e-6);
        assert!(object.velocity().x > 0.0);
        assert_eq!(object.angular_velocity(), Vec3::ZERO);
    }

    #[test]
    fn fixed_and_trigger_objects_ignore_impulses() {
        let mut wall = PhysicsObject::builder(EntityId(2), Shape::cuboid(Vec3::ONE)).fixed().build();
        wall.apply_impulse(Vec3::X, wall.center());
        assert_eq!(wall.velocity(), Vec3::ZERO);
        assert_eq!(wall.inverse_mass(), 0.0);

        let mut sensor = PhysicsObject::builder(EntityId(3), Shape::sphere(1.0)).trigger(true).build();
        sensor.apply_impulse(Vec3::X, sensor.center());
        assert_eq!(sensor.velocity(), Vec3::ZERO);
    }

    #[test]
    fn world_bounds_include_center_offset() {
        let object = PhysicsObject::builder(EntityId(4), Shape::sphere(0.5))
            .position(Vec3::new(1.0, 0.0, 0.0))
            .center_offset(Vec3::new(0.0, 2.0, 0.0))
            .build();
        let bounds = object.world_bounds();
        assert!(bounds.contains_point(Vec3::new(1.0, 2.4, 0.0)));
        assert!(!bounds.contains_point(Vec3::new(1.0, 0.0, 0.0)));
    }
}
