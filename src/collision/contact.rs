//! Persistent contact constraints and the pool that recycles them.

use std::collections::HashMap;

use glam::{Quat, Vec3};

use crate::{
    collision::epa::EpaResult,
    utils::{
        allocator::{EntityId, Handle, SlotArena},
        math::tangent_basis,
    },
};

pub const MAX_CONTACT_POINTS: usize = 4;

/// Points closer than this (on A) are treated as the same contact feature.
pub const CONTACT_MERGE_DISTANCE: f32 = 0.05;

/// Handle of a [`ContactConstraint`] inside a [`ContactPool`].
pub type ContactId = Handle;

/// Order-independent key of an unordered entity pair.
pub fn pair_id(a: EntityId, b: EntityId) -> u32 {
    let (low, high) = if a.0 <= b.0 { (a.0, b.0) } else { (b.0, a.0) };
    ((low as u32) << 16) | high as u32
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ContactPoint {
    pub world_a: Vec3,
    pub world_b: Vec3,
    /// Anchor on A relative to A's center, in A's local frame.
    pub local_a: Vec3,
    /// Anchor on B relative to B's center, in B's local frame.
    pub local_b: Vec3,
    pub penetration: f32,

    pub normal_impulse: f32,
    pub tangent_impulse: [f32; 2],
    pub normal_mass: f32,
    pub tangent_mass: [f32; 2],
    /// Target separating velocity from position error and restitution.
    pub bias: f32,
}

/// Pose of one side of a contact: shape center and orientation. The static
/// mesh side uses the identity pose so local anchors equal world points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContactFrame {
    pub center: Vec3,
    pub rotation: Quat,
}

impl ContactFrame {
    pub const WORLD: ContactFrame = ContactFrame {
        center: Vec3::ZERO,
        rotation: Quat::IDENTITY,
    };

    pub fn new(center: Vec3, rotation: Quat) -> Self {
        Self { center, rotation }
    }

    fn to_local(self, world: Vec3) -> Vec3 {
        self.rotation.conjugate() * (world - self.center)
    }

    fn to_world(self, local: Vec3) -> Vec3 {
        self.center + self.rotation * local
    }
}

/// Cached contact between two entities (or an entity and the static mesh).
///
/// The normal points from A toward B.
#[derive(Debug, Clone)]
pub struct ContactConstraint {
    pub pair_id: u32,
    pub entity_a: EntityId,
    pub entity_b: EntityId,
    pub object_a: Handle,
    /// `Handle::INVALID` for the static mesh.
    pub object_b: Handle,
    pub normal: Vec3,
    pub tangents: [Vec3; 2],
    pub friction: f32,
    pub bounce: f32,
    pub is_trigger: bool,
    points: [ContactPoint; MAX_CONTACT_POINTS],
    point_count: usize,

    pub(crate) touched: bool,
    pub(crate) next_a: Option<ContactId>,
    pub(crate) next_b: Option<ContactId>,
}

impl ContactConstraint {
    pub fn new(entity_a: EntityId, object_a: Handle, entity_b: EntityId, object_b: Handle) -> Self {
        Self {
            pair_id: pair_id(entity_a, entity_b),
            entity_a,
            entity_b,
            object_a,
            object_b,
            normal: Vec3::Y,
            tangents: [Vec3::X, Vec3::Z],
            friction: 0.0,
            bounce: 0.0,
            is_trigger: false,
            points: [ContactPoint::default(); MAX_CONTACT_POINTS],
            point_count: 0,
            touched: false,
            next_a: None,
            next_b: None,
        }
    }

    pub fn is_static_mesh(&self) -> bool {
        self.entity_b.is_none()
    }

    pub fn points(&self) -> &[ContactPoint] {
        &self.points[..self.point_count]
    }

    pub fn points_mut(&mut self) -> &mut [ContactPoint] {
        &mut self.points[..self.point_count]
    }

    pub fn point_count(&self) -> usize {
        self.point_count
    }

    pub fn is_empty(&self) -> bool {
        self.point_count == 0
    }

    /// Deepest penetration over the cached points.
    pub fn max_penetration(&self) -> f32 {
        self.points()
            .iter()
            .map(|p| p.penetration)
            .fold(0.0, f32::max)
    }

    /// The entity on the other side from `entity`.
    pub fn other(&self, entity: EntityId) -> EntityId {
        if self.entity_a == entity {
            self.entity_b
        } else {
            self.entity_a
        }
    }

    /// Normal pointing toward `entity`.
    pub fn normal_toward(&self, entity: EntityId) -> Vec3 {
        if self.entity_b == entity {
            self.normal
        } else {
            -self.normal
        }
    }

    /// Re-projects cached anchors with the current poses and drops points
    /// that separated or slid apart.
    pub fn refresh(&mut self, frame_a: ContactFrame, frame_b: ContactFrame) {
        let normal = self.normal;
        let mut kept = 0;
        for i in 0..self.point_count {
            let mut point = self.points[i];
            point.world_a = frame_a.to_world(point.local_a);
            point.world_b = frame_b.to_world(point.local_b);
            let gap = point.world_a - point.world_b;
            point.penetration = gap.dot(normal);
            let drift = gap - normal * point.penetration;
            if point.penetration < -CONTACT_MERGE_DISTANCE
                || drift.length_squared() > CONTACT_MERGE_DISTANCE * CONTACT_MERGE_DISTANCE
            {
                continue;
            }
            self.points[kept] = point;
            kept += 1;
        }
        self.point_count = kept;
    }

    /// Merges a freshly detected point into the manifold.
    ///
    /// A point near an existing one replaces its geometry and inherits its
    /// accumulated impulses. Otherwise it is appended, or, when the manifold
    /// is full, replaces the shallowest point.
    pub fn update_points(&mut self, result: &EpaResult, frame_a: ContactFrame, frame_b: ContactFrame) {
        // A strongly rotated normal means a different feature pair.
        if self.normal.dot(result.normal) < 0.95 {
            self.point_count = 0;
        }
        self.normal = result.normal;
        let (u, v) = tangent_basis(result.normal);
        self.tangents = [u, v];

        let fresh = ContactPoint {
            world_a: result.contact_a,
            world_b: result.contact_b,
            local_a: frame_a.to_local(result.contact_a),
            local_b: frame_b.to_local(result.contact_b),
            penetration: result.penetration,
            ..ContactPoint::default()
        };

        let merge_squared = CONTACT_MERGE_DISTANCE * CONTACT_MERGE_DISTANCE;
        if let Some(existing) = self.points[..self.point_count]
            .iter_mut()
            .find(|p| p.world_a.distance_squared(fresh.world_a) < merge_squared)
        {
            *existing = ContactPoint {
                normal_impulse: existing.normal_impulse,
                tangent_impulse: existing.tangent_impulse,
                ..fresh
            };
            return;
        }

        if self.point_count < MAX_CONTACT_POINTS {
            self.points[self.point_count] = fresh;
            self.point_count += 1;
            return;
        }

        let shallowest = (0..self.point_count)
            .min_by(|&i, &j| self.points[i].penetration.total_cmp(&self.points[j].penetration))
            .unwrap_or(0);
        if self.points[shallowest].penetration <= fresh.penetration {
            self.points[shallowest] = fresh;
        }
    }

    pub fn clear_points(&mut self) {
        self.point_count = 0;
    }
}

/// Free-list arena of contacts keyed by pair id.
#[derive(Default)]
pub struct ContactPool {
    contacts: SlotArena<ContactConstraint>,
    index: HashMap<u32, ContactId>,
}

impl ContactPool {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            contacts: SlotArena::with_capacity(capacity),
            index: HashMap::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.contacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contacts.is_empty()
    }

    pub fn find(&self, pair_id: u32) -> Option<ContactId> {
        self.index.get(&pair_id).copied()
    }

    pub fn get(&self, id: ContactId) -> Option<&ContactConstraint> {
        self.contacts.get(id)
    }

    pub fn get_mut(&mut self, id: ContactId) -> Option<&mut ContactConstraint> {
        self.contacts.get_mut(id)
    }

    /// Existing contact for the pair, or a new one from `create`. The flag is
    /// true when the contact was just created.
    pub fn get_or_insert_with(
        &mut self,
        pair_id: u32,
        create: impl FnOnce() -> ContactConstraint,
    ) -> (ContactId, bool) {
        if let Some(id) = self.find(pair_id) {
            return (id, false);
        }
        let contact = create();
        debug_assert_eq!(contact.pair_id, pair_id);
        let id = self.contacts.insert(contact);
        self.index.insert(pair_id, id);
        (id, true)
    }

    pub fn remove(&mut self, id: ContactId) -> Option<ContactConstraint> {
        let contact = self.contacts.remove(id)?;
        self.index.remove(&contact.pair_id);
        Some(contact)
    }

    pub fn remove_pair(&mut self, pair_id: u32) -> Option<ContactConstraint> {
        let id = self.index.remove(&pair_id)?;
        self.contacts.remove(id)
    }

    /// Returns every contact matching `stale` to the free list. Runs in
    /// place, without allocating.
    pub fn remove_where(&mut self, mut stale: impl FnMut(&ContactConstraint) -> bool) -> usize {
        let index = &mut self.index;
        self.contacts.retain(
            |contact| !stale(contact),
            |contact| {
                index.remove(&contact.pair_id);
            },
        )
    }

    /// Returns every contact involving `entity` to the pool.
    pub fn remove_entity(&mut self, entity: EntityId) -> usize {
        self.remove_where(|c| c.entity_a == entity || c.entity_b == entity)
    }

    pub fn iter(&self) -> impl Iterator<Item = (ContactId, &ContactConstraint)> + '_ {
        self.contacts.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (ContactId, &mut ContactConstraint)> + '_ {
        self.contacts.iter_mut()
    }

    pub fn clear(&mut self) {
        self.contacts.clear();
        self.index.clear();
    }

    pub(crate) fn begin_tick(&mut self) {
        for (_, contact) in self.contacts.iter_mut() {
            contact.touched = false;
            contact.next_a = None;
            contact.next_b = None;
        }
    }

    /// Returns contacts that were not refreshed this tick (or lost all their
    /// points) to the free list.
    pub(crate) fn retire_untouched(&mut self) -> usize {
        self.remove_where(|c| !c.touched || c.is_empty())
    }

    /// Walks an object's intrusive contact list starting at `head`.
    pub fn list(&self, head: Option<ContactId>, entity: EntityId) -> ContactListIter<'_> {
        ContactListIter {
            pool: self,
            next: head,
            entity,
        }
    }
}

pub struct ContactListIter<'a> {
    pool: &'a ContactPool,
    next: Option<ContactId>,
    entity: EntityId,
}

impl<'a> Iterator for ContactListIter<'a> {
    type Item = &'a ContactConstraint;

    fn next(&mut self) -> Option<Self::Item> {
        let contact = self.pool.get(self.next?)?;
        self.next = if contact.entity_a == self.entity {
            contact.next_a
        } else {
            contact.next_b
        };
        Some(contact)
    }
}
