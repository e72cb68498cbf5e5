use glam::Vec3;
use log::{debug, trace};

use super::CollisionScene;
use crate::{
    collision::{
        contact::{pair_id, ContactConstraint, ContactFrame, ContactListIter, ContactPool},
        epa::{axis_penetration, epa_solve, EpaResult},
        gjk::gjk_check_for_overlap,
    },
    core::physics_object::PhysicsObject,
    utils::allocator::{EntityId, Handle, SlotArena},
};

/// Closest cached contact point of an object, seen from that object.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NearestContact {
    /// [`EntityId::NONE`] for the static mesh.
    pub other: EntityId,
    /// Contact point on the queried object.
    pub point: Vec3,
    /// Points toward the queried object, i.e. the direction that pushes it out.
    pub normal: Vec3,
    pub penetration: f32,
}

/// The same penetration described from B's side.
pub(super) fn swap_sides(result: &EpaResult) -> EpaResult {
    EpaResult {
        normal: -result.normal,
        penetration: result.penetration,
        contact_a: result.contact_b,
        contact_b: result.contact_a,
    }
}

/// Rebuilds every object's intrusive contact list from the pool.
pub(super) fn link_contact_lists(contacts: &mut ContactPool, objects: &mut SlotArena<PhysicsObject>) {
    for (_, object) in objects.iter_mut() {
        object.contact_head = None;
    }
    for (id, contact) in contacts.iter_mut() {
        contact.next_a = None;
        contact.next_b = None;
        if let Some(a) = objects.get_mut(contact.object_a) {
            contact.next_a = a.contact_head;
            a.contact_head = Some(id);
        }
        if let Some(b) = objects.get_mut(contact.object_b) {
            contact.next_b = b.contact_head;
            b.contact_head = Some(id);
        }
    }
}

impl CollisionScene {
    pub(super) fn collide_pairs(&mut self) {
        let pairs = std::mem::take(&mut self.pairs);
        for &(handle_a, handle_b) in &pairs {
            self.collide_pair(handle_a, handle_b);
        }
        self.pairs = pairs;
    }

    fn collide_pair(&mut self, handle_a: Handle, handle_b: Handle) {
        let (Some(a), Some(b)) = (self.objects.get(handle_a), self.objects.get(handle_b)) else {
            return;
        };
        let (shape_a, shape_b) = (a.placed_shape(), b.placed_shape());
        let offset = shape_b.position - shape_a.position;
        if !gjk_check_for_overlap(&shape_a, &shape_b, offset, &mut self.simplex) {
            return;
        }
        let result = epa_solve(&self.simplex, &shape_a, &shape_b).unwrap_or_else(|| {
            debug!("EPA found no polytope for {:?} / {:?}, separating along the center offset", a.entity, b.entity);
            axis_penetration(&shape_a, &shape_b, offset)
        });

        let (entity_a, entity_b) = (a.entity, b.entity);
        let material = a.material.combine(&b.material);
        let is_trigger = a.is_trigger || b.is_trigger;
        let frame_a = ContactFrame::new(shape_a.position, shape_a.rotation);
        let frame_b = ContactFrame::new(shape_b.position, shape_b.rotation);

        let (id, created) = self.contacts.get_or_insert_with(pair_id(entity_a, entity_b), || {
            ContactConstraint::new(entity_a, handle_a, entity_b, handle_b)
        });
        let Some(contact) = self.contacts.get_mut(id) else {
            return;
        };
        contact.friction = material.friction;
        contact.bounce = material.bounce;
        contact.is_trigger = is_trigger;

        // The cached pair may have been created from the other side.
        let (result, frame_a, frame_b) = if contact.entity_a == entity_a {
            (result, frame_a, frame_b)
        } else {
            (swap_sides(&result), frame_b, frame_a)
        };
        if !contact.touched {
            contact.refresh(frame_a, frame_b);
            contact.touched = true;
        }
        contact.update_points(&result, frame_a, frame_b);

        if created {
            trace!("new contact {entity_a:?} / {entity_b:?}, depth {}", result.penetration);
            for handle in [handle_a, handle_b] {
                if let Some(object) = self.objects.get_mut(handle) {
                    if object.is_sleeping() {
                        object.wake();
                    }
                }
            }
        }
    }

    /// Keeps resting contacts between objects nobody queried this tick,
    /// returns the rest of the stale ones to the pool and relinks the
    /// per-object lists.
    pub(super) fn finish_contacts(&mut self) {
        let objects = &self.objects;
        let resting = |handle: Handle| objects.get(handle).is_none_or(|o| !Self::queries_pairs(o));
        for (_, contact) in self.contacts.iter_mut() {
            if !contact.touched && resting(contact.object_a) && resting(contact.object_b) {
                contact.touched = true;
            }
        }

        let retired = self.contacts.retire_untouched();
        if retired > 0 {
            trace!("retired {retired} contacts");
        }
        link_contact_lists(&mut self.contacts, &mut self.objects);
    }

    /// Contacts of `entity`, walked through its intrusive list.
    pub fn contacts_of(&self, entity: EntityId) -> ContactListIter<'_> {
        let head = self.object(entity).and_then(|object| object.contact_head);
        self.contacts.list(head, entity)
    }

    /// Whether the two entities currently share a contact with at least one
    /// point. Pass [`EntityId::NONE`] to test against the static mesh.
    pub fn is_touching(&self, a: EntityId, b: EntityId) -> bool {
        self.contacts
            .find(pair_id(a, b))
            .and_then(|id| self.contacts.get(id))
            .is_some_and(|contact| !contact.is_empty())
    }

    /// The cached contact point closest to the object's shape center.
    pub fn nearest_contact(&self, entity: EntityId) -> Option<NearestContact> {
        let center = self.object(entity)?.center();
        let mut best: Option<(f32, NearestContact)> = None;

        for contact in self.contacts_of(entity) {
            let on_a = contact.entity_a == entity;
            for point in contact.points() {
                let position = if on_a { point.world_a } else { point.world_b };
                let distance = position.distance_squared(center);
                if best.is_some_and(|(closest, _)| closest <= distance) {
                    continue;
                }
                best = Some((
                    distance,
                    NearestContact {
                        other: contact.other(entity),
                        point: position,
                        normal: contact.normal_toward(entity),
                        penetration: point.penetration,
                    },
                ));
            }
        }

        best.map(|(_, nearest)| nearest)
    }
}
