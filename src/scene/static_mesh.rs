use std::path::Path;

use glam::Vec3;
use log::{debug, warn};

use super::{contacts::swap_sides, CollisionScene};
use crate::{
    collision::{
        ccd::{is_fast_mover, time_of_impact},
        contact::{pair_id, ContactConstraint, ContactFrame, ContactPool},
        epa::{axis_penetration, epa_solve, EpaResult},
        gjk::{gjk_check_for_overlap, Simplex},
        shapes::PlacedShape,
    },
    config::{MAX_SWEPT_ITERATIONS, MAX_TRIANGLE_CANDIDATES},
    core::{
        mesh::{MeshCollider, MeshLoadError},
        physics_object::PhysicsObject,
    },
    dynamics::friction::project_velocity,
    utils::allocator::{EntityId, Handle},
};

/// Gap left between a swept object and the surface it stopped at.
const SWEEP_SKIN: f32 = 1e-3;

/// Remaining sweeps shorter than this are dropped.
const MIN_SWEEP: f32 = 1e-4;

impl CollisionScene {
    /// Installs the level geometry, returning the previous mesh.
    pub fn set_static_mesh(&mut self, mesh: MeshCollider) -> Option<MeshCollider> {
        debug!(
            "static mesh set: {} triangles, {} tree leaves",
            mesh.triangle_count(),
            mesh.tree().leaf_count()
        );
        let previous = self.clear_static_mesh();
        self.static_mesh = Some(mesh);
        previous
    }

    /// Removes the level geometry together with every contact against it.
    pub fn clear_static_mesh(&mut self) -> Option<MeshCollider> {
        let previous = self.static_mesh.take()?;
        self.contacts.remove_where(ContactConstraint::is_static_mesh);
        super::contacts::link_contact_lists(&mut self.contacts, &mut self.objects);
        Some(previous)
    }

    /// Reads a mesh file and installs it.
    pub fn load_static_mesh(&mut self, path: impl AsRef<Path>) -> Result<(), MeshLoadError> {
        let mesh = MeshCollider::load(path)?;
        self.set_static_mesh(mesh);
        Ok(())
    }

    pub fn static_mesh(&self) -> Option<&MeshCollider> {
        self.static_mesh.as_ref()
    }

    /// Keeps awake dynamic objects out of the static mesh. Objects that
    /// moved further than their thinnest extent are swept first.
    pub(super) fn collide_static_mesh(&mut self) {
        let Self {
            static_mesh,
            objects,
            contacts,
            simplex,
            profile,
            ..
        } = self;
        let Some(mesh) = static_mesh.as_ref() else {
            return;
        };

        for (handle, object) in objects.iter_mut() {
            if !object.is_simulated() || object.is_trigger {
                continue;
            }

            let displacement = object.position - object.last_valid_position;
            if is_fast_mover(displacement, object.shape.min_half_extent()) {
                profile.swept_count += 1;
                if !sweep_against_mesh(mesh, handle, object, simplex, contacts) {
                    profile.snap_backs += 1;
                }
            }
            resolve_overlaps(mesh, handle, object, simplex, contacts);
        }
    }
}

/// Moves `object` to `position` (respecting frozen axes) with a new
/// velocity.
fn place(object: &mut PhysicsObject, position: Vec3, velocity: Vec3) {
    let delta = object.masked_linear(position - object.position);
    object.position += delta;
    let angular = object.angular_velocity;
    object.set_motion(velocity, angular);
}

/// Stores a mesh hit, given with the triangle as A, on the object's mesh
/// contact.
fn record_contact(contacts: &mut ContactPool, handle: Handle, object: &PhysicsObject, hit: &EpaResult) {
    let entity = object.entity;
    let (id, _) = contacts.get_or_insert_with(pair_id(entity, EntityId::NONE), || {
        ContactConstraint::new(entity, handle, EntityId::NONE, Handle::INVALID)
    });
    let Some(contact) = contacts.get_mut(id) else {
        return;
    };
    contact.friction = object.material.friction;
    contact.bounce = object.material.bounce;

    let frame = ContactFrame::new(object.center(), object.rotation());
    if !contact.touched {
        contact.refresh(frame, ContactFrame::WORLD);
        contact.touched = true;
    }
    contact.update_points(&swap_sides(hit), frame, ContactFrame::WORLD);
}

/// Walks the object from its last valid position along this tick's
/// displacement, stopping at each surface and sliding along it. Returns
/// false when the retries ran out and the object was put back.
fn sweep_against_mesh(
    mesh: &MeshCollider,
    handle: Handle,
    object: &mut PhysicsObject,
    simplex: &mut Simplex,
    contacts: &mut ContactPool,
) -> bool {
    let rotation = object.rotation();
    let offset = rotation * object.center_offset;
    let (bounce, friction) = (object.material.bounce, object.material.friction);
    let mut start = object.last_valid_position;
    let mut remaining = object.position - start;
    let mut velocity = object.velocity();
    let mut triangles = [0u16; MAX_TRIANGLE_CANDIDATES];

    for _ in 0..MAX_SWEPT_ITERATIONS {
        let moving = PlacedShape::new(object.shape, start + offset, rotation);
        let bounds = moving.world_bounds().extended_along(remaining).expanded(SWEEP_SKIN);
        let count = mesh.query_bounds(&bounds, &mut triangles);

        let earliest = triangles[..count]
            .iter()
            .filter_map(|&index| mesh.triangle(index))
            .filter_map(|triangle| time_of_impact(&triangle, &moving, remaining, simplex))
            .min_by(|x, y| x.time_of_impact.total_cmp(&y.time_of_impact));

        let Some(hit) = earliest else {
            place(object, start + remaining, velocity);
            return true;
        };

        let travel = remaining * hit.time_of_impact;
        start += travel + hit.normal * SWEEP_SKIN;
        let rest = remaining - travel;
        remaining = rest - hit.normal * rest.dot(hit.normal).min(0.0);
        velocity = project_velocity(velocity, hit.normal, bounce, friction);

        place(object, start, velocity);
        let touch = EpaResult {
            normal: hit.normal,
            penetration: 0.0,
            contact_a: hit.contact,
            contact_b: hit.contact,
        };
        record_contact(contacts, handle, object, &touch);

        if remaining.length_squared() < MIN_SWEEP * MIN_SWEEP {
            return true;
        }
    }

    warn!(
        "entity {:?} still moving after {MAX_SWEPT_ITERATIONS} sweeps against the static mesh, restoring its last valid position",
        object.entity
    );
    let fallback = object.last_valid_position;
    place(object, fallback, velocity);
    false
}

/// Pushes the object out of every triangle it overlaps at its current pose.
fn resolve_overlaps(
    mesh: &MeshCollider,
    handle: Handle,
    object: &mut PhysicsObject,
    simplex: &mut Simplex,
    contacts: &mut ContactPool,
) {
    let (bounce, friction) = (object.material.bounce, object.material.friction);
    let mut triangles = [0u16; MAX_TRIANGLE_CANDIDATES];
    let count = mesh.query_bounds(&object.world_bounds(), &mut triangles);

    for &index in &triangles[..count] {
        let Some(triangle) = mesh.triangle(index) else {
            continue;
        };
        let shape = object.placed_shape();
        if !gjk_check_for_overlap(&triangle, &shape, shape.position - triangle.centroid(), simplex) {
            continue;
        }
        let hit = epa_solve(simplex, &triangle, &shape).unwrap_or_else(|| {
            let side = (shape.position - triangle.centroid()).dot(triangle.normal);
            debug!("EPA found no polytope against triangle {index}, separating along its normal");
            axis_penetration(&triangle, &shape, triangle.normal * side.signum())
        });
        if hit.penetration <= 0.0 {
            continue;
        }

        record_contact(contacts, handle, object, &hit);
        let velocity = project_velocity(object.velocity(), hit.normal, bounce, friction);
        let corrected = object.position + hit.normal * hit.penetration;
        place(object, corrected, velocity);
    }
}
