use super::CollisionScene;
use crate::{
    collision::queries::{ray_shape, ray_triangle, RaycastHit, RaycastQuery},
    config::MAX_RAYCAST_CANDIDATES,
    utils::allocator::{EntityId, Handle},
};

impl CollisionScene {
    /// Nearest hit along the ray over objects and the static mesh.
    ///
    /// Candidates beyond the traversal buffer are dropped, so a ray through a
    /// very crowded region may miss far objects.
    pub fn raycast(&self, query: &RaycastQuery) -> Option<RaycastHit> {
        if query.direction == glam::Vec3::ZERO || query.max_distance <= 0.0 {
            return None;
        }

        let mut best: Option<RaycastHit> = None;
        let mut reach = query.max_distance;

        let mut candidates = [Handle::INVALID; MAX_RAYCAST_CANDIDATES];
        let count = self
            .tree
            .query_ray(query.origin, query.direction, reach, &mut candidates);
        for &handle in &candidates[..count] {
            let Some(object) = self.objects.get(handle) else {
                continue;
            };
            if object.entity == query.ignore_entity
                || !object.layers.matches_mask(query.layer_mask)
                || (query.ignore_triggers && object.is_trigger)
            {
                continue;
            }
            if let Some((distance, normal)) = ray_shape(query.origin, query.direction, reach, &object.placed_shape()) {
                reach = distance;
                best = Some(RaycastHit {
                    entity: object.entity,
                    point: query.point_at(distance),
                    normal,
                    distance,
                });
            }
        }

        if let Some(mesh) = &self.static_mesh {
            let mut triangles = [0u16; MAX_RAYCAST_CANDIDATES];
            let count = mesh
                .tree()
                .query_ray(query.origin, query.direction, reach, &mut triangles);
            for &index in &triangles[..count] {
                let Some(triangle) = mesh.triangle(index) else {
                    continue;
                };
                if let Some((distance, normal)) = ray_triangle(query.origin, query.direction, reach, &triangle) {
                    reach = distance;
                    best = Some(RaycastHit {
                        entity: EntityId::NONE,
                        point: query.point_at(distance),
                        normal,
                        distance,
                    });
                }
            }
        }

        best
    }
}
