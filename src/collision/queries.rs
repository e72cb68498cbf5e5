//! Ray queries against placed shapes and mesh triangles.

use glam::Vec3;

use crate::{
    collision::shapes::{PlacedShape, Shape},
    core::mesh::Triangle,
    utils::allocator::EntityId,
};

/// A ray cast into a scene.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RaycastQuery {
    pub origin: Vec3,
    /// Unit direction.
    pub direction: Vec3,
    pub max_distance: f32,
    /// Objects are only hit when they share a layer bit with this mask.
    pub layer_mask: u32,
    pub ignore_triggers: bool,
    /// Typically the caster itself.
    pub ignore_entity: EntityId,
}

impl RaycastQuery {
    pub fn new(origin: Vec3, direction: Vec3, max_distance: f32) -> Self {
        Self {
            origin,
            direction: direction.normalize_or_zero(),
            max_distance,
            layer_mask: u32::MAX,
            ignore_triggers: true,
            ignore_entity: EntityId::NONE,
        }
    }

    pub fn with_layer_mask(mut self, mask: u32) -> Self {
        self.layer_mask = mask;
        self
    }

    pub fn with_triggers(mut self) -> Self {
        self.ignore_triggers = false;
        self
    }

    pub fn ignoring(mut self, entity: EntityId) -> Self {
        self.ignore_entity = entity;
        self
    }

    pub fn point_at(&self, distance: f32) -> Vec3 {
        self.origin + self.direction * distance
    }
}

/// Closest surface hit along a ray. `entity` is [`EntityId::NONE`] for the
/// static mesh.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RaycastHit {
    pub entity: EntityId,
    pub point: Vec3,
    pub normal: Vec3,
    pub distance: f32,
}

/// Distance and world normal where the ray enters `placed`.
///
/// Rays that start inside a shape do not hit it. Pyramids, sweeps and line
/// segments are not ray-testable and always miss.
pub fn ray_shape(origin: Vec3, direction: Vec3, max_distance: f32, placed: &PlacedShape) -> Option<(f32, Vec3)> {
    let inverse = placed.rotation.conjugate();
    let local = LocalRay {
        origin: inverse * (origin - placed.position),
        direction: inverse * direction,
        max_distance,
    };

    let hit = match placed.shape {
        Shape::Sphere { radius } => local.sphere(Vec3::ZERO, radius),
        Shape::Box { half_extents } => local.cuboid(half_extents),
        Shape::Capsule {
            radius,
            inner_half_height,
        } => local.capsule(radius, inner_half_height),
        Shape::Cylinder { radius, half_height } => local.cylinder(radius, half_height),
        Shape::Cone { radius, half_height } => local.cone(radius, half_height),
        Shape::Pyramid { .. } | Shape::Sweep { .. } | Shape::LineSegment { .. } => None,
    }?;

    Some((hit.0, (placed.rotation * hit.1).normalize_or_zero()))
}

/// Two-sided Möller–Trumbore test. The returned normal faces the ray.
pub fn ray_triangle(origin: Vec3, direction: Vec3, max_distance: f32, triangle: &Triangle) -> Option<(f32, Vec3)> {
    let [v0, v1, v2] = triangle.vertices;
    let edge1 = v1 - v0;
    let edge2 = v2 - v0;
    let p = direction.cross(edge2);
    let det = edge1.dot(p);
    if det.abs() < 1e-8 {
        return None;
    }
    let inv_det = 1.0 / det;

    let s = origin - v0;
    let u = s.dot(p) * inv_det;
    if !(0.0..=1.0).contains(&u) {
        return None;
    }
    let q = s.cross(edge1);
    let v = direction.dot(q) * inv_det;
    if v < 0.0 || u + v > 1.0 {
        return None;
    }

    let t = edge2.dot(q) * inv_det;
    if t < 0.0 || t > max_distance {
        return None;
    }

    let normal = if triangle.normal.dot(direction) > 0.0 {
        -triangle.normal
    } else {
        triangle.normal
    };
    Some((t, normal))
}

/// Ray in a shape's local frame.
struct LocalRay {
    origin: Vec3,
    direction: Vec3,
    max_distance: f32,
}

impl LocalRay {
    fn at(&self, t: f32) -> Vec3 {
        self.origin + self.direction * t
    }

    /// Keeps a candidate when it lies ahead within range and the ray enters
    /// through it.
    fn accept(&self, t: f32, normal: Vec3, best: &mut Option<(f32, Vec3)>) {
        if t < 0.0 || t > self.max_distance || normal.dot(self.direction) >= 0.0 {
            return;
        }
        if best.is_none_or(|(current, _)| t < current) {
            *best = Some((t, normal));
        }
    }

    fn sphere(&self, center: Vec3, radius: f32) -> Option<(f32, Vec3)> {
        let offset = self.origin - center;
        let (t0, _) = solve_quadratic(
            self.direction.length_squared(),
            2.0 * offset.dot(self.direction),
            offset.length_squared() - radius * radius,
        )?;
        let mut best = None;
        self.accept(t0, (self.at(t0) - center) / radius, &mut best);
        best
    }

    fn cuboid(&self, half_extents: Vec3) -> Option<(f32, Vec3)> {
        let mut t_enter = f32::NEG_INFINITY;
        let mut t_exit = f32::INFINITY;
        let mut normal = Vec3::ZERO;

        for axis in 0..3 {
            let o = self.origin[axis];
            let d = self.direction[axis];
            let extent = half_extents[axis];
            if d.abs() < 1e-8 {
                if o < -extent || o > extent {
                    return None;
                }
                continue;
            }
            // Entering face is the one facing against the ray.
            let sign = -d.signum();
            let near = (sign * extent - o) / d;
            let far = (-sign * extent - o) / d;
            if near > t_enter {
                t_enter = near;
                normal = Vec3::ZERO;
                normal[axis] = sign;
            }
            t_exit = t_exit.min(far);
            if t_enter > t_exit {
                return None;
            }
        }

        let mut best = None;
        self.accept(t_enter, normal, &mut best);
        best
    }

    /// Open side wall of a Y-aligned cylinder, limited to `|y| <= half_height`.
    fn cylinder_wall(&self, radius: f32, half_height: f32, best: &mut Option<(f32, Vec3)>) {
        let (o, d) = (self.origin, self.direction);
        let Some((t0, _)) = solve_quadratic(
            d.x * d.x + d.z * d.z,
            2.0 * (o.x * d.x + o.z * d.z),
            o.x * o.x + o.z * o.z - radius * radius,
        ) else {
            return;
        };
        let point = self.at(t0);
        if point.y.abs() <= half_height {
            self.accept(t0, Vec3::new(point.x, 0.0, point.z) / radius, best);
        }
    }

    /// Disc of `radius` in the plane `y = height`, facing `facing`.
    fn cap(&self, radius: f32, height: f32, facing: f32, best: &mut Option<(f32, Vec3)>) {
        if self.direction.y.abs() < 1e-8 {
            return;
        }
        let t = (height - self.origin.y) / self.direction.y;
        let point = self.at(t);
        if point.x * point.x + point.z * point.z <= radius * radius {
            self.accept(t, Vec3::Y * facing, best);
        }
    }

    fn cylinder(&self, radius: f32, half_height: f32) -> Option<(f32, Vec3)> {
        let mut best = None;
        self.cylinder_wall(radius, half_height, &mut best);
        self.cap(radius, half_height, 1.0, &mut best);
        self.cap(radius, -half_height, -1.0, &mut best);
        best
    }

    fn capsule(&self, radius: f32, inner_half_height: f32) -> Option<(f32, Vec3)> {
        let mut best = None;
        self.cylinder_wall(radius, inner_half_height, &mut best);
        for end in [inner_half_height, -inner_half_height] {
            let center = Vec3::new(0.0, end, 0.0);
            if let Some((t, normal)) = self.sphere(center, radius) {
                // Only the outward half of each end sphere is capsule surface.
                if (self.at(t).y - end) * end >= 0.0 {
                    self.accept(t, normal, &mut best);
                }
            }
        }
        best
    }

    fn cone(&self, radius: f32, half_height: f32) -> Option<(f32, Vec3)> {
        let mut best = None;
        let slope = radius / (2.0 * half_height);
        let k2 = slope * slope;
        let (o, d) = (self.origin, self.direction);
        // Distance below the apex along the axis.
        let q = half_height - o.y;
        let dq = -d.y;

        if let Some((t0, t1)) = solve_quadratic(
            d.x * d.x + d.z * d.z - k2 * dq * dq,
            2.0 * (o.x * d.x + o.z * d.z - k2 * q * dq),
            o.x * o.x + o.z * o.z - k2 * q * q,
        ) {
            for t in [t0, t1] {
                let point = self.at(t);
                // Reject the mirrored nappe above the apex.
                if point.y < -half_height || point.y > half_height {
                    continue;
                }
                let normal = Vec3::new(point.x, k2 * (half_height - point.y), point.z).normalize_or_zero();
                self.accept(t, normal, &mut best);
            }
        }

        self.cap(radius, -half_height, -1.0, &mut best);
        best
    }
}

/// Real roots of `a t^2 + b t + c`, smallest first.
fn solve_quadratic(a: f32, b: f32, c: f32) -> Option<(f32, f32)> {
    if a.abs() < 1e-10 {
        if b.abs() < 1e-10 {
            return None;
        }
        let t = -c / b;
        return Some((t, t));
    }
    let discriminant = b * b - 4.0 * a * c;
    if discriminant < 0.0 {
        return None;
    }
    let root = discriminant.sqrt();
    let (t0, t1) = ((-b - root) / (2.0 * a), (-b + root) / (2.0 * a));
    Some((t0.min(t1), t0.max(t1)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use glam::Quat;

    fn placed(shape: Shape, position: Vec3) -> PlacedShape {
        PlacedShape::new(shape, position, Quat::IDENTITY)
    }

    #[test]
    fn sphere_hit_distance_and_normal() {
        let target = placed(Shape::sphere(1.0), Vec3::new(5.0, 0.0, 0.0));
        let (t, normal) = ray_shape(Vec3::ZERO, Vec3::X, 100.0, &target).expect("hit");
        assert_abs_diff_eq!(t, 4.0, epsilon = 1e-4);
        assert_abs_diff_eq!(normal.x, -1.0, epsilon = 1e-4);
        assert!(ray_shape(Vec3::ZERO, Vec3::X, 3.0, &target).is_none(), "out of range");
    }

    #[test]
    fn rays_starting_inside_miss() {
        let target = placed(Shape::sphere(1.0), Vec3::ZERO);
        assert!(ray_shape(Vec3::ZERO, Vec3::X, 10.0, &target).is_none());
        let cube = placed(Shape::cuboid(Vec3::ONE), Vec3::ZERO);
        assert!(ray_shape(Vec3::ZERO, Vec3::X, 10.0, &cube).is_none());
    }

    #[test]
    fn box_normal_faces_the_ray_from_either_side() {
        let cube = placed(Shape::cuboid(Vec3::splat(0.5)), Vec3::ZERO);
        let (t, normal) = ray_shape(Vec3::new(-3.0, 0.1, 0.0), Vec3::X, 10.0, &cube).expect("hit from -X");
        assert_abs_diff_eq!(t, 2.5, epsilon = 1e-5);
        assert_eq!(normal, Vec3::new(-1.0, 0.0, 0.0));

        let (_, normal) = ray_shape(Vec3::new(3.0, 0.1, 0.0), -Vec3::X, 10.0, &cube).expect("hit from +X");
        assert_eq!(normal, Vec3::X);
    }

    #[test]
    fn rotated_box_uses_local_slabs() {
        let rotation = Quat::from_rotation_y(std::f32::consts::FRAC_PI_4);
        let cube = PlacedShape::new(Shape::cuboid(Vec3::splat(0.5)), Vec3::ZERO, rotation);
        let (t, _) = ray_shape(Vec3::new(-3.0, 0.0, 0.0), Vec3::X, 10.0, &cube).expect("hit the edge");
        assert_abs_diff_eq!(t, 3.0 - 0.5 * std::f32::consts::SQRT_2, epsilon = 1e-4);
    }

    #[test]
    fn capsule_cylinder_and_cone() {
        let capsule = placed(Shape::capsule(0.5, 1.0), Vec3::ZERO);
        let (t, normal) = ray_shape(Vec3::new(0.0, 5.0, 0.0), -Vec3::Y, 10.0, &capsule).expect("top cap");
        assert_abs_diff_eq!(t, 3.5, epsilon = 1e-4);
        assert_abs_diff_eq!(normal.y, 1.0, epsilon = 1e-4);

        let cylinder = placed(Shape::cylinder(0.5, 1.0), Vec3::ZERO);
        let (t, _) = ray_shape(Vec3::new(0.0, 5.0, 0.0), -Vec3::Y, 10.0, &cylinder).expect("flat top");
        assert_abs_diff_eq!(t, 4.0, epsilon = 1e-4);
        let (t, normal) = ray_shape(Vec3::new(-3.0, 0.5, 0.0), Vec3::X, 10.0, &cylinder).expect("side");
        assert_abs_diff_eq!(t, 2.5, epsilon = 1e-4);
        assert_abs_diff_eq!(normal.x, -1.0, epsilon = 1e-4);

        // Halfway up, the cone radius is half its base radius.
        let cone = placed(Shape::cone(1.0, 1.0), Vec3::ZERO);
        let (t, _) = ray_shape(Vec3::new(-3.0, 0.0, 0.0), Vec3::X, 10.0, &cone).expect("cone side");
        assert_abs_diff_eq!(t, 2.5, epsilon = 1e-4);
        let (t, normal) = ray_shape(Vec3::new(0.0, -5.0, 0.0), Vec3::Y, 10.0, &cone).expect("cone base");
        assert_abs_diff_eq!(t, 4.0, epsilon = 1e-4);
        assert_eq!(normal, -Vec3::Y);
    }

    #[test]
    fn unsupported_shapes_miss() {
        let segment = placed(Shape::line_segment(2.0), Vec3::ZERO);
        assert!(ray_shape(Vec3::new(-3.0, 0.0, 0.0), Vec3::X, 10.0, &segment).is_none());
    }

    #[test]
    fn triangle_hit_is_two_sided() {
        let triangle = Triangle {
            vertices: [
                Vec3::new(-1.0, 0.0, -1.0),
                Vec3::new(0.0, 0.0, 1.0),
                Vec3::new(1.0, 0.0, -1.0),
            ],
            normal: Vec3::Y,
        };
        let (t, normal) = ray_triangle(Vec3::new(0.0, 2.0, 0.0), -Vec3::Y, 10.0, &triangle).expect("from above");
        assert_abs_diff_eq!(t, 2.0, epsilon = 1e-5);
        assert_eq!(normal, Vec3::Y);

        let (_, normal) = ray_triangle(Vec3::new(0.0, -2.0, 0.0), Vec3::Y, 10.0, &triangle).expect("from below");
        assert_eq!(normal, -Vec3::Y);

        assert!(ray_triangle(Vec3::new(3.0, 2.0, 0.0), -Vec3::Y, 10.0, &triangle).is_none());
    }
}
