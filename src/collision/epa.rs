//! Expanding Polytope Algorithm: penetration depth and contact points from
//! a GJK simplex, plus a swept variant that reports time of impact.
//!
//! The polytope lives in fixed arrays sized from [`EPA_MAX_ITERATIONS`].
//! Each iteration removes every face the new support point can see and fans
//! the horizon of that hole around the point, so the polytope stays convex.
//! Dead face slots are reused, which keeps the live face count within
//! `2V - 4` for `V` vertices.

use glam::Vec3;
use log::trace;

use crate::{
    collision::gjk::{minkowski_support, Simplex, SupportMap},
    config::{EPA_MAX_ITERATIONS, EPA_TOLERANCE},
    utils::math::{barycentric, perpendicular},
};

const MAX_VERTICES: usize = 4 + EPA_MAX_ITERATIONS;
const MAX_FACES: usize = 4 + 2 * EPA_MAX_ITERATIONS;
const MAX_HORIZON: usize = 3 * MAX_FACES;
const NORMAL_EPSILON: f32 = 1e-12;
const VOLUME_EPSILON: f32 = 1e-9;
const COMPLETION_EPSILON: f32 = 1e-6;

const AXES: [Vec3; 6] = [Vec3::X, Vec3::NEG_X, Vec3::Y, Vec3::NEG_Y, Vec3::Z, Vec3::NEG_Z];

/// Penetration of two overlapping shapes. `normal` points from A toward B;
/// moving B by `normal * penetration` separates them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpaResult {
    pub normal: Vec3,
    pub penetration: f32,
    pub contact_a: Vec3,
    pub contact_b: Vec3,
}

/// First contact of a shape B moving by a displacement against a static A.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SweptResult {
    /// Contact normal on A, facing B.
    pub normal: Vec3,
    /// Fraction of the displacement travelled before first contact, in `[0, 1]`.
    pub time_of_impact: f32,
    pub contact: Vec3,
    /// Always zero: the shapes only touch at the reported time.
    pub penetration: f32,
    /// Displacement of B at first contact.
    pub travel: Vec3,
}

#[derive(Debug, Clone, Copy, Default)]
struct Face {
    indices: [usize; 3],
    normal: Vec3,
    distance: f32,
    alive: bool,
}

/// Convex polytope in Minkowski-difference space. Faces wind
/// counter-clockwise seen from outside.
struct Polytope {
    points: [Vec3; MAX_VERTICES],
    support_a: [Vec3; MAX_VERTICES],
    vertex_count: usize,
    faces: [Face; MAX_FACES],
    face_count: usize,
    alive_count: usize,
    horizon: [(usize, usize); MAX_HORIZON],
    horizon_len: usize,
}

impl Polytope {
    /// Builds the initial tetrahedron from a GJK simplex, completing it with
    /// extra support points when GJK stopped on a touching boundary.
    fn from_simplex(simplex: &Simplex, a: &impl SupportMap, b: &impl SupportMap) -> Option<Self> {
        let (mut points, mut support_a) = complete_simplex(simplex, a, b)?;

        // Put the fourth vertex behind face (0, 1, 2).
        let [p0, p1, p2, p3] = points;
        let volume = (p1 - p0).cross(p2 - p0).dot(p3 - p0);
        if volume.abs() < VOLUME_EPSILON {
            return None;
        }
        if volume > 0.0 {
            points.swap(1, 2);
            support_a.swap(1, 2);
        }

        let mut polytope = Polytope {
            points: [Vec3::ZERO; MAX_VERTICES],
            support_a: [Vec3::ZERO; MAX_VERTICES],
            vertex_count: 4,
            faces: [Face::default(); MAX_FACES],
            face_count: 4,
            alive_count: 4,
            horizon: [(0, 0); MAX_HORIZON],
            horizon_len: 0,
        };
        polytope.points[..4].copy_from_slice(&points);
        polytope.support_a[..4].copy_from_slice(&support_a);

        const TETRAHEDRON: [[usize; 3]; 4] = [[0, 1, 2], [1, 0, 3], [2, 1, 3], [0, 2, 3]];
        for (slot, indices) in TETRAHEDRON.into_iter().enumerate() {
            let (normal, distance) = polytope.plane_of(indices)?;
            polytope.faces[slot] = Face { indices, normal, distance, alive: true };
        }

        Some(polytope)
    }

    fn plane_of(&self, indices: [usize; 3]) -> Option<(Vec3, f32)> {
        let a = self.points[indices[0]];
        let b = self.points[indices[1]];
        let c = self.points[indices[2]];
        let normal = (b - a).cross(c - a);
        let length_squared = normal.length_squared();
        if length_squared < NORMAL_EPSILON {
            return None;
        }
        let normal = normal / length_squared.sqrt();
        Some((normal, normal.dot(a)))
    }

    fn alive_faces(&self) -> impl Iterator<Item = (usize, &Face)> + '_ {
        self.faces[..self.face_count]
            .iter()
            .enumerate()
            .filter(|(_, face)| face.alive)
    }

    fn closest_face(&self) -> usize {
        let mut closest = (0, f32::INFINITY);
        for (slot, face) in self.alive_faces() {
            if face.distance < closest.1 {
                closest = (slot, face.distance);
            }
        }
        closest.0
    }

    /// Face pierced by the ray from the origin along `direction`, or the face
    /// most aligned with it when no face contains the ray.
    fn pierced_face(&self, direction: Vec3) -> usize {
        let mut most_aligned = (0, f32::NEG_INFINITY);
        for (slot, face) in self.alive_faces() {
            let alignment = face.normal.dot(direction);
            if alignment > most_aligned.1 {
                most_aligned = (slot, alignment);
            }
            if alignment <= 0.0 {
                continue;
            }
            let [i0, i1, i2] = face.indices;
            let contains_ray = [(i0, i1), (i1, i2), (i2, i0)].into_iter().all(|(from, to)| {
                self.points[from].cross(self.points[to]).dot(direction) >= 0.0
            });
            if contains_ray {
                return slot;
            }
        }
        most_aligned.0
    }

    fn sees(&self, face: &Face, point: Vec3) -> bool {
        face.normal.dot(point - self.points[face.indices[0]]) > 0.0
    }

    /// Adds an edge of a removed face to the horizon, or cancels it against
    /// its twin from a neighbouring removed face.
    fn toggle_horizon_edge(&mut self, (from, to): (usize, usize)) {
        let edges = &self.horizon[..self.horizon_len];
        if let Some(position) = edges.iter().position(|&edge| edge == (to, from)) {
            self.horizon_len -= 1;
            self.horizon[position] = self.horizon[self.horizon_len];
        } else if self.horizon_len < MAX_HORIZON {
            self.horizon[self.horizon_len] = (from, to);
            self.horizon_len += 1;
        }
    }

    fn free_slot(&mut self, cursor: &mut usize) -> Option<usize> {
        while *cursor < self.face_count {
            let slot = *cursor;
            *cursor += 1;
            if !self.faces[slot].alive {
                return Some(slot);
            }
        }
        if self.face_count < MAX_FACES {
            self.face_count += 1;
            *cursor = self.face_count;
            return Some(self.face_count - 1);
        }
        None
    }

    /// Grows the polytope to include `point`. Returns false, leaving the
    /// polytope untouched, when storage is exhausted or a new face would be
    /// degenerate.
    fn expand(&mut self, point: Vec3, on_a: Vec3) -> bool {
        if self.vertex_count >= MAX_VERTICES {
            return false;
        }

        self.horizon_len = 0;
        let mut removed = 0;
        for slot in 0..self.face_count {
            let face = self.faces[slot];
            if !face.alive || !self.sees(&face, point) {
                continue;
            }
            removed += 1;
            let [i0, i1, i2] = face.indices;
            for edge in [(i0, i1), (i1, i2), (i2, i0)] {
                self.toggle_horizon_edge(edge);
            }
        }
        if removed == 0 || self.horizon_len < 3 || self.alive_count - removed + self.horizon_len > MAX_FACES {
            return false;
        }

        let vertex = self.vertex_count;
        self.points[vertex] = point;
        self.support_a[vertex] = on_a;
        let horizon = &self.horizon[..self.horizon_len];
        if horizon.iter().any(|&(from, to)| self.plane_of([from, to, vertex]).is_none()) {
            return false;
        }

        self.vertex_count += 1;
        for slot in 0..self.face_count {
            let face = self.faces[slot];
            if face.alive && self.sees(&face, point) {
                self.faces[slot].alive = false;
            }
        }
        self.alive_count -= removed;

        let mut cursor = 0;
        for edge in 0..self.horizon_len {
            let (from, to) = self.horizon[edge];
            let indices = [from, to, vertex];
            let (Some((normal, distance)), Some(slot)) = (self.plane_of(indices), self.free_slot(&mut cursor))
            else {
                return false;
            };
            self.faces[slot] = Face { indices, normal, distance, alive: true };
            self.alive_count += 1;
        }
        true
    }

    /// Barycentric interpolation of the A-side support points of `face` at
    /// the difference-space `point`.
    fn point_on_a(&self, face: usize, point: Vec3) -> Vec3 {
        let [i0, i1, i2] = self.faces[face].indices;
        let weights = barycentric(point, self.points[i0], self.points[i1], self.points[i2]);
        self.support_a[i0] * weights.x + self.support_a[i1] * weights.y + self.support_a[i2] * weights.z
    }

    fn contact(&self, face: usize) -> EpaResult {
        let Face { normal, distance, .. } = self.faces[face];
        let penetration = distance.max(0.0);
        let contact_a = self.point_on_a(face, normal * distance);
        EpaResult {
            normal,
            penetration,
            contact_a,
            contact_b: contact_a - normal * penetration,
        }
    }
}

/// Support of the difference among `directions` that lies farthest from the
/// current simplex by `distance`.
fn farthest_support(
    a: &impl SupportMap,
    b: &impl SupportMap,
    directions: &[Vec3],
    distance: impl Fn(Vec3) -> f32,
) -> Option<(Vec3, Vec3)> {
    let mut farthest = None;
    let mut farthest_distance = COMPLETION_EPSILON;
    for &direction in directions {
        let (point, on_a) = minkowski_support(a, b, direction);
        let d = distance(point);
        if d > farthest_distance {
            farthest = Some((point, on_a));
            farthest_distance = d;
        }
    }
    farthest
}

/// Lifts a GJK simplex to a tetrahedron of non-zero volume. Flat or short
/// simplices get one support point per missing dimension.
fn complete_simplex(
    simplex: &Simplex,
    a: &impl SupportMap,
    b: &impl SupportMap,
) -> Option<([Vec3; 4], [Vec3; 4])> {
    let mut points = [Vec3::ZERO; 4];
    let mut support_a = [Vec3::ZERO; 4];
    let mut count = simplex.len();
    points[..count].copy_from_slice(simplex.points());
    support_a[..count].copy_from_slice(simplex.support_points_a());

    if count == 0 {
        (points[0], support_a[0]) = minkowski_support(a, b, Vec3::X);
        count = 1;
    }
    if count == 4 {
        let volume = (points[1] - points[0]).cross(points[2] - points[0]).dot(points[3] - points[0]);
        if volume.abs() > VOLUME_EPSILON {
            return Some((points, support_a));
        }
        count = 3;
    }
    if count == 3 && (points[1] - points[0]).cross(points[2] - points[0]).length_squared() < NORMAL_EPSILON {
        count = 2;
    }
    if count == 2 && (points[1] - points[0]).length() < COMPLETION_EPSILON {
        count = 1;
    }

    if count == 1 {
        let origin = points[0];
        (points[1], support_a[1]) = farthest_support(a, b, &AXES, |p| (p - origin).length())?;
        count = 2;
    }
    if count == 2 {
        let origin = points[0];
        let axis = (points[1] - origin).normalize();
        let u = perpendicular(axis);
        let w = axis.cross(u);
        (points[2], support_a[2]) = farthest_support(a, b, &[u, -u, w, -w], |p| {
            let offset = p - origin;
            (offset - axis * offset.dot(axis)).length()
        })?;
    }

    let origin = points[0];
    let normal = (points[1] - origin).cross(points[2] - origin).normalize();
    (points[3], support_a[3]) =
        farthest_support(a, b, &[normal, -normal], |p| (p - origin).dot(normal).abs())?;
    Some((points, support_a))
}

/// Penetration depth and contact points for overlapping `a` and `b`, given
/// the simplex GJK ended on. Returns `None` only when the Minkowski
/// difference is flat.
///
/// When the iteration cap is reached the tightest upper bound seen so far is
/// reported: the smallest support distance together with its direction.
pub fn epa_solve(simplex: &Simplex, a: &impl SupportMap, b: &impl SupportMap) -> Option<EpaResult> {
    let mut polytope = Polytope::from_simplex(simplex, a, b)?;
    let mut tightest: Option<EpaResult> = None;

    for _ in 0..EPA_MAX_ITERATIONS {
        let face = polytope.closest_face();
        let Face { normal, distance, .. } = polytope.faces[face];

        let (point, on_a) = minkowski_support(a, b, normal);
        let upper = point.dot(normal);
        if upper - distance < EPA_TOLERANCE {
            return Some(polytope.contact(face));
        }
        if tightest.is_none_or(|found| upper < found.penetration) {
            let penetration = upper.max(0.0);
            tightest = Some(EpaResult {
                normal,
                penetration,
                contact_a: on_a,
                contact_b: on_a - normal * penetration,
            });
        }

        if !polytope.expand(point, on_a) {
            return Some(polytope.contact(face));
        }
    }

    trace!("EPA reached {EPA_MAX_ITERATIONS} iterations");
    tightest
}

/// Estimate of how far B must move along `axis` to clear A: the gap
/// between the two supports on that axis. Stands in for EPA when the
/// Minkowski difference is too flat to build a polytope.
pub fn axis_penetration(a: &impl SupportMap, b: &impl SupportMap, axis: Vec3) -> EpaResult {
    let normal = axis.try_normalize().unwrap_or(Vec3::Y);
    let contact_a = a.support(normal);
    let on_b = b.support(-normal);
    let penetration = (contact_a - on_b).dot(normal).max(0.0);
    EpaResult {
        normal,
        penetration,
        contact_a,
        contact_b: contact_a - normal * penetration,
    }
}

/// Time of impact of B moving by `sweep` against A.
///
/// `b` must be the swept hull of B (its start shape stretched along `sweep`)
/// and `simplex` the GJK simplex of `a` against that hull. Only the face
/// pierced by the reversed sweep direction is refined. Returns `None` when
/// the first contact lies outside the sweep, including when the shapes
/// already overlap at the start.
pub fn epa_solve_swept(
    simplex: &Simplex,
    a: &impl SupportMap,
    b: &impl SupportMap,
    sweep: Vec3,
) -> Option<SweptResult> {
    let length = sweep.length();
    if length < 1e-6 {
        return None;
    }
    let direction = -sweep / length;

    let mut polytope = Polytope::from_simplex(simplex, a, b)?;
    let mut face = polytope.pierced_face(direction);

    for _ in 0..EPA_MAX_ITERATIONS {
        let Face { normal, distance, .. } = polytope.faces[face];
        let (point, on_a) = minkowski_support(a, b, normal);
        if point.dot(normal) - distance < EPA_TOLERANCE || !polytope.expand(point, on_a) {
            break;
        }
        face = polytope.pierced_face(direction);
    }

    let Face { normal, distance, .. } = polytope.faces[face];
    let alignment = normal.dot(direction);
    if alignment <= 1e-6 {
        return None;
    }
    let along = distance / alignment;
    if !(-EPA_TOLERANCE..=length + EPA_TOLERANCE).contains(&along) {
        return None;
    }
    let along = along.clamp(0.0, length);

    let time_of_impact = 1.0 - along / length;
    Some(SweptResult {
        normal,
        time_of_impact,
        contact: polytope.point_on_a(face, direction * along),
        penetration: 0.0,
        travel: sweep * time_of_impact,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collision::gjk::gjk_check_for_overlap;

    struct Ball {
        center: Vec3,
        radius: f32,
    }

    impl SupportMap for Ball {
        fn support(&self, direction: Vec3) -> Vec3 {
            self.center + direction.normalize_or_zero() * self.radius
        }
    }

    struct Cube {
        center: Vec3,
        half: Vec3,
    }

    impl SupportMap for Cube {
        fn support(&self, direction: Vec3) -> Vec3 {
            self.center
                + Vec3::new(
                    self.half.x.copysign(direction.x),
                    self.half.y.copysign(direction.y),
                    self.half.z.copysign(direction.z),
                )
        }
    }

    fn solve(a: &impl SupportMap, b: &impl SupportMap, seed: Vec3) -> EpaResult {
        let mut simplex = Simplex::new();
        assert!(gjk_check_for_overlap(a, b, seed, &mut simplex), "shapes must overlap");
        epa_solve(&simplex, a, b).expect("non-degenerate simplex")
    }

    #[test]
    fn cube_penetration_is_exact() {
        let a = Cube { center: Vec3::ZERO, half: Vec3::ONE };
        let b = Cube { center: Vec3::new(0.0, 1.75, 0.0), half: Vec3::ONE };
        let result = solve(&a, &b, b.center - a.center);
        assert!((result.penetration - 0.25).abs() < 1e-3);
        assert!(result.normal.dot(Vec3::Y) > 0.999);
        assert!((result.contact_a.y - 1.0).abs() < 1e-3);
        assert!((result.contact_b.y - 0.75).abs() < 1e-3);
    }

    #[test]
    fn normal_points_from_a_to_b() {
        let a = Ball { center: Vec3::ZERO, radius: 1.0 };
        let b = Ball { center: Vec3::new(-1.2, 0.0, 0.0), radius: 1.0 };
        let result = solve(&a, &b, b.center - a.center);
        assert!(result.normal.x < -0.9);
    }

    #[test]
    fn expansion_keeps_every_vertex_behind_every_face() {
        let a = Ball { center: Vec3::ZERO, radius: 1.0 };
        let b = Ball { center: Vec3::new(0.4, 0.9, -0.3), radius: 0.8 };
        let mut simplex = Simplex::new();
        assert!(gjk_check_for_overlap(&a, &b, b.center, &mut simplex));
        let mut polytope = Polytope::from_simplex(&simplex, &a, &b).expect("tetrahedron");

        for _ in 0..24 {
            let face = polytope.closest_face();
            let Face { normal, distance, .. } = polytope.faces[face];
            let (point, on_a) = minkowski_support(&a, &b, normal);
            if point.dot(normal) - distance < EPA_TOLERANCE {
                break;
            }
            assert!(polytope.expand(point, on_a));

            for (_, face) in polytope.alive_faces() {
                let anchor = polytope.points[face.indices[0]];
                for &vertex in &polytope.points[..polytope.vertex_count] {
                    assert!(face.normal.dot(vertex - anchor) < 1e-4, "vertex in front of a live face");
                }
            }
            let closest = polytope.faces[polytope.closest_face()].distance;
            assert!(polytope.alive_faces().all(|(_, face)| face.distance >= closest));
        }
    }

    #[test]
    fn flat_simplex_is_lifted_to_a_tetrahedron() {
        let a = Ball { center: Vec3::ZERO, radius: 1.0 };
        let b = Ball { center: Vec3::new(0.5, 0.0, 0.0), radius: 1.0 };
        let mut simplex = Simplex::new();
        for direction in [Vec3::Y, Vec3::NEG_Y, Vec3::Z, Vec3::NEG_Z] {
            let (point, on_a) = minkowski_support(&a, &b, direction);
            simplex.push(point, on_a);
        }
        let result = epa_solve(&simplex, &a, &b).expect("completed simplex");
        assert!((result.penetration - 1.5).abs() < 1e-2, "{result:?}");
        assert!(result.normal.x > 0.99);
    }

    #[test]
    fn short_simplices_are_completed() {
        let a = Ball { center: Vec3::ZERO, radius: 1.0 };
        let b = Ball { center: Vec3::new(0.0, 0.6, 0.0), radius: 0.5 };

        let empty = Simplex::new();
        let mut single = Simplex::new();
        let (point, on_a) = minkowski_support(&a, &b, Vec3::X);
        single.push(point, on_a);
        let mut segment = single;
        let (point, on_a) = minkowski_support(&a, &b, Vec3::NEG_X);
        segment.push(point, on_a);

        for simplex in [empty, single, segment] {
            let result = epa_solve(&simplex, &a, &b).expect("completed simplex");
            assert!((result.penetration - 0.9).abs() < 1e-2, "{} points: {result:?}", simplex.len());
            assert!(result.normal.y > 0.99);
        }
    }

    #[test]
    fn flat_difference_is_rejected() {
        struct Disc;
        impl SupportMap for Disc {
            fn support(&self, direction: Vec3) -> Vec3 {
                Vec3::new(direction.x, 0.0, direction.z).normalize_or_zero()
            }
        }
        let mut simplex = Simplex::new();
        for point in [Vec3::X, Vec3::Z, Vec3::NEG_X, Vec3::NEG_Z] {
            simplex.push(point, point);
        }
        assert!(epa_solve(&simplex, &Disc, &Origin).is_none());

        let fallback = axis_penetration(&Disc, &Origin, Vec3::X);
        assert_eq!(fallback.normal, Vec3::X);
        assert!((fallback.penetration - 1.0).abs() < 1e-6);
    }

    struct Origin;

    impl SupportMap for Origin {
        fn support(&self, _direction: Vec3) -> Vec3 {
            Vec3::ZERO
        }
    }
}
