//! Gilbert-Johnson-Keerthi overlap test over support mappings.

use glam::Vec3;
use log::trace;

use crate::{
    config::{GJK_MAX_ITERATIONS, GJK_TOLERANCE},
    utils::math::{perpendicular, triple_product},
};

const DEGENERATE_EPSILON: f32 = 1e-10;

/// Farthest point of a convex set along a direction. Directions need not be
/// normalized.
pub trait SupportMap {
    fn support(&self, direction: Vec3) -> Vec3;
}

impl<S: SupportMap + ?Sized> SupportMap for &S {
    fn support(&self, direction: Vec3) -> Vec3 {
        (**self).support(direction)
    }
}

/// Support point of the Minkowski difference `a - b`, together with the
/// point on `a` that produced it.
pub fn minkowski_support(a: &impl SupportMap, b: &impl SupportMap, direction: Vec3) -> (Vec3, Vec3) {
    let on_a = a.support(direction);
    let on_b = b.support(-direction);
    (on_a - on_b, on_a)
}

/// Up to four Minkowski-difference points, newest last, plus the points on
/// shape A that produced them.
#[derive(Debug, Clone, Copy, Default)]
pub struct Simplex {
    points: [Vec3; 4],
    support_a: [Vec3; 4],
    count: usize,
}

impl Simplex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.count = 0;
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn points(&self) -> &[Vec3] {
        &self.points[..self.count]
    }

    pub fn support_points_a(&self) -> &[Vec3] {
        &self.support_a[..self.count]
    }

    pub fn push(&mut self, point: Vec3, on_a: Vec3) {
        debug_assert!(self.count < 4, "simplex holds at most four points");
        self.points[self.count] = point;
        self.support_a[self.count] = on_a;
        self.count += 1;
    }

    /// Keeps only the listed slots, in the given order.
    fn retain(&mut self, slots: &[usize]) {
        let points = self.points;
        let support_a = self.support_a;
        for (target, &slot) in slots.iter().enumerate() {
            self.points[target] = points[slot];
            self.support_a[target] = support_a[slot];
        }
        self.count = slots.len();
    }
}

/// Returns true when the convex sets `a` and `b` overlap. On success the
/// simplex is a tetrahedron enclosing the origin, ready for EPA.
///
/// `first_direction` seeds the search; the offset between the two centers
/// is a good choice. Only a support that fails to pass the origin proves
/// separation, so a search that collapses or reaches the iteration cap
/// reports overlap: the origin sits on the boundary within tolerance. The
/// simplex may then hold fewer than four points.
pub fn gjk_check_for_overlap(
    a: &impl SupportMap,
    b: &impl SupportMap,
    first_direction: Vec3,
    simplex: &mut Simplex,
) -> bool {
    simplex.clear();

    let seed = if first_direction.length_squared() > DEGENERATE_EPSILON {
        first_direction
    } else {
        Vec3::X
    };

    let (point, on_a) = minkowski_support(a, b, seed);
    simplex.push(point, on_a);
    let mut direction = -point;
    if direction.length_squared() < DEGENERATE_EPSILON {
        // First support landed on the origin; search sideways.
        direction = perpendicular(seed);
    }

    for _ in 0..GJK_MAX_ITERATIONS {
        let (point, on_a) = minkowski_support(a, b, direction);
        if point.dot(direction) <= 0.0 {
            return false;
        }
        simplex.push(point, on_a);

        if next_simplex(simplex, &mut direction) {
            return true;
        }
        if direction.length_squared() < DEGENERATE_EPSILON {
            // Origin lies on the current simplex.
            return true;
        }
    }

    trace!("GJK stopped after {GJK_MAX_ITERATIONS} iterations on a touching boundary");
    true
}

fn next_simplex(simplex: &mut Simplex, direction: &mut Vec3) -> bool {
    match simplex.count {
        2 => {
            line_case(simplex, direction);
            false
        }
        3 => {
            triangle_case(simplex, direction);
            false
        }
        4 => tetrahedron_case(simplex, direction),
        _ => false,
    }
}

/// Segment `[b, a]`, `a` newest.
fn line_case(simplex: &mut Simplex, direction: &mut Vec3) {
    let a = simplex.points[1];
    let b = simplex.points[0];
    let ab = b - a;
    let ao = -a;

    if ab.dot(ao) > 0.0 {
        let towards = triple_product(ab, ao, ab);
        *direction = if towards.length_squared() > DEGENERATE_EPSILON {
            towards
        } else {
            // Origin lies on the segment's line.
            perpendicular(ab)
        };
    } else {
        simplex.retain(&[1]);
        *direction = ao;
    }
}

/// Triangle `[c, b, a]`, `a` newest.
fn triangle_case(simplex: &mut Simplex, direction: &mut Vec3) {
    let a = simplex.points[2];
    let b = simplex.points[1];
    let c = simplex.points[0];
    let ab = b - a;
    let ac = c - a;
    let ao = -a;
    let abc = ab.cross(ac);

    if abc.length_squared() < DEGENERATE_EPSILON {
        simplex.retain(&[1, 2]);
        line_case(simplex, direction);
        return;
    }

    if abc.cross(ac).dot(ao) > 0.0 {
        if ac.dot(ao) > 0.0 {
            simplex.retain(&[0, 2]);
            let towards = triple_product(ac, ao, ac);
            *direction = if towards.length_squared() > DEGENERATE_EPSILON {
                towards
            } else {
                perpendicular(ac)
            };
        } else {
            simplex.retain(&[1, 2]);
            line_case(simplex, direction);
        }
        return;
    }

    if ab.cross(abc).dot(ao) > 0.0 {
        simplex.retain(&[1, 2]);
        line_case(simplex, direction);
        return;
    }

    if abc.dot(ao) > 0.0 {
        *direction = abc;
    } else {
        // Keep the winding so the normal faces the origin.
        simplex.retain(&[1, 0, 2]);
        *direction = -abc;
    }
}

/// Tetrahedron `[d, c, b, a]`, `a` newest. The origin is known to be on
/// `a`'s side of `bcd`, so only the three faces touching `a` are tested.
/// An origin within tolerance of a face plane counts as enclosed.
fn tetrahedron_case(simplex: &mut Simplex, direction: &mut Vec3) -> bool {
    let a = simplex.points[3];
    let ao = -a;
    let tolerance = GJK_TOLERANCE * a.length().max(1.0);

    // (first, second, opposite) slots of each face together with `a`.
    const FACES: [(usize, usize, usize); 3] = [(2, 1, 0), (1, 0, 2), (0, 2, 1)];

    for (first, second, opposite) in FACES {
        let p = simplex.points[first];
        let q = simplex.points[second];
        let mut normal = (p - a).cross(q - a);
        let area = normal.length();
        if area < 1e-12 {
            continue;
        }
        if normal.dot(simplex.points[opposite] - a) > 0.0 {
            normal = -normal;
        }
        if normal.dot(ao) > tolerance * area {
            simplex.retain(&[second, first, 3]);
            triangle_case(simplex, direction);
            return false;
        }
    }

    true
}
