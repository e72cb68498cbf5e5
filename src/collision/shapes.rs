use glam::{Mat3, Quat, Vec2, Vec3};
use serde::{Deserialize, Serialize};

use crate::{collision::gjk::SupportMap, core::aabb::Aabb};

/// Closed set of primitive kinds; every collision shape is one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ShapeKind {
    Sphere,
    Box,
    Capsule,
    Cylinder,
    Cone,
    Pyramid,
    Sweep,
    LineSegment,
}

impl ShapeKind {
    pub const ALL: [ShapeKind; 8] = [
        ShapeKind::Sphere,
        ShapeKind::Box,
        ShapeKind::Capsule,
        ShapeKind::Cylinder,
        ShapeKind::Cone,
        ShapeKind::Pyramid,
        ShapeKind::Sweep,
        ShapeKind::LineSegment,
    ];

    /// Whether the Minkowski difference with another solid can enclose the
    /// origin in a tetrahedron, i.e. the shape has volume on its own.
    pub fn is_volumetric(self) -> bool {
        !matches!(self, ShapeKind::LineSegment)
    }
}

/// Shape descriptor in the object's local frame. Axial shapes run along +Y.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Shape {
    Sphere {
        radius: f32,
    },
    Box {
        half_extents: Vec3,
    },
    /// Segment of length `2 * inner_half_height` swept by `radius`.
    Capsule {
        radius: f32,
        inner_half_height: f32,
    },
    Cylinder {
        radius: f32,
        half_height: f32,
    },
    /// Base disc at `-half_height`, apex at `+half_height`.
    Cone {
        radius: f32,
        half_height: f32,
    },
    /// Rectangular base (`half_base` on X/Z) at `-half_height`, apex at `+half_height`.
    Pyramid {
        half_base: Vec2,
        half_height: f32,
    },
    /// Circular sector prism opening toward +Z.
    /// `range` holds `(sin, cos)` of the half opening angle.
    Sweep {
        radius: f32,
        range: Vec2,
        half_height: f32,
    },
    /// Segment from `-half_length` to `+half_length` along Z.
    LineSegment {
        half_length: f32,
    },
}

impl Shape {
    pub fn sphere(radius: f32) -> Shape {
        Shape::Sphere { radius }
    }

    pub fn cuboid(half_extents: Vec3) -> Shape {
        Shape::Box { half_extents }
    }

    pub fn capsule(radius: f32, inner_half_height: f32) -> Shape {
        Shape::Capsule {
            radius,
            inner_half_height,
        }
    }

    pub fn cylinder(radius: f32, half_height: f32) -> Shape {
        Shape::Cylinder {
            radius,
            half_height,
        }
    }

    pub fn cone(radius: f32, half_height: f32) -> Shape {
        Shape::Cone {
            radius,
            half_height,
        }
    }

    pub fn pyramid(half_base: Vec2, half_height: f32) -> Shape {
        Shape::Pyramid {
            half_base,
            half_height,
        }
    }

    pub fn sweep(radius: f32, half_angle: f32, half_height: f32) -> Shape {
        Shape::Sweep {
            radius,
            range: Vec2::new(half_angle.sin(), half_angle.cos()),
            half_height,
        }
    }

    pub fn line_segment(half_length: f32) -> Shape {
        Shape::LineSegment { half_length }
    }

    pub fn kind(&self) -> ShapeKind {
        match self {
            Shape::Sphere { .. } => ShapeKind::Sphere,
            Shape::Box { .. } => ShapeKind::Box,
            Shape::Capsule { .. } => ShapeKind::Capsule,
            Shape::Cylinder { .. } => ShapeKind::Cylinder,
            Shape::Cone { .. } => ShapeKind::Cone,
            Shape::Pyramid { .. } => ShapeKind::Pyramid,
            Shape::Sweep { .. } => ShapeKind::Sweep,
            Shape::LineSegment { .. } => ShapeKind::LineSegment,
        }
    }

    /// Farthest local point along `direction` (support mapping).
    pub fn support(&self, direction: Vec3) -> Vec3 {
        match *self {
            Shape::Sphere { radius } => direction.normalize_or_zero() * radius,
            Shape::Box { half_extents } => signed(direction, half_extents),
            Shape::Capsule {
                radius,
                inner_half_height,
            } => {
                let mut point = direction.normalize_or_zero() * radius;
                point.y += inner_half_height.copysign(direction.y);
                point
            }
            Shape::Cylinder {
                radius,
                half_height,
            } => {
                let radial = Vec2::new(direction.x, direction.z).normalize_or_zero() * radius;
                Vec3::new(radial.x, half_height.copysign(direction.y), radial.y)
            }
            Shape::Cone {
                radius,
                half_height,
            } => {
                let apex = Vec3::new(0.0, half_height, 0.0);
                let radial = Vec2::new(direction.x, direction.z).normalize_or_zero() * radius;
                let rim = Vec3::new(radial.x, -half_height, radial.y);
                if apex.dot(direction) >= rim.dot(direction) {
                    apex
                } else {
                    rim
                }
            }
            Shape::Pyramid {
                half_base,
                half_height,
            } => {
                let apex = Vec3::new(0.0, half_height, 0.0);
                let corner = Vec3::new(
                    half_base.x.copysign(direction.x),
                    -half_height,
                    half_base.y.copysign(direction.z),
                );
                if apex.dot(direction) >= corner.dot(direction) {
                    apex
                } else {
                    corner
                }
            }
            Shape::Sweep {
                radius,
                range,
                half_height,
            } => {
                let planar = sector_support(Vec2::new(direction.x, direction.z), radius, range);
                Vec3::new(planar.x, half_height.copysign(direction.y), planar.y)
            }
            Shape::LineSegment { half_length } => {
                Vec3::new(0.0, 0.0, half_length.copysign(direction.z))
            }
        }
    }

    /// Tight local-frame bounds of the unrotated shape.
    pub fn local_bounds(&self) -> Aabb {
        match *self {
            Shape::Sphere { radius } => Aabb::from_center_half_extents(Vec3::ZERO, Vec3::splat(radius)),
            Shape::Box { half_extents } => Aabb::from_center_half_extents(Vec3::ZERO, half_extents),
            Shape::Capsule {
                radius,
                inner_half_height,
            } => Aabb::from_center_half_extents(
                Vec3::ZERO,
                Vec3::new(radius, radius + inner_half_height, radius),
            ),
            Shape::Cylinder {
                radius,
                half_height,
            }
            | Shape::Cone {
                radius,
                half_height,
            } => Aabb::from_center_half_extents(Vec3::ZERO, Vec3::new(radius, half_height, radius)),
            Shape::Pyramid {
                half_base,
                half_height,
            } => Aabb::from_center_half_extents(
                Vec3::ZERO,
                Vec3::new(half_base.x, half_height, half_base.y),
            ),
            Shape::Sweep {
                radius,
                range,
                half_height,
            } => {
                let half_width = if range.y > 0.0 { radius * range.x } else { radius };
                let min_z = if range.y > 0.0 { 0.0 } else { radius * range.y };
                Aabb::new(
                    Vec3::new(-half_width, -half_height, min_z),
                    Vec3::new(half_width, half_height, radius),
                )
            }
            Shape::LineSegment { half_length } => {
                Aabb::from_center_half_extents(Vec3::ZERO, Vec3::new(0.0, 0.0, half_length))
            }
        }
    }

    /// Bounds of the shape rotated by `rotation`, relative to its center.
    ///
    /// Spheres and capsules are bounded exactly; everything else projects
    /// its local box through the absolute rotation matrix.
    pub fn bounding_box(&self, rotation: Quat) -> Aabb {
        match *self {
            Shape::Sphere { .. } => self.local_bounds(),
            Shape::Capsule {
                radius,
                inner_half_height,
            } => {
                let axis = (rotation * Vec3::Y).abs() * inner_half_height;
                Aabb::from_center_half_extents(Vec3::ZERO, axis + Vec3::splat(radius))
            }
            _ => self.local_bounds().rotated(&Mat3::from_quat(rotation)),
        }
    }

    pub fn half_extents(&self) -> Vec3 {
        self.local_bounds().half_extents()
    }

    /// Smallest half extent of the local bounds, the fast-mover threshold.
    pub fn min_half_extent(&self) -> f32 {
        self.half_extents().min_element()
    }

    /// Solid inertia tensor about the shape center.
    pub fn inertia(&self, mass: f32) -> Mat3 {
        match *self {
            Shape::Sphere { radius } => Mat3::from_diagonal(Vec3::splat(0.4 * mass * radius * radius)),
            Shape::Box { half_extents } => box_inertia(half_extents, mass),
            Shape::Capsule {
                radius,
                inner_half_height,
            } => {
                let height = inner_half_height * 2.0;
                let cylinder_mass = mass * 0.6;
                let sphere_mass = (mass - cylinder_mass) * 0.5;
                let side = (1.0 / 12.0) * cylinder_mass * (3.0 * radius * radius + height * height);
                let cylinder = Mat3::from_diagonal(Vec3::new(
                    side,
                    0.5 * cylinder_mass * radius * radius,
                    side,
                ));
                cylinder + Mat3::from_diagonal(Vec3::splat(0.4 * sphere_mass * radius * radius))
            }
            Shape::Cylinder {
                radius,
                half_height,
            }
            | Shape::Sweep {
                radius,
                half_height,
                ..
            } => {
                let height = half_height * 2.0;
                let side = mass * (3.0 * radius * radius + height * height) / 12.0;
                Mat3::from_diagonal(Vec3::new(side, 0.5 * mass * radius * radius, side))
            }
            Shape::Cone {
                radius,
                half_height,
            } => {
                let height = half_height * 2.0;
                let side = 3.0 / 80.0 * mass * (4.0 * radius * radius + height * height);
                Mat3::from_diagonal(Vec3::new(side, 0.3 * mass * radius * radius, side))
            }
            Shape::Pyramid {
                half_base,
                half_height,
            } => box_inertia(Vec3::new(half_base.x, half_height, half_base.y), mass) * 0.6,
            Shape::LineSegment { half_length } => {
                let rod = mass * (half_length * 2.0).powi(2) / 12.0;
                Mat3::from_diagonal(Vec3::new(rod, rod, rod * 0.01))
            }
        }
    }
}

/// A shape posed in world space: `position` is the shape center.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlacedShape {
    pub shape: Shape,
    pub position: Vec3,
    pub rotation: Quat,
}

impl PlacedShape {
    pub fn new(shape: Shape, position: Vec3, rotation: Quat) -> Self {
        Self {
            shape,
            position,
            rotation,
        }
    }

    pub fn world_bounds(&self) -> Aabb {
        self.shape.bounding_box(self.rotation).translated(self.position)
    }
}

impl SupportMap for PlacedShape {
    fn support(&self, direction: Vec3) -> Vec3 {
        let local = self.rotation.conjugate() * direction;
        self.position + self.rotation * self.shape.support(local)
    }
}

fn signed(direction: Vec3, half_extents: Vec3) -> Vec3 {
    Vec3::new(
        if direction.x >= 0.0 { half_extents.x } else { -half_extents.x },
        if direction.y >= 0.0 { half_extents.y } else { -half_extents.y },
        if direction.z >= 0.0 { half_extents.z } else { -half_extents.z },
    )
}

/// Support of a circular sector (apex at the origin, opening toward +Y of
/// the planar frame, which is local +Z).
fn sector_support(direction: Vec2, radius: f32, range: Vec2) -> Vec2 {
    let dir = direction.normalize_or_zero();
    if dir == Vec2::ZERO {
        return Vec2::ZERO;
    }
    if dir.y >= range.y {
        return dir * radius;
    }

    let left = Vec2::new(-range.x, range.y) * radius;
    let right = Vec2::new(range.x, range.y) * radius;
    let best = if left.dot(dir) > right.dot(dir) { left } else { right };
    if best.dot(dir) > 0.0 {
        best
    } else {
        Vec2::ZERO
    }
}

fn box_inertia(half_extents: Vec3, mass: f32) -> Mat3 {
    let size = half_extents * 2.0;
    let factor = mass / 12.0;
    Mat3::from_diagonal(Vec3::new(
        factor * (size.y * size.y + size.z * size.z),
        factor * (size.x * size.x + size.z * size.z),
        factor * (size.x * size.x + size.y * size.y),
    ))
}
