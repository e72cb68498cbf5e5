//! Collision detection: shapes, the AABB tree, GJK/EPA, swept tests,
//! persistent contacts and ray queries.

pub mod bvh;
pub mod ccd;
pub mod contact;
pub mod epa;
pub mod gjk;
pub mod queries;
pub mod shapes;

pub use bvh::{AabbTree, NodeId};
pub use ccd::{is_fast_mover, time_of_impact, SweptSupport};
pub use contact::{pair_id, ContactConstraint, ContactFrame, ContactId, ContactPoint, ContactPool};
pub use epa::{axis_penetration, epa_solve, epa_solve_swept, EpaResult, SweptResult};
pub use gjk::{gjk_check_for_overlap, Simplex, SupportMap};
pub use queries::{ray_shape, ray_triangle, RaycastHit, RaycastQuery};
pub use shapes::{PlacedShape, Shape, ShapeKind};
