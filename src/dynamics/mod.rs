//! Motion integration and contact response.

pub mod friction;
pub mod integrator;
pub mod solver;

pub use friction::{project_velocity, solve_tangent_impulses};
pub use integrator::Integrator;
pub use solver::{relative_velocity, ContactSolver, RESTITUTION_THRESHOLD};
