use glam::Vec3;

use crate::collision::{
    epa::{epa_solve_swept, SweptResult},
    gjk::{gjk_check_for_overlap, Simplex, SupportMap},
};

/// Convex hull of a shape over a straight-line displacement.
#[derive(Debug, Clone, Copy)]
pub struct SweptSupport<S> {
    pub shape: S,
    pub sweep: Vec3,
}

impl<S: SupportMap> SweptSupport<S> {
    pub fn new(shape: S, sweep: Vec3) -> Self {
        Self { shape, sweep }
    }
}

impl<S: SupportMap> SupportMap for SweptSupport<S> {
    fn support(&self, direction: Vec3) -> Vec3 {
        let point = self.shape.support(direction);
        if self.sweep.dot(direction) > 0.0 {
            point + self.sweep
        } else {
            point
        }
    }
}

/// An object tunnels when it travels further in one tick than its thinnest
/// half extent.
pub fn is_fast_mover(displacement: Vec3, min_half_extent: f32) -> bool {
    displacement.length_squared() > min_half_extent * min_half_extent
}

/// First contact of `moving` (at its start pose) travelling by `sweep`
/// against the static `target`.
///
/// Returns `None` when the swept hull misses `target` or when the two
/// already interpenetrate before the move. A start that only touches
/// reports a time of impact of zero.
pub fn time_of_impact(
    target: &impl SupportMap,
    moving: &impl SupportMap,
    sweep: Vec3,
    simplex: &mut Simplex,
) -> Option<SweptResult> {
    let swept = SweptSupport::new(moving, sweep);
    if !gjk_check_for_overlap(target, &swept, sweep, simplex) {
        return None;
    }
    epa_solve_swept(simplex, target, &swept, sweep)
}
