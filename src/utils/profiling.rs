use std::time::{Duration, Instant};

use log::debug;

/// Timings and counters for a single scene tick.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct TickProfile {
    pub integrate_time: Duration,
    pub broad_phase_time: Duration,
    pub narrow_phase_time: Duration,
    pub solve_time: Duration,
    pub static_mesh_time: Duration,
    pub total_time: Duration,

    pub object_count: usize,
    pub active_count: usize,
    pub candidate_pairs: usize,
    pub contact_count: usize,
    pub swept_count: usize,
    pub snap_backs: usize,
}

impl TickProfile {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Logs the profile at debug level.
    pub fn report(&self) {
        let total_us = self.total_time.as_micros() as f32;
        if total_us < 1.0 {
            return;
        }
        let share = |phase: Duration| phase.as_micros() as f32 / total_us * 100.0;

        debug!(
            "tick {:.3} ms | objects {} (active {}) pairs {} contacts {} swept {} snapped {}",
            self.total_time.as_secs_f32() * 1000.0,
            self.object_count,
            self.active_count,
            self.candidate_pairs,
            self.contact_count,
            self.swept_count,
            self.snap_backs,
        );
        debug!(
            "integrate {:.1}% broad {:.1}% narrow {:.1}% solve {:.1}% mesh {:.1}%",
            share(self.integrate_time),
            share(self.broad_phase_time),
            share(self.narrow_phase_time),
            share(self.solve_time),
            share(self.static_mesh_time),
        );
    }
}

/// Adds the time between construction and drop to `output`.
pub struct ScopedTimer<'a> {
    start: Instant,
    output: &'a mut Duration,
}

impl<'a> ScopedTimer<'a> {
    pub fn new(output: &'a mut Duration) -> Self {
        Self {
            start: Instant::now(),
            output,
        }
    }
}

impl Drop for ScopedTimer<'_> {
    fn drop(&mut self) {
        *self.output += self.start.elapsed();
    }
}
