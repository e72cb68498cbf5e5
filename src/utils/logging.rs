use std::time::{Duration, Instant};

use log::{log_enabled, trace, warn, Level};

/// Emits a `trace!` line with the elapsed time of a labelled section when
/// dropped. Does not read the clock unless trace logging is enabled.
pub struct TraceSpan {
    label: &'static str,
    start: Option<Instant>,
}

impl TraceSpan {
    pub fn new(label: &'static str) -> Self {
        let start = log_enabled!(Level::Trace).then(Instant::now);
        Self { label, start }
    }
}

impl Drop for TraceSpan {
    fn drop(&mut self) {
        if let Some(start) = self.start {
            trace!("{} took {} µs", self.label, start.elapsed().as_micros());
        }
    }
}

/// Warns when a tick ran longer than `budget_ms`.
pub fn warn_if_tick_budget_exceeded(tick: u64, duration: Duration, budget_ms: f32) {
    let elapsed_ms = duration.as_secs_f32() * 1000.0;
    if elapsed_ms > budget_ms {
        warn!("tick {tick} exceeded budget: {elapsed_ms:.2} ms > {budget_ms:.2} ms");
    }
}
