//! Support utilities: handles and arenas, math helpers, logging and
//! per-tick profiling.

pub mod allocator;
pub mod logging;
pub mod math;
pub mod profiling;
