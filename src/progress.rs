//! Optional progress reporting for long materialization and write runs.
//!
//! The engines push `(workplanes_done, workplanes_total)` after every plane
//! they materialize or append.  Reporting is strictly best-effort: sinks
//! cannot fail and cannot cancel the operation — callers that need early
//! abort drive `get_work_plane` themselves and simply stop issuing calls.

/// Receives monotonically increasing workplane counters.
pub trait ProgressSink {
    fn update(&mut self, workplanes_done: usize, workplanes_total: usize);
}

impl<F: FnMut(usize, usize)> ProgressSink for F {
    fn update(&mut self, workplanes_done: usize, workplanes_total: usize) {
        self(workplanes_done, workplanes_total);
    }
}
