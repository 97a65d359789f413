//! Observability hooks the trampoline calls on its way through a program:
//! one method per notable transition, all `#[inline(always)]` no-ops by
//! default so a tracer that only cares about one event costs nothing at
//! the others. Grounded on the teacher's own `VmTracer` trait.

use crate::exception::ExceptionData;
use crate::frame::EvalResult;
use crate::heap::{HeapId, HeapStats};

/// Observes the frame machine and the collector without participating in
/// either. A tracer never sees a mutable reference to anything it
/// observes — it reports, it does not steer.
pub trait VmTracer {
    #[inline(always)]
    fn on_step(&mut self, _frame: HeapId) {}

    #[inline(always)]
    fn on_resolve(&mut self, _frame: HeapId, _result: &EvalResult) {}

    #[inline(always)]
    fn on_collect(&mut self, _minor: bool, _stats: HeapStats) {}

    #[inline(always)]
    fn on_exception(&mut self, _raising_frame: HeapId, _exception: &ExceptionData) {}
}

/// The zero-cost default: every hook is the trait's own no-op.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTracer;

impl VmTracer for NoopTracer {}

/// Prints one line per hook to stderr, capped at an optional total number
/// of lines so a runaway loop does not flood the terminal.
#[derive(Debug, Clone)]
pub struct StderrTracer {
    limit: Option<usize>,
    count: usize,
    stopped: bool,
}

impl StderrTracer {
    pub fn new() -> StderrTracer {
        StderrTracer {
            limit: None,
            count: 0,
            stopped: false,
        }
    }

    pub fn with_limit(limit: usize) -> StderrTracer {
        StderrTracer {
            limit: Some(limit),
            count: 0,
            stopped: false,
        }
    }

    fn tick(&mut self) -> bool {
        if self.stopped {
            return false;
        }
        self.count += 1;
        if let Some(limit) = self.limit {
            if self.count > limit {
                self.stopped = true;
                eprintln!("[whisper] trace limit ({limit}) reached, silencing further output");
                return false;
            }
        }
        true
    }
}

impl Default for StderrTracer {
    fn default() -> StderrTracer {
        StderrTracer::new()
    }
}

impl VmTracer for StderrTracer {
    fn on_step(&mut self, frame: HeapId) {
        if self.tick() {
            eprintln!("[whisper] step {frame:?}");
        }
    }

    fn on_resolve(&mut self, frame: HeapId, result: &EvalResult) {
        if self.tick() {
            eprintln!("[whisper] resolve {frame:?} -> {result:?}");
        }
    }

    fn on_collect(&mut self, minor: bool, stats: HeapStats) {
        if self.tick() {
            let kind = if minor { "minor" } else { "major" };
            eprintln!("[whisper] {kind} gc: {}/{} slots live", stats.live_objects, stats.total_slots);
        }
    }

    fn on_exception(&mut self, raising_frame: HeapId, exception: &ExceptionData) {
        if self.tick() {
            eprintln!("[whisper] exception at {raising_frame:?}: {} ({})", exception.message, exception.kind);
        }
    }
}
