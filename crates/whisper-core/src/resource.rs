//! Resource bounds: the trampoline calls [`ResourceTracker::on_step`] once
//! per `Step`/`Resolve` invocation (`spec.md` §5) and
//! [`ResourceTracker::on_call`] once per scripted-function activation, and
//! turns the first `Err` it sees into the trampoline's own `Error` result.
//! Grounded on the teacher's `ResourceTracker` trait, scaled down to the
//! two bounds this interpreter actually needs: total step count and
//! applicative-call recursion depth.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceError {
    StepLimit { limit: u64, count: u64 },
    RecursionLimit { limit: usize, depth: usize },
}

impl fmt::Display for ResourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceError::StepLimit { limit, count } => {
                write!(f, "step limit exceeded: {count} steps taken, limit was {limit}")
            }
            ResourceError::RecursionLimit { limit, depth } => {
                write!(f, "recursion limit exceeded: depth {depth}, limit was {limit}")
            }
        }
    }
}

impl std::error::Error for ResourceError {}

pub trait ResourceTracker: fmt::Debug {
    fn on_step(&mut self) -> Result<(), ResourceError>;
    fn on_call(&mut self, depth: usize) -> Result<(), ResourceError>;
}

/// The default: no bound ever trips. What a host embedding this
/// interpreter gets unless it opts into [`StepLimitTracker`].
#[derive(Debug, Clone, Copy, Default)]
pub struct NoLimitTracker;

impl ResourceTracker for NoLimitTracker {
    fn on_step(&mut self) -> Result<(), ResourceError> {
        Ok(())
    }

    fn on_call(&mut self, _depth: usize) -> Result<(), ResourceError> {
        Ok(())
    }
}

/// Bounds total steps taken and applicative-call nesting depth.
#[derive(Debug, Clone, Copy)]
pub struct StepLimitTracker {
    max_steps: u64,
    max_depth: usize,
    steps_taken: u64,
}

impl StepLimitTracker {
    pub fn new(max_steps: u64, max_depth: usize) -> StepLimitTracker {
        StepLimitTracker {
            max_steps,
            max_depth,
            steps_taken: 0,
        }
    }
}

impl ResourceTracker for StepLimitTracker {
    fn on_step(&mut self) -> Result<(), ResourceError> {
        self.steps_taken += 1;
        if self.steps_taken > self.max_steps {
            return Err(ResourceError::StepLimit {
                limit: self.max_steps,
                count: self.steps_taken,
            });
        }
        Ok(())
    }

    fn on_call(&mut self, depth: usize) -> Result<(), ResourceError> {
        if depth > self.max_depth {
            return Err(ResourceError::RecursionLimit {
                limit: self.max_depth,
                depth,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_limit_tracker_never_fails() {
        let mut tracker = NoLimitTracker;
        for _ in 0..10_000 {
            tracker.on_step().unwrap();
        }
        tracker.on_call(10_000).unwrap();
    }

    #[test]
    fn step_limit_trips_once_exceeded() {
        let mut tracker = StepLimitTracker::new(3, 100);
        tracker.on_step().unwrap();
        tracker.on_step().unwrap();
        tracker.on_step().unwrap();
        assert!(tracker.on_step().is_err());
    }

    #[test]
    fn recursion_limit_trips_once_exceeded() {
        let mut tracker = StepLimitTracker::new(1_000, 2);
        tracker.on_call(1).unwrap();
        tracker.on_call(2).unwrap();
        assert!(tracker.on_call(3).is_err());
    }
}
