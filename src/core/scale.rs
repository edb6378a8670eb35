//! Worker-count scaling policies.
//!
//! The growth trigger is a pluggable seam: only the on-demand behavior
//! (grow by one when a submission finds no idle worker and the pool is
//! below its cap) is implemented. No shrink policy exists; workers stay
//! alive until the pool terminates.

/// Load observed by the dispatcher when deciding whether to grow.
#[derive(Debug, Clone, Copy)]
pub struct LoadSnapshot {
    /// Workers currently idle
    pub idle_workers: usize,
    /// Workers currently alive
    pub active_workers: usize,
    /// Tasks waiting in the pending queue
    pub queued_tasks: usize,
    /// Configured upper bound on pool size
    pub max_workers: usize,
}

/// Decides whether the pool should spawn another worker.
pub trait ScalePolicy: Send + Sync {
    /// Called by the dispatcher when a task cannot be assigned
    /// immediately. Returning true grows the pool by one worker.
    fn should_grow(&self, load: &LoadSnapshot) -> bool;
}

/// Never grows; the pool keeps its initial worker count.
#[derive(Debug, Default)]
pub struct FixedScale;

impl ScalePolicy for FixedScale {
    fn should_grow(&self, _load: &LoadSnapshot) -> bool {
        false
    }
}

/// Grows by one worker whenever demand outstrips idle capacity and the
/// pool is below `max_workers`.
#[derive(Debug, Default)]
pub struct OnDemandScale;

impl ScalePolicy for OnDemandScale {
    fn should_grow(&self, load: &LoadSnapshot) -> bool {
        load.idle_workers == 0 && load.active_workers < load.max_workers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_never_grows() {
        let load = LoadSnapshot {
            idle_workers: 0,
            active_workers: 1,
            queued_tasks: 100,
            max_workers: 8,
        };
        assert!(!FixedScale.should_grow(&load));
    }

    #[test]
    fn test_on_demand_grows_below_cap() {
        let mut load = LoadSnapshot {
            idle_workers: 0,
            active_workers: 2,
            queued_tasks: 1,
            max_workers: 4,
        };
        assert!(OnDemandScale.should_grow(&load));

        load.active_workers = 4;
        assert!(!OnDemandScale.should_grow(&load));

        load.active_workers = 2;
        load.idle_workers = 1;
        assert!(!OnDemandScale.should_grow(&load));
    }
}
