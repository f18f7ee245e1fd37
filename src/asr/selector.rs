// asr/selector.rs
//
// Model-tier selection strategy. The requested tier is a preference, not
// a command: under load, or for very long inputs, a smaller tier bounds
// wall-clock time. A pinned request is always honored verbatim.

use log::info;

use crate::config::ModelTier;

/// Snapshot of the conditions tier selection runs under.
#[derive(Debug, Clone, Copy)]
pub struct LoadContext {
    /// Jobs currently in the processing state across the worker pool.
    pub running_jobs: usize,
    /// Duration of the canonical audio for this job.
    pub input_duration_secs: f64,
}

/// Strategy seam for tier selection, swappable per deployment.
pub trait ModelSelector: Send + Sync {
    fn select(&self, requested: ModelTier, pinned: bool, context: &LoadContext) -> ModelTier;
}

/// Default selector: downgrade one tier when the pool is saturated or the
/// input is long enough that the large tier would blow the stage deadline.
pub struct LoadAwareSelector {
    pub max_jobs_at_full_tier: usize,
    pub long_input_secs: f64,
}

impl Default for LoadAwareSelector {
    fn default() -> Self {
        Self {
            max_jobs_at_full_tier: 4,
            long_input_secs: 2.0 * 3600.0,
        }
    }
}

impl ModelSelector for LoadAwareSelector {
    fn select(&self, requested: ModelTier, pinned: bool, context: &LoadContext) -> ModelTier {
        if pinned {
            return requested;
        }

        let mut selected = requested;
        if context.running_jobs > self.max_jobs_at_full_tier
            || context.input_duration_secs > self.long_input_secs
        {
            if let Some(smaller) = selected.smaller() {
                info!(
                    "Tier downgrade {} -> {} (running_jobs={}, input={:.0}s)",
                    selected.code(),
                    smaller.code(),
                    context.running_jobs,
                    context.input_duration_secs
                );
                selected = smaller;
            }
        }
        selected
    }
}

/// Selector that always returns the requested tier. Useful for
/// deployments with dedicated capacity and in tests.
pub struct FixedSelector;

impl ModelSelector for FixedSelector {
    fn select(&self, requested: ModelTier, _pinned: bool, _context: &LoadContext) -> ModelTier {
        requested
    }
}
