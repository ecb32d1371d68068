use super::{PressureSample, StageCounts, StageName};

/// Receives observations about a running pipeline.
///
/// Called from the stage tasks themselves, so implementations must be cheap and must
/// never block. Observers see the pipeline; they cannot steer it.
pub trait Observer: Send + Sync {
    /// Buffer occupancy of `stage` after it took an input or emitted an output.
    fn on_pressure(&self, _stage: StageName, _sample: PressureSample) {}

    /// Updated totals for `stage`.
    fn on_progress(&self, _stage: StageName, _counts: StageCounts) {}

    /// `stage` has drained its input and finished.
    fn on_stage_done(&self, _stage: StageName) {}

    /// Remaining query quota as last reported by the upstream API.
    fn on_rate_limit(&self, _stage: StageName, _remaining: u64) {}
}

/// An observer that ignores everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl Observer for NoopObserver {}
