//! Stage abstraction and the coordinator that wires stages together.
//!
//! # Implementation Model
//!
//! A pipeline is a [`Source`], any number of [`Stage`]s, and a [`Sink`]. Each runs as
//! its own tokio task and they are connected by bounded channels whose capacity is the
//! high-water mark configured for the producing stage. A stage takes one input at a
//! time from its [`Inlet`] and hands zero or more outputs to its [`Outlet`]. Sending
//! on a full outlet suspends the stage, so a slow consumer stalls its producers all the
//! way back to the source; no stage ever holds more than its buffer plus the record it
//! is working on.
//!
//! Observation is a side channel: every stage reports [`PressureSample`]s and
//! [`StageCounts`] to an [`Observer`]. Observers never influence flow.
//!
//! The [`Pipeline`] builder spawns the tasks and [`Pipeline::finish`] waits for them.
//! The first fatal error wins: the remaining stages are aborted, the sink is allowed
//! to close its output, and the error is returned naming the stage that failed.

mod channel;
mod coordinator;
mod observer;
mod progress;
mod tracker;

pub use channel::{Inlet, Outlet, bounded};
pub use coordinator::{Pipeline, PipelineSummary};
pub use observer::{NoopObserver, Observer};
pub use progress::Progress;
pub use tracker::PipelineTracker;

use crate::Result;
use serde::Serialize;
use strum::{Display, IntoStaticStr};

/// Identifies a pipeline stage in progress reports and error messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display, IntoStaticStr, Serialize)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum StageName {
    Dependents,
    Relevance,
    Refs,
    Archive,
    UsageFiles,
    UsageCode,
    Sink,
}

impl StageName {
    /// All stages in pipeline order.
    #[must_use]
    pub const fn all() -> [Self; 7] {
        [
            Self::Dependents,
            Self::Relevance,
            Self::Refs,
            Self::Archive,
            Self::UsageFiles,
            Self::UsageCode,
            Self::Sink,
        ]
    }

    const fn index(self) -> usize {
        self as usize
    }
}

/// Instantaneous buffer occupancy of a stage, each fraction in `0.0..=1.0`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PressureSample {
    /// How full the stage's output buffer is.
    pub readable_fraction: f64,

    /// How full the stage's input buffer is.
    pub writable_fraction: f64,
}

impl PressureSample {
    #[must_use]
    pub fn new(readable_fraction: f64, writable_fraction: f64) -> Self {
        Self {
            readable_fraction: readable_fraction.clamp(0.0, 1.0),
            writable_fraction: writable_fraction.clamp(0.0, 1.0),
        }
    }
}

/// Running totals for one stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct StageCounts {
    /// Inputs taken from the inlet.
    pub received: u64,

    /// Outputs handed to the outlet.
    pub emitted: u64,

    /// Inputs the stage gave up on without failing, such as vanished repositories or unreadable archives.
    pub skipped: u64,
}

/// A pipeline stage: turns each input into zero or more outputs.
///
/// Implementations process one input at a time. Outputs must be sent in the order they
/// are produced; [`Outlet::send`] suspends while the downstream buffer is full.
pub trait Stage: Send + 'static {
    type In: Send + 'static;
    type Out: Send + 'static;

    fn name(&self) -> StageName;

    /// Process a single input.
    ///
    /// Returning an error terminates the whole pipeline. Per-record problems that should
    /// not do that must be handled inside the stage.
    fn process(&mut self, item: Self::In, outlet: &Outlet<Self::Out>) -> impl Future<Output = Result<()>> + Send;
}

/// The first stage of a pipeline; produces records without consuming any.
pub trait Source: Send + 'static {
    type Out: Send + 'static;

    fn name(&self) -> StageName;

    /// Produce every record, returning once the source is exhausted.
    fn run(self, outlet: &Outlet<Self::Out>) -> impl Future<Output = Result<()>> + Send;
}

/// The last stage of a pipeline; consumes records until its inlet closes.
pub trait Sink: Send + 'static {
    type In: Send + 'static;

    fn name(&self) -> StageName;

    /// Consume records until the inlet is closed, returning how many were consumed.
    fn consume(self, inlet: Inlet<Self::In>) -> impl Future<Output = Result<u64>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_names_are_kebab_case() {
        assert_eq!(StageName::UsageFiles.to_string(), "usage-files");
        assert_eq!(StageName::Refs.to_string(), "refs");
    }

    #[test]
    fn test_stage_order_matches_index() {
        for (i, stage) in StageName::all().into_iter().enumerate() {
            assert_eq!(stage.index(), i);
        }
    }

    #[test]
    fn test_pressure_sample_is_clamped() {
        let sample = PressureSample::new(1.5, -0.25);
        assert!((sample.readable_fraction - 1.0).abs() < f64::EPSILON);
        assert!(sample.writable_fraction.abs() < f64::EPSILON);
    }
}
