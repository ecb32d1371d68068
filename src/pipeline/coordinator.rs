use super::channel::Counters;
use super::{Inlet, Observer, Outlet, PressureSample, Sink, Source, Stage, StageCounts, StageName, bounded};
use crate::Result;
use core::sync::atomic::{AtomicU64, Ordering};
use ohno::{EnrichableExt, app_err};
use serde::Serialize;
use std::sync::Arc;
use tokio::task::{AbortHandle, JoinSet};

const LOG_TARGET: &str = "  pipeline";

const NO_QUOTA: u64 = u64::MAX;

/// Builder and runner for a linear pipeline ending in records of type `T`.
///
/// Each call spawns the stage immediately, so a pipeline must be built inside a tokio runtime.
pub struct Pipeline<T> {
    tasks: JoinSet<(StageName, Result<()>)>,
    handles: Vec<(StageName, AbortHandle)>,
    counters: Vec<(StageName, Arc<Counters>)>,
    inlet: Inlet<T>,
    monitor: Arc<Monitor>,
}

impl<T> core::fmt::Debug for Pipeline<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let stages: Vec<_> = self.handles.iter().map(|(name, _)| *name).collect();
        f.debug_struct("Pipeline").field("stages", &stages).finish_non_exhaustive()
    }
}

impl<T: Send + 'static> Pipeline<T> {
    /// Start a pipeline with `source`, buffering up to `capacity` of its records.
    #[must_use]
    pub fn from_source<S>(source: S, capacity: usize, observer: Arc<dyn Observer>) -> Self
    where
        S: Source<Out = T>,
    {
        let monitor = Arc::new(Monitor {
            inner: observer,
            remaining: AtomicU64::new(NO_QUOTA),
        });

        let name = source.name();
        let (outlet, inlet) = bounded(name, capacity, Arc::clone(&monitor) as Arc<dyn Observer>);

        let mut pipeline = Self {
            tasks: JoinSet::new(),
            handles: Vec::new(),
            counters: Vec::new(),
            inlet,
            monitor,
        };

        pipeline.counters.push((name, outlet.counters()));
        let handle = pipeline.tasks.spawn(async move {
            let result = source.run(&outlet).await;
            (name, settle(&outlet, result))
        });
        pipeline.handles.push((name, handle));

        pipeline
    }

    /// Append `stage`, buffering up to `capacity` of its output records.
    #[must_use]
    pub fn then<S>(self, mut stage: S, capacity: usize) -> Pipeline<S::Out>
    where
        S: Stage<In = T>,
    {
        let Self {
            mut tasks,
            mut handles,
            mut counters,
            inlet: mut upstream,
            monitor,
        } = self;

        let name = stage.name();
        let (outlet, inlet) = bounded(name, capacity, Arc::clone(&monitor) as Arc<dyn Observer>);
        counters.push((name, outlet.counters()));

        let handle = tasks.spawn(async move {
            while let Some(item) = upstream.recv().await {
                outlet.record_received(upstream.occupancy());
                if let Err(e) = stage.process(item, &outlet).await {
                    return (name, settle(&outlet, Err(e)));
                }
            }

            (name, settle(&outlet, Ok(())))
        });
        handles.push((name, handle));

        Pipeline {
            tasks,
            handles,
            counters,
            inlet,
            monitor,
        }
    }

    /// Attach `sink` and run the pipeline to completion.
    ///
    /// On the first fatal error every other stage is aborted, the sink is left to close
    /// its output, and the error is returned naming the failing stage.
    pub async fn finish<K>(self, sink: K) -> Result<PipelineSummary>
    where
        K: Sink<In = T>,
    {
        let Self {
            mut tasks,
            handles,
            counters,
            inlet,
            monitor,
        } = self;

        let sink_name = sink.name();
        let sink_monitor = Arc::clone(&monitor);
        let records_written = Arc::new(AtomicU64::new(0));
        let written = Arc::clone(&records_written);
        let _ = tasks.spawn(async move {
            match sink.consume(inlet).await {
                Ok(count) => {
                    written.store(count, Ordering::Relaxed);
                    sink_monitor.on_stage_done(sink_name);
                    (sink_name, Ok(()))
                }
                Err(e) => (sink_name, Err(e.enrich_with(|| format!("stage '{sink_name}' failed")))),
            }
        });

        let name_of = |id| {
            handles
                .iter()
                .find(|(_, handle)| handle.id() == id)
                .map_or(sink_name, |(name, _)| *name)
        };

        let mut first_error = None;
        while let Some(joined) = tasks.join_next_with_id().await {
            let (name, result) = match joined {
                Ok((_, outcome)) => outcome,
                Err(e) if e.is_cancelled() => continue,
                Err(e) => {
                    let name = name_of(e.id());
                    (name, Err(app_err!("stage '{name}' panicked: {e}")))
                }
            };

            let Err(e) = result else {
                log::debug!(target: LOG_TARGET, "Stage '{name}' completed");
                continue;
            };

            if first_error.is_some() {
                log::debug!(target: LOG_TARGET, "Ignoring later failure of stage '{name}': {e:#}");
                continue;
            }

            log::error!(target: LOG_TARGET, "Stage '{name}' failed, tearing down the pipeline: {e:#}");
            first_error = Some(e);

            // Stages go; the sink stays so it can close its output once its inlet closes.
            for (_, handle) in &handles {
                handle.abort();
            }
        }

        if let Some(e) = first_error {
            return Err(e);
        }

        let remaining = monitor.remaining.load(Ordering::Relaxed);
        Ok(PipelineSummary {
            stages: counters.iter().map(|(name, c)| (*name, c.snapshot())).collect(),
            records_written: records_written.load(Ordering::Relaxed),
            remaining_quota: (remaining != NO_QUOTA).then_some(remaining),
        })
    }
}

/// Turn a stage's outcome into the result reported to the coordinator.
fn settle<T>(outlet: &Outlet<T>, result: Result<()>) -> Result<()> {
    let stage = outlet.stage();
    match result {
        Ok(()) => {
            outlet.observer().on_stage_done(stage);
            Ok(())
        }

        // Whoever closed the downstream already reported, or is about to report, the real failure.
        Err(e) if outlet.is_closed() => {
            log::debug!(target: LOG_TARGET, "Stage '{stage}' stopping, downstream is gone: {e:#}");
            Ok(())
        }

        Err(e) => Err(e.enrich_with(|| format!("stage '{stage}' failed"))),
    }
}

/// Forwards observations and remembers the last quota report for the summary.
struct Monitor {
    inner: Arc<dyn Observer>,
    remaining: AtomicU64,
}

impl Observer for Monitor {
    fn on_pressure(&self, stage: StageName, sample: PressureSample) {
        self.inner.on_pressure(stage, sample);
    }

    fn on_progress(&self, stage: StageName, counts: StageCounts) {
        self.inner.on_progress(stage, counts);
    }

    fn on_stage_done(&self, stage: StageName) {
        self.inner.on_stage_done(stage);
    }

    fn on_rate_limit(&self, stage: StageName, remaining: u64) {
        self.remaining.store(remaining, Ordering::Relaxed);
        self.inner.on_rate_limit(stage, remaining);
    }
}

/// Totals gathered from a completed pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineSummary {
    /// Counts for every stage except the sink, in pipeline order.
    pub stages: Vec<(StageName, StageCounts)>,

    /// Records the sink wrote.
    pub records_written: u64,

    /// Query quota left according to the last rate-limit report, if any was made.
    pub remaining_quota: Option<u64>,
}

impl PipelineSummary {
    /// Counts for `stage`, or zeroes when the pipeline had no such stage.
    #[must_use]
    pub fn counts(&self, stage: StageName) -> StageCounts {
        self.stages
            .iter()
            .find(|(name, _)| *name == stage)
            .map(|(_, counts)| *counts)
            .unwrap_or_default()
    }

    /// Repositories the ref resolver could not find.
    #[must_use]
    pub fn skipped_repositories(&self) -> u64 {
        self.counts(StageName::Refs).skipped
    }

    /// Repositories whose archive could not be fetched or opened.
    #[must_use]
    pub fn failed_archives(&self) -> u64 {
        self.counts(StageName::Archive).skipped
    }
}
