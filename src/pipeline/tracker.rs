//! Turns pipeline observations into a one-line status display.

use super::{Observer, PressureSample, Progress, StageCounts, StageName};
use core::sync::atomic::{AtomicU8, AtomicU16, AtomicU64, Ordering};
use owo_colors::OwoColorize;
use std::sync::Arc;

const STAGE_COUNT: usize = StageName::all().len();
const NO_QUOTA: u64 = u64::MAX;

/// Visual status of a stage, controlling its color in the status line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
enum StageStatus {
    /// Normal active state (default color).
    Active = 0,
    /// Output buffer is full, waiting on downstream (blinks yellow).
    Blocked = 1,
    /// Input drained (green).
    Done = 2,
}

#[derive(Debug, Default)]
struct StageGauge {
    emitted: AtomicU64,
    skipped: AtomicU64,
    status: AtomicU8,

    // Buffer occupancy in per-mille
    readable: AtomicU16,
    writable: AtomicU16,
}

#[derive(Debug)]
struct Gauges {
    stages: [StageGauge; STAGE_COUNT],
    remaining_quota: AtomicU64,
}

/// An [`Observer`] that renders stage counts, buffer pressure, and the remaining query quota
/// through a [`Progress`] implementation.
#[derive(Clone)]
pub struct PipelineTracker {
    gauges: Arc<Gauges>,
    progress: Arc<dyn Progress>,
}

impl core::fmt::Debug for PipelineTracker {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PipelineTracker")
            .field("gauges", &self.gauges)
            .field("progress", &"<dyn Progress>")
            .finish()
    }
}

impl PipelineTracker {
    #[must_use]
    pub fn new(progress: &Arc<dyn Progress>) -> Self {
        let gauges = Arc::new(Gauges {
            stages: Default::default(),
            remaining_quota: AtomicU64::new(NO_QUOTA),
        });

        let gauges_clone = Arc::clone(&gauges);
        let use_colors = progress.use_colors();
        progress.set_status(Box::new(move || Self::status_line(&gauges_clone, use_colors)));

        Self {
            gauges,
            progress: Arc::clone(progress),
        }
    }

    /// Print a message line without disrupting the status line.
    pub fn println(&self, msg: &str) {
        self.progress.println(msg);
    }

    fn status_line(gauges: &Gauges, use_colors: bool) -> String {
        // Toggle every 500ms for the blink effect on blocked stages
        let blink_on = use_colors && {
            let ms = std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_millis();
            (ms / 500).is_multiple_of(2)
        };

        let mut parts = Vec::with_capacity(STAGE_COUNT);
        for stage in StageName::all() {
            let gauge = &gauges.stages[stage.index()];
            let emitted = gauge.emitted.load(Ordering::Relaxed);
            let skipped = gauge.skipped.load(Ordering::Relaxed);
            let status = gauge.status.load(Ordering::Relaxed);

            if emitted == 0 && skipped == 0 && status != StageStatus::Done as u8 {
                continue;
            }

            let mut text = format!("{emitted} {stage}");
            if skipped > 0 {
                text.push_str(&format!(" ({skipped} skipped)"));
            }

            if stage == StageName::Refs {
                let quota = gauges.remaining_quota.load(Ordering::Relaxed);
                if quota != NO_QUOTA {
                    text.push_str(&format!(" [quota {quota}]"));
                }
            }

            let styled = if use_colors && status == StageStatus::Done as u8 {
                format!("{}", text.green())
            } else if status == StageStatus::Blocked as u8 && blink_on {
                format!("{}", text.yellow())
            } else {
                text
            };

            parts.push(styled);
        }

        if parts.is_empty() {
            "Starting".to_string()
        } else {
            parts.join(", ")
        }
    }

    /// Latest output and input buffer occupancy reported by `stage`.
    #[must_use]
    pub fn pressure(&self, stage: StageName) -> PressureSample {
        let gauge = &self.gauges.stages[stage.index()];
        PressureSample::new(
            f64::from(gauge.readable.load(Ordering::Relaxed)) / 1000.0,
            f64::from(gauge.writable.load(Ordering::Relaxed)) / 1000.0,
        )
    }
}

impl Observer for PipelineTracker {
    #[expect(clippy::cast_possible_truncation, clippy::cast_sign_loss, reason = "fractions are clamped to 0..=1")]
    fn on_pressure(&self, stage: StageName, sample: PressureSample) {
        let gauge = &self.gauges.stages[stage.index()];
        gauge.readable.store((sample.readable_fraction * 1000.0) as u16, Ordering::Relaxed);
        gauge.writable.store((sample.writable_fraction * 1000.0) as u16, Ordering::Relaxed);

        let status = gauge.status.load(Ordering::Relaxed);
        if status != StageStatus::Done as u8 {
            let next = if sample.readable_fraction >= 1.0 {
                StageStatus::Blocked
            } else {
                StageStatus::Active
            };
            gauge.status.store(next as u8, Ordering::Relaxed);
        }
    }

    fn on_progress(&self, stage: StageName, counts: StageCounts) {
        let gauge = &self.gauges.stages[stage.index()];
        gauge.emitted.store(counts.emitted, Ordering::Relaxed);
        gauge.skipped.store(counts.skipped, Ordering::Relaxed);
    }

    fn on_stage_done(&self, stage: StageName) {
        self.gauges.stages[stage.index()]
            .status
            .store(StageStatus::Done as u8, Ordering::Relaxed);
    }

    fn on_rate_limit(&self, _stage: StageName, remaining: u64) {
        self.gauges.remaining_quota.store(remaining, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct CapturingProgress {
        callback: Mutex<Option<Box<dyn Fn() -> String + Send + Sync>>>,
    }

    impl CapturingProgress {
        fn render(&self) -> String {
            (self.callback.lock().unwrap().as_ref().unwrap())()
        }
    }

    impl Progress for CapturingProgress {
        fn set_phase(&self, _phase: &str) {}
        fn set_status(&self, callback: Box<dyn Fn() -> String + Send + Sync + 'static>) {
            *self.callback.lock().unwrap() = Some(callback);
        }
        fn println(&self, _msg: &str) {}
        fn done(&self) {}
        fn use_colors(&self) -> bool {
            false
        }
    }

    fn tracker() -> (PipelineTracker, Arc<CapturingProgress>) {
        let progress = Arc::new(CapturingProgress::default());
        let tracker = PipelineTracker::new(&(Arc::clone(&progress) as Arc<dyn Progress>));
        (tracker, progress)
    }

    fn counts(emitted: u64, skipped: u64) -> StageCounts {
        StageCounts {
            received: 0,
            emitted,
            skipped,
        }
    }

    #[test]
    fn test_idle_status() {
        let (_tracker, progress) = tracker();
        assert_eq!(progress.render(), "Starting");
    }

    #[test]
    fn test_status_lists_active_stages_in_order() {
        let (tracker, progress) = tracker();
        tracker.on_progress(StageName::Refs, counts(4, 1));
        tracker.on_progress(StageName::Dependents, counts(10, 0));
        tracker.on_rate_limit(StageName::Refs, 4996);

        assert_eq!(progress.render(), "10 dependents, 4 refs (1 skipped) [quota 4996]");
    }

    #[test]
    fn test_done_stage_is_listed_even_without_output() {
        let (tracker, progress) = tracker();
        tracker.on_stage_done(StageName::Relevance);
        assert_eq!(progress.render(), "0 relevance");
    }

    #[test]
    fn test_pressure_is_recorded() {
        let (tracker, _progress) = tracker();
        tracker.on_pressure(StageName::Archive, PressureSample::new(0.5, 0.25));

        let sample = tracker.pressure(StageName::Archive);
        assert!((sample.readable_fraction - 0.5).abs() < 0.001);
        assert!((sample.writable_fraction - 0.25).abs() < 0.001);
    }
}
