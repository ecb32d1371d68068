use crate::pipeline::Progress;
use core::fmt::{Debug, Formatter};
use core::sync::atomic::{AtomicBool, Ordering};
use core::time::Duration;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::task::JoinHandle;

type StatusCallback = Box<dyn Fn() -> String + Send + Sync>;

/// Status line refresh rate (10 Hz).
const REFRESH_INTERVAL_MS: u64 = 100;

const TEMPLATE: &str = "{prefix:>12.bold.cyan} {spinner:.cyan} {msg}";
const TEMPLATE_NO_COLOR: &str = "{prefix:>12} {spinner} {msg}";
const TICKS: &[&str] = &["-", "\\", "|", "/", " "];

#[derive(Debug)]
struct Visibility {
    visible_after: Instant,
    visible: AtomicBool,
    phase_started: Mutex<Instant>,
}

/// A spinner with a status message that stays hidden for short runs.
#[derive(Clone)]
pub struct ProgressReporter {
    bar: ProgressBar,
    visibility: Arc<Visibility>,
    status: Arc<Mutex<StatusCallback>>,
    refresh_task: Arc<JoinHandle<()>>,
    use_colors: bool,
}

impl ProgressReporter {
    /// Create a reporter that starts drawing once `delay` has elapsed.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn new(delay: Duration, use_colors: bool) -> Self {
        let bar = ProgressBar::hidden();
        let template = if use_colors { TEMPLATE } else { TEMPLATE_NO_COLOR };
        bar.set_style(
            ProgressStyle::default_spinner()
                .template(template)
                .expect("spinner template is valid")
                .tick_strings(TICKS),
        );

        let visibility = Arc::new(Visibility {
            visible_after: Instant::now() + delay,
            visible: AtomicBool::new(false),
            phase_started: Mutex::new(Instant::now()),
        });

        let status = Arc::new(Mutex::new(Box::new(String::new) as StatusCallback));

        Self {
            refresh_task: Arc::new(tokio::spawn(refresh(bar.clone(), Arc::clone(&visibility), Arc::clone(&status)))),
            bar,
            visibility,
            status,
            use_colors,
        }
    }
}

impl Progress for ProgressReporter {
    fn set_phase(&self, phase: &str) {
        self.bar.set_prefix(phase.to_string());
        *self.visibility.phase_started.lock().expect("lock poisoned") = Instant::now();
    }

    fn set_status(&self, callback: Box<dyn Fn() -> String + Send + Sync + 'static>) {
        *self.status.lock().expect("lock poisoned") = callback;
    }

    fn println(&self, msg: &str) {
        self.bar.suspend(|| eprintln!("{msg}"));
    }

    fn done(&self) {
        self.refresh_task.abort();
        if self.visibility.visible.load(Ordering::Relaxed) {
            self.bar.finish_and_clear();
        }
    }

    fn use_colors(&self) -> bool {
        self.use_colors
    }
}

impl Debug for ProgressReporter {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ProgressReporter")
            .field("bar", &self.bar)
            .field("visibility", &self.visibility)
            .field("use_colors", &self.use_colors)
            .finish_non_exhaustive()
    }
}

async fn refresh(bar: ProgressBar, visibility: Arc<Visibility>, status: Arc<Mutex<StatusCallback>>) {
    let mut interval = tokio::time::interval(Duration::from_millis(REFRESH_INTERVAL_MS));
    #[expect(clippy::infinite_loop, reason = "task runs until aborted")]
    loop {
        let _ = interval.tick().await;

        if !visibility.visible.load(Ordering::Relaxed) {
            if Instant::now() < visibility.visible_after {
                continue;
            }

            visibility.visible.store(true, Ordering::Relaxed);
            bar.set_draw_target(ProgressDrawTarget::stderr_with_hz(10));
        }

        let elapsed = visibility.phase_started.lock().expect("lock poisoned").elapsed().as_secs();
        let message = {
            let status_guard = status.lock().expect("lock poisoned");
            status_guard()
        };
        bar.set_message(format!("{elapsed}s: {message}"));
        bar.tick();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    #[cfg_attr(miri, ignore = "Miri cannot call tokio runtime")]
    async fn test_hidden_reporter_stays_hidden() {
        let reporter = ProgressReporter::new(Duration::from_secs(3600), false);
        reporter.set_phase("Scanning");
        reporter.set_status(Box::new(|| "3 dependents".to_string()));

        tokio::time::sleep(Duration::from_millis(250)).await;
        assert!(!reporter.visibility.visible.load(Ordering::Relaxed));

        reporter.done();
        assert!(!reporter.use_colors());
    }
}
