//! Bounded connections between stages.

use super::{Observer, PressureSample, StageCounts, StageName};
use core::sync::atomic::{AtomicU64, Ordering};
use ohno::app_err;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Create a connected outlet/inlet pair holding at most `capacity` records.
///
/// The outlet belongs to `stage` and reports its progress and pressure to `observer`.
///
/// # Panics
///
/// Panics if `capacity` is zero.
#[must_use]
pub fn bounded<T>(stage: StageName, capacity: usize, observer: Arc<dyn Observer>) -> (Outlet<T>, Inlet<T>) {
    let (sender, receiver) = mpsc::channel(capacity);
    let outlet = Outlet {
        sender,
        stage,
        observer,
        counters: Arc::default(),
    };
    let inlet = Inlet { receiver, capacity };
    (outlet, inlet)
}

#[derive(Debug, Default)]
pub(super) struct Counters {
    received: AtomicU64,
    emitted: AtomicU64,
    skipped: AtomicU64,

    // f64 bits of the last inbound occupancy seen by the driver
    inbound: AtomicU64,
}

impl Counters {
    pub(super) fn snapshot(&self) -> StageCounts {
        StageCounts {
            received: self.received.load(Ordering::Relaxed),
            emitted: self.emitted.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
        }
    }
}

/// The sending half of a stage's output buffer.
pub struct Outlet<T> {
    sender: mpsc::Sender<T>,
    stage: StageName,
    observer: Arc<dyn Observer>,
    counters: Arc<Counters>,
}

impl<T> core::fmt::Debug for Outlet<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Outlet")
            .field("stage", &self.stage)
            .field("capacity", &self.capacity())
            .field("counters", &self.counters)
            .finish_non_exhaustive()
    }
}

impl<T: Send> Outlet<T> {
    /// Hand a record to the downstream stage, waiting while its buffer is full.
    ///
    /// Fails only when the downstream stage is gone.
    pub async fn send(&self, item: T) -> crate::Result<()> {
        self.sender
            .send(item)
            .await
            .map_err(|_closed| app_err!("downstream of stage '{}' closed", self.stage))?;

        let _ = self.counters.emitted.fetch_add(1, Ordering::Relaxed);
        self.observer.on_progress(self.stage, self.counts());
        self.observer.on_pressure(self.stage, self.pressure());
        Ok(())
    }
}

impl<T> Outlet<T> {
    #[must_use]
    pub const fn stage(&self) -> StageName {
        self.stage
    }

    /// The configured high-water mark.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.sender.max_capacity()
    }

    /// Fraction of the buffer currently holding records.
    #[must_use]
    pub fn occupancy(&self) -> f64 {
        occupancy(self.sender.max_capacity() - self.sender.capacity(), self.sender.max_capacity())
    }

    /// Whether the downstream stage has gone away.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    /// Note that an input was abandoned without producing output or failing the pipeline.
    pub fn record_skip(&self) {
        let _ = self.counters.skipped.fetch_add(1, Ordering::Relaxed);
        self.observer.on_progress(self.stage, self.counts());
    }

    /// Forward the latest remaining query quota to the observer.
    pub fn report_rate_limit(&self, remaining: u64) {
        self.observer.on_rate_limit(self.stage, remaining);
    }

    #[must_use]
    pub fn counts(&self) -> StageCounts {
        self.counters.snapshot()
    }

    pub(super) fn record_received(&self, inbound_occupancy: f64) {
        let _ = self.counters.received.fetch_add(1, Ordering::Relaxed);
        self.counters.inbound.store(inbound_occupancy.to_bits(), Ordering::Relaxed);
        self.observer.on_pressure(self.stage, self.pressure());
    }

    pub(super) fn counters(&self) -> Arc<Counters> {
        Arc::clone(&self.counters)
    }

    pub(super) fn observer(&self) -> &dyn Observer {
        self.observer.as_ref()
    }

    fn pressure(&self) -> PressureSample {
        PressureSample::new(self.occupancy(), f64::from_bits(self.counters.inbound.load(Ordering::Relaxed)))
    }
}

/// The receiving half of a stage's input buffer.
#[derive(Debug)]
pub struct Inlet<T> {
    receiver: mpsc::Receiver<T>,
    capacity: usize,
}

impl<T> Inlet<T> {
    /// Take the next record, or `None` once every upstream outlet is gone and the buffer is drained.
    pub async fn recv(&mut self) -> Option<T> {
        self.receiver.recv().await
    }

    /// Fraction of the buffer currently holding records.
    #[must_use]
    pub fn occupancy(&self) -> f64 {
        occupancy(self.receiver.len(), self.capacity)
    }
}

#[expect(clippy::cast_precision_loss, reason = "buffer sizes are far below 2^52")]
fn occupancy(used: usize, capacity: usize) -> f64 {
    if capacity == 0 {
        return 0.0;
    }

    (used as f64 / capacity as f64).clamp(0.0, 1.0)
}
