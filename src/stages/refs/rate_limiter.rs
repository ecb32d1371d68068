use super::RateLimitInfo;
use chrono::{DateTime, Utc};
use core::time::Duration;
use std::sync::{Arc, Mutex};

const LOG_TARGET: &str = "      refs";

/// Shared view of the GraphQL query quota.
///
/// Only the ref resolver updates it; clones can be handed to anything that wants to read
/// the remaining quota. Requests are held back once the last observed `remaining` drops to
/// the low-water mark, until the quota resets.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    last: Arc<Mutex<Option<RateLimitInfo>>>,
    low_water: u64,
}

impl RateLimiter {
    #[must_use]
    pub fn new(low_water: u64) -> Self {
        Self {
            last: Arc::default(),
            low_water,
        }
    }

    /// Remaining quota according to the last response, if any response has been seen.
    #[must_use]
    pub fn remaining(&self) -> Option<u64> {
        self.last.lock().expect("lock poisoned").map(|info| info.remaining)
    }

    /// Record the quota reported by a response.
    pub fn observe(&self, info: &RateLimitInfo) {
        log::debug!(
            target: LOG_TARGET,
            "Query cost {}, {}/{} remaining, resets at {}",
            info.cost,
            info.remaining,
            info.limit,
            info.reset_at.with_timezone(&chrono::Local).format("%T")
        );
        *self.last.lock().expect("lock poisoned") = Some(*info);
    }

    /// How long to hold back the next request, or `None` to send it right away.
    #[must_use]
    pub fn wait_duration(&self, now: DateTime<Utc>) -> Option<Duration> {
        let info = (*self.last.lock().expect("lock poisoned"))?;
        if info.remaining > self.low_water || info.reset_at <= now {
            return None;
        }

        (info.reset_at - now).to_std().ok()
    }

    /// Sleep until the quota resets if it is exhausted. Returns how long it slept.
    pub async fn wait_if_needed(&self) -> Option<Duration> {
        let wait = self.wait_duration(Utc::now())?;
        log::warn!(
            target: LOG_TARGET,
            "Query quota exhausted, waiting {}s for it to reset",
            wait.as_secs()
        );
        tokio::time::sleep(wait).await;
        Some(wait)
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(1)
    }
}
