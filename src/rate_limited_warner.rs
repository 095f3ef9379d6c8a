use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Default interval between repeated warnings.
pub const DEFAULT_WARN_INTERVAL: Duration = Duration::from_secs(5);

const NEVER: u64 = u64::MAX;

/// Helper that rate limits repeated warnings.
///
/// The caller increments the event counter via [`record_drop`]. The next call
/// to [`warn_if_due`] emits a warning using the provided callback if the
/// configured interval has elapsed. [`flush`] emits a warning immediately if
/// any events have been recorded since the last emission.
///
/// [`record_drop`]: RateLimitedWarner::record_drop
/// [`warn_if_due`]: RateLimitedWarner::warn_if_due
/// [`flush`]: RateLimitedWarner::flush
#[derive(Debug)]
pub struct RateLimitedWarner {
    origin: Instant,
    interval: Duration,
    last_warn_ms: AtomicU64,
    dropped: AtomicU64,
}

impl RateLimitedWarner {
    /// Create a new warner. The first warning can be emitted immediately.
    pub fn new(interval: Duration) -> Self {
        Self {
            origin: Instant::now(),
            interval,
            last_warn_ms: AtomicU64::new(NEVER),
            dropped: AtomicU64::new(0),
        }
    }

    fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.origin.elapsed().as_millis()).unwrap_or(NEVER - 1)
    }

    /// Increment the event counter.
    pub fn record_drop(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Emit a warning if the rate limit interval has elapsed.
    pub fn warn_if_due(&self, mut warn: impl FnMut(u64)) {
        let now = self.elapsed_ms();
        let prev = self.last_warn_ms.load(Ordering::Relaxed);
        let interval_ms = u64::try_from(self.interval.as_millis()).unwrap_or(u64::MAX);
        if prev == NEVER || now.saturating_sub(prev) >= interval_ms {
            let count = self.dropped.swap(0, Ordering::Relaxed);
            if count > 0 {
                warn(count);
                self.last_warn_ms.store(now, Ordering::Relaxed);
            }
        }
    }

    /// Immediately warn about any recorded events.
    pub fn flush(&self, mut warn: impl FnMut(u64)) {
        let count = self.dropped.swap(0, Ordering::Relaxed);
        if count > 0 {
            warn(count);
            self.last_warn_ms.store(self.elapsed_ms(), Ordering::Relaxed);
        }
    }
}
