//! Busy/locked retry policy
//!
//! The engine calls [`busy_handler`] whenever a statement collides with a
//! lock held by another connection. The first call of a collision records a
//! start time; later calls sleep a randomized 50-100ms and ask the engine to
//! retry until the configured ceiling has elapsed.

use crate::core::Timestamp;
use parking_lot::Mutex;
use rand::Rng;
use std::ffi::{c_int, c_void};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Shared retry state handed to the engine as the busy-handler context
#[derive(Debug)]
pub(crate) struct BusyRetry {
    max_retry_micros: AtomicU64,
    started: Mutex<Option<Timestamp>>,
    sleeps: AtomicU64,
}

impl BusyRetry {
    pub(crate) fn new(max_retry: Duration) -> Self {
        Self {
            max_retry_micros: AtomicU64::new(duration_micros(max_retry)),
            started: Mutex::new(None),
            sleeps: AtomicU64::new(0),
        }
    }

    pub(crate) fn max_retry(&self) -> Duration {
        Duration::from_micros(self.max_retry_micros.load(Ordering::Acquire))
    }

    pub(crate) fn set_max_retry(&self, max_retry: Duration) {
        self.max_retry_micros
            .store(duration_micros(max_retry), Ordering::Release);
    }

    /// Total backoff sleeps taken since the session was created
    pub(crate) fn sleeps(&self) -> u64 {
        self.sleeps.load(Ordering::Acquire)
    }

    /// Decide whether the engine should retry; `count` is the engine's
    /// per-collision invocation counter
    pub(crate) fn should_retry(&self, count: c_int) -> bool {
        if count == 0 {
            *self.started.lock() = Some(Timestamp::now());
            return true;
        }

        let started = *self.started.lock().get_or_insert_with(Timestamp::now);
        let elapsed = Timestamp::now().interval_since(&started);
        if elapsed >= self.max_retry().as_secs_f64() {
            tracing::debug!(elapsed_secs = elapsed, attempts = count, "giving up on busy database");
            return false;
        }

        let backoff = rand::thread_rng().gen_range(50..=100);
        std::thread::sleep(Duration::from_millis(backoff));
        self.sleeps.fetch_add(1, Ordering::AcqRel);
        true
    }
}

fn duration_micros(duration: Duration) -> u64 {
    u64::try_from(duration.as_micros()).unwrap_or(u64::MAX)
}

/// Engine callback; `context` points at the session's [`BusyRetry`]
pub(crate) unsafe extern "C" fn busy_handler(context: *mut c_void, count: c_int) -> c_int {
    if context.is_null() {
        return 0;
    }
    // SAFETY: the session registers a pointer to a BusyRetry it keeps alive
    // in an Arc for as long as the handler stays installed.
    let retry = &*(context as *const BusyRetry);
    c_int::from(retry.should_retry(count))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn test_first_call_retries_without_sleeping() {
        let retry = BusyRetry::new(Duration::from_secs(1));
        let start = Instant::now();
        assert!(retry.should_retry(0));
        assert!(start.elapsed() < Duration::from_millis(50));
        assert_eq!(retry.sleeps(), 0);
    }

    #[test]
    fn test_zero_ceiling_gives_up() {
        let retry = BusyRetry::new(Duration::ZERO);
        assert!(retry.should_retry(0));
        assert!(!retry.should_retry(1));
        assert_eq!(retry.sleeps(), 0);
    }

    #[test]
    fn test_retries_until_ceiling() {
        let retry = BusyRetry::new(Duration::from_millis(200));
        let start = Instant::now();
        let mut count = 0;
        while retry.should_retry(count) {
            count += 1;
        }
        assert!(start.elapsed() >= Duration::from_millis(200));
        assert!(retry.sleeps() >= 2);
    }

    #[test]
    fn test_callback_with_null_context() {
        assert_eq!(unsafe { busy_handler(std::ptr::null_mut(), 3) }, 0);
    }

    #[test]
    fn test_set_max_retry() {
        let retry = BusyRetry::new(Duration::from_secs(2));
        retry.set_max_retry(Duration::from_millis(1500));
        assert_eq!(retry.max_retry(), Duration::from_millis(1500));
    }
}
