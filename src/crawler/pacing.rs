//! Request pacing against an injectable clock
//!
//! The orchestrator never sleeps directly. It asks a [`Clock`], so tests can
//! run a full crawl against [`ManualClock`] in virtual time and assert on the
//! exact spacing of requests.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Source of time for pacing
#[async_trait]
pub trait Clock: Send + Sync {
    /// Time elapsed since the clock's origin
    fn now(&self) -> Duration;

    async fn sleep(&self, duration: Duration);
}

/// Wall clock backed by tokio's timer
#[derive(Debug, Clone)]
pub struct TokioClock {
    origin: Instant,
}

impl TokioClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for TokioClock {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Clock for TokioClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Virtual clock that advances instantly on sleep
///
/// Every requested sleep is recorded so tests can inspect the pacing
/// schedule.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    inner: Arc<Mutex<ManualState>>,
}

#[derive(Debug, Default)]
struct ManualState {
    now: Duration,
    sleeps: Vec<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Moves virtual time forward without recording a sleep
    pub fn advance(&self, duration: Duration) {
        if let Ok(mut state) = self.inner.lock() {
            state.now += duration;
        }
    }

    /// Sleeps requested so far, in order
    pub fn sleeps(&self) -> Vec<Duration> {
        self.inner
            .lock()
            .map(|state| state.sleeps.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> Duration {
        self.inner.lock().map(|state| state.now).unwrap_or_default()
    }

    async fn sleep(&self, duration: Duration) {
        if let Ok(mut state) = self.inner.lock() {
            state.now += duration;
            state.sleeps.push(duration);
        }
        tokio::task::yield_now().await;
    }
}

/// Waits `duration` on `clock` unless `cancel` fires first
///
/// Returns false when the wait was cut short by cancellation.
pub async fn pause(clock: &dyn Clock, duration: Duration, cancel: &CancellationToken) -> bool {
    if cancel.is_cancelled() {
        return false;
    }
    if duration.is_zero() {
        return true;
    }

    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = clock.sleep(duration) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_manual_clock_records_sleeps() {
        let clock = ManualClock::new();
        clock.sleep(Duration::from_millis(100)).await;
        clock.advance(Duration::from_millis(5));
        clock.sleep(Duration::from_millis(250)).await;

        assert_eq!(clock.now(), Duration::from_millis(355));
        assert_eq!(
            clock.sleeps(),
            vec![Duration::from_millis(100), Duration::from_millis(250)]
        );
    }

    #[tokio::test]
    async fn test_pause_completes() {
        let clock = ManualClock::new();
        let cancel = CancellationToken::new();

        assert!(pause(&clock, Duration::from_millis(100), &cancel).await);
        assert_eq!(clock.now(), Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_pause_skipped_when_cancelled() {
        let clock = ManualClock::new();
        let cancel = CancellationToken::new();
        cancel.cancel();

        assert!(!pause(&clock, Duration::from_millis(100), &cancel).await);
        assert!(clock.sleeps().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_cuts_real_sleep_short() {
        let clock = TokioClock::new();
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trigger.cancel();
        });

        assert!(!pause(&clock, Duration::from_secs(60), &cancel).await);
        assert!(clock.now() < Duration::from_secs(60));
    }
}
