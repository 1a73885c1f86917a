//! Injectable timer facility.
//!
//! The supervisor never sleeps itself: it schedules delayed callbacks on a
//! [`Clock`] and keeps the returned [`TimerHandle`] to cancel them. The
//! tokio implementation follows `tokio::time`, so tests can run on a
//! paused runtime clock.

use futures::future::BoxFuture;
use std::time::Duration;
use tokio::task::AbortHandle;
use tokio::time::Instant;

/// Time source and delayed-callback scheduler
pub trait Clock: Send + Sync {
    /// Monotonic now
    fn now(&self) -> Instant;

    /// Run `callback` once `delay` has elapsed
    fn schedule(&self, delay: Duration, callback: BoxFuture<'static, ()>) -> TimerHandle;
}

/// Cancellation token for a scheduled callback
#[derive(Debug)]
pub struct TimerHandle {
    abort: AbortHandle,
    due: Instant,
}

impl TimerHandle {
    pub fn new(abort: AbortHandle, due: Instant) -> Self {
        Self { abort, due }
    }

    /// Cancel the callback if it has not run yet
    pub fn cancel(self) {
        self.abort.abort();
    }

    /// When the callback is due
    pub fn due(&self) -> Instant {
        self.due
    }

    /// Whether the callback has run or been cancelled
    pub fn is_finished(&self) -> bool {
        self.abort.is_finished()
    }
}

/// Clock backed by the tokio timer wheel
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

impl TokioClock {
    pub fn new() -> Self {
        Self
    }
}

impl Clock for TokioClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn schedule(&self, delay: Duration, callback: BoxFuture<'static, ()>) -> TimerHandle {
        let due = Instant::now() + delay;
        let task = tokio::spawn(async move {
            tokio::time::sleep_until(due).await;
            callback.await;
        });
        TimerHandle::new(task.abort_handle(), due)
    }
}
