//! Fixed-period background loops.
//!
//! Each tick awaits its callback before waiting for the next one, and the
//! interval skips missed ticks instead of bursting to catch up. A slow
//! callback therefore delays its own loop but never overlaps itself.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

/// Handle to a running loop. Cancelling or dropping it stops further ticks.
pub struct TaskHandle {
    name: &'static str,
    cancelled: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl TaskHandle {
    /// Stop the loop. Idempotent. Called from inside the loop's own
    /// callback, the callback is cut off at its next await point; work that
    /// runs without awaiting after the call still completes, and no further
    /// tick runs.
    pub fn cancel(&self) {
        if !self.cancelled.swap(true, Ordering::SeqCst) {
            debug!("[{}] loop cancelled", self.name);
        }
        self.task.abort();
    }

    #[cfg(test)]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

impl Drop for TaskHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Run `callback` every `period`, first tick immediately.
pub fn schedule<F, Fut>(name: &'static str, period: Duration, mut callback: F) -> TaskHandle
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let cancelled = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&cancelled);

    let task = tokio::spawn(async move {
        debug!("[{}] loop started (period={:?})", name, period);
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            if flag.load(Ordering::SeqCst) {
                break;
            }
            callback().await;
        }
    });

    TaskHandle {
        name,
        cancelled,
        task,
    }
}
