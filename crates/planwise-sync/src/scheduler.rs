//! # Debounce Scheduler
//!
//! A single cancelable deferred task. Arming it again replaces the pending
//! task, so only the last trigger inside the quiet period fires.
//!
//! ## Timeline
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  arm()        arm()                    fires                           │
//! │   │            │                         │                              │
//! │   ▼            ▼                         ▼                              │
//! │  ─┼────────────┼─────────────────────────┼──────────────► time          │
//! │   │  aborted   │◄──────── delay ────────►│                              │
//! │   └────────────┘                                                        │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The action is spawned as its own task once the delay elapses. Re-arming
//! or cancelling after that point never interrupts an action that already
//! started.

use std::future::Future;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

/// Single-slot debounce timer.
#[derive(Debug)]
pub struct Debouncer {
    delay: Duration,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Debouncer {
            delay,
            pending: Mutex::new(None),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Schedules `action` to run after the delay, cancelling any task that
    /// has not fired yet.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn arm<F, Fut>(&self, action: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let delay = self.delay;
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            trace!("Debounce window elapsed");
            tokio::spawn(action());
        });

        let previous = self.slot().replace(task);
        if let Some(previous) = previous {
            if !previous.is_finished() {
                debug!("Superseding pending debounce task");
            }
            previous.abort();
        }
    }

    /// Cancels the pending task. Returns true if one had not fired yet.
    pub fn cancel(&self) -> bool {
        match self.slot().take() {
            Some(task) => {
                let was_pending = !task.is_finished();
                task.abort();
                if was_pending {
                    debug!("Cancelled pending debounce task");
                }
                was_pending
            }
            None => false,
        }
    }

    /// Returns true while a task is waiting for its delay.
    pub fn is_pending(&self) -> bool {
        self.slot().as_ref().is_some_and(|task| !task.is_finished())
    }

    fn slot(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        if let Some(task) = self.slot().take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::time::sleep;

    fn counting(counter: &Arc<AtomicUsize>) -> impl FnOnce() -> std::future::Ready<()> + Send + 'static {
        let counter = counter.clone();
        move || {
            counter.fetch_add(1, Ordering::SeqCst);
            std::future::ready(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_fires_after_delay() {
        let fired = Arc::new(AtomicUsize::new(0));
        let debouncer = Debouncer::new(Duration::from_secs(10));

        debouncer.arm(counting(&fired));
        assert!(debouncer.is_pending());

        sleep(Duration::from_secs(9)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        sleep(Duration::from_secs(2)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(!debouncer.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearm_measures_from_last_trigger() {
        let fired = Arc::new(AtomicUsize::new(0));
        let debouncer = Debouncer::new(Duration::from_secs(10));

        debouncer.arm(counting(&fired));
        sleep(Duration::from_secs(5)).await;
        debouncer.arm(counting(&fired));

        // 14s after the first trigger, 9s after the second
        sleep(Duration::from_secs(9)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        sleep(Duration::from_secs(2)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        sleep(Duration::from_secs(30)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel() {
        let fired = Arc::new(AtomicUsize::new(0));
        let debouncer = Debouncer::new(Duration::from_secs(10));

        assert!(!debouncer.cancel());

        debouncer.arm(counting(&fired));
        assert!(debouncer.cancel());
        assert!(!debouncer.is_pending());

        sleep(Duration::from_secs(20)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearm_does_not_interrupt_running_action() {
        let finished = Arc::new(AtomicUsize::new(0));
        let debouncer = Debouncer::new(Duration::from_secs(1));

        let done = finished.clone();
        debouncer.arm(move || async move {
            sleep(Duration::from_secs(5)).await;
            done.fetch_add(1, Ordering::SeqCst);
        });

        // Action is running its 5s body by now
        sleep(Duration::from_secs(2)).await;
        debouncer.cancel();

        sleep(Duration::from_secs(10)).await;
        assert_eq!(finished.load(Ordering::SeqCst), 1);
    }
}
