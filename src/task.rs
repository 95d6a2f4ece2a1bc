//! Periodic background task
//!
//! Runs a callback at a fixed interval on a tokio task until stopped.
//! The first firing happens only after one full interval has elapsed.
//! Shutdown is cooperative: `stop` signals the loop and awaits its join
//! handle, so a stopped task is fully quiesced.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use log::error;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Callback invoked on every tick. It runs outside any lock held by the
/// task itself, so it may freely call into other components.
pub type TaskCallback = Arc<dyn Fn() + Send + Sync>;

/// Fixed-interval repeating task.
#[derive(Default)]
pub struct PeriodicTask {
    interval_ms: u64,
    callback: Option<TaskCallback>,
    shutdown: Option<watch::Sender<bool>>,
    handle: Option<JoinHandle<()>>,
}

impl PeriodicTask {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the firing interval. Takes effect on the next `start`.
    pub fn set_interval_ms(&mut self, interval_ms: u64) {
        self.interval_ms = interval_ms;
    }

    pub fn set_callback(&mut self, callback: TaskCallback) {
        self.callback = Some(callback);
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Spawn the periodic loop. No-op when already running, when the
    /// interval is zero, or when no callback has been set.
    pub fn start(&mut self) {
        if self.handle.is_some() || self.interval_ms == 0 {
            return;
        }
        let Some(callback) = self.callback.clone() else {
            return;
        };

        let (tx, mut rx) = watch::channel(false);
        let interval = Duration::from_millis(self.interval_ms);
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {
                        // A panic stays contained to this tick
                        if catch_unwind(AssertUnwindSafe(|| callback())).is_err() {
                            error!("periodic task callback panicked");
                        }
                    }
                    _ = rx.changed() => break,
                }
            }
        });
        self.shutdown = Some(tx);
        self.handle = Some(handle);
    }

    /// Signal the loop to exit and wait until it has. Idempotent, and
    /// safe to call on a task that was never started.
    pub async fn stop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(true);
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_fires_repeatedly_after_interval() {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);

        let mut task = PeriodicTask::new();
        task.set_interval_ms(10);
        task.set_callback(Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        task.start();
        assert!(task.is_running());

        tokio::time::sleep(Duration::from_millis(100)).await;
        task.stop().await;
        assert!(count.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn test_no_immediate_fire_on_start() {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);

        let mut task = PeriodicTask::new();
        task.set_interval_ms(5_000);
        task.set_callback(Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        task.start();

        tokio::time::sleep(Duration::from_millis(50)).await;
        task.stop().await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_zero_interval_does_not_start() {
        let mut task = PeriodicTask::new();
        task.set_callback(Arc::new(|| {}));
        task.start();
        assert!(!task.is_running());
    }

    #[tokio::test]
    async fn test_stop_without_start_and_twice() {
        let mut task = PeriodicTask::new();
        task.stop().await;

        task.set_interval_ms(10);
        task.set_callback(Arc::new(|| {}));
        task.start();
        task.stop().await;
        task.stop().await;
        assert!(!task.is_running());
    }

    #[tokio::test]
    async fn test_callback_panic_does_not_kill_loop() {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);

        let mut task = PeriodicTask::new();
        task.set_interval_ms(10);
        task.set_callback(Arc::new(move || {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                panic!("first tick fails");
            }
        }));
        task.start();

        tokio::time::sleep(Duration::from_millis(100)).await;
        task.stop().await;
        // Ticks kept coming after the panicking one
        assert!(count.load(Ordering::SeqCst) >= 2);
    }
}
