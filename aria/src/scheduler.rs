//! The "call soon, thread-safe" primitive bridging audio device callback
//! threads to the single cooperative task that owns pipeline and
//! conversation state. The underlying channel preserves FIFO order across
//! callbacks from either device thread.

use tokio::sync::mpsc;

type Job = Box<dyn FnOnce() + Send>;

/// Thread-safe handle a device callback uses to post work onto the
/// scheduler. Cheap to clone; cloning shares the same queue.
#[derive(Clone)]
pub struct SchedulerHandle {
    tx: mpsc::UnboundedSender<Job>,
}

impl SchedulerHandle {
    /// Enqueue `job` to run on the scheduler task. Never blocks, so it is
    /// safe to call from a real-time audio callback. Silently dropped if
    /// the scheduler has already shut down.
    pub fn call_soon(&self, job: impl FnOnce() + Send + 'static) {
        let _ = self.tx.send(Box::new(job));
    }
}

/// Owns the receiving half. `run` drains jobs in FIFO order until every
/// [`SchedulerHandle`] has been dropped.
pub struct Scheduler {
    rx: mpsc::UnboundedReceiver<Job>,
}

impl Scheduler {
    pub fn new() -> (SchedulerHandle, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (SchedulerHandle { tx }, Self { rx })
    }

    pub async fn run(mut self) {
        while let Some(job) = self.rx.recv().await {
            job();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex as Mutex_;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn jobs_run_in_fifo_order() {
        let (handle, scheduler) = Scheduler::new();
        let order = Arc::new(Mutex_::new(Vec::new()));
        for i in 0..5 {
            let order = order.clone();
            handle.call_soon(move || order.lock().push(i));
        }
        drop(handle);
        scheduler.run().await;
        assert_eq!(*order.lock(), vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn call_soon_after_scheduler_dropped_is_a_silent_noop() {
        let (handle, scheduler) = Scheduler::new();
        drop(scheduler);
        let counter = Arc::new(AtomicU32::new(0));
        let counter2 = counter.clone();
        handle.call_soon(move || {
            counter2.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }
}
