//! Deferred work queue --- a single worker draining a FIFO of jobs.
//!
//! Reclamation work (recursive detach of dead directories, periodic
//! sweeps) must not run on the task that owns the triggering entry
//! lock, so callbacks enqueue jobs here and return. The queue is a
//! [`SegQueue`] paired with a counting semaphore; [`WorkQueue::stop`]
//! wakes the worker, which exits after the job in hand and drops
//! whatever is still queued. Reclamation is best-effort by design.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam_queue::SegQueue;
use tokio::sync::{oneshot, Semaphore};
use tokio::task::JoinHandle;

/// A unit of deferred work.
pub type Job = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Single-worker FIFO of deferred jobs.
pub struct WorkQueue {
    work: SegQueue<Job>,
    work_sem: Semaphore,
    running: AtomicBool,
}

impl WorkQueue {
    /// Creates an empty, stopped queue.
    pub fn new() -> Self {
        Self { work: SegQueue::new(), work_sem: Semaphore::new(0), running: AtomicBool::new(false) }
    }

    /// Spawns the worker task.
    pub fn start(self: &Arc<Self>) -> JoinHandle<()> {
        self.running.store(true, Ordering::SeqCst);
        let wq = Arc::clone(self);
        tokio::spawn(async move { wq.run().await })
    }

    async fn run(&self) {
        loop {
            let Ok(permit) = self.work_sem.acquire().await else {
                break;
            };
            permit.forget();

            if !self.running.load(Ordering::SeqCst) {
                break;
            }

            if let Some(job) = self.work.pop() {
                job.await;
            }
        }
    }

    /// Enqueues a job. Thread-safe; wakes the worker.
    pub fn add(&self, job: Job) {
        self.work.push(job);
        self.work_sem.add_permits(1);
    }

    /// Asks the worker to exit. The job in hand (if any) completes;
    /// queued jobs that were not reached are dropped.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.work_sem.add_permits(1);
    }

    /// Waits until every job enqueued before this call has run.
    ///
    /// Must not be called after [`WorkQueue::stop`].
    pub async fn flush(&self) {
        let (tx, rx) = oneshot::channel();
        self.add(Box::pin(async move {
            let _ = tx.send(());
        }));
        let _ = rx.await;
    }

    /// Flushes until the queue is observed empty, so that jobs which
    /// themselves enqueue follow-up jobs are also drained.
    pub async fn quiesce(&self) {
        loop {
            self.flush().await;
            if self.work.is_empty() {
                break;
            }
        }
    }
}

impl Default for WorkQueue {
    fn default() -> Self {
        Self::new()
    }
}
