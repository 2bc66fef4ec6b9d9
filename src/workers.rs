//! Worker pool executing per-connection read tasks and interpreter callbacks

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use std::thread::{self, JoinHandle};
use tracing::{trace, warn};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Fixed pool of worker threads fed through an unbounded channel.
///
/// Workers block on the channel; dropping the sender ends every worker loop,
/// so `shutdown` is a take-and-join. The reactor never blocks a worker on the
/// network — workers block only inside user interpreter code.
pub struct WorkerPool {
    sender: Mutex<Option<Sender<Job>>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    /// Spawn `threads` workers
    pub fn new(threads: usize) -> Self {
        let (sender, receiver) = unbounded::<Job>();
        let mut handles = Vec::with_capacity(threads);

        for id in 0..threads.max(1) {
            let rx: Receiver<Job> = receiver.clone();
            let builder = thread::Builder::new().name(format!("io-worker-{id}"));
            let handle = builder.spawn(move || {
                while let Ok(job) = rx.recv() {
                    trace!(worker = id, "running task");
                    job();
                }
                trace!(worker = id, "worker exited");
            });
            match handle {
                Ok(h) => handles.push(h),
                Err(e) => warn!(error = %e, "failed to spawn worker thread"),
            }
        }

        Self {
            sender: Mutex::new(Some(sender)),
            handles: Mutex::new(handles),
        }
    }

    /// Enqueue a task for execution on some worker
    pub fn execute(&self, job: impl FnOnce() + Send + 'static) {
        let sender = self.sender.lock();
        match &*sender {
            Some(tx) => {
                if tx.send(Box::new(job)).is_err() {
                    warn!("worker pool has no workers, dropping task");
                }
            }
            None => warn!("worker pool shut down, dropping task"),
        }
    }

    /// Stop accepting tasks, run out the queue, and join every worker.
    /// Idempotent.
    pub fn shutdown(&self) {
        self.sender.lock().take();
        let handles: Vec<_> = self.handles.lock().drain(..).collect();
        for handle in handles {
            let _ = handle.join();
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn executes_all_tasks() {
        let pool = WorkerPool::new(2);
        let counter = Arc::new(AtomicUsize::new(0));
        let (done_tx, done_rx) = unbounded();

        for _ in 0..16 {
            let counter = counter.clone();
            let done = done_tx.clone();
            pool.execute(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                let _ = done.send(());
            });
        }

        for _ in 0..16 {
            done_rx
                .recv_timeout(Duration::from_secs(5))
                .expect("task did not run");
        }
        assert_eq!(counter.load(Ordering::SeqCst), 16);
    }

    #[test]
    fn shutdown_is_idempotent_and_drops_late_tasks() {
        let pool = WorkerPool::new(1);
        pool.shutdown();
        pool.shutdown();
        // Must not panic or hang
        pool.execute(|| {});
    }
}
