//! Bounded worker pool for background crawl jobs.
//!
//! The lifecycle manager only depends on [`TaskExecutor`], so the pool can be
//! replaced by a bounded, backpressured implementation without touching the
//! manager's contract. Crawl bodies are blocking (rusqlite work), which is
//! why jobs run on OS threads rather than async tasks.

use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use tracing::debug;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Fire-and-forget submission of a unit of work.
pub trait TaskExecutor: Send + Sync {
    /// Enqueue `job` for execution on some worker and return immediately.
    /// Never blocks the submitter on completion. No cancellation of an
    /// already-running job is provided; cancellation, if needed, is
    /// cooperative inside the job body.
    fn submit(&self, job: Job);
}

/// Fixed-size pool of worker threads over an unbounded queue.
///
/// Submission never fails on capacity: control-plane availability is favored
/// over backpressure here.
pub struct ThreadPool {
    sender: Mutex<Option<Sender<Job>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl ThreadPool {
    /// Create a pool with `size` worker threads. Pool size is fixed at
    /// construction.
    pub fn new(size: usize) -> Self {
        assert!(size > 0, "thread pool requires at least one worker");

        let (sender, receiver) = channel::<Job>();
        let receiver = Arc::new(Mutex::new(receiver));

        let workers = (0..size)
            .map(|n| {
                let receiver = Arc::clone(&receiver);
                std::thread::Builder::new()
                    .name(format!("crawl-worker-{}", n))
                    .spawn(move || worker_loop(n, receiver))
                    .expect("failed to spawn crawl worker thread")
            })
            .collect();

        Self {
            sender: Mutex::new(Some(sender)),
            workers: Mutex::new(workers),
        }
    }
}

fn worker_loop(n: usize, receiver: Arc<Mutex<Receiver<Job>>>) {
    loop {
        let job = {
            let guard = receiver.lock().expect("worker queue lock poisoned");
            guard.recv()
        };
        match job {
            Ok(job) => job(),
            // Queue closed: the pool is shutting down.
            Err(_) => {
                debug!("crawl worker {} exiting", n);
                break;
            }
        }
    }
}

impl TaskExecutor for ThreadPool {
    fn submit(&self, job: Job) {
        let guard = self.sender.lock().expect("executor sender lock poisoned");
        if let Some(sender) = guard.as_ref() {
            // Receiver outlives all submissions while the pool is alive.
            let _ = sender.send(job);
        }
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        // Close the queue so idle workers wake up and exit, then join.
        if let Ok(mut guard) = self.sender.lock() {
            guard.take();
        }
        if let Ok(mut workers) = self.workers.lock() {
            for handle in workers.drain(..) {
                let _ = handle.join();
            }
        }
    }
}
