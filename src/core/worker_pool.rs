//! Bounded pool of fire-and-forget worker threads.
//!
//! The pool never queues: when every slot is taken, `run` refuses the work and
//! the caller is expected to do it on its own thread. Each worker remembers the
//! job and the exact argument batch it was launched with so callers can avoid
//! dispatching the same argument twice while it is still in flight.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::{debug, warn};

/// A unit of work. Its identity (for `find_pending`) is the identity of the `Arc`.
pub type Job<A> = Arc<dyn Fn(&[A]) + Send + Sync>;

struct Worker<A> {
    job: Job<A>,
    args: Vec<A>,
    handle: JoinHandle<()>,
}

pub struct WorkerPool<A> {
    capacity: usize,
    workers: Vec<Worker<A>>,
}

/// `max(logical_cpus - 1, 1)`
pub fn default_capacity() -> usize {
    thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .saturating_sub(1)
        .max(1)
}

impl<A> WorkerPool<A>
where
    A: Clone + PartialEq + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::with_capacity(default_capacity())
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            workers: Vec::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of workers that have not been reaped yet.
    pub fn occupancy(&self) -> usize {
        self.workers.len()
    }

    /// Starts `job(args)` on a new thread. Returns `false` without starting
    /// anything when the pool is full.
    pub fn run(&mut self, job: &Job<A>, args: &[A]) -> bool {
        self.reap();

        if self.workers.len() >= self.capacity {
            debug!(capacity = self.capacity, "worker pool saturated");
            return false;
        }

        let thread_job = Arc::clone(job);
        let thread_args = args.to_vec();
        let spawned = thread::Builder::new()
            .name("connwatch-worker".to_string())
            .spawn(move || thread_job(thread_args.as_slice()));

        match spawned {
            Ok(handle) => {
                self.workers.push(Worker {
                    job: Arc::clone(job),
                    args: args.to_vec(),
                    handle,
                });
                true
            }
            Err(err) => {
                warn!(error = %err, "failed to spawn worker thread");
                false
            }
        }
    }

    /// Returns the candidates that no live worker running `job` currently owns.
    pub fn find_pending(&mut self, job: &Job<A>, candidates: &[A]) -> Vec<A> {
        self.reap();

        let owners: Vec<&Worker<A>> = self.workers.iter()
            .filter(|worker| Arc::ptr_eq(&worker.job, job))
            .collect();

        candidates.iter()
            .filter(|arg| !owners.iter().any(|worker| worker.args.contains(arg)))
            .cloned()
            .collect()
    }

    /// Blocks until every live worker has finished.
    pub fn wait_idle(&mut self) {
        for worker in self.workers.drain(..) {
            if worker.handle.join().is_err() {
                warn!("worker thread panicked");
            }
        }
    }

    fn reap(&mut self) {
        let (finished, live): (Vec<_>, Vec<_>) = self.workers
            .drain(..)
            .partition(|worker| worker.handle.is_finished());
        self.workers = live;

        for worker in finished {
            if worker.handle.join().is_err() {
                warn!("worker thread panicked");
            }
        }
    }
}

impl<A> Default for WorkerPool<A>
where
    A: Clone + PartialEq + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}
