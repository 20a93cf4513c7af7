//! Update Queue
//!
//! The queue batches re-evaluations. A watcher attached to a queue does not
//! re-run inside [`Dep::notify`](crate::reactive::Dep::notify). It enqueues
//! itself instead, and the embedder decides when to [`flush`](UpdateQueue::flush).
//!
//! # Algorithm
//!
//! 1. `queue` ignores a job that is already pending, so any number of
//!    notifications before a flush collapse into one run.
//! 2. `flush` sorts pending jobs by [`SubscriberId`], which is creation order:
//!    a parent's watcher runs before the watchers of children it created.
//! 3. For each job: call `before`, clear its pending mark, call `run`.
//! 4. A job queued while the flush is running is spliced in by ID after the
//!    current position, so it still runs in this flush.
//! 5. A job that keeps re-queueing itself is cut off after
//!    `max_update_count` rounds.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::config::QueueConfig;
use crate::error::{ReactiveError, Result};
use crate::reactive::SubscriberId;

/// A unit of work the queue can run.
pub trait Job: Send + Sync {
    /// Identity used for de-duplication and ordering.
    fn id(&self) -> SubscriberId;

    /// Hook run right before [`run`](Job::run) during a flush.
    fn before(&self) {}

    /// Perform the deferred work.
    fn run(&self);
}

#[derive(Default)]
struct QueueState {
    jobs: Vec<Arc<dyn Job>>,
    pending: HashSet<SubscriberId>,
    circular: HashMap<SubscriberId, u32>,
    flushing: bool,
    index: usize,
}

impl QueueState {
    fn reset(&mut self) {
        self.jobs.clear();
        self.pending.clear();
        self.circular.clear();
        self.flushing = false;
        self.index = 0;
    }
}

/// A de-duplicating, ID-ordered queue of pending jobs.
///
/// Cloning an `UpdateQueue` creates a new handle to the same queue.
#[derive(Clone)]
pub struct UpdateQueue {
    state: Arc<Mutex<QueueState>>,
    config: QueueConfig,
}

impl UpdateQueue {
    /// Create a queue with the default configuration.
    pub fn new() -> Self {
        Self::with_config(QueueConfig::default())
    }

    /// Create a queue with the given configuration.
    pub fn with_config(config: QueueConfig) -> Self {
        Self {
            state: Arc::new(Mutex::new(QueueState::default())),
            config,
        }
    }

    /// Get the queue's configuration.
    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Add `job` unless it is already pending.
    ///
    /// Returns `true` if the job was added.
    pub fn queue(&self, job: Arc<dyn Job>) -> bool {
        let id = job.id();
        let mut state = self.state.lock();

        if !state.pending.insert(id) {
            return false;
        }

        if state.flushing {
            // Keep the not-yet-run tail sorted by ID.
            let mut pos = state.jobs.len();
            while pos > state.index + 1 && state.jobs[pos - 1].id() > id {
                pos -= 1;
            }
            state.jobs.insert(pos, job);
        } else {
            state.jobs.push(job);
        }

        true
    }

    /// Run every pending job, including jobs queued while flushing.
    ///
    /// Returns the number of jobs that ran. Calling `flush` from inside a job
    /// returns `Ok(0)` without doing anything, the outer flush picks up the
    /// new work.
    ///
    /// # Errors
    ///
    /// Returns [`ReactiveError::InfiniteUpdateLoop`] if one job re-queues
    /// itself more than `max_update_count` times. The remaining jobs are
    /// dropped.
    pub fn flush(&self) -> Result<usize> {
        {
            let mut state = self.state.lock();
            if state.flushing {
                return Ok(0);
            }
            state.flushing = true;
            state.index = 0;
            state.jobs.sort_by_key(|job| job.id());
            debug!(jobs = state.jobs.len(), "flushing update queue");
        }

        // Restores the queue even if a job panics.
        let _reset = ResetOnDrop(&self.state);
        let mut ran = 0;

        loop {
            let job = {
                let state = self.state.lock();
                match state.jobs.get(state.index) {
                    Some(job) => Arc::clone(job),
                    None => break,
                }
            };
            let id = job.id();

            job.before();
            self.state.lock().pending.remove(&id);
            job.run();
            ran += 1;

            let mut state = self.state.lock();
            if state.pending.contains(&id) {
                let count = state.circular.entry(id).or_insert(0);
                *count += 1;
                if *count > self.config.max_update_count {
                    warn!(
                        subscriber = %id,
                        limit = self.config.max_update_count,
                        "possible infinite update loop"
                    );
                    return Err(ReactiveError::InfiniteUpdateLoop {
                        id,
                        limit: self.config.max_update_count,
                    });
                }
            }
            state.index += 1;
        }

        debug!(ran, "update queue flushed");
        Ok(ran)
    }

    /// Number of jobs waiting to run.
    pub fn len(&self) -> usize {
        let state = self.state.lock();
        state.jobs.len() - state.index.min(state.jobs.len())
    }

    /// Check if no jobs are waiting.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Check if `id` is waiting to run.
    pub fn is_pending(&self, id: SubscriberId) -> bool {
        self.state.lock().pending.contains(&id)
    }

    /// Check if a flush is in progress.
    pub fn is_flushing(&self) -> bool {
        self.state.lock().flushing
    }
}

impl Default for UpdateQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for UpdateQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpdateQueue")
            .field("pending", &self.len())
            .field("flushing", &self.is_flushing())
            .field("config", &self.config)
            .finish()
    }
}

struct ResetOnDrop<'a>(&'a Mutex<QueueState>);

impl Drop for ResetOnDrop<'_> {
    fn drop(&mut self) {
        // Drop the jobs after releasing the lock: a job's destructor may
        // touch the queue.
        let jobs = {
            let mut state = self.0.lock();
            let jobs = std::mem::take(&mut state.jobs);
            state.reset();
            jobs
        };
        drop(jobs);
    }
}
