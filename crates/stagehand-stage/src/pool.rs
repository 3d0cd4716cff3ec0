//! Worker pool shared by all stages of a build
//!
//! Thin wrapper over a rayon thread pool with named threads and task
//! accounting.

use crate::error::PoolError;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Pool statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Worker threads
    pub threads: usize,
    /// Tasks handed to the pool so far
    pub tasks_spawned: usize,
}

/// Fixed-size pool executing stage tasks
#[derive(Debug)]
pub struct WorkerPool {
    pool: rayon::ThreadPool,
    spawned: AtomicUsize,
}

impl WorkerPool {
    /// Create pool with `threads` workers
    ///
    /// # Errors
    /// Returns error if `threads` is zero or the threads cannot be started
    pub fn new(threads: usize) -> Result<Self, PoolError> {
        if threads == 0 {
            return Err(PoolError::NoThreads);
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|index| format!("stagehand-worker-{index}"))
            .build()?;
        Ok(Self {
            pool,
            spawned: AtomicUsize::new(0),
        })
    }

    /// Run `task` on a worker thread
    pub fn spawn<F>(&self, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.spawned.fetch_add(1, Ordering::Relaxed);
        self.pool.spawn(task);
    }

    /// Number of worker threads
    #[inline]
    #[must_use]
    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Current statistics
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            threads: self.threads(),
            tasks_spawned: self.spawned.load(Ordering::Relaxed),
        }
    }
}
