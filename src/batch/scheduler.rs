//! Batch job scheduler using Rayon.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use rayon::prelude::*;

use super::job::JobResult;
use crate::error::{MicroImgError, Result};

/// Runs independent jobs on a dedicated thread pool.
pub struct BatchScheduler {
    /// Number of threads to use.
    num_threads: usize,

    /// Cancellation flag.
    cancelled: Arc<AtomicBool>,

    /// Number of jobs completed.
    completed: Arc<AtomicUsize>,
}

impl BatchScheduler {
    /// Create a new scheduler with the specified number of threads.
    pub fn new(num_threads: usize) -> Self {
        Self {
            num_threads: num_threads.max(1),
            cancelled: Arc::new(AtomicBool::new(false)),
            completed: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Get the number of threads.
    pub fn num_threads(&self) -> usize {
        self.num_threads
    }

    /// Get the number of completed jobs.
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    /// Request cancellation. Jobs not yet started are reported as cancelled.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Check if cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Reset the scheduler state.
    pub fn reset(&self) {
        self.cancelled.store(false, Ordering::SeqCst);
        self.completed.store(0, Ordering::SeqCst);
    }

    /// Run `processor` over `items` in parallel.
    ///
    /// Results come back in input order.
    pub fn schedule<T, R, F>(&self, items: Vec<T>, processor: F) -> Result<Vec<JobResult<R>>>
    where
        T: Send,
        R: Send,
        F: Fn(&T) -> Result<R> + Send + Sync,
    {
        self.schedule_with_progress(items, processor, |_, _| {})
    }

    /// Run `processor` over `items`, calling `progress(done, total)` after each job.
    pub fn schedule_with_progress<T, R, F, P>(
        &self,
        items: Vec<T>,
        processor: F,
        progress: P,
    ) -> Result<Vec<JobResult<R>>>
    where
        T: Send,
        R: Send,
        F: Fn(&T) -> Result<R> + Send + Sync,
        P: Fn(usize, usize) + Send + Sync,
    {
        let cancelled = self.cancelled.clone();
        let completed = self.completed.clone();
        let total = items.len();

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.num_threads)
            .build()
            .map_err(|e| MicroImgError::Internal(e.to_string()))?;

        Ok(pool.install(|| {
            items
                .into_par_iter()
                .enumerate()
                .map(|(index, item)| {
                    if cancelled.load(Ordering::SeqCst) {
                        return JobResult {
                            index,
                            outcome: Err(MicroImgError::Cancelled),
                            duration_ms: 0,
                        };
                    }

                    let start = Instant::now();
                    let outcome = processor(&item);
                    let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                    progress(done, total);

                    JobResult {
                        index,
                        outcome,
                        duration_ms: start.elapsed().as_millis() as u64,
                    }
                })
                .collect()
        }))
    }
}

impl Default for BatchScheduler {
    fn default() -> Self {
        Self::new(num_cpus::get())
    }
}
