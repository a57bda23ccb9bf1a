//! Shared plumbing for per-file batch operations: the outcome types every
//! operation reports, the cancellation token, and the bounded worker pool.

use crate::error::{Result, StagehandError};
use crate::progress::OperationProgress;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Scan,
    Gather,
    Convert,
    Restore,
    Move,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Scan => "Scan",
            Operation::Gather => "Gather",
            Operation::Convert => "Convert",
            Operation::Restore => "Restore",
            Operation::Move => "Move",
        };
        f.write_str(name)
    }
}

/// A single file that an operation could not process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileFailure {
    pub path: PathBuf,
    pub reason: String,
}

impl FileFailure {
    pub fn new<P: Into<PathBuf>, S: Into<String>>(path: P, reason: S) -> Self {
        Self {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Terminal result of a batch operation that did not fail outright.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub operation: Operation,
    pub completed: usize,
    pub failures: Vec<FileFailure>,
    pub elapsed: Duration,
}

impl BatchReport {
    pub fn empty(operation: Operation) -> Self {
        Self {
            operation,
            completed: 0,
            failures: Vec::new(),
            elapsed: Duration::ZERO,
        }
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn attempted(&self) -> usize {
        self.completed + self.failures.len()
    }

    /// Every attempted file failing turns the batch into a failure; anything
    /// else is a success carrying the failures as a side list.
    pub fn into_outcome(self) -> Result<BatchReport> {
        if self.completed == 0 && !self.failures.is_empty() {
            return Err(StagehandError::PartialFailure {
                operation: self.operation,
                failures: self.failures,
            });
        }
        Ok(self)
    }
}

/// Accumulates per-file results for one operation.
pub(crate) struct BatchTally {
    operation: Operation,
    started: Instant,
    completed: usize,
    failures: Vec<FileFailure>,
}

impl BatchTally {
    pub(crate) fn new(operation: Operation) -> Self {
        Self {
            operation,
            started: Instant::now(),
            completed: 0,
            failures: Vec::new(),
        }
    }

    pub(crate) fn success(&mut self) {
        self.completed += 1;
    }

    pub(crate) fn failure(&mut self, failure: FileFailure) {
        tracing::debug!(
            operation = %self.operation,
            path = %failure.path.display(),
            reason = %failure.reason,
            "file skipped"
        );
        self.failures.push(failure);
    }

    pub(crate) fn completed(&self) -> usize {
        self.completed
    }

    pub(crate) fn finish(self) -> BatchReport {
        BatchReport {
            operation: self.operation,
            completed: self.completed,
            failures: self.failures,
            elapsed: self.started.elapsed(),
        }
    }
}

/// Cooperative cancellation flag checked between per-file steps.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Fixed-size pool that runs per-file jobs.
pub struct WorkerPool {
    pool: rayon::ThreadPool,
    threads: usize,
}

impl WorkerPool {
    pub fn new(threads: usize) -> Result<Self> {
        let threads = threads.max(1);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|index| format!("stagehand-worker-{}", index))
            .build()
            .map_err(|e| StagehandError::Config {
                message: format!("Failed to start worker pool: {}", e),
            })?;

        Ok(Self { pool, threads })
    }

    pub fn threads(&self) -> usize {
        self.threads
    }

    /// Run `job` over `items`, preserving input order in the result. Items not
    /// yet started when `cancel` fires come back as `None`. Every finished item
    /// advances `progress` by one step.
    pub fn run<T, R, F>(
        &self,
        items: &[T],
        cancel: &CancelToken,
        progress: &OperationProgress,
        job: F,
    ) -> Vec<Option<R>>
    where
        T: Sync,
        R: Send,
        F: Fn(&T) -> R + Sync,
    {
        self.pool.install(|| {
            items
                .par_iter()
                .map(|item| {
                    if cancel.is_cancelled() {
                        return None;
                    }
                    let result = job(item);
                    progress.step();
                    Some(result)
                })
                .collect()
        })
    }
}
