//! Progress gauge for long-running operations.
//!
//! Listeners only ever see the latest value: the emitter keeps a single slot
//! that each update overwrites, so a producer never waits on a consumer and
//! having no listeners at all is fine.

use crate::batch::Operation;
use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ProgressEvent {
    /// `None` until the first operation starts.
    pub operation: Option<Operation>,
    /// Completion fraction in `[0.0, 1.0]`.
    pub fraction: f64,
}

impl ProgressEvent {
    pub fn idle() -> Self {
        Self {
            operation: None,
            fraction: 0.0,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.fraction >= 1.0
    }
}

#[derive(Debug, Clone)]
pub struct ProgressEmitter {
    sender: Arc<watch::Sender<ProgressEvent>>,
}

impl ProgressEmitter {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(ProgressEvent::idle());
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn subscribe(&self) -> ProgressListener {
        ProgressListener {
            receiver: self.sender.subscribe(),
        }
    }

    pub fn latest(&self) -> ProgressEvent {
        *self.sender.borrow()
    }

    /// Start a fresh stream at 0.0 for `operation`, replacing whatever the
    /// previous operation left behind.
    pub fn begin(&self, operation: Operation, total: usize) -> OperationProgress {
        self.sender.send_replace(ProgressEvent {
            operation: Some(operation),
            fraction: 0.0,
        });

        OperationProgress {
            sender: Arc::clone(&self.sender),
            operation,
            total,
            done: AtomicUsize::new(0),
        }
    }
}

impl Default for ProgressEmitter {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle owned by one running operation.
#[derive(Debug)]
pub struct OperationProgress {
    sender: Arc<watch::Sender<ProgressEvent>>,
    operation: Operation,
    total: usize,
    done: AtomicUsize,
}

impl OperationProgress {
    pub fn operation(&self) -> Operation {
        self.operation
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn completed(&self) -> usize {
        self.done.load(Ordering::SeqCst)
    }

    /// Record one finished file. Safe to call from worker threads.
    pub fn step(&self) {
        let done = self.done.fetch_add(1, Ordering::SeqCst) + 1;
        if self.total > 0 {
            self.publish(done as f64 / self.total as f64);
        }
    }

    pub fn finish(&self) {
        self.publish(1.0);
    }

    /// Updates from workers can arrive out of order; anything lower than the
    /// current value, or belonging to a superseded operation, is dropped.
    fn publish(&self, fraction: f64) {
        let fraction = fraction.clamp(0.0, 1.0);
        let operation = self.operation;
        self.sender.send_if_modified(|event| {
            if event.operation == Some(operation) && fraction > event.fraction {
                event.fraction = fraction;
                true
            } else {
                false
            }
        });
    }
}

#[derive(Debug, Clone)]
pub struct ProgressListener {
    receiver: watch::Receiver<ProgressEvent>,
}

impl ProgressListener {
    pub fn latest(&self) -> ProgressEvent {
        *self.receiver.borrow()
    }

    /// Wait for the next update. Returns `None` once the emitter is gone.
    pub async fn changed(&mut self) -> Option<ProgressEvent> {
        self.receiver.changed().await.ok()?;
        Some(*self.receiver.borrow_and_update())
    }

    pub fn has_changed(&self) -> bool {
        self.receiver.has_changed().unwrap_or(false)
    }
}
