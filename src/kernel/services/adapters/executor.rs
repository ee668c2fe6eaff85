//! `AsyncExecutor` implementations.

use crate::kernel::observe::lock;
use crate::kernel::services::ports::{AsyncExecutor, BoxFuture};
use std::sync::Mutex;
use tokio::runtime::Handle;

/// Spawns onto a tokio runtime.
#[derive(Clone)]
pub struct TokioExecutor {
    handle: Handle,
}

impl TokioExecutor {
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Uses the runtime of the calling context.
    pub fn current() -> Option<Self> {
        Handle::try_current().ok().map(Self::new)
    }
}

impl AsyncExecutor for TokioExecutor {
    fn spawn(&self, task: BoxFuture<'static, ()>) {
        self.handle.spawn(task);
    }
}

/// Queues tasks until `run_pending` drives them, one after another, in
/// submission order. Tasks queued while draining run in the same call.
#[derive(Default)]
pub struct QueuedExecutor {
    queue: Mutex<Vec<BoxFuture<'static, ()>>>,
}

impl QueuedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending(&self) -> usize {
        lock(&self.queue).len()
    }

    pub async fn run_pending(&self) -> usize {
        let mut ran = 0;
        loop {
            let batch: Vec<_> = std::mem::take(&mut *lock(&self.queue));
            if batch.is_empty() {
                return ran;
            }
            for task in batch {
                task.await;
                ran += 1;
            }
        }
    }
}

impl AsyncExecutor for QueuedExecutor {
    fn spawn(&self, task: BoxFuture<'static, ()>) {
        lock(&self.queue).push(task);
    }
}
