//! Host schedulers for background tasks.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::task::JoinSet;

use crate::task::{BackgroundTask, TaskKind, TaskRecord};

/// Scheduler contract supplied by the host.
///
/// Implementations must run every task to completion independently of the
/// response that scheduled it. No ordering between tasks is promised.
pub trait WaitUntil: Send + Sync {
    /// Hand a task to the scheduler.
    fn wait_until(&self, task: BackgroundTask);
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Queues tasks until the caller drains them.
///
/// Useful where the host owns its own event loop (and in tests, where
/// draining at a chosen moment makes background effects observable).
#[derive(Debug, Default)]
pub struct DeferredTasks {
    queue: Mutex<VecDeque<BackgroundTask>>,
    history: Mutex<Vec<TaskRecord>>,
}

impl DeferredTasks {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tasks waiting to run.
    pub fn pending(&self) -> usize {
        lock(&self.queue).len()
    }

    /// Every task ever scheduled, in scheduling order.
    pub fn history(&self) -> Vec<TaskRecord> {
        lock(&self.history).clone()
    }

    /// Count scheduled tasks of one kind.
    pub fn scheduled(&self, kind: TaskKind) -> usize {
        lock(&self.history).iter().filter(|r| r.kind == kind).count()
    }

    /// Run queued tasks one at a time until the queue is empty.
    ///
    /// Tasks scheduled while draining are run as well. Returns how many ran.
    pub async fn drain(&self) -> usize {
        let mut ran = 0;
        loop {
            let next = lock(&self.queue).pop_front();
            match next {
                Some(task) => {
                    tracing::debug!(kind = %task.kind, key = %task.key, "running deferred task");
                    task.future.await;
                    ran += 1;
                }
                None => return ran,
            }
        }
    }
}

impl WaitUntil for DeferredTasks {
    fn wait_until(&self, task: BackgroundTask) {
        lock(&self.history).push(task.record());
        lock(&self.queue).push_back(task);
    }
}

/// Spawns tasks onto the current tokio runtime.
///
/// Must be used from within a runtime context.
#[derive(Debug, Default)]
pub struct TokioWaitUntil {
    tasks: Mutex<JoinSet<()>>,
}

impl TokioWaitUntil {
    /// Create a spawner with no tasks in flight.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for every spawned task, including ones spawned meanwhile.
    pub async fn join_all(&self) {
        loop {
            let mut set = std::mem::take(&mut *lock(&self.tasks));
            if set.is_empty() {
                return;
            }
            while let Some(result) = set.join_next().await {
                if let Err(err) = result {
                    tracing::warn!(error = %err, "background task failed");
                }
            }
        }
    }
}

impl WaitUntil for TokioWaitUntil {
    fn wait_until(&self, task: BackgroundTask) {
        tracing::debug!(kind = %task.kind, key = %task.key, "spawning background task");
        lock(&self.tasks).spawn(task.future);
    }
}
