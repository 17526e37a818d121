//! Descriptions of deferred work.

use std::fmt;
use std::future::Future;

use futures::future::BoxFuture;
use futures::FutureExt;

/// Why a background task exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    /// Refresh a cached entry from the origin.
    Revalidate,
    /// Write an entry to the cache store.
    Store,
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Revalidate => write!(f, "revalidate"),
            Self::Store => write!(f, "store"),
        }
    }
}

/// A unit of work that must run to completion after the response is sent.
pub struct BackgroundTask {
    /// What the task does.
    pub kind: TaskKind,
    /// Cache key the task operates on.
    pub key: String,
    /// The work itself.
    pub future: BoxFuture<'static, ()>,
}

impl BackgroundTask {
    /// Wrap a future as a background task.
    pub fn new<F>(kind: TaskKind, key: impl Into<String>, future: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        Self {
            kind,
            key: key.into(),
            future: future.boxed(),
        }
    }

    /// Describe the task without its future.
    pub fn record(&self) -> TaskRecord {
        TaskRecord {
            kind: self.kind,
            key: self.key.clone(),
        }
    }
}

impl fmt::Debug for BackgroundTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackgroundTask")
            .field("kind", &self.kind)
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

/// What was scheduled, kept after the task itself is consumed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskRecord {
    /// Task kind.
    pub kind: TaskKind,
    /// Cache key.
    pub key: String,
}
