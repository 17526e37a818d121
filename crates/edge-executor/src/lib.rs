//! Background task scheduling for work that outlives a response.
//!
//! The cache engine never spawns anything itself. It describes deferred work
//! as a `BackgroundTask` and hands it to the host through `WaitUntil`:
//! - `BackgroundTask` / `TaskKind` - What to run and why
//! - `WaitUntil` - Host scheduler contract
//! - `DeferredTasks` - Queue drained explicitly by the caller
//! - `TokioWaitUntil` - Spawns onto the tokio runtime

mod scheduler;
mod task;

pub use scheduler::*;
pub use task::*;
