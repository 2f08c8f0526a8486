//! Request-log pipeline: an unbounded, fire-and-forget producer feeding a
//! single batched consumer, so logging a request never adds a database
//! round trip to the request path itself.

pub mod aggregator;
mod consumer;
mod producer;
mod types;

pub use producer::LogPipelineHandle;
pub use types::{LogUpdate, NewLogEntry};

use crate::db::DbActorHandle;
use tokio::task::JoinHandle;

/// Spawn the consumer task and return a cloneable handle plus its join
/// handle, so the caller can `handle.shutdown()` then await the join handle
/// to drain on the way out.
pub fn spawn(db: DbActorHandle) -> (LogPipelineHandle, JoinHandle<()>) {
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
    let join = tokio::spawn(consumer::run(db, rx));
    (LogPipelineHandle::new(tx), join)
}

/// Spawn the hourly aggregator as a detached background task. Unlike the
/// log consumer it owns no buffered state worth draining on shutdown — a
/// missed final wake just means that hour's summary lands on the next
/// process's first wake instead.
pub fn spawn_aggregator(db: DbActorHandle) -> JoinHandle<()> {
    tokio::spawn(aggregator::run(db))
}
