use super::types::{LogEvent, LogUpdate, NewLogEntry};
use chrono::Utc;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc::UnboundedSender;

/// Fire-and-forget handle to the log pipeline, cloned into every request's
/// server state. `insert`/`update` never touch the database directly and
/// never block the request path on I/O.
#[derive(Clone)]
pub struct LogPipelineHandle {
    next_temp_id: Arc<AtomicU64>,
    tx: UnboundedSender<LogEvent>,
}

impl LogPipelineHandle {
    pub(super) fn new(tx: UnboundedSender<LogEvent>) -> Self {
        Self {
            next_temp_id: Arc::new(AtomicU64::new(1)),
            tx,
        }
    }

    /// Enqueue a request's opening row. Returns a temp id immediately; the
    /// real database id isn't known until the consumer's next flush, so
    /// every later `update` call for this request references the temp id.
    pub fn insert(&self, entry: NewLogEntry) -> u64 {
        let temp_id = self.next_temp_id.fetch_add(1, Ordering::Relaxed);
        let _ = self.tx.send(LogEvent::Insert {
            temp_id,
            entry,
            created_at: Utc::now(),
        });
        temp_id
    }

    pub fn update(&self, temp_id: u64, update: LogUpdate) {
        let _ = self.tx.send(LogEvent::Update { temp_id, update });
    }

    /// Flush whatever is buffered and stop the consumer task. Called once
    /// from the graceful-shutdown path after the server stops accepting new
    /// connections.
    pub fn shutdown(&self) {
        let _ = self.tx.send(LogEvent::Shutdown);
    }
}
