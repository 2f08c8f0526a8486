use super::types::{LogEvent, LogUpdate, NewLogEntry};
use crate::db::{DbActorHandle, NewRequestLog, RequestLogUpdate};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::{Duration, MissedTickBehavior, interval};
use tracing::{error, warn};

const FLUSH_BATCH_SIZE: usize = 50;
const FLUSH_INTERVAL: Duration = Duration::from_millis(1000);

struct Buffers {
    /// temp_id -> real database id, populated as inserts land. A mapping is
    /// dropped once the update that consumed it has been applied, so this
    /// stays bounded by in-flight requests rather than growing forever.
    temp_to_real: HashMap<u64, i64>,
    pending_inserts: Vec<(u64, NewLogEntry, DateTime<Utc>)>,
    pending_updates: Vec<(u64, LogUpdate)>,
    /// Updates whose insert hasn't landed yet; retried on the next flush.
    unresolved_updates: Vec<(u64, LogUpdate)>,
}

impl Buffers {
    fn new() -> Self {
        Self {
            temp_to_real: HashMap::new(),
            pending_inserts: Vec::new(),
            pending_updates: Vec::new(),
            unresolved_updates: Vec::new(),
        }
    }

    fn len(&self) -> usize {
        self.pending_inserts.len() + self.pending_updates.len()
    }

    fn is_idle(&self) -> bool {
        self.pending_inserts.is_empty()
            && self.pending_updates.is_empty()
            && self.unresolved_updates.is_empty()
    }
}

/// Consumer loop: batches at `FLUSH_BATCH_SIZE` buffered events or every
/// `FLUSH_INTERVAL`, whichever comes first, grouping inserts and updates
/// into their own batched DB calls each flush.
pub(super) async fn run(db: DbActorHandle, mut rx: UnboundedReceiver<LogEvent>) {
    let mut buffers = Buffers::new();
    let mut ticker = interval(FLUSH_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            event = rx.recv() => {
                match event {
                    Some(LogEvent::Insert { temp_id, entry, created_at }) => {
                        buffers.pending_inserts.push((temp_id, entry, created_at));
                    }
                    Some(LogEvent::Update { temp_id, update }) => {
                        buffers.pending_updates.push((temp_id, update));
                    }
                    Some(LogEvent::Shutdown) => {
                        flush(&db, &mut buffers).await;
                        return;
                    }
                    None => {
                        // Every handle clone dropped; nothing left to flush for.
                        return;
                    }
                }
                if buffers.len() >= FLUSH_BATCH_SIZE {
                    flush(&db, &mut buffers).await;
                }
            }
            _ = ticker.tick() => {
                if !buffers.is_idle() {
                    flush(&db, &mut buffers).await;
                }
            }
        }
    }
}

async fn flush(db: &DbActorHandle, buffers: &mut Buffers) {
    if !buffers.pending_inserts.is_empty() {
        let temp_ids: Vec<u64> = buffers
            .pending_inserts
            .iter()
            .map(|(id, _, _)| *id)
            .collect();
        let rows: Vec<NewRequestLog> = buffers
            .pending_inserts
            .drain(..)
            .map(|(_, entry, created_at)| to_new_row(entry, created_at))
            .collect();

        match db.insert_request_logs(rows).await {
            Ok(real_ids) => {
                for (temp_id, real_id) in temp_ids.into_iter().zip(real_ids) {
                    buffers.temp_to_real.insert(temp_id, real_id);
                }
            }
            Err(e) => {
                error!(
                    "log pipeline: batch insert of {} row(s) failed: {e}",
                    temp_ids.len()
                );
            }
        }
    }

    buffers
        .pending_updates
        .append(&mut buffers.unresolved_updates);

    let mut ready = Vec::new();
    let mut resolved_temp_ids = Vec::new();
    for (temp_id, update) in buffers.pending_updates.drain(..) {
        match buffers.temp_to_real.get(&temp_id) {
            Some(&real_id) => {
                ready.push(to_db_update(real_id, update));
                resolved_temp_ids.push(temp_id);
            }
            None => buffers.unresolved_updates.push((temp_id, update)),
        }
    }

    if !ready.is_empty() {
        match db.update_request_logs(ready).await {
            Ok(()) => {
                for temp_id in resolved_temp_ids {
                    buffers.temp_to_real.remove(&temp_id);
                }
            }
            Err(e) => error!("log pipeline: batch update failed: {e}"),
        }
    }

    if !buffers.unresolved_updates.is_empty() {
        warn!(
            "log pipeline: {} update(s) still waiting on an unmapped temp id",
            buffers.unresolved_updates.len()
        );
    }
}

fn to_new_row(entry: NewLogEntry, created_at: DateTime<Utc>) -> NewRequestLog {
    NewRequestLog {
        request_id: entry.request_id,
        provider: entry.provider,
        account_id: entry.account_id,
        model: entry.model,
        conversation_id: entry.conversation_id,
        session_id: entry.session_id,
        client_ip: entry.client_ip,
        user_agent: entry.user_agent,
        originator: entry.originator,
        session_stickiness_used: entry.session_stickiness_used,
        created_at,
    }
}

fn to_db_update(id: i64, update: LogUpdate) -> RequestLogUpdate {
    RequestLogUpdate {
        id,
        account_id: update.account_id,
        status_code: update.status_code,
        retry_count: update.retry_count,
        total_attempts: update.total_attempts,
        prompt_tokens: update.prompt_tokens,
        completion_tokens: update.completion_tokens,
        total_tokens: update.total_tokens,
        latency_ms: update.latency_ms,
        time_to_first_byte_ms: update.time_to_first_byte_ms,
        error_kind: update.error_kind,
        is_success: update.is_success,
        is_rate_limited: update.is_rate_limited,
        rate_limit_reset_seconds: update.rate_limit_reset_seconds,
        session_stickiness_used: update.session_stickiness_used,
        finished_at: update.finished_at,
    }
}
