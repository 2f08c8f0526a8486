mod refresher;

pub(in crate::providers::codex) use refresher::{CodexRefresherHandle, RefreshOutcome};
