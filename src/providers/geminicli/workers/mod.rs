mod refresher;

pub(in crate::providers::geminicli) use refresher::{GeminiCliRefresherHandle, RefreshOutcome};
