/// Request-scoped context extracted from the inbound path, carried alongside
/// the deserialized body from extraction through dispatch.
#[derive(Debug, Clone)]
pub struct GeminiContext {
    pub model: String,
    pub stream: bool,
    pub path: String,
    pub model_mask: u64,
    /// `conversation_id` (falling back to `session_id`) header, if the
    /// caller sent one. Keys the sticky-credential affinity cache.
    pub conversation_id: Option<String>,
}
