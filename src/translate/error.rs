use thiserror::Error as ThisError;

/// Failures raised by the translation layer itself, as opposed to upstream
/// or transport failures — these are always the caller's fault and are
/// never retried by the dispatch loop.
#[derive(Debug, ThisError)]
pub enum TranslateError {
    #[error("no assistant tool_call arguments parsed as JSON and no text content: {0}")]
    InvalidToolCallArguments(String),

    #[error("failed to parse content block: {0}")]
    InvalidContent(String),
}
