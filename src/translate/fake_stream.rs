//! Support for "fake streaming" (`假流式/` model prefix): the upstream call
//! is made non-streaming while periodic heartbeat chunks keep the SSE
//! connection alive, then the complete answer is emitted as a single
//! content chunk once the upstream call finishes.

use std::time::Duration;

/// Gap between heartbeat chunks while the non-streaming upstream call is
/// still in flight.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(3);

/// Shown when the upstream returned only reasoning/thinking content and no
/// visible answer text.
pub const THINKING_PLACEHOLDER: &str = "[模型正在思考中，请稍后再试或重新提问]";

/// Shown when the upstream returned no content at all.
pub const EMPTY_PLACEHOLDER: &str = "[响应为空，请重新尝试]";

/// Resolve the text a fake-streamed content chunk should carry: the real
/// answer if there is one, else a placeholder informed by whether the
/// model at least produced reasoning/thinking content.
pub fn resolve_content(content: Option<&str>, reasoning: Option<&str>) -> String {
    match content {
        Some(c) if !c.is_empty() => c.to_string(),
        _ => match reasoning {
            Some(r) if !r.is_empty() => THINKING_PLACEHOLDER.to_string(),
            _ => EMPTY_PLACEHOLDER.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn real_content_passes_through_untouched() {
        assert_eq!(resolve_content(Some("hello"), None), "hello");
    }

    #[test]
    fn empty_content_with_reasoning_uses_thinking_placeholder() {
        assert_eq!(resolve_content(Some(""), Some("pondering...")), THINKING_PLACEHOLDER);
        assert_eq!(resolve_content(None, Some("pondering...")), THINKING_PLACEHOLDER);
    }

    #[test]
    fn both_empty_uses_empty_placeholder() {
        assert_eq!(resolve_content(Some(""), None), EMPTY_PLACEHOLDER);
        assert_eq!(resolve_content(None, None), EMPTY_PLACEHOLDER);
        assert_eq!(resolve_content(None, Some("")), EMPTY_PLACEHOLDER);
    }
}
