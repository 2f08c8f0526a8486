use crate::providers::manifest::ProviderKind;
use std::collections::HashMap;
use tracing::warn;

const FAKE_STREAM_PREFIX: &str = "假流式/";
const ANTI_TRUNCATION_PREFIX: &str = "流式抗截断/";

const SUFFIX_NOTHINKING: &str = "-nothinking";
const SUFFIX_MAXTHINKING: &str = "-maxthinking";
const SUFFIX_SEARCH: &str = "-search";

/// One alias-table entry: caller-facing name -> upstream model (+ optional
/// provider override). Source of `protocols.model_mapping_rules`.
#[derive(Debug, Clone)]
pub struct AliasRule {
    pub model: String,
    pub provider: Option<ProviderKind>,
}

/// Budget a suffix flag assigns to `generationConfig.thinkingConfig`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThinkingDirective {
    /// `-nothinking`: budget 128, `includeThoughts` only if the base model
    /// name contains "pro".
    None { include_thoughts: bool },
    /// `-maxthinking`: 24576 if base contains "flash", else 32768.
    Max { budget: u32 },
}

/// Result of preprocessing the caller's raw `model` field before it is
/// resolved to an upstream target.
#[derive(Debug, Clone)]
pub struct ModelPreprocessed {
    /// Base model name, prefixes and suffixes stripped, alias-resolved.
    pub model: String,
    /// Provider the alias table redirected to, if any.
    pub provider: Option<ProviderKind>,
    pub fake_streaming: bool,
    /// Detected but intentionally not acted on (see design notes).
    pub anti_truncation: bool,
    pub thinking: Option<ThinkingDirective>,
    pub inject_search_tool: bool,
}

/// Strip feature prefixes, suffix flags, and apply the alias table to the
/// caller's raw model string.
pub fn preprocess(raw_model: &str, alias_table: &HashMap<String, AliasRule>) -> ModelPreprocessed {
    let mut fake_streaming = false;
    let mut anti_truncation = false;
    let mut rest = raw_model;

    loop {
        if let Some(stripped) = rest.strip_prefix(FAKE_STREAM_PREFIX) {
            fake_streaming = true;
            rest = stripped;
            continue;
        }
        if let Some(stripped) = rest.strip_prefix(ANTI_TRUNCATION_PREFIX) {
            anti_truncation = true;
            rest = stripped;
            continue;
        }
        break;
    }

    let (base_after_suffix, thinking, inject_search_tool) = strip_suffixes(rest);

    let (model, provider) = apply_alias(&base_after_suffix, alias_table);

    ModelPreprocessed {
        model,
        provider,
        fake_streaming,
        anti_truncation,
        thinking,
        inject_search_tool,
    }
}

fn strip_suffixes(name: &str) -> (String, Option<ThinkingDirective>, bool) {
    let mut base = name;
    let mut thinking = None;
    let mut inject_search_tool = false;

    // Suffixes can appear in any order; strip whichever matches repeatedly.
    loop {
        if let Some(stripped) = base.strip_suffix(SUFFIX_SEARCH) {
            inject_search_tool = true;
            base = stripped;
            continue;
        }
        if let Some(stripped) = base.strip_suffix(SUFFIX_NOTHINKING) {
            thinking = Some(ThinkingDirective::None {
                include_thoughts: stripped.to_ascii_lowercase().contains("pro"),
            });
            base = stripped;
            continue;
        }
        if let Some(stripped) = base.strip_suffix(SUFFIX_MAXTHINKING) {
            let budget = if stripped.to_ascii_lowercase().contains("flash") {
                24576
            } else {
                32768
            };
            thinking = Some(ThinkingDirective::Max { budget });
            base = stripped;
            continue;
        }
        break;
    }

    (base.to_string(), thinking, inject_search_tool)
}

fn apply_alias(
    base: &str,
    alias_table: &HashMap<String, AliasRule>,
) -> (String, Option<ProviderKind>) {
    let lower = base.to_ascii_lowercase();
    let Some(rule) = alias_table.get(&lower) else {
        return (base.to_string(), None);
    };

    (rule.model.clone(), rule.provider)
}

/// Validate a provider name parsed from config (`alias_table` construction
/// happens in `config`, which calls this to decide whether to keep or drop
/// a rule's provider override). Kept here so the accepted-name set lives
/// next to the code that consumes it.
pub fn parse_target_provider(raw: &str) -> Option<ProviderKind> {
    match raw {
        "Gemini" => Some(ProviderKind::GeminiCli),
        "GeminiAntigravity" => Some(ProviderKind::Antigravity),
        other => {
            warn!(provider = other, "ignoring unknown target provider in model_mapping_rules");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alias_table() -> HashMap<String, AliasRule> {
        let mut m = HashMap::new();
        m.insert(
            "claude-sonnet-4-5".to_string(),
            AliasRule {
                model: "claude-sonnet-4-5".to_string(),
                provider: Some(ProviderKind::Antigravity),
            },
        );
        m
    }

    #[test]
    fn alias_plus_thinking_flag() {
        let table = alias_table();
        let result = preprocess("maxthinking/claude-sonnet-4-5", &table);
        // "maxthinking/" isn't one of the two recognised prefixes, so it stays
        // part of the base name and the alias lookup (case-insensitive) misses.
        assert_eq!(result.model, "maxthinking/claude-sonnet-4-5");
        assert!(result.provider.is_none());
    }

    #[test]
    fn maxthinking_suffix_on_aliased_model() {
        let table = alias_table();
        let result = preprocess("claude-sonnet-4-5-maxthinking", &table);
        assert_eq!(result.model, "claude-sonnet-4-5");
        assert_eq!(result.provider, Some(ProviderKind::Antigravity));
        assert_eq!(result.thinking, Some(ThinkingDirective::Max { budget: 32768 }));
    }

    #[test]
    fn fake_streaming_prefix_detected() {
        let table = HashMap::new();
        let result = preprocess("假流式/gemini-2.5-pro", &table);
        assert!(result.fake_streaming);
        assert_eq!(result.model, "gemini-2.5-pro");
    }

    #[test]
    fn anti_truncation_prefix_detected_but_not_implemented() {
        let table = HashMap::new();
        let result = preprocess("流式抗截断/gemini-2.5-flash", &table);
        assert!(result.anti_truncation);
        assert_eq!(result.model, "gemini-2.5-flash");
    }

    #[test]
    fn nothinking_include_thoughts_only_for_pro() {
        let table = HashMap::new();
        let pro = preprocess("gemini-2.5-pro-nothinking", &table);
        assert_eq!(
            pro.thinking,
            Some(ThinkingDirective::None {
                include_thoughts: true
            })
        );

        let flash = preprocess("gemini-2.5-flash-nothinking", &table);
        assert_eq!(
            flash.thinking,
            Some(ThinkingDirective::None {
                include_thoughts: false
            })
        );
    }

    #[test]
    fn maxthinking_budget_depends_on_flash_vs_other() {
        let table = HashMap::new();
        let flash = preprocess("gemini-2.5-flash-maxthinking", &table);
        assert_eq!(flash.thinking, Some(ThinkingDirective::Max { budget: 24576 }));

        let pro = preprocess("gemini-2.5-pro-maxthinking", &table);
        assert_eq!(pro.thinking, Some(ThinkingDirective::Max { budget: 32768 }));
    }

    #[test]
    fn search_suffix_sets_inject_flag() {
        let table = HashMap::new();
        let result = preprocess("gemini-2.5-pro-search", &table);
        assert!(result.inject_search_tool);
        assert_eq!(result.model, "gemini-2.5-pro");
    }

    #[test]
    fn unknown_provider_rule_is_ignored() {
        assert!(parse_target_provider("OpenAI").is_none());
        assert_eq!(
            parse_target_provider("GeminiAntigravity"),
            Some(ProviderKind::Antigravity)
        );
    }
}
