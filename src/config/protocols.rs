use crate::translate::{AliasRule, parse_target_provider};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One `protocols.model_mapping_rules.<alias>` entry as it appears in TOML,
/// before the `provider` string is validated against the known set.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ModelMappingRule {
    pub model: String,
    #[serde(default)]
    pub provider: Option<String>,
}

/// Ingress-facing protocol translation settings: the caller-model alias
/// table and the streaming-prefix/safety overrides `translate` applies.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProtocolsConfig {
    /// Caller-facing model name -> upstream model (+ optional provider
    /// override). TOML: `protocols.model_mapping_rules.<alias>`.
    #[serde(default)]
    pub model_mapping_rules: HashMap<String, ModelMappingRule>,

    /// Skip TLS certificate validation for the Antigravity upstream client.
    /// TOML: `protocols.antigravity_skip_tls_validate`. Default: `false`.
    #[serde(default)]
    pub antigravity_skip_tls_validate: bool,
}

impl Default for ProtocolsConfig {
    fn default() -> Self {
        Self {
            model_mapping_rules: HashMap::new(),
            antigravity_skip_tls_validate: false,
        }
    }
}

impl ProtocolsConfig {
    /// Build the alias table `translate::model_prefs::preprocess` consumes,
    /// dropping any rule whose `provider` string isn't one of the known
    /// targets (logged and skipped, not a load-time error).
    pub fn alias_table(&self) -> HashMap<String, AliasRule> {
        self.model_mapping_rules
            .iter()
            .map(|(alias, rule)| {
                let provider = rule
                    .provider
                    .as_deref()
                    .and_then(parse_target_provider);
                (
                    alias.to_ascii_lowercase(),
                    AliasRule {
                        model: rule.model.clone(),
                        provider,
                    },
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_provider_string_drops_override_but_keeps_the_rule() {
        let mut rules = HashMap::new();
        rules.insert(
            "claude-sonnet-4-5".to_string(),
            ModelMappingRule {
                model: "claude-sonnet-4-5".to_string(),
                provider: Some("OpenAI".to_string()),
            },
        );
        let cfg = ProtocolsConfig {
            model_mapping_rules: rules,
            antigravity_skip_tls_validate: false,
        };
        let table = cfg.alias_table();
        let rule = table.get("claude-sonnet-4-5").expect("rule present");
        assert_eq!(rule.model, "claude-sonnet-4-5");
        assert!(rule.provider.is_none());
    }
}
