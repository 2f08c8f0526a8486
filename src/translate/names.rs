use sha2::{Digest, Sha256};
use std::collections::HashMap;

const MAX_NAME_LEN: usize = 64;

/// Gemini function names must match `[A-Za-z_][A-Za-z0-9_.\-]*`, length <= 64.
/// Sanitise an arbitrary caller-supplied tool name into that shape.
///
/// If the input already satisfies the pattern (after length truncation) it
/// is returned unchanged. Otherwise invalid characters are replaced,
/// underscore runs collapsed, and a `_` + 8 hex chars of SHA-256(original)
/// is appended so two different inputs that collapse to the same sanitised
/// prefix still resolve to distinct names.
pub fn normalise(original: &str) -> String {
    if is_valid(original) && original.len() <= MAX_NAME_LEN {
        return original.to_string();
    }

    let mut out = String::with_capacity(original.len() + 1);
    let mut prefixed_leader = false;
    for (i, c) in original.chars().enumerate() {
        if c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '-' {
            if i == 0 && !(c.is_ascii_alphabetic() || c == '_') {
                if c == '.' || c == '-' {
                    // Leading '.' or '-' isn't a valid first char; replace it.
                    out.push('_');
                } else {
                    // Leading digit is a valid body char elsewhere; prefix
                    // rather than drop it so it survives in the output.
                    out.push('_');
                    out.push(c);
                    prefixed_leader = true;
                }
            } else {
                out.push(c);
            }
        } else {
            out.push('_');
        }
    }

    let collapsed = collapse_underscore_runs(&out);
    let trimmed = trim_trailing_underscores(&collapsed, original.starts_with('_') || prefixed_leader);

    let suffix = format!("_{}", &hex_digest(original)[..8]);
    let budget = MAX_NAME_LEN - suffix.len();
    let truncated: String = trimmed.chars().take(budget).collect();

    format!("{truncated}{suffix}")
}

fn is_valid(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '-')
}

fn collapse_underscore_runs(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_underscore = false;
    for c in s.chars() {
        if c == '_' {
            if !prev_underscore {
                out.push(c);
            }
            prev_underscore = true;
        } else {
            out.push(c);
            prev_underscore = false;
        }
    }
    out
}

fn trim_trailing_underscores(s: &str, keep_leading_underscore: bool) -> String {
    let trimmed_end = s.trim_end_matches('_');
    if keep_leading_underscore {
        trimmed_end.to_string()
    } else {
        trimmed_end.trim_start_matches('_').to_string()
    }
}

fn hex_digest(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// Per-request bidirectional map between a caller's original tool names and
/// their Gemini-safe sanitised equivalents, so egress tool calls can be
/// reported back under the name the caller originally used.
#[derive(Debug, Clone, Default)]
pub struct ToolNameMapper {
    original_to_sanitised: HashMap<String, String>,
    sanitised_to_original: HashMap<String, String>,
}

impl ToolNameMapper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sanitise `original`, remembering the mapping both ways, and return
    /// the sanitised name to use on the wire.
    pub fn sanitise(&mut self, original: &str) -> String {
        if let Some(existing) = self.original_to_sanitised.get(original) {
            return existing.clone();
        }

        let sanitised = normalise(original);
        self.original_to_sanitised
            .insert(original.to_string(), sanitised.clone());
        self.sanitised_to_original
            .insert(sanitised.clone(), original.to_string());
        sanitised
    }

    /// Recover the caller's original name for a sanitised name seen on
    /// egress, falling back to the sanitised name itself if it was never
    /// recorded (e.g. the model invented a tool name that wasn't declared).
    pub fn denormalise(&self, sanitised: &str) -> String {
        self.sanitised_to_original
            .get(sanitised)
            .cloned()
            .unwrap_or_else(|| sanitised.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_name_is_untouched() {
        assert_eq!(normalise("my.tool-v2"), "my.tool-v2");
    }

    #[test]
    fn invalid_chars_are_replaced_and_hashed() {
        let out = normalise("my fn!");
        assert!(out.starts_with("my_fn_"));
        // "my_fn_" (6 chars) + "_" + 8 hex chars
        assert_eq!(out.len(), "my_fn_".len() + 1 + 8);
    }

    #[test]
    fn round_trips_through_tool_name_mapper() {
        let mut mapper = ToolNameMapper::new();
        let sanitised = mapper.sanitise("my fn!");
        assert_eq!(mapper.denormalise(&sanitised), "my fn!");
    }

    #[test]
    fn different_inputs_collapsing_to_the_same_prefix_stay_distinct() {
        let mut mapper = ToolNameMapper::new();
        let a = mapper.sanitise("a!b");
        let b = mapper.sanitise("a@b");
        assert_ne!(a, b);
    }

    #[test]
    fn sanitising_the_same_name_twice_is_idempotent() {
        let mut mapper = ToolNameMapper::new();
        let first = mapper.sanitise("weird name");
        let second = mapper.sanitise("weird name");
        assert_eq!(first, second);
    }

    #[test]
    fn leading_digit_gets_a_hashed_suffix() {
        let out = normalise("2cool");
        assert!(out.starts_with("_2cool_"));
    }

    #[test]
    fn unseen_sanitised_name_denormalises_to_itself() {
        let mapper = ToolNameMapper::new();
        assert_eq!(mapper.denormalise("get_weather"), "get_weather");
    }
}
