use serde_json::{Value, json};

/// The ten `HARM_CATEGORY_*` thresholds, always emitted as `BLOCK_NONE` —
/// upstream content filtering is the caller's concern, not this proxy's.
const HARM_CATEGORIES: &[&str] = &[
    "HARM_CATEGORY_HARASSMENT",
    "HARM_CATEGORY_HATE_SPEECH",
    "HARM_CATEGORY_SEXUALLY_EXPLICIT",
    "HARM_CATEGORY_DANGEROUS_CONTENT",
    "HARM_CATEGORY_CIVIC_INTEGRITY",
    "HARM_CATEGORY_UNSPECIFIED",
    "HARM_CATEGORY_DEROGATORY",
    "HARM_CATEGORY_TOXICITY",
    "HARM_CATEGORY_VIOLENCE",
    "HARM_CATEGORY_SEXUAL",
];

pub fn fixed_safety_settings() -> Value {
    let settings: Vec<Value> = HARM_CATEGORIES
        .iter()
        .map(|category| json!({"category": category, "threshold": "BLOCK_NONE"}))
        .collect();
    Value::Array(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emits_ten_categories_all_block_none() {
        let settings = fixed_safety_settings();
        let arr = settings.as_array().unwrap();
        assert_eq!(arr.len(), 10);
        for entry in arr {
            assert_eq!(entry["threshold"], "BLOCK_NONE");
        }
    }
}
