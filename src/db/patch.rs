use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GeminiCliPatch {
    pub email: Option<String>,
    pub refresh_token: Option<String>,
    pub access_token: Option<String>,
    pub expiry: Option<DateTime<Utc>>,
    pub status: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CodexPatch {
    pub email: Option<String>,
    pub account_id: Option<String>,
    pub sub: Option<String>,
    pub refresh_token: Option<String>,
    pub access_token: Option<String>,
    pub expiry: Option<DateTime<Utc>>,
    pub chatgpt_plan_type: Option<String>,
    pub status: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AntigravityPatch {
    pub email: Option<String>,
    pub refresh_token: Option<String>,
    pub access_token: Option<String>,
    pub expiry: Option<DateTime<Utc>>,
    pub status: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ProviderPatch {
    GeminiCli { id: u64, patch: GeminiCliPatch },
    Codex { id: u64, patch: CodexPatch },
    Antigravity { id: u64, patch: AntigravityPatch },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiCliCreate {
    pub email: Option<String>,
    pub sub: String,
    pub project_id: String,
    pub refresh_token: String,
    pub access_token: Option<String>,
    pub expiry: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodexCreate {
    pub email: Option<String>,
    pub sub: String,
    pub account_id: String,
    pub refresh_token: String,
    pub access_token: String,
    pub expiry: DateTime<Utc>,
    pub chatgpt_plan_type: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AntigravityCreate {
    pub email: Option<String>,
    /// May be missing depending on upstream/OAuth flow; DbActor will synthesize a stable value.
    pub sub: Option<String>,
    pub project_id: String,
    pub refresh_token: String,
    pub access_token: Option<String>,
    pub expiry: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
#[serde(rename_all = "snake_case")]
pub enum ProviderCreate {
    GeminiCli(GeminiCliCreate),
    Codex(CodexCreate),
    Antigravity(AntigravityCreate),
}
