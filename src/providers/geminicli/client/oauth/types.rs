use crate::error::{OauthError, PolluxError};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct TierInfo {
    pub id: String,
    pub name: Option<String>,
    pub quota_tier: Option<UserTier>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct IneligibleReason {
    pub reason_code: Option<String>,
    pub reason_message: Option<String>,
    pub tier_id: Option<UserTier>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct LoadCodeAssistResponse {
    pub current_tier: Option<TierInfo>,
    pub cloudaicompanion_project: Option<String>,
    #[serde(default)]
    pub allowed_tiers: Vec<TierInfo>,
    #[serde(default)]
    pub ineligible_tiers: Vec<IneligibleReason>,
}

impl LoadCodeAssistResponse {
    /// Fail fast if Cloud Code has no usable tier for this account, surfacing
    /// upstream's own reason rather than falling through to a vague onboarding error.
    pub fn ensure_eligible(&self, raw: Value) -> Result<(), PolluxError> {
        if self.current_tier.is_some() || !self.allowed_tiers.is_empty() {
            return Ok(());
        }

        let reason = self.ineligible_tiers.first();
        Err(OauthError::Flow {
            code: reason
                .and_then(|r| r.reason_code.clone())
                .unwrap_or_else(|| "INELIGIBLE".to_string()),
            message: reason
                .and_then(|r| r.reason_message.clone())
                .unwrap_or_else(|| "account is not eligible for any Code Assist tier".to_string()),
            details: Some(raw),
        }
        .into())
    }

    /// Prefer the tier already on the account; fall back to the first allowed
    /// tier, then to `Standard` if Cloud Code didn't name one.
    pub fn resolve_effective_tier(&self) -> UserTier {
        self.current_tier
            .as_ref()
            .and_then(|t| t.quota_tier)
            .or_else(|| self.allowed_tiers.first().and_then(|t| t.quota_tier))
            .map(UserTier::normalized)
            .unwrap_or(UserTier::Standard)
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ProjectObject {
    pub id: String,
    pub name: Option<String>,
    pub project_number: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct OnboardResultPayload {
    #[serde(rename = "cloudaicompanionProject")]
    pub project_details: Option<ProjectObject>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct OnboardOperationResponse {
    pub name: String,
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub response: Option<OnboardResultPayload>,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq)]
pub enum UserTier {
    #[serde(rename = "free-tier")]
    Free,

    #[serde(rename = "legacy-tier")]
    Legacy,

    #[serde(rename = "standard-tier")]
    Standard,

    #[serde(other)]
    Unknown,
}

impl UserTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserTier::Free => "free-tier",
            UserTier::Legacy => "legacy-tier",
            UserTier::Standard => "standard-tier",
            UserTier::Unknown => "standard-tier",
        }
    }

    /// Map unknown tiers to a safe default.
    pub fn normalized(self) -> Self {
        match self {
            UserTier::Unknown => UserTier::Standard,
            other => other,
        }
    }
}
