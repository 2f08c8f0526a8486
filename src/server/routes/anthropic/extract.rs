use crate::config::CONFIG;
use crate::error::AnthropicError;
use crate::model_catalog;
use crate::providers::geminicli;
use crate::providers::manifest::ProviderKind;
use crate::server::router::PolluxState;
use crate::translate::{self, ModelPreprocessed};
use axum::{
    Json,
    extract::{FromRequest, Request},
    http::StatusCode,
};
use pollux_schema::anthropic::AnthropicRequest;
use std::borrow::Borrow;

pub struct AnthropicPreprocess(pub AnthropicRequest, pub AnthropicContext);

#[derive(Debug, Clone)]
pub struct AnthropicContext {
    pub provider: ProviderKind,
    pub model_mask: u64,
    pub prep: ModelPreprocessed,
    pub conversation_id: Option<String>,
}

impl<S> FromRequest<S> for AnthropicPreprocess
where
    S: Send + Sync + Borrow<PolluxState>,
{
    type Rejection = AnthropicError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let conversation_id = req
            .headers()
            .get("conversation_id")
            .or_else(|| req.headers().get("session_id"))
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let Json(body) = Json::<AnthropicRequest>::from_request(req, &()).await?;

        let state = state.borrow();
        let alias_table = CONFIG.protocols.alias_table();
        let prep = translate::preprocess(&body.model, &alias_table);

        let Some((provider, model_mask)) = resolve_target(&prep, state) else {
            return Err(AnthropicError::RequestRejected {
                status: StatusCode::BAD_REQUEST,
                error_type: "invalid_request_error",
                message: format!("unsupported model: {}", prep.model),
            });
        };

        Ok(AnthropicPreprocess(
            body,
            AnthropicContext {
                provider,
                model_mask,
                prep,
                conversation_id,
            },
        ))
    }
}

fn resolve_target(prep: &ModelPreprocessed, state: &PolluxState) -> Option<(ProviderKind, u64)> {
    match prep.provider {
        Some(ProviderKind::Antigravity) => {
            let is_allowed = state
                .providers
                .antigravity_cfg
                .model_list
                .iter()
                .any(|m| m == &prep.model);
            if !is_allowed {
                return None;
            }
            model_catalog::mask(&prep.model).map(|mask| (ProviderKind::Antigravity, mask))
        }
        _ => geminicli::model_mask(&prep.model).map(|mask| (ProviderKind::GeminiCli, mask)),
    }
}

/// `/v1/messages/count_tokens` never dispatches upstream, so it only needs
/// the deserialized body.
pub struct CountTokensPreprocess(pub AnthropicRequest);

impl<S> FromRequest<S> for CountTokensPreprocess
where
    S: Send + Sync,
{
    type Rejection = AnthropicError;

    async fn from_request(req: Request, _state: &S) -> Result<Self, Self::Rejection> {
        let Json(body) = Json::<AnthropicRequest>::from_request(req, &()).await?;
        Ok(CountTokensPreprocess(body))
    }
}
