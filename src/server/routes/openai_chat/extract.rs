use crate::config::CONFIG;
use crate::error::OpenAiChatError;
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
use pollux_schema::openai_chat::ChatCompletionRequest;
use std::borrow::Borrow;

pub struct OpenAiChatPreprocess(pub ChatCompletionRequest, pub OpenAiChatContext);

/// Resolved dispatch target for one `/v1/chat/completions` request, computed
/// once at extraction time from the model-alias table so the handler never
/// has to re-derive it.
#[derive(Debug, Clone)]
pub struct OpenAiChatContext {
    pub provider: ProviderKind,
    pub model_mask: u64,
    pub prep: ModelPreprocessed,
    pub conversation_id: Option<String>,
}

impl<S> FromRequest<S> for OpenAiChatPreprocess
where
    S: Send + Sync + Borrow<PolluxState>,
{
    type Rejection = OpenAiChatError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let conversation_id = req
            .headers()
            .get("conversation_id")
            .or_else(|| req.headers().get("session_id"))
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let Json(body) = Json::<ChatCompletionRequest>::from_request(req, &()).await?;

        let state = state.borrow();
        let alias_table = CONFIG.protocols.alias_table();
        let prep = translate::preprocess(&body.model, &alias_table);

        let Some((provider, model_mask)) = resolve_target(&prep, state) else {
            return Err(OpenAiChatError::RequestRejected {
                status: StatusCode::BAD_REQUEST,
                code: "model_not_found",
                message: format!("unsupported model: {}", prep.model),
            });
        };

        Ok(OpenAiChatPreprocess(
            body,
            OpenAiChatContext {
                provider,
                model_mask,
                prep,
                conversation_id,
            },
        ))
    }
}

/// `prep.provider` only ever names Gemini CLI or Antigravity (Codex is not a
/// valid alias target); unaliased requests default to Gemini CLI.
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
