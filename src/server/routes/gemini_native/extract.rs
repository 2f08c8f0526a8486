use crate::config::CONFIG;
use crate::error::{GeminiCliError, GeminiErrorObject};
use crate::model_catalog;
use crate::providers::antigravity::AntigravityContext;
use crate::providers::geminicli::{self, GeminiContext};
use crate::server::router::PolluxState;
use crate::translate;
use crate::utils::logging::with_pretty_json_debug;
use axum::{
    Json, RequestExt,
    extract::{FromRequest, Path, Request},
    http::StatusCode,
};
use pollux_schema::gemini::GeminiGenerateContentRequest;
use std::borrow::Borrow;
use tracing::{debug, warn};

/// Resolved dispatch target for a bare `/v1beta/models/...` request: unlike
/// the provider-prefixed `geminicli`/`antigravity` routes, this one picks its
/// provider from the model-alias table instead of the URL prefix.
pub enum GeminiNativeTarget {
    GeminiCli(GeminiContext),
    Antigravity(AntigravityContext),
}

pub struct GeminiNativePreprocess(pub GeminiGenerateContentRequest, pub GeminiNativeTarget);

impl<S> FromRequest<S> for GeminiNativePreprocess
where
    S: Send + Sync + Borrow<PolluxState>,
{
    type Rejection = GeminiCliError;

    async fn from_request(mut req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Path(path) = req
            .extract_parts::<Path<String>>()
            .await
            .map_err(|rejection| GeminiCliError::RequestRejected {
                status: StatusCode::BAD_REQUEST,
                body: GeminiErrorObject::for_status(StatusCode::BAD_REQUEST, "INVALID_ARGUMENT", "invalid path"),
                debug_message: Some(rejection.to_string()),
            })?;

        let last_seg = path.split('/').next_back().map(|s| s.to_string());
        let Some(last_seg) = last_seg else {
            return Err(GeminiCliError::RequestRejected {
                status: StatusCode::BAD_REQUEST,
                body: GeminiErrorObject::for_status(StatusCode::BAD_REQUEST, "INVALID_ARGUMENT", "model not found in path"),
                debug_message: None,
            });
        };
        let raw_model = if let Some((m, _r)) = last_seg.split_once(':') {
            m.to_string()
        } else {
            last_seg
        };

        let state = state.borrow();
        let alias_table = CONFIG.protocols.alias_table();
        let prep = translate::preprocess(&raw_model, &alias_table);

        let stream = path.contains("streamGenerateContent");
        let conversation_id = req
            .headers()
            .get("conversation_id")
            .or_else(|| req.headers().get("session_id"))
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let Json(mut body) = req.extract::<Json<GeminiGenerateContentRequest>, _>().await?;

        let target = match prep.provider {
            Some(crate::providers::manifest::ProviderKind::Antigravity) => {
                let is_allowed = state
                    .providers
                    .antigravity_cfg
                    .model_list
                    .iter()
                    .any(|m| m == &prep.model);
                let Some(model_mask) = is_allowed.then(|| model_catalog::mask(&prep.model)).flatten() else {
                    return Err(reject_unsupported(&prep.model));
                };
                state.providers.antigravity_thoughtsig.patch_request(&mut body);
                GeminiNativeTarget::Antigravity(AntigravityContext {
                    model: prep.model.clone(),
                    stream,
                    path: path.clone(),
                    model_mask,
                })
            }
            _ => {
                let Some(model_mask) = geminicli::model_mask(&prep.model) else {
                    return Err(reject_unsupported(&prep.model));
                };
                state.providers.geminicli_thoughtsig.patch_request(&mut body);
                GeminiNativeTarget::GeminiCli(GeminiContext {
                    model: prep.model.clone(),
                    stream,
                    path: path.clone(),
                    model_mask,
                    conversation_id,
                })
            }
        };

        with_pretty_json_debug(&body, |pretty_body| {
            debug!(
                channel = "gemini_native",
                req.model = %prep.model,
                req.stream = stream,
                req.path = %path,
                body = %pretty_body,
                "[GeminiNative] Extracted normalized request body"
            );
        });

        Ok(GeminiNativePreprocess(body, target))
    }
}

fn reject_unsupported(model: &str) -> GeminiCliError {
    warn!("Rejected request for unsupported model: {}", model);
    GeminiCliError::RequestRejected {
        status: StatusCode::BAD_REQUEST,
        body: GeminiErrorObject::for_status(
            StatusCode::BAD_REQUEST,
            "INVALID_ARGUMENT",
            format!("unsupported model: {model}"),
        ),
        debug_message: None,
    }
}
