use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error as ThisError;

use super::{GeminiCliError, IsRetryable};
use crate::translate::TranslateError;
use pollux_schema::{OpenaiResponsesErrorBody, OpenaiResponsesErrorObject};

/// Errors surfaced by the `/v1/chat/completions` ingress route. Requests are
/// translated into the internal Gemini shape and dispatched the same way a
/// native Gemini CLI request would be; this wraps that path's failures in
/// the OpenAI Chat Completions error envelope callers expect.
#[derive(Debug, ThisError)]
pub enum OpenAiChatError {
    #[error("Request rejected: {message}")]
    RequestRejected {
        status: StatusCode,
        code: &'static str,
        message: String,
    },

    #[error("translation failed: {0}")]
    Translate(#[from] TranslateError),

    #[error("upstream error: {0}")]
    Upstream(#[from] GeminiCliError),
}

impl From<JsonRejection> for OpenAiChatError {
    fn from(rejection: JsonRejection) -> Self {
        OpenAiChatError::RequestRejected {
            status: StatusCode::BAD_REQUEST,
            code: "invalid_request_error",
            message: rejection.to_string(),
        }
    }
}

impl From<crate::PolluxError> for OpenAiChatError {
    fn from(err: crate::PolluxError) -> Self {
        OpenAiChatError::Upstream(GeminiCliError::from(err))
    }
}

impl IntoResponse for OpenAiChatError {
    fn into_response(self) -> Response {
        let (status, r#type, message) = match self {
            OpenAiChatError::RequestRejected {
                status,
                code,
                message,
            } => {
                tracing::warn!(status = %status, code, message = %message, "Chat Completions request rejected");
                (status, code.to_string(), message)
            }
            OpenAiChatError::Translate(e) => {
                tracing::warn!(error = %e, "Chat Completions translation error");
                (
                    StatusCode::BAD_REQUEST,
                    "invalid_request_error".to_string(),
                    e.to_string(),
                )
            }
            OpenAiChatError::Upstream(e) => {
                let (status, message) = e.status_and_message();
                (status, "upstream_error".to_string(), message)
            }
        };

        let body = OpenaiResponsesErrorBody {
            inner: OpenaiResponsesErrorObject {
                code: Some(status.as_u16().to_string()),
                message,
                r#type,
                param: None,
            },
        };
        (status, Json(body)).into_response()
    }
}

impl IsRetryable for OpenAiChatError {
    fn is_retryable(&self) -> bool {
        match self {
            OpenAiChatError::Upstream(e) => e.is_retryable(),
            _ => false,
        }
    }
}
