use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error as ThisError;

use super::{GeminiCliError, IsRetryable};
use crate::translate::TranslateError;
use pollux_schema::AnthropicErrorBody;

/// Errors surfaced by the `/v1/messages` and `/v1/messages/count_tokens`
/// ingress routes. Mirrors [`super::OpenAiChatError`] but presents
/// Anthropic's `{"type":"error","error":{...}}` envelope.
#[derive(Debug, ThisError)]
pub enum AnthropicError {
    #[error("Request rejected: {message}")]
    RequestRejected {
        status: StatusCode,
        error_type: &'static str,
        message: String,
    },

    #[error("translation failed: {0}")]
    Translate(#[from] TranslateError),

    #[error("upstream error: {0}")]
    Upstream(#[from] GeminiCliError),
}

impl From<JsonRejection> for AnthropicError {
    fn from(rejection: JsonRejection) -> Self {
        AnthropicError::RequestRejected {
            status: StatusCode::BAD_REQUEST,
            error_type: "invalid_request_error",
            message: rejection.to_string(),
        }
    }
}

impl From<crate::PolluxError> for AnthropicError {
    fn from(err: crate::PolluxError) -> Self {
        AnthropicError::Upstream(GeminiCliError::from(err))
    }
}

fn anthropic_error_type_for_status(status: StatusCode) -> &'static str {
    match status {
        StatusCode::TOO_MANY_REQUESTS => "rate_limit_error",
        StatusCode::UNAUTHORIZED => "authentication_error",
        StatusCode::FORBIDDEN => "permission_error",
        StatusCode::NOT_FOUND => "not_found_error",
        StatusCode::BAD_REQUEST => "invalid_request_error",
        s if s.is_server_error() => "api_error",
        _ => "api_error",
    }
}

impl IntoResponse for AnthropicError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match self {
            AnthropicError::RequestRejected {
                status,
                error_type,
                message,
            } => {
                tracing::warn!(status = %status, error_type, message = %message, "Messages request rejected");
                (status, error_type, message)
            }
            AnthropicError::Translate(e) => {
                tracing::warn!(error = %e, "Messages translation error");
                (StatusCode::BAD_REQUEST, "invalid_request_error", e.to_string())
            }
            AnthropicError::Upstream(e) => {
                let (status, message) = e.status_and_message();
                let error_type = anthropic_error_type_for_status(status);
                (status, error_type, message)
            }
        };

        let body = AnthropicErrorBody::new(error_type, message);
        (status, Json(body)).into_response()
    }
}

impl IsRetryable for AnthropicError {
    fn is_retryable(&self) -> bool {
        match self {
            AnthropicError::Upstream(e) => e.is_retryable(),
            _ => false,
        }
    }
}
