pub mod extract;
pub mod handlers;

use crate::server::router::PolluxState;
use axum::{Router, routing::post};
use handlers::gemini_native_handler;

/// Bare `/v1beta/models/{model}:generateContent`-shaped ingress, resolved
/// through the model-alias table rather than a fixed provider prefix.
pub fn router() -> Router<PolluxState> {
    Router::new().route("/v1beta/models/{*path}", post(gemini_native_handler))
}
