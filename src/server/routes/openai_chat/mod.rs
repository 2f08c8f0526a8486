pub mod extract;
pub mod handlers;
pub mod respond;

use crate::server::router::PolluxState;
use axum::{Router, routing::post};

pub fn router() -> Router<PolluxState> {
    Router::new().route("/v1/chat/completions", post(handlers::chat_completions_handler))
}
