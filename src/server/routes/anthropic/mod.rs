pub mod extract;
pub mod handlers;
pub mod respond;

use crate::server::router::PolluxState;
use axum::{Router, routing::post};

pub fn router() -> Router<PolluxState> {
    Router::new()
        .route("/v1/messages", post(handlers::messages_handler))
        .route("/v1/messages/count_tokens", post(handlers::count_tokens_handler))
}
