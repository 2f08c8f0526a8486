mod request;
mod response;
mod stream;

pub use request::to_gemini;
pub use response::{count_tokens, from_gemini_response};
pub use stream::{StreamState, StreamTranslator};
