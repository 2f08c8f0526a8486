//! GeminiCLI thought-signature pipeline: caches real signatures sniffed from
//! upstream responses and fills them back into follow-up requests so the
//! model doesn't see its own dummy markers echoed back.

mod adapter_request;
mod adapter_response;
mod service;

pub use service::GeminiThoughtSigService;
