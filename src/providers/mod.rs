pub mod antigravity;
pub mod codex;
pub mod geminicli;
pub mod manifest;

mod bootstrap;
mod policy;
mod provider_endpoints;
mod telemetry;
mod upstream_retry;

pub use bootstrap::Providers;
pub use policy::{ActionForError, MappingAction, UPSTREAM_BODY_PREVIEW_CHARS};
pub use telemetry::{CallTelemetry, CallTelemetrySnapshot};
