mod client;
pub mod oauth;

pub use client::{AntigravityClient, AntigravityContext};
