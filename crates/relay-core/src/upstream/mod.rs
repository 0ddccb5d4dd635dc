//! Upstream text-generation capability.
//!
//! The relay never talks to a concrete client directly; it holds an
//! `Arc<dyn CompletionProvider>` handed in at construction time so that tests
//! (and alternative vendors) can substitute their own implementation.

pub mod gemini;

use async_trait::async_trait;

use crate::error::UpstreamError;

/// Something that turns a prompt into one complete reply.
#[async_trait]
pub trait CompletionProvider: Send + Sync + 'static {
    /// Model identifier recorded alongside every exchange.
    fn model(&self) -> &str;

    /// Request a full (non-incremental) completion for `prompt`.
    async fn complete(&self, prompt: &str) -> Result<String, UpstreamError>;
}
