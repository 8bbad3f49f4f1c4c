//! Model capability traits and the Ollama-backed client.
//!
//! The pipeline only sees `Embedder` and `CompletionBackend`; the real
//! implementation talks to a local Ollama instance, tests use fixed doubles.

mod ollama;

pub use ollama::{LlmError, OllamaClient};

use async_trait::async_trait;

/// Embeds a text into a vector. Deterministic for a given model; empty text
/// is embedded as-is.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError>;
}

/// Produces a completion for a prompt, bounded by `max_tokens`. The call may
/// block for the full generation duration; there is no streaming.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn complete(&self, prompt: &str, max_tokens: u32) -> Result<String, LlmError>;
}
