//! Language-model collaborator interfaces
//!
//! The pipeline only ever talks to the generative model and the embedding
//! provider through these traits, so tests can substitute deterministic
//! doubles and no stage depends on a concrete vendor client.

pub mod gemini;

pub use gemini::GeminiClient;

use crate::Result;
use async_trait::async_trait;

/// Decoding settings forwarded with every generation call.
#[derive(Debug, Clone, Copy)]
pub struct GenerationOptions {
    pub temperature: f32,
    pub max_output_tokens: i32,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            temperature: 0.2,
            max_output_tokens: 1024,
        }
    }
}

/// Text-completion style collaborator. Also serves the intent
/// classification call, which is an ordinary completion request that is
/// asked to return a single JSON object.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(
        &self,
        system_instruction: &str,
        user_content: &str,
        options: &GenerationOptions,
    ) -> Result<String>;
}

/// Embedding collaborator. Vectors have a fixed dimensionality decided by
/// the provider.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}
