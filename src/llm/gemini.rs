//! Gemini API client
//!
//! Implements both collaborator traits against the Google
//! generativelanguage REST API. Uses a long-lived reqwest::Client for
//! connection pooling.

use super::{EmbeddingProvider, GenerationOptions, TextGenerator};
use crate::error::PipelineError;
use crate::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{error, info};

const BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";
const GENERATION_MODEL: &str = "gemini-2.0-flash";
const EMBEDDING_MODEL: &str = "text-embedding-004";

/// Reusable Gemini client (connection-pooled)
pub struct GeminiClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl GeminiClient {
    pub fn new(api_key: String) -> Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(8)
            .build()?;

        Ok(Self {
            client,
            api_key,
            base_url: BASE_URL.to_string(),
        })
    }

    fn ensure_api_key(&self) -> Result<()> {
        if self.api_key.is_empty() {
            return Err(PipelineError::Config(
                "GEMINI_API_KEY not configured".to_string(),
            ));
        }
        Ok(())
    }

    fn endpoint(&self, model: &str, verb: &str) -> String {
        format!(
            "{}/{}:{}?key={}",
            self.base_url, model, verb, self.api_key
        )
    }
}

#[async_trait]
impl TextGenerator for GeminiClient {
    async fn generate(
        &self,
        system_instruction: &str,
        user_content: &str,
        options: &GenerationOptions,
    ) -> Result<String> {
        self.ensure_api_key()?;

        let request = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: user_content.to_string(),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: options.temperature,
                top_p: 0.9,
                top_k: 40,
                max_output_tokens: options.max_output_tokens,
            },
            system_instruction: SystemInstruction {
                parts: vec![Part {
                    text: system_instruction.to_string(),
                }],
            },
        };

        info!("Calling Gemini generateContent");

        let response = self
            .client
            .post(self.endpoint(GENERATION_MODEL, "generateContent"))
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                error!("Gemini API request failed: {}", e);
                PipelineError::Generation(format!("Gemini API error: {}", e))
            })?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!("Gemini API error response: {}", error_text);
            return Err(PipelineError::Generation(format!(
                "Gemini API error: {}",
                error_text
            )));
        }

        let body: GenerateResponse = response.json().await.map_err(|e| {
            error!("Failed to parse Gemini response: {}", e);
            PipelineError::Generation(format!("Gemini parse error: {}", e))
        })?;

        let answer = body
            .candidates
            .first()
            .and_then(|candidate| candidate.content.parts.first())
            .map(|part| part.text.clone())
            .ok_or_else(|| {
                PipelineError::Generation("Empty response from Gemini".to_string())
            })?;

        Ok(answer)
    }
}

#[async_trait]
impl EmbeddingProvider for GeminiClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.ensure_api_key()?;

        let request = EmbedRequest {
            model: format!("models/{}", EMBEDDING_MODEL),
            content: Content {
                parts: vec![Part {
                    text: text.to_string(),
                }],
            },
        };

        let response = self
            .client
            .post(self.endpoint(EMBEDDING_MODEL, "embedContent"))
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                error!("Gemini embedding request failed: {}", e);
                PipelineError::Embedding(format!("Gemini embedding error: {}", e))
            })?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!("Gemini embedding error response: {}", error_text);
            return Err(PipelineError::Embedding(format!(
                "Gemini embedding error: {}",
                error_text
            )));
        }

        let body: EmbedResponse = response.json().await.map_err(|e| {
            PipelineError::Embedding(format!("Gemini embedding parse error: {}", e))
        })?;

        if body.embedding.values.is_empty() {
            return Err(PipelineError::Embedding(
                "Empty embedding from Gemini".to_string(),
            ));
        }

        Ok(body.embedding.values)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
    system_instruction: SystemInstruction,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    top_p: f32,
    top_k: i32,
    max_output_tokens: i32,
}

#[derive(Debug, Serialize)]
struct SystemInstruction {
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Content,
}

#[derive(Debug, Serialize)]
struct EmbedRequest {
    model: String,
    content: Content,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embedding: EmbeddingValues,
}

#[derive(Debug, Deserialize)]
struct EmbeddingValues {
    values: Vec<f32>,
}
