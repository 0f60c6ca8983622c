//! Language-model provider abstraction and implementations.
//!
//! Defines the [`LanguageModel`] trait and two concrete implementations:
//! - **[`DisabledModel`]** — returns errors; used when no model is configured.
//! - **[`GeminiModel`]** — calls the hosted Gemini `generateContent` API.
//!
//! # Provider Selection
//!
//! Use [`create_model`] to instantiate the appropriate provider based on the
//! configuration. The Gemini provider requires the `GEMINI_API_KEY`
//! environment variable.
//!
//! # Failure Policy
//!
//! The generation call is a single attempt — no retry, no streaming. A
//! transient failure surfaces as [`LlmError::Transient`] and the caller
//! degrades to a canned reply; nothing in the answer path ever retries.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

use crate::config::LlmConfig;

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Error kinds callers branch on: an unconfigured provider is a deployment
/// state, a transient failure is a service fault. Both degrade to the same
/// canned reply at the answer layer.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("language model provider is disabled")]
    Unconfigured,
    #[error("language model request failed: {0}")]
    Transient(String),
}

/// A hosted text-generation model.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Model identifier for health reporting (e.g. `"gemini-1.5-flash"`).
    fn model_name(&self) -> &str;

    /// Generate a completion for a fully built prompt.
    async fn generate(&self, prompt: &str) -> Result<String, LlmError>;
}

/// Instantiate the provider named in the configuration.
pub fn create_model(config: &LlmConfig) -> anyhow::Result<Box<dyn LanguageModel>> {
    match config.provider.as_str() {
        "gemini" => Ok(Box::new(GeminiModel::new(config)?)),
        "disabled" => Ok(Box::new(DisabledModel)),
        other => anyhow::bail!("Unknown llm provider: {}", other),
    }
}

// ============ Disabled Provider ============

/// A no-op model that always fails. Selecting it keeps the rest of the
/// pipeline running on canned replies.
pub struct DisabledModel;

#[async_trait]
impl LanguageModel for DisabledModel {
    fn model_name(&self) -> &str {
        "disabled"
    }

    async fn generate(&self, _prompt: &str) -> Result<String, LlmError> {
        Err(LlmError::Unconfigured)
    }
}

// ============ Gemini Provider ============

/// Model provider backed by the Gemini `generateContent` endpoint.
pub struct GeminiModel {
    model: String,
    api_key: String,
    client: reqwest::Client,
}

impl GeminiModel {
    /// Create a provider from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if `GEMINI_API_KEY` is not in the environment or the
    /// HTTP client cannot be built.
    pub fn new(config: &LlmConfig) -> anyhow::Result<Self> {
        let api_key = std::env::var("GEMINI_API_KEY")
            .map_err(|_| anyhow::anyhow!("GEMINI_API_KEY environment variable not set"))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            model: config.model.clone(),
            api_key,
            client,
        })
    }
}

#[async_trait]
impl LanguageModel for GeminiModel {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String, LlmError> {
        let url = format!(
            "{}/{}:generateContent?key={}",
            GEMINI_API_BASE, self.model, self.api_key
        );

        let body = serde_json::json!({
            "contents": [{ "parts": [{ "text": prompt }] }],
            "generationConfig": { "temperature": 0.1 },
        });

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Transient(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(LlmError::Transient(format!(
                "HTTP {}: {}",
                status.as_u16(),
                detail.chars().take(200).collect::<String>()
            )));
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Transient(e.to_string()))?;

        extract_completion(&parsed)
            .ok_or_else(|| LlmError::Transient("empty completion".to_string()))
    }
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

/// Join the text parts of the first candidate; `None` when the response
/// carries no usable text.
fn extract_completion(response: &GenerateResponse) -> Option<String> {
    let content = response.candidates.first()?.content.as_ref()?;
    let text = content
        .parts
        .iter()
        .map(|p| p.text.as_str())
        .collect::<Vec<_>>()
        .join("");
    if text.trim().is_empty() {
        None
    } else {
        Some(text)
    }
}
