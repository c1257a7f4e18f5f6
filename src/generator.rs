//! Draft generator: AI summaries and reply drafts via the Gemini API

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::GeneratorConfig;
use crate::error::{MailError, Result};
use crate::models::Generation;

/// Generative-text operations used during reconciliation.
///
/// Implementations never fail: errors are reported inside the returned
/// [`Generation`].
#[async_trait]
pub trait DraftGenerator: Send + Sync {
    async fn summarize(&self, text: &str) -> Generation;

    async fn draft_reply(&self, text: &str) -> Generation;
}

#[async_trait]
impl<D: DraftGenerator + ?Sized> DraftGenerator for Arc<D> {
    async fn summarize(&self, text: &str) -> Generation {
        self.as_ref().summarize(text).await
    }

    async fn draft_reply(&self, text: &str) -> Generation {
        self.as_ref().draft_reply(text).await
    }
}

/// Prompt asking for a short bullet-point summary
pub fn summary_prompt(email: &str) -> String {
    format!(
        "Summarize the following email in 3-5 easy-to-understand bullet points.\n\
         Focus on clarity and relevance and avoid jargon.\n\
         Call out the main topics, requests, action items, and deadlines if there are any.\n\
         Use plain language suitable for a busy professional.\n\n\
         Email:\n{}\n",
        email
    )
}

/// Prompt asking for a ready-to-send reply
pub fn reply_prompt(email: &str) -> String {
    format!(
        "Write a short, professional, context-aware reply to the following email.\n\
         The reply must:\n\
         - sound natural and specific rather than generic\n\
         - address every point or question in the email\n\
         - open by greeting the sender with \"Hi\"\n\
         - be ready to send as-is, with no markdown\n\n\
         Email thread:\n{}\n",
        email
    )
}

// -- Gemini API wire types --

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: Vec<RequestPart<'a>>,
}

#[derive(Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct GenerationConfig {
    temperature: f64,
}

#[derive(Deserialize)]
struct GenerateResponse {
    candidates: Option<Vec<Candidate>>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    parts: Option<Vec<ResponsePart>>,
}

#[derive(Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

impl GenerateResponse {
    /// Concatenated text of the first candidate
    fn into_text(self) -> Option<String> {
        let parts = self
            .candidates?
            .into_iter()
            .next()?
            .content?
            .parts?;

        let text: String = parts.into_iter().filter_map(|p| p.text).collect();
        let text = text.trim();
        if text.is_empty() {
            None
        } else {
            Some(text.to_string())
        }
    }
}

/// Gemini `generateContent` client
pub struct GeminiGenerator {
    client: Client,
    base_url: String,
    model: String,
    api_key: String,
    temperature: f64,
}

impl GeminiGenerator {
    pub fn new(
        base_url: &str,
        model: &str,
        api_key: &str,
        timeout_secs: u64,
        temperature: f64,
    ) -> Result<Self> {
        if api_key.trim().is_empty() {
            return Err(MailError::ConfigError("Gemini API key is empty".to_string()));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| MailError::ConfigError(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key: api_key.to_string(),
            temperature,
        })
    }

    /// Build from config, reading the API key from the configured environment variable
    pub fn from_config(config: &GeneratorConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env).map_err(|_| {
            MailError::ConfigError(format!("{} not set in environment", config.api_key_env))
        })?;

        Self::new(
            &config.base_url,
            &config.model,
            &api_key,
            config.timeout_secs,
            config.temperature,
        )
    }

    /// POST models/{model}:generateContent and return the generated text
    async fn generate(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        let request = GenerateRequest {
            contents: vec![Content {
                role: "user",
                parts: vec![RequestPart { text: prompt }],
            }],
            generation_config: GenerationConfig {
                temperature: self.temperature,
            },
        };

        debug!("Requesting generation from {} ({} prompt chars)", self.model, prompt.len());

        let resp = self
            .client
            .post(&url)
            .header("x-goog-api-key", self.api_key.as_str())
            .json(&request)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(MailError::GenerationError(format!("HTTP {}: {}", status, body.trim())));
        }

        let parsed: GenerateResponse = resp
            .json()
            .await
            .map_err(|e| MailError::GenerationError(format!("parse failed: {}", e.without_url())))?;

        parsed
            .into_text()
            .ok_or_else(|| MailError::GenerationError("response contained no text".to_string()))
    }

    async fn run(&self, task: &str, prompt: String) -> Generation {
        match self.generate(&prompt).await {
            Ok(text) => Generation::ok(text),
            Err(e) => {
                warn!("{} generation failed: {}", task, e);
                Generation::failed(e)
            }
        }
    }
}

#[async_trait]
impl DraftGenerator for GeminiGenerator {
    async fn summarize(&self, text: &str) -> Generation {
        self.run("Summary", summary_prompt(text)).await
    }

    async fn draft_reply(&self, text: &str) -> Generation {
        self.run("Draft", reply_prompt(text)).await
    }
}
