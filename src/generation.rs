//! Text-generation backends.
//!
//! The overview pipeline talks to the model through [`GenerationBackend`].
//! Two implementations ship with the crate:
//!
//! - **[`GeminiBackend`]**: calls the Gemini `generateContent` REST endpoint.
//! - **[`DisabledBackend`]**: always fails; used when `generation.provider = "disabled"`.
//!
//! Calls are single-shot: there is no retry, and the only deadline is the
//! HTTP client timeout from `generation.timeout_secs`.

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::config::GenerationConfig;

/// Failure to obtain text from the model.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("generation provider is disabled")]
    Disabled,
    #[error("GEMINI_API_KEY is not set")]
    MissingApiKey,
    #[error("generation request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("generation API error {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("malformed generation response: {0}")]
    MalformedResponse(String),
}

/// A model that turns a prompt into text.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Short identifier used in logs (e.g. `"gemini-1.5-flash"`).
    fn name(&self) -> &str;

    async fn generate(&self, prompt: &str) -> Result<String, GenerationError>;
}

/// Builds the backend selected by `config.provider`.
///
/// A Gemini backend without an API key is still returned; its calls fail
/// with [`GenerationError::MissingApiKey`] so the server can start and
/// degrade per request.
pub fn create_backend(config: &GenerationConfig) -> anyhow::Result<Arc<dyn GenerationBackend>> {
    if !config.is_enabled() {
        return Ok(Arc::new(DisabledBackend));
    }
    match config.provider.as_str() {
        "gemini" => {
            if config.api_key.is_none() {
                tracing::warn!("GEMINI_API_KEY is not set; overviews will show the error text");
            }
            Ok(Arc::new(GeminiBackend::new(config)?))
        }
        other => anyhow::bail!("Unknown generation provider: {}", other),
    }
}

// ============ Disabled ============

pub struct DisabledBackend;

#[async_trait]
impl GenerationBackend for DisabledBackend {
    fn name(&self) -> &str {
        "disabled"
    }

    async fn generate(&self, _prompt: &str) -> Result<String, GenerationError> {
        Err(GenerationError::Disabled)
    }
}

// ============ Gemini ============

pub struct GeminiBackend {
    client: reqwest::Client,
    model: String,
    base_url: String,
    api_key: Option<String>,
}

impl GeminiBackend {
    pub fn new(config: &GenerationConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            model: config.model.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }
}

#[async_trait]
impl GenerationBackend for GeminiBackend {
    fn name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        let api_key = self.api_key.as_deref().ok_or(GenerationError::MissingApiKey)?;

        let body = serde_json::json!({
            "contents": [{ "parts": [{ "text": prompt }] }],
        });

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::Status { status, body });
        }

        let bytes = response.bytes().await?;
        parse_gemini_response(&bytes)
    }
}

#[derive(Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
}

#[derive(Deserialize)]
struct GeminiContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Deserialize)]
struct GeminiPart {
    text: Option<String>,
}

/// Joins the text parts of the first candidate.
fn parse_gemini_response(bytes: &[u8]) -> Result<String, GenerationError> {
    let parsed: GeminiResponse = serde_json::from_slice(bytes)
        .map_err(|e| GenerationError::MalformedResponse(e.to_string()))?;

    let content = parsed
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .ok_or_else(|| GenerationError::MalformedResponse("no candidate content".to_string()))?;

    let text: String = content.parts.into_iter().filter_map(|p| p.text).collect();
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_candidate_text() {
        let json = br#"{
            "candidates": [
                { "content": { "parts": [ { "text": "Apples are red [1]." }, { "text": " Bananas too [2]." } ], "role": "model" } },
                { "content": { "parts": [ { "text": "ignored" } ] } }
            ]
        }"#;
        let text = parse_gemini_response(json).unwrap();
        assert_eq!(text, "Apples are red [1]. Bananas too [2].");
    }

    #[test]
    fn missing_candidates_is_malformed() {
        let err = parse_gemini_response(br#"{"promptFeedback": {"blockReason": "SAFETY"}}"#)
            .unwrap_err();
        assert!(matches!(err, GenerationError::MalformedResponse(_)));
    }

    #[test]
    fn invalid_json_is_malformed() {
        let err = parse_gemini_response(b"<html>502</html>").unwrap_err();
        assert!(matches!(err, GenerationError::MalformedResponse(_)));
    }

    #[test]
    fn empty_parts_yield_empty_text() {
        let text = parse_gemini_response(br#"{"candidates":[{"content":{"parts":[]}}]}"#).unwrap();
        assert_eq!(text, "");
    }

    #[tokio::test]
    async fn disabled_backend_fails() {
        let err = DisabledBackend.generate("anything").await.unwrap_err();
        assert!(matches!(err, GenerationError::Disabled));
    }

    #[tokio::test]
    async fn gemini_without_key_fails_before_network() {
        let config = GenerationConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            ..GenerationConfig::default()
        };
        let backend = GeminiBackend::new(&config).unwrap();
        let err = backend.generate("prompt").await.unwrap_err();
        assert!(matches!(err, GenerationError::MissingApiKey));
    }

    #[test]
    fn endpoint_includes_model() {
        let config = GenerationConfig {
            base_url: "https://example.test/v1beta/".to_string(),
            model: "gemini-test".to_string(),
            ..GenerationConfig::default()
        };
        let backend = GeminiBackend::new(&config).unwrap();
        assert_eq!(
            backend.endpoint(),
            "https://example.test/v1beta/models/gemini-test:generateContent"
        );
    }

    #[test]
    fn create_backend_selects_provider() {
        let config = GenerationConfig {
            provider: "disabled".to_string(),
            ..GenerationConfig::default()
        };
        assert_eq!(create_backend(&config).unwrap().name(), "disabled");

        let config = GenerationConfig::default();
        assert_eq!(create_backend(&config).unwrap().name(), "gemini-1.5-flash");
    }
}
