// SPDX-License-Identifier: MIT

//! Model module - defines LLM model trait and implementations
//!
//! This module provides the core Model trait and shared types.
//! Model implementations are in their own submodules:
//! - [gemini] - Google's Gemini API
//! - [openai] - OpenAI's ChatGPT API

pub mod gemini;
pub mod openai;

use crate::adk::error::{ModelError, ScoutError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Configuration for model generation
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GenerationConfig {
    pub temperature: Option<f32>,
    pub max_output_tokens: Option<u32>,
    /// Ask the provider for a JSON document instead of free text
    #[serde(default)]
    pub json_output: bool,
    /// JSON schema the response must follow (only honoured by providers that support it)
    pub response_schema: Option<serde_json::Value>,
}

impl GenerationConfig {
    pub fn with_temperature(temperature: f32) -> Self {
        Self {
            temperature: Some(temperature),
            ..Default::default()
        }
    }

    /// Request structured JSON output following `schema`
    pub fn json(mut self, schema: &serde_json::Value) -> Self {
        self.json_output = true;
        self.response_schema = Some(schema.clone());
        self
    }
}

/// A message in the conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Content {
    pub role: String,
    pub parts: Vec<Part>,
}

impl Content {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            parts: vec![Part::Text(text.into())],
        }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: "model".to_string(),
            parts: vec![Part::Text(text.into())],
        }
    }

    /// Concatenated text parts, ignoring thinking output
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|p| match p {
                Part::Text(t) => Some(t.as_str()),
                Part::Thinking(_) => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }
}

/// Parts of a message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Part {
    /// Regular text output from the model
    Text(String),
    /// Thinking/reasoning content from thinking models (e.g., Gemini's thinking mode)
    Thinking(String),
}

/// Core trait for LLM model implementations
#[async_trait]
pub trait Model: Send + Sync {
    /// Model identifier as sent to the provider
    fn name(&self) -> &str;

    async fn generate_content(
        &self,
        history: &[Content],
        config: Option<&GenerationConfig>,
    ) -> Result<Content, ScoutError>;
}

/// Infer the provider from a model name when none is configured.
pub fn infer_provider(model_name: &str) -> &'static str {
    if model_name.starts_with("gpt") || model_name.starts_with("o1") || model_name.starts_with("o3")
    {
        "openai"
    } else {
        "gemini"
    }
}

/// Build a model for `provider` (or the provider inferred from `model_name`).
pub fn create_model(
    provider: Option<&str>,
    model_name: &str,
) -> Result<Arc<dyn Model>, ScoutError> {
    let provider = provider
        .map(|p| p.to_lowercase())
        .unwrap_or_else(|| infer_provider(model_name).to_string());

    log::debug!("Creating {} model '{}'", provider, model_name);

    match provider.as_str() {
        "gemini" | "google" => Ok(Arc::new(gemini::GeminiModel::new(model_name.to_string())?)),
        "openai" => Ok(Arc::new(openai::OpenAIModel::new(model_name.to_string())?)),
        other => Err(ModelError::UnsupportedProvider(other.to_string()).into()),
    }
}

/// Call `generate_content`, retrying retryable failures with linear backoff.
pub async fn generate_with_retry(
    model: &dyn Model,
    history: &[Content],
    config: Option<&GenerationConfig>,
    max_retries: u32,
) -> Result<Content, ScoutError> {
    with_retry(model.name(), max_retries, || model.generate_content(history, config)).await
}

/// Run `call` until it succeeds, fails for good, or `max_retries` retries
/// are spent. A rate limit with a known `retry_after` waits that long.
pub async fn with_retry<T, F, Fut>(label: &str, max_retries: u32, mut call: F) -> Result<T, ScoutError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ScoutError>>,
{
    let mut attempt = 0;
    loop {
        match call().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < max_retries => {
                attempt += 1;
                let delay = match &e {
                    ScoutError::Model(ModelError::RateLimited {
                        retry_after_secs: Some(secs),
                    }) => Duration::from_secs(*secs),
                    _ => Duration::from_millis(500 * attempt as u64),
                };
                log::warn!(
                    "{} failed ({}), retry {}/{} in {:?}",
                    label,
                    e,
                    attempt,
                    max_retries,
                    delay
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Strip a surrounding markdown code fence from a model's JSON answer.
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FlakyModel {
        failures: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl Model for FlakyModel {
        fn name(&self) -> &str {
            "flaky"
        }

        async fn generate_content(
            &self,
            _history: &[Content],
            _config: Option<&GenerationConfig>,
        ) -> Result<Content, ScoutError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                Err(ModelError::RateLimited {
                    retry_after_secs: Some(0),
                }
                .into())
            } else {
                Ok(Content::model("ok"))
            }
        }
    }

    #[test]
    fn test_infer_provider() {
        assert_eq!(infer_provider("gpt-4o"), "openai");
        assert_eq!(infer_provider("gemini-2.0-flash"), "gemini");
        assert_eq!(infer_provider("anything-else"), "gemini");
    }

    #[test]
    fn test_unsupported_provider() {
        let err = create_model(Some("carrier-pigeon"), "coo").err().unwrap();
        assert!(matches!(
            err,
            ScoutError::Model(ModelError::UnsupportedProvider(_))
        ));
    }

    #[test]
    fn test_content_text_skips_thinking() {
        let content = Content {
            role: "model".to_string(),
            parts: vec![
                Part::Thinking("hmm".to_string()),
                Part::Text("Hello ".to_string()),
                Part::Text("world".to_string()),
            ],
        };
        assert_eq!(content.text(), "Hello world");
    }

    #[test]
    fn test_strip_code_fence() {
        assert_eq!(strip_code_fence("```json\n{\"a\": 1}\n```"), "{\"a\": 1}");
        assert_eq!(strip_code_fence("```\n[1]\n```"), "[1]");
        assert_eq!(strip_code_fence("  {\"b\": 2} "), "{\"b\": 2}");
    }

    #[tokio::test]
    async fn test_retry_recovers_from_rate_limit() {
        let model = FlakyModel {
            failures: 2,
            calls: AtomicU32::new(0),
        };
        let result = generate_with_retry(&model, &[Content::user("hi")], None, 2)
            .await
            .unwrap();
        assert_eq!(result.text(), "ok");
        assert_eq!(model.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_with_retry_skips_non_retryable() {
        let calls = AtomicU32::new(0);
        let result: Result<(), ScoutError> = with_retry("search", 3, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(ScoutError::api("gemini", "400 Bad Request"))
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_with_retry_retries_rate_limits() {
        let calls = AtomicU32::new(0);
        let result = with_retry("search", 2, || async {
            if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(ModelError::RateLimited {
                    retry_after_secs: Some(0),
                }
                .into())
            } else {
                Ok("grounded")
            }
        })
        .await;

        assert_eq!(result.unwrap(), "grounded");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_retry_gives_up() {
        let model = FlakyModel {
            failures: 5,
            calls: AtomicU32::new(0),
        };
        let result = generate_with_retry(&model, &[Content::user("hi")], None, 1).await;
        assert!(result.is_err());
        assert_eq!(model.calls.load(Ordering::SeqCst), 2);
    }
}
