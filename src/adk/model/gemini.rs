// SPDX-License-Identifier: MIT

//! Gemini Model - Google's Gemini API implementation

use super::{Content, GenerationConfig, Model, Part};
use crate::adk::error::{ModelError, ScoutError};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use std::env;

pub(crate) const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Read the Gemini key from `GOOGLE_API_KEY`, falling back to `GEMINI_API_KEY`.
pub fn gemini_api_key() -> Result<String, ScoutError> {
    env::var("GOOGLE_API_KEY")
        .or_else(|_| env::var("GEMINI_API_KEY"))
        .map_err(|_| ModelError::ApiKeyMissing("gemini".to_string()).into())
}

/// Google Gemini model implementation
pub struct GeminiModel {
    client: Client,
    api_key: String,
    model_name: String,
}

impl GeminiModel {
    /// Create a new GeminiModel
    ///
    /// Requires `GOOGLE_API_KEY` (or `GEMINI_API_KEY`) environment variable to be set.
    pub fn new(model_name: String) -> Result<Self, ScoutError> {
        Ok(Self {
            client: Client::new(),
            api_key: gemini_api_key()?,
            model_name,
        })
    }
}

/// Build the `generateContent` request body for a conversation.
pub fn build_request_body(history: &[Content], config: Option<&GenerationConfig>) -> Value {
    let mut system_parts = Vec::new();
    let mut contents = Vec::new();

    for c in history {
        let parts: Vec<Value> = c.parts.iter().filter_map(part_to_gemini_json).collect();
        if c.role == "system" {
            system_parts.extend(parts);
        } else {
            contents.push(json!({ "role": c.role, "parts": parts }));
        }
    }

    let mut body = json!({ "contents": contents });

    if !system_parts.is_empty() {
        body["systemInstruction"] = json!({ "parts": system_parts });
    }

    if let Some(config) = config {
        let mut generation = json!({});
        if let Some(t) = config.temperature {
            generation["temperature"] = json!(t);
        }
        if let Some(max) = config.max_output_tokens {
            generation["maxOutputTokens"] = json!(max);
        }
        if config.json_output {
            generation["responseMimeType"] = json!("application/json");
            if let Some(schema) = &config.response_schema {
                generation["responseSchema"] = schema.clone();
            }
        }
        body["generationConfig"] = generation;
    }

    body
}

/// Map a non-success HTTP status to a typed error
pub(crate) fn status_error(provider: &str, status: StatusCode, text: String) -> ScoutError {
    if status == StatusCode::TOO_MANY_REQUESTS {
        ModelError::RateLimited {
            retry_after_secs: None,
        }
        .into()
    } else {
        ScoutError::api(provider, format!("{}: {}", status, text))
    }
}

/// Extract the first candidate of a `generateContent` response.
pub fn first_candidate(resp_json: &Value) -> Result<&Value, ScoutError> {
    let candidate = resp_json["candidates"]
        .as_array()
        .and_then(|c| c.first())
        .ok_or_else(|| ModelError::InvalidResponse("No candidates in response".to_string()))?;

    if let Some(finish_reason) = candidate.get("finishReason").and_then(|v| v.as_str()) {
        log::debug!("Gemini finish reason: {}", finish_reason);
        if finish_reason == "SAFETY" {
            return Err(ModelError::InvalidResponse(
                "Gemini blocked response due to safety filters".to_string(),
            )
            .into());
        }
    }

    Ok(candidate)
}

/// Parse the parts of a candidate into our Content
pub fn parse_candidate_content(candidate: &Value) -> Result<Content, ScoutError> {
    let parts_json = candidate
        .get("content")
        .and_then(|c| c.get("parts"))
        .and_then(|p| p.as_array())
        .ok_or_else(|| {
            log::error!("No parts in candidate: {}", candidate);
            ModelError::InvalidResponse("No content parts in Gemini response".to_string())
        })?;

    Ok(Content {
        role: "model".to_string(),
        parts: parts_json.iter().flat_map(parse_gemini_part).collect(),
    })
}

#[async_trait]
impl Model for GeminiModel {
    fn name(&self) -> &str {
        &self.model_name
    }

    async fn generate_content(
        &self,
        history: &[Content],
        config: Option<&GenerationConfig>,
    ) -> Result<Content, ScoutError> {
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            GEMINI_BASE_URL, self.model_name, self.api_key
        );

        let body = build_request_body(history, config);

        log::debug!(
            "Gemini request body: {}",
            serde_json::to_string_pretty(&body).unwrap_or_default()
        );

        let resp = self.client.post(&url).json(&body).send().await?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await?;
            return Err(status_error("gemini", status, text));
        }

        let resp_json: Value = resp.json().await?;
        log::debug!("Gemini response: {}", resp_json);

        parse_candidate_content(first_candidate(&resp_json)?)
    }
}

/// Serialize a Part to Gemini API JSON format
/// Returns None for parts that shouldn't be sent (e.g., Thinking)
pub fn part_to_gemini_json(part: &Part) -> Option<Value> {
    match part {
        Part::Text(t) => Some(json!({ "text": t })),
        Part::Thinking(_) => None,
    }
}

/// Parse a Gemini API JSON part into Parts
pub fn parse_gemini_part(p: &Value) -> Vec<Part> {
    let mut parts = Vec::new();

    if let Some(thought) = p.get("thought").and_then(|t| t.as_str()) {
        if !thought.is_empty() {
            parts.push(Part::Thinking(thought.to_string()));
        }
    }

    if let Some(text) = p["text"].as_str() {
        parts.push(Part::Text(text.to_string()));
    }

    parts
}
