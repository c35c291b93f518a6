// SPDX-License-Identifier: MIT

//! Web search through Gemini's Google Search grounding tool

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use crate::adk::error::{ModelError, ScoutError};
use crate::adk::model::gemini::{
    first_candidate, gemini_api_key, parse_candidate_content, status_error, GEMINI_BASE_URL,
};
use crate::adk::model::with_retry;
use crate::scout::research::collaborators::{Grounding, SearchProvider, SearchResult, WebSource};
use crate::scout::research::prompts;

const MAX_RETRIES: u32 = 2;

pub struct GeminiSearch {
    client: Client,
    api_key: String,
    model_name: String,
}

impl GeminiSearch {
    /// Requires `GOOGLE_API_KEY` (or `GEMINI_API_KEY`)
    pub fn new(model_name: impl Into<String>) -> Result<Self, ScoutError> {
        Ok(Self {
            client: Client::new(),
            api_key: gemini_api_key()?,
            model_name: model_name.into(),
        })
    }

    fn request_body(query: &str) -> Value {
        json!({
            "contents": [{
                "role": "user",
                "parts": [{ "text": prompts::web_searcher(query, &prompts::current_date()) }]
            }],
            "tools": [{ "google_search": {} }],
            "generationConfig": { "temperature": 0.0 }
        })
    }
}

/// Pull the text, sources and grounding spans out of a `generateContent` response
pub fn parse_grounded_response(resp_json: &Value) -> Result<SearchResult, ScoutError> {
    let candidate = first_candidate(resp_json)?;
    let text = parse_candidate_content(candidate)?.text();
    if text.trim().is_empty() {
        return Err(ModelError::InvalidResponse("Empty search response".to_string()).into());
    }

    let metadata = &candidate["groundingMetadata"];

    let sources = metadata["groundingChunks"]
        .as_array()
        .map(|chunks| {
            chunks
                .iter()
                .map(|chunk| WebSource {
                    title: chunk["web"]["title"].as_str().unwrap_or_default().to_string(),
                    url: chunk["web"]["uri"].as_str().unwrap_or_default().to_string(),
                })
                .collect()
        })
        .unwrap_or_default();

    let groundings = metadata["groundingSupports"]
        .as_array()
        .map(|supports| {
            supports
                .iter()
                .filter_map(|support| {
                    let segment = &support["segment"];
                    let end_index = segment["endIndex"].as_u64()? as usize;
                    let source_indices = support["groundingChunkIndices"]
                        .as_array()?
                        .iter()
                        .filter_map(|i| i.as_u64().map(|i| i as usize))
                        .collect();
                    Some(Grounding {
                        start_index: segment["startIndex"].as_u64().unwrap_or(0) as usize,
                        end_index,
                        source_indices,
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    Ok(SearchResult {
        text,
        sources,
        groundings,
    })
}

impl GeminiSearch {
    async fn search_once(&self, query: &str) -> Result<SearchResult, ScoutError> {
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            GEMINI_BASE_URL, self.model_name, self.api_key
        );

        let resp = self
            .client
            .post(&url)
            .json(&Self::request_body(query))
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await?;
            return Err(status_error("gemini", status, text));
        }

        let resp_json: Value = resp.json().await?;
        parse_grounded_response(&resp_json)
    }
}

#[async_trait]
impl SearchProvider for GeminiSearch {
    async fn search(&self, query: &str) -> Result<SearchResult, ScoutError> {
        let label = format!("Search with {}", self.model_name);
        let result = with_retry(&label, MAX_RETRIES, || self.search_once(query)).await?;
        log::debug!(
            "Search '{}' returned {} sources, {} grounded spans",
            query,
            result.sources.len(),
            result.groundings.len()
        );
        Ok(result)
    }
}
