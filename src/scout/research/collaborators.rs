// SPDX-License-Identifier: MIT

//! Narrow interfaces the research nodes call out through
//!
//! Concrete adapters live in `scout::tools`; tests plug in canned mocks.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::adk::error::ScoutError;
use crate::scout::config::Configuration;

/// What the user is asking for
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum IntentType {
    #[default]
    Research,
    #[serde(alias = "youtube")]
    Video,
    Mixed,
}

impl IntentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntentType::Research => "research",
            IntentType::Video => "video",
            IntentType::Mixed => "mixed",
        }
    }

    /// Lenient parse; anything unknown is research
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "video" | "youtube" => IntentType::Video,
            "mixed" => IntentType::Mixed,
            _ => IntentType::Research,
        }
    }

    pub fn wants_video(&self) -> bool {
        matches!(self, IntentType::Video | IntentType::Mixed)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct IntentClassification {
    pub intent_type: IntentType,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default, alias = "youtube_query")]
    pub video_query: Option<String>,
    #[serde(default)]
    pub research_topic: Option<String>,
}

#[async_trait]
pub trait IntentClassifier: Send + Sync {
    async fn classify(&self, request: &str) -> Result<IntentClassification, ScoutError>;
}

#[async_trait]
pub trait QueryGenerator: Send + Sync {
    /// Up to `count` search queries for `topic`, most useful first
    async fn generate(&self, topic: &str, count: usize, context: &str) -> Result<Vec<String>, ScoutError>;
}

/// A web page backing part of a search answer
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WebSource {
    pub title: String,
    pub url: String,
}

/// A span of the result text and the sources that support it.
/// Offsets are byte offsets into the result text.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Grounding {
    pub start_index: usize,
    pub end_index: usize,
    /// Indices into [`SearchResult::sources`]
    pub source_indices: Vec<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct SearchResult {
    pub text: String,
    #[serde(default)]
    pub sources: Vec<WebSource>,
    #[serde(default)]
    pub groundings: Vec<Grounding>,
}

impl SearchResult {
    /// A result with no citations
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }
}

#[async_trait]
pub trait SearchProvider: Send + Sync {
    async fn search(&self, query: &str) -> Result<SearchResult, ScoutError>;
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Reflection {
    pub is_sufficient: bool,
    #[serde(default)]
    pub knowledge_gap: String,
    #[serde(default)]
    pub follow_up_queries: Vec<String>,
}

#[async_trait]
pub trait SufficiencyEvaluator: Send + Sync {
    async fn evaluate(&self, topic: &str, summaries: &[String]) -> Result<Reflection, ScoutError>;
}

#[async_trait]
pub trait AnswerSynthesizer: Send + Sync {
    async fn synthesize(&self, topic: &str, summaries: &[String]) -> Result<String, ScoutError>;
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Video {
    pub video_id: String,
    pub title: String,
    pub channel: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub thumbnail_url: String,
    pub duration: String,
    pub view_count: String,
    pub published_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct VideoSearchResults {
    pub videos: Vec<Video>,
    pub query: String,
    pub total_results: u64,
}

#[async_trait]
pub trait VideoSearchProvider: Send + Sync {
    /// Ordered results; an empty list when nothing matches
    async fn search_videos(&self, query: &str, max_results: usize) -> Result<VideoSearchResults, ScoutError>;
}

/// Every collaborator handle a research run needs
#[derive(Clone)]
pub struct Collaborators {
    pub classifier: Arc<dyn IntentClassifier>,
    pub query_generator: Arc<dyn QueryGenerator>,
    pub search: Arc<dyn SearchProvider>,
    pub evaluator: Arc<dyn SufficiencyEvaluator>,
    pub synthesizer: Arc<dyn AnswerSynthesizer>,
    /// `None` when no video backend is configured
    pub video: Option<Arc<dyn VideoSearchProvider>>,
}

/// Builds the collaborators for a resolved configuration. Runs that select
/// their own models get a fresh set through this.
pub trait CollaboratorFactory: Send + Sync {
    fn build(&self, config: &Configuration) -> Result<Collaborators, ScoutError>;
}

impl<F> CollaboratorFactory for F
where
    F: Fn(&Configuration) -> Result<Collaborators, ScoutError> + Send + Sync,
{
    fn build(&self, config: &Configuration) -> Result<Collaborators, ScoutError> {
        self(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_intent_accepts_youtube_alias() {
        let parsed: IntentClassification = serde_json::from_value(json!({
            "intent_type": "youtube",
            "confidence": 0.9,
            "youtube_query": "rust tutorials"
        }))
        .unwrap();

        assert_eq!(parsed.intent_type, IntentType::Video);
        assert_eq!(parsed.video_query.as_deref(), Some("rust tutorials"));
    }

    #[test]
    fn test_intent_parse_is_lenient() {
        assert_eq!(IntentType::parse(" Mixed "), IntentType::Mixed);
        assert_eq!(IntentType::parse("youtube"), IntentType::Video);
        assert_eq!(IntentType::parse("???"), IntentType::Research);
        assert!(IntentType::Mixed.wants_video());
        assert!(!IntentType::Research.wants_video());
    }

    #[test]
    fn test_reflection_defaults() {
        let parsed: Reflection = serde_json::from_value(json!({"is_sufficient": false})).unwrap();
        assert!(parsed.follow_up_queries.is_empty());
        assert_eq!(parsed.knowledge_gap, "");
    }
}
