// SPDX-License-Identifier: MIT

//! Canned collaborators for unit tests

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use super::collaborators::*;
use super::ResearchServices;
use crate::adk::error::ScoutError;
use crate::scout::workflow::graph::RunContext;
use crate::scout::workflow::state::Snapshot;

pub(crate) struct MockBackend {
    pub intent: IntentType,
    pub video_query: Option<String>,
    pub queries: Vec<String>,
    pub search_result: Option<SearchResult>,
    pub sufficient: bool,
    pub follow_ups: Vec<String>,
    pub answer: String,
    pub no_video: bool,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self {
            intent: IntentType::Research,
            video_query: None,
            queries: vec!["alpha".to_string(), "beta".to_string(), "gamma".to_string()],
            search_result: None,
            sufficient: false,
            follow_ups: Vec::new(),
            answer: "Answer.".to_string(),
            no_video: false,
        }
    }
}

#[async_trait]
impl IntentClassifier for MockBackend {
    async fn classify(&self, _request: &str) -> Result<IntentClassification, ScoutError> {
        Ok(IntentClassification {
            intent_type: self.intent,
            confidence: 0.9,
            video_query: self.video_query.clone(),
            research_topic: None,
        })
    }
}

#[async_trait]
impl QueryGenerator for MockBackend {
    async fn generate(&self, _topic: &str, _count: usize, _context: &str) -> Result<Vec<String>, ScoutError> {
        Ok(self.queries.clone())
    }
}

#[async_trait]
impl SearchProvider for MockBackend {
    async fn search(&self, query: &str) -> Result<SearchResult, ScoutError> {
        Ok(self
            .search_result
            .clone()
            .unwrap_or_else(|| SearchResult::plain(format!("Result for {}", query))))
    }
}

#[async_trait]
impl SufficiencyEvaluator for MockBackend {
    async fn evaluate(&self, _topic: &str, _summaries: &[String]) -> Result<Reflection, ScoutError> {
        Ok(Reflection {
            is_sufficient: self.sufficient,
            knowledge_gap: String::new(),
            follow_up_queries: self.follow_ups.clone(),
        })
    }
}

#[async_trait]
impl AnswerSynthesizer for MockBackend {
    async fn synthesize(&self, _topic: &str, _summaries: &[String]) -> Result<String, ScoutError> {
        Ok(self.answer.clone())
    }
}

#[async_trait]
impl VideoSearchProvider for MockBackend {
    async fn search_videos(&self, query: &str, _max_results: usize) -> Result<VideoSearchResults, ScoutError> {
        Ok(VideoSearchResults {
            videos: Vec::new(),
            query: query.to_string(),
            total_results: 0,
        })
    }
}

pub(crate) fn collaborators(backend: Arc<MockBackend>) -> Collaborators {
    Collaborators {
        classifier: backend.clone(),
        query_generator: backend.clone(),
        search: backend.clone(),
        evaluator: backend.clone(),
        synthesizer: backend.clone(),
        video: if backend.no_video {
            None
        } else {
            Some(backend as Arc<dyn VideoSearchProvider>)
        },
    }
}

pub(crate) fn context(backend: Arc<MockBackend>) -> RunContext<ResearchServices> {
    RunContext::new(ResearchServices {
        collaborators: collaborators(backend),
        initial_queries: 3,
        max_video_results: 5,
    })
}

/// Snapshot from a JSON object literal
pub(crate) fn snapshot(values: Value) -> Snapshot {
    match values {
        Value::Object(map) => Snapshot::new(map),
        _ => Snapshot::default(),
    }
}
