// SPDX-License-Identifier: MIT

//! Research workflow nodes
//!
//! Every node turns a collaborator failure into a fail-soft delta so a run
//! always ends with a usable state.

use async_trait::async_trait;
use serde_json::{json, Value};

use super::channels::*;
use super::citations::{self, CitedSource};
use super::collaborators::{IntentType, VideoSearchResults};
use super::prompts::research_topic;
use super::{Message, ResearchServices};
use crate::adk::error::ScoutError;
use crate::scout::workflow::graph::{LoopGuard, Node, NodeInput, RunContext};
use crate::scout::workflow::state::{Snapshot, StateDelta};

pub const VIDEO_NOT_CONFIGURED: &str =
    "Video search is not configured. Please add YOUTUBE_API_KEY to your environment variables.";

fn topic_of(snapshot: &Snapshot) -> String {
    research_topic(&Message::from_snapshot(snapshot))
}

fn assistant_message(text: &str) -> Value {
    json!([Message::assistant(text).to_value()])
}

/// Counter bookkeeping only; the reflection router owns the maximum
fn loop_counter() -> LoopGuard {
    LoopGuard::new(RESEARCH_LOOP_COUNT, u32::MAX)
}

/// Decides between the research loop and the video bypass
pub struct ClassifyIntent;

#[async_trait]
impl Node<ResearchServices> for ClassifyIntent {
    async fn run(
        &self,
        input: NodeInput,
        ctx: &RunContext<ResearchServices>,
    ) -> Result<StateDelta, ScoutError> {
        let topic = topic_of(&input.snapshot);
        let result = ctx.services().collaborators.classifier.classify(&topic).await?;

        log::info!(
            "Classified request as {} (confidence {:.2})",
            result.intent_type.as_str(),
            result.confidence
        );

        let video_query = match result.video_query {
            Some(q) if result.intent_type.wants_video() && !q.trim().is_empty() => Value::String(q),
            _ => Value::Null,
        };

        Ok(StateDelta::new()
            .set(INTENT_TYPE, result.intent_type.as_str())
            .set(CONFIDENCE, result.confidence)
            .set(VIDEO_QUERY, video_query))
    }

    fn reads(&self) -> Option<&[&'static str]> {
        Some(&[MESSAGES])
    }

    fn fail_soft(&self, _input: &NodeInput, error: &ScoutError) -> StateDelta {
        log::warn!("Intent classification failed, assuming research: {}", error);
        StateDelta::new()
            .set(INTENT_TYPE, IntentType::Research.as_str())
            .set(CONFIDENCE, 0.0)
    }
}

/// Writes the first batch of search queries
pub struct GenerateQuery;

#[async_trait]
impl Node<ResearchServices> for GenerateQuery {
    async fn run(
        &self,
        input: NodeInput,
        ctx: &RunContext<ResearchServices>,
    ) -> Result<StateDelta, ScoutError> {
        let services = ctx.services();
        let topic = topic_of(&input.snapshot);
        let count = services.initial_queries;

        let context = if input.snapshot.get_str(VIDEO_QUERY).is_some() {
            "Note: the user also asked for videos, which are searched separately."
        } else {
            ""
        };

        let mut queries = services
            .collaborators
            .query_generator
            .generate(&topic, count, context)
            .await?;
        queries.retain(|q| !q.trim().is_empty());
        queries.truncate(count);

        log::info!("Generated {} search queries: {:?}", queries.len(), queries);
        Ok(StateDelta::new().set(QUERY_LIST, json!(queries)))
    }

    fn reads(&self) -> Option<&[&'static str]> {
        Some(&[MESSAGES, VIDEO_QUERY])
    }

    fn fail_soft(&self, input: &NodeInput, error: &ScoutError) -> StateDelta {
        log::warn!("Query generation failed, searching the topic itself: {}", error);
        let topic = topic_of(&input.snapshot);
        let queries = if topic.trim().is_empty() {
            vec![]
        } else {
            vec![topic]
        };
        StateDelta::new().set(QUERY_LIST, json!(queries))
    }
}

/// One search instance of a fan-out; payload `{search_query, id}`
pub struct WebResearch;

impl WebResearch {
    fn query(input: &NodeInput) -> Option<&str> {
        input.payload_str("search_query").filter(|q| !q.trim().is_empty())
    }
}

#[async_trait]
impl Node<ResearchServices> for WebResearch {
    async fn run(
        &self,
        input: NodeInput,
        ctx: &RunContext<ResearchServices>,
    ) -> Result<StateDelta, ScoutError> {
        let query = Self::query(&input)
            .ok_or_else(|| ScoutError::other("missing 'search_query' in payload"))?
            .to_string();
        let id = input
            .payload_u64("id")
            .map(|id| id as usize)
            .or(input.instance)
            .unwrap_or(0);

        log::info!("Web research #{}: {}", id, query);
        let result = ctx.services().collaborators.search.search(&query).await?;
        let (text, sources) = citations::annotate(&result, id);

        Ok(StateDelta::new()
            .set(SOURCES_GATHERED, serde_json::to_value(&sources)?)
            .set(SEARCH_QUERY, json!([query]))
            .set(WEB_RESEARCH_RESULT, json!([text])))
    }

    fn reads(&self) -> Option<&[&'static str]> {
        Some(&[])
    }

    fn fail_soft(&self, input: &NodeInput, error: &ScoutError) -> StateDelta {
        let query = Self::query(input).unwrap_or("unknown");
        StateDelta::new()
            .set(SOURCES_GATHERED, json!([]))
            .set(SEARCH_QUERY, json!([query]))
            .set(
                WEB_RESEARCH_RESULT,
                json!([format!("Error performing web research: {}", error)]),
            )
    }
}

/// Judges the gathered results and proposes follow-up queries
pub struct ReflectOnResults;

impl ReflectOnResults {
    fn bookkeeping(snapshot: &Snapshot) -> StateDelta {
        let mut delta = loop_counter().tick(snapshot);
        delta.insert(NUMBER_OF_RAN_QUERIES, snapshot.items(SEARCH_QUERY).len());
        delta
    }
}

#[async_trait]
impl Node<ResearchServices> for ReflectOnResults {
    async fn run(
        &self,
        input: NodeInput,
        ctx: &RunContext<ResearchServices>,
    ) -> Result<StateDelta, ScoutError> {
        let snapshot = &input.snapshot;
        let summaries = snapshot.strings(WEB_RESEARCH_RESULT);
        let reflection = ctx
            .services()
            .collaborators
            .evaluator
            .evaluate(&topic_of(snapshot), &summaries)
            .await?;

        log::info!(
            "Reflection pass {}: sufficient={}, {} follow-up queries",
            loop_counter().next_count(snapshot),
            reflection.is_sufficient,
            reflection.follow_up_queries.len()
        );

        let mut delta = Self::bookkeeping(snapshot);
        delta.insert(IS_SUFFICIENT, reflection.is_sufficient);
        delta.insert(KNOWLEDGE_GAP, reflection.knowledge_gap);
        delta.insert(FOLLOW_UP_QUERIES, json!(reflection.follow_up_queries));
        Ok(delta)
    }

    fn reads(&self) -> Option<&[&'static str]> {
        Some(&[MESSAGES, WEB_RESEARCH_RESULT, SEARCH_QUERY, RESEARCH_LOOP_COUNT])
    }

    fn fail_soft(&self, input: &NodeInput, error: &ScoutError) -> StateDelta {
        log::warn!("Reflection failed, finalizing with what we have: {}", error);
        let mut delta = Self::bookkeeping(&input.snapshot);
        delta.insert(IS_SUFFICIENT, true);
        delta.insert(KNOWLEDGE_GAP, format!("Reflection unavailable: {}", error));
        delta.insert(FOLLOW_UP_QUERIES, json!([]));
        delta
    }
}

/// Writes the answer and swaps citation placeholders for real URLs
pub struct FinalizeAnswer;

#[async_trait]
impl Node<ResearchServices> for FinalizeAnswer {
    async fn run(
        &self,
        input: NodeInput,
        ctx: &RunContext<ResearchServices>,
    ) -> Result<StateDelta, ScoutError> {
        let snapshot = &input.snapshot;
        let summaries = snapshot.strings(WEB_RESEARCH_RESULT);
        let narrative = ctx
            .services()
            .collaborators
            .synthesizer
            .synthesize(&topic_of(snapshot), &summaries)
            .await?;

        let gathered: Vec<CitedSource> = snapshot
            .items(SOURCES_GATHERED)
            .iter()
            .filter_map(|v| serde_json::from_value(v.clone()).ok())
            .collect();
        let (text, cited) = citations::substitute_citations(&narrative, &gathered);

        log::info!(
            "Answer ready: {} chars, {} of {} sources cited",
            text.len(),
            cited.len(),
            gathered.len()
        );

        Ok(StateDelta::new()
            .set(MESSAGES, assistant_message(&text))
            .set(FINAL_SOURCES, serde_json::to_value(&cited)?)
            .set(ANSWER, text))
    }

    fn reads(&self) -> Option<&[&'static str]> {
        Some(&[MESSAGES, WEB_RESEARCH_RESULT, SOURCES_GATHERED])
    }

    fn fail_soft(&self, _input: &NodeInput, error: &ScoutError) -> StateDelta {
        let text = format!("Unable to synthesize an answer: {}", error);
        StateDelta::new()
            .set(MESSAGES, assistant_message(&text))
            .set(FINAL_SOURCES, json!([]))
            .set(ANSWER, text)
    }
}

/// Human-readable listing of a video search
pub fn format_video_listing(query: &str, results: &VideoSearchResults) -> String {
    if results.videos.is_empty() {
        return format!(
            "Sorry, I couldn't find any videos for '{}'. Try a different search term.",
            query
        );
    }

    let mut text = format!("I found {} videos for '{}':\n\n", results.videos.len(), query);
    for (i, video) in results.videos.iter().enumerate() {
        text.push_str(&format!("{}. **{}** by {}\n", i + 1, video.title, video.channel));
        text.push_str(&format!(
            "   Duration: {} | Views: {}\n",
            video.duration, video.view_count
        ));
        text.push_str(&format!("   Published: {}\n\n", video.published_at));
    }
    text
}

/// Single-shot video search that bypasses the research loop
pub struct VideoAction;

#[async_trait]
impl Node<ResearchServices> for VideoAction {
    async fn run(
        &self,
        input: NodeInput,
        ctx: &RunContext<ResearchServices>,
    ) -> Result<StateDelta, ScoutError> {
        let services = ctx.services();
        let Some(provider) = &services.collaborators.video else {
            log::warn!("Video intent but no video provider configured");
            return Ok(StateDelta::new()
                .set(MESSAGES, assistant_message(VIDEO_NOT_CONFIGURED))
                .set(VIDEO_RESULTS, Value::Null));
        };

        let query = input
            .snapshot
            .get_str(VIDEO_QUERY)
            .filter(|q| !q.trim().is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| topic_of(&input.snapshot));

        let results = provider
            .search_videos(&query, services.max_video_results)
            .await?;
        log::info!("Video search for '{}' returned {} videos", query, results.videos.len());

        Ok(StateDelta::new()
            .set(MESSAGES, assistant_message(&format_video_listing(&query, &results)))
            .set(VIDEO_RESULTS, serde_json::to_value(&results)?))
    }

    fn reads(&self) -> Option<&[&'static str]> {
        Some(&[MESSAGES, VIDEO_QUERY])
    }

    fn fail_soft(&self, _input: &NodeInput, error: &ScoutError) -> StateDelta {
        StateDelta::new()
            .set(
                MESSAGES,
                assistant_message(&format!("Error searching videos: {}", error)),
            )
            .set(VIDEO_RESULTS, Value::Null)
    }
}
