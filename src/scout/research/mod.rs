// SPDX-License-Identifier: MIT

//! The research workflow
//!
//! ```text
//! START -> classify_intent -+-> video_action -> END
//!                           +-> generate_query -(fan-out)-> web_research -> reflection
//!                                                  ^                           |
//!                                                  +------(fan-out)------------+
//!                                                         finalize_answer <----+-> END
//! ```

pub mod agent;
pub mod citations;
pub mod collaborators;
pub mod nodes;
pub mod prompts;
pub mod routers;
#[cfg(test)]
pub(crate) mod testing;

pub use agent::{ResearchAgent, ResearchOutcome, ResearchRequest};
pub use collaborators::Collaborators;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::adk::error::GraphError;
use crate::scout::workflow::graph::{Graph, GraphBuilder, END, START};
use crate::scout::workflow::state::{ChannelDef, FieldType, Snapshot, StateSchema};

pub const CLASSIFY_INTENT: &str = "classify_intent";
pub const VIDEO_ACTION: &str = "video_action";
pub const GENERATE_QUERY: &str = "generate_query";
pub const WEB_RESEARCH: &str = "web_research";
pub const REFLECTION: &str = "reflection";
pub const FINALIZE_ANSWER: &str = "finalize_answer";

/// State channel names
pub mod channels {
    pub const MESSAGES: &str = "messages";
    pub const INTENT_TYPE: &str = "intent_type";
    pub const CONFIDENCE: &str = "confidence";
    pub const VIDEO_QUERY: &str = "video_query";
    pub const QUERY_LIST: &str = "query_list";
    pub const SEARCH_QUERY: &str = "search_query";
    pub const WEB_RESEARCH_RESULT: &str = "web_research_result";
    pub const SOURCES_GATHERED: &str = "sources_gathered";
    pub const IS_SUFFICIENT: &str = "is_sufficient";
    pub const KNOWLEDGE_GAP: &str = "knowledge_gap";
    pub const FOLLOW_UP_QUERIES: &str = "follow_up_queries";
    pub const RESEARCH_LOOP_COUNT: &str = "research_loop_count";
    pub const NUMBER_OF_RAN_QUERIES: &str = "number_of_ran_queries";
    pub const VIDEO_RESULTS: &str = "video_results";
    pub const ANSWER: &str = "answer";
    pub const FINAL_SOURCES: &str = "final_sources";
}

/// Run-scoped services handed to every research node
pub struct ResearchServices {
    pub collaborators: Collaborators,
    /// Queries generated on the first pass
    pub initial_queries: usize,
    pub max_video_results: usize,
}

/// One conversation turn, as stored in the `messages` channel
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }

    pub fn to_value(&self) -> Value {
        json!({ "role": self.role, "content": self.content })
    }

    /// Messages of the conversation; bare strings count as user turns
    pub fn from_snapshot(snapshot: &Snapshot) -> Vec<Message> {
        snapshot
            .items(channels::MESSAGES)
            .iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(Message::user(s.clone())),
                other => serde_json::from_value(other.clone()).ok(),
            })
            .collect()
    }
}

pub fn research_schema() -> StateSchema {
    use channels::*;

    StateSchema::new()
        .channel(MESSAGES, ChannelDef::append())
        .channel(INTENT_TYPE, ChannelDef::replace(FieldType::String))
        .channel(CONFIDENCE, ChannelDef::replace(FieldType::Number))
        .channel(VIDEO_QUERY, ChannelDef::replace(FieldType::String))
        .channel(QUERY_LIST, ChannelDef::append())
        .channel(SEARCH_QUERY, ChannelDef::append())
        .channel(WEB_RESEARCH_RESULT, ChannelDef::append())
        .channel(SOURCES_GATHERED, ChannelDef::append())
        .channel(
            IS_SUFFICIENT,
            ChannelDef::replace(FieldType::Boolean).with_default(json!(false)),
        )
        .channel(KNOWLEDGE_GAP, ChannelDef::replace(FieldType::String))
        .channel(
            FOLLOW_UP_QUERIES,
            ChannelDef::replace(FieldType::Array).with_default(json!([])),
        )
        .channel(RESEARCH_LOOP_COUNT, ChannelDef::counter())
        .channel(
            NUMBER_OF_RAN_QUERIES,
            ChannelDef::replace(FieldType::Number).with_default(json!(0)),
        )
        .channel(VIDEO_RESULTS, ChannelDef::replace(FieldType::Object))
        .channel(ANSWER, ChannelDef::replace(FieldType::String))
        .channel(
            FINAL_SOURCES,
            ChannelDef::replace(FieldType::Array).with_default(json!([])),
        )
}

/// Wire the research workflow
pub fn build_research_graph() -> Result<Graph<ResearchServices>, GraphError> {
    GraphBuilder::new("research-agent-with-video")
        .schema(research_schema())
        .loop_counter(channels::RESEARCH_LOOP_COUNT)
        .node(CLASSIFY_INTENT, nodes::ClassifyIntent)
        .node(VIDEO_ACTION, nodes::VideoAction)
        .node(GENERATE_QUERY, nodes::GenerateQuery)
        .node(WEB_RESEARCH, nodes::WebResearch)
        .node(REFLECTION, nodes::ReflectOnResults)
        .node(FINALIZE_ANSWER, nodes::FinalizeAnswer)
        .edge(START, CLASSIFY_INTENT)
        .conditional_edge(
            CLASSIFY_INTENT,
            routers::route_after_intent,
            [GENERATE_QUERY, VIDEO_ACTION],
        )
        .edge(VIDEO_ACTION, END)
        .conditional_edge(
            GENERATE_QUERY,
            routers::continue_to_web_research,
            [WEB_RESEARCH, FINALIZE_ANSWER],
        )
        .edge(WEB_RESEARCH, REFLECTION)
        .conditional_edge(
            REFLECTION,
            routers::evaluate_research,
            [WEB_RESEARCH, FINALIZE_ANSWER],
        )
        .edge(FINALIZE_ANSWER, END)
        .build()
}
