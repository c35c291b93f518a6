// SPDX-License-Identifier: MIT

//! Prompt templates for the model-backed collaborators

use chrono::Local;

use super::Message;

/// Today's date as "October 16, 2026"
pub fn current_date() -> String {
    Local::now().format("%B %d, %Y").to_string()
}

/// The research topic of a conversation. A single message is used as is;
/// longer conversations are rendered as a transcript.
pub fn research_topic(messages: &[Message]) -> String {
    match messages {
        [] => String::new(),
        [only] => only.content.clone(),
        _ => messages
            .iter()
            .map(|m| {
                let speaker = if m.role == "user" { "User" } else { "Assistant" };
                format!("{}: {}\n", speaker, m.content)
            })
            .collect(),
    }
}

pub fn intent_classification(request: &str) -> String {
    format!(
        r#"Classify the intent of the user's request.

Categories:
- "research": the user wants information gathered and explained.
- "video": the user wants to find videos (e.g. "show me videos about", "find a tutorial on YouTube").
- "mixed": the user wants both an explanation and videos.

Instructions:
- Give a confidence between 0 and 1.
- For "video" and "mixed", extract a concise video search query into "video_query".
- For "research" and "mixed", extract the research topic into "research_topic".

Format your response as a JSON object with the keys "intent_type", "confidence", "video_query" and "research_topic".

User request: {request}"#
    )
}

pub fn query_writer(topic: &str, count: usize, date: &str) -> String {
    format!(
        r#"Your goal is to generate sophisticated and diverse web search queries for an automated research tool.

Instructions:
- Prefer a single search query; only add more if the question asks about several aspects and one query is not enough.
- Each query should focus on one specific aspect of the original question.
- Don't produce more than {count} queries.
- Queries should be diverse; if the topic is broad, generate more than one query.
- Don't generate multiple similar queries; one is enough.
- Queries should make sure the most current information is gathered. The current date is {date}.

Format your response as a JSON object with these keys:
- "rationale": a brief explanation of why these queries are relevant
- "query": a list of search queries

Context: {topic}"#
    )
}

pub fn web_searcher(query: &str, date: &str) -> String {
    format!(
        r#"Conduct targeted web searches to gather the most recent, credible information on "{query}" and synthesize it into a verifiable text artifact.

Instructions:
- The current date is {date}; make sure the information is recent.
- Conduct several diverse searches to gather comprehensive information.
- Consolidate key findings while tracking the source of each piece of information.
- Write a well-structured summary based on your search findings.
- Only include information found in the search results; don't make anything up.

Research Topic:
{query}"#
    )
}

pub fn reflection(topic: &str, summaries: &[String], date: &str) -> String {
    format!(
        r#"You are an expert research assistant analyzing summaries about "{topic}".

Instructions:
- Identify knowledge gaps or areas that need deeper exploration and generate follow-up queries (one or more).
- If the provided summaries are sufficient to answer the user's question, don't generate follow-up queries.
- If there is a knowledge gap, generate a follow-up query that would help expand understanding.
- The current date is {date}.

Format your response as a JSON object with these keys:
- "is_sufficient": true or false
- "knowledge_gap": what information is missing or needs clarification ("" if sufficient)
- "follow_up_queries": specific questions to address the gap ([] if sufficient)

Summaries:
{summaries}"#,
        summaries = summaries.join("\n\n---\n\n")
    )
}

pub fn answer(topic: &str, summaries: &[String], date: &str) -> String {
    format!(
        r#"Generate a high-quality answer to the user's question based on the provided summaries.

Instructions:
- The current date is {date}.
- You are the final step of a multi-step research process; don't mention that you are the final step.
- You have access to all the information gathered in the previous steps.
- Generate a high-quality answer to the user's question based on the provided summaries and the user's question.
- Include the sources you used from the summaries in the answer correctly, use markdown format (e.g. [apnews](https://vertexaisearch.cloud.google.com/id/1-0)). THIS IS A MUST.

User Context:
- {topic}

Summaries:
{summaries}"#,
        summaries = summaries.join("\n---\n\n")
    )
}
