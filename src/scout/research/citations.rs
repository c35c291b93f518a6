// SPDX-License-Identifier: MIT

//! Citation placeholders
//!
//! Search results cite long redirect URLs. Before the text reaches a model
//! each URL is swapped for a short placeholder tied to the query id, and the
//! final answer gets the long URLs back for the placeholders it kept.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::collaborators::{SearchResult, WebSource};

pub const SHORT_URL_PREFIX: &str = "https://vertexaisearch.cloud.google.com/id/";

/// A source as stored in state: display label, placeholder, and real URL
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CitedSource {
    pub label: String,
    pub short_url: String,
    pub value: String,
}

/// Sources supporting the text that ends at `end_index`
#[derive(Debug, Clone, PartialEq)]
pub struct Citation {
    pub start_index: usize,
    pub end_index: usize,
    pub segments: Vec<CitedSource>,
}

pub fn short_url(query_id: usize, n: usize) -> String {
    format!("{}{}-{}", SHORT_URL_PREFIX, query_id, n)
}

/// Map every distinct URL to a placeholder. The first occurrence of a URL
/// decides its number.
pub fn resolve_urls(sources: &[WebSource], query_id: usize) -> HashMap<String, String> {
    let mut resolved = HashMap::new();
    for (n, source) in sources.iter().enumerate() {
        resolved
            .entry(source.url.clone())
            .or_insert_with(|| short_url(query_id, n));
    }
    resolved
}

/// "en.wikipedia.org" -> "en"
fn label_for(title: &str) -> String {
    match title.split_once('.') {
        Some((head, _)) if !head.is_empty() => head.to_string(),
        _ => title.to_string(),
    }
}

pub fn get_citations(result: &SearchResult, resolved: &HashMap<String, String>) -> Vec<Citation> {
    result
        .groundings
        .iter()
        .map(|grounding| Citation {
            start_index: grounding.start_index,
            end_index: grounding.end_index,
            segments: grounding
                .source_indices
                .iter()
                .filter_map(|&i| result.sources.get(i))
                .filter_map(|source| {
                    resolved.get(&source.url).map(|short| CitedSource {
                        label: label_for(&source.title),
                        short_url: short.clone(),
                        value: source.url.clone(),
                    })
                })
                .collect(),
        })
        .filter(|c| !c.segments.is_empty())
        .collect()
}

fn floor_char_boundary(text: &str, index: usize) -> usize {
    let mut index = index.min(text.len());
    while !text.is_char_boundary(index) {
        index -= 1;
    }
    index
}

/// Insert ` [label](short_url)` markers after each cited span.
///
/// Works from the highest end offset down so that earlier offsets are not
/// shifted by the text already inserted.
pub fn insert_citation_markers(text: &str, citations: &[Citation]) -> String {
    let mut ordered: Vec<&Citation> = citations.iter().collect();
    ordered.sort_by(|a, b| {
        b.end_index
            .cmp(&a.end_index)
            .then(b.start_index.cmp(&a.start_index))
    });

    let mut out = text.to_string();
    for citation in ordered {
        let marker: String = citation
            .segments
            .iter()
            .map(|s| format!(" [{}]({})", s.label, s.short_url))
            .collect();
        out.insert_str(floor_char_boundary(text, citation.end_index), &marker);
    }
    out
}

/// Annotate a search result for query `query_id`: the text with markers,
/// and every cited source in marker order.
pub fn annotate(result: &SearchResult, query_id: usize) -> (String, Vec<CitedSource>) {
    if result.groundings.is_empty() {
        return (result.text.clone(), Vec::new());
    }
    let resolved = resolve_urls(&result.sources, query_id);
    let citations = get_citations(result, &resolved);
    let text = insert_citation_markers(&result.text, &citations);
    let sources = citations.into_iter().flat_map(|c| c.segments).collect();
    (text, sources)
}

/// Replace every standalone occurrence of `token`. A match directly followed
/// by a digit is part of a longer placeholder (`…/id/1-1` inside `…/id/1-10`).
fn replace_placeholder(text: &str, token: &str, replacement: &str) -> Option<String> {
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    let mut found = false;

    for (at, _) in text.match_indices(token) {
        let end = at + token.len();
        if text[end..].starts_with(|c: char| c.is_ascii_digit()) {
            continue;
        }
        out.push_str(&text[last..at]);
        out.push_str(replacement);
        last = end;
        found = true;
    }

    if !found {
        return None;
    }
    out.push_str(&text[last..]);
    Some(out)
}

/// Swap placeholders in `narrative` for their long URLs. Returns the new text
/// and the sources it actually cites, deduplicated, in `sources` order.
pub fn substitute_citations(narrative: &str, sources: &[CitedSource]) -> (String, Vec<CitedSource>) {
    let mut text = narrative.to_string();
    let mut cited: Vec<CitedSource> = Vec::new();

    for source in sources {
        if cited.iter().any(|c| c.short_url == source.short_url) {
            continue;
        }
        if let Some(replaced) = replace_placeholder(&text, &source.short_url, &source.value) {
            text = replaced;
            cited.push(source.clone());
        }
    }

    (text, cited)
}
