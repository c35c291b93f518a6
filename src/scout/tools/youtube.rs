// SPDX-License-Identifier: MIT

//! YouTube Data API v3 video search

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::collections::HashMap;
use std::env;
use url::Url;

use crate::adk::error::ScoutError;
use crate::scout::research::collaborators::{Video, VideoSearchProvider, VideoSearchResults};

const YOUTUBE_BASE_URL: &str = "https://www.googleapis.com/youtube/v3";
const DESCRIPTION_LIMIT: usize = 200;

pub struct YouTubeSearch {
    client: Client,
    api_key: String,
}

impl YouTubeSearch {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
        }
    }

    /// `None` when `YOUTUBE_API_KEY` is unset or empty
    pub fn from_env() -> Option<Self> {
        env::var("YOUTUBE_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty())
            .map(Self::new)
    }

    async fn get_json(&self, endpoint: &str, params: &[(&str, &str)]) -> Result<Value, ScoutError> {
        let mut url = Url::parse(&format!("{}/{}", YOUTUBE_BASE_URL, endpoint))
            .map_err(|e| ScoutError::config(format!("bad YouTube URL: {}", e)))?;
        url.query_pairs_mut()
            .extend_pairs(params)
            .append_pair("key", &self.api_key);

        let resp = self.client.get(url).send().await?;
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await?;
            return Err(ScoutError::api("youtube", format!("{}: {}", status, text)));
        }
        Ok(resp.json().await?)
    }
}

/// `PT1H2M3S` -> `1:02:03`, `PT4M5S` -> `4:05`
pub fn format_duration(iso: &str) -> String {
    let Some(rest) = iso.strip_prefix("PT") else {
        return "Unknown".to_string();
    };

    let (mut hours, mut minutes, mut seconds) = (0u64, 0u64, 0u64);
    let mut digits = String::new();
    for c in rest.chars() {
        if c.is_ascii_digit() {
            digits.push(c);
            continue;
        }
        let Ok(n) = digits.parse::<u64>() else {
            return "Unknown".to_string();
        };
        match c {
            'H' => hours = n,
            'M' => minutes = n,
            'S' => seconds = n,
            _ => return "Unknown".to_string(),
        }
        digits.clear();
    }
    if !digits.is_empty() || rest.is_empty() {
        return "Unknown".to_string();
    }

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}

pub fn format_view_count(count: u64) -> String {
    let n = count as f64;
    if count >= 1_000_000_000 {
        format!("{:.1}B views", n / 1_000_000_000.0)
    } else if count >= 1_000_000 {
        format!("{:.1}M views", n / 1_000_000.0)
    } else if count >= 1_000 {
        format!("{:.1}K views", n / 1_000.0)
    } else {
        format!("{} views", count)
    }
}

fn truncate_description(text: &str) -> String {
    if text.chars().count() <= DESCRIPTION_LIMIT {
        return text.to_string();
    }
    let cut: String = text.chars().take(DESCRIPTION_LIMIT).collect();
    format!("{}...", cut)
}

/// Join a `search` response with the `videos` details, keeping search order
pub fn parse_videos(search: &Value, details: &Value) -> Vec<Video> {
    let by_id: HashMap<&str, &Value> = details["items"]
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|item| Some((item["id"].as_str()?, item)))
                .collect()
        })
        .unwrap_or_default();

    search["items"]
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|item| {
                    let id = item["id"]["videoId"].as_str()?;
                    let snippet = &item["snippet"];
                    let detail = by_id.get(id);

                    let duration = detail
                        .and_then(|d| d["contentDetails"]["duration"].as_str())
                        .map(format_duration)
                        .unwrap_or_else(|| "Unknown".to_string());
                    let views = detail
                        .and_then(|d| d["statistics"]["viewCount"].as_str())
                        .and_then(|v| v.parse::<u64>().ok())
                        .unwrap_or(0);
                    let published = snippet["publishedAt"].as_str().unwrap_or_default();

                    Some(Video {
                        video_id: id.to_string(),
                        title: snippet["title"].as_str().unwrap_or_default().to_string(),
                        channel: snippet["channelTitle"].as_str().unwrap_or_default().to_string(),
                        description: truncate_description(
                            snippet["description"].as_str().unwrap_or_default(),
                        ),
                        thumbnail_url: snippet["thumbnails"]["medium"]["url"]
                            .as_str()
                            .or_else(|| snippet["thumbnails"]["default"]["url"].as_str())
                            .unwrap_or_default()
                            .to_string(),
                        duration,
                        view_count: format_view_count(views),
                        published_at: published.chars().take(10).collect(),
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

#[async_trait]
impl VideoSearchProvider for YouTubeSearch {
    async fn search_videos(&self, query: &str, max_results: usize) -> Result<VideoSearchResults, ScoutError> {
        let max = max_results.clamp(1, 50).to_string();
        let search = self
            .get_json(
                "search",
                &[
                    ("part", "snippet"),
                    ("q", query),
                    ("type", "video"),
                    ("maxResults", max.as_str()),
                    ("order", "relevance"),
                ],
            )
            .await?;

        let ids: Vec<&str> = search["items"]
            .as_array()
            .map(|items| items.iter().filter_map(|i| i["id"]["videoId"].as_str()).collect())
            .unwrap_or_default();

        if ids.is_empty() {
            return Ok(VideoSearchResults {
                videos: Vec::new(),
                query: query.to_string(),
                total_results: 0,
            });
        }

        let joined = ids.join(",");
        let details = self
            .get_json(
                "videos",
                &[("part", "contentDetails,statistics"), ("id", joined.as_str())],
            )
            .await?;

        let videos = parse_videos(&search, &details);
        log::info!("YouTube returned {} videos for '{}'", videos.len(), query);

        Ok(VideoSearchResults {
            total_results: search["pageInfo"]["totalResults"]
                .as_u64()
                .unwrap_or(videos.len() as u64),
            videos,
            query: query.to_string(),
        })
    }
}
