// SPDX-License-Identifier: MIT

//! Run configuration
//!
//! Layers, lowest first: built-in defaults, an optional YAML file, `SCOUT_*`
//! environment variables (a `.env` file is loaded first), then CLI flags.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::adk::error::{GraphError, ScoutError};
use crate::adk::model::infer_provider;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Configuration {
    /// Model for intent classification and query generation
    pub query_generator_model: String,
    pub reflection_model: String,
    pub answer_model: String,
    /// Gemini model that runs grounded web search, whatever the provider
    pub search_model: String,
    /// `gemini` or `openai`; inferred from the model names when unset
    pub provider: Option<String>,
    pub number_of_initial_queries: usize,
    pub max_research_loops: u32,
    pub max_video_results: usize,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            query_generator_model: "gemini-2.0-flash".to_string(),
            reflection_model: "gemini-2.5-flash".to_string(),
            answer_model: "gemini-2.5-pro".to_string(),
            search_model: "gemini-2.0-flash".to_string(),
            provider: None,
            number_of_initial_queries: 3,
            max_research_loops: 2,
            max_video_results: 5,
        }
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ScoutError> {
    value
        .trim()
        .parse()
        .map_err(|_| ScoutError::config(format!("{} must be a non-negative integer, got '{}'", key, value)))
}

impl Configuration {
    pub fn from_yaml(content: &str) -> Result<Self, ScoutError> {
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ScoutError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            ScoutError::config(format!("cannot read config file {}: {}", path.display(), e))
        })?;
        Self::from_yaml(&content)
    }

    /// Defaults or `path`, then the process environment
    pub fn load(path: Option<&Path>) -> Result<Self, ScoutError> {
        dotenv::dotenv().ok();
        let base = match path {
            Some(p) => Self::from_file(p)?,
            None => Self::default(),
        };
        base.with_env(|key| std::env::var(key).ok())
    }

    /// Apply `SCOUT_*` overrides looked up through `lookup`
    pub fn with_env<F>(mut self, lookup: F) -> Result<Self, ScoutError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("SCOUT_QUERY_GENERATOR_MODEL") {
            self.query_generator_model = v;
        }
        if let Some(v) = lookup("SCOUT_REFLECTION_MODEL") {
            self.reflection_model = v;
        }
        if let Some(v) = lookup("SCOUT_ANSWER_MODEL") {
            self.answer_model = v;
        }
        if let Some(v) = lookup("SCOUT_SEARCH_MODEL") {
            self.search_model = v;
        }
        if let Some(v) = lookup("SCOUT_PROVIDER") {
            self.provider = Some(v);
        }
        if let Some(v) = lookup("SCOUT_NUMBER_OF_INITIAL_QUERIES") {
            self.number_of_initial_queries = parse_number("SCOUT_NUMBER_OF_INITIAL_QUERIES", &v)?;
        }
        if let Some(v) = lookup("SCOUT_MAX_RESEARCH_LOOPS") {
            self.max_research_loops = parse_number("SCOUT_MAX_RESEARCH_LOOPS", &v)?;
        }
        if let Some(v) = lookup("SCOUT_MAX_VIDEO_RESULTS") {
            self.max_video_results = parse_number("SCOUT_MAX_VIDEO_RESULTS", &v)?;
        }
        Ok(self)
    }

    /// Use one model for every role. Search keeps its Gemini model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        let model = model.into();
        self.query_generator_model = model.clone();
        self.reflection_model = model.clone();
        self.answer_model = model;
        self
    }

    /// Apply a run's model selection on top of this configuration
    pub fn with_selection(mut self, selection: &ModelSelection) -> Self {
        if let Some(model) = &selection.model {
            self = self.with_model(model.clone());
        }
        if let Some(model) = &selection.reasoning_model {
            self.reflection_model = model.clone();
            self.answer_model = model.clone();
        }
        if let Some(model) = &selection.query_generator_model {
            self.query_generator_model = model.clone();
        }
        if let Some(model) = &selection.reflection_model {
            self.reflection_model = model.clone();
        }
        if let Some(model) = &selection.answer_model {
            self.answer_model = model.clone();
        }
        if let Some(provider) = &selection.provider {
            self.provider = Some(provider.clone());
        }
        self
    }

    pub fn validate(&self) -> Result<(), ScoutError> {
        if self.number_of_initial_queries == 0 {
            return Err(GraphError::MissingParameter(
                "number_of_initial_queries must be at least 1".to_string(),
            )
            .into());
        }
        for (role, model) in [
            ("query_generator_model", &self.query_generator_model),
            ("reflection_model", &self.reflection_model),
            ("answer_model", &self.answer_model),
            ("search_model", &self.search_model),
        ] {
            if model.trim().is_empty() {
                return Err(ScoutError::config(format!("{} is empty", role)));
            }
        }
        if infer_provider(&self.search_model) != "gemini" {
            return Err(ScoutError::config(format!(
                "search_model must be a Gemini model, got '{}'",
                self.search_model
            )));
        }
        Ok(())
    }
}

/// Per-run model and provider overrides.
///
/// `model` sets every role, `reasoning_model` sets reflection and answer,
/// and the role fields win over both.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ModelSelection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning_model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query_generator_model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reflection_model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer_model: Option<String>,
}

impl ModelSelection {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}
