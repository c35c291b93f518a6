// SPDX-License-Identifier: MIT

//! Concrete collaborators backed by external services

pub mod llm;
pub mod search;
pub mod youtube;

use std::sync::Arc;

use crate::adk::error::ScoutError;
use crate::adk::model::create_model;
use crate::scout::config::Configuration;
use crate::scout::research::collaborators::{Collaborators, VideoSearchProvider};

/// Wire every collaborator named by `config`.
///
/// Video search is optional: without `YOUTUBE_API_KEY` the video node
/// answers with a configuration hint instead of failing.
pub fn build_collaborators(config: &Configuration) -> Result<Collaborators, ScoutError> {
    let provider = config.provider.as_deref();
    let query_model = create_model(provider, &config.query_generator_model)?;
    let reflection_model = create_model(provider, &config.reflection_model)?;
    let answer_model = create_model(provider, &config.answer_model)?;

    let video = match youtube::YouTubeSearch::from_env() {
        Some(yt) => Some(Arc::new(yt) as Arc<dyn VideoSearchProvider>),
        None => {
            log::warn!("YOUTUBE_API_KEY not set, video search disabled");
            None
        }
    };

    Ok(Collaborators {
        classifier: Arc::new(llm::ModelIntentClassifier::new(query_model.clone())),
        query_generator: Arc::new(llm::ModelQueryGenerator::new(query_model)),
        search: Arc::new(search::GeminiSearch::new(&config.search_model)?),
        evaluator: Arc::new(llm::ModelReflector::new(reflection_model)),
        synthesizer: Arc::new(llm::ModelAnswerSynthesizer::new(answer_model)),
        video,
    })
}
