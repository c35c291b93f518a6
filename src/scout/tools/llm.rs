// SPDX-License-Identifier: MIT

//! Model-backed collaborators: intent, queries, reflection and the answer

use async_trait::async_trait;
use once_cell::sync::Lazy;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::adk::error::{ModelError, ScoutError};
use crate::adk::model::{generate_with_retry, strip_code_fence, Content, GenerationConfig, Model};
use crate::scout::research::collaborators::{
    AnswerSynthesizer, IntentClassification, IntentClassifier, QueryGenerator, Reflection,
    SufficiencyEvaluator,
};
use crate::scout::research::prompts;

const MAX_RETRIES: u32 = 2;

static INTENT_SCHEMA: Lazy<Value> = Lazy::new(|| {
    json!({
        "type": "object",
        "properties": {
            "intent_type": { "type": "string", "enum": ["research", "video", "mixed"] },
            "confidence": { "type": "number" },
            "video_query": { "type": "string" },
            "research_topic": { "type": "string" }
        },
        "required": ["intent_type", "confidence"]
    })
});

static QUERY_SCHEMA: Lazy<Value> = Lazy::new(|| {
    json!({
        "type": "object",
        "properties": {
            "rationale": { "type": "string" },
            "query": { "type": "array", "items": { "type": "string" } }
        },
        "required": ["rationale", "query"]
    })
});

static REFLECTION_SCHEMA: Lazy<Value> = Lazy::new(|| {
    json!({
        "type": "object",
        "properties": {
            "is_sufficient": { "type": "boolean" },
            "knowledge_gap": { "type": "string" },
            "follow_up_queries": { "type": "array", "items": { "type": "string" } }
        },
        "required": ["is_sufficient", "knowledge_gap", "follow_up_queries"]
    })
});

/// Ask `model` for a JSON document and decode it as `T`
async fn generate_json<T: DeserializeOwned>(
    model: &dyn Model,
    prompt: String,
    temperature: f32,
    schema: &Value,
) -> Result<T, ScoutError> {
    let config = GenerationConfig::with_temperature(temperature).json(schema);
    let content = generate_with_retry(model, &[Content::user(prompt)], Some(&config), MAX_RETRIES).await?;
    let text = content.text();
    serde_json::from_str(strip_code_fence(&text)).map_err(|e| {
        log::debug!("Undecodable response from {}: {}", model.name(), text);
        ModelError::InvalidResponse(format!("{} returned malformed JSON: {}", model.name(), e)).into()
    })
}

pub struct ModelIntentClassifier {
    model: Arc<dyn Model>,
}

impl ModelIntentClassifier {
    pub fn new(model: Arc<dyn Model>) -> Self {
        Self { model }
    }
}

#[async_trait]
impl IntentClassifier for ModelIntentClassifier {
    async fn classify(&self, request: &str) -> Result<IntentClassification, ScoutError> {
        let mut result: IntentClassification = generate_json(
            self.model.as_ref(),
            prompts::intent_classification(request),
            0.0,
            &INTENT_SCHEMA,
        )
        .await?;
        result.confidence = result.confidence.clamp(0.0, 1.0);
        Ok(result)
    }
}

#[derive(Deserialize)]
struct SearchQueryList {
    #[serde(default)]
    rationale: String,
    query: Vec<String>,
}

pub struct ModelQueryGenerator {
    model: Arc<dyn Model>,
}

impl ModelQueryGenerator {
    pub fn new(model: Arc<dyn Model>) -> Self {
        Self { model }
    }
}

#[async_trait]
impl QueryGenerator for ModelQueryGenerator {
    async fn generate(&self, topic: &str, count: usize, context: &str) -> Result<Vec<String>, ScoutError> {
        let subject = if context.is_empty() {
            topic.to_string()
        } else {
            format!("{}\n\n{}", topic, context)
        };
        let list: SearchQueryList = generate_json(
            self.model.as_ref(),
            prompts::query_writer(&subject, count, &prompts::current_date()),
            1.0,
            &QUERY_SCHEMA,
        )
        .await?;
        log::debug!("Query rationale: {}", list.rationale);
        Ok(list.query)
    }
}

pub struct ModelReflector {
    model: Arc<dyn Model>,
}

impl ModelReflector {
    pub fn new(model: Arc<dyn Model>) -> Self {
        Self { model }
    }
}

#[async_trait]
impl SufficiencyEvaluator for ModelReflector {
    async fn evaluate(&self, topic: &str, summaries: &[String]) -> Result<Reflection, ScoutError> {
        generate_json(
            self.model.as_ref(),
            prompts::reflection(topic, summaries, &prompts::current_date()),
            1.0,
            &REFLECTION_SCHEMA,
        )
        .await
    }
}

pub struct ModelAnswerSynthesizer {
    model: Arc<dyn Model>,
}

impl ModelAnswerSynthesizer {
    pub fn new(model: Arc<dyn Model>) -> Self {
        Self { model }
    }
}

#[async_trait]
impl AnswerSynthesizer for ModelAnswerSynthesizer {
    async fn synthesize(&self, topic: &str, summaries: &[String]) -> Result<String, ScoutError> {
        let prompt = prompts::answer(topic, summaries, &prompts::current_date());
        let config = GenerationConfig::with_temperature(0.0);
        let content =
            generate_with_retry(self.model.as_ref(), &[Content::user(prompt)], Some(&config), MAX_RETRIES)
                .await?;
        Ok(content.text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scout::research::collaborators::IntentType;
    use std::sync::Mutex;

    struct CannedModel {
        reply: String,
        prompts: Mutex<Vec<String>>,
    }

    impl CannedModel {
        fn new(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: reply.to_string(),
                prompts: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl Model for CannedModel {
        fn name(&self) -> &str {
            "canned"
        }

        async fn generate_content(
            &self,
            history: &[Content],
            _config: Option<&GenerationConfig>,
        ) -> Result<Content, ScoutError> {
            self.prompts.lock().unwrap().push(history[0].text());
            Ok(Content::model(self.reply.clone()))
        }
    }

    #[tokio::test]
    async fn test_classifier_parses_fenced_json() {
        let model = CannedModel::new(
            "```json\n{\"intent_type\": \"youtube\", \"confidence\": 1.4, \"youtube_query\": \"rust\"}\n```",
        );
        let result = ModelIntentClassifier::new(model).classify("rust videos").await.unwrap();

        assert_eq!(result.intent_type, IntentType::Video);
        assert_eq!(result.confidence, 1.0);
        assert_eq!(result.video_query.as_deref(), Some("rust"));
    }

    #[tokio::test]
    async fn test_query_generator_passes_count_and_context() {
        let model = CannedModel::new(r#"{"rationale": "r", "query": ["a", "b"]}"#);
        let generator = ModelQueryGenerator::new(model.clone());

        let queries = generator.generate("rust async", 2, "videos too").await.unwrap();

        assert_eq!(queries, vec!["a", "b"]);
        let prompt = model.prompts.lock().unwrap()[0].clone();
        assert!(prompt.contains("Don't produce more than 2 queries"));
        assert!(prompt.contains("videos too"));
    }

    #[tokio::test]
    async fn test_reflector_decodes_reflection() {
        let model = CannedModel::new(
            r#"{"is_sufficient": false, "knowledge_gap": "benchmarks", "follow_up_queries": ["rust vs go"]}"#,
        );
        let reflection = ModelReflector::new(model)
            .evaluate("rust", &["summary".to_string()])
            .await
            .unwrap();

        assert!(!reflection.is_sufficient);
        assert_eq!(reflection.follow_up_queries, vec!["rust vs go"]);
    }

    #[tokio::test]
    async fn test_malformed_json_is_invalid_response() {
        let model = CannedModel::new("definitely not json");
        let err = ModelReflector::new(model).evaluate("rust", &[]).await.err().unwrap();
        assert!(matches!(err, ScoutError::Model(ModelError::InvalidResponse(_))));
    }

    #[tokio::test]
    async fn test_synthesizer_returns_text() {
        let model = CannedModel::new("Rust is fast.");
        let text = ModelAnswerSynthesizer::new(model)
            .synthesize("rust", &["s".to_string()])
            .await
            .unwrap();
        assert_eq!(text, "Rust is fast.");
    }
}
