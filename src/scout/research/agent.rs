// SPDX-License-Identifier: MIT

//! Entry point for running the research workflow

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::channels::*;
use super::citations::CitedSource;
use super::collaborators::{CollaboratorFactory, Collaborators, IntentType, VideoSearchResults};
use super::{build_research_graph, Message, ResearchServices};
use crate::adk::error::{GraphError, ScoutError};
use crate::scout::config::{Configuration, ModelSelection};
use crate::scout::workflow::graph::{Executor, Graph, RunContext, RunEvent, RunReport, RunStatus};
use crate::scout::workflow::state::Values;

/// A user request plus per-run overrides of the configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ResearchRequest {
    pub messages: Vec<Message>,
    #[serde(default)]
    pub max_research_loops: Option<u32>,
    #[serde(default)]
    pub initial_queries: Option<usize>,
    /// Models and provider for this run only
    #[serde(default, flatten)]
    pub models: ModelSelection,
}

impl ResearchRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            messages: vec![Message::user(prompt)],
            ..Default::default()
        }
    }

    pub fn with_max_loops(mut self, loops: u32) -> Self {
        self.max_research_loops = Some(loops);
        self
    }

    pub fn with_initial_queries(mut self, count: usize) -> Self {
        self.initial_queries = Some(count);
        self
    }

    pub fn with_models(mut self, models: ModelSelection) -> Self {
        self.models = models;
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResearchOutcome {
    /// Researched narrative with the sources it cites
    Answer {
        text: String,
        sources: Vec<CitedSource>,
    },
    /// Result of the video bypass
    Videos {
        text: String,
        results: Option<VideoSearchResults>,
    },
}

impl ResearchOutcome {
    pub fn text(&self) -> &str {
        match self {
            ResearchOutcome::Answer { text, .. } | ResearchOutcome::Videos { text, .. } => text,
        }
    }

    /// Read the outcome out of a finished run
    pub fn from_report(report: RunReport) -> Result<Self, ScoutError> {
        let report = report.into_result()?;
        if report.status == RunStatus::Cancelled {
            return Err(ScoutError::Cancelled);
        }

        let intent = report
            .get(INTENT_TYPE)
            .and_then(Value::as_str)
            .map(IntentType::parse)
            .unwrap_or_default();

        if intent == IntentType::Video {
            let text = report
                .get(MESSAGES)
                .and_then(Value::as_array)
                .and_then(|m| m.last())
                .and_then(|m| m.get("content"))
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let results = match report.get(VIDEO_RESULTS) {
                Some(v) if !v.is_null() => Some(serde_json::from_value(v.clone())?),
                _ => None,
            };
            return Ok(ResearchOutcome::Videos { text, results });
        }

        let text = report
            .get(ANSWER)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let sources = match report.get(FINAL_SOURCES) {
            Some(v) => serde_json::from_value(v.clone())?,
            None => Vec::new(),
        };
        Ok(ResearchOutcome::Answer { text, sources })
    }
}

/// Runs the research graph.
///
/// Runs without a model selection share the collaborators built up front.
/// A run that selects models gets collaborators from the factory, built
/// from the configuration with its selection applied.
pub struct ResearchAgent {
    graph: Arc<Graph<ResearchServices>>,
    collaborators: Collaborators,
    factory: Option<Arc<dyn CollaboratorFactory>>,
    config: Configuration,
}

impl ResearchAgent {
    pub fn new(collaborators: Collaborators, config: Configuration) -> Result<Self, ScoutError> {
        config.validate()?;
        Ok(Self {
            graph: Arc::new(build_research_graph()?),
            collaborators,
            factory: None,
            config,
        })
    }

    /// Build the model, search, and video adapters named by `config`
    pub fn from_config(config: Configuration) -> Result<Self, ScoutError> {
        Self::with_factory(Arc::new(crate::scout::tools::build_collaborators), config)
    }

    /// Default collaborators come from `factory` too
    pub fn with_factory(
        factory: Arc<dyn CollaboratorFactory>,
        config: Configuration,
    ) -> Result<Self, ScoutError> {
        let collaborators = factory.build(&config)?;
        let mut agent = Self::new(collaborators, config)?;
        agent.factory = Some(factory);
        Ok(agent)
    }

    pub fn config(&self) -> &Configuration {
        &self.config
    }

    /// Collaborators for a run: the shared set, or one built for its models
    fn collaborators_for(&self, models: &ModelSelection) -> Result<Collaborators, ScoutError> {
        if models.is_empty() {
            return Ok(self.collaborators.clone());
        }
        let Some(factory) = &self.factory else {
            return Err(ScoutError::config(
                "this agent has fixed collaborators and cannot select models per run",
            ));
        };

        let config = self.config.clone().with_selection(models);
        config.validate()?;
        log::info!(
            "Run selects models: query={} reflection={} answer={} provider={:?}",
            config.query_generator_model,
            config.reflection_model,
            config.answer_model,
            config.provider
        );
        factory.build(&config)
    }

    fn prepare(
        &self,
        request: ResearchRequest,
        cancel: CancellationToken,
    ) -> Result<(Values, RunContext<ResearchServices>), ScoutError> {
        if request.messages.iter().all(|m| m.content.trim().is_empty()) {
            return Err(GraphError::MissingParameter("messages".to_string()).into());
        }
        let initial_queries = request
            .initial_queries
            .unwrap_or(self.config.number_of_initial_queries);
        if initial_queries == 0 {
            return Err(GraphError::MissingParameter(
                "initial_queries must be at least 1".to_string(),
            )
            .into());
        }
        let max_loops = request
            .max_research_loops
            .unwrap_or(self.config.max_research_loops);

        let mut input = Values::new();
        input.insert(
            MESSAGES.to_string(),
            Value::Array(request.messages.iter().map(Message::to_value).collect()),
        );

        let collaborators = self.collaborators_for(&request.models)?;

        let ctx = RunContext::new(ResearchServices {
            collaborators,
            initial_queries,
            max_video_results: self.config.max_video_results,
        })
        .with_max_loops(max_loops)
        .with_cancellation(cancel);

        Ok((input, ctx))
    }

    /// Run to completion and return the full report
    pub async fn execute(
        &self,
        request: ResearchRequest,
        events: Option<mpsc::Sender<RunEvent>>,
        cancel: CancellationToken,
    ) -> Result<RunReport, ScoutError> {
        let (input, ctx) = self.prepare(request, cancel)?;
        let mut executor = Executor::new(self.graph.clone());
        if let Some(tx) = events {
            executor = executor.with_events(tx);
        }
        Ok(executor.run(input, ctx).await)
    }

    pub async fn run(&self, request: ResearchRequest) -> Result<ResearchOutcome, ScoutError> {
        let report = self.execute(request, None, CancellationToken::new()).await?;
        if !report.failures.is_empty() {
            log::warn!("Run {} recovered from {} node failures", report.run_id, report.failures.len());
        }
        ResearchOutcome::from_report(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scout::research::collaborators::{AnswerSynthesizer, Reflection, SufficiencyEvaluator};
    use crate::scout::research::testing::{collaborators, MockBackend};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    fn agent(backend: MockBackend) -> ResearchAgent {
        ResearchAgent::new(collaborators(Arc::new(backend)), Configuration::default()).unwrap()
    }

    #[tokio::test]
    async fn test_research_run_returns_answer() {
        let outcome = agent(MockBackend {
            sufficient: true,
            ..Default::default()
        })
        .run(ResearchRequest::new("What is Rust?"))
        .await
        .unwrap();

        assert_eq!(
            outcome,
            ResearchOutcome::Answer {
                text: "Answer.".to_string(),
                sources: vec![],
            }
        );
    }

    #[tokio::test]
    async fn test_video_run_returns_videos() {
        let outcome = agent(MockBackend {
            intent: IntentType::Video,
            video_query: Some("cats".to_string()),
            ..Default::default()
        })
        .run(ResearchRequest::new("show me cat videos"))
        .await
        .unwrap();

        match outcome {
            ResearchOutcome::Videos { text, results } => {
                assert!(text.contains("couldn't find any videos for 'cats'"));
                assert_eq!(results.unwrap().query, "cats");
            }
            other => panic!("expected videos, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_empty_prompt_rejected() {
        let err = agent(MockBackend::default())
            .run(ResearchRequest::new("   "))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, ScoutError::Graph(GraphError::MissingParameter(_))));
    }

    #[tokio::test]
    async fn test_zero_initial_queries_rejected() {
        let err = agent(MockBackend::default())
            .run(ResearchRequest::new("rust").with_initial_queries(0))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, ScoutError::Graph(GraphError::MissingParameter(_))));
    }

    #[tokio::test]
    async fn test_cancelled_run_is_error() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let report = agent(MockBackend::default())
            .execute(ResearchRequest::new("rust"), None, cancel)
            .await
            .unwrap();

        assert_eq!(report.status, RunStatus::Cancelled);
        assert!(matches!(
            ResearchOutcome::from_report(report),
            Err(ScoutError::Cancelled)
        ));
    }

    #[test]
    fn test_request_deserializes_with_defaults() {
        let request: ResearchRequest =
            serde_json::from_str(r#"{"messages": [{"role": "user", "content": "hi"}]}"#).unwrap();
        assert_eq!(request.messages, vec![Message::user("hi")]);
        assert!(request.max_research_loops.is_none());
        assert!(request.models.is_empty());
    }

    #[test]
    fn test_request_carries_model_selection() {
        let request: ResearchRequest = serde_json::from_str(
            r#"{"messages": [{"role": "user", "content": "hi"}], "provider": "openai", "reasoning_model": "gpt-4o"}"#,
        )
        .unwrap();
        assert_eq!(request.models.provider.as_deref(), Some("openai"));
        assert_eq!(request.models.reasoning_model.as_deref(), Some("gpt-4o"));
    }

    // Reflects and answers under the name of the model it was built for
    struct ModelTagged {
        model: String,
    }

    #[async_trait]
    impl SufficiencyEvaluator for ModelTagged {
        async fn evaluate(&self, _topic: &str, _summaries: &[String]) -> Result<Reflection, ScoutError> {
            Ok(Reflection {
                is_sufficient: true,
                knowledge_gap: format!("reflected by {}", self.model),
                follow_up_queries: Vec::new(),
            })
        }
    }

    #[async_trait]
    impl AnswerSynthesizer for ModelTagged {
        async fn synthesize(&self, _topic: &str, _summaries: &[String]) -> Result<String, ScoutError> {
            Ok(format!("answered by {}", self.model))
        }
    }

    fn tagging_factory(built: Arc<Mutex<Vec<Configuration>>>) -> Arc<dyn CollaboratorFactory> {
        Arc::new(move |config: &Configuration| -> Result<Collaborators, ScoutError> {
            built.lock().unwrap().push(config.clone());
            let mut collaborators = collaborators(Arc::new(MockBackend::default()));
            collaborators.evaluator = Arc::new(ModelTagged {
                model: config.reflection_model.clone(),
            });
            collaborators.synthesizer = Arc::new(ModelTagged {
                model: config.answer_model.clone(),
            });
            Ok(collaborators)
        })
    }

    #[tokio::test]
    async fn test_model_selection_reaches_reflection_and_answer() {
        let built = Arc::new(Mutex::new(Vec::new()));
        let agent = ResearchAgent::with_factory(tagging_factory(built.clone()), Configuration::default()).unwrap();

        let request = ResearchRequest::new("rust").with_models(ModelSelection {
            reflection_model: Some("gpt-4o".to_string()),
            answer_model: Some("o3-mini".to_string()),
            ..Default::default()
        });
        let report = agent.execute(request, None, CancellationToken::new()).await.unwrap();

        assert_eq!(report.get(KNOWLEDGE_GAP), Some(&json!("reflected by gpt-4o")));
        assert_eq!(report.get(ANSWER), Some(&json!("answered by o3-mini")));
        let built = built.lock().unwrap();
        assert_eq!(built.len(), 2);
        assert_eq!(built[1].query_generator_model, "gemini-2.0-flash");
    }

    #[tokio::test]
    async fn test_run_without_selection_uses_default_models() {
        let built = Arc::new(Mutex::new(Vec::new()));
        let agent = ResearchAgent::with_factory(tagging_factory(built.clone()), Configuration::default()).unwrap();

        let outcome = agent.run(ResearchRequest::new("rust")).await.unwrap();

        assert_eq!(outcome.text(), "answered by gemini-2.5-pro");
        assert_eq!(built.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_fixed_agent_rejects_model_selection() {
        let request = ResearchRequest::new("rust").with_models(ModelSelection {
            model: Some("gpt-4o".to_string()),
            ..Default::default()
        });
        let err = agent(MockBackend::default()).run(request).await.err().unwrap();
        assert!(matches!(err, ScoutError::Config(_)));
    }
}
