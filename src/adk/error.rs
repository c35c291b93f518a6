// SPDX-License-Identifier: MIT

//! Typed error handling for scout-rs
//!
//! Errors are split by how the workflow engine treats them:
//! - [`GraphError`] is the configuration class. It is the only error that
//!   aborts a run.
//! - Everything a collaborator can raise lands in [`ScoutError`] and is
//!   absorbed into state by the node that called it.

use thiserror::Error;

/// Top-level error type for scout-rs
#[derive(Debug, Error)]
pub enum ScoutError {
    /// API errors from external services (Gemini, OpenAI, YouTube, etc.)
    #[error("API error from {provider}: {message}")]
    Api { provider: String, message: String },

    /// Configuration errors (missing env vars, invalid config)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Graph construction or routing contract violations
    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    /// Model/LLM errors
    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    /// I/O errors
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP request errors
    #[error(transparent)]
    Http(#[from] reqwest::Error),

    /// The run's liveness signal fired while the call was in flight
    #[error("Cancelled")]
    Cancelled,

    /// Generic error wrapper
    #[error("{0}")]
    Other(String),
}

/// Configuration errors raised while building or walking a graph.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GraphError {
    /// Two nodes registered under the same id
    #[error("Duplicate node: {0}")]
    DuplicateNode(String),

    /// An edge or route references a node that was never registered
    #[error("Unknown node: {0}")]
    UnknownNode(String),

    /// A node was registered under START or END
    #[error("Reserved node name: {0}")]
    ReservedName(String),

    /// START has no outgoing edge
    #[error("Graph has no entry edge from START")]
    MissingEntry,

    /// A node has no outgoing edge, so the run could never leave it
    #[error("Node '{0}' has no outgoing edge")]
    MissingEdge(String),

    /// A node declares both static and conditional outgoing edges, or two routers
    #[error("Node '{0}' declares conflicting outgoing edges")]
    ConflictingEdges(String),

    /// A router returned a destination outside its declared set
    #[error("Router of '{source_node}' returned undeclared destination '{target}'")]
    UndeclaredDestination { source_node: String, target: String },

    /// A join waited on predecessors that can no longer run
    #[error("Join '{node}' never received {missing:?}")]
    StrandedJoin { node: String, missing: Vec<String> },

    /// The loop counter channel is not declared in the state schema
    #[error("Loop counter channel '{0}' is not declared in the state schema")]
    UnknownLoopChannel(String),

    /// A required run parameter is missing or invalid
    #[error("Missing run parameter: {0}")]
    MissingParameter(String),

    /// The scheduler exceeded its step budget
    #[error("Step limit of {0} exceeded")]
    StepLimitExceeded(usize),
}

/// Model/LLM-specific errors
#[derive(Debug, Error)]
pub enum ModelError {
    /// API key not configured
    #[error("API key not configured for provider: {0}")]
    ApiKeyMissing(String),

    /// Provider not supported
    #[error("Provider not supported: {0}")]
    UnsupportedProvider(String),

    /// Rate limit exceeded
    #[error("Rate limit exceeded, retry after {retry_after_secs:?} seconds")]
    RateLimited { retry_after_secs: Option<u64> },

    /// Invalid response from model
    #[error("Invalid response from model: {0}")]
    InvalidResponse(String),
}

impl ScoutError {
    /// Create an API error
    pub fn api(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Api {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create from a generic error
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }

    /// Whether a retry of the same call could plausibly succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Model(ModelError::RateLimited { .. }) => true,
            Self::Http(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }
}

impl From<&str> for ScoutError {
    fn from(s: &str) -> Self {
        Self::Other(s.to_string())
    }
}

impl From<String> for ScoutError {
    fn from(s: String) -> Self {
        Self::Other(s)
    }
}
