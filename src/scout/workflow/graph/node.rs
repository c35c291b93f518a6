// SPDX-License-Identifier: MIT

//! Node and router contracts, and the per-run context handed to both

use async_trait::async_trait;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::types::RouteDecision;
use crate::adk::error::ScoutError;
use crate::scout::workflow::state::{Snapshot, StateDelta};

/// Numeric limits the engine itself enforces
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunLimits {
    /// Passes allowed through the feedback loop
    pub max_loop_iterations: u32,
    /// Scheduler step budget; derived from the graph when unset
    pub max_steps: Option<usize>,
}

impl Default for RunLimits {
    fn default() -> Self {
        Self {
            max_loop_iterations: 2,
            max_steps: None,
        }
    }
}

/// Per-run context: read-only configuration plus injected services.
///
/// `S` carries whatever collaborator handles the nodes of a graph need, so
/// nodes never reach for global clients.
pub struct RunContext<S = ()> {
    run_id: Uuid,
    limits: RunLimits,
    services: Arc<S>,
    cancel: CancellationToken,
}

impl<S> Clone for RunContext<S> {
    fn clone(&self) -> Self {
        Self {
            run_id: self.run_id,
            limits: self.limits.clone(),
            services: self.services.clone(),
            cancel: self.cancel.clone(),
        }
    }
}

impl<S> RunContext<S> {
    pub fn new(services: S) -> Self {
        Self::from_arc(Arc::new(services))
    }

    pub fn from_arc(services: Arc<S>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            limits: RunLimits::default(),
            services,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_limits(mut self, limits: RunLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_max_loops(mut self, max_loop_iterations: u32) -> Self {
        self.limits.max_loop_iterations = max_loop_iterations;
        self
    }

    /// Use an externally owned liveness signal
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn limits(&self) -> &RunLimits {
        &self.limits
    }

    pub fn services(&self) -> &S {
        &self.services
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// What a node invocation sees
#[derive(Debug, Clone)]
pub struct NodeInput {
    /// Id of the node being run
    pub node: String,
    /// State at the start of the step (restricted to the node's read set)
    pub snapshot: Snapshot,
    /// Per-instance payload when the node runs as part of a fan-out
    pub payload: Option<Value>,
    /// Fan-out instance index
    pub instance: Option<usize>,
}

impl NodeInput {
    pub fn new(node: impl Into<String>, snapshot: Snapshot) -> Self {
        Self {
            node: node.into(),
            snapshot,
            payload: None,
            instance: None,
        }
    }

    pub fn payload_value(&self, key: &str) -> Option<&Value> {
        self.payload.as_ref().and_then(|p| p.get(key))
    }

    pub fn payload_str(&self, key: &str) -> Option<&str> {
        self.payload_value(key).and_then(|v| v.as_str())
    }

    pub fn payload_u64(&self, key: &str) -> Option<u64> {
        self.payload_value(key).and_then(|v| v.as_u64())
    }
}

/// A unit of work in the graph.
///
/// Errors returned from `run` never abort the run: the engine records the
/// failure and merges `fail_soft` in place of the missing delta.
#[async_trait]
pub trait Node<S = ()>: Send + Sync
where
    S: Send + Sync + 'static,
{
    async fn run(&self, input: NodeInput, ctx: &RunContext<S>) -> Result<StateDelta, ScoutError>;

    /// Channels this node reads; `None` means the whole state
    fn reads(&self) -> Option<&[&'static str]> {
        None
    }

    /// Delta merged when `run` fails
    fn fail_soft(&self, _input: &NodeInput, _error: &ScoutError) -> StateDelta {
        StateDelta::new()
    }
}

/// Conditional edge: inspects merged state and picks where to go next.
/// Routers must not have side effects.
pub trait Router<S = ()>: Send + Sync {
    fn route(&self, snapshot: &Snapshot, ctx: &RunContext<S>) -> RouteDecision;
}

impl<S, F> Router<S> for F
where
    F: Fn(&Snapshot, &RunContext<S>) -> RouteDecision + Send + Sync,
{
    fn route(&self, snapshot: &Snapshot, ctx: &RunContext<S>) -> RouteDecision {
        self(snapshot, ctx)
    }
}

/// Node backed by an async closure
pub struct FnNode<F> {
    f: F,
}

/// Wrap an async closure `(NodeInput, RunContext<S>) -> Result<StateDelta, ScoutError>` as a node
pub fn node_fn<F>(f: F) -> FnNode<F> {
    FnNode { f }
}

#[async_trait]
impl<S, F, Fut> Node<S> for FnNode<F>
where
    S: Send + Sync + 'static,
    F: Fn(NodeInput, RunContext<S>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<StateDelta, ScoutError>> + Send,
{
    async fn run(&self, input: NodeInput, ctx: &RunContext<S>) -> Result<StateDelta, ScoutError> {
        (self.f)(input, ctx.clone()).await
    }
}
