// SPDX-License-Identifier: MIT

//! Graph workflow type definitions

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Pseudo-node the run starts from
pub const START: &str = "__start__";

/// Pseudo-node that terminates the run
pub const END: &str = "__end__";

/// Reserved append channel collecting every node failure of a run
pub const FAILURES_CHANNEL: &str = "__failures__";

/// Decision produced by a router after its node completes
#[derive(Debug, Clone, PartialEq)]
pub enum RouteDecision {
    /// Continue with exactly one node
    Single(String),
    /// Launch N parameterized instances concurrently
    FanOut(FanOut),
    /// Route to END
    Terminal,
}

impl RouteDecision {
    /// Route to a single node (`END` is accepted and means terminal)
    pub fn to(node: impl Into<String>) -> Self {
        Self::Single(node.into())
    }

    /// Fan out to `target`, one instance per payload
    pub fn fan_out<I>(target: &str, payloads: I) -> Self
    where
        I: IntoIterator<Item = Value>,
    {
        Self::FanOut(FanOut::new(target, payloads))
    }
}

/// A typed fan-out event: an indexed list of instances to run in parallel.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FanOut {
    instances: Vec<FanOutInstance>,
}

/// One instance of a fan-out. `index` is zero-based and unique within the event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FanOutInstance {
    pub target: String,
    pub index: usize,
    pub payload: Value,
}

impl FanOut {
    /// All instances target the same node
    pub fn new<I>(target: &str, payloads: I) -> Self
    where
        I: IntoIterator<Item = Value>,
    {
        Self::from_targets(payloads.into_iter().map(|p| (target.to_string(), p)))
    }

    /// Instances may target different nodes; indices follow iteration order
    pub fn from_targets<I>(instances: I) -> Self
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        let instances = instances
            .into_iter()
            .enumerate()
            .map(|(index, (target, payload))| FanOutInstance {
                target,
                index,
                payload,
            })
            .collect();
        Self { instances }
    }

    pub fn instances(&self) -> &[FanOutInstance] {
        &self.instances
    }

    pub fn into_instances(self) -> Vec<FanOutInstance> {
        self.instances
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }
}

/// How a node with several static in-edges waits for its predecessors
#[derive(Debug, Clone, Copy, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum WaitMode {
    /// Wait for ALL static predecessors to complete (default)
    #[default]
    All,
    /// Run when ANY static predecessor completes
    Any,
}
