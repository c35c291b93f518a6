// SPDX-License-Identifier: MIT

//! Graph-based workflow execution
//!
//! A [`Graph`] is built once with [`GraphBuilder`] and is immutable
//! afterwards. The [`Executor`] walks it in supersteps: every activation in
//! the frontier runs concurrently, the barrier waits for all of them, their
//! deltas are merged in activation order, and the outgoing edge of each node
//! that ran decides the next frontier.

mod builder;
mod events;
pub mod executor;
mod loop_guard;
mod node;
pub mod types;

pub use builder::{Graph, GraphBuilder};
pub use events::RunEvent;
pub use executor::{Executor, NodeFailure, RunReport, RunStatus, StepRecord};
pub use loop_guard::LoopGuard;
pub use node::{node_fn, FnNode, Node, NodeInput, Router, RunContext, RunLimits};
pub use types::{FanOut, FanOutInstance, RouteDecision, WaitMode, END, FAILURES_CHANNEL, START};
