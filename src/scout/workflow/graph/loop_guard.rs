// SPDX-License-Identifier: MIT

//! Bounded feedback loops
//!
//! The guard owns a counter channel. The node on the feedback path writes
//! `tick`, and the router that closes the loop asks `route` whether another
//! pass is allowed. Once the counter reaches the maximum the loop exits no
//! matter what the domain check says.

use super::node::RunContext;
use super::types::RouteDecision;
use crate::scout::workflow::state::{Snapshot, StateDelta};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopGuard {
    channel: String,
    max: u32,
}

impl LoopGuard {
    pub fn new(channel: impl Into<String>, max: u32) -> Self {
        Self {
            channel: channel.into(),
            max,
        }
    }

    /// Guard whose maximum comes from the run's limits
    pub fn for_run<S>(channel: impl Into<String>, ctx: &RunContext<S>) -> Self {
        Self::new(channel, ctx.limits().max_loop_iterations)
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn max(&self) -> u32 {
        self.max
    }

    /// Passes completed so far. Read numerically like the `MAX` policy, so
    /// `2.0` counts as 2.
    pub fn count(&self, snapshot: &Snapshot) -> u32 {
        snapshot
            .get_f64(&self.channel)
            .filter(|c| c.is_finite() && *c > 0.0)
            .map(|c| c.floor().min(u32::MAX as f64) as u32)
            .unwrap_or(0)
    }

    pub fn next_count(&self, snapshot: &Snapshot) -> u32 {
        self.count(snapshot).saturating_add(1)
    }

    /// Delta recording one more pass through the loop body
    pub fn tick(&self, snapshot: &Snapshot) -> StateDelta {
        StateDelta::new().set(self.channel.clone(), self.next_count(snapshot))
    }

    pub fn exhausted(&self, snapshot: &Snapshot) -> bool {
        self.count(snapshot) >= self.max
    }

    pub fn remaining(&self, snapshot: &Snapshot) -> u32 {
        self.max.saturating_sub(self.count(snapshot))
    }

    /// Leave the loop for `exit` when `done` or when the guard is exhausted,
    /// otherwise take `again`.
    pub fn route<F>(&self, snapshot: &Snapshot, done: bool, exit: &str, again: F) -> RouteDecision
    where
        F: FnOnce() -> RouteDecision,
    {
        if done {
            return RouteDecision::to(exit);
        }
        if self.exhausted(snapshot) {
            log::info!(
                "Loop guard '{}' reached {} passes, leaving loop",
                self.channel,
                self.max
            );
            return RouteDecision::to(exit);
        }
        again()
    }
}
