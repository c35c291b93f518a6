// SPDX-License-Identifier: MIT

//! Superstep graph executor

use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use uuid::Uuid;

use super::builder::{Edge, Graph};
use super::events::RunEvent;
use super::node::{NodeInput, RunContext};
use super::types::{RouteDecision, WaitMode, END, FAILURES_CHANNEL, START};
use crate::adk::error::{GraphError, ScoutError};
use crate::scout::workflow::state::{Snapshot, StateDelta, StateStore, Values};

/// Lifecycle of a run
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
    Cancelled,
    Failed,
}

/// A node invocation that returned an error (or panicked)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeFailure {
    pub node: String,
    pub instance: Option<usize>,
    pub step: usize,
    pub message: String,
}

/// Activations executed in one superstep, in merge order
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StepRecord {
    pub step: usize,
    pub nodes: Vec<String>,
}

/// Outcome of a run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub status: RunStatus,
    pub steps: usize,
    /// Final state; empty when the run failed
    pub state: Values,
    pub failures: Vec<NodeFailure>,
    #[serde(serialize_with = "error_as_string")]
    pub error: Option<GraphError>,
    pub trace: Vec<StepRecord>,
}

fn error_as_string<Ser>(error: &Option<GraphError>, serializer: Ser) -> Result<Ser::Ok, Ser::Error>
where
    Ser: serde::Serializer,
{
    match error {
        Some(e) => serializer.serialize_some(&e.to_string()),
        None => serializer.serialize_none(),
    }
}

impl RunReport {
    fn new(run_id: Uuid) -> Self {
        Self {
            run_id,
            status: RunStatus::Pending,
            steps: 0,
            state: Values::new(),
            failures: Vec::new(),
            error: None,
            trace: Vec::new(),
        }
    }

    pub fn get(&self, channel: &str) -> Option<&Value> {
        self.state.get(channel)
    }

    pub fn is_completed(&self) -> bool {
        self.status == RunStatus::Completed
    }

    /// Turn a failed run into its configuration error
    pub fn into_result(mut self) -> Result<RunReport, GraphError> {
        if self.status == RunStatus::Failed {
            return Err(self
                .error
                .take()
                .unwrap_or(GraphError::StepLimitExceeded(self.steps)));
        }
        Ok(self)
    }

    /// The activation labels of every step, e.g. `web_research[1]`
    pub fn visited(&self) -> Vec<&str> {
        self.trace
            .iter()
            .flat_map(|s| s.nodes.iter().map(|n| n.as_str()))
            .collect()
    }
}

/// One entry of the frontier
#[derive(Debug, Clone)]
struct Activation {
    node: String,
    payload: Option<Value>,
    instance: Option<usize>,
}

impl Activation {
    fn single(node: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            payload: None,
            instance: None,
        }
    }

    fn label(&self) -> String {
        match self.instance {
            Some(i) => format!("{}[{}]", self.node, i),
            None => self.node.clone(),
        }
    }
}

/// Executes a [`Graph`] in supersteps.
///
/// Each step launches every activation of the frontier concurrently and
/// waits at a barrier for all of them. Deltas are merged in frontier order,
/// so the result never depends on completion order. Then each distinct node
/// that ran is routed once against the merged state to form the next
/// frontier.
pub struct Executor<S = ()> {
    graph: Arc<Graph<S>>,
    events: Option<mpsc::Sender<RunEvent>>,
}

impl<S: Send + Sync + 'static> Executor<S> {
    pub fn new(graph: Arc<Graph<S>>) -> Self {
        Self {
            graph,
            events: None,
        }
    }

    /// Publish progress events on `tx`
    pub fn with_events(mut self, tx: mpsc::Sender<RunEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    pub fn graph(&self) -> &Graph<S> {
        &self.graph
    }

    async fn emit(&self, event: RunEvent) {
        if let Some(tx) = &self.events {
            // A gone receiver just means nobody is listening anymore
            let _ = tx.send(event).await;
        }
    }

    /// Run the graph from START with `input` as initial channel values
    pub async fn run(&self, input: Values, ctx: RunContext<S>) -> RunReport {
        let graph = &self.graph;
        let mut report = RunReport::new(ctx.run_id());
        let mut store = StateStore::new(graph.schema(), input);

        report.status = RunStatus::Running;
        self.emit(RunEvent::RunStarted {
            run_id: ctx.run_id(),
            graph: graph.name().to_string(),
        })
        .await;

        if let Some(counter) = graph.loop_counter() {
            if store.get(counter).is_none() {
                store.merge(StateDelta::new().set(counter, 0));
            }
        }

        let budget = ctx
            .limits()
            .max_steps
            .unwrap_or_else(|| graph.step_budget(ctx.limits().max_loop_iterations));

        log::info!(
            "Starting run {} of graph '{}' (step budget {})",
            ctx.run_id(),
            graph.name(),
            budget
        );

        let mut arrivals: HashMap<String, HashSet<String>> = HashMap::new();
        let mut frontier = match self.next_frontier(&[START], &store.snapshot(), &ctx, &mut arrivals).await {
            Ok(frontier) => frontier,
            Err(e) => return self.fail(report, e).await,
        };

        loop {
            if frontier.is_empty() {
                if let Some(stranded) = self.stranded_join(&arrivals) {
                    return self.fail(report, stranded).await;
                }
                report.status = RunStatus::Completed;
                break;
            }
            if ctx.is_cancelled() {
                log::warn!("Run {} cancelled before step {}", ctx.run_id(), report.steps + 1);
                report.status = RunStatus::Cancelled;
                break;
            }
            if report.steps >= budget {
                log::error!("Run {} exceeded its step budget of {}", ctx.run_id(), budget);
                return self.fail(report, GraphError::StepLimitExceeded(budget)).await;
            }

            report.steps += 1;
            let step = report.steps;
            let ran = self.execute_step(step, frontier, &mut store, &mut report, &ctx).await;

            if ctx.is_cancelled() {
                log::warn!("Run {} cancelled during step {}", ctx.run_id(), step);
                report.status = RunStatus::Cancelled;
                break;
            }

            let sources: Vec<&str> = ran.iter().map(|s| s.as_str()).collect();
            frontier = match self.next_frontier(&sources, &store.snapshot(), &ctx, &mut arrivals).await {
                Ok(frontier) => frontier,
                Err(e) => return self.fail(report, e).await,
            };
        }

        report.state = store.into_values();
        log::info!(
            "Run {} finished with status {:?} after {} steps ({} failures)",
            report.run_id,
            report.status,
            report.steps,
            report.failures.len()
        );
        self.emit(RunEvent::RunFinished {
            run_id: report.run_id,
            status: report.status,
            steps: report.steps,
        })
        .await;
        report
    }

    /// Run one superstep and merge its results. Returns the distinct nodes
    /// that ran, in frontier order.
    async fn execute_step(
        &self,
        step: usize,
        frontier: Vec<Activation>,
        store: &mut StateStore,
        report: &mut RunReport,
        ctx: &RunContext<S>,
    ) -> Vec<String> {
        let labels: Vec<String> = frontier.iter().map(Activation::label).collect();
        log::info!("Step {}: executing {} activations: {:?}", step, labels.len(), labels);
        self.emit(RunEvent::StepStarted {
            step,
            nodes: labels.clone(),
        })
        .await;

        let mut ran: Vec<String> = Vec::new();
        let snapshot = store.snapshot();
        let mut tasks = JoinSet::new();

        for (seq, activation) in frontier.into_iter().enumerate() {
            let Some(entry) = self.graph.nodes.get(&activation.node) else {
                log::error!("Step {}: node '{}' is not registered", step, activation.node);
                continue;
            };
            if !ran.contains(&activation.node) {
                ran.push(activation.node.clone());
            }

            let node = entry.node.clone();
            let view = match node.reads() {
                Some(channels) => store.read(channels),
                None => snapshot.clone(),
            };
            let input = NodeInput {
                node: activation.node,
                snapshot: view,
                payload: activation.payload,
                instance: activation.instance,
            };
            let ctx = ctx.clone();

            tasks.spawn(async move {
                let result = tokio::select! {
                    biased;
                    _ = ctx.cancellation().cancelled() => Err(ScoutError::Cancelled),
                    outcome = AssertUnwindSafe(node.run(input.clone(), &ctx)).catch_unwind() => {
                        match outcome {
                            Ok(result) => result,
                            Err(_) => Err(ScoutError::other(format!("node '{}' panicked", input.node))),
                        }
                    }
                };
                (seq, input, result)
            });
        }

        let mut outcomes = Vec::with_capacity(tasks.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => log::error!("Step {}: node task aborted: {}", step, e),
            }
        }
        outcomes.sort_by_key(|(seq, _, _)| *seq);

        let mut deltas = Vec::with_capacity(outcomes.len());
        for (seq, input, result) in outcomes {
            match result {
                Ok(delta) => {
                    self.emit(RunEvent::NodeCompleted {
                        step,
                        node: input.node.clone(),
                        instance: input.instance,
                    })
                    .await;
                    deltas.push((seq, delta));
                }
                Err(error) => {
                    log::warn!("Step {}: node '{}' failed: {}", step, input.node, error);
                    let failure = NodeFailure {
                        node: input.node.clone(),
                        instance: input.instance,
                        step,
                        message: error.to_string(),
                    };

                    let mut delta = match (&error, self.graph.nodes.get(&input.node)) {
                        (ScoutError::Cancelled, _) | (_, None) => StateDelta::new(),
                        (_, Some(entry)) => entry.node.fail_soft(&input, &error),
                    };
                    match serde_json::to_value(&failure) {
                        Ok(record) => delta.insert(FAILURES_CHANNEL, record),
                        Err(e) => log::error!("Could not record failure of '{}': {}", input.node, e),
                    }

                    self.emit(RunEvent::NodeFailed {
                        step,
                        node: failure.node.clone(),
                        instance: failure.instance,
                        error: failure.message.clone(),
                    })
                    .await;
                    report.failures.push(failure);
                    deltas.push((seq, delta));
                }
            }
        }

        let mut channels: Vec<String> = Vec::new();
        for (_, delta) in &deltas {
            for channel in delta.channels() {
                if !channels.iter().any(|c| c == channel) {
                    channels.push(channel.to_string());
                }
            }
        }
        store.merge_ordered(deltas);

        self.emit(RunEvent::StepMerged { step, channels }).await;
        report.trace.push(StepRecord { step, nodes: labels });
        ran
    }

    /// Follow the outgoing edges of `sources` against the merged state
    async fn next_frontier(
        &self,
        sources: &[&str],
        snapshot: &Snapshot,
        ctx: &RunContext<S>,
        arrivals: &mut HashMap<String, HashSet<String>>,
    ) -> Result<Vec<Activation>, GraphError> {
        let mut frontier: Vec<Activation> = Vec::new();
        let mut queued: HashSet<String> = HashSet::new();

        let mut push_single = |frontier: &mut Vec<Activation>, node: &str| {
            if queued.insert(node.to_string()) {
                frontier.push(Activation::single(node));
            }
        };

        for &source in sources {
            let Some(edge) = self.graph.edges.get(source) else {
                continue;
            };

            match edge {
                Edge::Static(targets) => {
                    for target in targets {
                        if target == END {
                            continue;
                        }
                        if self.join_ready(source, target, arrivals) {
                            push_single(&mut frontier, target);
                        }
                    }
                }
                Edge::Conditional {
                    router,
                    destinations,
                } => match router.route(snapshot, ctx) {
                    RouteDecision::Terminal => {
                        if !destinations.contains(END) {
                            return Err(GraphError::UndeclaredDestination {
                                source_node: source.to_string(),
                                target: END.to_string(),
                            });
                        }
                        log::debug!("'{}' routed to END", source);
                    }
                    RouteDecision::Single(target) => {
                        if !destinations.contains(&target) {
                            return Err(GraphError::UndeclaredDestination {
                                source_node: source.to_string(),
                                target,
                            });
                        }
                        if target == END {
                            log::debug!("'{}' routed to END", source);
                        } else {
                            push_single(&mut frontier, &target);
                        }
                    }
                    RouteDecision::FanOut(fan_out) => {
                        if fan_out.is_empty() {
                            log::info!("'{}' fanned out to zero instances", source);
                            continue;
                        }
                        if let Some(bad) = fan_out
                            .instances()
                            .iter()
                            .find(|i| i.target == END || !destinations.contains(&i.target))
                        {
                            return Err(GraphError::UndeclaredDestination {
                                source_node: source.to_string(),
                                target: bad.target.clone(),
                            });
                        }

                        let mut targets: Vec<String> = Vec::new();
                        for instance in fan_out.instances() {
                            if !targets.contains(&instance.target) {
                                targets.push(instance.target.clone());
                            }
                        }
                        log::info!("'{}' fanning out {} instances to {:?}", source, fan_out.len(), targets);
                        self.emit(RunEvent::FanOut {
                            source: source.to_string(),
                            targets,
                            count: fan_out.len(),
                        })
                        .await;

                        frontier.extend(fan_out.into_instances().into_iter().map(|i| Activation {
                            node: i.target,
                            payload: Some(i.payload),
                            instance: Some(i.index),
                        }));
                    }
                },
            }
        }

        Ok(frontier)
    }

    /// Record that `source` completed and report whether `target` may run
    fn join_ready(
        &self,
        source: &str,
        target: &str,
        arrivals: &mut HashMap<String, HashSet<String>>,
    ) -> bool {
        let predecessors = match self.graph.predecessors.get(target) {
            Some(p) if p.len() > 1 => p,
            _ => return true,
        };
        let mode = self
            .graph
            .nodes
            .get(target)
            .map(|n| n.wait)
            .unwrap_or_default();

        let arrived = arrivals.entry(target.to_string()).or_default();
        let first = arrived.is_empty();
        arrived.insert(source.to_string());
        let complete = predecessors.iter().all(|p| arrived.contains(p));
        if complete {
            arrivals.remove(target);
        }

        match mode {
            WaitMode::All => complete,
            WaitMode::Any => first,
        }
    }

    /// A join still holding arrivals once nothing else can run
    fn stranded_join(&self, arrivals: &HashMap<String, HashSet<String>>) -> Option<GraphError> {
        let mut waiting: Vec<&String> = arrivals
            .iter()
            .filter(|(node, arrived)| {
                !arrived.is_empty()
                    && self.graph.nodes.get(node.as_str()).map(|n| n.wait) != Some(WaitMode::Any)
            })
            .map(|(node, _)| node)
            .collect();
        waiting.sort_unstable();

        let node = waiting.into_iter().next()?;
        let arrived = &arrivals[node];
        let missing: Vec<String> = self
            .graph
            .predecessors
            .get(node)
            .map(|preds| preds.iter().filter(|p| !arrived.contains(*p)).cloned().collect())
            .unwrap_or_default();

        log::error!("Join '{}' never received {:?}", node, missing);
        Some(GraphError::StrandedJoin {
            node: node.clone(),
            missing,
        })
    }

    async fn fail(&self, mut report: RunReport, error: GraphError) -> RunReport {
        log::error!("Run {} failed: {}", report.run_id, error);
        report.status = RunStatus::Failed;
        report.state = Values::new();
        report.error = Some(error);
        self.emit(RunEvent::RunFinished {
            run_id: report.run_id,
            status: report.status,
            steps: report.steps,
        })
        .await;
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scout::workflow::graph::builder::GraphBuilder;
    use crate::scout::workflow::graph::node::{node_fn, Node, RunLimits};
    use crate::scout::workflow::graph::types::FanOut;
    use crate::scout::workflow::state::ChannelDef;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    // Mock node that appends its own name to the `visited` channel
    struct Marker {
        name: &'static str,
    }

    #[async_trait]
    impl Node for Marker {
        async fn run(&self, _input: NodeInput, _ctx: &RunContext) -> Result<StateDelta, ScoutError> {
            Ok(StateDelta::new().set("visited", self.name))
        }
    }

    // Mock node that always fails and substitutes a placeholder
    struct Broken;

    #[async_trait]
    impl Node for Broken {
        async fn run(&self, _input: NodeInput, _ctx: &RunContext) -> Result<StateDelta, ScoutError> {
            Err(ScoutError::api("mock", "upstream unavailable"))
        }

        fn fail_soft(&self, _input: &NodeInput, error: &ScoutError) -> StateDelta {
            StateDelta::new().set("visited", format!("fallback: {}", error))
        }
    }

    // Mock node that sleeps for the duration in its payload
    struct Sleeper;

    #[async_trait]
    impl Node for Sleeper {
        async fn run(&self, input: NodeInput, _ctx: &RunContext) -> Result<StateDelta, ScoutError> {
            let delay = input.payload_u64("delay_ms").unwrap_or(0);
            tokio::time::sleep(Duration::from_millis(delay)).await;
            Ok(StateDelta::new()
                .set("visited", input.payload_str("label").unwrap_or_default())
                .set("last", input.payload_str("label").unwrap_or_default()))
        }
    }

    fn schema_graph(name: &str) -> GraphBuilder {
        GraphBuilder::new(name).channel("visited", ChannelDef::append())
    }

    fn visited(report: &RunReport) -> Vec<String> {
        report
            .get("visited")
            .and_then(|v| v.as_array())
            .map(|a| a.iter().filter_map(|v| v.as_str().map(String::from)).collect())
            .unwrap_or_default()
    }

    async fn run(graph: Graph) -> RunReport {
        Executor::new(Arc::new(graph))
            .run(Values::new(), RunContext::new(()))
            .await
    }

    #[tokio::test]
    async fn test_linear_run_completes() {
        let graph = schema_graph("linear")
            .node("a", Marker { name: "a" })
            .node("b", Marker { name: "b" })
            .edge(START, "a")
            .edge("a", "b")
            .edge("b", END)
            .build()
            .unwrap();

        let report = run(graph).await;

        assert_eq!(report.status, RunStatus::Completed);
        assert_eq!(report.steps, 2);
        assert_eq!(visited(&report), vec!["a", "b"]);
        assert!(report.failures.is_empty());
        assert_eq!(report.visited(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_input_seeds_state() {
        let graph = schema_graph("seed")
            .node("a", Marker { name: "a" })
            .edge(START, "a")
            .edge("a", END)
            .build()
            .unwrap();

        let mut input = Values::new();
        input.insert("visited".to_string(), json!(["seed"]));
        let report = Executor::new(Arc::new(graph))
            .run(input, RunContext::new(()))
            .await;

        assert_eq!(visited(&report), vec!["seed", "a"]);
    }

    #[tokio::test]
    async fn test_fan_out_merges_in_index_order() {
        let router = |_s: &Snapshot, _c: &RunContext| {
            RouteDecision::fan_out(
                "work",
                vec![
                    json!({"label": "first", "delay_ms": 60}),
                    json!({"label": "second", "delay_ms": 0}),
                    json!({"label": "third", "delay_ms": 30}),
                ],
            )
        };
        let graph = schema_graph("fan-out")
            .node("plan", Marker { name: "plan" })
            .node("work", Sleeper)
            .edge(START, "plan")
            .conditional_edge("plan", router, ["work"])
            .edge("work", END)
            .build()
            .unwrap();

        let report = run(graph).await;

        assert_eq!(report.status, RunStatus::Completed);
        assert_eq!(visited(&report), vec!["plan", "first", "second", "third"]);
        // Concurrent replace writes resolve to the highest index
        assert_eq!(report.get("last"), Some(&json!("third")));
        assert_eq!(report.trace[1].nodes, vec!["work[0]", "work[1]", "work[2]"]);
    }

    #[tokio::test]
    async fn test_fan_out_runs_concurrently() {
        let router = |_s: &Snapshot, _c: &RunContext| {
            RouteDecision::fan_out(
                "work",
                (0..4).map(|i| json!({"label": format!("w{}", i), "delay_ms": 100})),
            )
        };
        let graph = schema_graph("parallel")
            .node("plan", Marker { name: "plan" })
            .node("work", Sleeper)
            .edge(START, "plan")
            .conditional_edge("plan", router, ["work"])
            .edge("work", END)
            .build()
            .unwrap();

        let started = std::time::Instant::now();
        let report = run(graph).await;

        assert_eq!(report.status, RunStatus::Completed);
        assert!(started.elapsed() < Duration::from_millis(350));
    }

    #[tokio::test]
    async fn test_empty_fan_out_is_noop() {
        let router = |_s: &Snapshot, _c: &RunContext| RouteDecision::FanOut(FanOut::default());
        let graph = schema_graph("empty")
            .node("plan", Marker { name: "plan" })
            .node("work", Sleeper)
            .edge(START, "plan")
            .conditional_edge("plan", router, ["work"])
            .edge("work", END)
            .build()
            .unwrap();

        let report = run(graph).await;

        assert_eq!(report.status, RunStatus::Completed);
        assert_eq!(report.steps, 1);
    }

    #[tokio::test]
    async fn test_join_waits_for_all_predecessors() {
        let graph = schema_graph("join")
            .node("a", Marker { name: "a" })
            .node("b1", Marker { name: "b1" })
            .node("b2", Marker { name: "b2" })
            .node("join", Marker { name: "join" })
            .edge(START, "a")
            .edge(START, "b1")
            .edge("b1", "b2")
            .edge("a", "join")
            .edge("b2", "join")
            .edge("join", END)
            .build()
            .unwrap();

        let report = run(graph).await;

        assert_eq!(report.status, RunStatus::Completed);
        assert_eq!(visited(&report), vec!["a", "b1", "b2", "join"]);
        assert_eq!(report.steps, 3);
    }

    #[tokio::test]
    async fn test_join_fails_when_predecessor_is_routed_away() {
        let graph = schema_graph("stranded")
            .node("a", Marker { name: "a" })
            .node("b1", Marker { name: "b1" })
            .node("b2", Marker { name: "b2" })
            .node("join", Marker { name: "join" })
            .edge(START, "a")
            .edge(START, "b1")
            .conditional_edge("b1", |_s: &Snapshot, _c: &RunContext| RouteDecision::Terminal, ["b2", END])
            .edge("a", "join")
            .edge("b2", "join")
            .edge("join", END)
            .build()
            .unwrap();

        let report = run(graph).await;

        assert_eq!(report.status, RunStatus::Failed);
        assert_eq!(report.steps, 1);
        assert_eq!(
            report.error,
            Some(GraphError::StrandedJoin {
                node: "join".to_string(),
                missing: vec!["b2".to_string()],
            })
        );
    }

    #[tokio::test]
    async fn test_wait_any_fires_on_first_predecessor() {
        let graph = schema_graph("any")
            .node("a", Marker { name: "a" })
            .node("b1", Marker { name: "b1" })
            .node("b2", Marker { name: "b2" })
            .node("join", Marker { name: "join" })
            .edge(START, "a")
            .edge(START, "b1")
            .edge("b1", "b2")
            .edge("a", "join")
            .edge("b2", "join")
            .edge("join", END)
            .wait_for("join", WaitMode::Any)
            .build()
            .unwrap();

        let report = run(graph).await;

        assert_eq!(report.status, RunStatus::Completed);
        assert_eq!(visited(&report), vec!["a", "b1", "join", "b2"]);
    }

    #[tokio::test]
    async fn test_failure_is_recorded_and_soft() {
        let graph = schema_graph("fail-soft")
            .node("broken", Broken)
            .node("after", Marker { name: "after" })
            .edge(START, "broken")
            .edge("broken", "after")
            .edge("after", END)
            .build()
            .unwrap();

        let report = run(graph).await;

        assert_eq!(report.status, RunStatus::Completed);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].node, "broken");
        assert_eq!(report.failures[0].step, 1);
        let visits = visited(&report);
        assert!(visits[0].starts_with("fallback: API error from mock"));
        assert_eq!(visits[1], "after");
        assert_eq!(
            report.get(FAILURES_CHANNEL).and_then(|v| v.as_array()).map(|a| a.len()),
            Some(1)
        );
    }

    #[tokio::test]
    async fn test_panicking_node_becomes_failure() {
        let panicky = node_fn(|_input: NodeInput, _ctx: RunContext| async move {
            if true {
                panic!("boom");
            }
            Ok::<_, ScoutError>(StateDelta::new())
        });
        let graph = schema_graph("panic")
            .node("panicky", panicky)
            .edge(START, "panicky")
            .edge("panicky", END)
            .build()
            .unwrap();

        let report = run(graph).await;

        assert_eq!(report.status, RunStatus::Completed);
        assert_eq!(report.failures.len(), 1);
        assert!(report.failures[0].message.contains("panicked"));
    }

    #[tokio::test]
    async fn test_undeclared_destination_fails_run() {
        let router = |_s: &Snapshot, _c: &RunContext| RouteDecision::to("b");
        let graph = schema_graph("undeclared")
            .node("a", Marker { name: "a" })
            .node("b", Marker { name: "b" })
            .node("c", Marker { name: "c" })
            .edge(START, "a")
            .conditional_edge("a", router, ["c"])
            .edge("b", END)
            .edge("c", END)
            .build()
            .unwrap();

        let report = run(graph).await;

        assert_eq!(report.status, RunStatus::Failed);
        assert!(report.state.is_empty());
        assert_eq!(
            report.clone().into_result().err(),
            Some(GraphError::UndeclaredDestination {
                source_node: "a".to_string(),
                target: "b".to_string(),
            })
        );
    }

    #[tokio::test]
    async fn test_step_budget_stops_runaway_loop() {
        let router = |_s: &Snapshot, _c: &RunContext| RouteDecision::to("spin");
        let graph = schema_graph("runaway")
            .node("spin", Marker { name: "spin" })
            .edge(START, "spin")
            .conditional_edge("spin", router, ["spin"])
            .build()
            .unwrap();

        let ctx = RunContext::new(()).with_limits(RunLimits {
            max_loop_iterations: 2,
            max_steps: Some(5),
        });
        let report = Executor::new(Arc::new(graph)).run(Values::new(), ctx).await;

        assert_eq!(report.status, RunStatus::Failed);
        assert_eq!(report.steps, 5);
        assert_eq!(report.error, Some(GraphError::StepLimitExceeded(5)));
    }

    #[tokio::test]
    async fn test_cancellation_stops_run() {
        let slow = node_fn(|_input: NodeInput, _ctx: RunContext| async move {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok::<_, ScoutError>(StateDelta::new().set("visited", "slow"))
        });
        let graph = schema_graph("cancel")
            .node("slow", slow)
            .node("after", Marker { name: "after" })
            .edge(START, "slow")
            .edge("slow", "after")
            .edge("after", END)
            .build()
            .unwrap();

        let ctx = RunContext::new(());
        let token = ctx.cancellation().clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            token.cancel();
        });

        let report = Executor::new(Arc::new(graph)).run(Values::new(), ctx).await;

        assert_eq!(report.status, RunStatus::Cancelled);
        assert_eq!(report.steps, 1);
        assert!(visited(&report).is_empty());
        assert_eq!(report.failures.len(), 1);
    }

    #[tokio::test]
    async fn test_router_sees_merged_state() {
        let router = |s: &Snapshot, _c: &RunContext| {
            if s.items("visited").len() >= 3 {
                RouteDecision::Terminal
            } else {
                RouteDecision::to("a")
            }
        };
        let graph = schema_graph("loop")
            .node("a", Marker { name: "a" })
            .edge(START, "a")
            .conditional_edge("a", router, ["a", END])
            .build()
            .unwrap();

        let report = run(graph).await;

        assert_eq!(report.status, RunStatus::Completed);
        assert_eq!(visited(&report), vec!["a", "a", "a"]);
    }

    #[tokio::test]
    async fn test_terminal_requires_declared_end() {
        let router = |_s: &Snapshot, _c: &RunContext| RouteDecision::Terminal;
        let graph = schema_graph("no-exit")
            .node("a", Marker { name: "a" })
            .node("b", Marker { name: "b" })
            .edge(START, "a")
            .conditional_edge("a", router, ["b"])
            .edge("b", END)
            .build()
            .unwrap();

        let report = run(graph).await;

        assert_eq!(report.status, RunStatus::Failed);
        assert_eq!(
            report.error,
            Some(GraphError::UndeclaredDestination {
                source_node: "a".to_string(),
                target: END.to_string(),
            })
        );
    }

    #[tokio::test]
    async fn test_router_evaluated_once_per_node() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let fan = |_s: &Snapshot, _c: &RunContext| {
            RouteDecision::fan_out("work", vec![json!({"label": "x"}), json!({"label": "y"})])
        };
        let after_work = move |_s: &Snapshot, _c: &RunContext| {
            counter.fetch_add(1, Ordering::SeqCst);
            RouteDecision::to("done")
        };
        let graph = schema_graph("route-once")
            .node("plan", Marker { name: "plan" })
            .node("work", Sleeper)
            .node("done", Marker { name: "done" })
            .edge(START, "plan")
            .conditional_edge("plan", fan, ["work"])
            .conditional_edge("work", after_work, ["done"])
            .edge("done", END)
            .build()
            .unwrap();

        let report = run(graph).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(visited(&report), vec!["plan", "x", "y", "done"]);
    }

    #[tokio::test]
    async fn test_loop_counter_initialized() {
        let graph = schema_graph("counter")
            .channel("loops", ChannelDef::replace(crate::scout::workflow::state::FieldType::Number))
            .node("a", Marker { name: "a" })
            .edge(START, "a")
            .edge("a", END)
            .loop_counter("loops")
            .build()
            .unwrap();

        let report = run(graph).await;
        assert_eq!(report.get("loops"), Some(&json!(0)));
    }

    #[tokio::test]
    async fn test_events_published() {
        let graph = schema_graph("events")
            .node("a", Marker { name: "a" })
            .edge(START, "a")
            .edge("a", END)
            .build()
            .unwrap();

        let (tx, mut rx) = mpsc::channel(32);
        let report = Executor::new(Arc::new(graph))
            .with_events(tx)
            .run(Values::new(), RunContext::new(()))
            .await;

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }

        assert!(matches!(events.first(), Some(RunEvent::RunStarted { .. })));
        assert!(events
            .iter()
            .any(|e| matches!(e, RunEvent::NodeCompleted { node, .. } if node == "a")));
        assert_eq!(
            events.last(),
            Some(&RunEvent::RunFinished {
                run_id: report.run_id,
                status: RunStatus::Completed,
                steps: 1,
            })
        );
    }
}
