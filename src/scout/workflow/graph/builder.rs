// SPDX-License-Identifier: MIT

//! Graph construction and validation

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use super::node::{Node, Router};
use super::types::{WaitMode, END, FAILURES_CHANNEL, START};
use crate::adk::error::GraphError;
use crate::scout::workflow::state::{ChannelDef, MergePolicy, StateSchema};

/// Outgoing edge of a node (or of START)
pub(crate) enum Edge<S> {
    /// Unconditional edges; several targets run as parallel branches
    Static(Vec<String>),
    /// Router plus its declared destinations
    Conditional {
        router: Arc<dyn Router<S>>,
        destinations: HashSet<String>,
    },
}

/// Node registered in a graph
pub(crate) struct GraphNode<S> {
    pub node: Arc<dyn Node<S>>,
    pub wait: WaitMode,
}

/// Immutable, validated workflow graph
pub struct Graph<S = ()> {
    name: String,
    schema: StateSchema,
    pub(crate) nodes: HashMap<String, GraphNode<S>>,
    pub(crate) edges: HashMap<String, Edge<S>>,
    /// Static in-edge sources of every node (START excluded)
    pub(crate) predecessors: HashMap<String, Vec<String>>,
    loop_counter: Option<String>,
    edge_count: usize,
}

impl<S> Graph<S> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> &StateSchema {
        &self.schema
    }

    pub fn loop_counter(&self) -> Option<&str> {
        self.loop_counter.as_deref()
    }

    pub fn contains_node(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    pub fn node_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.nodes.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    /// Declared edges, counting each conditional destination once
    pub fn edge_count(&self) -> usize {
        self.edge_count
    }

    /// Scheduler steps after which a run is considered runaway.
    ///
    /// Every pass through the graph takes at most one step per edge, and the
    /// feedback loop can repeat that `max_loops` times.
    pub fn step_budget(&self, max_loops: u32) -> usize {
        (self.edge_count + 1) * (max_loops as usize + 1)
    }
}

/// Builder for [`Graph`]; all validation happens in [`GraphBuilder::build`]
pub struct GraphBuilder<S = ()> {
    name: String,
    schema: StateSchema,
    nodes: Vec<(String, Arc<dyn Node<S>>)>,
    wait_modes: HashMap<String, WaitMode>,
    static_edges: Vec<(String, String)>,
    conditional_edges: Vec<(String, Arc<dyn Router<S>>, Vec<String>)>,
    loop_counter: Option<String>,
}

impl<S: Send + Sync + 'static> GraphBuilder<S> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            schema: StateSchema::default(),
            nodes: Vec::new(),
            wait_modes: HashMap::new(),
            static_edges: Vec::new(),
            conditional_edges: Vec::new(),
            loop_counter: None,
        }
    }

    /// Replace the state schema
    pub fn schema(mut self, schema: StateSchema) -> Self {
        self.schema = schema;
        self
    }

    /// Declare one channel
    pub fn channel(mut self, name: impl Into<String>, def: ChannelDef) -> Self {
        self.schema.channels.insert(name.into(), def);
        self
    }

    pub fn node(self, name: impl Into<String>, node: impl Node<S> + 'static) -> Self {
        self.node_arc(name, Arc::new(node))
    }

    pub fn node_arc(mut self, name: impl Into<String>, node: Arc<dyn Node<S>>) -> Self {
        self.nodes.push((name.into(), node));
        self
    }

    /// How `node` waits when it has several static in-edges
    pub fn wait_for(mut self, node: impl Into<String>, mode: WaitMode) -> Self {
        self.wait_modes.insert(node.into(), mode);
        self
    }

    /// Unconditional edge `from -> to`
    pub fn edge(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.static_edges.push((from.into(), to.into()));
        self
    }

    /// Conditional edge: after `from` completes, `router` picks among `destinations`
    pub fn conditional_edge<R, I, D>(mut self, from: impl Into<String>, router: R, destinations: I) -> Self
    where
        R: Router<S> + 'static,
        I: IntoIterator<Item = D>,
        D: Into<String>,
    {
        self.conditional_edges.push((
            from.into(),
            Arc::new(router),
            destinations.into_iter().map(Into::into).collect(),
        ));
        self
    }

    /// Declare the loop counter channel (forced to the `max` policy)
    pub fn loop_counter(mut self, channel: impl Into<String>) -> Self {
        self.loop_counter = Some(channel.into());
        self
    }

    pub fn build(self) -> Result<Graph<S>, GraphError> {
        let GraphBuilder {
            name,
            mut schema,
            nodes: node_list,
            mut wait_modes,
            static_edges,
            conditional_edges,
            loop_counter,
        } = self;

        let mut nodes = HashMap::new();
        for (id, node) in node_list {
            if id == START || id == END {
                return Err(GraphError::ReservedName(id));
            }
            let wait = wait_modes.remove(&id).unwrap_or_default();
            if nodes.insert(id.clone(), GraphNode { node, wait }).is_some() {
                return Err(GraphError::DuplicateNode(id));
            }
        }

        if let Some(id) = wait_modes.into_keys().next() {
            return Err(GraphError::UnknownNode(id));
        }

        let check_source = |id: &str| {
            if id == START || nodes.contains_key(id) {
                Ok(())
            } else {
                Err(GraphError::UnknownNode(id.to_string()))
            }
        };
        let check_target = |id: &str| {
            if id == END || nodes.contains_key(id) {
                Ok(())
            } else {
                Err(GraphError::UnknownNode(id.to_string()))
            }
        };

        let mut edges: HashMap<String, Edge<S>> = HashMap::new();
        let mut predecessors: HashMap<String, Vec<String>> = HashMap::new();
        let mut edge_count = 0;

        for (from, to) in static_edges {
            check_source(&from)?;
            check_target(&to)?;
            edge_count += 1;

            if from != START && to != END {
                let preds = predecessors.entry(to.clone()).or_default();
                if !preds.contains(&from) {
                    preds.push(from.clone());
                }
            }

            match edges.entry(from.clone()).or_insert_with(|| Edge::Static(Vec::new())) {
                Edge::Static(targets) => {
                    if !targets.contains(&to) {
                        targets.push(to);
                    }
                }
                Edge::Conditional { .. } => return Err(GraphError::ConflictingEdges(from)),
            }
        }

        for (from, router, destinations) in conditional_edges {
            check_source(&from)?;
            for d in &destinations {
                check_target(d)?;
            }
            if edges.contains_key(&from) {
                return Err(GraphError::ConflictingEdges(from));
            }
            edge_count += destinations.len();
            edges.insert(
                from,
                Edge::Conditional {
                    router,
                    destinations: destinations.into_iter().collect(),
                },
            );
        }

        if !edges.contains_key(START) {
            return Err(GraphError::MissingEntry);
        }

        let mut ids: Vec<&String> = nodes.keys().collect();
        ids.sort_unstable();
        if let Some(id) = ids.into_iter().find(|id| !edges.contains_key(id.as_str())) {
            return Err(GraphError::MissingEdge(id.clone()));
        }

        if let Some(counter) = &loop_counter {
            let def = schema
                .channels
                .get_mut(counter)
                .ok_or_else(|| GraphError::UnknownLoopChannel(counter.clone()))?;
            def.reducer = MergePolicy::Max;
        }

        schema
            .channels
            .entry(FAILURES_CHANNEL.to_string())
            .or_insert_with(ChannelDef::append);

        for channel in schema.invalid_defaults() {
            log::warn!(
                "Graph '{}': default of channel '{}' does not match its type",
                name,
                channel
            );
        }

        log::info!(
            "Built graph '{}' with {} nodes and {} edges",
            name,
            nodes.len(),
            edge_count
        );

        Ok(Graph {
            name,
            schema,
            nodes,
            edges,
            predecessors,
            loop_counter,
            edge_count,
        })
    }
}
