//! Minimal state graph over [`MessagesState`].
//!
//! Nodes are connected by plain edges; each node has exactly one successor,
//! so a run is a walk from [`START`] to [`END`]. Every node returns a partial
//! state update that is merged with [`add_messages`]. With a checkpointer
//! attached, the state is saved under the run's thread id after the input
//! is merged and after every node.
//!
//! ```text
//! START ──► agent ──► END
//! ```

mod state;

pub use state::{add_messages, MessagesState};

use crate::checkpoint::{Checkpoint, CheckpointError, CheckpointSaver};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

pub const START: &str = "__start__";
pub const END: &str = "__end__";

const DEFAULT_RECURSION_LIMIT: usize = 25;

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("`{0}` is a reserved node name")]
    ReservedName(String),

    #[error("Node `{0}` is already present")]
    DuplicateNode(String),

    #[error("Graph has no edge leaving START")]
    NoEntryPoint,

    #[error("Edge refers to unknown node `{0}`")]
    UnknownNode(String),

    #[error("Invalid edge {from} -> {to}: {reason}")]
    InvalidEdge {
        from: String,
        to: String,
        reason: &'static str,
    },

    #[error("`{node}` has {count} outgoing edges, exactly one is required")]
    OutgoingEdges { node: String, count: usize },

    #[error("Node `{0}` is unreachable from START")]
    Unreachable(String),

    #[error("A checkpointer requires a thread id in the run config")]
    MissingThreadId,

    #[error("Recursion limit of {0} steps reached without reaching END")]
    RecursionLimit(usize),

    #[error("Node `{node}` failed: {cause:#}")]
    Node { node: String, cause: anyhow::Error },

    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),
}

pub type Result<T> = std::result::Result<T, GraphError>;

/// One step of the graph.
#[async_trait]
pub trait Node: Send + Sync {
    /// Reads the current state and returns the messages to merge into it.
    async fn run(&self, state: &MessagesState) -> anyhow::Result<MessagesState>;
}

/// Per-invocation settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    pub thread_id: Option<String>,
    /// Maximum node executions in one invocation
    pub recursion_limit: usize,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            thread_id: None,
            recursion_limit: DEFAULT_RECURSION_LIMIT,
        }
    }
}

impl RunConfig {
    pub fn for_thread(thread_id: impl Into<String>) -> Self {
        Self {
            thread_id: Some(thread_id.into()),
            ..Self::default()
        }
    }

    pub fn with_recursion_limit(mut self, limit: usize) -> Self {
        self.recursion_limit = limit;
        self
    }
}

/// Graph under construction.
#[derive(Default)]
pub struct StateGraph {
    nodes: HashMap<String, Arc<dyn Node>>,
    edges: Vec<(String, String)>,
}

impl StateGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, name: impl Into<String>, node: Arc<dyn Node>) -> Result<&mut Self> {
        let name = name.into();
        if name == START || name == END {
            return Err(GraphError::ReservedName(name));
        }
        if self.nodes.contains_key(&name) {
            return Err(GraphError::DuplicateNode(name));
        }
        self.nodes.insert(name, node);
        Ok(self)
    }

    /// Adds an edge. Edges are validated by [`compile`](Self::compile).
    pub fn add_edge(&mut self, from: impl Into<String>, to: impl Into<String>) -> &mut Self {
        self.edges.push((from.into(), to.into()));
        self
    }

    /// Validates the graph and attaches an optional checkpointer.
    pub fn compile(self, checkpointer: Option<Arc<dyn CheckpointSaver>>) -> Result<CompiledGraph> {
        let mut next: HashMap<String, String> = HashMap::new();
        let mut outgoing: HashMap<&str, usize> = HashMap::new();

        for (from, to) in &self.edges {
            if from == END {
                return Err(invalid_edge(from, to, "END has no successors"));
            }
            if to == START {
                return Err(invalid_edge(from, to, "START has no predecessors"));
            }
            for endpoint in [from, to] {
                let known = endpoint == START || endpoint == END || self.nodes.contains_key(endpoint);
                if !known {
                    return Err(GraphError::UnknownNode(endpoint.clone()));
                }
            }
            *outgoing.entry(from.as_str()).or_default() += 1;
            next.insert(from.clone(), to.clone());
        }

        match outgoing.get(START).copied().unwrap_or(0) {
            0 => return Err(GraphError::NoEntryPoint),
            1 => {}
            count => return Err(GraphError::OutgoingEdges { node: START.to_string(), count }),
        }

        let mut names: Vec<&String> = self.nodes.keys().collect();
        names.sort();
        for name in &names {
            let count = outgoing.get(name.as_str()).copied().unwrap_or(0);
            if count != 1 {
                return Err(GraphError::OutgoingEdges { node: name.to_string(), count });
            }
        }

        let mut reachable = HashSet::new();
        let mut cursor = START;
        while let Some(to) = next.get(cursor) {
            if to == END || !reachable.insert(to.as_str()) {
                break;
            }
            cursor = to.as_str();
        }
        if let Some(name) = names.iter().find(|n| !reachable.contains(n.as_str())) {
            return Err(GraphError::Unreachable(name.to_string()));
        }

        Ok(CompiledGraph {
            nodes: self.nodes,
            next,
            checkpointer,
        })
    }
}

fn invalid_edge(from: &str, to: &str, reason: &'static str) -> GraphError {
    GraphError::InvalidEdge {
        from: from.to_string(),
        to: to.to_string(),
        reason,
    }
}

/// A validated graph, ready to run.
pub struct CompiledGraph {
    nodes: HashMap<String, Arc<dyn Node>>,
    next: HashMap<String, String>,
    checkpointer: Option<Arc<dyn CheckpointSaver>>,
}

impl CompiledGraph {
    pub fn checkpointer(&self) -> Option<&Arc<dyn CheckpointSaver>> {
        self.checkpointer.as_ref()
    }

    /// Runs the graph once from START to END.
    ///
    /// With a checkpointer, the thread's latest state is the starting point
    /// and `input` is merged into it.
    pub async fn invoke(&self, input: MessagesState, config: &RunConfig) -> Result<MessagesState> {
        let thread = self.thread(config)?;

        let (mut state, mut step) = match thread {
            Some((saver, thread_id)) => match saver.get(thread_id).await? {
                Some(checkpoint) => {
                    debug!(thread_id, step = checkpoint.step, messages = checkpoint.messages.len(), "Resuming thread");
                    (MessagesState::new(checkpoint.messages), checkpoint.step)
                }
                None => (MessagesState::default(), 0),
            },
            None => (MessagesState::default(), 0),
        };

        add_messages(&mut state.messages, input.messages);
        step += 1;
        save(thread, step, &state).await?;

        let mut current = self.successor(START)?;
        let mut executed = 0;

        while current != END {
            if executed >= config.recursion_limit {
                return Err(GraphError::RecursionLimit(config.recursion_limit));
            }

            let node = self
                .nodes
                .get(current)
                .ok_or_else(|| GraphError::UnknownNode(current.to_string()))?;

            info!(node = current, step, "Running node");
            let update = node.run(&state).await.map_err(|cause| GraphError::Node {
                node: current.to_string(),
                cause,
            })?;

            add_messages(&mut state.messages, update.messages);
            executed += 1;
            step += 1;
            save(thread, step, &state).await?;

            current = self.successor(current)?;
        }

        Ok(state)
    }

    /// Latest saved state of the run's thread, if any.
    pub async fn get_state(&self, config: &RunConfig) -> Result<Option<MessagesState>> {
        match self.thread(config)? {
            Some((saver, thread_id)) => Ok(saver
                .get(thread_id)
                .await?
                .map(|checkpoint| MessagesState::new(checkpoint.messages))),
            None => Ok(None),
        }
    }

    /// Deletes the run's thread from the checkpointer.
    pub async fn delete_thread(&self, config: &RunConfig) -> Result<()> {
        if let Some((saver, thread_id)) = self.thread(config)? {
            saver.delete_thread(thread_id).await?;
        }
        Ok(())
    }

    fn thread<'a>(&'a self, config: &'a RunConfig) -> Result<Option<(&'a dyn CheckpointSaver, &'a str)>> {
        match (&self.checkpointer, &config.thread_id) {
            (Some(saver), Some(thread_id)) => Ok(Some((&**saver, thread_id.as_str()))),
            (Some(_), None) => Err(GraphError::MissingThreadId),
            (None, _) => Ok(None),
        }
    }

    fn successor(&self, node: &str) -> Result<&str> {
        self.next
            .get(node)
            .map(String::as_str)
            .ok_or_else(|| GraphError::UnknownNode(node.to_string()))
    }
}

async fn save(thread: Option<(&dyn CheckpointSaver, &str)>, step: u64, state: &MessagesState) -> Result<()> {
    if let Some((saver, thread_id)) = thread {
        saver
            .put(Checkpoint::new(thread_id, step, state.messages.clone()))
            .await?;
    }
    Ok(())
}
