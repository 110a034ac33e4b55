//! Control dependence graph of one instrumented function.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::schema::{GraphDescriptor, ROOT_BLOCK};

/// A coverage goal: one basic block of one function.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Target {
    pub global_id: String,
    pub block: u64,
}

impl Target {
    pub fn new(global_id: impl Into<String>, block: u64) -> Self {
        Self {
            global_id: global_id.into(),
            block,
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.global_id, self.block)
    }
}

/// Errors raised while loading dependency graphs.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("Malformed graph: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("Failed to read graph: {0}")]
    Io(#[from] std::io::Error),
    #[error("Graph {global_id}: edge endpoint {index} out of range for {nodes} nodes")]
    EdgeOutOfRange {
        global_id: String,
        index: usize,
        nodes: usize,
    },
    #[error("Graph {0} has no root node")]
    MissingRoot(String),
    #[error("Graph {0} has more than one root node")]
    DuplicateRoot(String),
    #[error("Graph {global_id} lists block {block} twice")]
    DuplicateBlock { global_id: String, block: u64 },
    #[error("No graph for function {0}")]
    UnknownFunction(String),
}

/// Control dependence graph over the basic blocks of one function.
///
/// Shortest paths from the synthetic root are computed once at construction.
#[derive(Debug, Clone)]
pub struct Cdg {
    global_id: String,
    root: usize,
    blocks: Vec<u64>,
    index: HashMap<u64, usize>,
    children: Vec<Vec<usize>>,
    parents: Vec<Vec<usize>>,
    paths: HashMap<u64, Vec<u64>>,
    average_depth: f64,
    branches: usize,
    assertions: usize,
}

impl Cdg {
    /// Build from the serialized `{nodes, edges}` form.
    pub fn parse(
        global_id: &str,
        graph: &GraphDescriptor,
        branches: usize,
        assertions: usize,
    ) -> Result<Self, GraphError> {
        let nodes = graph.nodes.len();
        let mut index = HashMap::with_capacity(nodes);
        let mut root = None;
        for (i, &block) in graph.nodes.iter().enumerate() {
            if index.insert(block, i).is_some() {
                return Err(if block == ROOT_BLOCK {
                    GraphError::DuplicateRoot(global_id.to_string())
                } else {
                    GraphError::DuplicateBlock {
                        global_id: global_id.to_string(),
                        block,
                    }
                });
            }
            if block == ROOT_BLOCK {
                root = Some(i);
            }
        }
        let root = root.ok_or_else(|| GraphError::MissingRoot(global_id.to_string()))?;

        let mut children = vec![Vec::new(); nodes];
        let mut parents = vec![Vec::new(); nodes];
        for &(from, to, _) in &graph.edges {
            for endpoint in [from, to] {
                if endpoint >= nodes {
                    return Err(GraphError::EdgeOutOfRange {
                        global_id: global_id.to_string(),
                        index: endpoint,
                        nodes,
                    });
                }
            }
            // Self loops carry no dependency.
            if from == to {
                continue;
            }
            if !children[from].contains(&to) {
                children[from].push(to);
                parents[to].push(from);
            }
        }

        let mut cdg = Self {
            global_id: global_id.to_string(),
            root,
            blocks: graph.nodes.clone(),
            index,
            children,
            parents,
            paths: HashMap::new(),
            average_depth: 0.0,
            branches,
            assertions,
        };
        cdg.compute_paths();
        Ok(cdg)
    }

    fn compute_paths(&mut self) {
        let n = self.blocks.len();
        let mut previous: Vec<Option<usize>> = vec![None; n];
        let mut seen = vec![false; n];
        let mut queue = VecDeque::from([self.root]);
        seen[self.root] = true;
        while let Some(node) = queue.pop_front() {
            for &child in &self.children[node] {
                if !seen[child] {
                    seen[child] = true;
                    previous[child] = Some(node);
                    queue.push_back(child);
                }
            }
        }

        let mut total = 0usize;
        for node in 0..n {
            if !seen[node] {
                log::warn!(
                    "Block {} of {} is unreachable from the root and is not a target",
                    self.blocks[node],
                    self.global_id
                );
                continue;
            }
            let mut path = vec![self.blocks[node]];
            let mut current = node;
            while let Some(prev) = previous[current] {
                path.push(self.blocks[prev]);
                current = prev;
            }
            path.reverse();
            total += path.len();
            self.paths.insert(self.blocks[node], path);
        }
        self.average_depth = if n == 0 { 0.0 } else { total as f64 / n as f64 };
    }

    pub fn global_id(&self) -> &str {
        &self.global_id
    }

    pub fn branches(&self) -> usize {
        self.branches
    }

    pub fn assertions(&self) -> usize {
        self.assertions
    }

    /// Mean node count of the root paths.
    pub fn average_depth(&self) -> f64 {
        self.average_depth
    }

    fn target(&self, node: usize) -> Target {
        Target::new(self.global_id.clone(), self.blocks[node])
    }

    /// Every block reachable from the root, except the root itself.
    pub fn targets(&self) -> BTreeSet<Target> {
        (0..self.blocks.len())
            .filter(|&i| i != self.root && self.paths.contains_key(&self.blocks[i]))
            .map(|i| self.target(i))
            .collect()
    }

    /// Blocks without a control dependency.
    pub fn independent_targets(&self) -> BTreeSet<Target> {
        self.children[self.root]
            .iter()
            .map(|&i| self.target(i))
            .collect()
    }

    /// Blocks directly controlled by `block`.
    pub fn dependent_targets(&self, block: u64) -> BTreeSet<Target> {
        self.index
            .get(&block)
            .map(|&node| self.children[node].iter().map(|&i| self.target(i)).collect())
            .unwrap_or_default()
    }

    /// Blocks transitively controlled by `block`.
    pub fn all_sub_targets(&self, block: u64) -> BTreeSet<Target> {
        let mut out = BTreeSet::new();
        let Some(&start) = self.index.get(&block) else {
            return out;
        };
        let mut seen = HashSet::from([start]);
        let mut stack = vec![start];
        while let Some(node) = stack.pop() {
            for &child in &self.children[node] {
                if seen.insert(child) {
                    out.insert(self.target(child));
                    stack.push(child);
                }
            }
        }
        out
    }

    /// Controlling blocks of `block`.
    pub fn real_parents(&self, block: u64) -> Vec<u64> {
        self.index
            .get(&block)
            .map(|&node| self.parents[node].iter().map(|&p| self.blocks[p]).collect())
            .unwrap_or_default()
    }

    /// Shortest path from the root, both ends included.
    pub fn path_to(&self, block: u64) -> Option<&[u64]> {
        self.paths.get(&block).map(Vec::as_slice)
    }

    /// Edges between the deepest covered block on the root path and `block`.
    ///
    /// `None` when the block is unknown or nothing on its path is covered.
    pub fn approach_level<F>(&self, block: u64, is_covered: F) -> Option<usize>
    where
        F: Fn(u64) -> bool,
    {
        let path = self.path_to(block)?;
        path.iter()
            .rposition(|&b| is_covered(b))
            .map(|i| path.len() - i - 1)
    }
}
