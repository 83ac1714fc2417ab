// Copyright 2025 STARGA Inc.
// Licensed under the Apache License, Version 2.0 (the “License”);
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at:
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an “AS IS” BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Structural validation and topological ordering of the layer graph.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use crate::types::{GraphEdge, GraphNode, Params};

/// Structural errors. Any of these makes the whole graph unusable for the
/// later stages.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DagError {
    /// The graph has no nodes at all.
    #[error("at least one layer required")]
    Empty,
    /// Every node has an incoming edge.
    #[error("no input layer: every layer has an incoming connection")]
    NoSource,
    /// Every node has an outgoing edge.
    #[error("no output layer: every layer has an outgoing connection")]
    NoSink,
    /// Kahn's algorithm could not place these nodes.
    #[error("graph contains a cycle through: {}", .nodes.join(", "))]
    Cycle { nodes: Vec<String> },
    /// Two nodes share an id.
    #[error("duplicate layer id `{0}`")]
    DuplicateId(String),
    /// An edge names a node that does not exist.
    #[error("connection {from} -> {target} references unknown layer `{missing}`")]
    UnknownEndpoint {
        from: String,
        target: String,
        missing: String,
    },
}

/// A node in build order, with its generated variable name.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderedLayer {
    pub id: String,
    pub layer_type: String,
    pub params: Params,
    pub var_name: String,
}

/// Result of [`build_dag`]. `ordered` and `successors` are empty whenever
/// `errors` is not.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DagResult {
    pub ordered: Vec<OrderedLayer>,
    pub successors: BTreeMap<String, Vec<String>>,
    pub errors: Vec<DagError>,
}

impl DagResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn layer(&self, id: &str) -> Option<&OrderedLayer> {
        self.ordered.iter().find(|layer| layer.id == id)
    }

    /// Nodes with an edge into `id`, in topological order.
    pub fn predecessors(&self, id: &str) -> Vec<&OrderedLayer> {
        self.ordered
            .iter()
            .filter(|layer| {
                self.successors
                    .get(&layer.id)
                    .is_some_and(|succ| succ.iter().any(|s| s == id))
            })
            .collect()
    }

    /// Nodes without outgoing edges, in topological order.
    pub fn sinks(&self) -> Vec<&OrderedLayer> {
        self.ordered
            .iter()
            .filter(|layer| self.successors.get(&layer.id).map_or(true, Vec::is_empty))
            .collect()
    }

    /// True when the graph is a single chain: one start node and no node
    /// with more than one predecessor or successor.
    pub fn is_linear(&self) -> bool {
        let mut in_degree: HashMap<&str, usize> = HashMap::new();
        for succ in self.successors.values() {
            if succ.len() > 1 {
                return false;
            }
            for target in succ {
                *in_degree.entry(target.as_str()).or_default() += 1;
            }
        }
        let starts = self
            .ordered
            .iter()
            .filter(|layer| !in_degree.contains_key(layer.id.as_str()))
            .count();
        starts == 1 && in_degree.values().all(|&n| n == 1)
    }
}

/// Validate the graph and compute a deterministic build order.
///
/// Ties between ready nodes are broken by their position in `nodes`, so the
/// same input always yields the same order and variable names.
pub fn build_dag(nodes: &[GraphNode], edges: &[GraphEdge]) -> DagResult {
    if nodes.is_empty() {
        return invalid(vec![DagError::Empty]);
    }

    let mut errors = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();
    for (pos, node) in nodes.iter().enumerate() {
        if index.insert(node.id.as_str(), pos).is_some() {
            errors.push(DagError::DuplicateId(node.id.clone()));
        }
    }

    // Adjacency by node position; duplicate edges collapse.
    let mut out_edges: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];
    let mut in_degree = vec![0usize; nodes.len()];
    let mut seen = BTreeSet::new();
    for edge in edges {
        let (src, dst) = match (index.get(edge.source.as_str()), index.get(edge.target.as_str())) {
            (Some(&s), Some(&t)) => (s, t),
            (src, _) => {
                let missing = if src.is_none() { &edge.source } else { &edge.target };
                errors.push(DagError::UnknownEndpoint {
                    from: edge.source.clone(),
                    target: edge.target.clone(),
                    missing: missing.clone(),
                });
                continue;
            }
        };
        if seen.insert((src, dst)) {
            out_edges[src].push(dst);
            in_degree[dst] += 1;
        }
    }

    if in_degree.iter().all(|&d| d > 0) {
        errors.push(DagError::NoSource);
    }
    if out_edges.iter().all(|succ| !succ.is_empty()) {
        errors.push(DagError::NoSink);
    }

    let order = kahn(&out_edges, &in_degree);
    if order.len() < nodes.len() {
        let placed: BTreeSet<usize> = order.iter().copied().collect();
        let nodes_in_cycle = (0..nodes.len())
            .filter(|pos| !placed.contains(pos))
            .map(|pos| nodes[pos].id.clone())
            .collect();
        errors.push(DagError::Cycle {
            nodes: nodes_in_cycle,
        });
    }

    if !errors.is_empty() {
        log::debug!("graph rejected with {} structural error(s)", errors.len());
        return invalid(errors);
    }

    let mut names = VarNames::default();
    let ordered = order
        .iter()
        .map(|&pos| {
            let node = &nodes[pos];
            OrderedLayer {
                id: node.id.clone(),
                layer_type: node.layer_type.clone(),
                params: node.params.clone(),
                var_name: names.next(&node.layer_type),
            }
        })
        .collect::<Vec<_>>();

    let successors = nodes
        .iter()
        .enumerate()
        .map(|(pos, node)| {
            let targets = out_edges[pos].iter().map(|&t| nodes[t].id.clone()).collect();
            (node.id.clone(), targets)
        })
        .collect();

    log::debug!(
        "graph ordered: {}",
        ordered
            .iter()
            .map(|layer| layer.id.as_str())
            .collect::<Vec<_>>()
            .join(" -> ")
    );

    DagResult {
        ordered,
        successors,
        errors: Vec::new(),
    }
}

fn invalid(errors: Vec<DagError>) -> DagResult {
    DagResult {
        ordered: Vec::new(),
        successors: BTreeMap::new(),
        errors,
    }
}

/// Kahn's algorithm; the ready set is ordered by input position.
fn kahn(out_edges: &[Vec<usize>], in_degree: &[usize]) -> Vec<usize> {
    let mut remaining = in_degree.to_vec();
    let mut ready: BTreeSet<usize> = (0..remaining.len()).filter(|&p| remaining[p] == 0).collect();
    let mut order = Vec::with_capacity(remaining.len());
    while let Some(pos) = ready.pop_first() {
        order.push(pos);
        for &next in &out_edges[pos] {
            remaining[next] -= 1;
            if remaining[next] == 0 {
                ready.insert(next);
            }
        }
    }
    order
}

/// Names the generated code binds itself, plus Python keywords a layer
/// type can normalize to.
const RESERVED_NAMES: &[&str] = &[
    "model", "and", "as", "assert", "async", "await", "break", "class", "continue", "def", "del",
    "elif", "else", "except", "finally", "for", "from", "global", "if", "import", "in", "is",
    "lambda", "nonlocal", "not", "or", "pass", "raise", "return", "try", "while", "with", "yield",
];

/// Variable names handed out during one build.
#[derive(Debug, Default)]
struct VarNames {
    counters: HashMap<String, usize>,
    used: HashSet<String>,
}

impl VarNames {
    /// `dense`, `dense_1`, `dense_2`, ... per layer type, skipping names
    /// that are reserved or already taken by another type.
    fn next(&mut self, layer_type: &str) -> String {
        let mut base: String = layer_type
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
            .collect();
        if !base.starts_with(|c: char| c.is_ascii_alphabetic()) {
            base.insert_str(0, "layer_");
        }
        let count = self.counters.entry(base.clone()).or_insert(0);
        let name = loop {
            let candidate = if *count == 0 {
                base.clone()
            } else {
                format!("{base}_{count}")
            };
            *count += 1;
            if !RESERVED_NAMES.contains(&candidate.as_str()) && !self.used.contains(&candidate) {
                break candidate;
            }
        };
        self.used.insert(name.clone());
        name
    }
}
