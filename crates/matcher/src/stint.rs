//! Renewal graph and stint extraction.
//!
//! Accepted renewal matches become directed edges `policy -> successor`.
//! Every node with no incoming edge is a root, and a stint is a root plus
//! everything reachable from it.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::config::IsolatedPolicy;
use crate::model::{RenewalMatch, Stint};

/// Adjacency-list digraph over string node ids.
#[derive(Debug, Default)]
pub struct RenewalGraph {
    ids: Vec<String>,
    index: HashMap<String, usize>,
    out_edges: Vec<Vec<usize>>,
    in_degree: Vec<usize>,
}

impl RenewalGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the node index; adding an existing id is a no-op.
    pub fn add_node(&mut self, id: &str) -> usize {
        if let Some(&i) = self.index.get(id) {
            return i;
        }
        let i = self.ids.len();
        self.ids.push(id.to_string());
        self.index.insert(id.to_string(), i);
        self.out_edges.push(Vec::new());
        self.in_degree.push(0);
        i
    }

    pub fn add_edge(&mut self, from: &str, to: &str) {
        let f = self.add_node(from);
        let t = self.add_node(to);
        self.out_edges[f].push(t);
        self.in_degree[t] += 1;
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn id(&self, node: usize) -> &str {
        &self.ids[node]
    }

    pub fn node(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub fn in_degree(&self, node: usize) -> usize {
        self.in_degree[node]
    }

    pub fn out_degree(&self, node: usize) -> usize {
        self.out_edges[node].len()
    }

    /// Nodes with in-degree zero, in insertion order.
    pub fn roots(&self) -> Vec<usize> {
        (0..self.len()).filter(|&n| self.in_degree[n] == 0).collect()
    }

    /// Breadth-first descendants of `root`, excluding `root` itself.
    pub fn descendants(&self, root: usize) -> Vec<usize> {
        let mut visited = vec![false; self.len()];
        visited[root] = true;
        let mut queue = VecDeque::from([root]);
        let mut found = Vec::new();
        while let Some(n) = queue.pop_front() {
            for &next in &self.out_edges[n] {
                if !visited[next] {
                    visited[next] = true;
                    found.push(next);
                    queue.push_back(next);
                }
            }
        }
        found
    }
}

#[derive(Debug, Default)]
pub struct StintAssignment {
    pub stints: Vec<Stint>,
    /// Accepted edges discarded because their successor had several predecessors.
    pub dropped_converging: usize,
    /// Graph nodes reachable from no root (cyclic chains).
    pub unreachable: Vec<String>,
}

/// Build stints from renewal matches.
///
/// `matches` must be ordered by (effective date, policy id); node order, root
/// order, stint numbering and member order all follow it.
pub fn build_stints(
    matches: &[RenewalMatch],
    jurisdiction: &str,
    isolated: IsolatedPolicy,
) -> StintAssignment {
    let order: HashMap<&str, usize> = matches
        .iter()
        .enumerate()
        .map(|(i, m)| (m.policy_id.as_str(), i))
        .collect();

    let mut proposed_in: HashMap<&str, usize> = HashMap::new();
    for (_, target) in matches.iter().filter_map(RenewalMatch::accepted_edge) {
        *proposed_in.entry(target).or_insert(0) += 1;
    }

    let mut edges: Vec<(&str, &str)> = Vec::new();
    let mut dropped_converging = 0usize;
    for (source, target) in matches.iter().filter_map(RenewalMatch::accepted_edge) {
        if proposed_in.get(target).copied().unwrap_or(0) > 1 {
            dropped_converging += 1;
        } else {
            edges.push((source, target));
        }
    }

    let touched: HashSet<&str> = edges.iter().flat_map(|&(s, t)| [s, t]).collect();

    // Insert nodes in universe order so indices sort like (effective, id).
    let mut nodes: Vec<&str> = matches
        .iter()
        .filter(|m| {
            let linked = touched.contains(m.policy_id.as_str());
            linked || (m.survives() && isolated == IsolatedPolicy::Stint)
        })
        .map(|m| m.policy_id.as_str())
        .collect();
    for &(_, t) in &edges {
        if !order.contains_key(t) {
            nodes.push(t);
        }
    }

    let mut graph = RenewalGraph::new();
    for id in &nodes {
        graph.add_node(id);
    }
    for &(s, t) in &edges {
        graph.add_edge(s, t);
    }

    let mut reached = vec![false; graph.len()];
    let mut stints = Vec::new();
    for (i, root) in graph.roots().into_iter().enumerate() {
        let mut members = vec![root];
        members.extend(graph.descendants(root));
        members.sort_unstable();
        for &m in &members {
            reached[m] = true;
        }
        stints.push(Stint {
            stint_id: format!("{jurisdiction}_{i}"),
            members: members.iter().map(|&m| graph.id(m).to_string()).collect(),
        });
    }

    let unreachable: Vec<String> = (0..graph.len())
        .filter(|&n| !reached[n])
        .map(|n| graph.id(n).to_string())
        .collect();

    if dropped_converging > 0 {
        tracing::warn!(dropped_converging, "renewal edges into a shared successor dropped");
    }
    if !unreachable.is_empty() {
        tracing::warn!(count = unreachable.len(), "cyclic renewal chains left without a root");
    }
    tracing::debug!(
        nodes = graph.len(),
        edges = edges.len(),
        stints = stints.len(),
        "renewal graph built"
    );

    StintAssignment {
        stints,
        dropped_converging,
        unreachable,
    }
}
