//! Strongly-connected-component detection over a compact digraph.
//!
//! Kosaraju's algorithm with iterative DFS passes. Components are emitted
//! in topological order of the condensation; nodes within a component
//! appear in the discovery order of the reversed-graph pass. Deadlock
//! diagnosis relies on this ordering convention, so it is pinned by tests.

/// A directed graph over nodes `0..n` with duplicate-free edge insertion.
#[derive(Debug, Clone)]
pub struct DiGraph {
    adjacency: Vec<Vec<usize>>,
}

impl DiGraph {
    pub fn new(nodes: usize) -> Self {
        Self {
            adjacency: vec![Vec::new(); nodes],
        }
    }

    pub fn node_count(&self) -> usize {
        self.adjacency.len()
    }

    /// Add `from -> to`, ignoring duplicates and self-loops are kept:
    /// a self-loop makes a single node a non-trivial component.
    pub fn add_edge(&mut self, from: usize, to: usize) {
        if !self.adjacency[from].contains(&to) {
            self.adjacency[from].push(to);
        }
    }

    pub fn successors(&self, node: usize) -> &[usize] {
        &self.adjacency[node]
    }

    /// Whether `from -> to` exists.
    pub fn has_edge(&self, from: usize, to: usize) -> bool {
        self.adjacency[from].contains(&to)
    }

    /// Kosaraju SCC. See module docs for the ordering convention.
    pub fn strongly_connected_components(&self) -> Vec<Vec<usize>> {
        let n = self.adjacency.len();

        // Pass 1: forward DFS, record finish order.
        let mut finished: Vec<usize> = Vec::with_capacity(n);
        let mut visited = vec![false; n];
        for start in 0..n {
            if visited[start] {
                continue;
            }
            // Iterative DFS with an explicit (node, next-child) stack.
            let mut stack: Vec<(usize, usize)> = vec![(start, 0)];
            visited[start] = true;
            while let Some((node, next)) = stack.pop() {
                if next < self.adjacency[node].len() {
                    stack.push((node, next + 1));
                    let child = self.adjacency[node][next];
                    if !visited[child] {
                        visited[child] = true;
                        stack.push((child, 0));
                    }
                } else {
                    finished.push(node);
                }
            }
        }

        // Reverse graph.
        let mut reversed = vec![Vec::new(); n];
        for (from, outs) in self.adjacency.iter().enumerate() {
            for &to in outs {
                reversed[to].push(from);
            }
        }

        // Pass 2: DFS over the reversed graph in reverse finish order.
        let mut component = vec![usize::MAX; n];
        let mut components: Vec<Vec<usize>> = Vec::new();
        for &start in finished.iter().rev() {
            if component[start] != usize::MAX {
                continue;
            }
            let idx = components.len();
            let mut members = Vec::new();
            let mut stack = vec![start];
            component[start] = idx;
            while let Some(node) = stack.pop() {
                members.push(node);
                for &prev in &reversed[node] {
                    if component[prev] == usize::MAX {
                        component[prev] = idx;
                        stack.push(prev);
                    }
                }
            }
            components.push(members);
        }
        components
    }
}

/// Candidate nodes for breaking a cyclic component: the last node of the
/// component path plus every node with a chord (an edge skipping past its
/// immediate successor within the component).
pub fn cycle_break_candidates(graph: &DiGraph, component: &[usize]) -> Vec<usize> {
    let nontrivial = component.len() > 1
        || (component.len() == 1 && graph.has_edge(component[0], component[0]));
    if !nontrivial {
        return Vec::new();
    }
    let mut candidates = Vec::new();
    if let Some(&last) = component.last() {
        candidates.push(last);
    }
    for (i, &node) in component.iter().enumerate() {
        for (j, &other) in component.iter().enumerate() {
            if j > i + 1 && graph.has_edge(node, other) && !candidates.contains(&node) {
                candidates.push(node);
            }
        }
    }
    candidates
}

// ===========================================================================
// Tests
// ===========================================================================
