//! Topological order and cycle detection over the artifact graph
//!
//! | Query | Meaning |
//! |-------|---------|
//! | [`SortedArtifacts::sorted_names`] | Every embedder before what it embeds |
//! | [`SortedArtifacts::build_order`] | Reverse: embedded artifacts first |
//! | [`SortedArtifacts::self_including`] | Artifacts that transitively package themselves |
//!
//! Cycles are found with Tarjan's algorithm. The condensed graph is then
//! ordered with Kahn's algorithm, picking the ready component whose first node
//! comes earliest in node order, so ties fall back to case-insensitive name
//! order. Members of one cycle are placed contiguously, in node order.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;
use petgraph::algo::tarjan_scc;
use petgraph::graph::NodeIndex;
use petgraph::visit::EdgeRef;
use tracing::{debug, trace};

use super::graph::ArtifactGraph;

/// Ordering data derived from one graph snapshot
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SortedArtifacts {
    sorted: Vec<String>,
    self_including: HashMap<String, String>,
    cycles: Vec<Vec<String>>,
}

impl SortedArtifacts {
    /// Computes order and cycle data for `graph`
    pub fn compute(graph: &ArtifactGraph) -> Self {
        let inner = graph.inner();
        let name = |idx: NodeIndex| inner[idx].clone();

        let mut components: Vec<Vec<NodeIndex>> = tarjan_scc(inner);
        for component in &mut components {
            component.sort();
        }

        let mut component_of = vec![0usize; inner.node_count()];
        for (c, component) in components.iter().enumerate() {
            for idx in component {
                component_of[idx.index()] = c;
            }
        }

        // Condensed edges and in-degrees between components
        let mut successors: Vec<HashSet<usize>> = vec![HashSet::new(); components.len()];
        let mut in_degree = vec![0usize; components.len()];
        for edge in inner.edge_references() {
            let from = component_of[edge.source().index()];
            let to = component_of[edge.target().index()];
            if from != to && successors[from].insert(to) {
                in_degree[to] += 1;
            }
        }

        let mut ready: BinaryHeap<Reverse<(NodeIndex, usize)>> = components
            .iter()
            .enumerate()
            .filter(|(c, _)| in_degree[*c] == 0)
            .map(|(c, component)| Reverse((component[0], c)))
            .collect();

        let mut sorted = Vec::with_capacity(inner.node_count());
        let mut component_order = Vec::with_capacity(components.len());
        while let Some(Reverse((_, c))) = ready.pop() {
            component_order.push(c);
            sorted.extend(components[c].iter().map(|idx| name(*idx)));
            for next in &successors[c] {
                in_degree[*next] -= 1;
                if in_degree[*next] == 0 {
                    ready.push(Reverse((components[*next][0], *next)));
                }
            }
        }

        let cycles: Vec<Vec<String>> = component_order
            .iter()
            .map(|c| &components[*c])
            .filter(|component| component.len() > 1)
            .map(|component| component.iter().map(|idx| name(*idx)).collect())
            .collect();

        let self_loops: Vec<NodeIndex> = inner
            .node_indices()
            .filter(|idx| inner.find_edge(*idx, *idx).is_some())
            .collect();

        let mut self_including = HashMap::new();
        if !cycles.is_empty() || !self_loops.is_empty() {
            for idx in &self_loops {
                self_including.insert(name(*idx), name(*idx));
            }
            for cycle in &cycles {
                for member in cycle {
                    self_including.insert(member.clone(), cycle[0].clone());
                }
            }

            // Embedders of a flagged artifact inherit the flag. Walking the
            // build order visits embedded artifacts before their embedders.
            for c in component_order.iter().rev() {
                for idx in &components[*c] {
                    let node = name(*idx);
                    if self_including.contains_key(&node) {
                        continue;
                    }
                    let inherited = graph
                        .included(&node)
                        .iter()
                        .find_map(|target| self_including.get(target).cloned());
                    if let Some(representative) = inherited {
                        self_including.insert(node, representative);
                    }
                }
            }
            debug!(
                cycles = cycles.len(),
                self_loops = self_loops.len(),
                flagged = self_including.len(),
                "self-including artifacts detected"
            );
        }

        Self {
            sorted,
            self_including,
            cycles,
        }
    }

    /// All artifact names; an embedder always precedes what it embeds
    /// unless both are in the same cycle
    pub fn sorted_names(&self) -> &[String] {
        &self.sorted
    }

    /// Names in the order artifacts can be built: embedded ones first
    pub fn build_order(&self) -> Vec<String> {
        self.sorted.iter().rev().cloned().collect()
    }

    /// Map from self-including artifact to a representative cycle member
    pub fn self_including(&self) -> &HashMap<String, String> {
        &self.self_including
    }

    pub fn is_self_including(&self, name: &str) -> bool {
        self.self_including.contains_key(name)
    }

    /// Cycles of two or more artifacts, members in node order
    pub fn cycles(&self) -> &[Vec<String>] {
        &self.cycles
    }
}

/// Sorting data cached against a modification stamp
#[derive(Debug, Default)]
pub struct SortingCache {
    cached: Mutex<Option<(u64, Arc<SortedArtifacts>)>>,
}

impl SortingCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached data if it was computed for `stamp`, otherwise
    /// recomputes and caches it
    pub fn get_or_compute(
        &self,
        stamp: u64,
        compute: impl FnOnce() -> SortedArtifacts,
    ) -> Arc<SortedArtifacts> {
        let mut cached = self.cached.lock();
        if let Some((cached_stamp, data)) = cached.as_ref() {
            if *cached_stamp == stamp {
                return Arc::clone(data);
            }
        }
        trace!(stamp, "recomputing artifact sorting data");
        let data = Arc::new(compute());
        *cached = Some((stamp, Arc::clone(&data)));
        data
    }

    /// Stamp of the cached data, if any
    pub fn stamp(&self) -> Option<u64> {
        self.cached.lock().as_ref().map(|(stamp, _)| *stamp)
    }
}
