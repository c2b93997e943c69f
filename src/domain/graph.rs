//! Artifact inclusion graph
//!
//! Nodes are the names of valid artifacts, ordered case-insensitively. An
//! edge `A -> B` means artifact A embeds artifact B directly: B is referenced
//! by an artifact element somewhere in A's own tree, without looking into
//! substitutions. Uses petgraph for storage and graph algorithms.

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use std::collections::{HashMap, HashSet};
use thiserror::Error;

use super::context::{compare_names, ResolvingContext};
use super::element::{ElementRef, ElementType};
use super::path::ElementPath;
use super::processor::{from_fn, process_artifact_elements};

#[derive(Debug, Error, PartialEq)]
pub enum GraphError {
    #[error("Artifact not found in graph: {0}")]
    ArtifactNotFound(String),
}

/// Directed "embeds" graph over artifact names
#[derive(Debug, Default, Clone)]
pub struct ArtifactGraph {
    /// The underlying directed graph
    graph: DiGraph<String, ()>,

    /// Map from artifact name to node index
    node_map: HashMap<String, NodeIndex>,
}

impl ArtifactGraph {
    /// Creates an empty graph
    pub fn new() -> Self {
        Self {
            graph: DiGraph::new(),
            node_map: HashMap::new(),
        }
    }

    /// Builds the graph for the valid artifacts visible through `ctx`
    pub fn build(ctx: &dyn ResolvingContext) -> Self {
        let artifacts = ctx.artifact_model().sorted_artifacts();
        let mut graph = Self::new();

        // First pass: add all nodes, in name order
        for artifact in &artifacts {
            graph.add_artifact(artifact.name());
        }

        // Second pass: direct embeddings, skipping dangling names
        for artifact in &artifacts {
            let mut included: Vec<String> = Vec::new();
            let mut seen = HashSet::new();
            process_artifact_elements(
                artifact,
                Some(ElementType::Artifact),
                &mut from_fn(|element: &ElementRef, _: &ElementPath| {
                    if let Some(name) = element.element().artifact_name() {
                        if graph.contains(name) && seen.insert(name.to_string()) {
                            included.push(name.to_string());
                        }
                    }
                    true
                }),
                ctx,
                false,
            );
            for name in included {
                // Both ends were checked above.
                let _ = graph.add_edge(artifact.name(), &name);
            }
        }

        graph
    }

    /// Builds a graph from explicit names and edges
    pub fn from_edges<'a>(
        names: impl IntoIterator<Item = &'a str>,
        edges: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Result<Self, GraphError> {
        let mut names: Vec<&str> = names.into_iter().collect();
        names.sort_by(|a, b| compare_names(a, b));

        let mut graph = Self::new();
        for name in names {
            graph.add_artifact(name);
        }
        for (from, to) in edges {
            graph.add_edge(from, to)?;
        }
        Ok(graph)
    }

    /// Adds an artifact node
    pub fn add_artifact(&mut self, name: &str) {
        if !self.node_map.contains_key(name) {
            let idx = self.graph.add_node(name.to_string());
            self.node_map.insert(name.to_string(), idx);
        }
    }

    /// Adds an edge: `from` embeds `to`
    pub fn add_edge(&mut self, from: &str, to: &str) -> Result<(), GraphError> {
        let from_idx = self.index_of(from)?;
        let to_idx = self.index_of(to)?;
        if self.graph.find_edge(from_idx, to_idx).is_none() {
            self.graph.add_edge(from_idx, to_idx, ());
        }
        Ok(())
    }

    fn index_of(&self, name: &str) -> Result<NodeIndex, GraphError> {
        self.node_map
            .get(name)
            .copied()
            .ok_or_else(|| GraphError::ArtifactNotFound(name.to_string()))
    }

    fn neighbors(&self, name: &str, direction: Direction) -> Vec<String> {
        let idx = match self.node_map.get(name) {
            Some(idx) => *idx,
            None => return vec![],
        };

        let mut neighbors: Vec<NodeIndex> = self.graph.neighbors_directed(idx, direction).collect();
        neighbors.sort();
        neighbors.dedup();
        neighbors
            .into_iter()
            .filter_map(|idx| self.graph.node_weight(idx).cloned())
            .collect()
    }

    /// Artifacts embedded directly by `name`, in node order
    pub fn included(&self, name: &str) -> Vec<String> {
        self.neighbors(name, Direction::Outgoing)
    }

    /// Artifacts that embed `name` directly, in node order
    pub fn including(&self, name: &str) -> Vec<String> {
        self.neighbors(name, Direction::Incoming)
    }

    /// Returns true if the artifact embeds itself directly
    pub fn has_self_loop(&self, name: &str) -> bool {
        self.node_map
            .get(name)
            .is_some_and(|idx| self.graph.find_edge(*idx, *idx).is_some())
    }

    /// Returns true if the graph contains the artifact
    pub fn contains(&self, name: &str) -> bool {
        self.node_map.contains_key(name)
    }

    /// Returns the number of artifacts in the graph
    pub fn len(&self) -> usize {
        self.node_map.len()
    }

    /// Returns true if the graph is empty
    pub fn is_empty(&self) -> bool {
        self.node_map.is_empty()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Artifact names in node order
    pub fn names(&self) -> impl Iterator<Item = &String> {
        self.graph.node_indices().filter_map(|idx| self.graph.node_weight(idx))
    }

    pub(crate) fn inner(&self) -> &DiGraph<String, ()> {
        &self.graph
    }
}
