//! Dependency graph for artifacts
//!
//! Builds a directed graph over an artifact collection, rejects dangling
//! references and cycles, and computes a deterministic execution order.
//! Uses petgraph for neighbourhood queries.
//!
//! Nodes are addressed by [`Artifact::key`]: workspace artifacts by
//! `kind/name`, scripts by bare name. References resolve through
//! [`ArtifactReference::target_key`], so a `DatasetReference` only ever
//! matches a dataset.
//!
//! Order convention: dependencies precede dependents.

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::{Dfs, Reversed};
use petgraph::Direction;
use std::collections::HashMap;
use thiserror::Error;

use super::artifact::Artifact;
use super::reference::ArtifactReference;

#[derive(Debug, Error, PartialEq)]
pub enum GraphError {
    #[error("Circular dependency detected at: {0}")]
    CycleDetected(String),

    #[error("Dependency {reference} of {artifact} not found")]
    UnresolvedDependency { artifact: String, reference: String },

    #[error("Duplicate artifact id: {0}")]
    DuplicateArtifact(String),
}

/// Visit state during ordering
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    InProgress,
    Done,
}

/// A validated, acyclic dependency graph over artifacts
#[derive(Debug)]
pub struct ArtifactGraph {
    /// Artifacts in insertion order
    artifacts: Vec<Artifact>,

    /// Graph key of each artifact, parallel to `artifacts`
    keys: Vec<String>,

    /// Target keys of each artifact's ordering references, in reference order
    targets: Vec<Vec<String>>,

    /// Map from key to position in `artifacts` (and node index)
    index: HashMap<String, usize>,

    /// Edges point from dependency to dependent
    graph: DiGraph<String, ()>,

    /// Positions in `artifacts`, dependencies first
    order: Vec<usize>,
}

impl ArtifactGraph {
    /// Builds the graph from artifacts whose references are already extracted
    ///
    /// Fails on duplicate keys, on non-ignored references to missing
    /// artifacts, and on cycles. Ignored references are never resolved, so
    /// they may dangle.
    pub fn build(artifacts: impl IntoIterator<Item = Artifact>) -> Result<Self, GraphError> {
        let artifacts: Vec<Artifact> = artifacts.into_iter().collect();
        let keys: Vec<String> = artifacts.iter().map(Artifact::key).collect();

        let mut index = HashMap::with_capacity(keys.len());
        for (pos, key) in keys.iter().enumerate() {
            if index.insert(key.clone(), pos).is_some() {
                return Err(GraphError::DuplicateArtifact(key.clone()));
            }
        }

        let mut targets: Vec<Vec<String>> = Vec::with_capacity(artifacts.len());
        for artifact in &artifacts {
            let mut found: Vec<String> = Vec::new();
            for key in artifact.ordering_references().map(ArtifactReference::target_key) {
                if !found.contains(&key) {
                    found.push(key);
                }
            }
            targets.push(found);
        }

        let order = resolve_order(&keys, &targets, &index)?;

        // Every target resolved during ordering
        let mut graph = DiGraph::with_capacity(keys.len(), 0);
        for key in &keys {
            graph.add_node(key.clone());
        }
        for (pos, deps) in targets.iter().enumerate() {
            for dep in deps {
                graph.add_edge(NodeIndex::new(index[dep]), NodeIndex::new(pos), ());
            }
        }

        Ok(Self {
            artifacts,
            keys,
            targets,
            index,
            graph,
            order,
        })
    }

    /// Returns artifact keys in execution order (dependencies first)
    pub fn execution_order(&self) -> Vec<String> {
        self.order.iter().map(|&pos| self.keys[pos].clone()).collect()
    }

    /// Iterates over artifacts in execution order
    pub fn ordered(&self) -> impl Iterator<Item = &Artifact> {
        self.order.iter().map(move |&pos| &self.artifacts[pos])
    }

    /// Returns an artifact by key
    pub fn get(&self, key: &str) -> Option<&Artifact> {
        self.index.get(key).map(|&pos| &self.artifacts[pos])
    }

    /// Returns the keys of every artifact with this bare name, in insertion order
    pub fn find_by_name(&self, name: &str) -> Vec<&str> {
        self.artifacts
            .iter()
            .zip(&self.keys)
            .filter(|(artifact, _)| artifact.id == name)
            .map(|(_, key)| key.as_str())
            .collect()
    }

    /// Returns the direct dependencies of an artifact, in reference order
    pub fn dependencies(&self, key: &str) -> Vec<&str> {
        match self.index.get(key) {
            Some(&pos) => self.targets[pos].iter().map(String::as_str).collect(),
            None => vec![],
        }
    }

    /// Returns the artifacts that directly depend on `key`, in insertion order
    pub fn dependents(&self, key: &str) -> Vec<&str> {
        let Some(&pos) = self.index.get(key) else {
            return vec![];
        };

        let mut nodes: Vec<NodeIndex> = self
            .graph
            .neighbors_directed(NodeIndex::new(pos), Direction::Outgoing)
            .collect();
        nodes.sort();

        nodes
            .into_iter()
            .map(|idx| self.graph[idx].as_str())
            .collect()
    }

    /// Returns every artifact `key` transitively depends on, in execution order
    pub fn upstream(&self, key: &str) -> Vec<&str> {
        let Some(&pos) = self.index.get(key) else {
            return vec![];
        };

        let reversed = Reversed(&self.graph);
        let mut reachable = vec![false; self.artifacts.len()];
        let mut dfs = Dfs::new(reversed, NodeIndex::new(pos));
        while let Some(node) = dfs.next(reversed) {
            reachable[node.index()] = true;
        }
        reachable[pos] = false;

        self.order
            .iter()
            .filter(|&&p| reachable[p])
            .map(|&p| self.keys[p].as_str())
            .collect()
    }

    /// Returns true if the graph contains the key
    pub fn contains(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    /// Returns the number of artifacts in the graph
    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    /// Returns true if the graph is empty
    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }

    /// Returns the number of ordering edges
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }
}

/// Three-colour depth-first ordering with an explicit stack
///
/// Roots are taken in insertion order and edges in reference order, so the
/// result only depends on input order.
fn resolve_order(
    keys: &[String],
    targets: &[Vec<String>],
    index: &HashMap<String, usize>,
) -> Result<Vec<usize>, GraphError> {
    let mut marks = vec![Mark::Unvisited; keys.len()];
    let mut order = Vec::with_capacity(keys.len());
    let mut stack: Vec<(usize, usize)> = Vec::new();

    for root in 0..keys.len() {
        if marks[root] == Mark::Done {
            continue;
        }

        marks[root] = Mark::InProgress;
        stack.push((root, 0));

        while let Some((node, next)) = stack.last_mut() {
            let node = *node;

            if let Some(target) = targets[node].get(*next) {
                *next += 1;

                let target = *index.get(target).ok_or_else(|| GraphError::UnresolvedDependency {
                    artifact: keys[node].clone(),
                    reference: target.clone(),
                })?;

                match marks[target] {
                    Mark::Done => {}
                    Mark::InProgress => {
                        return Err(GraphError::CycleDetected(keys[target].clone()));
                    }
                    Mark::Unvisited => {
                        marks[target] = Mark::InProgress;
                        stack.push((target, 0));
                    }
                }
            } else {
                stack.pop();
                marks[node] = Mark::Done;
                order.push(node);
            }
        }
    }

    Ok(order)
}
