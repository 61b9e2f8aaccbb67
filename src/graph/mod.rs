//! Import Graph
//!
//! Compilation units and their direct imports, held in a petgraph `DiGraph`.
//! Edges point from the importing unit to the imported one.
//!
//! - [`discover`] walks the transitive imports of a set of roots
//! - [`ImportGraph::sequence`] orders the units dependencies-first, or fails on a cycle
//! - [`ImportGraph::to_dot`] exports the graph for GraphViz

pub mod loader;
pub mod sequence;

pub use loader::discover;

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use std::collections::HashMap;

use crate::source::SourceId;

/// Units discovered from a root set, with their direct imports
#[derive(Debug, Clone, Default)]
pub struct ImportGraph {
    pub(crate) graph: DiGraph<SourceId, ()>,
    pub(crate) node_indices: HashMap<SourceId, NodeIndex>,
}

impl ImportGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a unit; returns the existing node if already present
    pub fn add_unit(&mut self, id: SourceId) -> NodeIndex {
        if let Some(&idx) = self.node_indices.get(&id) {
            return idx;
        }
        let idx = self.graph.add_node(id.clone());
        self.node_indices.insert(id, idx);
        idx
    }

    /// Record that `from` imports `to`. Both must already be units; repeated
    /// imports collapse to one edge.
    pub fn add_import(&mut self, from: &SourceId, to: &SourceId) {
        if let (Some(&a), Some(&b)) = (self.node_indices.get(from), self.node_indices.get(to)) {
            self.graph.update_edge(a, b, ());
        }
    }

    pub fn contains(&self, id: &SourceId) -> bool {
        self.node_indices.contains_key(id)
    }

    /// Units in discovery order
    pub fn units(&self) -> impl Iterator<Item = &SourceId> {
        self.graph.node_indices().map(move |idx| &self.graph[idx])
    }

    /// Direct imports of `id`, in discovery order
    pub fn imports_of(&self, id: &SourceId) -> Vec<&SourceId> {
        let Some(&idx) = self.node_indices.get(id) else {
            return Vec::new();
        };
        let mut targets: Vec<NodeIndex> = self.graph.neighbors_directed(idx, Direction::Outgoing).collect();
        targets.sort();
        targets.into_iter().map(|t| &self.graph[t]).collect()
    }

    pub fn unit_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn import_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Export the import graph to GraphViz DOT format
    pub fn to_dot(&self) -> String {
        let mut output = String::new();

        output.push_str("digraph ImportGraph {\n");
        output.push_str("  rankdir=LR;\n");
        output.push_str("  node [shape=box, style=\"rounded\", fontname=\"Helvetica\", fontsize=10];\n");
        output.push_str("  edge [fontname=\"Helvetica\", fontsize=8];\n");
        output.push('\n');

        for idx in self.graph.node_indices() {
            let id = &self.graph[idx];
            output.push_str(&format!("  n{} [label=\"{}\"];\n", idx.index(), escape(id.as_str())));
        }

        if self.graph.edge_count() > 0 {
            output.push('\n');
        }
        for idx in self.graph.node_indices() {
            let mut targets: Vec<NodeIndex> = self.graph.neighbors_directed(idx, Direction::Outgoing).collect();
            targets.sort();
            for target in targets {
                output.push_str(&format!("  n{} -> n{};\n", idx.index(), target.index()));
            }
        }

        output.push_str("}\n");
        output
    }
}

fn escape(label: &str) -> String {
    label.replace('\\', "\\\\").replace('"', "\\\"")
}
