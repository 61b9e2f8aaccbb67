//! Topological Sequencer

use petgraph::algo::kosaraju_scc;
use petgraph::graph::NodeIndex;
use petgraph::Direction;
use std::collections::{HashSet, VecDeque};
use tracing::debug;

use super::ImportGraph;
use crate::error::{CompileError, Result};
use crate::source::SourceId;

impl ImportGraph {
    /// Order units so every unit comes after everything it imports.
    ///
    /// Kahn peel over remaining import counts; ties break by discovery order.
    /// Any unit left over sits on or behind a cycle, and the whole sequence
    /// fails with [`CompileError::ImportCycle`].
    pub fn sequence(&self) -> Result<Vec<SourceId>> {
        let graph = &self.graph;
        let mut remaining: Vec<usize> = graph
            .node_indices()
            .map(|idx| graph.neighbors_directed(idx, Direction::Outgoing).count())
            .collect();

        let mut ready: VecDeque<NodeIndex> = graph.node_indices().filter(|idx| remaining[idx.index()] == 0).collect();
        let mut order = Vec::with_capacity(graph.node_count());

        while let Some(idx) = ready.pop_front() {
            order.push(idx);

            let mut importers: Vec<NodeIndex> = graph.neighbors_directed(idx, Direction::Incoming).collect();
            importers.sort();
            for importer in importers {
                remaining[importer.index()] -= 1;
                if remaining[importer.index()] == 0 {
                    ready.push_back(importer);
                }
            }
        }

        if order.len() < graph.node_count() {
            return Err(CompileError::ImportCycle {
                members: self.cycle_members(&order),
            });
        }

        let order: Vec<SourceId> = order.into_iter().map(|idx| graph[idx].clone()).collect();
        debug!(order = ?order.iter().map(|s| s.as_str()).collect::<Vec<_>>(), "Sequenced units");
        Ok(order)
    }

    /// Units of the first cycle among the nodes that could not be peeled,
    /// in discovery order
    fn cycle_members(&self, peeled: &[NodeIndex]) -> Vec<SourceId> {
        let peeled: HashSet<NodeIndex> = peeled.iter().copied().collect();

        let mut cycle = kosaraju_scc(&self.graph)
            .into_iter()
            .filter(|scc| scc.len() > 1 && scc.iter().all(|idx| !peeled.contains(idx)))
            .min_by_key(|scc| scc.iter().min().copied())
            .unwrap_or_else(|| {
                // Every leftover node is behind a cycle; fall back to all of them
                self.graph.node_indices().filter(|idx| !peeled.contains(idx)).collect()
            });

        cycle.sort();
        cycle.into_iter().map(|idx| self.graph[idx].clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph(edges: &[(&str, &str)], units: &[&str]) -> ImportGraph {
        let mut graph = ImportGraph::new();
        for unit in units {
            graph.add_unit(SourceId::new(*unit));
        }
        for (from, to) in edges {
            graph.add_import(&SourceId::new(*from), &SourceId::new(*to));
        }
        graph
    }

    fn names(order: &[SourceId]) -> Vec<&str> {
        order.iter().map(|s| s.as_str()).collect()
    }

    #[test]
    fn test_dependencies_first() {
        let g = graph(&[("Main", "Shared")], &["Main", "Shared"]);
        assert_eq!(names(&g.sequence().unwrap()), vec!["Shared", "Main"]);
    }

    #[test]
    fn test_diamond() {
        let g = graph(
            &[("A", "B"), ("A", "C"), ("B", "D"), ("C", "D")],
            &["A", "B", "C", "D"],
        );
        let order = g.sequence().unwrap();
        assert_eq!(names(&order), vec!["D", "B", "C", "A"]);
    }

    #[test]
    fn test_cycle_reports_members() {
        let g = graph(
            &[("Root", "A"), ("A", "B"), ("B", "C"), ("C", "A")],
            &["Root", "A", "B", "C"],
        );
        match g.sequence() {
            Err(CompileError::ImportCycle { members }) => {
                assert_eq!(names(&members), vec!["A", "B", "C"]);
            }
            other => panic!("Expected import cycle, got {:?}", other),
        }
    }

    #[test]
    fn test_independent_units_keep_discovery_order() {
        let g = graph(&[], &["X", "Y", "Z"]);
        assert_eq!(names(&g.sequence().unwrap()), vec!["X", "Y", "Z"]);
    }
}
