//! Source Loader
//!
//! Discovers the transitive import closure of a root set. Each unit is asked
//! for its imports exactly once; no type declarations are read.

use std::collections::VecDeque;
use tracing::debug;

use super::ImportGraph;
use crate::error::Result;
use crate::source::{SourceId, SourceReader};

/// Build the import graph reachable from `roots`.
///
/// Units are visited breadth-first in root order, so node order is
/// deterministic. Self-imports are dropped; diamonds collapse to one unit.
pub fn discover<R: SourceReader + ?Sized>(reader: &R, roots: &[SourceId]) -> Result<ImportGraph> {
    let mut graph = ImportGraph::new();
    let mut pending: VecDeque<SourceId> = VecDeque::new();

    for root in roots {
        if !graph.contains(root) {
            graph.add_unit(root.clone());
            pending.push_back(root.clone());
        }
    }

    while let Some(unit) = pending.pop_front() {
        let imports = reader.imports(&unit)?;
        debug!(unit = %unit, imports = imports.len(), "Discovered unit");

        for import in imports {
            if import == unit {
                debug!(unit = %unit, "Skipping self-import");
                continue;
            }
            if !graph.contains(&import) {
                graph.add_unit(import.clone());
                pending.push_back(import.clone());
            }
            graph.add_import(&unit, &import);
        }
    }

    Ok(graph)
}
