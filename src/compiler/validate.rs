//! Structural graph validation: the first pipeline stage.

use std::collections::{HashMap, HashSet};

use crate::catalog::NodeCatalog;
use crate::dsl::{GRAPH_FORMAT_VERSION, NodeGraph};

use super::types::{Diagnostic, PipelineState};

/// Push a structural finding for everything that would make later stages
/// misbehave: missing graph identity, version drift, duplicate ids, unknown
/// node types, dangling endpoints, double-driven inputs.
///
/// `valid_source_node_ids` allow-lists externally-injected source ids (e.g.
/// audio-panel bands) that are legal connection sources without being graph
/// nodes.
pub fn validate_graph(
    catalog: &NodeCatalog,
    graph: &NodeGraph,
    state: &mut PipelineState,
    valid_source_node_ids: &[String],
) {
    if graph.id.trim().is_empty() {
        state
            .errors
            .push(Diagnostic::structural("graph is missing an id"));
    }
    if graph.name.trim().is_empty() {
        state
            .errors
            .push(Diagnostic::structural("graph is missing a name"));
    }
    if graph.version != GRAPH_FORMAT_VERSION {
        state.errors.push(Diagnostic::structural(format!(
            "unsupported graph version '{}' (expected '{}')",
            graph.version, GRAPH_FORMAT_VERSION
        )));
    }

    let mut node_ids: HashSet<&str> = HashSet::new();
    for n in &graph.nodes {
        if !node_ids.insert(n.id.as_str()) {
            state.errors.push(Diagnostic::structural(format!(
                "duplicate node id '{}'",
                n.id
            )));
        }
        if !catalog.contains(&n.node_type) {
            state.errors.push(Diagnostic::structural(format!(
                "unknown node type '{}' at node '{}'",
                n.node_type, n.id
            )));
        }
    }

    let mut connection_ids: HashSet<&str> = HashSet::new();
    // target slot key -> first connection id driving it
    let mut driven_targets: HashMap<String, &str> = HashMap::new();

    for c in &graph.connections {
        if !connection_ids.insert(c.id.as_str()) {
            state.errors.push(Diagnostic::structural(format!(
                "duplicate connection id '{}'",
                c.id
            )));
        }

        match (&c.target_port, &c.target_parameter) {
            (Some(_), Some(_)) => {
                state.errors.push(Diagnostic::structural(format!(
                    "connection '{}' targets both a port and a parameter",
                    c.id
                )));
                continue;
            }
            (None, None) => {
                state.errors.push(Diagnostic::structural(format!(
                    "connection '{}' targets neither a port nor a parameter",
                    c.id
                )));
                continue;
            }
            _ => {}
        }

        let source_ok = node_ids.contains(c.source_node_id.as_str())
            || valid_source_node_ids
                .iter()
                .any(|id| id == &c.source_node_id);
        if !source_ok {
            state.errors.push(Diagnostic::structural(format!(
                "connection '{}' references non-existent source node '{}'",
                c.id, c.source_node_id
            )));
        }

        if !node_ids.contains(c.target_node_id.as_str()) {
            state.errors.push(Diagnostic::structural(format!(
                "connection '{}' references non-existent target node '{}'",
                c.id, c.target_node_id
            )));
        }

        let key = c.target_key();
        match driven_targets.get(key.as_str()) {
            Some(first) => {
                state.errors.push(Diagnostic::structural(format!(
                    "connections '{}' and '{}' both target '{}'",
                    first, c.id, key
                )));
            }
            None => {
                driven_targets.insert(key, c.id.as_str());
            }
        }
    }
}
