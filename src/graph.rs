use std::collections::{HashMap, VecDeque};

use anyhow::{Result, bail};

use crate::catalog::is_virtual_source_type;
use crate::dsl::NodeGraph;

/// For each node, the distinct source-node ids feeding any of its ports or
/// parameters, in first-wire order.
pub fn build_dependency_graph(graph: &NodeGraph) -> HashMap<String, Vec<String>> {
    let mut deps: HashMap<String, Vec<String>> = graph
        .nodes
        .iter()
        .map(|n| (n.id.clone(), Vec::new()))
        .collect();

    for c in &graph.connections {
        if let Some(sources) = deps.get_mut(&c.target_node_id) {
            if !sources.iter().any(|s| s == &c.source_node_id) {
                sources.push(c.source_node_id.clone());
            }
        }
    }
    deps
}

/// Kahn's algorithm over the connection graph. Connections whose source is
/// not a graph node (allow-listed external sources) impose no ordering and
/// are skipped. Queue seeding and successor scans follow graph declaration
/// order, so the result is deterministic.
pub fn topo_sort(graph: &NodeGraph) -> Result<Vec<String>> {
    let mut indeg: HashMap<&str, usize> = graph
        .nodes
        .iter()
        .map(|n| (n.id.as_str(), 0usize))
        .collect();

    for c in &graph.connections {
        if !indeg.contains_key(c.source_node_id.as_str()) {
            continue;
        }
        if let Some(d) = indeg.get_mut(c.target_node_id.as_str()) {
            *d += 1;
        }
    }

    let mut q: VecDeque<&str> = graph
        .nodes
        .iter()
        .filter(|n| indeg.get(n.id.as_str()) == Some(&0))
        .map(|n| n.id.as_str())
        .collect();
    let mut order: Vec<String> = Vec::with_capacity(graph.nodes.len());

    while let Some(n) = q.pop_front() {
        order.push(n.to_string());
        for c in &graph.connections {
            if c.source_node_id != n {
                continue;
            }
            let Some(entry) = indeg.get_mut(c.target_node_id.as_str()) else {
                continue;
            };
            *entry -= 1;
            if *entry == 0 {
                q.push_back(c.target_node_id.as_str());
            }
        }
    }

    if order.len() != graph.nodes.len() {
        bail!("cycle detected in graph (cannot topologically sort)");
    }
    Ok(order)
}

/// Stable post-pass: virtual-source nodes are scheduled strictly before all
/// other nodes, preserving relative order within each partition. Their output
/// variables are assigned from live external uniforms, and every downstream
/// reader must execute after that assignment even when the connection graph
/// alone does not force it.
pub fn virtual_sources_first(graph: &NodeGraph, order: Vec<String>) -> Vec<String> {
    let type_by_id: HashMap<&str, &str> = graph
        .nodes
        .iter()
        .map(|n| (n.id.as_str(), n.node_type.as_str()))
        .collect();

    let (sources, rest): (Vec<String>, Vec<String>) = order.into_iter().partition(|id| {
        type_by_id
            .get(id.as_str())
            .is_some_and(|ty| is_virtual_source_type(ty))
    });

    let mut out = sources;
    out.extend(rest);
    out
}
