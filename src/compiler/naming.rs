//! Deterministic name allocation for node outputs and inline constants.
//!
//! Names are derived purely from `(nodeId, portOrParamName)`. Sanitization can
//! fold distinct ids onto the same text (`a.b` vs `a_b`), so every handed-out
//! identifier goes through a used-set with numeric suffixing; two distinct
//! keys never collide.

use std::collections::HashSet;

use crate::catalog::NodeCatalog;
use crate::dsl::{NodeGraph, find_node};

use super::types::{ParamType, PipelineState, ValueType};

/// Replace every non-alphanumeric character with `_`.
pub fn sanitize_ident(value: &str) -> String {
    value
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

pub fn variable_base_name(node_id: &str, port: &str) -> String {
    format!("node_{}_{}", sanitize_ident(node_id), sanitize_ident(port))
}

/// Array-typed parameters get a parallel, separately-namespaced constant name.
pub fn array_base_name(node_id: &str, param: &str) -> String {
    format!("array_{}_{}", sanitize_ident(node_id), sanitize_ident(param))
}

pub(crate) fn unique_identifier(used: &mut HashSet<String>, base: String) -> String {
    if used.insert(base.clone()) {
        return base;
    }
    let mut suffix: u32 = 2;
    loop {
        let candidate = format!("{base}_{suffix}");
        if used.insert(candidate.clone()) {
            return candidate;
        }
        suffix += 1;
    }
}

/// Allocate a variable name for every node output in execution order,
/// expanding dynamic-arity output sets from the instance's own parameters,
/// plus constant-array names for array-typed parameters.
///
/// Connection sources that are not graph nodes (allow-listed external ids)
/// get a zero-initialized placeholder variable typed after their first
/// connection target, so downstream expression sites always resolve.
pub fn generate_variable_names(catalog: &NodeCatalog, graph: &NodeGraph, state: &mut PipelineState) {
    let order = state.execution_order.clone();
    for node_id in &order {
        let Some(node) = find_node(graph, node_id) else {
            continue;
        };
        let Some(spec) = catalog.get(&node.node_type) else {
            continue;
        };

        for port in spec.instance_outputs(node) {
            let name = unique_identifier(
                &mut state.used_identifiers,
                variable_base_name(node_id, &port.name),
            );
            state
                .variable_names
                .insert((node_id.clone(), port.name.clone()), name.clone());
            state.variable_types.insert(name.clone(), port.ty);
            state.variable_decl_order.push(name);
        }

        for param in &spec.parameters {
            if param.ty != ParamType::FloatArray {
                continue;
            }
            let name = unique_identifier(
                &mut state.used_identifiers,
                array_base_name(node_id, &param.name),
            );
            state
                .array_names
                .insert((node_id.clone(), param.name.clone()), name);
        }
    }

    for c in &graph.connections {
        if find_node(graph, &c.source_node_id).is_some() {
            continue;
        }
        let key = (c.source_node_id.clone(), c.source_port.clone());
        if state.variable_names.contains_key(&key) {
            continue;
        }
        let ty = external_source_type(catalog, graph, c);
        let name = unique_identifier(
            &mut state.used_identifiers,
            variable_base_name(&c.source_node_id, &c.source_port),
        );
        state.variable_names.insert(key, name.clone());
        state.variable_types.insert(name.clone(), ty);
        state.variable_decl_order.push(name);
    }
}

/// Best-guess type for an externally-injected source: the type of the input
/// port it feeds, or float for parameter drives.
fn external_source_type(
    catalog: &NodeCatalog,
    graph: &NodeGraph,
    c: &crate::dsl::Connection,
) -> ValueType {
    let Some(target) = find_node(graph, &c.target_node_id) else {
        return ValueType::Float;
    };
    let Some(spec) = catalog.get(&target.node_type) else {
        return ValueType::Float;
    };
    match &c.target_port {
        Some(port) => spec.input(port).map(|p| p.ty).unwrap_or(ValueType::Float),
        None => ValueType::Float,
    }
}
