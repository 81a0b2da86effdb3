//! Per-connection type compatibility and promotion rules.

use crate::catalog::NodeCatalog;
use crate::dsl::{NodeGraph, find_node};

use super::types::{Diagnostic, ParamType, PipelineState, ValueType};

/// Implicit widening allowed across a connection, in addition to exact match.
pub fn promotable(from: ValueType, to: ValueType) -> bool {
    use ValueType::*;
    matches!(
        (from, to),
        (Float, Vec2) | (Float, Vec3) | (Float, Vec4) | (Vec2, Vec3) | (Vec2, Vec4) | (Vec3, Vec4)
    )
}

pub fn connection_types_compatible(from: ValueType, to: ValueType) -> bool {
    from == to || promotable(from, to)
}

/// Validate every connection against the catalog. Connections from
/// allow-listed external sources carry no resolvable spec and are skipped.
pub fn validate_connection_types(
    catalog: &NodeCatalog,
    graph: &NodeGraph,
    state: &mut PipelineState,
) {
    for c in &graph.connections {
        let Some(source_node) = find_node(graph, &c.source_node_id) else {
            // Allow-listed external source; nothing to resolve.
            continue;
        };
        let Some(target_node) = find_node(graph, &c.target_node_id) else {
            continue;
        };
        let (Some(source_spec), Some(target_spec)) = (
            catalog.get(&source_node.node_type),
            catalog.get(&target_node.node_type),
        ) else {
            // Unknown node types were already reported structurally.
            continue;
        };

        let Some(source_ty) = source_spec.output_type_for(source_node, &c.source_port) else {
            state.errors.push(Diagnostic::type_error(format!(
                "connection '{}' uses unknown output port '{}.{}' (type {})",
                c.id, c.source_node_id, c.source_port, source_node.node_type
            )));
            continue;
        };

        if let Some(param_name) = &c.target_parameter {
            let Some(param) = target_spec.param(param_name) else {
                state.errors.push(Diagnostic::type_error(format!(
                    "connection '{}' targets unknown parameter '{}.{}' (type {})",
                    c.id, c.target_node_id, param_name, target_node.node_type
                )));
                continue;
            };
            // Only float knobs accept a drive; non-scalar sources are reduced
            // to their first component during codegen.
            if param.ty != ParamType::Float {
                state.errors.push(Diagnostic::type_error(format!(
                    "connection '{}' drives non-float parameter '{}.{}' ({:?} on {})",
                    c.id, c.target_node_id, param_name, param.ty, target_node.node_type
                )));
            }
            continue;
        }

        let Some(port_name) = &c.target_port else {
            continue;
        };
        let Some(input) = target_spec.input(port_name) else {
            state.errors.push(Diagnostic::type_error(format!(
                "connection '{}' targets unknown input port '{}.{}' (type {})",
                c.id, c.target_node_id, port_name, target_node.node_type
            )));
            continue;
        };

        if !connection_types_compatible(source_ty, input.ty) {
            state.errors.push(Diagnostic::type_error(format!(
                "connection '{}' type mismatch: '{}.{}' ({} on {}) -> '{}.{}' ({} on {})",
                c.id,
                c.source_node_id,
                c.source_port,
                source_ty.glsl(),
                source_node.node_type,
                c.target_node_id,
                port_name,
                input.ty.glsl(),
                target_node.node_type
            )));
        }
    }
}
