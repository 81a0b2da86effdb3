//! Per-node body generation: promotion wrapping, inline constant arrays, the
//! swizzle compiler, block scoping, and final-color resolution.

use crate::catalog::{
    NodeCatalog, NodeSpec, PortSpec, SWIZZLE_NODE_TYPE, TERMINAL_NODE_TYPE, is_virtual_source_type,
};
use crate::dsl::{
    Connection, NodeGraph, NodeInstance, find_node, incoming_port_connection, parse_f64_array,
    parse_str,
};

use super::functions::{NodeIo, fmt_float, scrub_unresolved_params, substitute_placeholders};
use super::naming::variable_base_name;
use super::types::{ParamType, PipelineState, ValueType};

pub struct GeneratedMain {
    pub declarations: String,
    pub body: String,
    pub final_color: String,
    pub final_output_node_id: Option<String>,
}

/// Emit the per-frame program body.
///
/// Every node's output variables are declared once at the outer scope with a
/// zero initializer before any per-node block runs: later nodes consume
/// earlier outputs across block boundaries, and virtual-source nodes assign
/// into their outputs from uniforms. Each node's own code is wrapped in its
/// own lexical block so local helper variables never collide between nodes.
pub fn generate_main_code(
    catalog: &NodeCatalog,
    graph: &NodeGraph,
    state: &mut PipelineState,
) -> GeneratedMain {
    let mut body = String::new();
    let order = state.execution_order.clone();

    for node_id in &order {
        let Some(node) = find_node(graph, node_id) else {
            continue;
        };
        let Some(spec) = catalog.get(&node.node_type) else {
            continue;
        };

        let lines = if is_virtual_source_type(&node.node_type) {
            virtual_source_lines(spec, node, state)
        } else if node.node_type == SWIZZLE_NODE_TYPE {
            swizzle_lines(graph, spec, node, state)
        } else {
            template_lines(graph, spec, node, state)
        };
        if lines.is_empty() {
            continue;
        }

        body.push_str(&format!("    // {} ({})\n    {{\n", node.id, node.node_type));
        for line in &lines {
            if line.trim().is_empty() {
                body.push('\n');
            } else {
                body.push_str(&format!("        {line}\n"));
            }
        }
        body.push_str("    }\n");
    }

    let mut declarations = String::new();
    for var in &state.variable_decl_order {
        let ty = state.variable_types[var];
        declarations.push_str(&format!("    {} {} = {};\n", ty.glsl(), var, ty.zero_literal()));
    }
    ensure_connection_sources_declared(catalog, graph, state, &mut declarations);

    let (final_output_node_id, final_color) = resolve_final_color(catalog, graph, state);

    GeneratedMain {
        declarations,
        body,
        final_color,
        final_output_node_id,
    }
}

/// Virtual-source outputs are not computed: they copy from the externally
/// written mirror uniforms.
fn virtual_source_lines(
    spec: &NodeSpec,
    node: &NodeInstance,
    state: &PipelineState,
) -> Vec<String> {
    let mut lines = Vec::new();
    for port in spec.instance_outputs(node) {
        let (Some(var), Some(uniform)) = (
            state.variable_for(&node.id, &port.name),
            state
                .uniform_names
                .get(&(node.id.clone(), port.name.clone())),
        ) else {
            continue;
        };
        lines.push(format!("{var} = {uniform};"));
    }
    lines
}

fn swizzle_lines(
    graph: &NodeGraph,
    spec: &NodeSpec,
    node: &NodeInstance,
    state: &PipelineState,
) -> Vec<String> {
    let Some(input) = spec.inputs.first() else {
        return Vec::new();
    };
    let Some(output) = spec.outputs.first() else {
        return Vec::new();
    };
    let Some(out_var) = state.variable_for(&node.id, &output.name) else {
        return Vec::new();
    };

    let expr = input_expression(graph, state, node, input);
    let raw = parse_str(&node.parameters, "axes")
        .or_else(|| {
            spec.param("axes")
                .and_then(|p| p.default.as_str())
        })
        .unwrap_or("xyzw");
    let pattern = normalize_swizzle_pattern(raw);
    vec![format!("{out_var} = {expr}.{pattern};")]
}

/// Normalize a 1-4 character axis string to a vec4 component swizzle.
/// Color-letter notation maps onto coordinates; anything invalid falls back
/// to pass-through. Patterns shorter than four characters repeat their last
/// axis so the emitted expression always matches the vec4 output.
pub fn normalize_swizzle_pattern(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.chars().count() > 4 {
        return "xyzw".to_string();
    }
    let mut out = String::with_capacity(4);
    for ch in trimmed.chars() {
        let mapped = match ch.to_ascii_lowercase() {
            'x' | 'r' => 'x',
            'y' | 'g' => 'y',
            'z' | 'b' => 'z',
            'w' | 'a' => 'w',
            _ => return "xyzw".to_string(),
        };
        out.push(mapped);
    }
    while out.len() < 4 {
        let last = out.chars().last().unwrap_or('w');
        out.push(last);
    }
    out
}

fn template_lines(
    graph: &NodeGraph,
    spec: &NodeSpec,
    node: &NodeInstance,
    state: &mut PipelineState,
) -> Vec<String> {
    let mut lines: Vec<String> = Vec::new();

    // Array-typed parameters materialize as constants scoped to this block.
    for param in &spec.parameters {
        if param.ty != ParamType::FloatArray {
            continue;
        }
        let Some(name) = state
            .array_names
            .get(&(node.id.clone(), param.name.clone()))
            .cloned()
        else {
            continue;
        };
        let mut values = parse_f64_array(&node.parameters, &param.name)
            .or_else(|| {
                param.default.as_array().map(|a| {
                    a.iter().filter_map(crate::dsl::json_number_f64).collect()
                })
            })
            .unwrap_or_default();
        if values.is_empty() {
            values.push(0.0);
        }
        let literals: Vec<String> = values.iter().map(|v| fmt_float(*v)).collect();
        let n = literals.len();
        lines.push(format!(
            "float {name}[{n}] = float[{n}]({});",
            literals.join(", ")
        ));
    }

    if spec.main_code.trim().is_empty() {
        return lines;
    }

    let mut io = NodeIo::default();
    for input in &spec.inputs {
        io.inputs
            .insert(input.name.clone(), input_expression(graph, state, node, input));
    }
    for port in spec.instance_outputs(node) {
        if let Some(var) = state.variable_for(&node.id, &port.name) {
            io.outputs.insert(port.name.clone(), var.to_string());
        }
    }

    let text = substitute_placeholders(&spec.main_code, graph, state, node, spec, Some(&io));
    let text = scrub_unresolved_params(&text, &node.id, state);
    lines.extend(text.lines().map(str::to_string));
    lines
}

/// Expression feeding one input port: the promoted connected source, or a
/// type-appropriate zero literal when nothing is wired in.
fn input_expression(
    graph: &NodeGraph,
    state: &PipelineState,
    node: &NodeInstance,
    input: &PortSpec,
) -> String {
    match incoming_port_connection(graph, &node.id, &input.name) {
        Some(conn) => source_expression(state, conn, input.ty),
        None => input.ty.zero_literal().to_string(),
    }
}

fn source_expression(state: &PipelineState, conn: &Connection, target: ValueType) -> String {
    let var = state
        .variable_for(&conn.source_node_id, &conn.source_port)
        .map(str::to_string)
        .unwrap_or_else(|| variable_base_name(&conn.source_node_id, &conn.source_port));
    match state.variable_types.get(&var).copied() {
        Some(from) => promote_expr(&var, from, target),
        None => var,
    }
}

/// Widen an expression across a connection. A scalar broadcasts into every
/// component; smaller vectors zero-fill the missing ones.
pub(crate) fn promote_expr(expr: &str, from: ValueType, to: ValueType) -> String {
    use ValueType::*;
    match (from, to) {
        (a, b) if a == b => expr.to_string(),
        (Float, Vec2) => format!("vec2({expr})"),
        (Float, Vec3) => format!("vec3({expr})"),
        (Float, Vec4) => format!("vec4({expr})"),
        (Vec2, Vec3) => format!("vec3({expr}, 0.0)"),
        (Vec2, Vec4) => format!("vec4({expr}, 0.0, 0.0)"),
        (Vec3, Vec4) => format!("vec4({expr}, 0.0)"),
        _ => expr.to_string(),
    }
}

/// Every connection's source variable must exist by the time the body runs;
/// anything missed gets a best-effort declaration so the program stays
/// syntactically valid. Diagnostic-only, never an error.
fn ensure_connection_sources_declared(
    catalog: &NodeCatalog,
    graph: &NodeGraph,
    state: &mut PipelineState,
    declarations: &mut String,
) {
    for c in &graph.connections {
        let var = state
            .variable_for(&c.source_node_id, &c.source_port)
            .map(str::to_string)
            .unwrap_or_else(|| variable_base_name(&c.source_node_id, &c.source_port));
        if state.variable_types.contains_key(&var) {
            continue;
        }
        let ty = connection_target_type(catalog, graph, c);
        declarations.push_str(&format!("    {} {} = {};\n", ty.glsl(), var, ty.zero_literal()));
        state.variable_types.insert(var.clone(), ty);
        state.warnings.push(format!(
            "synthesized declaration for '{var}': connection '{}' references an undeclared source",
            c.id
        ));
    }
}

fn connection_target_type(catalog: &NodeCatalog, graph: &NodeGraph, c: &Connection) -> ValueType {
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

// ── Final-color resolution ───────────────────────────────────────────────

/// Locate the node whose value becomes `fragColor`, and the vec3 expression
/// reading it. Preference order: the single terminal node; among several, a
/// true sink, else the latest in execution order; otherwise the last node
/// exposing a 3- or 4-channel output (then any output), channel-converted;
/// otherwise solid black.
fn resolve_final_color(
    catalog: &NodeCatalog,
    graph: &NodeGraph,
    state: &PipelineState,
) -> (Option<String>, String) {
    let terminals: Vec<&NodeInstance> = state
        .execution_order
        .iter()
        .filter_map(|id| find_node(graph, id))
        .filter(|n| n.node_type == TERMINAL_NODE_TYPE)
        .collect();

    let chosen = match terminals.len() {
        0 => None,
        1 => Some(terminals[0]),
        _ => {
            let sinks: Vec<&NodeInstance> = terminals
                .iter()
                .copied()
                .filter(|n| !graph.connections.iter().any(|c| c.source_node_id == n.id))
                .collect();
            let pool = if sinks.is_empty() { &terminals } else { &sinks };
            pool.last().copied()
        }
    };

    if let Some(node) = chosen {
        if let Some(expr) = node_color_expression(catalog, node, state, true)
            .or_else(|| node_color_expression(catalog, node, state, false))
        {
            return (Some(node.id.clone()), expr);
        }
        return (Some(node.id.clone()), "vec3(0.0)".to_string());
    }

    for want_wide in [true, false] {
        for node_id in state.execution_order.iter().rev() {
            let Some(node) = find_node(graph, node_id) else {
                continue;
            };
            if let Some(expr) = node_color_expression(catalog, node, state, want_wide) {
                return (Some(node.id.clone()), expr);
            }
        }
    }

    (None, "vec3(0.0)".to_string())
}

/// A vec3 expression reading the node's first suitable output. `want_wide`
/// restricts the scan to 3-/4-channel outputs.
fn node_color_expression(
    catalog: &NodeCatalog,
    node: &NodeInstance,
    state: &PipelineState,
    want_wide: bool,
) -> Option<String> {
    let spec = catalog.get(&node.node_type)?;
    for port in spec.instance_outputs(node) {
        let wide = port.ty.channels() >= 3;
        if wide != want_wide {
            continue;
        }
        let Some(var) = state.variable_for(&node.id, &port.name) else {
            continue;
        };
        return Some(channel_convert(var, port.ty));
    }
    None
}

/// Truncate or expand an arbitrary output into three color channels.
fn channel_convert(var: &str, ty: ValueType) -> String {
    match ty {
        ValueType::Vec4 => format!("{var}.rgb"),
        ValueType::Vec3 => var.to_string(),
        ValueType::Vec2 => format!("vec3({var}, 0.0)"),
        ValueType::Float => format!("vec3({var})"),
        ValueType::Int => format!("vec3(float({var}))"),
    }
}
