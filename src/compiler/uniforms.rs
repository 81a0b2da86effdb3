//! Uniform generation: deterministic ids, default values, liveness pruning,
//! and the metadata the host renderer binds against every frame.

use crate::catalog::{NodeCatalog, ParamSpec, is_virtual_source_type};
use crate::dsl::{
    NodeGraph, NodeInstance, ParamInputMode, find_node, incoming_param_connection, json_number_f64,
    parse_f64, parse_f64_array, parse_i64,
};
use serde_json::json;

use super::naming::{sanitize_ident, unique_identifier};
use super::types::{ParamType, PipelineState, UniformCategory, UniformDecl, UniformMetadata, ValueType};

/// Per-frame globals, written by the host regardless of textual use.
pub const GLOBAL_TIME_UNIFORM: &str = "u_time";
pub const GLOBAL_RESOLUTION_UNIFORM: &str = "u_resolution";

/// `u` + sanitized node id + capitalized sanitized param name. A sanitized id
/// that would start with a digit is prefixed with an extra letter.
pub fn uniform_base_name(node_id: &str, param: &str) -> String {
    let mut id = sanitize_ident(node_id);
    if id.chars().next().is_some_and(|c| c.is_ascii_digit()) {
        id.insert(0, 'n');
    }
    format!("u{}{}", id, capitalize_first(&sanitize_ident(param)))
}

fn capitalize_first(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) => c.to_ascii_uppercase().to_string() + chars.as_str(),
        None => String::new(),
    }
}

/// Which input drives this parameter: the instance override, else the spec
/// default, else plain override semantics.
pub fn effective_input_mode(node: &NodeInstance, param: &ParamSpec) -> ParamInputMode {
    node.parameter_input_modes
        .get(&param.name)
        .copied()
        .or(param.input_mode)
        .unwrap_or(ParamInputMode::Override)
}

pub(crate) fn declare_global_uniforms(state: &mut PipelineState) {
    state
        .used_identifiers
        .insert(GLOBAL_TIME_UNIFORM.to_string());
    state
        .used_identifiers
        .insert(GLOBAL_RESOLUTION_UNIFORM.to_string());
    state.uniforms.push(UniformDecl {
        name: GLOBAL_TIME_UNIFORM.to_string(),
        glsl_type: "float".to_string(),
        default_value: json!(0.0),
        node_id: None,
        param_name: None,
        category: UniformCategory::Global,
    });
    state.uniforms.push(UniformDecl {
        name: GLOBAL_RESOLUTION_UNIFORM.to_string(),
        glsl_type: "vec2".to_string(),
        default_value: json!([1.0, 1.0]),
        node_id: None,
        param_name: None,
        category: UniformCategory::Global,
    });
}

/// Allocate uniforms in execution order: mirrors for every virtual-source
/// output, then one uniform per eligible parameter.
///
/// Skipped parameters: array/string-typed (inlined or resolved at compile
/// time), runtime-only flags, and parameters whose incoming connection fully
/// overrides the knob. `add`/`subtract`/`multiply` drives keep their uniform
/// as one operand of the combination expression.
pub fn generate_uniforms(catalog: &NodeCatalog, graph: &NodeGraph, state: &mut PipelineState) {
    declare_global_uniforms(state);

    let order = state.execution_order.clone();
    for node_id in &order {
        let Some(node) = find_node(graph, node_id) else {
            continue;
        };
        let Some(spec) = catalog.get(&node.node_type) else {
            continue;
        };

        if is_virtual_source_type(&node.node_type) {
            for port in spec.instance_outputs(node) {
                let name = unique_identifier(
                    &mut state.used_identifiers,
                    uniform_base_name(node_id, &port.name),
                );
                state
                    .uniform_names
                    .insert((node_id.clone(), port.name.clone()), name.clone());
                state.uniforms.push(UniformDecl {
                    name,
                    glsl_type: port.ty.glsl().to_string(),
                    default_value: zero_default(port.ty),
                    node_id: Some(node_id.clone()),
                    param_name: Some(port.name.clone()),
                    category: UniformCategory::External,
                });
            }
        }

        for param in &spec.parameters {
            if matches!(param.ty, ParamType::String | ParamType::FloatArray) || param.runtime_only {
                continue;
            }
            let connected = incoming_param_connection(graph, node_id, &param.name).is_some();
            if connected && effective_input_mode(node, param) == ParamInputMode::Override {
                continue;
            }
            let Some(value_ty) = param.ty.as_value_type() else {
                continue;
            };

            let name = unique_identifier(
                &mut state.used_identifiers,
                uniform_base_name(node_id, &param.name),
            );
            state
                .uniform_names
                .insert((node_id.clone(), param.name.clone()), name.clone());
            state.uniforms.push(UniformDecl {
                name,
                glsl_type: value_ty.glsl().to_string(),
                default_value: shaped_default(node, param),
                node_id: Some(node_id.clone()),
                param_name: Some(param.name.clone()),
                category: UniformCategory::Parameter,
            });
        }
    }
}

fn zero_default(ty: ValueType) -> serde_json::Value {
    match ty {
        ValueType::Float => json!(0.0),
        ValueType::Int => json!(0),
        ValueType::Vec2 => json!([0.0, 0.0]),
        ValueType::Vec3 => json!([0.0, 0.0, 0.0]),
        ValueType::Vec4 => json!([0.0, 0.0, 0.0, 0.0]),
    }
}

/// Instance-configured value if present, else the spec default, shaped to the
/// declared type (scalar or fixed-length numeric tuple).
pub fn shaped_default(node: &NodeInstance, param: &ParamSpec) -> serde_json::Value {
    match param.ty {
        ParamType::Float => {
            let v = parse_f64(&node.parameters, &param.name)
                .or_else(|| json_number_f64(&param.default))
                .unwrap_or(0.0);
            json!(v)
        }
        ParamType::Int => {
            let v = parse_i64(&node.parameters, &param.name)
                .or_else(|| param.default.as_i64())
                .unwrap_or(0);
            json!(v)
        }
        ParamType::Vec2 => json!(shaped_tuple(node, param, 2)),
        ParamType::Vec3 => json!(shaped_tuple(node, param, 3)),
        ParamType::Vec4 => json!(shaped_tuple(node, param, 4)),
        ParamType::String | ParamType::FloatArray => serde_json::Value::Null,
    }
}

fn shaped_tuple(node: &NodeInstance, param: &ParamSpec, len: usize) -> Vec<f64> {
    let mut values = parse_f64_array(&node.parameters, &param.name)
        .or_else(|| {
            param
                .default
                .as_array()
                .map(|a| a.iter().filter_map(json_number_f64).collect())
        })
        .unwrap_or_default();
    values.resize(len, 0.0);
    values.truncate(len);
    values
}

/// True when `name` appears in `text` as a standalone identifier (not as a
/// prefix of a longer one).
pub fn occurs_as_identifier(text: &str, name: &str) -> bool {
    let bytes = text.as_bytes();
    let mut from = 0;
    while let Some(pos) = text[from..].find(name) {
        let start = from + pos;
        let end = start + name.len();
        let before_ok = start == 0 || !is_ident_byte(bytes[start - 1]);
        let after_ok = end == bytes.len() || !is_ident_byte(bytes[end]);
        if before_ok && after_ok {
            return true;
        }
        from = start + 1;
    }
    false
}

fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// Drop parameter uniforms whose identifier never made it into the emitted
/// text. Globals and virtual-source mirrors survive unconditionally; the
/// external driver writes them every frame regardless of textual use.
pub fn prune_unused_uniforms(state: &mut PipelineState, emitted_text: &str) {
    state.uniforms.retain(|u| {
        u.category != UniformCategory::Parameter || occurs_as_identifier(emitted_text, &u.name)
    });
}

pub fn uniform_metadata(state: &PipelineState) -> Vec<UniformMetadata> {
    state
        .uniforms
        .iter()
        .map(|u| UniformMetadata {
            name: u.name.clone(),
            node_id: u.node_id.clone(),
            param_name: u.param_name.clone(),
            glsl_type: u.glsl_type.clone(),
            default_value: u.default_value.clone(),
            category: u.category,
        })
        .collect()
}

/// Declaration block for the shader template, in allocation order.
pub fn uniform_block(state: &PipelineState) -> String {
    let mut out = String::new();
    for u in &state.uniforms {
        out.push_str(&format!("uniform {} {};\n", u.glsl_type, u.name));
    }
    out
}
