//! Helper-function text processing: placeholder substitution, defensive
//! repair passes, and cross-node deduplication by signature.

use std::collections::{HashMap, HashSet};

use crate::catalog::{NodeCatalog, NodeSpec, ParamSpec};
use crate::dsl::{
    Connection, NodeGraph, NodeInstance, ParamInputMode, find_node, incoming_param_connection,
    parse_f64, parse_i64, parse_str,
};

use super::naming::variable_base_name;
use super::types::{ParamType, PipelineState, ValueType};
use super::uniforms::{
    GLOBAL_RESOLUTION_UNIFORM, GLOBAL_TIME_UNIFORM, effective_input_mode, shaped_default,
};

/// Input/output expression tables for main-code substitution. Helper-function
/// templates run without one; `$input`/`$output` are not legal there.
#[derive(Default)]
pub struct NodeIo {
    pub inputs: HashMap<String, String>,
    pub outputs: HashMap<String, String>,
}

/// Process every node's helper-function template in execution order and
/// concatenate the results, keeping one copy per function signature. Two
/// unrelated nodes shipping byte-identical helper code must not produce a
/// duplicate-symbol compile failure.
pub fn generate_functions(
    catalog: &NodeCatalog,
    graph: &NodeGraph,
    state: &mut PipelineState,
) -> String {
    let mut combined = String::new();
    let order = state.execution_order.clone();
    for node_id in &order {
        let Some(node) = find_node(graph, node_id) else {
            continue;
        };
        let Some(spec) = catalog.get(&node.node_type) else {
            continue;
        };
        if spec.functions.trim().is_empty() {
            continue;
        }
        let text = substitute_placeholders(&spec.functions, graph, state, node, spec, None);
        let text = scrub_unresolved_params(&text, node_id, state);
        combined.push_str(text.trim_end());
        combined.push_str("\n\n");
    }

    let deduped = dedup_functions(&combined);
    audit_variable_references(&deduped, state)
}

// ── Placeholder substitution ─────────────────────────────────────────────

/// Replace `$input.*` / `$output.*` / `$param.*` / `$time` / `$resolution`
/// tokens. Parameter placeholders resolve by priority: combination expression
/// when the input mode needs both operands, raw connected expression under
/// override, the generated uniform identifier, then a literal fallback.
/// Unknown tokens are left in place for the safety pass.
pub fn substitute_placeholders(
    template: &str,
    graph: &NodeGraph,
    state: &PipelineState,
    node: &NodeInstance,
    spec: &NodeSpec,
    io: Option<&NodeIo>,
) -> String {
    let b = template.as_bytes();
    let mut out = String::with_capacity(template.len());
    let mut i = 0usize;

    while i < b.len() {
        if b[i] != b'$' {
            let next = next_dollar(b, i);
            out.push_str(&template[i..next]);
            i = next;
            continue;
        }

        let (word, after_word) = read_ident(template, i + 1);
        match word {
            "time" => {
                out.push_str(GLOBAL_TIME_UNIFORM);
                i = after_word;
            }
            "resolution" => {
                out.push_str(GLOBAL_RESOLUTION_UNIFORM);
                i = after_word;
            }
            "input" | "output" | "param"
                if after_word < b.len() && b[after_word] == b'.' =>
            {
                let (name, end) = read_ident(template, after_word + 1);
                if name.is_empty() {
                    out.push('$');
                    i += 1;
                    continue;
                }
                let replacement = match word {
                    "input" => io.and_then(|io| io.inputs.get(name)).cloned(),
                    "output" => io.and_then(|io| io.outputs.get(name)).cloned(),
                    _ => spec
                        .param(name)
                        .map(|p| param_expression(graph, state, node, p)),
                };
                match replacement {
                    Some(r) => out.push_str(&r),
                    None => out.push_str(&template[i..end]),
                }
                i = end;
            }
            _ => {
                out.push('$');
                i += 1;
            }
        }
    }
    out
}

/// The expression standing in for one parameter reference.
pub(crate) fn param_expression(
    graph: &NodeGraph,
    state: &PipelineState,
    node: &NodeInstance,
    param: &ParamSpec,
) -> String {
    let key = (node.id.clone(), param.name.clone());
    let uniform = state.uniform_names.get(&key);

    if let Some(conn) = incoming_param_connection(graph, &node.id, &param.name) {
        let source = param_source_expression(state, conn);
        let op = match effective_input_mode(node, param) {
            ParamInputMode::Override => return source,
            ParamInputMode::Add => "+",
            ParamInputMode::Subtract => "-",
            ParamInputMode::Multiply => "*",
        };
        let left = uniform
            .cloned()
            .unwrap_or_else(|| literal_fallback(state, node, param));
        return format!("({left} {op} {source})");
    }

    if let Some(u) = uniform {
        return u.clone();
    }
    literal_fallback(state, node, param)
}

/// Connected parameter sources reduce to a single float: vectors by their
/// first component, ints by conversion.
fn param_source_expression(state: &PipelineState, conn: &Connection) -> String {
    let var = state
        .variable_for(&conn.source_node_id, &conn.source_port)
        .map(str::to_string)
        .unwrap_or_else(|| variable_base_name(&conn.source_node_id, &conn.source_port));
    match state.variable_types.get(&var) {
        Some(ValueType::Int) => format!("float({var})"),
        Some(ValueType::Vec2 | ValueType::Vec3 | ValueType::Vec4) => format!("{var}.x"),
        _ => var,
    }
}

fn literal_fallback(state: &PipelineState, node: &NodeInstance, param: &ParamSpec) -> String {
    match param.ty {
        ParamType::Float => {
            let v = parse_f64(&node.parameters, &param.name)
                .or_else(|| crate::dsl::json_number_f64(&param.default))
                .unwrap_or(0.0);
            fmt_float(v)
        }
        ParamType::Int => parse_i64(&node.parameters, &param.name)
            .or_else(|| param.default.as_i64())
            .unwrap_or(0)
            .to_string(),
        ParamType::Vec2 | ParamType::Vec3 | ParamType::Vec4 => {
            let shaped = shaped_default(node, param);
            let values: Vec<String> = shaped
                .as_array()
                .map(|a| {
                    a.iter()
                        .map(|v| fmt_float(v.as_f64().unwrap_or(0.0)))
                        .collect()
                })
                .unwrap_or_default();
            let ty = param.ty.as_value_type().map(|t| t.glsl()).unwrap_or("vec4");
            format!("{ty}({})", values.join(", "))
        }
        // Strings are resolved at compile time (e.g. swizzle axis patterns);
        // plain substitution inlines the raw text.
        ParamType::String => parse_str(&node.parameters, &param.name)
            .or_else(|| param.default.as_str())
            .unwrap_or_default()
            .to_string(),
        ParamType::FloatArray => state
            .array_names
            .get(&(node.id.clone(), param.name.clone()))
            .cloned()
            .unwrap_or_else(|| "0.0".to_string()),
    }
}

/// GLSL float literal; integral values keep a decimal point.
pub(crate) fn fmt_float(v: f64) -> String {
    if !v.is_finite() {
        return "0.0".to_string();
    }
    if v.fract() == 0.0 && v.abs() < 1.0e9 {
        format!("{v:.1}")
    } else {
        format!("{v}")
    }
}

// ── Defensive repair passes ──────────────────────────────────────────────

/// Rewrite any still-unresolved `$param.*` token to the literal `0.0`. The
/// emitted text must never contain unresolved tokens.
pub fn scrub_unresolved_params(text: &str, node_id: &str, state: &mut PipelineState) -> String {
    let b = text.as_bytes();
    let mut out = String::with_capacity(text.len());
    let mut i = 0usize;

    while i < b.len() {
        if b[i] != b'$' {
            let next = next_dollar(b, i);
            out.push_str(&text[i..next]);
            i = next;
            continue;
        }
        let (word, after_word) = read_ident(text, i + 1);
        if word == "param" && after_word < b.len() && b[after_word] == b'.' {
            let (name, end) = read_ident(text, after_word + 1);
            if !name.is_empty() {
                out.push_str("0.0");
                state.warnings.push(format!(
                    "node '{node_id}': unresolved parameter placeholder '$param.{name}' replaced with 0.0"
                ));
                i = end;
                continue;
            }
        }
        out.push('$');
        i += 1;
    }
    out
}

/// Rewrite `node_*` identifier tokens that do not resolve to a declared
/// variable to `0.0` (stale or dangling references left by the editor).
pub fn audit_variable_references(text: &str, state: &mut PipelineState) -> String {
    let b = text.as_bytes();
    let mut out = String::with_capacity(text.len());
    let mut reported: HashSet<String> = HashSet::new();
    let mut i = 0usize;

    while i < b.len() {
        if is_ident_start(b[i]) && (i == 0 || !is_ident_byte(b[i - 1])) {
            let (ident, end) = read_ident(text, i);
            if ident.starts_with("node_") && !state.variable_types.contains_key(ident) {
                out.push_str("0.0");
                if reported.insert(ident.to_string()) {
                    state.warnings.push(format!(
                        "reference to undeclared variable '{ident}' replaced with 0.0"
                    ));
                }
            } else {
                out.push_str(ident);
            }
            i = end;
        } else {
            // Copy through to the next identifier boundary; stops only on
            // ASCII bytes, so slices stay on char boundaries.
            let mut j = i + 1;
            while j < b.len() && !(is_ident_start(b[j]) && !is_ident_byte(b[j - 1])) {
                j += 1;
            }
            out.push_str(&text[i..j]);
            i = j;
        }
    }
    out
}

// ── Function extraction & dedup ──────────────────────────────────────────

const GLSL_TYPE_KEYWORDS: &[&str] = &[
    "float", "int", "uint", "bool", "void", "vec2", "vec3", "vec4", "ivec2", "ivec3", "ivec4",
    "uvec2", "uvec3", "uvec4", "bvec2", "bvec3", "bvec4", "mat2", "mat3", "mat4",
];

const PARAM_QUALIFIERS: &[&str] = &["in", "out", "inout", "const", "highp", "mediump", "lowp"];

struct FunctionDef {
    signature: String,
    text: String,
}

/// Keep the first occurrence of each function signature, in first-seen order.
pub fn dedup_functions(text: &str) -> String {
    let defs = extract_function_definitions(text);
    if defs.is_empty() {
        return String::new();
    }

    let mut seen: HashSet<String> = HashSet::new();
    let mut out = String::new();
    for def in defs {
        if seen.insert(def.signature) {
            out.push_str(def.text.trim_end());
            out.push_str("\n\n");
        }
    }
    out.truncate(out.trim_end().len());
    out.push('\n');
    out
}

/// Walk the source with explicit parenthesis- and brace-depth counters to
/// extract full `returnType identifier(params) { body }` spans. Parameter
/// lists and bodies both contain nested delimiters, so a regex-to-end match
/// is not safe here.
fn extract_function_definitions(text: &str) -> Vec<FunctionDef> {
    let b = text.as_bytes();
    let mut defs = Vec::new();
    let mut i = 0usize;

    while i < b.len() {
        if !is_ident_start(b[i]) || (i > 0 && is_ident_byte(b[i - 1])) {
            i += 1;
            continue;
        }
        let (ret, after_ret) = read_ident(text, i);
        if !GLSL_TYPE_KEYWORDS.contains(&ret) {
            i = after_ret;
            continue;
        }
        let name_start = skip_whitespace(b, after_ret);
        if name_start == after_ret || name_start >= b.len() || !is_ident_start(b[name_start]) {
            i = after_ret;
            continue;
        }
        let (name, after_name) = read_ident(text, name_start);
        let paren = skip_whitespace(b, after_name);
        if paren >= b.len() || b[paren] != b'(' {
            i = after_ret;
            continue;
        }
        let Some(params_end) = matching_delimiter(b, paren, b'(', b')') else {
            i = after_ret;
            continue;
        };
        let brace = skip_whitespace(b, params_end + 1);
        if brace >= b.len() || b[brace] != b'{' {
            // Prototype or something else; not a definition.
            i = after_ret;
            continue;
        }
        let Some(body_end) = matching_delimiter(b, brace, b'{', b'}') else {
            i = after_ret;
            continue;
        };

        defs.push(FunctionDef {
            signature: signature_key(ret, name, &text[paren + 1..params_end]),
            text: text[i..=body_end].to_string(),
        });
        i = body_end + 1;
    }
    defs
}

/// Return type + name + ordered parameter base types, whitespace and default
/// values stripped.
fn signature_key(ret: &str, name: &str, params: &str) -> String {
    let mut base_types: Vec<String> = Vec::new();
    for param in split_top_level_commas(params) {
        let param = param.split('=').next().unwrap_or("").trim();
        if param.is_empty() {
            continue;
        }
        let mut tokens = param
            .split_whitespace()
            .filter(|t| !PARAM_QUALIFIERS.contains(t));
        if let Some(base) = tokens.next() {
            base_types.push(base.to_string());
        }
    }
    format!("{ret} {name}({})", base_types.join(","))
}

fn split_top_level_commas(text: &str) -> Vec<&str> {
    let b = text.as_bytes();
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut start = 0usize;
    for (i, &c) in b.iter().enumerate() {
        match c {
            b'(' | b'[' => depth += 1,
            b')' | b']' => depth -= 1,
            b',' if depth == 0 => {
                parts.push(&text[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    if start < text.len() {
        parts.push(&text[start..]);
    }
    parts
}

/// Index of the delimiter closing the one at `open_at`, tracking depth.
fn matching_delimiter(b: &[u8], open_at: usize, open: u8, close: u8) -> Option<usize> {
    let mut depth = 0i32;
    for (i, &c) in b.iter().enumerate().skip(open_at) {
        if c == open {
            depth += 1;
        } else if c == close {
            depth -= 1;
            if depth == 0 {
                return Some(i);
            }
        }
    }
    None
}

// ── Byte-scanner helpers ─────────────────────────────────────────────────

fn next_dollar(b: &[u8], from: usize) -> usize {
    b[from..]
        .iter()
        .position(|&c| c == b'$')
        .map(|p| from + p)
        .unwrap_or(b.len())
}

fn is_ident_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_'
}

fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// Read an identifier starting at byte `from`; returns (ident, end index).
fn read_ident(text: &str, from: usize) -> (&str, usize) {
    let b = text.as_bytes();
    let mut end = from;
    while end < b.len() && is_ident_byte(b[end]) {
        end += 1;
    }
    (&text[from..end], end)
}

fn skip_whitespace(b: &[u8], from: usize) -> usize {
    let mut i = from;
    while i < b.len() && b[i].is_ascii_whitespace() {
        i += 1;
    }
    i
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    fn instance(id: &str, node_type: &str, params: serde_json::Value) -> NodeInstance {
        NodeInstance {
            id: id.to_string(),
            node_type: node_type.to_string(),
            parameters: serde_json::from_value(params).unwrap(),
            parameter_input_modes: HashMap::new(),
        }
    }

    fn empty_graph() -> NodeGraph {
        NodeGraph {
            id: "g".to_string(),
            name: "t".to_string(),
            version: "1.0".to_string(),
            nodes: Vec::new(),
            connections: Vec::new(),
        }
    }

    #[test]
    fn substitutes_global_placeholders() {
        let catalog = NodeCatalog::load_default().unwrap();
        let spec = catalog.get("gradient").unwrap();
        let node = instance("grad", "gradient", json!({}));
        let state = PipelineState::default();

        let out = substitute_placeholders(
            "vec2 uv = gl_FragCoord.xy / $resolution; float t = $time;",
            &empty_graph(),
            &state,
            &node,
            spec,
            None,
        );
        assert_eq!(
            out,
            "vec2 uv = gl_FragCoord.xy / u_resolution; float t = u_time;"
        );
    }

    #[test]
    fn param_resolves_to_uniform_then_literal() {
        let catalog = NodeCatalog::load_default().unwrap();
        let spec = catalog.get("oscillator").unwrap();
        let node = instance("osc", "oscillator", json!({"frequency": 2.0}));
        let graph = empty_graph();

        // No uniform allocated: literal fallback from the instance value.
        let state = PipelineState::default();
        let out =
            substitute_placeholders("$param.frequency", &graph, &state, &node, spec, None);
        assert_eq!(out, "2.0");

        // With a uniform in scope, the identifier wins.
        let mut state = PipelineState::default();
        state.uniform_names.insert(
            ("osc".to_string(), "frequency".to_string()),
            "uoscFrequency".to_string(),
        );
        let out =
            substitute_placeholders("$param.frequency", &graph, &state, &node, spec, None);
        assert_eq!(out, "uoscFrequency");
    }

    #[test]
    fn connected_param_override_uses_raw_source_expression() {
        let catalog = NodeCatalog::load_default().unwrap();
        let spec = catalog.get("oscillator").unwrap();
        let node = instance("osc", "oscillator", json!({}));

        let mut graph = empty_graph();
        graph.connections.push(Connection {
            id: "c1".to_string(),
            source_node_id: "lfo".to_string(),
            source_port: "value".to_string(),
            target_node_id: "osc".to_string(),
            target_port: None,
            target_parameter: Some("frequency".to_string()),
        });

        let mut state = PipelineState::default();
        state.variable_names.insert(
            ("lfo".to_string(), "value".to_string()),
            "node_lfo_value".to_string(),
        );
        state
            .variable_types
            .insert("node_lfo_value".to_string(), ValueType::Float);

        let out =
            substitute_placeholders("$param.frequency", &graph, &state, &node, spec, None);
        assert_eq!(out, "node_lfo_value");
    }

    #[test]
    fn connected_param_add_mode_combines_uniform_and_source() {
        let catalog = NodeCatalog::load_default().unwrap();
        let spec = catalog.get("oscillator").unwrap();
        // phase has add mode in the catalog.
        let node = instance("osc", "oscillator", json!({}));

        let mut graph = empty_graph();
        graph.connections.push(Connection {
            id: "c1".to_string(),
            source_node_id: "lfo".to_string(),
            source_port: "value".to_string(),
            target_node_id: "osc".to_string(),
            target_port: None,
            target_parameter: Some("phase".to_string()),
        });

        let mut state = PipelineState::default();
        state.uniform_names.insert(
            ("osc".to_string(), "phase".to_string()),
            "uoscPhase".to_string(),
        );
        state.variable_names.insert(
            ("lfo".to_string(), "value".to_string()),
            "node_lfo_value".to_string(),
        );
        state
            .variable_types
            .insert("node_lfo_value".to_string(), ValueType::Vec3);

        let out = substitute_placeholders("$param.phase", &graph, &state, &node, spec, None);
        // Vec source reduced to its first component.
        assert_eq!(out, "(uoscPhase + node_lfo_value.x)");
    }

    #[test]
    fn unresolved_param_placeholder_scrubs_to_zero() {
        let mut state = PipelineState::default();
        let out = scrub_unresolved_params("x = $param.ghost + 1.0;", "n1", &mut state);
        assert_eq!(out, "x = 0.0 + 1.0;");
        assert!(state.warnings[0].contains("$param.ghost"));
    }

    #[test]
    fn audit_rewrites_undeclared_node_references() {
        let mut state = PipelineState::default();
        state
            .variable_types
            .insert("node_a_value".to_string(), ValueType::Float);
        let out = audit_variable_references(
            "x = node_a_value + node_gone_value;",
            &mut state,
        );
        assert_eq!(out, "x = node_a_value + 0.0;");
        assert_eq!(state.warnings.len(), 1);
    }

    #[test]
    fn dedup_collapses_identical_signatures() {
        let text = "float hash21(vec2 p) {\n    return fract(p.x * p.y);\n}\n\nfloat hash21(vec2 p) {\n    return fract(p.x * p.y);\n}\n";
        let out = dedup_functions(text);
        assert_eq!(out.matches("hash21").count(), 1);
    }

    #[test]
    fn dedup_keeps_distinct_signatures_in_first_seen_order() {
        let text = "float f(float x) { return x; }\nvec2 f(vec2 x) { return x; }\nfloat g(float x) { return f(x); }\n";
        let out = dedup_functions(text);
        assert_eq!(out.matches("return").count(), 3);
        let f_pos = out.find("float f").unwrap();
        let g_pos = out.find("float g").unwrap();
        assert!(f_pos < g_pos);
    }

    #[test]
    fn extraction_handles_nested_delimiters() {
        let text = "float wrap(float x) {\n    if (x > 1.0) { x = fract(min(x, fract(x + 1.0))); }\n    return x;\n}\nfloat wrap(float x) { return x; }\n";
        let out = dedup_functions(text);
        // First definition (with the nested body) wins.
        assert_eq!(out.matches("float wrap").count(), 1);
        assert!(out.contains("min(x, fract(x + 1.0))"));
    }

    #[test]
    fn signature_ignores_whitespace_and_param_names() {
        let a = "float  blend( in float a,  float   b ) { return a + b; }";
        let b = "float blend(float x, float y) { return x - y; }";
        let out = dedup_functions(&format!("{a}\n{b}\n"));
        // Same signature, first occurrence kept.
        assert!(out.contains("a + b"));
        assert!(!out.contains("x - y"));
    }

    #[test]
    fn float_literals_keep_a_decimal_point() {
        assert_eq!(fmt_float(2.0), "2.0");
        assert_eq!(fmt_float(0.25), "0.25");
        assert_eq!(fmt_float(f64::NAN), "0.0");
    }
}
