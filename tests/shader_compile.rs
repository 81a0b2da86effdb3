//! End-to-end pipeline tests: compile graphs against the built-in catalog and
//! validate every emitted shader with naga's GLSL frontend.

mod common;

use common::*;
use serde_json::json;
use shadegraph::catalog::{NodeCatalog, NodeSpec, PortSpec};
use shadegraph::compiler::{self, types::CompilationResult, types::DiagnosticKind, types::ValueType};
use shadegraph::dsl::NodeGraph;
use shadegraph::validation::validate_fragment_shader_with_context;

fn compile_ok(g: &NodeGraph) -> CompilationResult {
    let catalog = NodeCatalog::load_default().unwrap();
    let result = compiler::compile(&catalog, g);
    assert!(
        result.metadata.errors.is_empty(),
        "unexpected errors: {:?}",
        result.metadata.errors
    );
    validate_fragment_shader_with_context(&result.shader_code, &format!("graph '{}'", g.name))
        .unwrap_or_else(|e| panic!("{e:#}"));
    result
}

/// A graph touching most of the catalog: virtual sources, parameter drives in
/// every mode, helper functions, arrays, swizzles, and a terminal node.
fn rich_graph() -> NodeGraph {
    graph(
        vec![
            node("grad", "gradient"),
            node_with_params("osc", "oscillator", json!({"frequency": 3.0})),
            node("noise", "hash_noise"),
            node("uv", "uv_coords"),
            node("glitter", "sparkle"),
            node_with_params("h", "harmonics", json!({"weights": [0.9, 0.4, 0.1]})),
            node("mixer", "mix"),
            node("sw", "swizzle"),
            node("audio", "audio_input"),
            node("sink", "output"),
        ],
        vec![
            port_wire("c_uv_noise", "uv", "uv", "noise", "seed"),
            port_wire("c_grad_glitter", "grad", "color", "glitter", "color"),
            param_wire("c_audio_glitter", "audio", "level", "glitter", "intensity"),
            param_wire("c_osc_phase", "audio", "bass", "osc", "phase"),
            port_wire("c_grad_mix", "grad", "color", "mixer", "a"),
            port_wire("c_glitter_mix", "glitter", "color", "mixer", "b"),
            port_wire("c_osc_mix", "osc", "value", "mixer", "factor"),
            port_wire("c_mix_sw", "mixer", "color", "sw", "vector"),
            port_wire("c_sw_sink", "sw", "result", "sink", "color"),
        ],
    )
}

#[test]
fn gradient_to_output_compiles_and_validates() {
    let g = graph(
        vec![node("grad", "gradient"), node("sink", "output")],
        vec![port_wire("c1", "grad", "color", "sink", "color")],
    );
    let result = compile_ok(&g);

    assert!(result.shader_code.contains("node_grad_color"));
    assert!(result.shader_code.contains("fragColor = vec4(node_sink_color.rgb, 1.0);"));
    assert_eq!(result.metadata.final_output_node_id.as_deref(), Some("sink"));

    let names: Vec<&str> = result.uniforms.iter().map(|u| u.name.as_str()).collect();
    assert!(names.contains(&"u_time"));
    assert!(names.contains(&"u_resolution"));
    assert!(names.contains(&"ugradAngle"));
}

#[test]
fn empty_graph_emits_black_and_a_warning() {
    let g = graph(vec![], vec![]);
    let catalog = NodeCatalog::load_default().unwrap();
    let result = compiler::compile(&catalog, &g);

    assert!(result.uniforms.is_empty());
    assert!(result.metadata.errors.is_empty());
    assert_eq!(result.metadata.warnings.len(), 1);
    assert!(result.metadata.warnings[0].contains("Empty graph"));
    assert!(result.shader_code.contains("fragColor = vec4(vec3(0.0), 1.0);"));
    validate_fragment_shader_with_context(&result.shader_code, "empty graph").unwrap();
}

#[test]
fn cycle_yields_cycle_error_and_empty_shader() {
    let g = graph(
        vec![node("a", "scale"), node("b", "scale"), node("sink", "output")],
        vec![
            port_wire("c1", "a", "color", "b", "color"),
            port_wire("c2", "b", "color", "a", "color"),
        ],
    );
    let catalog = NodeCatalog::load_default().unwrap();
    let result = compiler::compile(&catalog, &g);

    assert!(result.shader_code.is_empty());
    assert!(result.uniforms.is_empty());
    assert!(
        result
            .metadata
            .errors
            .iter()
            .any(|e| matches!(e.kind, DiagnosticKind::Cycle))
    );
}

#[test]
fn dangling_target_aborts_before_sorting() {
    let g = graph(
        vec![node("grad", "gradient")],
        vec![port_wire("c1", "grad", "color", "ghost", "color")],
    );
    let catalog = NodeCatalog::load_default().unwrap();
    let result = compiler::compile(&catalog, &g);

    assert!(result.shader_code.is_empty());
    assert!(
        result
            .metadata
            .errors
            .iter()
            .any(|e| e.message.contains("non-existent target node 'ghost'"))
    );
    // Aborted before the sort ran.
    assert!(result.metadata.execution_order.is_empty());
}

#[test]
fn int_to_vec3_mismatch_names_both_endpoints() {
    let mut catalog = NodeCatalog::load_default().unwrap();
    catalog.register(NodeSpec {
        id: "int_counter".to_string(),
        category: Some("source".to_string()),
        inputs: Vec::new(),
        outputs: vec![PortSpec {
            name: "count".to_string(),
            ty: ValueType::Int,
        }],
        dynamic_outputs: None,
        parameters: Vec::new(),
        functions: String::new(),
        main_code: "$output.count = 0;".to_string(),
    });

    let g = graph(
        vec![
            node("counter", "int_counter"),
            node("mixer", "mix"),
            node("sink", "output"),
        ],
        vec![
            port_wire("c1", "counter", "count", "mixer", "a"),
            port_wire("c2", "mixer", "color", "sink", "color"),
        ],
    );
    let result = compiler::compile(&catalog, &g);

    assert!(result.shader_code.is_empty());
    let err = result
        .metadata
        .errors
        .iter()
        .find(|e| matches!(e.kind, DiagnosticKind::Type))
        .unwrap();
    assert!(err.message.contains("counter.count"), "got: {}", err.message);
    assert!(err.message.contains("mixer.a"));
    assert!(err.message.contains("int_counter") && err.message.contains("mix"));
}

#[test]
fn duplicate_parameter_drive_names_both_connections() {
    let g = graph(
        vec![
            node("a", "oscillator"),
            node("b", "oscillator"),
            node("sc", "scale"),
            node("sink", "output"),
        ],
        vec![
            param_wire("c1", "a", "value", "sc", "factor"),
            param_wire("c2", "b", "value", "sc", "factor"),
            port_wire("c3", "sc", "color", "sink", "color"),
        ],
    );
    let catalog = NodeCatalog::load_default().unwrap();
    let result = compiler::compile(&catalog, &g);

    let msg = result
        .metadata
        .errors
        .iter()
        .find(|e| e.message.contains("sc.param:factor"))
        .map(|e| e.message.clone())
        .unwrap_or_default();
    assert!(msg.contains("c1") && msg.contains("c2"), "got: {msg}");
}

#[test]
fn float_output_broadcasts_into_vec4_input() {
    let g = graph(
        vec![node("osc", "oscillator"), node("sink", "output")],
        vec![port_wire("c1", "osc", "value", "sink", "color")],
    );
    let result = compile_ok(&g);
    assert!(result.shader_code.contains("vec4(node_osc_value)"));
}

#[test]
fn identical_helper_functions_are_emitted_once() {
    let g = graph(
        vec![
            node("uv", "uv_coords"),
            node("noise", "hash_noise"),
            node("grad", "gradient"),
            node("glitter", "sparkle"),
            node("mixer", "mix"),
            node("sink", "output"),
        ],
        vec![
            port_wire("c1", "uv", "uv", "noise", "seed"),
            port_wire("c2", "grad", "color", "glitter", "color"),
            port_wire("c3", "glitter", "color", "mixer", "a"),
            port_wire("c4", "noise", "value", "mixer", "factor"),
            port_wire("c5", "mixer", "color", "sink", "color"),
        ],
    );
    let result = compile_ok(&g);
    // hash_noise and sparkle both ship hash21; one definition must survive.
    assert_eq!(result.shader_code.matches("float hash21(").count(), 1);
}

#[test]
fn unreferenced_parameter_uniform_is_pruned() {
    let mut catalog = NodeCatalog::load_default().unwrap();
    catalog.register(NodeSpec {
        id: "dead_knob".to_string(),
        category: Some("source".to_string()),
        inputs: Vec::new(),
        outputs: vec![PortSpec {
            name: "value".to_string(),
            ty: ValueType::Float,
        }],
        dynamic_outputs: None,
        parameters: vec![serde_json::from_value(
            json!({"name": "ghost", "type": "float", "default": 1.0}),
        )
        .unwrap()],
        functions: String::new(),
        main_code: "$output.value = 1.0;".to_string(),
    });

    let g = graph(
        vec![node("dk", "dead_knob"), node("sink", "output")],
        vec![port_wire("c1", "dk", "value", "sink", "color")],
    );
    let result = compiler::compile(&catalog, &g);
    assert!(result.metadata.errors.is_empty());

    assert!(!result.uniforms.iter().any(|u| u.name == "udkGhost"));
    assert!(!result.shader_code.contains("udkGhost"));
    // Globals survive pruning unconditionally.
    assert!(result.uniforms.iter().any(|u| u.name == "u_time"));
}

#[test]
fn virtual_sources_run_first_and_mirrors_always_bind() {
    let result = compile_ok(&rich_graph());

    assert_eq!(result.metadata.execution_order[0], "audio");
    // The audio block copies from mirror uniforms before anyone reads it.
    assert!(result.shader_code.contains("node_audio_level = uaudioLevel;"));
    assert!(result.shader_code.contains("node_audio_bass = uaudioBass;"));

    // Mirrors survive liveness pruning even when no expression reads them.
    let names: Vec<&str> = result.uniforms.iter().map(|u| u.name.as_str()).collect();
    assert!(names.contains(&"uaudioMid"));
    assert!(names.contains(&"uaudioTreble"));
}

#[test]
fn swizzle_emits_direct_component_expression() {
    let sw = node_with_params("sw", "swizzle", json!({"axes": "bgra"}));
    let g = graph(
        vec![node("grad", "gradient"), sw, node("sink", "output")],
        vec![
            port_wire("c1", "grad", "color", "sw", "vector"),
            port_wire("c2", "sw", "result", "sink", "color"),
        ],
    );
    let result = compile_ok(&g);
    assert!(
        result.shader_code.contains(".zyxw;"),
        "expected bgra swizzle in:\n{}",
        result.shader_code
    );
}

#[test]
fn harmonics_inlines_its_weight_array() {
    let g = graph(
        vec![node("h", "harmonics"), node("sink", "output")],
        vec![port_wire("c1", "h", "value", "sink", "color")],
    );
    let result = compile_ok(&g);
    assert!(
        result
            .shader_code
            .contains("float array_h_weights[3] = float[3](1.0, 0.5, 0.25);")
    );
    assert!(result.shader_code.contains("array_h_weights[i]"));
    // Inlined arrays never surface as uniforms.
    assert!(!result.uniforms.iter().any(|u| u.name.contains("Weights")));
}

#[test]
fn parameter_modes_shape_the_emitted_expressions() {
    let g = rich_graph();
    let result = compile_ok(&g);

    // sparkle.intensity defaults to override: connection replaces the knob.
    assert!(result.shader_code.contains("node_audio_level"));
    assert!(!result.uniforms.iter().any(|u| u.name == "uglitterIntensity"));

    // oscillator.phase declares add mode: uniform + source survive together.
    assert!(result.shader_code.contains("(uoscPhase + node_audio_bass)"));
    assert!(result.uniforms.iter().any(|u| u.name == "uoscPhase"));
}

#[test]
fn compiling_the_same_graph_twice_is_byte_identical() {
    let g = rich_graph();
    let catalog = NodeCatalog::load_default().unwrap();
    let a = compiler::compile(&catalog, &g);
    let b = compiler::compile(&catalog, &g);

    assert_eq!(a.shader_code, b.shader_code);
    assert_eq!(
        serde_json::to_string(&a.uniforms).unwrap(),
        serde_json::to_string(&b.uniforms).unwrap()
    );
    assert_eq!(a.metadata.execution_order, b.metadata.execution_order);
}

#[test]
fn execution_order_is_topologically_valid() {
    let g = rich_graph();
    let result = compile_ok(&g);
    let order = &result.metadata.execution_order;

    assert_eq!(order.len(), g.nodes.len());
    for n in &g.nodes {
        assert_eq!(order.iter().filter(|id| *id == &n.id).count(), 1);
    }
    let pos = |id: &str| order.iter().position(|x| x == id).unwrap();
    for c in &g.connections {
        assert!(
            pos(&c.source_node_id) < pos(&c.target_node_id),
            "connection {} violates execution order",
            c.id
        );
    }
}

#[test]
fn allow_listed_external_source_gets_a_placeholder_declaration() {
    let g = graph(
        vec![node("sc", "scale"), node("sink", "output")],
        vec![
            port_wire("c1", "panel_low", "band", "sc", "color"),
            port_wire("c2", "sc", "color", "sink", "color"),
        ],
    );
    let catalog = NodeCatalog::load_default().unwrap();
    let result = compiler::compile_with_sources(&catalog, &g, &["panel_low".to_string()]);

    assert!(result.metadata.errors.is_empty(), "{:?}", result.metadata.errors);
    assert!(
        result
            .shader_code
            .contains("vec3 node_panel_low_band = vec3(0.0);")
    );
    validate_fragment_shader_with_context(&result.shader_code, "external source graph").unwrap();
}

#[test]
fn disconnected_node_produces_a_warning() {
    let g = graph(
        vec![
            node("grad", "gradient"),
            node("stray", "oscillator"),
            node("sink", "output"),
        ],
        vec![port_wire("c1", "grad", "color", "sink", "color")],
    );
    let result = compile_ok(&g);
    assert!(
        result
            .metadata
            .warnings
            .iter()
            .any(|w| w.contains("'stray'") && w.contains("not connected"))
    );
}

#[test]
fn terminal_fallback_picks_last_wide_output() {
    // No output node at all: the latest 3/4-channel producer wins.
    let g = graph(
        vec![node("osc", "oscillator"), node("grad", "gradient"), node("sc", "scale")],
        vec![port_wire("c1", "grad", "color", "sc", "color")],
    );
    let result = compile_ok(&g);
    assert_eq!(result.metadata.final_output_node_id.as_deref(), Some("sc"));
    assert!(result.shader_code.contains("fragColor = vec4(node_sc_color, 1.0);"));
}

#[test]
fn terminal_fallback_expands_narrow_outputs_to_gray() {
    let g = graph(vec![node("osc", "oscillator")], vec![]);
    let result = compile_ok(&g);
    assert!(result.shader_code.contains("fragColor = vec4(vec3(node_osc_value), 1.0);"));
}

#[test]
fn vec_parameter_becomes_a_vec_uniform() {
    let g = graph(
        vec![
            node_with_params("fill", "solid_color", json!({"color": [0.2, 0.4, 0.8]})),
            node("sink", "output"),
        ],
        vec![port_wire("c1", "fill", "color", "sink", "color")],
    );
    let result = compile_ok(&g);

    assert!(result.shader_code.contains("uniform vec3 ufillColor;"));
    assert!(result.shader_code.contains("node_fill_color = ufillColor;"));
    let u = result.uniforms.iter().find(|u| u.name == "ufillColor").unwrap();
    assert_eq!(u.glsl_type, "vec3");
    assert_eq!(u.default_value, json!([0.2, 0.4, 0.8]));
}

#[test]
fn param_placeholder_inside_helper_function_is_substituted() {
    let g = graph(
        vec![
            node_with_params("p", "pulse", json!({"duty": 0.25})),
            node("sink", "output"),
        ],
        vec![port_wire("c1", "p", "value", "sink", "color")],
    );
    let result = compile_ok(&g);
    assert!(
        result.shader_code.contains("step(fract(t), upDuty)"),
        "helper should bake the duty uniform:\n{}",
        result.shader_code
    );
}

#[test]
fn multiple_terminals_prefer_the_true_sink() {
    // "feeder" is a terminal that feeds another node, so it is not a sink.
    let g = graph(
        vec![
            node("grad", "gradient"),
            node("feeder", "output"),
            node("sw", "swizzle"),
            node("real", "output"),
        ],
        vec![
            port_wire("c1", "grad", "color", "feeder", "color"),
            port_wire("c2", "feeder", "color", "sw", "vector"),
            port_wire("c3", "sw", "result", "real", "color"),
        ],
    );
    let result = compile_ok(&g);
    assert_eq!(result.metadata.final_output_node_id.as_deref(), Some("real"));
}
