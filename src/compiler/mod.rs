//! The compilation pipeline: validation, ordering, name allocation, codegen,
//! and final shader assembly.
//!
//! `compile()` is a pure function of its inputs. Each call owns a fresh
//! [`types::PipelineState`]; nothing persists between compiles, and the
//! input graph is never mutated.

pub mod codegen;
pub mod functions;
pub mod naming;
pub mod template;
pub mod typecheck;
pub mod types;
pub mod uniforms;
pub mod validate;

use std::collections::HashSet;

use crate::catalog::NodeCatalog;
use crate::dsl::NodeGraph;
use crate::graph::{topo_sort, virtual_sources_first};

use self::template::{ShaderSections, assemble_fragment_shader};
use self::types::{CompilationMetadata, CompilationResult, Diagnostic, PipelineState};

pub fn compile(catalog: &NodeCatalog, graph: &NodeGraph) -> CompilationResult {
    compile_with_sources(catalog, graph, &[])
}

/// Full compile. `virtual_source_ids` allow-lists externally-injected
/// connection sources that are not graph nodes.
///
/// Stage order: validate -> sort + reorder -> type-check -> name variables ->
/// name uniforms -> functions -> main code -> prune -> assemble. Any stage
/// with accumulated errors aborts with an empty shader.
pub fn compile_with_sources(
    catalog: &NodeCatalog,
    graph: &NodeGraph,
    virtual_source_ids: &[String],
) -> CompilationResult {
    let mut state = PipelineState::default();

    if graph.nodes.is_empty() {
        state
            .warnings
            .push("Empty graph: nothing to compile, emitting constant black".to_string());
        let shader_code = assemble_fragment_shader(&ShaderSections {
            uniform_block: String::new(),
            function_block: String::new(),
            declaration_block: String::new(),
            body_block: String::new(),
            final_color: "vec3(0.0)".to_string(),
        });
        return CompilationResult {
            shader_code,
            uniforms: Vec::new(),
            metadata: metadata_from(state, None),
        };
    }

    validate::validate_graph(catalog, graph, &mut state, virtual_source_ids);
    if state.has_errors() {
        return abort(state);
    }

    match topo_sort(graph) {
        Ok(order) => state.execution_order = virtual_sources_first(graph, order),
        Err(e) => {
            state.errors.push(Diagnostic::cycle(e.to_string()));
            return abort(state);
        }
    }

    typecheck::validate_connection_types(catalog, graph, &mut state);
    if state.has_errors() {
        return abort(state);
    }

    run_generation(catalog, graph, state)
}

/// Best-effort incremental entry point: decide whether the previous result's
/// structure still holds, then re-run the generation stages. Declines to a
/// full compile whenever reuse would be unsafe; the observable output always
/// equals a full compile.
pub fn compile_incremental(
    catalog: &NodeCatalog,
    graph: &NodeGraph,
    previous: Option<&CompilationResult>,
    affected_node_ids: &[String],
) -> CompilationResult {
    compile_incremental_with_sources(catalog, graph, previous, affected_node_ids, &[])
}

pub fn compile_incremental_with_sources(
    catalog: &NodeCatalog,
    graph: &NodeGraph,
    previous: Option<&CompilationResult>,
    affected_node_ids: &[String],
    virtual_source_ids: &[String],
) -> CompilationResult {
    let Some(previous) = previous else {
        return compile_with_sources(catalog, graph, virtual_source_ids);
    };
    if graph.nodes.is_empty() || affected_node_ids.len() * 2 > graph.nodes.len() {
        return compile_with_sources(catalog, graph, virtual_source_ids);
    }
    if graph.nodes.len() != previous.metadata.execution_order.len() {
        return compile_with_sources(catalog, graph, virtual_source_ids);
    }

    let mut state = PipelineState::default();
    validate::validate_graph(catalog, graph, &mut state, virtual_source_ids);
    if state.has_errors() {
        return compile_with_sources(catalog, graph, virtual_source_ids);
    }
    let Ok(order) = topo_sort(graph) else {
        return compile_with_sources(catalog, graph, virtual_source_ids);
    };
    let order = virtual_sources_first(graph, order);

    // Unaffected nodes may reorder freely; only the affected nodes' relative
    // order matters for declare-before-use safety.
    let affected: HashSet<&str> = affected_node_ids.iter().map(String::as_str).collect();
    let prev_relative: Vec<&str> = previous
        .metadata
        .execution_order
        .iter()
        .map(String::as_str)
        .filter(|id| affected.contains(id))
        .collect();
    let new_relative: Vec<&str> = order
        .iter()
        .map(String::as_str)
        .filter(|id| affected.contains(id))
        .collect();
    if prev_relative != new_relative {
        return compile_with_sources(catalog, graph, virtual_source_ids);
    }

    state.execution_order = order;
    typecheck::validate_connection_types(catalog, graph, &mut state);
    if state.has_errors() {
        return abort(state);
    }
    run_generation(catalog, graph, state)
}

/// The generation half of the pipeline, shared by the full and incremental
/// entry points.
fn run_generation(
    catalog: &NodeCatalog,
    graph: &NodeGraph,
    mut state: PipelineState,
) -> CompilationResult {
    naming::generate_variable_names(catalog, graph, &mut state);
    uniforms::generate_uniforms(catalog, graph, &mut state);
    let function_block = functions::generate_functions(catalog, graph, &mut state);
    let main = codegen::generate_main_code(catalog, graph, &mut state);

    let emitted = format!("{function_block}\n{}", main.body);
    uniforms::prune_unused_uniforms(&mut state, &emitted);
    let uniform_block = uniforms::uniform_block(&state);
    let uniform_meta = uniforms::uniform_metadata(&state);

    collect_disconnected_warnings(graph, &mut state, main.final_output_node_id.as_deref());

    let shader_code = assemble_fragment_shader(&ShaderSections {
        uniform_block,
        function_block,
        declaration_block: main.declarations,
        body_block: main.body,
        final_color: main.final_color,
    });

    CompilationResult {
        shader_code,
        uniforms: uniform_meta,
        metadata: metadata_from(state, main.final_output_node_id),
    }
}

fn collect_disconnected_warnings(
    graph: &NodeGraph,
    state: &mut PipelineState,
    final_output_node_id: Option<&str>,
) {
    for n in &graph.nodes {
        let connected = graph
            .connections
            .iter()
            .any(|c| c.source_node_id == n.id || c.target_node_id == n.id);
        if !connected && Some(n.id.as_str()) != final_output_node_id {
            state.warnings.push(format!(
                "Node '{}' ({}) is not connected to anything",
                n.id, n.node_type
            ));
        }
    }
}

fn metadata_from(state: PipelineState, final_output_node_id: Option<String>) -> CompilationMetadata {
    CompilationMetadata {
        warnings: state.warnings,
        errors: state.errors,
        execution_order: state.execution_order,
        final_output_node_id,
    }
}

fn abort(state: PipelineState) -> CompilationResult {
    CompilationResult::aborted(metadata_from(state, None))
}
