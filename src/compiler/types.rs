//! Core type definitions for the compiler pipeline.

use std::collections::{HashMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};

/// GLSL value type carried by ports and connections.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    Float,
    Int,
    Vec2,
    Vec3,
    Vec4,
}

impl ValueType {
    pub fn glsl(&self) -> &'static str {
        match self {
            ValueType::Float => "float",
            ValueType::Int => "int",
            ValueType::Vec2 => "vec2",
            ValueType::Vec3 => "vec3",
            ValueType::Vec4 => "vec4",
        }
    }

    pub fn zero_literal(&self) -> &'static str {
        match self {
            ValueType::Float => "0.0",
            ValueType::Int => "0",
            ValueType::Vec2 => "vec2(0.0)",
            ValueType::Vec3 => "vec3(0.0)",
            ValueType::Vec4 => "vec4(0.0)",
        }
    }

    pub fn channels(&self) -> usize {
        match self {
            ValueType::Float | ValueType::Int => 1,
            ValueType::Vec2 => 2,
            ValueType::Vec3 => 3,
            ValueType::Vec4 => 4,
        }
    }
}

/// Declared type of a node parameter.
///
/// `String` and `FloatArray` parameters are compile-time only: strings are
/// resolved during codegen (e.g. swizzle axis patterns) and arrays become
/// inline constants, so neither ever turns into a uniform.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamType {
    Float,
    Int,
    Vec2,
    Vec3,
    Vec4,
    String,
    FloatArray,
}

impl ParamType {
    pub fn as_value_type(&self) -> Option<ValueType> {
        match self {
            ParamType::Float => Some(ValueType::Float),
            ParamType::Int => Some(ValueType::Int),
            ParamType::Vec2 => Some(ValueType::Vec2),
            ParamType::Vec3 => Some(ValueType::Vec3),
            ParamType::Vec4 => Some(ValueType::Vec4),
            ParamType::String | ParamType::FloatArray => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticKind {
    Structural,
    Cycle,
    Type,
}

/// A tagged pipeline finding. Any accumulated error aborts the pipeline at
/// the next stage boundary; warnings accompany an otherwise successful result.
#[derive(Clone, Debug, Serialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub message: String,
}

impl Diagnostic {
    pub fn structural(message: impl Into<String>) -> Self {
        Self {
            kind: DiagnosticKind::Structural,
            message: message.into(),
        }
    }

    pub fn cycle(message: impl Into<String>) -> Self {
        Self {
            kind: DiagnosticKind::Cycle,
            message: message.into(),
        }
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        Self {
            kind: DiagnosticKind::Type,
            message: message.into(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.kind {
            DiagnosticKind::Structural => "structural",
            DiagnosticKind::Cycle => "cycle",
            DiagnosticKind::Type => "type",
        };
        write!(f, "[{tag}] {}", self.message)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UniformCategory {
    /// Backs a node parameter knob.
    Parameter,
    /// Per-frame globals (time, resolution).
    Global,
    /// Mirrors a virtual-source output; written by an external driver.
    External,
}

/// One uniform the host renderer must bind every frame.
#[derive(Clone, Debug, Serialize)]
pub struct UniformMetadata {
    pub name: String,
    #[serde(rename = "nodeId", skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
    #[serde(rename = "paramName", skip_serializing_if = "Option::is_none")]
    pub param_name: Option<String>,
    #[serde(rename = "glslType")]
    pub glsl_type: String,
    #[serde(rename = "defaultValue")]
    pub default_value: serde_json::Value,
    pub category: UniformCategory,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct CompilationMetadata {
    pub warnings: Vec<String>,
    pub errors: Vec<Diagnostic>,
    #[serde(rename = "executionOrder")]
    pub execution_order: Vec<String>,
    #[serde(rename = "finalOutputNodeId")]
    pub final_output_node_id: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct CompilationResult {
    #[serde(rename = "shaderCode")]
    pub shader_code: String,
    pub uniforms: Vec<UniformMetadata>,
    pub metadata: CompilationMetadata,
}

impl CompilationResult {
    /// Empty shader/uniforms carrying whatever diagnostics accumulated.
    pub fn aborted(metadata: CompilationMetadata) -> Self {
        Self {
            shader_code: String::new(),
            uniforms: Vec::new(),
            metadata,
        }
    }

    pub fn has_errors(&self) -> bool {
        !self.metadata.errors.is_empty()
    }
}

/// Internal uniform record kept until liveness pruning decides its fate.
#[derive(Clone, Debug)]
pub struct UniformDecl {
    pub name: String,
    pub glsl_type: String,
    pub default_value: serde_json::Value,
    pub node_id: Option<String>,
    pub param_name: Option<String>,
    pub category: UniformCategory,
}

/// Accumulator state for one `compile()` call.
///
/// Every map here is scoped to the call and discarded afterwards; nothing is
/// shared between compiles.
#[derive(Debug, Default)]
pub struct PipelineState {
    pub errors: Vec<Diagnostic>,
    pub warnings: Vec<String>,
    pub execution_order: Vec<String>,

    /// (node id, output port) -> generated variable name.
    pub variable_names: HashMap<(String, String), String>,
    /// Variable name -> value type, for declarations and promotions.
    pub variable_types: HashMap<String, ValueType>,
    /// Declaration order of the outer-scope output variables.
    pub variable_decl_order: Vec<String>,
    /// (node id, param name) -> inline constant-array identifier.
    pub array_names: HashMap<(String, String), String>,
    /// (node id, param/port name) -> uniform identifier.
    pub uniform_names: HashMap<(String, String), String>,
    pub uniforms: Vec<UniformDecl>,

    /// Every identifier handed out so far; collisions get numeric suffixes.
    pub used_identifiers: HashSet<String>,
}

impl PipelineState {
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn variable_for(&self, node_id: &str, port: &str) -> Option<&str> {
        self.variable_names
            .get(&(node_id.to_string(), port.to_string()))
            .map(String::as_str)
    }
}
