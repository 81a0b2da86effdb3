use std::collections::HashMap;

use anyhow::{Result, anyhow};
use serde::Deserialize;

use crate::compiler::types::{ParamType, ValueType};
use crate::dsl::{NodeInstance, ParamInputMode, parse_i64};

const DEFAULT_NODE_CATALOG_JSON: &str = include_str!("../assets/node-catalog.json");

/// Node types whose outputs are assigned from externally-driven uniforms
/// rather than computed expressions. The analyzer schedules these strictly
/// before all other nodes.
pub const VIRTUAL_SOURCE_TYPES: &[&str] = &["audio_input", "audio_bands"];

/// Reserved terminal node kind carrying the final color.
pub const TERMINAL_NODE_TYPE: &str = "output";

/// Node kind compiled by the dedicated swizzle generator.
pub const SWIZZLE_NODE_TYPE: &str = "swizzle";

pub const DYNAMIC_OUTPUT_MIN: usize = 1;
pub const DYNAMIC_OUTPUT_MAX: usize = 16;

pub fn is_virtual_source_type(node_type: &str) -> bool {
    VIRTUAL_SOURCE_TYPES.contains(&node_type)
}

/// Immutable descriptor of one node kind: ports, parameters, and the raw
/// GLSL templates the generators consume. Authored externally; this crate
/// only ships a small built-in set for the CLI and tests.
#[derive(Debug, Clone, Deserialize)]
pub struct NodeSpec {
    pub id: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub inputs: Vec<PortSpec>,
    #[serde(default)]
    pub outputs: Vec<PortSpec>,
    #[serde(default, rename = "dynamicOutputs")]
    pub dynamic_outputs: Option<DynamicOutputs>,
    #[serde(default)]
    pub parameters: Vec<ParamSpec>,
    #[serde(default)]
    pub functions: String,
    #[serde(default, rename = "mainCode")]
    pub main_code: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PortSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: ValueType,
}

/// Output set whose size is derived from one of the instance's own
/// parameters (e.g. a multi-band analyzer). Expanded ports are named
/// `<name_prefix><index>`.
#[derive(Debug, Clone, Deserialize)]
pub struct DynamicOutputs {
    #[serde(rename = "namePrefix")]
    pub name_prefix: String,
    #[serde(rename = "type")]
    pub ty: ValueType,
    #[serde(rename = "countParameter")]
    pub count_parameter: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ParamSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: ParamType,
    #[serde(default)]
    pub default: serde_json::Value,
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
    #[serde(default, rename = "inputMode")]
    pub input_mode: Option<ParamInputMode>,
    /// Runtime-only parameters never become uniforms; their value is either
    /// baked at compile time (arity counts) or driven externally.
    #[serde(default, rename = "runtimeOnly")]
    pub runtime_only: bool,
}

impl NodeSpec {
    pub fn param(&self, name: &str) -> Option<&ParamSpec> {
        self.parameters.iter().find(|p| p.name == name)
    }

    pub fn input(&self, name: &str) -> Option<&PortSpec> {
        self.inputs.iter().find(|p| p.name == name)
    }

    pub fn static_output(&self, name: &str) -> Option<&PortSpec> {
        self.outputs.iter().find(|p| p.name == name)
    }

    /// Number of expanded dynamic outputs for `instance`: the instance's own
    /// count parameter, else the spec default, else the hard minimum.
    pub fn dynamic_output_count(&self, instance: &NodeInstance) -> Option<usize> {
        let dynamic = self.dynamic_outputs.as_ref()?;
        let count = parse_i64(&instance.parameters, &dynamic.count_parameter)
            .or_else(|| {
                self.param(&dynamic.count_parameter)
                    .and_then(|p| p.default.as_i64())
            })
            .unwrap_or(DYNAMIC_OUTPUT_MIN as i64);
        Some((count.max(0) as usize).clamp(DYNAMIC_OUTPUT_MIN, DYNAMIC_OUTPUT_MAX))
    }

    /// Full output list for an instance, dynamic arity expanded.
    pub fn instance_outputs(&self, instance: &NodeInstance) -> Vec<PortSpec> {
        let mut out = self.outputs.clone();
        if let (Some(dynamic), Some(count)) =
            (self.dynamic_outputs.as_ref(), self.dynamic_output_count(instance))
        {
            for i in 0..count {
                out.push(PortSpec {
                    name: format!("{}{}", dynamic.name_prefix, i),
                    ty: dynamic.ty,
                });
            }
        }
        out
    }

    /// Resolve an output port's type for an instance, including expanded
    /// dynamic ports.
    pub fn output_type_for(&self, instance: &NodeInstance, port: &str) -> Option<ValueType> {
        if let Some(p) = self.static_output(port) {
            return Some(p.ty);
        }
        let dynamic = self.dynamic_outputs.as_ref()?;
        let index: usize = port.strip_prefix(&dynamic.name_prefix)?.parse().ok()?;
        let count = self.dynamic_output_count(instance)?;
        (index < count).then_some(dynamic.ty)
    }
}

/// Read-only registry of node specs, keyed by type id.
#[derive(Debug, Clone, Default)]
pub struct NodeCatalog {
    specs: HashMap<String, NodeSpec>,
}

#[derive(Debug, Deserialize)]
struct RawCatalog {
    #[serde(rename = "catalogVersion")]
    #[allow(dead_code)]
    catalog_version: u32,
    nodes: Vec<NodeSpec>,
}

impl NodeCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in catalog bundled with the crate.
    pub fn load_default() -> Result<Self> {
        Self::from_json(DEFAULT_NODE_CATALOG_JSON)
            .map_err(|e| anyhow!("failed to parse assets/node-catalog.json: {e}"))
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let raw: RawCatalog = serde_json::from_str(text)?;
        let mut catalog = Self::new();
        for spec in raw.nodes {
            catalog.register(spec);
        }
        Ok(catalog)
    }

    pub fn register(&mut self, spec: NodeSpec) {
        self.specs.insert(spec.id.clone(), spec);
    }

    pub fn get(&self, node_type: &str) -> Option<&NodeSpec> {
        self.specs.get(node_type)
    }

    pub fn contains(&self, node_type: &str) -> bool {
        self.specs.contains_key(node_type)
    }
}
