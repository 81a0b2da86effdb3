use std::collections::HashMap;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

/// Graph format version this compiler accepts.
pub const GRAPH_FORMAT_VERSION: &str = "1.0";

/// A user-authored node graph: the compiler's sole structured input.
///
/// Owned by the external editor/document layer; the compiler only reads an
/// immutable snapshot per call and never mutates it.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct NodeGraph {
    pub id: String,
    pub name: String,
    pub version: String,
    pub nodes: Vec<NodeInstance>,
    pub connections: Vec<Connection>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct NodeInstance {
    pub id: String,
    #[serde(rename = "type")]
    pub node_type: String,
    #[serde(default)]
    pub parameters: HashMap<String, serde_json::Value>,
    #[serde(default, rename = "parameterInputModes")]
    pub parameter_input_modes: HashMap<String, ParamInputMode>,
}

/// How a connected parameter combines with the knob's static value.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ParamInputMode {
    /// The connection fully replaces the static value.
    Override,
    Add,
    Subtract,
    Multiply,
}

/// A wire. Targets exactly one of `target_port` (data input) or
/// `target_parameter` (parameter drive); the validator rejects anything else.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Connection {
    pub id: String,
    #[serde(rename = "sourceNodeId")]
    pub source_node_id: String,
    #[serde(rename = "sourcePort")]
    pub source_port: String,
    #[serde(rename = "targetNodeId")]
    pub target_node_id: String,
    #[serde(default, rename = "targetPort")]
    pub target_port: Option<String>,
    #[serde(default, rename = "targetParameter")]
    pub target_parameter: Option<String>,
}

impl Connection {
    /// Key identifying the driven input slot, used for fan-in rejection.
    /// Parameter targets get a `param:` marker so a port and a parameter with
    /// the same name stay distinct.
    pub fn target_key(&self) -> String {
        match (&self.target_port, &self.target_parameter) {
            (_, Some(param)) => format!("{}.param:{}", self.target_node_id, param),
            (Some(port), None) => format!("{}.{}", self.target_node_id, port),
            (None, None) => format!("{}.<none>", self.target_node_id),
        }
    }
}

pub fn load_graph_from_path(path: impl AsRef<std::path::Path>) -> Result<NodeGraph> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read graph json at {}", path.display()))?;
    let graph: NodeGraph = serde_json::from_str(&text).context("failed to parse graph json")?;
    if graph.version != GRAPH_FORMAT_VERSION {
        bail!(
            "unsupported graph version '{}' (expected '{}')",
            graph.version,
            GRAPH_FORMAT_VERSION
        );
    }
    Ok(graph)
}

pub fn find_node<'a>(graph: &'a NodeGraph, node_id: &str) -> Option<&'a NodeInstance> {
    graph.nodes.iter().find(|n| n.id == node_id)
}

/// The connection feeding `node_id.<port>`, if any.
pub fn incoming_port_connection<'a>(
    graph: &'a NodeGraph,
    node_id: &str,
    port: &str,
) -> Option<&'a Connection> {
    graph
        .connections
        .iter()
        .find(|c| c.target_node_id == node_id && c.target_port.as_deref() == Some(port))
}

/// The connection driving `node_id`'s parameter `param`, if any.
pub fn incoming_param_connection<'a>(
    graph: &'a NodeGraph,
    node_id: &str,
    param: &str,
) -> Option<&'a Connection> {
    graph
        .connections
        .iter()
        .find(|c| c.target_node_id == node_id && c.target_parameter.as_deref() == Some(param))
}

// ── Param value helpers ──────────────────────────────────────────────────

pub fn parse_f64(params: &HashMap<String, serde_json::Value>, key: &str) -> Option<f64> {
    match params.get(key) {
        Some(v) => v
            .as_f64()
            .or_else(|| v.as_u64().map(|x| x as f64))
            .or_else(|| v.as_i64().map(|x| x as f64)),
        None => None,
    }
}

pub fn parse_i64(params: &HashMap<String, serde_json::Value>, key: &str) -> Option<i64> {
    match params.get(key) {
        Some(v) => v.as_i64().or_else(|| v.as_f64().map(|x| x.floor() as i64)),
        None => None,
    }
}

pub fn parse_str<'a>(params: &'a HashMap<String, serde_json::Value>, key: &str) -> Option<&'a str> {
    params.get(key).and_then(|v| v.as_str())
}

pub fn parse_f64_array(
    params: &HashMap<String, serde_json::Value>,
    key: &str,
) -> Option<Vec<f64>> {
    let arr = params.get(key)?.as_array()?;
    let mut out = Vec::with_capacity(arr.len());
    for v in arr {
        out.push(
            v.as_f64()
                .or_else(|| v.as_i64().map(|x| x as f64))
                .or_else(|| v.as_u64().map(|x| x as f64))?,
        );
    }
    Some(out)
}

pub fn json_number_f64(v: &serde_json::Value) -> Option<f64> {
    v.as_f64()
        .or_else(|| v.as_i64().map(|x| x as f64))
        .or_else(|| v.as_u64().map(|x| x as f64))
}
