//! Shared builders for integration tests.
#![allow(dead_code)]

use std::collections::HashMap;

use shadegraph::dsl::{Connection, NodeGraph, NodeInstance, ParamInputMode};

pub fn node(id: &str, node_type: &str) -> NodeInstance {
    NodeInstance {
        id: id.to_string(),
        node_type: node_type.to_string(),
        parameters: HashMap::new(),
        parameter_input_modes: HashMap::new(),
    }
}

pub fn node_with_params(id: &str, node_type: &str, params: serde_json::Value) -> NodeInstance {
    NodeInstance {
        id: id.to_string(),
        node_type: node_type.to_string(),
        parameters: serde_json::from_value(params).unwrap(),
        parameter_input_modes: HashMap::new(),
    }
}

pub fn with_input_mode(mut n: NodeInstance, param: &str, mode: ParamInputMode) -> NodeInstance {
    n.parameter_input_modes.insert(param.to_string(), mode);
    n
}

pub fn port_wire(id: &str, from: &str, from_port: &str, to: &str, to_port: &str) -> Connection {
    Connection {
        id: id.to_string(),
        source_node_id: from.to_string(),
        source_port: from_port.to_string(),
        target_node_id: to.to_string(),
        target_port: Some(to_port.to_string()),
        target_parameter: None,
    }
}

pub fn param_wire(id: &str, from: &str, from_port: &str, to: &str, param: &str) -> Connection {
    Connection {
        id: id.to_string(),
        source_node_id: from.to_string(),
        source_port: from_port.to_string(),
        target_node_id: to.to_string(),
        target_port: None,
        target_parameter: Some(param.to_string()),
    }
}

pub fn graph(nodes: Vec<NodeInstance>, connections: Vec<Connection>) -> NodeGraph {
    NodeGraph {
        id: "test-graph".to_string(),
        name: "test".to_string(),
        version: "1.0".to_string(),
        nodes,
        connections,
    }
}
