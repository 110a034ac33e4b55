//! Serialized per-function analysis records: control dependence graphs and constants.

use serde::{Deserialize, Serialize};

use super::types::Type;

/// Node value of the synthetic root, standing for "no control dependency".
pub const ROOT_BLOCK: u64 = u64::MAX;

/// Graph as written by the analysis: node values plus index-based edges.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphDescriptor {
    pub nodes: Vec<u64>,
    /// `[from_index, to_index, weight]`; the weight is ignored.
    #[serde(default)]
    pub edges: Vec<(usize, usize, serde_json::Value)>,
}

/// The graph either inline or as an encoded JSON string.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GraphSource {
    Inline(GraphDescriptor),
    Encoded(String),
}

impl GraphSource {
    pub fn decode(&self) -> Result<GraphDescriptor, serde_json::Error> {
        match self {
            GraphSource::Inline(graph) => Ok(graph.clone()),
            GraphSource::Encoded(text) => serde_json::from_str(text),
        }
    }
}

/// A constant harvested from a function body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConstantDescriptor {
    /// Literal value, either a JSON scalar or its textual form.
    pub val: serde_json::Value,
    pub ty: Type,
}

/// Analysis record of one function.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MirObject {
    pub global_id: String,
    pub cdg: GraphSource,
    #[serde(default)]
    pub branches: usize,
    #[serde(default)]
    pub assertions: usize,
    #[serde(default)]
    pub constant_pool: Vec<ConstantDescriptor>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encoded_graph_decodes() {
        let json = r#"{
            "global_id": "lib_foo",
            "cdg": "{\"nodes\":[18446744073709551615,0,1],\"node_holes\":[],\"edge_property\":\"directed\",\"edges\":[[0,1,1],[0,2,1],[0,0,1]]}",
            "branches": 2,
            "assertions": 0,
            "constant_pool": [{"val": 42, "ty": {"Prim": {"Int": "I32"}}}]
        }"#;
        let mir: MirObject = serde_json::from_str(json).unwrap();
        let graph = mir.cdg.decode().unwrap();
        assert_eq!(graph.nodes, vec![ROOT_BLOCK, 0, 1]);
        assert_eq!(graph.edges.len(), 3);
        assert_eq!(mir.constant_pool.len(), 1);
    }

    #[test]
    fn test_inline_graph_decodes() {
        let json = r#"{"global_id": "g", "cdg": {"nodes": [18446744073709551615, 3], "edges": [[0, 1, 1]]}}"#;
        let mir: MirObject = serde_json::from_str(json).unwrap();
        assert!(matches!(mir.cdg, GraphSource::Inline(_)));
        assert_eq!(mir.cdg.decode().unwrap().nodes[1], 3);
    }
}
