//! The pipeline graph model.
//!
//! The DOT text parser is an external collaborator; it produces this
//! validated AST. Nodes and edges carry free-form typed attributes, with
//! the well-known ones exposed as accessors.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::types::AttrDuration;

/// A typed attribute value on a graph, node, or edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
}

impl AttrValue {
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(n) => Some(*n),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(b) => Some(*b),
            // DOT attribute values are frequently strings; accept the
            // textual booleans too.
            Self::String(s) => match s.as_str() {
                "true" => Some(true),
                "false" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    /// Duration attributes arrive as strings (`"900s"`, `"15m"`).
    #[must_use]
    pub fn as_duration_attr(&self) -> Option<AttrDuration> {
        self.as_str().and_then(|s| AttrDuration::parse(s).ok())
    }

    /// The unquoted textual form.
    #[must_use]
    pub fn to_string_value(&self) -> String {
        match self {
            Self::String(s) => s.clone(),
            Self::Integer(n) => n.to_string(),
            Self::Float(n) => n.to_string(),
            Self::Boolean(b) => b.to_string(),
        }
    }
}

impl From<&str> for AttrValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<i64> for AttrValue {
    fn from(n: i64) -> Self {
        Self::Integer(n)
    }
}

impl From<bool> for AttrValue {
    fn from(b: bool) -> Self {
        Self::Boolean(b)
    }
}

/// Map a DOT shape to its handler type.
///
/// `box` and unknown shapes default to codergen; a plain rectangle is an
/// LLM stage.
#[must_use]
pub fn shape_handler_type(shape: &str) -> &'static str {
    match shape {
        "Mdiamond" => "start",
        "Msquare" => "exit",
        "diamond" => "conditional",
        "hexagon" => "wait.human",
        "parallelogram" => "tool",
        "component" => "parallel",
        "tripleoctagon" => "fan_in",
        _ => "codergen",
    }
}

/// A pipeline node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub attrs: IndexMap<String, AttrValue>,
}

impl Node {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            attrs: IndexMap::new(),
        }
    }

    /// Builder-style attribute setter.
    #[must_use]
    pub fn attr(mut self, key: impl Into<String>, value: impl Into<AttrValue>) -> Self {
        self.attrs.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn get_attr(&self, key: &str) -> Option<&AttrValue> {
        self.attrs.get(key)
    }

    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.attrs.get(key).and_then(AttrValue::as_str)
    }

    #[must_use]
    pub fn get_bool(&self, key: &str) -> bool {
        self.attrs
            .get(key)
            .and_then(AttrValue::as_bool)
            .unwrap_or(false)
    }

    #[must_use]
    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.attrs.get(key).and_then(AttrValue::as_i64)
    }

    /// The node's shape; defaults to `box`.
    #[must_use]
    pub fn shape(&self) -> &str {
        self.get_str("shape").unwrap_or("box")
    }

    /// The node's label; defaults to its id.
    #[must_use]
    pub fn label(&self) -> &str {
        self.get_str("label").unwrap_or(&self.id)
    }

    /// The handler type: an explicit `type` attribute wins over the shape
    /// mapping.
    #[must_use]
    pub fn handler_type(&self) -> &str {
        if let Some(explicit) = self.get_str("type") {
            return explicit;
        }
        shape_handler_type(self.shape())
    }

    /// Whether this node terminates the pipeline.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.handler_type() == "exit"
    }
}

/// A directed edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub from: String,
    pub to: String,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub attrs: IndexMap<String, AttrValue>,
}

impl Edge {
    #[must_use]
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            attrs: IndexMap::new(),
        }
    }

    #[must_use]
    pub fn attr(mut self, key: impl Into<String>, value: impl Into<AttrValue>) -> Self {
        self.attrs.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn get_attr(&self, key: &str) -> Option<&AttrValue> {
        self.attrs.get(key)
    }

    #[must_use]
    pub fn label(&self) -> &str {
        self.attrs
            .get("label")
            .and_then(AttrValue::as_str)
            .unwrap_or("")
    }

    #[must_use]
    pub fn condition(&self) -> &str {
        self.attrs
            .get("condition")
            .and_then(AttrValue::as_str)
            .unwrap_or("")
    }

    /// Edge weight; defaults to 0.
    #[must_use]
    pub fn weight(&self) -> i64 {
        self.attrs
            .get("weight")
            .and_then(AttrValue::as_i64)
            .unwrap_or(0)
    }

    /// Whether traversing this edge restarts the whole pipeline.
    #[must_use]
    pub fn is_loop_restart(&self) -> bool {
        self.attrs
            .get("loop_restart")
            .and_then(AttrValue::as_bool)
            .unwrap_or(false)
    }
}

/// The pipeline definition: graph attributes, nodes by id, ordered edges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Graph {
    pub name: String,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub attrs: IndexMap<String, AttrValue>,
    pub nodes: IndexMap<String, Node>,
    pub edges: Vec<Edge>,
}

impl Graph {
    /// Fallback ids that identify the start node when no `Mdiamond` node
    /// exists.
    pub const START_IDS: &'static [&'static str] = &["start", "Start"];

    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attrs: IndexMap::new(),
            nodes: IndexMap::new(),
            edges: Vec::new(),
        }
    }

    #[must_use]
    pub fn graph_attr(mut self, key: impl Into<String>, value: impl Into<AttrValue>) -> Self {
        self.attrs.insert(key.into(), value.into());
        self
    }

    pub fn add_node(&mut self, node: Node) {
        self.nodes.insert(node.id.clone(), node);
    }

    pub fn add_edge(&mut self, edge: Edge) {
        self.edges.push(edge);
    }

    /// Builder-style node addition.
    #[must_use]
    pub fn node(mut self, node: Node) -> Self {
        self.add_node(node);
        self
    }

    /// Builder-style edge addition.
    #[must_use]
    pub fn edge(mut self, edge: Edge) -> Self {
        self.add_edge(edge);
        self
    }

    #[must_use]
    pub fn get_node(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }

    #[must_use]
    pub fn get_attr(&self, key: &str) -> Option<&AttrValue> {
        self.attrs.get(key)
    }

    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.attrs.get(key).and_then(AttrValue::as_str)
    }

    #[must_use]
    pub fn outgoing_edges(&self, node_id: &str) -> Vec<&Edge> {
        self.edges.iter().filter(|e| e.from == node_id).collect()
    }

    #[must_use]
    pub fn incoming_edges(&self, node_id: &str) -> Vec<&Edge> {
        self.edges.iter().filter(|e| e.to == node_id).collect()
    }

    /// Resolve the start node: first a node with shape `Mdiamond`, then a
    /// node whose id is `start` or `Start`.
    pub fn find_start_node(&self) -> crate::error::PipelineResult<&Node> {
        self.nodes
            .values()
            .find(|n| n.shape() == "Mdiamond")
            .or_else(|| {
                Self::START_IDS
                    .iter()
                    .find_map(|id| self.nodes.get(*id))
            })
            .ok_or(crate::error::PipelineError::NoStartNode)
    }
}
