//! NodeTree - the user-authored DAG.
//!
//! Nodes are kept in insertion order (IndexMap), which is also the tie-break
//! order for scheduling. Links run from an output socket to an input socket;
//! each input holds at most one link.
//!
//! `connect` validates edits as they are made. Trees loaded from disk are not
//! trusted and are validated again by the executor before every run.

use indexmap::IndexMap;
use log::{debug, trace};
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use std::path::Path;
use thiserror::Error;
use uuid::Uuid;

use super::attrs::{AttrValue, Attrs};
use super::node::Node;
use super::node_kind::NodeKind;
use super::socket::{coercion, SocketType};
use super::value::Value;

/// Directed edge `from.from_socket -> to.to_socket`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub from: Uuid,
    pub from_socket: String,
    pub to: Uuid,
    pub to_socket: String,
}

/// Edit-time rejection and persistence failures.
#[derive(Debug, Error)]
pub enum TreeError {
    #[error("unknown node {0}")]
    UnknownNode(Uuid),

    #[error("node '{node}' has no {direction} socket '{socket}'")]
    UnknownSocket {
        node: String,
        socket: String,
        direction: &'static str,
    },

    #[error("cannot link {from} output to {to} input")]
    Incompatible { from: SocketType, to: SocketType },

    #[error("link '{from}' -> '{to}' would create a cycle")]
    Cycle { from: String, to: String },

    #[error("unknown node type '{0}'")]
    UnknownKind(String),

    #[error("tree I/O: {0}")]
    Io(#[from] std::io::Error),

    #[error("tree JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Where an input socket's value comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum InputSource<'a> {
    Link(&'a Link),
    /// Node parameter or socket default
    Literal(Value),
    Missing,
}

#[derive(Debug, Clone, Default)]
pub struct NodeTree {
    pub name: String,
    nodes: IndexMap<Uuid, Node>,
    links: Vec<Link>,
    output: Option<Uuid>,
}

impl NodeTree {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    // === Nodes ===

    pub fn add_node(&mut self, kind: impl Into<NodeKind>, name: &str) -> Uuid {
        self.insert_node(Node::new(kind.into(), name))
    }

    pub fn insert_node(&mut self, node: Node) -> Uuid {
        let id = node.id;
        trace!("Tree '{}': add {} '{}' ({})", self.name, node.type_name(), node.name, id);
        self.nodes.insert(id, node);
        id
    }

    /// Remove a node and every link touching it.
    pub fn remove_node(&mut self, id: Uuid) -> Option<Node> {
        let node = self.nodes.shift_remove(&id)?;
        self.links.retain(|l| l.from != id && l.to != id);
        if self.output == Some(id) {
            self.output = None;
        }
        Some(node)
    }

    pub fn node(&self, id: Uuid) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub fn node_mut(&mut self, id: Uuid) -> Option<&mut Node> {
        self.nodes.get_mut(&id)
    }

    /// Nodes in insertion order
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Insertion index, used as the scheduling tie-break
    pub fn index_of(&self, id: Uuid) -> Option<usize> {
        self.nodes.get_index_of(&id)
    }

    pub fn set_param(&mut self, id: Uuid, key: &str, value: impl Into<AttrValue>) -> Result<(), TreeError> {
        let node = self.nodes.get_mut(&id).ok_or(TreeError::UnknownNode(id))?;
        node.params.set(key, value);
        Ok(())
    }

    // === Output ===

    pub fn set_output(&mut self, id: Uuid) -> Result<(), TreeError> {
        if !self.nodes.contains_key(&id) {
            return Err(TreeError::UnknownNode(id));
        }
        self.output = Some(id);
        Ok(())
    }

    /// Designated output node, else the first `GroupOutput` in insertion order.
    pub fn output_node(&self) -> Option<&Node> {
        match self.output {
            Some(id) => self.nodes.get(&id),
            None => self.nodes.values().find(|n| n.kind.is_output()),
        }
    }

    // === Links ===

    pub fn links(&self) -> &[Link] {
        &self.links
    }

    /// Link an output to an input, replacing any link already on that input.
    pub fn connect(&mut self, from: Uuid, from_socket: &str, to: Uuid, to_socket: &str) -> Result<(), TreeError> {
        let src = self.nodes.get(&from).ok_or(TreeError::UnknownNode(from))?;
        let dst = self.nodes.get(&to).ok_or(TreeError::UnknownNode(to))?;

        let out_def = src.output(from_socket).ok_or_else(|| TreeError::UnknownSocket {
            node: src.name.clone(),
            socket: from_socket.to_string(),
            direction: "output",
        })?;
        let in_def = dst.input(to_socket).ok_or_else(|| TreeError::UnknownSocket {
            node: dst.name.clone(),
            socket: to_socket.to_string(),
            direction: "input",
        })?;
        if coercion(out_def.ty, in_def.ty).is_none() {
            return Err(TreeError::Incompatible {
                from: out_def.ty,
                to: in_def.ty,
            });
        }
        if from == to || self.reaches(to, from) {
            return Err(TreeError::Cycle {
                from: src.name.clone(),
                to: dst.name.clone(),
            });
        }

        debug!("Tree '{}': link {}.{} -> {}.{}", self.name, src.name, from_socket, dst.name, to_socket);
        self.links.retain(|l| !(l.to == to && l.to_socket == to_socket));
        self.links.push(Link {
            from,
            from_socket: from_socket.to_string(),
            to,
            to_socket: to_socket.to_string(),
        });
        Ok(())
    }

    /// Remove the link into `to.to_socket`, if any.
    pub fn disconnect(&mut self, to: Uuid, to_socket: &str) -> Option<Link> {
        let pos = self.links.iter().position(|l| l.to == to && l.to_socket == to_socket)?;
        Some(self.links.remove(pos))
    }

    pub fn input_link(&self, node: Uuid, socket: &str) -> Option<&Link> {
        self.links.iter().find(|l| l.to == node && l.to_socket == socket)
    }

    /// Value source for an input: link, then parameter of the same name,
    /// then the socket default.
    pub fn resolve_input(&self, node: Uuid, socket: &str) -> InputSource<'_> {
        if let Some(link) = self.input_link(node, socket) {
            return InputSource::Link(link);
        }
        let Some(node) = self.nodes.get(&node) else {
            return InputSource::Missing;
        };
        if let Some(value) = node.params.get(socket).map(Value::from_literal) {
            return InputSource::Literal(value);
        }
        match node.input(socket).and_then(|def| def.default) {
            Some(lit) => InputSource::Literal(lit.to_value()),
            None => InputSource::Missing,
        }
    }

    /// Upstream nodes of `node`, in link order, without duplicates.
    pub fn dependencies(&self, node: Uuid) -> Vec<Uuid> {
        let mut seen = HashSet::new();
        self.links
            .iter()
            .filter(|l| l.to == node)
            .map(|l| l.from)
            .filter(|id| seen.insert(*id))
            .collect()
    }

    /// True if `target` is reachable from `start` following links downstream.
    fn reaches(&self, start: Uuid, target: Uuid) -> bool {
        let mut queue = VecDeque::from([start]);
        let mut seen = HashSet::from([start]);
        while let Some(id) = queue.pop_front() {
            if id == target {
                return true;
            }
            for link in self.links.iter().filter(|l| l.from == id) {
                if seen.insert(link.to) {
                    queue.push_back(link.to);
                }
            }
        }
        false
    }

    // === Persistence ===

    pub fn to_json(&self) -> Result<String, TreeError> {
        Ok(serde_json::to_string_pretty(&TreeDoc::from(self))?)
    }

    /// Parse a saved tree. Links are taken as written; run-time validation
    /// catches anything inconsistent.
    pub fn from_json(json: &str) -> Result<Self, TreeError> {
        let doc: TreeDoc = serde_json::from_str(json)?;
        let mut nodes = IndexMap::with_capacity(doc.nodes.len());
        for n in doc.nodes {
            let kind = NodeKind::from_type_name(&n.kind).ok_or_else(|| TreeError::UnknownKind(n.kind.clone()))?;
            let mut node = Node::with_id(n.id, kind, &n.name);
            node.params = n.params;
            nodes.insert(n.id, node);
        }
        Ok(Self {
            name: doc.name,
            nodes,
            links: doc.links,
            output: doc.output,
        })
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), TreeError> {
        std::fs::write(path.as_ref(), self.to_json()?)?;
        debug!("Saved tree '{}' to {}", self.name, path.as_ref().display());
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, TreeError> {
        let tree = Self::from_json(&std::fs::read_to_string(path.as_ref())?)?;
        debug!(
            "Loaded tree '{}' from {} ({} nodes, {} links)",
            tree.name,
            path.as_ref().display(),
            tree.nodes.len(),
            tree.links.len()
        );
        Ok(tree)
    }
}

/// On-disk form: kinds stored by type name.
#[derive(Serialize, Deserialize)]
struct TreeDoc {
    #[serde(default)]
    name: String,
    nodes: Vec<NodeDoc>,
    #[serde(default)]
    links: Vec<Link>,
    #[serde(default)]
    output: Option<Uuid>,
}

#[derive(Serialize, Deserialize)]
struct NodeDoc {
    id: Uuid,
    #[serde(default)]
    name: String,
    kind: String,
    #[serde(default)]
    params: Attrs,
}

impl From<&NodeTree> for TreeDoc {
    fn from(tree: &NodeTree) -> Self {
        TreeDoc {
            name: tree.name.clone(),
            nodes: tree
                .nodes
                .values()
                .map(|n| NodeDoc {
                    id: n.id,
                    name: n.name.clone(),
                    kind: n.type_name().to_string(),
                    params: n.params.clone(),
                })
                .collect(),
            links: tree.links.clone(),
            output: tree.output,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::keys::*;
    use crate::entities::nodes::compositor::MixNode;
    use crate::entities::nodes::output::GroupOutputNode;
    use crate::entities::nodes::scalar::{MathNode, ValueNode};
    use crate::entities::nodes::source::ConstantImageNode;

    #[test]
    fn test_connect_rejects_cycle() {
        let mut tree = NodeTree::new("t");
        let a = tree.add_node(MathNode, "a");
        let b = tree.add_node(MathNode, "b");
        tree.connect(a, S_VALUE, b, S_A).unwrap();

        let err = tree.connect(b, S_VALUE, a, S_A).unwrap_err();
        assert!(matches!(err, TreeError::Cycle { .. }));
        let err = tree.connect(a, S_VALUE, a, S_B).unwrap_err();
        assert!(matches!(err, TreeError::Cycle { .. }));
        assert_eq!(tree.links().len(), 1);
    }

    #[test]
    fn test_connect_checks_types_and_sockets() {
        let mut tree = NodeTree::new("t");
        let img = tree.add_node(ConstantImageNode, "img");
        let val = tree.add_node(ValueNode, "val");
        let out = tree.add_node(GroupOutputNode, "out");

        // Image -> Float is not in the table
        let err = tree.connect(img, S_IMAGE, val, S_VALUE).unwrap_err();
        assert!(matches!(
            err,
            TreeError::Incompatible {
                from: SocketType::Image,
                to: SocketType::Float
            }
        ));
        // Float -> Image broadcasts
        tree.connect(val, S_VALUE, out, S_IMAGE).unwrap();

        let err = tree.connect(img, "colour", out, S_IMAGE).unwrap_err();
        assert!(matches!(err, TreeError::UnknownSocket { direction: "output", .. }));
        let err = tree.connect(img, S_IMAGE, Uuid::new_v4(), S_IMAGE).unwrap_err();
        assert!(matches!(err, TreeError::UnknownNode(_)));
    }

    #[test]
    fn test_connect_replaces_input_link() {
        let mut tree = NodeTree::new("t");
        let a = tree.add_node(ConstantImageNode, "a");
        let b = tree.add_node(ConstantImageNode, "b");
        let out = tree.add_node(GroupOutputNode, "out");
        tree.connect(a, S_IMAGE, out, S_IMAGE).unwrap();
        tree.connect(b, S_IMAGE, out, S_IMAGE).unwrap();

        assert_eq!(tree.links().len(), 1);
        assert_eq!(tree.input_link(out, S_IMAGE).map(|l| l.from), Some(b));
        assert_eq!(tree.dependencies(out), vec![b]);
    }

    #[test]
    fn test_remove_node_drops_links() {
        let mut tree = NodeTree::new("t");
        let a = tree.add_node(ConstantImageNode, "a");
        let out = tree.add_node(GroupOutputNode, "out");
        tree.connect(a, S_IMAGE, out, S_IMAGE).unwrap();
        tree.set_output(out).unwrap();

        tree.remove_node(a);
        assert!(tree.links().is_empty());
        assert_eq!(tree.output_node().map(|n| n.id), Some(out));

        tree.remove_node(out);
        assert!(tree.output_node().is_none());
    }

    #[test]
    fn test_resolve_input_priority() {
        let mut tree = NodeTree::new("t");
        let v = tree.add_node(ValueNode, "v");
        let mix = tree.add_node(MixNode, "mix");

        // Socket default
        assert_eq!(tree.resolve_input(mix, S_FACTOR), InputSource::Literal(Value::Float(1.0)));
        // Parameter beats default
        tree.set_param(mix, S_FACTOR, 0.25f32).unwrap();
        assert_eq!(tree.resolve_input(mix, S_FACTOR), InputSource::Literal(Value::Float(0.25)));
        // Link beats parameter
        tree.connect(v, S_VALUE, mix, S_FACTOR).unwrap();
        assert!(matches!(tree.resolve_input(mix, S_FACTOR), InputSource::Link(_)));
        // Required image without link or default
        assert_eq!(tree.resolve_input(mix, S_A), InputSource::Missing);
    }

    #[test]
    fn test_output_node_fallback() {
        let mut tree = NodeTree::new("t");
        tree.add_node(ConstantImageNode, "a");
        assert!(tree.output_node().is_none());
        let first = tree.add_node(GroupOutputNode, "first");
        tree.add_node(GroupOutputNode, "second");
        assert_eq!(tree.output_node().map(|n| n.id), Some(first));
    }

    #[test]
    fn test_json_roundtrip() {
        let mut tree = NodeTree::new("pose");
        let src = tree.add_node(ConstantImageNode, "src");
        let out = tree.add_node(GroupOutputNode, "out");
        tree.set_param(src, S_VALUE, 0.5f32).unwrap();
        tree.set_param(src, S_WIDTH, 64).unwrap();
        tree.connect(src, S_IMAGE, out, S_IMAGE).unwrap();
        tree.set_output(out).unwrap();

        let path = std::env::temp_dir().join(format!("dream_engine_tree_{}.json", std::process::id()));
        tree.save(&path).unwrap();
        let loaded = NodeTree::load(&path).unwrap();
        let _ = std::fs::remove_file(&path);

        assert_eq!(loaded.name, "pose");
        assert_eq!(loaded.nodes().map(|n| n.id).collect::<Vec<_>>(), vec![src, out]);
        assert_eq!(loaded.node(src), tree.node(src));
        assert_eq!(loaded.links(), tree.links());
        assert_eq!(loaded.output_node().map(|n| n.id), Some(out));
    }

    #[test]
    fn test_from_json_unknown_kind() {
        let json = format!(r#"{{"nodes": [{{"id": "{}", "kind": "Teapot"}}]}}"#, Uuid::new_v4());
        assert!(matches!(NodeTree::from_json(&json), Err(TreeError::UnknownKind(k)) if k == "Teapot"));
    }
}
