//! JSON serialization of configuration trees.
//!
//! The persisted form is a nested document mirroring the tree shape.
//! `parse(serialize(t))` reproduces `t` exactly for any tree, and
//! `serialize(parse(x)) == x` for documents in canonical (pretty,
//! field-ordered) form.

use serde::{Deserialize, Serialize};

use crate::error::{TreeError, TreeResult};
use crate::tree::ConfigTree;
use canopy_core::NodeId;

/// Serialized form of one tree node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRepr {
    /// Element name.
    pub name: String,
    /// Declared namespace, if any.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub namespace: Option<String>,
    /// Attributes as name/value pairs.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub attributes: Vec<(String, String)>,
    /// Body text, if any.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub body: Option<String>,
    /// Child elements, in document order.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub children: Vec<NodeRepr>,
}

impl NodeRepr {
    /// A bare element with the given name.
    pub fn element(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: None,
            attributes: Vec::new(),
            body: None,
            children: Vec::new(),
        }
    }

    /// Set the body text.
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Set the namespace.
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Append a child.
    pub fn with_child(mut self, child: NodeRepr) -> Self {
        self.children.push(child);
        self
    }
}

impl ConfigTree {
    /// Serialized form of a subtree.
    pub fn to_repr(&self, id: NodeId) -> TreeResult<NodeRepr> {
        let mut repr = NodeRepr::element(self.name(id)?.to_string());
        repr.namespace = self.declared_namespace(id)?.map(str::to_string);
        repr.attributes = self.attributes(id);
        repr.body = self.body(id)?;
        for child in self.child_elements(id).collect::<Vec<_>>() {
            repr.children.push(self.to_repr(child)?);
        }
        Ok(repr)
    }

    /// Materialize a serialized subtree under `parent`.
    pub fn build_from_repr(&mut self, parent: NodeId, repr: &NodeRepr) -> TreeResult<NodeId> {
        let id = self.add_element(parent, repr.name.clone(), repr.namespace.as_deref())?;
        for (name, value) in &repr.attributes {
            self.add_attribute(id, name.clone(), value.clone())?;
        }
        if let Some(body) = &repr.body {
            self.add_body(id, body.clone())?;
        }
        for child in &repr.children {
            self.build_from_repr(id, child)?;
        }
        Ok(id)
    }

    /// Serialize the whole tree to canonical JSON.
    pub fn to_json(&self) -> TreeResult<String> {
        let repr = self.to_repr(self.root())?;
        let mut out = serde_json::to_string_pretty(&repr)?;
        out.push('\n');
        Ok(out)
    }

    /// Parse a tree from its JSON form.
    pub fn from_json(input: &str) -> TreeResult<ConfigTree> {
        let repr: NodeRepr = serde_json::from_str(input)?;
        Self::from_repr(&repr)
    }

    /// Materialize a whole tree from its serialized form.
    pub fn from_repr(repr: &NodeRepr) -> TreeResult<ConfigTree> {
        if repr.name != "config" {
            return Err(TreeError::Malformed(format!(
                "root element must be \"config\", got {:?}",
                repr.name
            )));
        }
        let mut tree = ConfigTree::new();
        let root = tree.root();
        if let Some(ns) = &repr.namespace {
            tree.set_namespace(root, Some(ns))?;
        }
        if let Some(body) = &repr.body {
            tree.add_body(root, body.clone())?;
        }
        for (name, value) in &repr.attributes {
            tree.add_attribute(root, name.clone(), value.clone())?;
        }
        for child in &repr.children {
            tree.build_from_repr(root, child)?;
        }
        Ok(tree)
    }
}
