//! Arena configuration tree.

use canopy_core::{Flags, NodeId, RpcError, RpcErrors, SpecId};

use crate::error::{TreeError, TreeResult};
use crate::schema::Schema;

/// Node kinds of a configuration tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// Named container, list entry or leaf.
    Element,
    /// Name/value attribute attached to an element.
    Attribute,
    /// Leaf text.
    Body,
}

#[derive(Debug, Clone)]
struct Node {
    kind: NodeKind,
    name: String,
    namespace: Option<String>,
    value: Option<String>,
    spec: Option<SpecId>,
    flags: Flags,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

impl Node {
    fn element(name: String, namespace: Option<String>, parent: Option<NodeId>) -> Self {
        Self {
            kind: NodeKind::Element,
            name,
            namespace,
            value: None,
            spec: None,
            flags: Flags::empty(),
            parent,
            children: Vec::new(),
        }
    }
}

/// A rooted, ordered configuration tree.
///
/// Nodes are arena-allocated and addressed by `NodeId` handles. Handles
/// from one tree are meaningless in another. Removed subtrees leave
/// tombstone slots; handles to removed nodes are rejected.
#[derive(Debug, Clone)]
pub struct ConfigTree {
    nodes: Vec<Option<Node>>,
    root: NodeId,
}

impl Default for ConfigTree {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigTree {
    /// Create a tree holding only the root element.
    pub fn new() -> Self {
        let root = Node::element("config".to_string(), None, None);
        Self {
            nodes: vec![Some(root)],
            root: NodeId::new(0),
        }
    }

    /// The root element.
    pub fn root(&self) -> NodeId {
        self.root
    }

    fn node(&self, id: NodeId) -> TreeResult<&Node> {
        self.nodes
            .get(id.index())
            .and_then(|slot| slot.as_ref())
            .ok_or(TreeError::InvalidNode(id))
    }

    fn node_mut(&mut self, id: NodeId) -> TreeResult<&mut Node> {
        self.nodes
            .get_mut(id.index())
            .and_then(|slot| slot.as_mut())
            .ok_or(TreeError::InvalidNode(id))
    }

    fn alloc(&mut self, node: Node) -> NodeId {
        let id = NodeId::new(self.nodes.len() as u32);
        self.nodes.push(Some(node));
        id
    }

    /// True if the handle refers to a live node.
    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes
            .get(id.index())
            .map(|slot| slot.is_some())
            .unwrap_or(false)
    }

    /// True if the root has no element children.
    pub fn is_empty(&self) -> bool {
        self.child_elements(self.root).next().is_none()
    }

    // ========== Construction ==========

    /// Append a new element under `parent`.
    pub fn add_element(
        &mut self,
        parent: NodeId,
        name: impl Into<String>,
        namespace: Option<&str>,
    ) -> TreeResult<NodeId> {
        if self.node(parent)?.kind != NodeKind::Element {
            return Err(TreeError::NotAnElement(parent));
        }
        let node = Node::element(name.into(), namespace.map(str::to_string), Some(parent));
        let id = self.alloc(node);
        self.node_mut(parent)?.children.push(id);
        Ok(id)
    }

    /// Append an attribute node under `parent`.
    pub fn add_attribute(
        &mut self,
        parent: NodeId,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> TreeResult<NodeId> {
        if self.node(parent)?.kind != NodeKind::Element {
            return Err(TreeError::NotAnElement(parent));
        }
        let node = Node {
            kind: NodeKind::Attribute,
            name: name.into(),
            namespace: None,
            value: Some(value.into()),
            spec: None,
            flags: Flags::empty(),
            parent: Some(parent),
            children: Vec::new(),
        };
        let id = self.alloc(node);
        self.node_mut(parent)?.children.push(id);
        Ok(id)
    }

    /// Append a body (text) node under `parent`.
    pub fn add_body(&mut self, parent: NodeId, text: impl Into<String>) -> TreeResult<NodeId> {
        if self.node(parent)?.kind != NodeKind::Element {
            return Err(TreeError::NotAnElement(parent));
        }
        let node = Node {
            kind: NodeKind::Body,
            name: "body".to_string(),
            namespace: None,
            value: Some(text.into()),
            spec: None,
            flags: Flags::empty(),
            parent: Some(parent),
            children: Vec::new(),
        };
        let id = self.alloc(node);
        self.node_mut(parent)?.children.push(id);
        Ok(id)
    }

    /// Replace the body children of `element` with a single text node.
    pub fn set_body(&mut self, element: NodeId, text: impl Into<String>) -> TreeResult<()> {
        let bodies: Vec<NodeId> = self
            .children(element)?
            .iter()
            .copied()
            .filter(|c| self.kind(*c) == Some(NodeKind::Body))
            .collect();
        for body in bodies {
            self.remove(body)?;
        }
        self.add_body(element, text)?;
        Ok(())
    }

    /// Convenience: append a leaf element carrying a body text.
    pub fn add_leaf(
        &mut self,
        parent: NodeId,
        name: impl Into<String>,
        namespace: Option<&str>,
        text: impl Into<String>,
    ) -> TreeResult<NodeId> {
        let leaf = self.add_element(parent, name, namespace)?;
        self.add_body(leaf, text)?;
        Ok(leaf)
    }

    // ========== Accessors ==========

    /// Node kind, if the handle is live.
    pub fn kind(&self, id: NodeId) -> Option<NodeKind> {
        self.node(id).ok().map(|n| n.kind)
    }

    /// Node name.
    pub fn name(&self, id: NodeId) -> TreeResult<&str> {
        Ok(&self.node(id)?.name)
    }

    /// Rename a node.
    pub fn set_name(&mut self, id: NodeId, name: impl Into<String>) -> TreeResult<()> {
        self.node_mut(id)?.name = name.into();
        Ok(())
    }

    /// Declared namespace of the node itself (no inheritance).
    pub fn declared_namespace(&self, id: NodeId) -> TreeResult<Option<&str>> {
        Ok(self.node(id)?.namespace.as_deref())
    }

    /// Effective namespace: the node's own, or the nearest ancestor's.
    pub fn namespace_of(&self, id: NodeId) -> TreeResult<Option<&str>> {
        let mut cur = Some(id);
        while let Some(n) = cur {
            let node = self.node(n)?;
            if node.namespace.is_some() {
                return Ok(node.namespace.as_deref());
            }
            cur = node.parent;
        }
        Ok(None)
    }

    /// Set the declared namespace.
    pub fn set_namespace(&mut self, id: NodeId, namespace: Option<&str>) -> TreeResult<()> {
        self.node_mut(id)?.namespace = namespace.map(str::to_string);
        Ok(())
    }

    /// Value of an attribute or body node.
    pub fn value(&self, id: NodeId) -> TreeResult<Option<&str>> {
        Ok(self.node(id)?.value.as_deref())
    }

    /// Concatenated body text of an element, `None` if it has no body.
    pub fn body(&self, id: NodeId) -> TreeResult<Option<String>> {
        let node = self.node(id)?;
        let mut text: Option<String> = None;
        for child in &node.children {
            let c = self.node(*child)?;
            if c.kind == NodeKind::Body {
                if let Some(v) = &c.value {
                    text.get_or_insert_with(String::new).push_str(v);
                }
            }
        }
        Ok(text)
    }

    /// Body text of the first child element with the given name.
    pub fn child_body(&self, parent: NodeId, name: &str) -> TreeResult<Option<String>> {
        match self.find_child(parent, name)? {
            Some(child) => self.body(child),
            None => Ok(None),
        }
    }

    /// First child element with the given name.
    pub fn find_child(&self, parent: NodeId, name: &str) -> TreeResult<Option<NodeId>> {
        for child in self.child_elements(parent) {
            if self.node(child)?.name == name {
                return Ok(Some(child));
            }
        }
        Ok(None)
    }

    /// Parent handle.
    pub fn parent(&self, id: NodeId) -> TreeResult<Option<NodeId>> {
        Ok(self.node(id)?.parent)
    }

    /// All children, in document order.
    pub fn children(&self, id: NodeId) -> TreeResult<&[NodeId]> {
        Ok(&self.node(id)?.children)
    }

    /// Element children, in document order.
    pub fn child_elements(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        let children = match self.node(id) {
            Ok(n) => n.children.clone(),
            Err(_) => Vec::new(),
        };
        children
            .into_iter()
            .filter(move |c| self.kind(*c) == Some(NodeKind::Element))
    }

    /// Attribute children as (name, value) pairs.
    pub fn attributes(&self, id: NodeId) -> Vec<(String, String)> {
        let mut attrs = Vec::new();
        if let Ok(node) = self.node(id) {
            for child in &node.children {
                if let Ok(c) = self.node(*child) {
                    if c.kind == NodeKind::Attribute {
                        attrs.push((c.name.clone(), c.value.clone().unwrap_or_default()));
                    }
                }
            }
        }
        attrs
    }

    /// Value of an attribute by name.
    pub fn attribute(&self, id: NodeId, name: &str) -> Option<String> {
        self.attributes(id)
            .into_iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    /// Remove an attribute by name, if present.
    pub fn remove_attribute(&mut self, id: NodeId, name: &str) -> TreeResult<()> {
        let attrs: Vec<NodeId> = self
            .children(id)?
            .iter()
            .copied()
            .filter(|c| {
                self.kind(*c) == Some(NodeKind::Attribute)
                    && self.name(*c).map(|n| n == name).unwrap_or(false)
            })
            .collect();
        for attr in attrs {
            self.remove(attr)?;
        }
        Ok(())
    }

    /// Schema statement bound to this node.
    pub fn spec(&self, id: NodeId) -> Option<SpecId> {
        self.node(id).ok().and_then(|n| n.spec)
    }

    /// Bind a node to a schema statement.
    pub fn set_spec(&mut self, id: NodeId, spec: Option<SpecId>) -> TreeResult<()> {
        self.node_mut(id)?.spec = spec;
        Ok(())
    }

    /// True if the element has no element children (a leaf position).
    pub fn is_leaf_shaped(&self, id: NodeId) -> bool {
        self.child_elements(id).next().is_none()
    }

    // ========== Flags ==========

    /// Flags of a node.
    pub fn flags(&self, id: NodeId) -> Flags {
        self.node(id).map(|n| n.flags).unwrap_or_default()
    }

    /// Set flags on a single node.
    pub fn set_flag(&mut self, id: NodeId, flags: Flags) -> TreeResult<()> {
        self.node_mut(id)?.flags.set(flags);
        Ok(())
    }

    /// Clear flags on a single node.
    pub fn clear_flag(&mut self, id: NodeId, flags: Flags) -> TreeResult<()> {
        self.node_mut(id)?.flags.clear(flags);
        Ok(())
    }

    /// Set flags on every element of a subtree, root included.
    pub fn set_flag_subtree(&mut self, id: NodeId, flags: Flags) -> TreeResult<()> {
        for node in self.descendants(id) {
            self.node_mut(node)?.flags.set(flags);
        }
        Ok(())
    }

    /// Set flags on every ancestor of a node, root included, node excluded.
    pub fn set_flag_ancestors(&mut self, id: NodeId, flags: Flags) -> TreeResult<()> {
        let mut cur = self.node(id)?.parent;
        while let Some(n) = cur {
            let node = self.node_mut(n)?;
            node.flags.set(flags);
            cur = node.parent;
        }
        Ok(())
    }

    /// Clear flags on every node of the tree.
    pub fn reset_flags(&mut self, flags: Flags) {
        for slot in self.nodes.iter_mut().flatten() {
            slot.flags.clear(flags);
        }
    }

    /// Preorder handles of a subtree (elements only), root first.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(n) = stack.pop() {
            if self.kind(n) != Some(NodeKind::Element) {
                continue;
            }
            out.push(n);
            // Push in reverse so children pop in document order.
            if let Ok(node) = self.node(n) {
                for child in node.children.iter().rev() {
                    stack.push(*child);
                }
            }
        }
        out
    }

    // ========== Structural edits ==========

    /// Remove a subtree. The root cannot be removed.
    pub fn remove(&mut self, id: NodeId) -> TreeResult<()> {
        if id == self.root {
            return Err(TreeError::RootImmovable);
        }
        let parent = self.node(id)?.parent;
        if let Some(p) = parent {
            self.node_mut(p)?.children.retain(|c| *c != id);
        }
        // Tombstone the whole subtree.
        let mut stack = vec![id];
        while let Some(n) = stack.pop() {
            if let Some(slot) = self.nodes.get_mut(n.index()) {
                if let Some(node) = slot.take() {
                    stack.extend(node.children);
                }
            }
        }
        Ok(())
    }

    /// Detach a subtree and append it under a new parent.
    pub fn move_node(&mut self, id: NodeId, new_parent: NodeId) -> TreeResult<()> {
        if id == self.root {
            return Err(TreeError::RootImmovable);
        }
        if self.node(new_parent)?.kind != NodeKind::Element {
            return Err(TreeError::NotAnElement(new_parent));
        }
        // Guard against moving under the node's own subtree.
        let mut cur = Some(new_parent);
        while let Some(n) = cur {
            if n == id {
                return Err(TreeError::MoveIntoSelf(id));
            }
            cur = self.node(n)?.parent;
        }
        if let Some(p) = self.node(id)?.parent {
            self.node_mut(p)?.children.retain(|c| *c != id);
        }
        self.node_mut(id)?.parent = Some(new_parent);
        self.node_mut(new_parent)?.children.push(id);
        Ok(())
    }

    /// Deep-copy a subtree from another tree under `parent`, returning
    /// the handle of the copy. Flags and spec bindings are not copied.
    pub fn copy_from(
        &mut self,
        parent: NodeId,
        other: &ConfigTree,
        src: NodeId,
    ) -> TreeResult<NodeId> {
        let src_node = other.node(src)?;
        let id = match src_node.kind {
            NodeKind::Element => {
                self.add_element(parent, src_node.name.clone(), src_node.namespace.as_deref())?
            }
            NodeKind::Attribute => self.add_attribute(
                parent,
                src_node.name.clone(),
                src_node.value.clone().unwrap_or_default(),
            )?,
            NodeKind::Body => {
                self.add_body(parent, src_node.value.clone().unwrap_or_default())?
            }
        };
        for child in &src_node.children {
            self.copy_from(id, other, *child)?;
        }
        Ok(id)
    }

    /// Deep-copy every child of `src` in `other` under `parent`.
    pub fn copy_children_from(
        &mut self,
        parent: NodeId,
        other: &ConfigTree,
        src: NodeId,
    ) -> TreeResult<()> {
        let children = other.node(src)?.children.clone();
        for child in children {
            self.copy_from(parent, other, child)?;
        }
        Ok(())
    }

    /// Remove every child of an element, keeping the element itself.
    pub fn clear_children(&mut self, id: NodeId) -> TreeResult<()> {
        let children = self.node(id)?.children.clone();
        for child in children {
            self.remove(child)?;
        }
        Ok(())
    }

    // ========== Comparison ==========

    /// Structural equality of two trees: names, namespaces, attribute
    /// and body values, and child order. Flags and bindings are ignored.
    pub fn deep_equal(&self, other: &ConfigTree) -> bool {
        self.node_equal(self.root, other, other.root)
    }

    fn node_equal(&self, a: NodeId, other: &ConfigTree, b: NodeId) -> bool {
        let (na, nb) = match (self.node(a), other.node(b)) {
            (Ok(na), Ok(nb)) => (na, nb),
            _ => return false,
        };
        if na.kind != nb.kind
            || na.name != nb.name
            || na.namespace != nb.namespace
            || na.value != nb.value
            || na.children.len() != nb.children.len()
        {
            return false;
        }
        na.children
            .iter()
            .zip(nb.children.iter())
            .all(|(ca, cb)| self.node_equal(*ca, other, *cb))
    }

    // ========== Schema binding and sorting ==========

    /// Bind every element to its schema statement.
    ///
    /// Accumulates an `unknown-element` error for every element with no
    /// matching statement; bound siblings keep their bindings either way.
    pub fn bind(&mut self, schema: &dyn Schema) -> Result<(), RpcErrors> {
        let mut errors = RpcErrors::new();
        let root = self.root;
        self.bind_children(root, None, schema, &mut errors);
        errors.into_result()
    }

    fn bind_children(
        &mut self,
        parent: NodeId,
        parent_spec: Option<SpecId>,
        schema: &dyn Schema,
        errors: &mut RpcErrors,
    ) {
        let children: Vec<NodeId> = self.child_elements(parent).collect();
        for child in children {
            let ns = self
                .namespace_of(child)
                .ok()
                .flatten()
                .map(str::to_string);
            let name = match self.name(child) {
                Ok(n) => n.to_string(),
                Err(_) => continue,
            };
            let spec = match parent_spec {
                None => schema.root_child(ns.as_deref(), &name),
                Some(p) => schema.child_of(p, ns.as_deref(), &name),
            };
            match spec {
                Some(s) => {
                    let _ = self.set_spec(child, Some(s));
                    self.bind_children(child, Some(s), schema, errors);
                }
                None => {
                    errors.push(RpcError::unknown_element(
                        self.path_of(child),
                        format!("unknown element: {}", name),
                    ));
                }
            }
        }
    }

    /// Sort element children into canonical order, recursively.
    ///
    /// Siblings order by (namespace, name), list entries additionally by
    /// their key tuple and leaf-list entries by body. Entries of
    /// `ordered-by user` statements keep their document order.
    pub fn sort_recurse(&mut self, schema: &dyn Schema) -> TreeResult<()> {
        let all = self.descendants(self.root);
        for id in all {
            self.sort_children(id, schema)?;
        }
        Ok(())
    }

    fn sort_children(&mut self, id: NodeId, schema: &dyn Schema) -> TreeResult<()> {
        let children = self.node(id)?.children.clone();
        let mut attrs = Vec::new();
        let mut elements = Vec::new();
        let mut bodies = Vec::new();
        for child in children {
            match self.kind(child) {
                Some(NodeKind::Attribute) => attrs.push(child),
                Some(NodeKind::Element) => elements.push(child),
                Some(NodeKind::Body) => bodies.push(child),
                None => {}
            }
        }
        let mut keyed: Vec<(String, NodeId)> = elements
            .iter()
            .map(|e| (self.sort_key(*e, schema), *e))
            .collect();
        keyed.sort_by(|a, b| a.0.cmp(&b.0));
        let mut ordered = attrs;
        ordered.extend(keyed.into_iter().map(|(_, e)| e));
        ordered.extend(bodies);
        self.node_mut(id)?.children = ordered;
        Ok(())
    }

    fn sort_key(&self, id: NodeId, schema: &dyn Schema) -> String {
        let ns = self.namespace_of(id).ok().flatten().unwrap_or("").to_string();
        let name = self.name(id).map(str::to_string).unwrap_or_default();
        let mut key = format!("{}\u{1}{}", ns, name);
        if let Some(spec) = self.spec(id) {
            if schema.ordered_by_user(spec) {
                // Stable sort keeps document order among equal keys.
                return key;
            }
            let list_keys = schema.list_keys(spec);
            if !list_keys.is_empty() {
                for k in list_keys {
                    key.push('\u{1}');
                    if let Ok(Some(v)) = self.child_body(id, k) {
                        key.push_str(&v);
                    }
                }
                return key;
            }
            if schema.is_leaf_list(spec) {
                key.push('\u{1}');
                if let Ok(Some(body)) = self.body(id) {
                    key.push_str(&body);
                }
            }
        }
        key
    }

    // ========== Paths ==========

    /// Human-readable path to a node, with list-key predicates, for
    /// error reporting.
    pub fn path_of(&self, id: NodeId) -> String {
        let mut segments = Vec::new();
        let mut cur = Some(id);
        while let Some(n) = cur {
            if n == self.root {
                break;
            }
            let node = match self.node(n) {
                Ok(node) => node,
                Err(_) => break,
            };
            segments.push(node.name.clone());
            cur = node.parent;
        }
        segments.reverse();
        format!("/{}", segments.join("/"))
    }
}
