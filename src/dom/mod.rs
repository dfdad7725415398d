//! A small owned document tree.
//!
//! Elements keep their tag and attribute names exactly as written; every
//! lookup compares names ASCII case-insensitively. Form controls carry a live
//! `value` and `checked` state next to their markup attributes, the same split
//! a browser keeps between the `value` attribute and the current value.

use std::sync::{Arc, RwLock};

use thiserror::Error;

pub type SharedDocument = Arc<RwLock<Document>>;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct NodeId(usize);

impl NodeId {
    pub const fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum DomError {
    #[error("node {0:?} does not exist or was removed")]
    UnknownNode(NodeId),
    #[error("node {0:?} is not an element")]
    NotAnElement(NodeId),
    #[error("appending {child:?} under {parent:?} would create a cycle")]
    Cycle { parent: NodeId, child: NodeId },
}

pub type DomResult<T> = Result<T, DomError>;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Attribute {
    pub name: String,
    pub value: String,
}

#[derive(Clone, Debug)]
enum NodeData {
    Element {
        tag: String,
        attributes: Vec<Attribute>,
    },
    Text(String),
}

#[derive(Clone, Debug)]
struct Node {
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    data: NodeData,
    value: Option<String>,
    checked: Option<bool>,
    removed: bool,
}

impl Node {
    fn new(data: NodeData) -> Self {
        Self {
            parent: None,
            children: Vec::new(),
            data,
            value: None,
            checked: None,
            removed: false,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Document {
    nodes: Vec<Node>,
    body: NodeId,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    pub fn new() -> Self {
        Self {
            nodes: vec![Node::new(NodeData::Element {
                tag: "body".to_string(),
                attributes: Vec::new(),
            })],
            body: NodeId(0),
        }
    }

    pub fn shared(self) -> SharedDocument {
        Arc::new(RwLock::new(self))
    }

    pub fn body(&self) -> NodeId {
        self.body
    }

    pub fn create_element(&mut self, tag: impl Into<String>) -> NodeId {
        self.push(NodeData::Element {
            tag: tag.into(),
            attributes: Vec::new(),
        })
    }

    pub fn create_text(&mut self, text: impl Into<String>) -> NodeId {
        self.push(NodeData::Text(text.into()))
    }

    pub fn element(&mut self, tag: impl Into<String>) -> ElementBuilder<'_> {
        ElementBuilder {
            document: self,
            tag: tag.into(),
            attributes: Vec::new(),
            text: None,
        }
    }

    pub fn contains(&self, node: NodeId) -> bool {
        self.node(node).is_some()
    }

    pub fn is_connected(&self, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(id) = current {
            if id == self.body {
                return true;
            }
            current = self.node(id).and_then(|n| n.parent);
        }
        false
    }

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> DomResult<()> {
        if !self.is_element(parent) {
            return Err(self.missing_or_not_element(parent));
        }
        self.node(child).ok_or(DomError::UnknownNode(child))?;

        let mut ancestor = Some(parent);
        while let Some(id) = ancestor {
            if id == child {
                return Err(DomError::Cycle { parent, child });
            }
            ancestor = self.node(id).and_then(|n| n.parent);
        }

        self.detach(child);
        self.nodes[parent.0].children.push(child);
        self.nodes[child.0].parent = Some(parent);
        Ok(())
    }

    /// Detaches `node` and marks its whole subtree as gone. Handles to removed
    /// nodes stay valid ids but every accessor answers as if they were absent.
    pub fn remove(&mut self, node: NodeId) -> DomResult<()> {
        if node == self.body {
            return Err(DomError::NotAnElement(node));
        }
        self.node(node).ok_or(DomError::UnknownNode(node))?;
        self.detach(node);
        let mut stack = vec![node];
        while let Some(id) = stack.pop() {
            let entry = &mut self.nodes[id.0];
            entry.removed = true;
            stack.extend(entry.children.iter().copied());
        }
        Ok(())
    }

    pub fn tag_name(&self, node: NodeId) -> Option<&str> {
        match &self.node(node)?.data {
            NodeData::Element { tag, .. } => Some(tag.as_str()),
            NodeData::Text(_) => None,
        }
    }

    pub fn has_tag(&self, node: NodeId, tag: &str) -> bool {
        self.tag_name(node)
            .is_some_and(|name| name.eq_ignore_ascii_case(tag))
    }

    pub fn is_element(&self, node: NodeId) -> bool {
        self.tag_name(node).is_some()
    }

    pub fn attr(&self, node: NodeId, name: &str) -> Option<&str> {
        self.attributes(node)?
            .iter()
            .find(|attribute| attribute.name.eq_ignore_ascii_case(name))
            .map(|attribute| attribute.value.as_str())
    }

    pub fn has_attr(&self, node: NodeId, name: &str) -> bool {
        self.attr(node, name).is_some()
    }

    pub fn attributes(&self, node: NodeId) -> Option<&[Attribute]> {
        match &self.node(node)?.data {
            NodeData::Element { attributes, .. } => Some(attributes),
            NodeData::Text(_) => None,
        }
    }

    pub fn set_attr(
        &mut self,
        node: NodeId,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> DomResult<()> {
        let name = name.into();
        let value = value.into();
        let attributes = self.attributes_mut(node)?;
        match attributes
            .iter_mut()
            .find(|attribute| attribute.name.eq_ignore_ascii_case(&name))
        {
            Some(existing) => existing.value = value,
            None => attributes.push(Attribute { name, value }),
        }
        Ok(())
    }

    pub fn remove_attr(&mut self, node: NodeId, name: &str) -> DomResult<bool> {
        let attributes = self.attributes_mut(node)?;
        let before = attributes.len();
        attributes.retain(|attribute| !attribute.name.eq_ignore_ascii_case(name));
        Ok(attributes.len() != before)
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.node(node)?.parent
    }

    pub fn children(&self, node: NodeId) -> &[NodeId] {
        self.node(node)
            .map(|n| n.children.as_slice())
            .unwrap_or_default()
    }

    /// Pre-order walk below `node`, excluding `node` itself.
    pub fn descendants(&self, node: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = self.children(node).iter().rev().copied().collect::<Vec<_>>();
        while let Some(id) = stack.pop() {
            out.push(id);
            stack.extend(self.children(id).iter().rev().copied());
        }
        out
    }

    pub fn text_content(&self, node: NodeId) -> Option<String> {
        let entry = self.node(node)?;
        if let NodeData::Text(text) = &entry.data {
            return Some(text.clone());
        }
        let mut out = String::new();
        for id in self.descendants(node) {
            if let Some(NodeData::Text(text)) = self.node(id).map(|n| &n.data) {
                out.push_str(text);
            }
        }
        Some(out)
    }

    pub fn set_text_content(&mut self, node: NodeId, text: impl Into<String>) -> DomResult<()> {
        let entry = self.node(node).ok_or(DomError::UnknownNode(node))?;
        if let NodeData::Text(_) = entry.data {
            self.nodes[node.0].data = NodeData::Text(text.into());
            return Ok(());
        }
        for child in entry.children.clone() {
            self.remove(child)?;
        }
        let text_node = self.create_text(text);
        self.append_child(node, text_node)
    }

    /// The live value set by user edits, if any. Falls back to nothing; use
    /// [`Document::control_value`] for the value a form control reports.
    pub fn dirty_value(&self, node: NodeId) -> Option<&str> {
        self.node(node)?.value.as_deref()
    }

    pub fn set_value(&mut self, node: NodeId, value: impl Into<String>) -> DomResult<()> {
        if !self.is_element(node) {
            return Err(self.missing_or_not_element(node));
        }
        self.nodes[node.0].value = Some(value.into());
        Ok(())
    }

    /// Current value of a form control: the live value when edited, else the
    /// markup default (`value` attribute, textarea text, selected option).
    pub fn control_value(&self, node: NodeId) -> Option<String> {
        if !self.is_element(node) {
            return None;
        }
        if let Some(value) = self.dirty_value(node) {
            return Some(value.to_string());
        }
        if self.has_tag(node, "textarea") {
            return self.text_content(node);
        }
        if self.has_tag(node, "select") {
            return Some(self.selected_option_value(node).unwrap_or_default());
        }
        Some(self.attr(node, "value").unwrap_or_default().to_string())
    }

    pub fn checked(&self, node: NodeId) -> Option<bool> {
        let entry = self.node(node)?;
        if !self.is_element(node) {
            return None;
        }
        Some(entry.checked.unwrap_or_else(|| self.has_attr(node, "checked")))
    }

    pub fn set_checked(&mut self, node: NodeId, checked: bool) -> DomResult<()> {
        if !self.is_element(node) {
            return Err(self.missing_or_not_element(node));
        }
        self.nodes[node.0].checked = Some(checked);
        Ok(())
    }

    fn selected_option_value(&self, select: NodeId) -> Option<String> {
        let options = self
            .descendants(select)
            .into_iter()
            .filter(|id| self.has_tag(*id, "option"))
            .collect::<Vec<_>>();
        let selected = options
            .iter()
            .copied()
            .find(|id| self.checked(*id).unwrap_or(false) || self.has_attr(*id, "selected"))
            .or_else(|| {
                (!self.has_attr(select, "multiple"))
                    .then(|| options.first().copied())
                    .flatten()
            })?;
        match self.attr(selected, "value") {
            Some(value) => Some(value.to_string()),
            None => self.text_content(selected).map(|text| text.trim().to_string()),
        }
    }

    fn push(&mut self, data: NodeData) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node::new(data));
        id
    }

    fn node(&self, node: NodeId) -> Option<&Node> {
        self.nodes.get(node.0).filter(|entry| !entry.removed)
    }

    fn attributes_mut(&mut self, node: NodeId) -> DomResult<&mut Vec<Attribute>> {
        let entry = self
            .nodes
            .get_mut(node.0)
            .filter(|entry| !entry.removed)
            .ok_or(DomError::UnknownNode(node))?;
        match &mut entry.data {
            NodeData::Element { attributes, .. } => Ok(attributes),
            NodeData::Text(_) => Err(DomError::NotAnElement(node)),
        }
    }

    fn detach(&mut self, node: NodeId) {
        if let Some(parent) = self.nodes[node.0].parent.take() {
            self.nodes[parent.0].children.retain(|id| *id != node);
        }
    }

    fn missing_or_not_element(&self, node: NodeId) -> DomError {
        if self.contains(node) {
            DomError::NotAnElement(node)
        } else {
            DomError::UnknownNode(node)
        }
    }
}

/// Element under construction. Nothing is added to the document until
/// [`ElementBuilder::append_to`].
pub struct ElementBuilder<'a> {
    document: &'a mut Document,
    tag: String,
    attributes: Vec<Attribute>,
    text: Option<String>,
}

impl ElementBuilder<'_> {
    pub fn attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        let value = value.into();
        match self
            .attributes
            .iter_mut()
            .find(|attribute| attribute.name.eq_ignore_ascii_case(&name))
        {
            Some(existing) => existing.value = value,
            None => self.attributes.push(Attribute { name, value }),
        }
        self
    }

    /// Boolean attribute such as `required` or `disabled`.
    pub fn flag(self, name: impl Into<String>) -> Self {
        self.attr(name, "")
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn append_to(self, parent: NodeId) -> DomResult<NodeId> {
        let ElementBuilder {
            document,
            tag,
            attributes,
            text,
        } = self;
        if !document.is_element(parent) {
            return Err(document.missing_or_not_element(parent));
        }
        let node = document.push(NodeData::Element { tag, attributes });
        if let Some(text) = text {
            let text_node = document.create_text(text);
            document.append_child(node, text_node)?;
        }
        document.append_child(parent, node)?;
        Ok(node)
    }
}
