//! Arena node records
//!
//! Nodes never move once allocated; a removed node is unlinked from its
//! parent and left in the arena so that outstanding ids stay valid.

/// Index into the document arena
pub type NodeId = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Document,
    Element,
    /// Lives in its owner's attribute chain, never among the children
    Attribute,
    Text,
    CData,
    Comment,
}

/// One node of the tree.
///
/// Children and attributes are separate doubly linked chains hanging off the
/// element. An attribute's `parent` is the element that carries it, and its
/// sibling links walk the attribute chain only.
#[derive(Debug, Clone)]
pub struct XmlNode {
    pub kind: NodeKind,
    pub parent: Option<NodeId>,
    pub first_child: Option<NodeId>,
    pub last_child: Option<NodeId>,
    pub prev_sibling: Option<NodeId>,
    pub next_sibling: Option<NodeId>,
    pub first_attr: Option<NodeId>,
    pub last_attr: Option<NodeId>,
    pub name_id: u32,
    pub prefix_id: u32,
    pub namespace_id: u32,
    /// Character data, or the attribute value
    pub text: String,
    /// `xmlns` declarations written on the start tag as `(prefix, uri)`
    pub namespaces: Vec<(u32, u32)>,
}

impl XmlNode {
    fn with_kind(kind: NodeKind) -> Self {
        XmlNode {
            kind,
            parent: None,
            first_child: None,
            last_child: None,
            prev_sibling: None,
            next_sibling: None,
            first_attr: None,
            last_attr: None,
            name_id: 0,
            prefix_id: 0,
            namespace_id: 0,
            text: String::new(),
            namespaces: Vec::new(),
        }
    }

    pub fn document() -> Self {
        Self::with_kind(NodeKind::Document)
    }

    pub fn element(name_id: u32, prefix_id: u32, namespace_id: u32) -> Self {
        let mut node = Self::with_kind(NodeKind::Element);
        node.set_name(name_id, prefix_id, namespace_id);
        node
    }

    pub fn attribute(name_id: u32, prefix_id: u32, namespace_id: u32, value: String) -> Self {
        let mut node = Self::with_kind(NodeKind::Attribute);
        node.set_name(name_id, prefix_id, namespace_id);
        node.text = value;
        node
    }

    /// Text, CDATA or comment
    pub fn character_data(kind: NodeKind, text: String) -> Self {
        let mut node = Self::with_kind(kind);
        node.text = text;
        node
    }

    fn set_name(&mut self, name_id: u32, prefix_id: u32, namespace_id: u32) {
        self.name_id = name_id;
        self.prefix_id = prefix_id;
        self.namespace_id = namespace_id;
    }

    pub fn is_element(&self) -> bool {
        self.kind == NodeKind::Element
    }

    pub fn is_attribute(&self) -> bool {
        self.kind == NodeKind::Attribute
    }

    /// Text and CDATA both count
    pub fn is_text(&self) -> bool {
        matches!(self.kind, NodeKind::Text | NodeKind::CData)
    }

    pub fn has_children(&self) -> bool {
        self.first_child.is_some()
    }

    pub fn has_attributes(&self) -> bool {
        self.first_attr.is_some()
    }
}
