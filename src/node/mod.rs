//! Node abstraction over the document
//!
//! A [`Node`] is one of:
//! - a position in the tree, read directly through the arena
//! - a position held by a [`Navigator`]
//! - whatever a cursor currently stands on
//!
//! The last kind may be *virtual*: a cursor that found nothing still acts as
//! a node with a default name and type, reads as empty, and is created in
//! the document the first time something is written through it.

pub mod navigator;
pub mod subtree;
pub(crate) mod xsi;

use std::fmt;

use log::trace;

pub use navigator::Navigator;
pub use subtree::{AttributeWriter, SubtreeReader, SubtreeWriter};

use crate::cursor::{Cursor, CursorFlags, SharedCursor};
use crate::dom::{Document, NodeId, NodeKind};
use crate::error::{Error, Result};
use crate::path;
use crate::types::{DataType, TypeMap, XmlName};
use crate::xpath::{evaluate_compiled, EvalContext, XPathValue};

/// How a node reaches the document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Backend {
    /// Direct arena access
    #[default]
    Tree,
    /// Through a [`Navigator`]
    Navigator,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeType {
    /// The document node
    Root,
    Element,
    Attribute,
}

/// A realized position
#[derive(Clone)]
pub(crate) struct Location {
    pub doc: Document,
    pub id: NodeId,
    pub backend: Backend,
}

impl Location {
    pub(crate) fn new(doc: Document, id: NodeId, backend: Backend) -> Self {
        Location { doc, id, backend }
    }

    pub(crate) fn with_id(&self, id: NodeId) -> Location {
        Location::new(self.doc.clone(), id, self.backend)
    }

    pub(crate) fn node(&self, data_type: Option<DataType>) -> Node {
        let source = match self.backend {
            Backend::Tree => Source::Tree {
                doc: self.doc.clone(),
                id: self.id,
                data_type,
            },
            Backend::Navigator => Source::Navigator {
                nav: Navigator::new(self.doc.clone(), self.id),
                data_type,
            },
        };
        Node { source }
    }

    pub(crate) fn kind(&self) -> NodeType {
        node_type(self.doc.borrow().kind(self.id))
    }

    pub(crate) fn same_position(&self, other: &Location) -> bool {
        self.doc.ptr_eq(&other.doc) && self.id == other.id
    }
}

fn node_type(kind: Option<NodeKind>) -> NodeType {
    match kind {
        Some(NodeKind::Document) => NodeType::Root,
        Some(NodeKind::Attribute) => NodeType::Attribute,
        _ => NodeType::Element,
    }
}

/// What a virtual node looks like before it is created
#[derive(Debug, Clone)]
pub(crate) struct Placeholder {
    pub kind: NodeType,
    pub name: XmlName,
    pub xsi_type: Option<XmlName>,
    pub data_type: DataType,
}

#[derive(Clone)]
pub struct Node {
    source: Source,
}

#[derive(Clone)]
enum Source {
    Tree {
        doc: Document,
        id: NodeId,
        data_type: Option<DataType>,
    },
    Navigator {
        nav: Navigator,
        data_type: Option<DataType>,
    },
    Cursor(SharedCursor),
}

impl Document {
    /// The document node
    pub fn node(&self, backend: Backend) -> Node {
        let id = self.borrow().document_node_id();
        Location::new(self.clone(), id, backend).node(None)
    }

    pub fn root_element(&self, backend: Backend) -> Option<Node> {
        let id = self.borrow().root_element_id()?;
        Some(Location::new(self.clone(), id, backend).node(None))
    }
}

impl Node {
    pub(crate) fn from_cursor(core: SharedCursor) -> Node {
        Node {
            source: Source::Cursor(core),
        }
    }

    pub(crate) fn location(&self) -> Option<Location> {
        match &self.source {
            Source::Tree { doc, id, .. } => Some(Location::new(doc.clone(), *id, Backend::Tree)),
            Source::Navigator { nav, .. } => Some(Location::new(
                nav.document().clone(),
                nav.id(),
                Backend::Navigator,
            )),
            Source::Cursor(core) => core.borrow().current(),
        }
    }

    /// The position, creating the node first if it is virtual
    pub(crate) fn realize_location(&self) -> Result<Location> {
        if let Some(location) = self.location() {
            return Ok(location);
        }
        let Source::Cursor(core) = &self.source else {
            return Err(Error::invalid_operation("node has no position"));
        };
        core.borrow_mut().realize()?;
        trace!("realized virtual node");
        core.borrow()
            .current()
            .ok_or_else(|| Error::invalid_operation("node could not be realized"))
    }

    fn placeholder(&self) -> Option<Placeholder> {
        match &self.source {
            Source::Cursor(core) => Some(core.borrow().placeholder()),
            _ => None,
        }
    }

    fn real_or_placeholder<T>(
        &self,
        real: impl FnOnce(&Location) -> T,
        virtual_: impl FnOnce(Placeholder) -> T,
    ) -> T {
        match self.location() {
            Some(location) => real(&location),
            None => match self.placeholder() {
                Some(placeholder) => virtual_(placeholder),
                None => virtual_(Placeholder {
                    kind: NodeType::Element,
                    name: XmlName::new("", ""),
                    xsi_type: None,
                    data_type: DataType::string(),
                }),
            },
        }
    }

    pub fn backend(&self) -> Backend {
        match &self.source {
            Source::Tree { .. } => Backend::Tree,
            Source::Navigator { .. } => Backend::Navigator,
            Source::Cursor(core) => core.borrow().backend(),
        }
    }

    /// A navigator on this position, when it exists
    pub fn navigator(&self) -> Option<Navigator> {
        match &self.source {
            Source::Navigator { nav, .. } => Some(nav.clone()),
            _ => self
                .location()
                .map(|location| Navigator::new(location.doc, location.id)),
        }
    }

    pub fn kind(&self) -> NodeType {
        self.real_or_placeholder(Location::kind, |p| p.kind)
    }

    pub fn local_name(&self) -> String {
        self.real_or_placeholder(
            |l| l.doc.borrow().local_name(l.id).to_string(),
            |p| p.name.local,
        )
    }

    pub fn namespace_uri(&self) -> String {
        self.real_or_placeholder(
            |l| l.doc.borrow().namespace_uri(l.id).to_string(),
            |p| p.name.effective_namespace("").to_string(),
        )
    }

    pub fn prefix(&self) -> String {
        self.real_or_placeholder(|l| l.doc.borrow().prefix(l.id).to_string(), |_| String::new())
    }

    pub fn name(&self) -> XmlName {
        XmlName::new(&self.local_name(), &self.namespace_uri())
    }

    pub fn xsi_type(&self) -> Option<XmlName> {
        self.real_or_placeholder(|l| xsi::read_type(&l.doc.borrow(), l.id), |p| p.xsi_type)
    }

    pub fn is_nil(&self) -> bool {
        self.real_or_placeholder(
            |l| l.kind() == NodeType::Element && xsi::read_nil(&l.doc.borrow(), l.id),
            |_| false,
        )
    }

    /// Text content; empty for virtual nodes
    pub fn value(&self) -> String {
        match &self.source {
            Source::Navigator { nav, .. } => nav.value(),
            _ => self.real_or_placeholder(|l| l.doc.borrow().string_value(l.id), |_| String::new()),
        }
    }

    pub fn is_real(&self) -> bool {
        self.location().is_some()
    }

    /// The type this node was selected as
    pub fn data_type(&self) -> Option<DataType> {
        match &self.source {
            Source::Tree { data_type, .. } | Source::Navigator { data_type, .. } => {
                data_type.clone()
            }
            Source::Cursor(core) => {
                let core = core.borrow();
                core.current_type()
                    .or_else(|| Some(core.placeholder().data_type))
            }
        }
    }

    /// Whether both nodes stand on the same document position
    pub fn position_eq(&self, other: &Node) -> bool {
        match (self.location(), other.location()) {
            (Some(a), Some(b)) => a.same_position(&b),
            _ => false,
        }
    }

    /// Attribute value on an element; unqualified names are in no namespace
    pub fn attribute(&self, name: &XmlName) -> Option<String> {
        let namespace = name.effective_namespace("");
        if let Source::Navigator { nav, .. } = &self.source {
            let mut attr = nav.clone();
            let mut found = attr.move_to_first_attribute();
            while found {
                if attr.local_name() == name.local && attr.namespace_uri() == namespace {
                    return Some(attr.value());
                }
                found = attr.move_to_next_attribute();
            }
            return None;
        }
        let location = self.location()?;
        let doc = location.doc.borrow();
        doc.get_attribute(location.id, &name.local, namespace)
            .map(str::to_string)
    }

    fn scope(location: &Location) -> NodeId {
        let doc = location.doc.borrow();
        match doc.kind(location.id) {
            Some(NodeKind::Attribute) => doc.parent_of(location.id).unwrap_or(location.id),
            _ => location.id,
        }
    }

    /// A prefix in scope for `namespace`; "" when it is the default
    pub fn lookup_prefix(&self, namespace: &str) -> Option<String> {
        let location = self.location()?;
        let scope = Self::scope(&location);
        let doc = location.doc.borrow();
        if doc.lookup_namespace(scope, "").unwrap_or("") == namespace {
            return Some(String::new());
        }
        doc.lookup_prefix(scope, namespace)
    }

    pub fn lookup_namespace_uri(&self, prefix: &str) -> Option<String> {
        let location = self.location()?;
        let scope = Self::scope(&location);
        let doc = location.doc.borrow();
        doc.lookup_namespace(scope, prefix).map(str::to_string)
    }

    pub fn outer_xml(&self) -> Option<String> {
        let location = self.location()?;
        let xml = location.doc.borrow().outer_xml(location.id);
        Some(xml)
    }

    /// This element and every element below it, in document order. The
    /// document node contributes its root element's subtree.
    pub fn select_subtree(&self) -> Vec<Node> {
        let Some(mut location) = self.location() else {
            return Vec::new();
        };
        if location.kind() == NodeType::Root {
            match location.doc.borrow().root_element_id() {
                Some(root) => location.id = root,
                None => return Vec::new(),
            }
        } else if location.kind() != NodeType::Element {
            return Vec::new();
        }

        match location.backend {
            Backend::Tree => {
                let doc = location.doc.borrow();
                std::iter::once(location.id)
                    .chain(doc.descendants(location.id))
                    .filter(|&id| doc.kind(id) == Some(NodeKind::Element))
                    .map(|id| location.with_id(id).node(None))
                    .collect()
            }
            Backend::Navigator => {
                let mut nav = Navigator::new(location.doc.clone(), location.id);
                let mut found = vec![location.node(None)];
                let mut depth = 0usize;
                loop {
                    if nav.move_to_first_child() {
                        depth += 1;
                        found.push(location.with_id(nav.id()).node(None));
                        continue;
                    }
                    loop {
                        if depth == 0 {
                            return found;
                        }
                        if nav.move_to_next() {
                            found.push(location.with_id(nav.id()).node(None));
                            break;
                        }
                        nav.move_to_parent();
                        depth -= 1;
                    }
                }
            }
        }
    }

    /// Evaluate an expression from this node; `None` for virtual nodes
    pub fn evaluate(&self, expression: &str) -> Result<Option<XPathValue>> {
        let compiled = path::compile(expression)?;
        if let Source::Navigator { nav, .. } = &self.source {
            return nav.evaluate(compiled.select()).map(Some);
        }
        let Some(location) = self.location() else {
            return Ok(None);
        };
        let doc = location.doc.borrow();
        let context = location.doc.context();
        evaluate_compiled(compiled.select(), &EvalContext::new(&doc, &context, location.id)).map(Some)
    }

    /// A stable node for the current position. Plain nodes return
    /// themselves; a cursor's node is detached from later moves.
    pub fn save(&self) -> Node {
        match &self.source {
            Source::Cursor(core) => {
                let core = core.borrow();
                match core.current() {
                    Some(location) => location.node(core.current_type()),
                    None => self.clone(),
                }
            }
            _ => self.clone(),
        }
    }

    // ------------------------------------------------------------------
    // Mutation
    // ------------------------------------------------------------------

    /// Create this node in the document if it is virtual
    pub fn realize(&self) -> Result<()> {
        self.realize_location().map(drop)
    }

    /// Replace the text content; clears `xsi:nil` on elements
    pub fn set_value(&self, value: &str) -> Result<()> {
        if self.kind() == NodeType::Root {
            return Err(Error::invalid_operation("cannot set the value of the document node"));
        }
        let location = self.realize_location()?;
        let mut doc = location.doc.borrow_mut();
        if doc.kind(location.id) == Some(NodeKind::Element) {
            xsi::write_nil(&mut doc, location.id, false);
        }
        doc.set_text(location.id, value);
        Ok(())
    }

    pub fn set_nil(&self, nil: bool) -> Result<()> {
        if self.kind() != NodeType::Element {
            return Err(Error::invalid_operation("only elements can be nil"));
        }
        if !nil && !self.is_real() {
            return Ok(());
        }
        let location = self.realize_location()?;
        xsi::write_nil(&mut location.doc.borrow_mut(), location.id, nil);
        Ok(())
    }

    pub fn set_xsi_type(&self, xsi_type: Option<&XmlName>) -> Result<()> {
        match self.kind() {
            NodeType::Element => {}
            _ if xsi_type.is_none() => return Ok(()),
            _ => return Err(Error::invalid_operation("only elements carry xsi:type")),
        }
        if xsi_type.is_none() && !self.is_real() {
            return Ok(());
        }
        let location = self.realize_location()?;
        xsi::write_type(&mut location.doc.borrow_mut(), location.id, xsi_type);
        Ok(())
    }

    /// Set (or with `None`, remove) an attribute on this element
    pub fn set_attribute(&self, name: &XmlName, value: Option<&str>) -> Result<()> {
        if self.kind() != NodeType::Element {
            return Err(Error::invalid_operation("only elements have attributes"));
        }
        let namespace = name.effective_namespace("");
        match value {
            Some(value) => {
                let location = self.realize_location()?;
                location
                    .doc
                    .borrow_mut()
                    .set_attribute(location.id, &name.local, namespace, value);
            }
            None => {
                if let Some(location) = self.location() {
                    location
                        .doc
                        .borrow_mut()
                        .remove_attribute(location.id, &name.local, namespace);
                }
            }
        }
        Ok(())
    }

    /// A prefix bound to `namespace` here, declaring `preferred` (or a
    /// generated prefix) when none is in scope
    pub fn ensure_prefix(&self, namespace: &str, preferred: Option<&str>) -> Result<String> {
        let location = self.realize_location()?;
        let scope = Self::scope(&location);
        let prefix = location
            .doc
            .borrow_mut()
            .ensure_prefix(scope, namespace, preferred);
        Ok(prefix)
    }

    /// Remove attributes and content; namespace declarations stay
    pub fn clear(&self) -> Result<()> {
        let Some(location) = self.location() else {
            return Ok(());
        };
        let mut doc = location.doc.borrow_mut();
        match node_type(doc.kind(location.id)) {
            NodeType::Element => {
                doc.clear_attributes(location.id);
                doc.clear_children(location.id);
            }
            NodeType::Attribute => doc.set_text(location.id, ""),
            NodeType::Root => {
                return Err(Error::invalid_operation("cannot clear the document node"))
            }
        }
        Ok(())
    }

    /// Copy attributes and content onto `target`, which must belong to the
    /// same document
    pub fn copy_to(&self, target: &Node) -> Result<()> {
        let Some(from) = self.location() else {
            return Ok(());
        };
        let to = target.realize_location()?;
        if !from.doc.ptr_eq(&to.doc) {
            return Err(Error::invalid_operation("cannot copy between documents"));
        }
        let mut doc = from.doc.borrow_mut();
        match (node_type(doc.kind(from.id)), node_type(doc.kind(to.id))) {
            (NodeType::Element, NodeType::Element) => doc.copy_content(from.id, to.id),
            (NodeType::Attribute, NodeType::Attribute) => {
                let value = doc.text(from.id).to_string();
                doc.set_text(to.id, &value);
            }
            _ => return Err(Error::invalid_operation("cannot copy between node kinds")),
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Selection
    // ------------------------------------------------------------------

    /// A cursor yielding this node once, as `data_type`
    pub fn select_self(&self, data_type: DataType) -> Cursor {
        Cursor::over_self(self.clone(), data_type)
    }

    /// A cursor over child elements and/or attributes matching `types`
    pub fn select_children(&self, types: &TypeMap, flags: CursorFlags) -> Cursor {
        Cursor::over_children(self.clone(), types.clone(), flags)
    }

    /// A cursor over the nodes a path expression selects
    pub fn select(&self, expression: &str, types: &TypeMap, flags: CursorFlags) -> Result<Cursor> {
        let compiled = path::compile(expression)?;
        Cursor::over_path(self.clone(), compiled, types.clone(), flags)
    }

    // ------------------------------------------------------------------
    // Subtree hooks
    // ------------------------------------------------------------------

    pub fn read_subtree(&self) -> Result<SubtreeReader> {
        self.outer_xml()
            .map(SubtreeReader::new)
            .ok_or_else(|| Error::invalid_operation("virtual node has no markup"))
    }

    pub fn write_children(&self) -> SubtreeWriter {
        SubtreeWriter::new(self.clone())
    }

    pub fn write_attributes(&self) -> AttributeWriter {
        AttributeWriter::new(self.clone())
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.location() {
            Some(location) => write!(f, "Node({:?}, {})", location.doc, location.id),
            None => write!(f, "Node(virtual {})", self.name()),
        }
    }
}
