//! Child cursor
//!
//! Walks the element children of a parent, then its attributes, keeping
//! the nodes whose name and `xsi:type` the type map knows. Element names
//! without a namespace take the parent's namespace; attribute names take
//! none.

use log::{debug, trace};

use super::{CursorFlags, CursorOps};
use crate::dom::{NodeId, NodeKind};
use crate::error::{Error, Result};
use crate::node::{xsi, Backend, Location, Node, NodeType, Placeholder};
use crate::types::{DataType, TypeMap, XmlType};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// No match; the cursor stands on a virtual node
    Empty,
    End,
    /// After a removal the following attribute is queued but not yet visited
    AttributePrimed,
    /// After a removal the following element is queued but not yet visited
    ElementPrimed,
    Initial,
    Element,
    Attribute,
}

pub(crate) struct ChildCursor {
    parent: Node,
    types: TypeMap,
    flags: CursorFlags,
    host: Option<Location>,
    state: State,
    node: Option<NodeId>,
    data_type: Option<DataType>,
}

impl ChildCursor {
    pub(crate) fn new(parent: Node, types: TypeMap, flags: CursorFlags) -> Self {
        ChildCursor {
            host: parent.location(),
            parent,
            types,
            flags,
            state: State::Initial,
            node: None,
            data_type: None,
        }
    }

    fn has_current(&self) -> bool {
        matches!(self.state, State::Element | State::Attribute)
    }

    fn require_mutable(&self) -> Result<()> {
        if self.flags.is_mutable() {
            Ok(())
        } else {
            Err(Error::invalid_operation("cursor is not mutable"))
        }
    }

    /// Namespace taken by unqualified names: the parent's for elements
    fn context_namespace(&self, element: bool) -> String {
        if !element {
            return String::new();
        }
        match &self.host {
            Some(host) => host.doc.borrow().namespace_uri(host.id).to_string(),
            None => self.parent.namespace_uri(),
        }
    }

    fn enter(&mut self, found: Option<NodeId>, state: State) -> bool {
        match found {
            Some(id) => {
                self.node = Some(id);
                self.state = state;
                true
            }
            None => false,
        }
    }

    fn first_element(&mut self) -> bool {
        if !self.flags.includes_elements() {
            return false;
        }
        let found = self.host.as_ref().and_then(|host| {
            let doc = host.doc.borrow();
            doc.children(host.id)
                .find(|&c| doc.kind(c) == Some(NodeKind::Element))
        });
        self.enter(found, State::Element)
    }

    fn next_element(&mut self) -> bool {
        let found = match (&self.host, self.node) {
            (Some(host), Some(node)) => {
                let doc = host.doc.borrow();
                let mut next = doc.next_sibling_of(node);
                while let Some(n) = next {
                    if doc.kind(n) == Some(NodeKind::Element) {
                        break;
                    }
                    next = doc.next_sibling_of(n);
                }
                next
            }
            _ => None,
        };
        self.enter(found, State::Element)
    }

    fn first_attribute(&mut self) -> bool {
        if !self.flags.includes_attributes() {
            return false;
        }
        let found = self
            .host
            .as_ref()
            .and_then(|host| host.doc.borrow().first_attribute_of(host.id));
        self.enter(found, State::Attribute)
    }

    fn next_attribute(&mut self) -> bool {
        let found = match (&self.host, self.node) {
            (Some(host), Some(node)) => host.doc.borrow().next_sibling_of(node),
            _ => None,
        };
        self.enter(found, State::Attribute)
    }

    fn advance(&mut self) -> bool {
        match self.state {
            State::Initial => {
                if self.host.is_none() {
                    self.host = self.parent.location();
                }
                self.first_element() || self.first_attribute() || self.finish()
            }
            State::Element => self.next_element() || self.first_attribute() || self.finish(),
            State::Attribute => self.next_attribute() || self.finish(),
            State::ElementPrimed => {
                self.state = State::Element;
                true
            }
            State::AttributePrimed => {
                self.state = State::Attribute;
                true
            }
            State::End | State::Empty => false,
        }
    }

    fn finish(&mut self) -> bool {
        self.state = State::End;
        false
    }

    /// Whether the node under the cursor is known to the type map
    fn is_match(&mut self) -> bool {
        let element = self.state == State::Element;
        let context = self.context_namespace(element);
        let found = match (&self.host, self.node) {
            (Some(host), Some(id)) => {
                let doc = host.doc.borrow();
                let xsi_type = if element { xsi::read_type(&doc, id) } else { None };
                self.types
                    .lookup_node(
                        doc.local_name(id),
                        doc.namespace_uri(id),
                        xsi_type.as_ref(),
                        &context,
                    )
                    .map(|t| t.data_type.clone())
            }
            _ => None,
        };
        let matched = found.is_some();
        self.data_type = found;
        matched
    }

    fn move_next_core(&mut self) -> bool {
        while self.advance() {
            if self.is_match() {
                return true;
            }
        }
        false
    }

    /// The parent, created if virtual
    fn realized_host(&mut self) -> Result<Location> {
        if let Some(host) = &self.host {
            return Ok(host.clone());
        }
        let host = self.parent.realize_location()?;
        if self.parent.kind() == NodeType::Element {
            self.parent.set_nil(false)?;
        }
        self.host = Some(host.clone());
        Ok(host)
    }

    fn create_element(&mut self, known: &XmlType, host: &Location, anchor: Option<NodeId>) {
        let name = known.name.with_context(&self.context_namespace(true));
        let mut doc = host.doc.borrow_mut();
        let id = doc.create_element(host.id, &name.local, name.effective_namespace(""));
        match anchor {
            Some(anchor) => doc.insert_before(anchor, id),
            None => doc.append_child(host.id, id),
        }
        if known.xsi_type.is_some() {
            xsi::write_type(&mut doc, id, known.xsi_type.as_ref());
        }
        self.node = Some(id);
        self.state = State::Element;
    }

    fn create_attribute(&mut self, known: &XmlType, host: &Location, anchor: Option<NodeId>) -> Result<()> {
        if known.xsi_type.is_some() {
            return Err(Error::invalid_operation("attributes cannot carry xsi:type"));
        }
        let namespace = known.name.effective_namespace("");
        let mut doc = host.doc.borrow_mut();
        let mut anchor = anchor;
        if let Some(existing) = doc.find_attribute(host.id, &known.name.local, namespace) {
            if anchor == Some(existing) {
                anchor = doc.next_sibling_of(existing);
            }
            doc.detach(existing);
        }
        let id = doc.create_attribute(host.id, &known.name.local, namespace, "");
        match anchor {
            Some(anchor) => doc.insert_before(anchor, id),
            None => doc.append_child(host.id, id),
        }
        self.node = Some(id);
        self.state = State::Attribute;
        Ok(())
    }
}

impl CursorOps for ChildCursor {
    fn move_next(&mut self) -> Result<bool> {
        let had_current = self.has_current();
        let found = self.move_next_core();
        let has_current = found && (self.flags.allows_multiple() || self.is_at_end()?);
        if !has_current {
            if !had_current {
                self.state = State::Empty;
            } else if found {
                self.state = State::End;
            }
        }
        trace!("child cursor moved to {:?} ({})", self.node, has_current);
        Ok(has_current)
    }

    fn reset(&mut self) {
        self.state = State::Initial;
        self.node = None;
        self.data_type = None;
    }

    fn move_to_end(&mut self) -> Result<()> {
        match self.state {
            State::Element | State::ElementPrimed | State::Attribute | State::AttributePrimed => {
                self.state = State::End;
            }
            State::Initial => {
                self.state = if self.is_at_end()? { State::Empty } else { State::End };
            }
            State::End | State::Empty => {}
        }
        Ok(())
    }

    fn is_at_end(&mut self) -> Result<bool> {
        let saved = (self.state, self.node, self.data_type.clone());
        let found = self.move_next_core();
        (self.state, self.node, self.data_type) = saved;
        Ok(!found)
    }

    fn move_to(&mut self, position: &Location) -> Result<()> {
        let not_selected = || Error::invalid_operation("node is not selected by this cursor");
        let host = self.host.clone().ok_or_else(not_selected)?;
        if !host.doc.ptr_eq(&position.doc) {
            return Err(not_selected());
        }
        let (state, found) = {
            let doc = host.doc.borrow();
            if doc.parent_of(position.id) != Some(host.id) {
                return Err(not_selected());
            }
            let state = match doc.kind(position.id) {
                Some(NodeKind::Element) if self.flags.includes_elements() => State::Element,
                Some(NodeKind::Attribute) if self.flags.includes_attributes() => State::Attribute,
                _ => return Err(not_selected()),
            };
            let element = state == State::Element;
            let context = if element { doc.namespace_uri(host.id) } else { "" };
            let xsi_type = if element { xsi::read_type(&doc, position.id) } else { None };
            let found = self
                .types
                .lookup_node(
                    doc.local_name(position.id),
                    doc.namespace_uri(position.id),
                    xsi_type.as_ref(),
                    context,
                )
                .map(|t| t.data_type.clone());
            (state, found)
        };
        let data_type = found.ok_or_else(not_selected)?;
        self.state = state;
        self.node = Some(position.id);
        self.data_type = Some(data_type);
        Ok(())
    }

    fn create(&mut self, data_type: &DataType) -> Result<()> {
        self.require_mutable()?;
        let known = self.types.require(data_type)?.clone();
        let element = self.flags.includes_elements();
        // Elements go before an element match only; at an attribute they append
        let anchor = match self.state {
            State::Element if element => self.node,
            State::Attribute if !element => self.node,
            State::Element | State::Attribute | State::End | State::Empty => None,
            _ => {
                return Err(Error::invalid_operation(
                    "cursor is not positioned where a node can be created",
                ))
            }
        };
        let host = self.realized_host()?;

        if element {
            self.create_element(&known, &host, anchor);
        } else {
            self.create_attribute(&known, &host, anchor)?;
        }
        self.data_type = Some(known.data_type.clone());
        debug!("created {} as {}", known.name, known.data_type);
        Ok(())
    }

    fn coerce(&mut self, data_type: &DataType) -> Result<()> {
        self.require_mutable()?;
        let known = self.types.require(data_type)?.clone();
        let (Some(host), Some(id), true) = (self.host.clone(), self.node, self.has_current()) else {
            return Err(Error::invalid_operation("cursor is not positioned on a match"));
        };
        let element = self.state == State::Element;
        if !element && known.xsi_type.is_some() {
            return Err(Error::invalid_operation("attributes cannot carry xsi:type"));
        }

        let name = known.name.with_context(&self.context_namespace(element));
        let namespace = name.effective_namespace("");
        let mut doc = host.doc.borrow_mut();
        if doc.local_name(id) != name.local || doc.namespace_uri(id) != namespace {
            if !element {
                if let Some(other) = doc.find_attribute(host.id, &name.local, namespace) {
                    doc.detach(other);
                }
            }
            doc.rename(id, &name.local, namespace);
            debug!("coerced node {} to {}", id, name);
        }
        if element {
            xsi::write_type(&mut doc, id, known.xsi_type.as_ref());
        }
        self.data_type = Some(known.data_type.clone());
        Ok(())
    }

    fn remove(&mut self) -> Result<()> {
        self.require_mutable()?;
        let (Some(host), Some(removed), true) = (self.host.clone(), self.node, self.has_current())
        else {
            return Err(Error::invalid_operation("cursor is not positioned on a match"));
        };

        self.move_next()?;
        self.state = match self.state {
            State::Element => State::ElementPrimed,
            State::Attribute => State::AttributePrimed,
            other => other,
        };
        host.doc.borrow_mut().detach(removed);
        debug!("removed node {}", removed);
        Ok(())
    }

    fn realize(&mut self) -> Result<()> {
        if self.has_current() {
            return Ok(());
        }
        if self.state != State::Empty {
            return Err(Error::invalid_operation("cursor is not in a realizable state"));
        }
        let default = self.types.default_type().data_type.clone();
        self.create(&default)
    }

    fn current(&self) -> Option<Location> {
        if !self.has_current() {
            return None;
        }
        let host = self.host.as_ref()?;
        Some(host.with_id(self.node?))
    }

    fn current_type(&self) -> Option<DataType> {
        if self.has_current() {
            self.data_type.clone()
        } else {
            None
        }
    }

    fn placeholder(&self) -> Placeholder {
        let default = self.types.default_type();
        let element = self.flags.includes_elements();
        Placeholder {
            kind: if element { NodeType::Element } else { NodeType::Attribute },
            name: default.name.with_context(&self.context_namespace(element)),
            xsi_type: default.xsi_type.clone(),
            data_type: default.data_type.clone(),
        }
    }

    fn backend(&self) -> Backend {
        self.parent.backend()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cursor::Cursor;
    use crate::dom::Document;
    use crate::types::XmlName;

    fn items() -> TypeMap {
        TypeMap::single(XmlName::local("Item"), DataType::string())
            .with(XmlType::new(XmlName::local("Other"), DataType::i32()))
    }

    fn cursor(xml: &str, flags: CursorFlags) -> (Document, Cursor) {
        let doc = Document::parse(xml).unwrap();
        let root = doc.root_element(Backend::Tree).unwrap();
        let cursor = root.select_children(&items(), flags);
        (doc, cursor)
    }

    #[test]
    fn test_multiple_in_document_order() {
        let flags = CursorFlags::ELEMENTS | CursorFlags::MULTIPLE;
        let (_doc, cursor) = cursor("<X><Item>1</Item><Skip/><Other>2</Other></X>", flags);
        let mut seen = Vec::new();
        while cursor.move_next().unwrap() {
            seen.push((cursor.local_name(), cursor.value()));
        }
        assert_eq!(
            seen,
            [("Item".to_string(), "1".to_string()), ("Other".to_string(), "2".to_string())]
        );
    }

    #[test]
    fn test_single_ambiguous_is_absent() {
        let (_doc, cursor) = cursor("<X><Item/><Item/></X>", CursorFlags::ELEMENTS);
        assert!(!cursor.move_next().unwrap());
        assert!(!cursor.is_real());
        assert_eq!(cursor.local_name(), "Item");
    }

    #[test]
    fn test_attributes_after_elements() {
        let (_doc, cursor) = cursor(
            "<X Item='a'><Other>1</Other></X>",
            CursorFlags::ALL_NODES | CursorFlags::MULTIPLE,
        );
        assert!(cursor.move_next().unwrap());
        assert_eq!(cursor.kind(), NodeType::Element);
        assert!(cursor.move_next().unwrap());
        assert_eq!(cursor.kind(), NodeType::Attribute);
        assert_eq!(cursor.value(), "a");
        assert!(!cursor.move_next().unwrap());
    }

    #[test]
    fn test_element_created_at_attribute_match_is_appended() {
        let flags = CursorFlags::ALL_NODES | CursorFlags::MULTIPLE | CursorFlags::MUTABLE;
        let (doc, cursor) = cursor("<X Item='a'/>", flags);
        assert!(cursor.move_next().unwrap());
        assert_eq!(cursor.kind(), NodeType::Attribute);
        cursor.create(&DataType::i32()).unwrap();
        cursor.set_value("3").unwrap();
        assert_eq!(doc.to_xml(), "<X Item=\"a\"><Other>3</Other></X>");
        assert!(Document::parse(&doc.to_xml()).is_ok());
    }

    #[test]
    fn test_move_to_end_then_create_appends() {
        let flags = CursorFlags::ELEMENTS | CursorFlags::MULTIPLE | CursorFlags::MUTABLE;
        let (doc, cursor) = cursor("<X><Item>1</Item><Item>2</Item></X>", flags);
        assert!(cursor.move_next().unwrap());
        cursor.move_to_end().unwrap();
        assert!(!cursor.move_next().unwrap());
        cursor.create(&DataType::i32()).unwrap();
        cursor.set_value("3").unwrap();
        assert_eq!(doc.to_xml(), "<X><Item>1</Item><Item>2</Item><Other>3</Other></X>");

        let (doc, cursor) = self::cursor("<X><Item>1</Item></X>", flags);
        cursor.move_to_end().unwrap();
        cursor.create(&DataType::string()).unwrap();
        cursor.set_value("2").unwrap();
        assert_eq!(doc.to_xml(), "<X><Item>1</Item><Item>2</Item></X>");
    }

    #[test]
    fn test_requires_mutable() {
        let (_doc, cursor) = cursor("<X/>", CursorFlags::ELEMENTS);
        cursor.move_next().unwrap();
        assert!(matches!(cursor.create(&DataType::string()), Err(Error::InvalidOperation(_))));
    }

    #[test]
    fn test_create_before_initial_is_rejected() {
        let (_doc, cursor) = cursor("<X/>", CursorFlags::ELEMENTS | CursorFlags::MUTABLE);
        assert!(matches!(cursor.create(&DataType::string()), Err(Error::InvalidOperation(_))));
    }

    #[test]
    fn test_create_unknown_type() {
        let (_doc, cursor) = cursor("<X/>", CursorFlags::ELEMENTS | CursorFlags::MUTABLE);
        cursor.move_next().unwrap();
        assert!(matches!(cursor.create(&DataType::bool()), Err(Error::Serialization(_))));
    }

    #[test]
    fn test_coerce_renames_in_place() {
        let flags = CursorFlags::ELEMENTS | CursorFlags::MUTABLE;
        let (doc, cursor) = cursor("<X><Item>5</Item></X>", flags);
        assert!(cursor.move_next().unwrap());
        cursor.coerce(&DataType::i32()).unwrap();
        assert_eq!(cursor.data_type(), Some(DataType::i32()));
        assert_eq!(doc.to_xml(), "<X><Other>5</Other></X>");
    }

    #[test]
    fn test_coerce_outside_match() {
        let flags = CursorFlags::ELEMENTS | CursorFlags::MUTABLE;
        let (_doc, cursor) = cursor("<X/>", flags);
        cursor.move_next().unwrap();
        assert!(matches!(cursor.coerce(&DataType::i32()), Err(Error::InvalidOperation(_))));
    }

    #[test]
    fn test_remove_continues_with_next() {
        let flags = CursorFlags::ELEMENTS | CursorFlags::MULTIPLE | CursorFlags::MUTABLE;
        let (doc, cursor) = cursor("<X><Item>1</Item><Item>2</Item><Item>3</Item></X>", flags);
        assert!(cursor.move_next().unwrap());
        cursor.remove().unwrap();
        assert!(cursor.move_next().unwrap());
        assert_eq!(cursor.value(), "2");
        cursor.remove_all_next().unwrap();
        assert_eq!(doc.to_xml(), "<X><Item>2</Item></X>");
    }

    #[test]
    fn test_attribute_create_replaces_same_name() {
        let flags = CursorFlags::ATTRIBUTES | CursorFlags::MUTABLE;
        let (doc, cursor) = cursor("<X Item='old'/>", flags);
        assert!(cursor.move_next().unwrap());
        cursor.create(&DataType::string()).unwrap();
        cursor.set_value("new").unwrap();
        assert_eq!(doc.to_xml(), "<X Item=\"new\"/>");
    }

    #[test]
    fn test_save_and_move_to() {
        let flags = CursorFlags::ELEMENTS | CursorFlags::MULTIPLE;
        let (_doc, cursor) = cursor("<X><Item>1</Item><Item>2</Item></X>", flags);
        cursor.move_next().unwrap();
        let first = cursor.save();
        cursor.move_next().unwrap();
        assert_eq!(cursor.value(), "2");
        cursor.move_to(&first).unwrap();
        assert_eq!(cursor.value(), "1");
        assert_eq!(first.data_type(), Some(DataType::string()));
    }

    #[test]
    fn test_virtual_parent_realized_on_create() {
        let doc = Document::parse("<X/>").unwrap();
        let root = doc.root_element(Backend::Navigator).unwrap();
        let outer = root.select_children(
            &TypeMap::single(XmlName::local("Group"), DataType::reference("Group")),
            CursorFlags::ELEMENTS | CursorFlags::MUTABLE,
        );
        assert!(!outer.move_next().unwrap());

        let inner = outer.select_children(&items(), CursorFlags::ELEMENTS | CursorFlags::MUTABLE);
        assert!(!inner.move_next().unwrap());
        inner.create(&DataType::i32()).unwrap();
        inner.set_value("7").unwrap();
        assert_eq!(doc.to_xml(), "<X><Group><Other>7</Other></Group></X>");
    }
}
