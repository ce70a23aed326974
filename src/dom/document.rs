//! XML Document - mutable arena DOM
//!
//! - Arena allocation for nodes, `NodeId` indices for traversal
//! - String interning for names, prefixes and namespace URIs
//! - Attributes are arena nodes in a per-element chain
//! - Removal detaches a node; IDs are never reused, so positions held
//!   elsewhere stay valid (they simply stop being reachable)

use std::collections::HashMap;

use log::trace;
use quick_xml::escape::{escape, partial_escape};
use quick_xml::events::{BytesStart, Event};
use quick_xml::name::NamespaceError;
use quick_xml::Reader;

use super::namespace::{ns, NamespaceScopes};
use super::node::{NodeId, NodeKind, XmlNode};
use super::strings::StringPool;
use crate::error::{Error, Result};

/// An XML document stored in arena format
#[derive(Debug, Clone)]
pub struct XmlDocument {
    nodes: Vec<XmlNode>,
    pub strings: StringPool,
}

impl Default for XmlDocument {
    fn default() -> Self {
        Self::new()
    }
}

impl XmlDocument {
    /// Create an empty document (document node only)
    pub fn new() -> Self {
        let mut nodes = Vec::with_capacity(64);
        nodes.push(XmlNode::document());
        XmlDocument {
            nodes,
            strings: StringPool::new(),
        }
    }

    /// Parse a document from text
    pub fn parse(input: &str) -> Result<Self> {
        let mut doc = XmlDocument::new();
        doc.build_from_events(input)?;
        Ok(doc)
    }

    /// Build the arena from quick-xml events
    fn build_from_events(&mut self, input: &str) -> Result<()> {
        let mut reader = Reader::from_str(input);
        let mut scopes = NamespaceScopes::new(&mut self.strings);
        let mut stack: Vec<NodeId> = vec![0];

        loop {
            let parent_id = stack.last().copied().unwrap_or(0);
            match reader.read_event()? {
                Event::Start(e) => {
                    let id = self.handle_element(&e, &mut scopes)?;
                    self.link_child(parent_id, id);
                    stack.push(id);
                }
                Event::Empty(e) => {
                    let id = self.handle_element(&e, &mut scopes)?;
                    self.link_child(parent_id, id);
                    scopes.leave();
                }
                Event::End(_) => {
                    stack.pop();
                    scopes.leave();
                }
                Event::Text(e) => {
                    let text = e.unescape().map_err(Error::xml)?;
                    if !text.trim().is_empty() {
                        let id = self.push_node(XmlNode::character_data(
                            NodeKind::Text,
                            text.into_owned(),
                        ));
                        self.link_child(parent_id, id);
                    }
                }
                Event::CData(e) => {
                    let text = std::str::from_utf8(&e)?.to_string();
                    let id = self.push_node(XmlNode::character_data(NodeKind::CData, text));
                    self.link_child(parent_id, id);
                }
                Event::Comment(e) => {
                    let text = std::str::from_utf8(&e)?.to_string();
                    let id = self.push_node(XmlNode::character_data(NodeKind::Comment, text));
                    self.link_child(parent_id, id);
                }
                Event::Eof => break,
                _ => {}
            }
        }

        Ok(())
    }

    /// Create an element node from a start tag, declaring its namespaces
    fn handle_element(
        &mut self,
        e: &BytesStart<'_>,
        scopes: &mut NamespaceScopes,
    ) -> Result<NodeId> {
        let mut declarations = Vec::new();
        let mut plain = Vec::new();
        for attr in e.attributes() {
            let attr = attr.map_err(Error::xml)?;
            let key = std::str::from_utf8(attr.key.as_ref())?.to_string();
            let value = attr.unescape_value().map_err(Error::xml)?.into_owned();
            if key == "xmlns" {
                declarations.push((0, self.strings.intern(&value)));
            } else if let Some(prefix) = key.strip_prefix("xmlns:") {
                declarations.push((self.strings.intern(prefix), self.strings.intern(&value)));
            } else {
                plain.push((key, value));
            }
        }
        scopes.enter(&declarations);

        let qname = std::str::from_utf8(e.name().as_ref())?.to_string();
        let (prefix, local) = split_qname(&qname);
        let prefix_id = self.strings.intern(prefix);
        let local_id = self.strings.intern(local);
        let namespace_id = resolve_prefix(scopes, prefix_id, prefix)?;

        let mut element = XmlNode::element(local_id, prefix_id, namespace_id);
        element.namespaces = declarations;
        let id = self.push_node(element);

        for (key, value) in plain {
            let (prefix, local) = split_qname(&key);
            let prefix_id = self.strings.intern(prefix);
            let local_id = self.strings.intern(local);
            // Unprefixed attributes are never in the default namespace
            let namespace_id = if prefix_id == 0 {
                0
            } else {
                resolve_prefix(scopes, prefix_id, prefix)?
            };
            let attr = self.push_node(XmlNode::attribute(local_id, prefix_id, namespace_id, value));
            self.link_attribute(id, attr);
        }

        Ok(id)
    }

    fn push_node(&mut self, node: XmlNode) -> NodeId {
        let id = self.nodes.len() as NodeId;
        self.nodes.push(node);
        id
    }

    /// Append a child at the end of the parent's child chain
    fn link_child(&mut self, parent_id: NodeId, child_id: NodeId) {
        let last_child_opt = self.nodes[parent_id as usize].last_child;

        if let Some(last_child_id) = last_child_opt {
            self.nodes[child_id as usize].prev_sibling = Some(last_child_id);
            self.nodes[last_child_id as usize].next_sibling = Some(child_id);
        } else {
            self.nodes[parent_id as usize].first_child = Some(child_id);
        }
        self.nodes[parent_id as usize].last_child = Some(child_id);
        self.nodes[child_id as usize].parent = Some(parent_id);
    }

    /// Append an attribute at the end of the owner's attribute chain
    fn link_attribute(&mut self, owner_id: NodeId, attr_id: NodeId) {
        let last_opt = self.nodes[owner_id as usize].last_attr;

        if let Some(last_id) = last_opt {
            self.nodes[attr_id as usize].prev_sibling = Some(last_id);
            self.nodes[last_id as usize].next_sibling = Some(attr_id);
        } else {
            self.nodes[owner_id as usize].first_attr = Some(attr_id);
        }
        self.nodes[owner_id as usize].last_attr = Some(attr_id);
        self.nodes[attr_id as usize].parent = Some(owner_id);
    }

    // ------------------------------------------------------------------
    // Read access
    // ------------------------------------------------------------------

    /// The document node (index 0)
    pub fn document_node_id(&self) -> NodeId {
        0
    }

    /// First element child of the document node
    pub fn root_element_id(&self) -> Option<NodeId> {
        self.children(0).find(|&id| self.nodes[id as usize].is_element())
    }

    pub fn get_node(&self, id: NodeId) -> Option<&XmlNode> {
        self.nodes.get(id as usize)
    }

    pub fn kind(&self, id: NodeId) -> Option<NodeKind> {
        self.get_node(id).map(|n| n.kind)
    }

    pub fn parent_of(&self, id: NodeId) -> Option<NodeId> {
        self.get_node(id)?.parent
    }

    pub fn first_child_of(&self, id: NodeId) -> Option<NodeId> {
        self.get_node(id)?.first_child
    }

    pub fn next_sibling_of(&self, id: NodeId) -> Option<NodeId> {
        self.get_node(id)?.next_sibling
    }

    pub fn prev_sibling_of(&self, id: NodeId) -> Option<NodeId> {
        self.get_node(id)?.prev_sibling
    }

    pub fn first_attribute_of(&self, id: NodeId) -> Option<NodeId> {
        self.get_node(id)?.first_attr
    }

    /// Local name of an element or attribute ("" otherwise)
    pub fn local_name(&self, id: NodeId) -> &str {
        match self.get_node(id) {
            Some(n) if matches!(n.kind, NodeKind::Element | NodeKind::Attribute) => {
                self.strings.get(n.name_id)
            }
            _ => "",
        }
    }

    pub fn prefix(&self, id: NodeId) -> &str {
        self.get_node(id)
            .map(|n| self.strings.get(n.prefix_id))
            .unwrap_or("")
    }

    pub fn namespace_uri(&self, id: NodeId) -> &str {
        self.get_node(id)
            .map(|n| self.strings.get(n.namespace_id))
            .unwrap_or("")
    }

    /// `prefix:local` or `local`
    pub fn qualified_name(&self, id: NodeId) -> String {
        let prefix = self.prefix(id);
        let local = self.local_name(id);
        if prefix.is_empty() {
            local.to_string()
        } else {
            format!("{}:{}", prefix, local)
        }
    }

    /// Raw text of a character data node or attribute value
    pub fn text(&self, id: NodeId) -> &str {
        self.get_node(id).map(|n| n.text.as_str()).unwrap_or("")
    }

    /// XPath string-value: concatenated descendant text for elements and
    /// the document, the node's own text otherwise
    pub fn string_value(&self, id: NodeId) -> String {
        match self.kind(id) {
            Some(NodeKind::Element) | Some(NodeKind::Document) => {
                let mut out = String::new();
                for d in self.descendants(id) {
                    let node = &self.nodes[d as usize];
                    if node.is_text() {
                        out.push_str(&node.text);
                    }
                }
                out
            }
            Some(_) => self.text(id).to_string(),
            None => String::new(),
        }
    }

    /// Iterate over children of a node
    pub fn children(&self, id: NodeId) -> ChildIter<'_> {
        let first = self.get_node(id).and_then(|n| n.first_child);
        ChildIter {
            doc: self,
            next: first,
        }
    }

    /// Iterate over attributes of an element
    pub fn attributes(&self, id: NodeId) -> ChildIter<'_> {
        let first = self.get_node(id).and_then(|n| n.first_attr);
        ChildIter {
            doc: self,
            next: first,
        }
    }

    /// Iterate over all descendants of a node (attributes excluded)
    pub fn descendants(&self, id: NodeId) -> DescendantIter<'_> {
        let mut stack = Vec::new();
        if let Some(node) = self.get_node(id) {
            let mut child_id = node.last_child;
            while let Some(cid) = child_id {
                stack.push(cid);
                child_id = self.nodes[cid as usize].prev_sibling;
            }
        }
        DescendantIter { doc: self, stack }
    }

    pub fn children_vec(&self, id: NodeId) -> Vec<NodeId> {
        self.children(id).collect()
    }

    pub fn descendants_vec(&self, id: NodeId) -> Vec<NodeId> {
        self.descendants(id).collect()
    }

    /// Find an attribute by local name and namespace URI
    pub fn find_attribute(&self, elem: NodeId, local: &str, namespace: &str) -> Option<NodeId> {
        self.attributes(elem)
            .find(|&a| self.local_name(a) == local && self.namespace_uri(a) == namespace)
    }

    pub fn get_attribute(&self, elem: NodeId, local: &str, namespace: &str) -> Option<&str> {
        self.find_attribute(elem, local, namespace).map(|a| self.text(a))
    }

    /// Whether `id` is reachable from the document node
    pub fn is_attached(&self, id: NodeId) -> bool {
        let mut current = Some(id);
        while let Some(c) = current {
            if c == 0 {
                return true;
            }
            current = self.parent_of(c);
        }
        false
    }

    /// Resolve a prefix ("" for the default namespace) in scope at `elem`
    pub fn lookup_namespace(&self, elem: NodeId, prefix: &str) -> Option<&str> {
        match prefix {
            "xml" => return Some(ns::XML),
            "xmlns" => return Some(ns::XMLNS),
            _ => {}
        }
        let prefix_id = self.strings.find(prefix)?;
        let mut current = Some(elem);
        while let Some(c) = current {
            let node = &self.nodes[c as usize];
            if let Some(&(_, uri)) = node.namespaces.iter().find(|(p, _)| *p == prefix_id) {
                return Some(self.strings.get(uri));
            }
            current = node.parent;
        }
        None
    }

    /// Find a non-default prefix bound to `namespace` in scope at `elem`
    pub fn lookup_prefix(&self, elem: NodeId, namespace: &str) -> Option<String> {
        if namespace == ns::XML {
            return Some("xml".to_string());
        }
        let uri_id = self.strings.find(namespace)?;
        let mut current = Some(elem);
        while let Some(c) = current {
            let node = &self.nodes[c as usize];
            for &(p, u) in &node.namespaces {
                if u == uri_id && p != 0 {
                    let prefix = self.strings.get(p);
                    // Skip prefixes shadowed closer to `elem`
                    if self.lookup_namespace(elem, prefix) == Some(namespace) {
                        return Some(prefix.to_string());
                    }
                }
            }
            current = node.parent;
        }
        None
    }

    /// Position of every reachable node in document order
    fn document_order(&self) -> HashMap<NodeId, usize> {
        let mut order = HashMap::with_capacity(self.nodes.len());
        let mut stack = vec![0];
        while let Some(id) = stack.pop() {
            order.insert(id, order.len());
            let node = &self.nodes[id as usize];
            for attr in self.attributes(id) {
                order.insert(attr, order.len());
            }
            let mut child = node.last_child;
            while let Some(c) = child {
                stack.push(c);
                child = self.nodes[c as usize].prev_sibling;
            }
        }
        order
    }

    /// Sort node IDs into document order and drop duplicates.
    /// Detached nodes sort last.
    pub fn sort_document_order(&self, ids: &mut Vec<NodeId>) {
        if ids.len() > 1 {
            let order = self.document_order();
            ids.sort_by_key(|id| order.get(id).copied().unwrap_or(usize::MAX));
        }
        ids.dedup();
    }

    // ------------------------------------------------------------------
    // Editing
    // ------------------------------------------------------------------

    /// Create a detached element whose prefix is chosen for the scope of
    /// `scope` (the node it will be inserted under). When no prefix is in
    /// scope for `namespace`, the element declares it as its default.
    pub fn create_element(&mut self, scope: NodeId, local: &str, namespace: &str) -> NodeId {
        let local_id = self.strings.intern(local);
        let namespace_id = self.strings.intern(namespace);
        let mut element = XmlNode::element(local_id, 0, namespace_id);

        let default_ns = self.lookup_namespace(scope, "").unwrap_or("");
        if default_ns != namespace {
            match self.lookup_prefix(scope, namespace) {
                Some(prefix) if !namespace.is_empty() => {
                    element.prefix_id = self.strings.intern(&prefix);
                }
                _ => element.namespaces.push((0, namespace_id)),
            }
        }

        trace!("create element {} in `{}`", local, namespace);
        self.push_node(element)
    }

    /// Create a detached text node
    pub fn create_text(&mut self, text: &str) -> NodeId {
        self.push_node(XmlNode::character_data(NodeKind::Text, text.to_string()))
    }

    /// Create a detached attribute for `owner`, declaring a prefix on the
    /// root element when `namespace` has none in scope
    pub fn create_attribute(
        &mut self,
        owner: NodeId,
        local: &str,
        namespace: &str,
        value: &str,
    ) -> NodeId {
        let local_id = self.strings.intern(local);
        let (prefix_id, namespace_id) = if namespace.is_empty() {
            (0, 0)
        } else {
            let prefix = self.ensure_prefix(owner, namespace, None);
            (self.strings.intern(&prefix), self.strings.intern(namespace))
        };
        self.push_node(XmlNode::attribute(
            local_id,
            prefix_id,
            namespace_id,
            value.to_string(),
        ))
    }

    /// Return a prefix bound to `namespace` at `elem`, declaring one on
    /// the outermost ancestor element if necessary
    pub fn ensure_prefix(&mut self, elem: NodeId, namespace: &str, preferred: Option<&str>) -> String {
        if let Some(prefix) = self.lookup_prefix(elem, namespace) {
            return prefix;
        }

        let mut candidate = preferred.map(str::to_string).unwrap_or_else(|| "p".to_string());
        let mut n = 1;
        while self.lookup_namespace(elem, &candidate).is_some() {
            candidate = format!("{}{}", preferred.unwrap_or("p"), n);
            n += 1;
        }

        let mut host = elem;
        while let Some(parent) = self.parent_of(host) {
            if self.nodes[parent as usize].kind != NodeKind::Element {
                break;
            }
            host = parent;
        }
        if self.nodes[host as usize].kind == NodeKind::Element {
            let prefix_id = self.strings.intern(&candidate);
            let uri_id = self.strings.intern(namespace);
            self.nodes[host as usize].namespaces.push((prefix_id, uri_id));
        }
        candidate
    }

    /// Append a detached node as the last child of `parent`
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        self.detach(child);
        if self.nodes[child as usize].is_attribute() {
            self.link_attribute(parent, child);
        } else {
            self.link_child(parent, child);
        }
    }

    /// Insert `node` immediately before `reference`, or append it to the
    /// parent when the two belong to different chains
    pub fn insert_before(&mut self, reference: NodeId, node: NodeId) {
        self.detach(node);
        let Some(parent) = self.parent_of(reference) else {
            return;
        };
        let is_attr = self.nodes[reference as usize].is_attribute();
        if self.nodes[node as usize].is_attribute() != is_attr {
            // Children and attributes never share a chain
            self.append_child(parent, node);
            return;
        }
        let prev = self.nodes[reference as usize].prev_sibling;

        self.nodes[node as usize].parent = Some(parent);
        self.nodes[node as usize].prev_sibling = prev;
        self.nodes[node as usize].next_sibling = Some(reference);
        self.nodes[reference as usize].prev_sibling = Some(node);
        match prev {
            Some(p) => self.nodes[p as usize].next_sibling = Some(node),
            None if is_attr => self.nodes[parent as usize].first_attr = Some(node),
            None => self.nodes[parent as usize].first_child = Some(node),
        }
    }

    /// Unlink a node from its parent; the node and its subtree stay in the
    /// arena, unreachable
    pub fn detach(&mut self, id: NodeId) {
        let Some(parent) = self.nodes[id as usize].parent else {
            return;
        };
        let is_attr = self.nodes[id as usize].is_attribute();
        let prev = self.nodes[id as usize].prev_sibling;
        let next = self.nodes[id as usize].next_sibling;

        match prev {
            Some(p) => self.nodes[p as usize].next_sibling = next,
            None if is_attr => self.nodes[parent as usize].first_attr = next,
            None => self.nodes[parent as usize].first_child = next,
        }
        match next {
            Some(n) => self.nodes[n as usize].prev_sibling = prev,
            None if is_attr => self.nodes[parent as usize].last_attr = prev,
            None => self.nodes[parent as usize].last_child = prev,
        }

        let node = &mut self.nodes[id as usize];
        node.parent = None;
        node.prev_sibling = None;
        node.next_sibling = None;
    }

    /// Set or create an attribute, returning its ID
    pub fn set_attribute(&mut self, elem: NodeId, local: &str, namespace: &str, value: &str) -> NodeId {
        if let Some(attr) = self.find_attribute(elem, local, namespace) {
            self.nodes[attr as usize].text = value.to_string();
            return attr;
        }
        let attr = self.create_attribute(elem, local, namespace, value);
        self.link_attribute(elem, attr);
        attr
    }

    /// Remove an attribute; returns whether one was present
    pub fn remove_attribute(&mut self, elem: NodeId, local: &str, namespace: &str) -> bool {
        match self.find_attribute(elem, local, namespace) {
            Some(attr) => {
                self.detach(attr);
                true
            }
            None => false,
        }
    }

    /// Replace content: elements get a single text child (none for ""),
    /// other nodes have their text replaced
    pub fn set_text(&mut self, id: NodeId, value: &str) {
        match self.nodes[id as usize].kind {
            NodeKind::Element | NodeKind::Document => {
                self.clear_children(id);
                if !value.is_empty() {
                    let text = self.create_text(value);
                    self.link_child(id, text);
                }
            }
            _ => self.nodes[id as usize].text = value.to_string(),
        }
    }

    pub fn clear_children(&mut self, id: NodeId) {
        while let Some(child) = self.nodes[id as usize].first_child {
            self.detach(child);
        }
    }

    /// Remove all attributes; namespace declarations are kept
    pub fn clear_attributes(&mut self, id: NodeId) {
        while let Some(attr) = self.nodes[id as usize].first_attr {
            self.detach(attr);
        }
    }

    /// Deep-copy the attributes and children of `from` onto `to`
    pub fn copy_content(&mut self, from: NodeId, to: NodeId) {
        for attr in self.attributes(from).collect::<Vec<_>>() {
            let (name_id, namespace_id) = {
                let a = &self.nodes[attr as usize];
                (a.name_id, a.namespace_id)
            };
            let local = self.strings.get(name_id).to_string();
            let namespace = self.strings.get(namespace_id).to_string();
            let value = self.nodes[attr as usize].text.clone();
            self.set_attribute(to, &local, &namespace, &value);
        }
        for child in self.children_vec(from) {
            let copy = self.deep_copy(child);
            self.link_child(to, copy);
            self.rebind_namespaces(copy);
        }
    }

    /// Declare whatever a moved subtree's prefixes no longer resolve to at
    /// its new location
    fn rebind_namespaces(&mut self, root: NodeId) {
        let mut pending = vec![root];
        while let Some(id) = pending.pop() {
            if !self.nodes[id as usize].is_element() {
                continue;
            }
            let (prefix_id, uri_id) = {
                let node = &self.nodes[id as usize];
                (node.prefix_id, node.namespace_id)
            };
            if !self.binds(id, prefix_id, uri_id) {
                self.nodes[id as usize].namespaces.push((prefix_id, uri_id));
            }
            for attr in self.attributes(id).collect::<Vec<_>>() {
                let (prefix_id, uri_id) = {
                    let node = &self.nodes[attr as usize];
                    (node.prefix_id, node.namespace_id)
                };
                if prefix_id == 0 || self.binds(id, prefix_id, uri_id) {
                    continue;
                }
                let taken = prefix_id == self.nodes[id as usize].prefix_id
                    || self.nodes[id as usize].namespaces.iter().any(|(p, _)| *p == prefix_id);
                if taken {
                    let uri = self.strings.get(uri_id).to_string();
                    let preferred = self.strings.get(prefix_id).to_string();
                    let prefix = self.ensure_prefix(id, &uri, Some(&preferred));
                    self.nodes[attr as usize].prefix_id = self.strings.intern(&prefix);
                } else {
                    self.nodes[id as usize].namespaces.push((prefix_id, uri_id));
                }
            }
            pending.extend(self.children(id));
        }
    }

    /// Whether `prefix_id` resolves to `uri_id` at `elem`
    fn binds(&self, elem: NodeId, prefix_id: u32, uri_id: u32) -> bool {
        let prefix = self.strings.get(prefix_id);
        let uri = self.strings.get(uri_id);
        self.lookup_namespace(elem, prefix).unwrap_or("") == uri
    }

    /// Give an element or attribute a new name in place, keeping its
    /// position, attributes and children
    pub fn rename(&mut self, id: NodeId, local: &str, namespace: &str) {
        let kind = self.nodes[id as usize].kind;
        let local_id = self.strings.intern(local);
        let namespace_id = self.strings.intern(namespace);
        match kind {
            NodeKind::Element => {
                // Children may rely on our own default declaration
                let keep_default =
                    self.nodes[id as usize].has_children() && !namespace.is_empty();
                if !keep_default {
                    self.nodes[id as usize].namespaces.retain(|&(p, _)| p != 0);
                }
                let has_default = self.nodes[id as usize].namespaces.iter().any(|&(p, _)| p == 0);
                let prefix_id = if self.lookup_namespace(id, "").unwrap_or("") == namespace {
                    0
                } else if let Some(prefix) =
                    self.lookup_prefix(id, namespace).filter(|_| !namespace.is_empty())
                {
                    self.strings.intern(&prefix)
                } else if !has_default {
                    self.nodes[id as usize].namespaces.push((0, namespace_id));
                    0
                } else {
                    let prefix = self.ensure_prefix(id, namespace, None);
                    self.strings.intern(&prefix)
                };
                let node = &mut self.nodes[id as usize];
                node.name_id = local_id;
                node.prefix_id = prefix_id;
                node.namespace_id = namespace_id;
            }
            NodeKind::Attribute => {
                let prefix_id = match self.parent_of(id) {
                    Some(owner) if !namespace.is_empty() => {
                        let prefix = self.ensure_prefix(owner, namespace, None);
                        self.strings.intern(&prefix)
                    }
                    _ => 0,
                };
                let node = &mut self.nodes[id as usize];
                node.name_id = local_id;
                node.prefix_id = prefix_id;
                node.namespace_id = namespace_id;
            }
            _ => {}
        }
        trace!("renamed node {} to {} in `{}`", id, local, namespace);
    }

    /// Whether an element has neither children nor attributes
    pub fn is_empty_element(&self, id: NodeId) -> bool {
        self.get_node(id)
            .is_some_and(|n| n.is_element() && !n.has_children() && !n.has_attributes())
    }

    /// Every prefix binding visible at `elem`, nearest declaration first
    pub fn in_scope_namespaces(&self, elem: NodeId) -> Vec<(String, String)> {
        let mut seen: Vec<(String, String)> = Vec::new();
        let mut current = Some(elem);
        while let Some(c) = current {
            let node = &self.nodes[c as usize];
            for &(p, u) in &node.namespaces {
                let prefix = self.strings.get(p);
                if !seen.iter().any(|(sp, _)| sp == prefix) {
                    seen.push((prefix.to_string(), self.strings.get(u).to_string()));
                }
            }
            current = node.parent;
        }
        seen
    }

    /// Parse `xml` as a sequence of child nodes and append them to
    /// `parent`. Prefixes in scope at `parent` may be used unqualified by
    /// declarations inside the fragment.
    pub fn append_fragment(&mut self, parent: NodeId, xml: &str) -> Result<Vec<NodeId>> {
        let mut wrapper = String::from("<fragment");
        for (prefix, uri) in self.in_scope_namespaces(parent) {
            if prefix.is_empty() {
                wrapper.push_str(" xmlns=\"");
            } else {
                wrapper.push_str(" xmlns:");
                wrapper.push_str(&prefix);
                wrapper.push_str("=\"");
            }
            wrapper.push_str(&escape(uri.as_str()));
            wrapper.push('"');
        }
        wrapper.push('>');
        wrapper.push_str(xml);
        wrapper.push_str("</fragment>");

        let source = XmlDocument::parse(&wrapper)?;
        let Some(root) = source.root_element_id() else {
            return Ok(Vec::new());
        };
        let mut added = Vec::new();
        for child in source.children(root) {
            let copy = self.import(&source, child);
            self.link_child(parent, copy);
            added.push(copy);
        }
        Ok(added)
    }

    /// Copy a subtree of another document into fresh detached nodes
    fn import(&mut self, source: &XmlDocument, id: NodeId) -> NodeId {
        let from = &source.nodes[id as usize];
        let mut node = match from.kind {
            NodeKind::Element => XmlNode::element(
                self.strings.intern(source.strings.get(from.name_id)),
                self.strings.intern(source.strings.get(from.prefix_id)),
                self.strings.intern(source.strings.get(from.namespace_id)),
            ),
            NodeKind::Attribute => XmlNode::attribute(
                self.strings.intern(source.strings.get(from.name_id)),
                self.strings.intern(source.strings.get(from.prefix_id)),
                self.strings.intern(source.strings.get(from.namespace_id)),
                from.text.clone(),
            ),
            kind => XmlNode::character_data(kind, from.text.clone()),
        };
        for &(p, u) in &from.namespaces {
            let prefix_id = self.strings.intern(source.strings.get(p));
            let uri_id = self.strings.intern(source.strings.get(u));
            node.namespaces.push((prefix_id, uri_id));
        }
        let copy = self.push_node(node);

        for attr in source.attributes(id) {
            let attr_copy = self.import(source, attr);
            self.link_attribute(copy, attr_copy);
        }
        for child in source.children(id) {
            let child_copy = self.import(source, child);
            self.link_child(copy, child_copy);
        }
        copy
    }

    /// Copy a subtree into fresh detached nodes
    fn deep_copy(&mut self, id: NodeId) -> NodeId {
        let mut node = self.nodes[id as usize].clone();
        node.parent = None;
        node.prev_sibling = None;
        node.next_sibling = None;
        node.first_child = None;
        node.last_child = None;
        node.first_attr = None;
        node.last_attr = None;
        let copy = self.push_node(node);

        for attr in self.attributes(id).collect::<Vec<_>>() {
            let attr_copy = self.deep_copy(attr);
            self.link_attribute(copy, attr_copy);
        }
        for child in self.children_vec(id) {
            let child_copy = self.deep_copy(child);
            self.link_child(copy, child_copy);
        }
        copy
    }

    // ------------------------------------------------------------------
    // Serialization
    // ------------------------------------------------------------------

    /// Serialize the whole document
    pub fn to_xml(&self) -> String {
        let mut out = String::new();
        for child in self.children(0) {
            self.write_node(child, &mut out);
        }
        out
    }

    /// Serialize one node: markup for elements, `name="value"` for
    /// attributes, escaped text for character data
    pub fn outer_xml(&self, id: NodeId) -> String {
        let mut out = String::new();
        if id == 0 {
            return self.to_xml();
        }
        self.write_node(id, &mut out);
        out
    }

    /// Serialize the children of a node
    pub fn inner_xml(&self, id: NodeId) -> String {
        let mut out = String::new();
        for child in self.children(id) {
            self.write_node(child, &mut out);
        }
        out
    }

    fn write_node(&self, id: NodeId, out: &mut String) {
        let node = &self.nodes[id as usize];
        match node.kind {
            NodeKind::Element => {
                let name = self.qualified_name(id);
                out.push('<');
                out.push_str(&name);
                for &(prefix, uri) in &node.namespaces {
                    if prefix == 0 {
                        out.push_str(" xmlns=\"");
                    } else {
                        out.push_str(" xmlns:");
                        out.push_str(self.strings.get(prefix));
                        out.push_str("=\"");
                    }
                    out.push_str(&escape(self.strings.get(uri)));
                    out.push('"');
                }
                for attr in self.attributes(id) {
                    out.push(' ');
                    self.write_node(attr, out);
                }
                if node.has_children() {
                    out.push('>');
                    for child in self.children(id) {
                        self.write_node(child, out);
                    }
                    out.push_str("</");
                    out.push_str(&name);
                    out.push('>');
                } else {
                    out.push_str("/>");
                }
            }
            NodeKind::Attribute => {
                out.push_str(&self.qualified_name(id));
                out.push_str("=\"");
                out.push_str(&escape(node.text.as_str()));
                out.push('"');
            }
            NodeKind::Text => out.push_str(&partial_escape(node.text.as_str())),
            NodeKind::CData => {
                out.push_str("<![CDATA[");
                out.push_str(&node.text);
                out.push_str("]]>");
            }
            NodeKind::Comment => {
                out.push_str("<!--");
                out.push_str(&node.text);
                out.push_str("-->");
            }
            NodeKind::Document => {
                for child in self.children(id) {
                    self.write_node(child, out);
                }
            }
        }
    }
}

/// The namespace bound to a start-tag prefix; the empty prefix may be unbound
fn resolve_prefix(scopes: &NamespaceScopes, prefix_id: u32, prefix: &str) -> Result<u32> {
    match scopes.resolve(prefix_id) {
        Some(uri) => Ok(uri),
        None if prefix_id == 0 => Ok(0),
        None => Err(Error::xml(NamespaceError::UnknownPrefix(prefix.as_bytes().to_vec()))),
    }
}

/// Split `prefix:local` into its parts
pub fn split_qname(qname: &str) -> (&str, &str) {
    match memchr::memchr(b':', qname.as_bytes()) {
        Some(pos) => (&qname[..pos], &qname[pos + 1..]),
        None => ("", qname),
    }
}

/// Iterator over a sibling chain (children or attributes)
pub struct ChildIter<'a> {
    doc: &'a XmlDocument,
    next: Option<NodeId>,
}

impl<'a> Iterator for ChildIter<'a> {
    type Item = NodeId;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        self.next = self.doc.next_sibling_of(current);
        Some(current)
    }
}

/// Iterator over descendant nodes, in document order
pub struct DescendantIter<'a> {
    doc: &'a XmlDocument,
    stack: Vec<NodeId>,
}

impl<'a> Iterator for DescendantIter<'a> {
    type Item = NodeId;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.stack.pop()?;
        if let Some(node) = self.doc.get_node(current) {
            let mut child_id = node.last_child;
            while let Some(id) = child_id {
                self.stack.push(id);
                child_id = self.doc.prev_sibling_of(id);
            }
        }
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn element(doc: &XmlDocument, parent: NodeId, name: &str) -> NodeId {
        doc.children(parent)
            .find(|&c| doc.local_name(c) == name)
            .unwrap()
    }

    #[test]
    fn test_parse_structure() {
        let doc = XmlDocument::parse("<root a='1'><child>text</child><other/></root>").unwrap();
        let root = doc.root_element_id().unwrap();
        assert_eq!(doc.local_name(root), "root");
        assert_eq!(doc.get_attribute(root, "a", ""), Some("1"));
        assert_eq!(doc.children_vec(root).len(), 2);
        assert_eq!(doc.string_value(root), "text");
    }

    #[test]
    fn test_whitespace_only_text_dropped() {
        let doc = XmlDocument::parse("<root>\n  <a/>\n  <b> x </b>\n</root>").unwrap();
        let root = doc.root_element_id().unwrap();
        assert_eq!(doc.children_vec(root).len(), 2);
        assert_eq!(doc.string_value(root), " x ");
    }

    #[test]
    fn test_namespaces_resolved() {
        let doc = XmlDocument::parse(
            "<r xmlns='urn:d' xmlns:p='urn:p'><p:a p:x='1' y='2'/><b/></r>",
        )
        .unwrap();
        let root = doc.root_element_id().unwrap();
        let a = element(&doc, root, "a");
        let b = element(&doc, root, "b");
        assert_eq!(doc.namespace_uri(root), "urn:d");
        assert_eq!(doc.namespace_uri(a), "urn:p");
        assert_eq!(doc.namespace_uri(b), "urn:d");
        assert_eq!(doc.get_attribute(a, "x", "urn:p"), Some("1"));
        assert_eq!(doc.get_attribute(a, "y", ""), Some("2"));
        assert_eq!(doc.lookup_prefix(b, "urn:p").as_deref(), Some("p"));
        assert_eq!(doc.lookup_namespace(b, ""), Some("urn:d"));
    }

    #[test]
    fn test_round_trip_serialization() {
        let xml = "<r xmlns:p=\"urn:p\"><p:a x=\"&lt;1&gt;\">a &amp; b</p:a><!--c--></r>";
        let doc = XmlDocument::parse(xml).unwrap();
        assert_eq!(doc.to_xml(), xml);
    }

    #[test]
    fn test_insert_before_and_detach() {
        let mut doc = XmlDocument::parse("<r><b/></r>").unwrap();
        let root = doc.root_element_id().unwrap();
        let b = element(&doc, root, "b");
        let a = doc.create_element(root, "a", "");
        doc.insert_before(b, a);
        assert_eq!(doc.to_xml(), "<r><a/><b/></r>");

        doc.detach(b);
        assert_eq!(doc.to_xml(), "<r><a/></r>");
        assert!(!doc.is_attached(b));
        assert!(doc.is_attached(a));
    }

    #[test]
    fn test_create_element_in_default_namespace() {
        let mut doc = XmlDocument::parse("<r xmlns='urn:d'/>").unwrap();
        let root = doc.root_element_id().unwrap();
        let same = doc.create_element(root, "a", "urn:d");
        doc.append_child(root, same);
        let none = doc.create_element(root, "b", "");
        doc.append_child(root, none);
        assert_eq!(doc.to_xml(), "<r xmlns=\"urn:d\"><a/><b xmlns=\"\"/></r>");
    }

    #[test]
    fn test_set_attribute_declares_prefix_on_root() {
        let mut doc = XmlDocument::parse("<r><a/></r>").unwrap();
        let root = doc.root_element_id().unwrap();
        let a = element(&doc, root, "a");
        let prefix = doc.ensure_prefix(a, ns::XSI, Some("xsi"));
        assert_eq!(prefix, "xsi");
        doc.set_attribute(a, "nil", ns::XSI, "true");
        assert_eq!(
            doc.to_xml(),
            "<r xmlns:xsi=\"http://www.w3.org/2001/XMLSchema-instance\"><a xsi:nil=\"true\"/></r>"
        );
        assert!(doc.remove_attribute(a, "nil", ns::XSI));
        assert!(!doc.remove_attribute(a, "nil", ns::XSI));
    }

    #[test]
    fn test_clear_keeps_namespace_declarations() {
        let mut doc = XmlDocument::parse("<r xmlns:p='urn:p' p:a='1'><x/></r>").unwrap();
        let root = doc.root_element_id().unwrap();
        doc.clear_attributes(root);
        doc.clear_children(root);
        assert_eq!(doc.to_xml(), "<r xmlns:p=\"urn:p\"/>");
    }

    #[test]
    fn test_copy_content() {
        let mut doc = XmlDocument::parse("<r><a k='v'>t<e>f</e></a><b/></r>").unwrap();
        let root = doc.root_element_id().unwrap();
        let a = element(&doc, root, "a");
        let b = element(&doc, root, "b");
        doc.copy_content(a, b);
        assert_eq!(doc.to_xml(), "<r><a k=\"v\">t<e>f</e></a><b k=\"v\">t<e>f</e></b></r>");
    }

    #[test]
    fn test_sort_document_order() {
        let mut doc = XmlDocument::parse("<r><b/></r>").unwrap();
        let root = doc.root_element_id().unwrap();
        let b = element(&doc, root, "b");
        let a = doc.create_element(root, "a", "");
        doc.insert_before(b, a);
        let mut ids = vec![b, a, b];
        doc.sort_document_order(&mut ids);
        assert_eq!(ids, vec![a, b]);
    }

    #[test]
    fn test_rename_keeps_position_and_content() {
        let mut doc = XmlDocument::parse("<r xmlns:p='urn:p'><a k='v'>t</a><b/></r>").unwrap();
        let root = doc.root_element_id().unwrap();
        let a = element(&doc, root, "a");
        doc.rename(a, "c", "urn:p");
        assert_eq!(doc.to_xml(), "<r xmlns:p=\"urn:p\"><p:c k=\"v\">t</p:c><b/></r>");
        doc.rename(a, "d", "urn:q");
        assert_eq!(
            doc.to_xml(),
            "<r xmlns:p=\"urn:p\"><d xmlns=\"urn:q\" k=\"v\">t</d><b/></r>"
        );
    }

    #[test]
    fn test_unbound_prefix_is_rejected() {
        assert!(matches!(XmlDocument::parse("<r><p:e/></r>"), Err(Error::Xml(_))));
        assert!(matches!(XmlDocument::parse("<r p:k='1'/>"), Err(Error::Xml(_))));
        assert!(XmlDocument::parse("<r xml:lang='en'><e xmlns='urn:d'/></r>").is_ok());
    }

    #[test]
    fn test_copied_content_keeps_its_namespaces() {
        let mut doc =
            XmlDocument::parse("<r><a xmlns:p='urn:p' xmlns='urn:d'><p:x p:k='1'/><y/></a><b/></r>")
                .unwrap();
        let root = doc.root_element_id().unwrap();
        let a = element(&doc, root, "a");
        let b = element(&doc, root, "b");
        doc.copy_content(a, b);

        let reparsed = XmlDocument::parse(&doc.to_xml()).unwrap();
        let root = reparsed.root_element_id().unwrap();
        let b = element(&reparsed, root, "b");
        let copied = reparsed.children_vec(b);
        assert_eq!(reparsed.namespace_uri(copied[0]), "urn:p");
        assert_eq!(reparsed.get_attribute(copied[0], "k", "urn:p"), Some("1"));
        assert_eq!(reparsed.namespace_uri(copied[1]), "urn:d");
    }

    #[test]
    fn test_append_fragment_uses_scope_prefixes() {
        let mut doc = XmlDocument::parse("<r xmlns:p='urn:p'><a/></r>").unwrap();
        let root = doc.root_element_id().unwrap();
        let a = element(&doc, root, "a");
        let added = doc.append_fragment(a, "<p:x>1</p:x><y/>").unwrap();
        assert_eq!(added.len(), 2);
        assert_eq!(doc.namespace_uri(added[0]), "urn:p");
        assert_eq!(doc.to_xml(), "<r xmlns:p=\"urn:p\"><a><p:x>1</p:x><y/></a></r>");
    }

    #[test]
    fn test_empty_element() {
        let doc = XmlDocument::parse("<r><a/><b k='1'/><c>t</c></r>").unwrap();
        let root = doc.root_element_id().unwrap();
        assert!(doc.is_empty_element(element(&doc, root, "a")));
        assert!(!doc.is_empty_element(element(&doc, root, "b")));
        assert!(!doc.is_empty_element(element(&doc, root, "c")));
    }

    #[test]
    fn test_malformed_xml_is_an_error() {
        assert!(XmlDocument::parse("<r><a></r>").is_err());
    }
}
