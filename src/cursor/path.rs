//! Path cursor
//!
//! Selects nodes through a compiled path. For a creatable path the first
//! step is selected from the parent and each later step from the node the
//! previous one reached; a chain that stops early is a *partial* match,
//! and creating through it builds only the missing steps. Paths outside the
//! creatable subset are read-only.

use std::sync::Arc;

use log::{debug, trace};

use super::{CursorFlags, CursorOps};
use crate::dom::{Document, NodeId, NodeKind};
use crate::error::{Error, Result};
use crate::node::{xsi, Backend, Location, Navigator, Node, NodeType, Placeholder};
use crate::path::{CompiledPath, CompiledStep, PathNode, PathValue};
use crate::types::{DataType, TypeMap, XmlName};

/// Selection results, buffered so nodes created or removed while iterating
/// do not disturb the enumeration
struct Matches {
    items: Vec<Navigator>,
    next: usize,
}

impl Matches {
    fn new(items: Vec<Navigator>) -> Self {
        Matches { items, next: 0 }
    }

    fn advance(&mut self) -> Option<Navigator> {
        while let Some(item) = self.items.get(self.next) {
            self.next += 1;
            if item.is_attached() {
                return Some(item.clone());
            }
        }
        None
    }

    fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

enum Seek {
    Match,
    Partial,
    NoMatch,
}

pub(crate) struct PathCursor {
    parent: Node,
    path: Arc<CompiledPath>,
    types: TypeMap,
    flags: CursorFlags,
    backend: Backend,
    matches: Option<Matches>,
    /// Deepest node reached; at full depth it is the current match
    node: Option<Navigator>,
    depth: usize,
    data_type: Option<DataType>,
    started: bool,
}

impl PathCursor {
    pub(crate) fn new(
        parent: Node,
        path: Arc<CompiledPath>,
        types: TypeMap,
        flags: CursorFlags,
    ) -> Result<Self> {
        let mut cursor = PathCursor {
            backend: parent.backend(),
            parent,
            path,
            types,
            flags,
            matches: None,
            node: None,
            depth: 0,
            data_type: None,
            started: false,
        };
        cursor.matches = cursor.select_matches()?;
        Ok(cursor)
    }

    fn select_matches(&self) -> Result<Option<Matches>> {
        let Some(location) = self.parent.location() else {
            return Ok(None);
        };
        let select = match self.path.first_step() {
            Some(step) => &step.select,
            None => self.path.select(),
        };
        let found = Navigator::new(location.doc, location.id).select(select)?;
        Ok(Some(Matches::new(found)))
    }

    fn target_depth(&self) -> usize {
        if self.path.is_creatable() {
            self.path.depth()
        } else {
            1
        }
    }

    fn has_current(&self) -> bool {
        self.node.is_some() && self.depth == self.target_depth()
    }

    fn clear_position(&mut self) {
        self.node = None;
        self.depth = 0;
        self.data_type = None;
    }

    fn require_mutable(&self) -> Result<()> {
        if !self.flags.is_mutable() {
            return Err(Error::invalid_operation("cursor is not mutable"));
        }
        if !self.path.is_creatable() {
            return Err(Error::invalid_operation(format!(
                "path `{}` is not creatable",
                self.path.expression()
            )));
        }
        Ok(())
    }

    /// Follow the remaining steps down from the first-step node
    fn seek(&mut self) -> Result<Seek> {
        let path = Arc::clone(&self.path);
        let target = self.target_depth();
        while self.depth < target {
            let (Some(step), Some(node)) = (path.step(self.depth), &self.node) else {
                return Ok(Seek::NoMatch);
            };
            let mut found = node.select(&step.select)?;
            match found.len() {
                0 => return Ok(Seek::Partial),
                1 => {
                    self.node = found.pop();
                    self.depth += 1;
                }
                _ => return Ok(Seek::NoMatch),
            }
        }

        let Some(node) = &self.node else {
            return Ok(Seek::NoMatch);
        };
        let xsi_type = xsi::read_type(&node.document().borrow(), node.id());
        match self.types.lookup_xsi_type(xsi_type.as_ref()) {
            Some(known) => {
                self.data_type = Some(known.data_type.clone());
                Ok(Seek::Match)
            }
            None => Ok(Seek::NoMatch),
        }
    }

    fn resolve_namespace(doc: &Document, prefix: Option<&str>) -> Result<String> {
        match prefix {
            None => Ok(String::new()),
            Some(prefix) => doc
                .context()
                .namespace_uri(prefix)
                .map(str::to_string)
                .ok_or_else(|| Error::evaluation(format!("unbound namespace prefix `{}`", prefix))),
        }
    }

    /// Create the element or attribute a path node names under `host`.
    /// An attribute that already exists is reused and its value replaced.
    fn create_named(host: &Navigator, anchor: Option<NodeId>, node: &PathNode) -> Result<Navigator> {
        let local = node
            .local_name
            .as_deref()
            .ok_or_else(|| Error::invalid_operation("cannot create a self reference"))?;
        let namespace = Self::resolve_namespace(host.document(), node.prefix.as_deref())?;
        let mut doc = host.document().borrow_mut();
        let id = if node.is_attribute {
            if let Some(existing) = doc.find_attribute(host.id(), local, &namespace) {
                doc.set_text(existing, "");
                return Ok(Navigator::new(host.document().clone(), existing));
            }
            doc.create_attribute(host.id(), local, &namespace, "")
        } else {
            doc.create_element(host.id(), local, &namespace)
        };
        match anchor {
            Some(anchor) => doc.insert_before(anchor, id),
            None => doc.append_child(host.id(), id),
        }
        Ok(Navigator::new(host.document().clone(), id))
    }

    fn write_value(node: &Navigator, value: Option<&PathValue>) -> Result<()> {
        let Some(value) = value else {
            return Ok(());
        };
        let result = node.evaluate(&value.expr)?;
        let text = result.string(&node.document().borrow());
        node.document().borrow_mut().set_text(node.id(), &text);
        Ok(())
    }

    /// Build step `index` under `host`, then everything it requires:
    /// attributes before elements, the next step before dependencies.
    /// Returns the created step nodes, outermost first.
    fn write_step(
        path: &CompiledPath,
        host: &Navigator,
        anchor: Option<NodeId>,
        index: usize,
    ) -> Result<Vec<Navigator>> {
        let step: &CompiledStep = path
            .step(index)
            .ok_or_else(|| Error::invalid_operation("path has no step to create"))?;
        let node = Self::create_named(host, anchor, &step.node)?;
        let mut chain = vec![node.clone()];
        if step.is_attribute() || step.is_simple() {
            Self::write_value(&node, step.node.value())?;
            return Ok(chain);
        }
        for attributes in [true, false] {
            if step.next_step().is_some_and(|next| next.is_attribute() == attributes) {
                chain.extend(Self::write_step(path, &node, None, index + 1)?);
            }
            for dependency in step
                .node
                .named_dependencies()
                .filter(|d| d.is_attribute == attributes)
            {
                Self::write_dependency(&node, dependency)?;
            }
        }
        Ok(chain)
    }

    fn write_dependency(host: &Navigator, dependency: &PathNode) -> Result<()> {
        let node = Self::create_named(host, None, dependency)?;
        if dependency.is_attribute || dependency.is_simple() {
            return Self::write_value(&node, dependency.value());
        }
        for attributes in [true, false] {
            if let Some(next) = dependency
                .next
                .as_deref()
                .filter(|n| n.is_attribute == attributes)
            {
                Self::write_dependency(&node, next)?;
            }
            for nested in dependency
                .named_dependencies()
                .filter(|d| d.is_attribute == attributes)
            {
                Self::write_dependency(&node, nested)?;
            }
        }
        Ok(())
    }

    fn settle(&mut self, base: usize, chain: Vec<Navigator>) {
        self.depth = base + chain.len();
        self.node = chain.into_iter().last();
    }

    /// A whole new chain before the first-step node of the current match
    fn insert(&mut self) -> Result<()> {
        let Some(mut first) = self.node.clone() else {
            return Err(Error::invalid_operation("cursor is not positioned on a match"));
        };
        for _ in 1..self.depth {
            first.move_to_parent();
        }
        let mut host = first.clone();
        host.move_to_parent();
        let chain = Self::write_step(&self.path, &host, Some(first.id()), 0)?;
        self.settle(0, chain);
        Ok(())
    }

    /// The missing steps below a partial match
    fn complete(&mut self) -> Result<()> {
        let Some(host) = self.node.clone() else {
            return Err(Error::invalid_operation("cursor has no partial match"));
        };
        if host.kind() == Some(NodeKind::Element) {
            xsi::write_nil(&mut host.document().borrow_mut(), host.id(), false);
        }
        let chain = Self::write_step(&self.path, &host, None, self.depth)?;
        self.settle(self.depth, chain);
        Ok(())
    }

    /// A whole new chain after the existing content of the parent
    fn append(&mut self) -> Result<()> {
        let location = self.parent.realize_location()?;
        if self.parent.kind() == NodeType::Element {
            self.parent.set_nil(false)?;
        }
        if self.matches.is_none() {
            self.matches = Some(Matches::new(Vec::new()));
        }
        let host = Navigator::new(location.doc, location.id);
        let chain = Self::write_step(&self.path, &host, None, 0)?;
        self.settle(0, chain);
        Ok(())
    }

    fn current_is_attribute(&self) -> bool {
        self.node
            .as_ref()
            .is_some_and(|n| n.kind() == Some(NodeKind::Attribute))
    }
}

impl CursorOps for PathCursor {
    fn move_next(&mut self) -> Result<bool> {
        self.started = true;
        if self.matches.is_none() {
            self.matches = self.select_matches()?;
        }
        self.clear_position();
        let multiple = self.flags.allows_multiple();
        loop {
            let Some(matches) = self.matches.as_mut() else {
                return Ok(false);
            };
            let Some(first) = matches.advance() else {
                return Ok(false);
            };
            if !multiple && matches.advance().is_some() {
                trace!("path `{}` is ambiguous", self.path.expression());
                return Ok(false);
            }
            self.node = Some(first);
            self.depth = 1;
            match self.seek()? {
                Seek::Match => {
                    trace!("path `{}` matched at depth {}", self.path.expression(), self.depth);
                    return Ok(true);
                }
                // Kept so that creating completes it rather than starting over
                Seek::Partial if !multiple => return Ok(false),
                _ => self.clear_position(),
            }
        }
    }

    fn reset(&mut self) {
        if let Some(matches) = self.matches.as_mut() {
            matches.next = 0;
        }
        self.clear_position();
        self.started = false;
    }

    fn move_to_end(&mut self) -> Result<()> {
        if let Some(matches) = self.matches.as_mut() {
            matches.next = matches.items.len();
        }
        self.clear_position();
        self.started = true;
        Ok(())
    }

    fn is_at_end(&mut self) -> Result<bool> {
        let next = self.matches.as_ref().map(|m| m.next);
        let saved = (self.node.clone(), self.depth, self.data_type.clone(), self.started);
        let found = self.move_next()?;
        if let (Some(matches), Some(next)) = (self.matches.as_mut(), next) {
            matches.next = next;
        }
        (self.node, self.depth, self.data_type, self.started) = saved;
        Ok(!found)
    }

    fn move_to(&mut self, position: &Location) -> Result<()> {
        self.reset();
        while self.move_next()? {
            if self.current().is_some_and(|c| c.same_position(position)) {
                return Ok(());
            }
        }
        Err(Error::invalid_operation("node is not selected by this cursor"))
    }

    fn create(&mut self, data_type: &DataType) -> Result<()> {
        self.require_mutable()?;
        let known = self.types.require(data_type)?.clone();
        if !self.started {
            return Err(Error::invalid_operation("cursor has not been moved"));
        }
        let attribute = self.path.last_step().is_some_and(CompiledStep::is_attribute);
        if attribute && known.xsi_type.is_some() {
            return Err(Error::invalid_operation("attributes cannot carry xsi:type"));
        }

        if self.has_current() {
            self.insert()?;
        } else if self.node.is_some() {
            self.complete()?;
        } else {
            self.append()?;
        }
        if let (Some(node), Some(xsi_type)) = (&self.node, known.xsi_type.as_ref()) {
            xsi::write_type(&mut node.document().borrow_mut(), node.id(), Some(xsi_type));
        }
        self.data_type = Some(known.data_type.clone());
        debug!("created `{}` as {}", self.path.expression(), known.data_type);
        Ok(())
    }

    fn coerce(&mut self, data_type: &DataType) -> Result<()> {
        self.require_mutable()?;
        let known = self.types.require(data_type)?.clone();
        if !self.has_current() {
            return Err(Error::invalid_operation("cursor is not positioned on a match"));
        }
        if self.current_is_attribute() {
            if known.xsi_type.is_some() {
                return Err(Error::invalid_operation("attributes cannot carry xsi:type"));
            }
        } else if let Some(node) = &self.node {
            xsi::write_type(&mut node.document().borrow_mut(), node.id(), known.xsi_type.as_ref());
        }
        self.data_type = Some(known.data_type.clone());
        Ok(())
    }

    /// Delete the match, then every ancestor up to the first step that is
    /// left without children or attributes
    fn remove(&mut self) -> Result<()> {
        self.require_mutable()?;
        let Some(mut node) = self.node.clone() else {
            return Err(Error::invalid_operation("cursor is not positioned on a match"));
        };
        let mut depth = self.depth;
        if self.has_current() {
            node.delete_self();
            depth -= 1;
        }
        while depth > 0 && node.document().borrow().is_empty_element(node.id()) {
            node.delete_self();
            depth -= 1;
        }
        debug!("removed `{}` ({} levels kept)", self.path.expression(), depth);
        self.clear_position();
        Ok(())
    }

    fn realize(&mut self) -> Result<()> {
        if self.has_current() {
            return Ok(());
        }
        let realizable = self.node.is_some() || self.matches.as_ref().is_none_or(Matches::is_empty);
        if !realizable {
            return Err(Error::invalid_operation("cursor is not in a realizable state"));
        }
        self.started = true;
        let default = self.types.default_type().data_type.clone();
        self.create(&default)
    }

    fn current(&self) -> Option<Location> {
        if !self.has_current() {
            return None;
        }
        let node = self.node.as_ref()?;
        Some(Location::new(node.document().clone(), node.id(), self.backend))
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
        let attribute = match self.path.last_step() {
            Some(step) => step.is_attribute(),
            None => !self.flags.includes_elements(),
        };
        Placeholder {
            kind: if attribute { NodeType::Attribute } else { NodeType::Element },
            name: XmlName::new("", ""),
            xsi_type: default.xsi_type.clone(),
            data_type: default.data_type.clone(),
        }
    }

    fn backend(&self) -> Backend {
        self.backend
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cursor::Cursor;
    use crate::types::XmlType;

    const MUTABLE: CursorFlags = CursorFlags(CursorFlags::ELEMENTS.0 | CursorFlags::MUTABLE.0);

    fn strings() -> TypeMap {
        TypeMap::single(XmlName::local("Value"), DataType::string())
    }

    fn select(doc: &Document, path: &str, flags: CursorFlags) -> Cursor {
        let root = doc.root_element(Backend::Navigator).unwrap();
        root.select(path, &strings(), flags).unwrap()
    }

    #[test]
    fn test_create_whole_chain() {
        let doc = Document::parse("<r/>").unwrap();
        let cursor = select(&doc, "a/b[@k='1']/c", MUTABLE);
        assert!(!cursor.move_next().unwrap());
        cursor.create(&DataType::string()).unwrap();
        cursor.set_value("v").unwrap();
        assert_eq!(doc.to_xml(), "<r><a><b k=\"1\"><c>v</c></b></a></r>");

        let again = select(&doc, "a/b[@k='1']/c", CursorFlags::ELEMENTS);
        assert!(again.move_next().unwrap());
        assert_eq!(again.value(), "v");
    }

    #[test]
    fn test_partial_match_is_completed() {
        let doc = Document::parse("<r><a><x/></a></r>").unwrap();
        let cursor = select(&doc, "a/b", MUTABLE);
        assert!(!cursor.move_next().unwrap());
        cursor.create(&DataType::string()).unwrap();
        assert_eq!(doc.to_xml(), "<r><a><x/><b/></a></r>");
    }

    #[test]
    fn test_dependency_values_and_order() {
        let doc = Document::parse("<r/>").unwrap();
        doc.context_mut().set_variable("v", "var");
        let cursor = select(&doc, "a[c='2'][@d=$v]/b", MUTABLE);
        cursor.move_next().unwrap();
        cursor.create(&DataType::string()).unwrap();
        assert_eq!(doc.to_xml(), "<r><a d=\"var\"><b/><c>2</c></a></r>");
    }

    #[test]
    fn test_prefixes_resolve_through_context() {
        let doc = Document::parse("<r/>").unwrap();
        doc.context_mut().add_namespace("n", "urn:n");
        let cursor = select(&doc, "n:a", MUTABLE);
        cursor.move_next().unwrap();
        cursor.create(&DataType::string()).unwrap();
        assert_eq!(doc.to_xml(), "<r><a xmlns=\"urn:n\"/></r>");

        let root = doc.root_element(Backend::Tree).unwrap();
        let unbound = root.select("m:a", &strings(), MUTABLE);
        assert!(matches!(unbound, Err(Error::Evaluation(_))));
    }

    #[test]
    fn test_insert_before_current() {
        let doc = Document::parse("<r><a>1</a><a>2</a></r>").unwrap();
        let flags = MUTABLE | CursorFlags::MULTIPLE;
        let cursor = select(&doc, "a", flags);
        assert!(cursor.move_next().unwrap());
        assert!(cursor.move_next().unwrap());
        cursor.create(&DataType::string()).unwrap();
        cursor.set_value("new").unwrap();
        assert_eq!(doc.to_xml(), "<r><a>1</a><a>new</a><a>2</a></r>");
        assert!(!cursor.move_next().unwrap());
    }

    #[test]
    fn test_move_to_end_then_create_appends() {
        let doc = Document::parse("<r><a>1</a><a>2</a></r>").unwrap();
        let flags = MUTABLE | CursorFlags::MULTIPLE;
        let cursor = select(&doc, "a", flags);
        assert!(cursor.move_next().unwrap());
        cursor.move_to_end().unwrap();
        assert!(!cursor.is_real());
        cursor.create(&DataType::string()).unwrap();
        cursor.set_value("3").unwrap();
        assert_eq!(doc.to_xml(), "<r><a>1</a><a>2</a><a>3</a></r>");

        let fresh = select(&doc, "a", flags);
        fresh.move_to_end().unwrap();
        fresh.create(&DataType::string()).unwrap();
        fresh.set_value("4").unwrap();
        assert_eq!(doc.to_xml(), "<r><a>1</a><a>2</a><a>3</a><a>4</a></r>");
    }

    #[test]
    fn test_single_ambiguous_is_absent() {
        let doc = Document::parse("<r><a/><a/></r>").unwrap();
        let single = select(&doc, "a", CursorFlags::ELEMENTS);
        assert!(!single.move_next().unwrap());
        let multiple = select(&doc, "a", CursorFlags::ELEMENTS | CursorFlags::MULTIPLE);
        assert!(multiple.move_next().unwrap());
        assert!(multiple.move_next().unwrap());
        assert!(!multiple.move_next().unwrap());
    }

    #[test]
    fn test_remove_prunes_empty_ancestors() {
        let doc = Document::parse("<r><a><b><c>1</c></b></a><z/></r>").unwrap();
        let cursor = select(&doc, "a/b/c", MUTABLE);
        assert!(cursor.move_next().unwrap());
        cursor.remove().unwrap();
        assert!(!cursor.is_real());
        assert_eq!(doc.to_xml(), "<r><z/></r>");
    }

    #[test]
    fn test_conflicting_dependency_is_overwritten() {
        let doc = Document::parse("<r><a k='2'/></r>").unwrap();
        let cursor = select(&doc, "a/@k[.='1']", MUTABLE);
        assert!(!cursor.move_next().unwrap());
        cursor.create(&DataType::string()).unwrap();
        assert_eq!(doc.to_xml(), "<r><a k=\"1\"/></r>");
        assert_eq!(cursor.value(), "1");
    }

    #[test]
    fn test_remove_keeps_occupied_ancestors() {
        let doc = Document::parse("<r><a k='1'><b>1</b></a></r>").unwrap();
        let cursor = select(&doc, "a/b", MUTABLE);
        assert!(cursor.move_next().unwrap());
        cursor.remove().unwrap();
        assert_eq!(doc.to_xml(), "<r><a k=\"1\"/></r>");
    }

    #[test]
    fn test_read_only_path() {
        let doc = Document::parse("<r><a>1</a><a>2</a></r>").unwrap();
        let flags = MUTABLE | CursorFlags::MULTIPLE;
        let cursor = select(&doc, "a[position() = 2]", flags);
        assert!(cursor.move_next().unwrap());
        assert_eq!(cursor.value(), "2");
        assert!(matches!(cursor.remove(), Err(Error::InvalidOperation(_))));
        assert!(matches!(cursor.coerce(&DataType::string()), Err(Error::InvalidOperation(_))));
    }

    #[test]
    fn test_xsi_type_selects_type() {
        let animal = DataType::reference("Animal");
        let dog = DataType::derived("Dog", &animal);
        let types = TypeMap::single(XmlName::local("Pet"), animal)
            .with(XmlType::new(XmlName::local("Pet"), dog.clone()).with_xsi_type(XmlName::new("Dog", "")));
        let doc = Document::parse("<r/>").unwrap();
        let root = doc.root_element(Backend::Tree).unwrap();

        let cursor = root.select("pet", &types, MUTABLE).unwrap();
        cursor.move_next().unwrap();
        cursor.create(&dog).unwrap();
        assert_eq!(cursor.xsi_type(), Some(XmlName::new("Dog", "")));

        let again = root.select("pet", &types, CursorFlags::ELEMENTS).unwrap();
        assert!(again.move_next().unwrap());
        assert_eq!(again.data_type(), Some(dog));
    }
}
