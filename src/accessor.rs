//! Reading and writing one typed slot of a parent node
//!
//! An [`XmlAccessor`] ties together the pieces a bound property needs: how
//! to select its node (child element, attribute or path), which types may
//! appear there, how `None` is stored, and whether values are shared
//! through a [`ReferenceManager`].

use log::debug;

use crate::cursor::{Cursor, CursorFlags};
use crate::error::Result;
use crate::node::{Node, NodeType};
use crate::references::{GetStarting, ReferenceManager};
use crate::serializer::{self, TypeSerializer};
use crate::types::{DataType, TypeMap, XmlName, XmlType};
use crate::value::Value;

use std::sync::Arc;

#[derive(Debug, Clone)]
enum Selector {
    Element(XmlName),
    Attribute(XmlName),
    Path(String),
}

#[derive(Debug, Clone)]
pub struct XmlAccessor {
    selector: Selector,
    data_type: DataType,
    types: TypeMap,
    nillable: bool,
    reference: bool,
}

impl XmlAccessor {
    fn build(selector: Selector, name: XmlName, data_type: DataType) -> Self {
        XmlAccessor {
            selector,
            types: TypeMap::single(name, data_type.clone()),
            data_type,
            nillable: false,
            reference: false,
        }
    }

    /// A child element. Unqualified names take the parent's namespace.
    pub fn element(name: XmlName, data_type: DataType) -> Self {
        Self::build(Selector::Element(name.clone()), name, data_type)
    }

    /// An attribute. Unqualified names are in no namespace.
    pub fn attribute(name: XmlName, data_type: DataType) -> Self {
        Self::build(Selector::Attribute(name.clone()), name, data_type)
    }

    /// Whatever a path expression selects, created along the path on write
    pub fn path(expression: &str, data_type: DataType) -> Self {
        Self::build(
            Selector::Path(expression.to_string()),
            XmlName::local(""),
            data_type,
        )
    }

    /// Store `None` as `xsi:nil="true"` instead of removing the node
    pub fn nillable(mut self, nillable: bool) -> Self {
        self.nillable = nillable;
        self
    }

    /// Share values with identity through the reference manager
    pub fn reference(mut self, reference: bool) -> Self {
        self.reference = reference;
        self
    }

    /// Allow a derived type, marked with `xsi_type`
    pub fn with_subtype(mut self, data_type: DataType, xsi_type: XmlName) -> Self {
        let name = match &self.selector {
            Selector::Element(name) | Selector::Attribute(name) => name.clone(),
            Selector::Path(_) => XmlName::local(""),
        };
        self.types = self
            .types
            .with(XmlType::new(name, data_type).with_xsi_type(xsi_type));
        self
    }

    pub fn data_type(&self) -> &DataType {
        &self.data_type
    }

    fn select(&self, parent: &Node, flags: CursorFlags) -> Result<Cursor> {
        match &self.selector {
            Selector::Element(_) => {
                Ok(parent.select_children(&self.types, flags | CursorFlags::ELEMENTS))
            }
            Selector::Attribute(_) => {
                Ok(parent.select_children(&self.types, flags | CursorFlags::ATTRIBUTES))
            }
            Selector::Path(expression) => {
                parent.select(expression, &self.types, flags | CursorFlags::ELEMENTS)
            }
        }
    }

    /// Whether the node exists
    pub fn is_defined(&self, parent: &Node) -> Result<bool> {
        self.select(parent, CursorFlags::NONE)?.move_next()
    }

    /// The stored value; `None` when the node is absent or nil
    pub fn get(&self, parent: &Node, refs: &mut ReferenceManager) -> Result<Option<Value>> {
        let cursor = self.select(parent, CursorFlags::NONE)?;
        if !cursor.move_next()? {
            return Ok(None);
        }
        self.read_tracked(&cursor, refs)
    }

    fn read_tracked(&self, node: &Node, refs: &mut ReferenceManager) -> Result<Option<Value>> {
        if !self.reference {
            return self.read(node);
        }
        match refs.on_get_starting(node)? {
            GetStarting::Cached(value) => Ok(Some(value)),
            GetStarting::Proceed { node, token } => {
                let value = self.read(&node)?;
                if let Some(value) = &value {
                    refs.on_get_completed(&node, value, token);
                }
                Ok(value)
            }
        }
    }

    fn read(&self, node: &Node) -> Result<Option<Value>> {
        if node.is_nil() {
            return Ok(None);
        }
        let data_type = node.data_type().unwrap_or_else(|| self.data_type.clone());
        serializer_for(&data_type)?.read(node).map(Some)
    }

    /// Replace `old` with `new`. `None` removes the node, or marks it nil
    /// when the accessor is nillable.
    pub fn set(
        &self,
        parent: &Node,
        refs: &mut ReferenceManager,
        old: Option<&Value>,
        new: Option<&Value>,
    ) -> Result<()> {
        let cursor = self.select(parent, CursorFlags::MUTABLE)?;
        let has_current = cursor.move_next()?;
        self.write_at(&cursor, has_current, refs, old, new)
    }

    fn write_at(
        &self,
        cursor: &Cursor,
        has_current: bool,
        refs: &mut ReferenceManager,
        old: Option<&Value>,
        new: Option<&Value>,
    ) -> Result<()> {
        let data_type = self.type_of(new);
        let nil = new.is_none() && self.nillable && cursor.kind() != NodeType::Attribute;
        // Resolve and validate before the tree changes
        let checked = new
            .map(|value| self.checked_serializer(value).map(|serializer| (serializer, value)))
            .transpose()?;

        if new.is_some() || nil {
            if has_current {
                cursor.coerce(&data_type)?;
            } else {
                cursor.create(&data_type)?;
            }
        } else if !has_current {
            return Ok(());
        }

        let mut token = None;
        if self.reference {
            let assignment = refs.on_assigning_value(cursor, old, new)?;
            if !assignment.proceed {
                return Ok(());
            }
            token = assignment.token;
        }

        match checked {
            Some((serializer, value)) => serializer.write(cursor, value)?,
            None if nil => cursor.set_nil(true)?,
            None => {
                cursor.remove()?;
                cursor.remove_all_next()?;
            }
        }

        if let (true, Some(value)) = (self.reference, new) {
            refs.on_assigned_value(cursor, value, value, token);
        }
        Ok(())
    }

    /// Every item of a repeated element, in document order
    pub fn get_items(&self, parent: &Node, refs: &mut ReferenceManager) -> Result<Vec<Value>> {
        let cursor = self.select(parent, CursorFlags::MULTIPLE)?;
        let mut items = Vec::new();
        while cursor.move_next()? {
            if let Some(value) = self.read_tracked(&cursor, refs)? {
                items.push(value);
            }
        }
        Ok(items)
    }

    /// Replace the items `old` with `new`
    pub fn set_items(
        &self,
        parent: &Node,
        refs: &mut ReferenceManager,
        old: &[Value],
        new: &[Value],
    ) -> Result<()> {
        for item in new {
            self.checked_serializer(item)?;
        }
        let cursor = self.select(parent, CursorFlags::MULTIPLE | CursorFlags::MUTABLE)?;

        if self.reference {
            for item in old {
                if !cursor.move_next()? {
                    break;
                }
                refs.on_assigning_null(&cursor, Some(item))?;
            }
            cursor.reset();
        }
        cursor.remove_all_next()?;

        for item in new {
            let has_current = cursor.move_next()?;
            self.write_at(&cursor, has_current, refs, None, Some(item))?;
        }
        debug!("wrote {} items", new.len());
        Ok(())
    }

    /// An object's own type, or the declared one
    fn type_of(&self, value: Option<&Value>) -> DataType {
        match value.and_then(Value::object_type) {
            Some(object_type) => object_type.clone(),
            None => self.data_type.clone(),
        }
    }

    fn checked_serializer(&self, value: &Value) -> Result<Arc<dyn TypeSerializer>> {
        let serializer = serializer_for(&self.type_of(Some(value)))?;
        serializer.check(value)?;
        Ok(serializer)
    }
}

/// The serializer for `data_type`, falling back to its base types
fn serializer_for(data_type: &DataType) -> Result<Arc<dyn TypeSerializer>> {
    let mut current = data_type.base();
    let first = serializer::get(data_type);
    if first.is_ok() {
        return first;
    }
    while let Some(base) = current {
        if let Ok(found) = serializer::get(base) {
            return Ok(found);
        }
        current = base.base();
    }
    first
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::{ns, Document};
    use crate::error::Error;
    use crate::node::Backend;
    use crate::references::ReferenceFormat;
    use pretty_assertions::assert_eq;

    fn setup(xml: &str) -> (Document, Node, ReferenceManager) {
        let doc = Document::parse(xml).unwrap();
        let root = doc.root_element(Backend::Tree).unwrap();
        let refs = ReferenceManager::new(&root, ReferenceFormat::default());
        (doc, root, refs)
    }

    #[test]
    fn test_element_get_and_set() {
        let (doc, root, mut refs) = setup("<r><Count>3</Count></r>");
        let count = XmlAccessor::element(XmlName::local("Count"), DataType::i32());
        assert_eq!(count.get(&root, &mut refs).unwrap(), Some(Value::Int(3)));

        count.set(&root, &mut refs, None, Some(&Value::Int(4))).unwrap();
        assert_eq!(doc.to_xml(), "<r><Count>4</Count></r>");

        count.set(&root, &mut refs, None, None).unwrap();
        assert_eq!(doc.to_xml(), "<r/>");
        assert!(!count.is_defined(&root).unwrap());
        assert_eq!(count.get(&root, &mut refs).unwrap(), None);
    }

    #[test]
    fn test_rejected_value_leaves_tree_untouched() {
        let (doc, root, mut refs) = setup("<r><Item>1</Item></r>");
        let count = XmlAccessor::element(XmlName::local("Count"), DataType::i32());
        let text = Value::from("not a number");
        let result = count.set(&root, &mut refs, None, Some(&text));
        assert!(matches!(result, Err(Error::Serialization(_))));

        let deep = XmlAccessor::path("A/B[@k='1']/Count", DataType::i32());
        assert!(deep.set(&root, &mut refs, None, Some(&text)).is_err());

        let items = XmlAccessor::element(XmlName::local("Item"), DataType::i32());
        let result = items.set_items(&root, &mut refs, &[], &[Value::Int(2), text.clone()]);
        assert!(result.is_err());
        assert_eq!(doc.to_xml(), "<r><Item>1</Item></r>");
    }

    #[test]
    fn test_nillable_element() {
        let (doc, root, mut refs) = setup("<r/>");
        let name = XmlAccessor::element(XmlName::local("Name"), DataType::string()).nillable(true);
        name.set(&root, &mut refs, None, None).unwrap();
        assert_eq!(
            doc.to_xml(),
            format!("<r xmlns:xsi=\"{}\"><Name xsi:nil=\"true\"/></r>", ns::XSI)
        );
        assert!(name.is_defined(&root).unwrap());
        assert_eq!(name.get(&root, &mut refs).unwrap(), None);

        name.set(&root, &mut refs, None, Some(&Value::from("Ann"))).unwrap();
        assert_eq!(
            doc.to_xml(),
            format!("<r xmlns:xsi=\"{}\"><Name>Ann</Name></r>", ns::XSI)
        );
    }

    #[test]
    fn test_attribute() {
        let (doc, root, mut refs) = setup("<r/>");
        let flag = XmlAccessor::attribute(XmlName::local("on"), DataType::bool()).nillable(true);
        flag.set(&root, &mut refs, None, Some(&Value::Bool(true))).unwrap();
        assert_eq!(doc.to_xml(), "<r on=\"true\"/>");
        assert_eq!(flag.get(&root, &mut refs).unwrap(), Some(Value::Bool(true)));

        // Attributes cannot be nil; None removes them
        flag.set(&root, &mut refs, None, None).unwrap();
        assert_eq!(doc.to_xml(), "<r/>");
    }

    #[test]
    fn test_path_creates_intermediate_nodes() {
        let (doc, root, mut refs) = setup("<r/>");
        let city = XmlAccessor::path("Address[@kind='home']/City", DataType::string());
        assert!(!city.is_defined(&root).unwrap());
        city.set(&root, &mut refs, None, Some(&Value::from("Oslo"))).unwrap();
        assert_eq!(
            doc.to_xml(),
            "<r><Address kind=\"home\"><City>Oslo</City></Address></r>"
        );
        assert_eq!(city.get(&root, &mut refs).unwrap(), Some(Value::from("Oslo")));
    }

    #[test]
    fn test_unknown_type_is_a_serialization_error() {
        let (_doc, root, mut refs) = setup("<r><Thing>x</Thing></r>");
        let thing = XmlAccessor::element(XmlName::local("Thing"), DataType::reference("AccessorTestUnknown"));
        assert!(matches!(thing.get(&root, &mut refs), Err(Error::Serialization(_))));
    }

    #[test]
    fn test_items() {
        let (doc, root, mut refs) = setup("<r><Tag>a</Tag><Other/><Tag>b</Tag></r>");
        let tags = XmlAccessor::element(XmlName::local("Tag"), DataType::string());
        let items = tags.get_items(&root, &mut refs).unwrap();
        assert_eq!(items, [Value::from("a"), Value::from("b")]);

        tags.set_items(&root, &mut refs, &items, &[Value::from("c")]).unwrap();
        assert_eq!(doc.to_xml(), "<r><Other/><Tag>c</Tag></r>");
    }
}
