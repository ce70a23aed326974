//! Type maps: which names and `xsi:type` markers stand for which types

use super::{DataType, XmlName, XmlType};
use crate::error::{Error, Result};

/// A closed set of known types plus the default used for new nodes
#[derive(Debug, Clone)]
pub struct TypeMap {
    default: usize,
    entries: Vec<XmlType>,
}

impl TypeMap {
    pub fn new(default: XmlType) -> Self {
        TypeMap {
            default: 0,
            entries: vec![default],
        }
    }

    /// Map every node at a position to one type, under a single name
    pub fn single(name: XmlName, data_type: DataType) -> Self {
        Self::new(XmlType::new(name, data_type))
    }

    /// Add an entry
    pub fn with(mut self, entry: XmlType) -> Self {
        self.entries.push(entry);
        self
    }

    /// Add an entry and make it the default
    pub fn with_default(mut self, entry: XmlType) -> Self {
        self.entries.push(entry);
        self.default = self.entries.len() - 1;
        self
    }

    pub fn default_type(&self) -> &XmlType {
        &self.entries[self.default]
    }

    pub fn entries(&self) -> &[XmlType] {
        &self.entries
    }

    /// Find the entry for a node by name and `xsi:type`. Entry names
    /// without a namespace take `context` (the namespace of the parent
    /// element for elements, none for attributes).
    pub fn lookup_node(
        &self,
        local: &str,
        namespace: &str,
        xsi_type: Option<&XmlName>,
        context: &str,
    ) -> Option<&XmlType> {
        self.entries.iter().find(|t| {
            t.name.matches(local, namespace, context) && same_xsi_type(t.xsi_type.as_ref(), xsi_type)
        })
    }

    /// Find the entry for a node by its `xsi:type` alone; nodes without
    /// one are the default type
    pub fn lookup_xsi_type(&self, xsi_type: Option<&XmlName>) -> Option<&XmlType> {
        match xsi_type {
            None => Some(self.default_type()),
            Some(_) => self
                .entries
                .iter()
                .find(|t| same_xsi_type(t.xsi_type.as_ref(), xsi_type)),
        }
    }

    /// Entry used to write a value of `data_type`
    pub fn lookup_data_type(&self, data_type: &DataType) -> Option<&XmlType> {
        self.entries
            .iter()
            .find(|t| &t.data_type == data_type)
            .or_else(|| {
                self.entries
                    .iter()
                    .find(|t| t.data_type.is_assignable_from(data_type))
            })
    }

    pub fn require(&self, data_type: &DataType) -> Result<&XmlType> {
        self.lookup_data_type(data_type).ok_or_else(|| {
            Error::serialization(format!("type `{}` is not known at this position", data_type))
        })
    }
}

fn same_xsi_type(expected: Option<&XmlName>, actual: Option<&XmlName>) -> bool {
    match (expected, actual) {
        (None, None) => true,
        (Some(e), Some(a)) => e.matches(&a.local, a.effective_namespace(""), ""),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map() -> TypeMap {
        let animal = DataType::reference("Animal");
        let dog = DataType::derived("Dog", &animal);
        TypeMap::single(XmlName::local("Pet"), animal)
            .with(XmlType::new(XmlName::local("Pet"), dog).with_xsi_type(XmlName::new("Dog", "urn:t")))
            .with(XmlType::new(XmlName::new("Count", ""), DataType::i32()))
    }

    #[test]
    fn test_lookup_by_name_and_xsi_type() {
        let map = map();
        let plain = map.lookup_node("Pet", "urn:d", None, "urn:d").unwrap();
        assert_eq!(plain.data_type.name(), "Animal");

        let dog = XmlName::new("Dog", "urn:t");
        let typed = map.lookup_node("Pet", "urn:d", Some(&dog), "urn:d").unwrap();
        assert_eq!(typed.data_type.name(), "Dog");

        assert!(map.lookup_node("Pet", "urn:other", None, "urn:d").is_none());
        assert!(map.lookup_node("Count", "", None, "urn:d").is_some());
    }

    #[test]
    fn test_lookup_by_xsi_type_only() {
        let map = map();
        assert_eq!(map.lookup_xsi_type(None).unwrap().data_type.name(), "Animal");
        let dog = XmlName::new("Dog", "urn:t");
        assert_eq!(map.lookup_xsi_type(Some(&dog)).unwrap().data_type.name(), "Dog");
        assert!(map.lookup_xsi_type(Some(&XmlName::new("Cat", "urn:t"))).is_none());
    }

    #[test]
    fn test_require() {
        let map = map();
        assert_eq!(map.require(&DataType::i32()).unwrap().name.local, "Count");
        let puppy = DataType::derived("Puppy", &DataType::reference("Dog"));
        assert_eq!(map.require(&puppy).unwrap().data_type.name(), "Dog");
        assert!(matches!(map.require(&DataType::string()), Err(Error::Serialization(_))));
    }
}
