//! Qualified names and known types

use std::fmt;

use super::DataType;

/// An element or attribute name.
///
/// `namespace` is `None` when the name takes the namespace of the element
/// it is created under.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct XmlName {
    pub local: String,
    pub namespace: Option<String>,
}

impl XmlName {
    pub fn new(local: &str, namespace: &str) -> Self {
        XmlName {
            local: local.to_string(),
            namespace: Some(namespace.to_string()),
        }
    }

    /// A name in whatever namespace its context supplies
    pub fn local(local: &str) -> Self {
        XmlName {
            local: local.to_string(),
            namespace: None,
        }
    }

    /// The namespace, falling back to `context` when unspecified
    pub fn effective_namespace<'a>(&'a self, context: &'a str) -> &'a str {
        self.namespace.as_deref().unwrap_or(context)
    }

    /// Fill in the namespace from `context` when unspecified
    pub fn with_context(&self, context: &str) -> XmlName {
        XmlName::new(&self.local, self.effective_namespace(context))
    }

    /// Same local name and, after resolution against `context`, namespace
    pub fn matches(&self, local: &str, namespace: &str, context: &str) -> bool {
        self.local == local && self.effective_namespace(context) == namespace
    }
}

impl fmt::Display for XmlName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.namespace.as_deref() {
            Some(ns) if !ns.is_empty() => write!(f, "{{{}}}{}", ns, self.local),
            _ => f.write_str(&self.local),
        }
    }
}

/// A value type together with the XML it is written as
#[derive(Debug, Clone, PartialEq)]
pub struct XmlType {
    pub name: XmlName,
    /// `xsi:type` discriminator written for polymorphic values
    pub xsi_type: Option<XmlName>,
    pub data_type: DataType,
}

impl XmlType {
    pub fn new(name: XmlName, data_type: DataType) -> Self {
        XmlType {
            name,
            xsi_type: None,
            data_type,
        }
    }

    pub fn with_xsi_type(mut self, xsi_type: XmlName) -> Self {
        self.xsi_type = Some(xsi_type);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_namespace() {
        let name = XmlName::local("Item");
        assert!(name.matches("Item", "urn:a", "urn:a"));
        assert!(!name.matches("Item", "urn:b", "urn:a"));
        assert_eq!(name.with_context("urn:a"), XmlName::new("Item", "urn:a"));

        let fixed = XmlName::new("Item", "");
        assert!(fixed.matches("Item", "", "urn:a"));
    }

    #[test]
    fn test_display() {
        assert_eq!(XmlName::new("a", "urn:x").to_string(), "{urn:x}a");
        assert_eq!(XmlName::local("a").to_string(), "a");
    }
}
