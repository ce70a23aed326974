//! Results of XPath evaluation
//!
//! Conversions follow the `boolean()`, `number()` and `string()` functions.
//! A node-set's string and number come from its first node, which needs the
//! document; the document-free conversions treat node-sets as empty.

use crate::dom::{NodeId, XmlDocument};

#[derive(Debug, Clone, PartialEq)]
#[must_use]
pub enum XPathValue {
    /// Nodes in document order without duplicates; attributes included
    NodeSet(Vec<NodeId>),
    Boolean(bool),
    Number(f64),
    String(String),
}

impl XPathValue {
    pub fn single_node(id: NodeId) -> Self {
        XPathValue::NodeSet(vec![id])
    }

    pub fn to_boolean(&self) -> bool {
        match self {
            XPathValue::Boolean(b) => *b,
            XPathValue::Number(n) => !(n.is_nan() || *n == 0.0),
            XPathValue::String(s) => !s.is_empty(),
            XPathValue::NodeSet(nodes) => !nodes.is_empty(),
        }
    }

    pub fn to_number(&self) -> f64 {
        match self {
            XPathValue::Number(n) => *n,
            XPathValue::Boolean(b) => f64::from(u8::from(*b)),
            XPathValue::String(s) => parse_number(s),
            XPathValue::NodeSet(_) => f64::NAN,
        }
    }

    pub fn to_string_value(&self) -> String {
        match self {
            XPathValue::String(s) => s.clone(),
            XPathValue::Number(n) => format_number(*n),
            XPathValue::Boolean(b) => b.to_string(),
            XPathValue::NodeSet(_) => String::new(),
        }
    }

    pub fn string(&self, doc: &XmlDocument) -> String {
        let XPathValue::NodeSet(nodes) = self else {
            return self.to_string_value();
        };
        nodes
            .first()
            .map(|&first| doc.string_value(first))
            .unwrap_or_default()
    }

    pub fn number(&self, doc: &XmlDocument) -> f64 {
        if let XPathValue::NodeSet(_) = self {
            parse_number(&self.string(doc))
        } else {
            self.to_number()
        }
    }

    pub fn as_nodeset(&self) -> Option<&Vec<NodeId>> {
        if let XPathValue::NodeSet(nodes) = self {
            Some(nodes)
        } else {
            None
        }
    }
}

/// Leading and trailing whitespace is ignored; anything unparsable is NaN
pub(crate) fn parse_number(s: &str) -> f64 {
    s.trim().parse().unwrap_or(f64::NAN)
}

/// Integral values print without a fraction
pub(crate) fn format_number(n: f64) -> String {
    match n {
        n if n.is_nan() => "NaN".to_string(),
        n if n.is_infinite() && n > 0.0 => "Infinity".to_string(),
        n if n.is_infinite() => "-Infinity".to_string(),
        n if n.fract() == 0.0 && n.abs() < 1e15 => (n as i64).to_string(),
        n => n.to_string(),
    }
}

impl Default for XPathValue {
    fn default() -> Self {
        XPathValue::NodeSet(Vec::new())
    }
}

impl From<&str> for XPathValue {
    fn from(s: &str) -> Self {
        XPathValue::String(s.to_string())
    }
}

impl From<String> for XPathValue {
    fn from(s: String) -> Self {
        XPathValue::String(s)
    }
}

impl From<f64> for XPathValue {
    fn from(n: f64) -> Self {
        XPathValue::Number(n)
    }
}

impl From<bool> for XPathValue {
    fn from(b: bool) -> Self {
        XPathValue::Boolean(b)
    }
}
