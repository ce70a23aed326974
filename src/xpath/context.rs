//! Evaluation context: namespace prefixes and variable bindings
//!
//! Prefixes in path expressions resolve through the context, never through
//! the document's own declarations, so a path compiled once can run against
//! documents that spell their prefixes differently.

use std::collections::HashMap;

use super::value::XPathValue;

#[derive(Debug, Clone, Default)]
pub struct XPathContext {
    namespaces: HashMap<String, String>,
    variables: HashMap<String, XPathValue>,
}

impl XPathContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `prefix` to `uri` for name tests and created nodes
    pub fn add_namespace(&mut self, prefix: &str, uri: &str) -> &mut Self {
        self.namespaces.insert(prefix.to_string(), uri.to_string());
        self
    }

    pub fn namespace_uri(&self, prefix: &str) -> Option<&str> {
        self.namespaces.get(prefix).map(String::as_str)
    }

    pub fn set_variable(&mut self, name: &str, value: impl Into<XPathValue>) -> &mut Self {
        self.variables.insert(name.to_string(), value.into());
        self
    }

    pub fn variable(&self, name: &str) -> Option<&XPathValue> {
        self.variables.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bindings() {
        let mut context = XPathContext::new();
        context.add_namespace("p", "urn:p").set_variable("v", "x");
        assert_eq!(context.namespace_uri("p"), Some("urn:p"));
        assert_eq!(context.namespace_uri("q"), None);
        assert_eq!(context.variable("v"), Some(&XPathValue::from("x")));
    }
}
