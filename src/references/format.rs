//! Identity and reference markers

use crate::error::Result;
use crate::node::Node;
use crate::types::XmlName;

/// Namespace of the default `id`/`ref` marker attributes
pub const REFERENCE_NS: &str = "urn:xmlbind:reference";

/// How primaries and references are marked in the document.
///
/// A primary carries `{namespace}id="N"`, a reference carries
/// `{namespace}ref="N"` and nothing else.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceFormat {
    prefix: String,
    identity: XmlName,
    reference: XmlName,
}

impl Default for ReferenceFormat {
    fn default() -> Self {
        Self::new(REFERENCE_NS, "x", "id", "ref")
    }
}

impl ReferenceFormat {
    pub fn new(namespace: &str, prefix: &str, identity: &str, reference: &str) -> Self {
        ReferenceFormat {
            prefix: prefix.to_string(),
            identity: XmlName::new(identity, namespace),
            reference: XmlName::new(reference, namespace),
        }
    }

    pub fn namespace(&self) -> &str {
        self.identity.effective_namespace("")
    }

    pub fn try_get_identity(&self, node: &Node) -> Option<u32> {
        read_marker(node, &self.identity)
    }

    pub fn try_get_reference(&self, node: &Node) -> Option<u32> {
        read_marker(node, &self.reference)
    }

    pub fn set_identity(&self, node: &Node, id: u32) -> Result<()> {
        self.write_marker(node, &self.identity, id)
    }

    pub fn set_reference(&self, node: &Node, id: u32) -> Result<()> {
        self.write_marker(node, &self.reference, id)
    }

    pub fn clear_identity(&self, node: &Node) -> Result<()> {
        clear_marker(node, &self.identity)
    }

    pub fn clear_reference(&self, node: &Node) -> Result<()> {
        clear_marker(node, &self.reference)
    }

    fn write_marker(&self, node: &Node, name: &XmlName, id: u32) -> Result<()> {
        node.ensure_prefix(self.namespace(), Some(&self.prefix))?;
        node.set_attribute(name, Some(&id.to_string()))
    }
}

fn read_marker(node: &Node, name: &XmlName) -> Option<u32> {
    if !node.is_real() {
        return None;
    }
    node.attribute(name)?.trim().parse().ok()
}

fn clear_marker(node: &Node, name: &XmlName) -> Result<()> {
    if node.is_real() && node.attribute(name).is_some() {
        node.set_attribute(name, None)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::Document;
    use crate::node::Backend;

    #[test]
    fn test_markers() {
        let doc = Document::parse("<r><a/></r>").unwrap();
        let root = doc.root_element(Backend::Tree).unwrap();
        let a = root.select_subtree().pop().unwrap();
        let format = ReferenceFormat::default();

        assert_eq!(format.try_get_identity(&a), None);
        format.set_identity(&a, 3).unwrap();
        assert_eq!(format.try_get_identity(&a), Some(3));
        assert_eq!(format.try_get_reference(&a), None);
        assert_eq!(
            doc.to_xml(),
            "<r xmlns:x=\"urn:xmlbind:reference\"><a x:id=\"3\"/></r>"
        );

        format.clear_identity(&a).unwrap();
        format.clear_reference(&a).unwrap();
        assert_eq!(doc.to_xml(), "<r xmlns:x=\"urn:xmlbind:reference\"><a/></r>");
    }

    #[test]
    fn test_unparsable_marker_is_ignored() {
        let doc = Document::parse("<r xmlns:x='urn:xmlbind:reference' x:ref='abc'/>").unwrap();
        let root = doc.root_element(Backend::Navigator).unwrap();
        assert_eq!(ReferenceFormat::default().try_get_reference(&root), None);
    }
}
