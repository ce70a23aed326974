//! XPath Axes Implementation
//!
//! Every XPath 1.0 axis except `namespace`, which yields nothing:
//! - child, parent, self, attribute
//! - descendant, descendant-or-self
//! - ancestor, ancestor-or-self
//! - following, following-sibling
//! - preceding, preceding-sibling

use std::collections::HashSet;

use super::ast::{Axis, NodeTest};
use super::context::XPathContext;
use crate::dom::{NodeId, NodeKind, XmlDocument};
use crate::error::{Error, Result};

/// Navigate along an axis from a context node
pub fn navigate(doc: &XmlDocument, context: NodeId, axis: Axis) -> Vec<NodeId> {
    match axis {
        Axis::Child => doc.children_vec(context),
        Axis::Descendant => doc.descendants_vec(context),
        Axis::DescendantOrSelf => {
            let mut result = vec![context];
            result.extend(doc.descendants(context));
            result
        }
        Axis::Parent => doc.parent_of(context).into_iter().collect(),
        Axis::Ancestor => ancestor_axis(doc, context),
        Axis::AncestorOrSelf => {
            let mut result = vec![context];
            result.extend(ancestor_axis(doc, context));
            result
        }
        Axis::FollowingSibling => sibling_axis(doc, context, XmlDocument::next_sibling_of),
        Axis::PrecedingSibling => sibling_axis(doc, context, XmlDocument::prev_sibling_of),
        Axis::Following => following_axis(doc, context),
        Axis::Preceding => preceding_axis(doc, context),
        Axis::Self_ => vec![context],
        Axis::Attribute => doc.attributes(context).collect(),
        Axis::Namespace => Vec::new(),
    }
}

fn ancestor_axis(doc: &XmlDocument, context: NodeId) -> Vec<NodeId> {
    let mut result = Vec::new();
    let mut current = context;
    while let Some(parent) = doc.parent_of(current) {
        result.push(parent);
        current = parent;
    }
    result
}

fn sibling_axis(
    doc: &XmlDocument,
    context: NodeId,
    step: fn(&XmlDocument, NodeId) -> Option<NodeId>,
) -> Vec<NodeId> {
    // Attributes have no siblings in the XPath data model
    if doc.kind(context) == Some(NodeKind::Attribute) {
        return Vec::new();
    }
    let mut result = Vec::new();
    let mut sibling = step(doc, context);
    while let Some(id) = sibling {
        result.push(id);
        sibling = step(doc, id);
    }
    result
}

/// following:: axis - nodes after the context in document order, minus descendants
fn following_axis(doc: &XmlDocument, context: NodeId) -> Vec<NodeId> {
    let mut result = Vec::new();
    let mut anchor = Some(context);
    while let Some(a) = anchor {
        if doc.kind(a) != Some(NodeKind::Attribute) {
            let mut sibling = doc.next_sibling_of(a);
            while let Some(s) = sibling {
                result.push(s);
                result.extend(doc.descendants(s));
                sibling = doc.next_sibling_of(s);
            }
        }
        anchor = doc.parent_of(a);
    }
    result
}

/// preceding:: axis - nodes before the context in document order, minus ancestors
fn preceding_axis(doc: &XmlDocument, context: NodeId) -> Vec<NodeId> {
    let ancestors: HashSet<NodeId> = ancestor_axis(doc, context).into_iter().collect();
    let mut result = Vec::new();
    for node in doc.descendants(doc.document_node_id()) {
        if node == context {
            break;
        }
        if !ancestors.contains(&node) {
            result.push(node);
        }
    }
    result.reverse();
    result
}

/// A node test with its prefix already resolved against the context
#[derive(Debug, Clone)]
pub enum ResolvedTest {
    /// Principal node type, any name
    Any,
    /// Principal node type in a namespace, any local name
    Namespace(String),
    /// Principal node type with (local name, namespace)
    Name(String, String),
    Node,
    Text,
    Comment,
    Nothing,
}

/// Resolve prefixes in a node test; unbound prefixes are an error
pub fn resolve_node_test(test: &NodeTest, context: &XPathContext) -> Result<ResolvedTest> {
    let lookup = |prefix: &str| {
        context
            .namespace_uri(prefix)
            .map(str::to_string)
            .ok_or_else(|| Error::evaluation(format!("namespace prefix `{}` is not bound", prefix)))
    };
    Ok(match test {
        NodeTest::Wildcard => ResolvedTest::Any,
        NodeTest::PrefixWildcard(prefix) => ResolvedTest::Namespace(lookup(prefix)?),
        NodeTest::Name { prefix: None, local } => ResolvedTest::Name(local.clone(), String::new()),
        NodeTest::Name {
            prefix: Some(prefix),
            local,
        } => ResolvedTest::Name(local.clone(), lookup(prefix)?),
        NodeTest::Node => ResolvedTest::Node,
        NodeTest::Text => ResolvedTest::Text,
        NodeTest::Comment => ResolvedTest::Comment,
        NodeTest::ProcessingInstruction(_) => ResolvedTest::Nothing,
    })
}

/// Check if a node matches a node test on the given axis
pub fn matches_node_test(doc: &XmlDocument, node_id: NodeId, test: &ResolvedTest, axis: Axis) -> bool {
    let Some(kind) = doc.kind(node_id) else {
        return false;
    };
    let principal = if axis == Axis::Attribute {
        NodeKind::Attribute
    } else {
        NodeKind::Element
    };

    match test {
        ResolvedTest::Any => kind == principal,
        ResolvedTest::Namespace(uri) => kind == principal && doc.namespace_uri(node_id) == uri,
        ResolvedTest::Name(local, uri) => {
            kind == principal
                && doc.local_name(node_id) == local
                && doc.namespace_uri(node_id) == uri
        }
        ResolvedTest::Node => true,
        ResolvedTest::Text => matches!(kind, NodeKind::Text | NodeKind::CData),
        ResolvedTest::Comment => kind == NodeKind::Comment,
        ResolvedTest::Nothing => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc() -> XmlDocument {
        XmlDocument::parse("<root a='1' b='2'><x><y/></x><z/></root>").unwrap()
    }

    #[test]
    fn test_child_and_attribute_axes() {
        let doc = doc();
        let root = doc.root_element_id().unwrap();
        assert_eq!(navigate(&doc, root, Axis::Child).len(), 2);
        let attrs = navigate(&doc, root, Axis::Attribute);
        assert_eq!(attrs.len(), 2);
        assert_eq!(doc.local_name(attrs[0]), "a");
    }

    #[test]
    fn test_descendant_axis() {
        let doc = doc();
        let root = doc.root_element_id().unwrap();
        assert_eq!(navigate(&doc, root, Axis::Descendant).len(), 3);
    }

    #[test]
    fn test_ancestor_axis() {
        let doc = doc();
        let root = doc.root_element_id().unwrap();
        let x = doc.children_vec(root)[0];
        let y = doc.children_vec(x)[0];
        assert_eq!(navigate(&doc, y, Axis::Ancestor), vec![x, root, 0]);
    }

    #[test]
    fn test_following_and_preceding() {
        let doc = doc();
        let root = doc.root_element_id().unwrap();
        let x = doc.children_vec(root)[0];
        let z = doc.children_vec(root)[1];
        let y = doc.children_vec(x)[0];
        assert_eq!(navigate(&doc, y, Axis::Following), vec![z]);
        assert_eq!(navigate(&doc, z, Axis::Preceding), vec![y, x]);
    }

    #[test]
    fn test_name_test_respects_namespace() {
        let doc = XmlDocument::parse("<r xmlns='urn:d'><a/></r>").unwrap();
        let root = doc.root_element_id().unwrap();
        let a = doc.children_vec(root)[0];
        let mut context = XPathContext::new();
        context.add_namespace("d", "urn:d");

        let plain = resolve_node_test(&NodeTest::name(None, "a"), &context).unwrap();
        let prefixed = resolve_node_test(&NodeTest::name(Some("d"), "a"), &context).unwrap();
        assert!(!matches_node_test(&doc, a, &plain, Axis::Child));
        assert!(matches_node_test(&doc, a, &prefixed, Axis::Child));
    }

    #[test]
    fn test_unbound_prefix_is_an_error() {
        let context = XPathContext::new();
        let test = NodeTest::name(Some("q"), "a");
        assert!(matches!(resolve_node_test(&test, &context), Err(Error::Evaluation(_))));
    }
}
