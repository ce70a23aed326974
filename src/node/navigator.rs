//! Positional cursor over a [`Document`]
//!
//! A navigator is a movable position: it walks the tree with `move_to_*`
//! calls that report whether the move happened, and runs compiled
//! expressions from wherever it stands.

use crate::dom::{Document, NodeId, NodeKind, XmlDocument};
use crate::error::{Error, Result};
use crate::xpath::{evaluate_compiled, CompiledExpr, EvalContext, XPathValue};

#[derive(Clone)]
pub struct Navigator {
    doc: Document,
    id: NodeId,
}

impl Navigator {
    pub fn new(doc: Document, id: NodeId) -> Self {
        Navigator { doc, id }
    }

    /// A navigator on the document node
    pub fn root(doc: Document) -> Self {
        let id = doc.borrow().document_node_id();
        Navigator { doc, id }
    }

    pub fn document(&self) -> &Document {
        &self.doc
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn kind(&self) -> Option<NodeKind> {
        self.doc.borrow().kind(self.id)
    }

    pub fn local_name(&self) -> String {
        self.doc.borrow().local_name(self.id).to_string()
    }

    pub fn namespace_uri(&self) -> String {
        self.doc.borrow().namespace_uri(self.id).to_string()
    }

    /// String value of the current node
    pub fn value(&self) -> String {
        self.doc.borrow().string_value(self.id)
    }

    pub fn is_attached(&self) -> bool {
        self.doc.borrow().is_attached(self.id)
    }

    pub fn is_same_position(&self, other: &Navigator) -> bool {
        self.doc.ptr_eq(&other.doc) && self.id == other.id
    }

    fn move_with(&mut self, step: impl FnOnce(&XmlDocument, NodeId) -> Option<NodeId>) -> bool {
        let target = step(&self.doc.borrow(), self.id);
        match target {
            Some(id) => {
                self.id = id;
                true
            }
            None => false,
        }
    }

    pub fn move_to_parent(&mut self) -> bool {
        self.move_with(|doc, id| doc.parent_of(id))
    }

    /// Move to the first child element
    pub fn move_to_first_child(&mut self) -> bool {
        self.move_with(|doc, id| doc.children(id).find(|&c| doc.kind(c) == Some(NodeKind::Element)))
    }

    /// Move to the next sibling element
    pub fn move_to_next(&mut self) -> bool {
        self.move_with(|doc, id| {
            if doc.kind(id) == Some(NodeKind::Attribute) {
                return None;
            }
            let mut next = doc.next_sibling_of(id);
            while let Some(n) = next {
                if doc.kind(n) == Some(NodeKind::Element) {
                    return Some(n);
                }
                next = doc.next_sibling_of(n);
            }
            None
        })
    }

    pub fn move_to_first_attribute(&mut self) -> bool {
        self.move_with(|doc, id| doc.first_attribute_of(id))
    }

    pub fn move_to_next_attribute(&mut self) -> bool {
        self.move_with(|doc, id| {
            if doc.kind(id) != Some(NodeKind::Attribute) {
                return None;
            }
            doc.next_sibling_of(id)
        })
    }

    /// Move to the first child element with the given name
    pub fn move_to_child(&mut self, local: &str, namespace: &str) -> bool {
        self.move_with(|doc, id| {
            doc.children(id).find(|&c| {
                doc.kind(c) == Some(NodeKind::Element)
                    && doc.local_name(c) == local
                    && doc.namespace_uri(c) == namespace
            })
        })
    }

    pub fn evaluate(&self, expr: &CompiledExpr) -> Result<XPathValue> {
        let doc = self.doc.borrow();
        let context = self.doc.context();
        evaluate_compiled(expr, &EvalContext::new(&doc, &context, self.id))
    }

    /// Navigators on every node `expr` selects, in document order
    pub fn select(&self, expr: &CompiledExpr) -> Result<Vec<Navigator>> {
        match self.evaluate(expr)? {
            XPathValue::NodeSet(ids) => Ok(ids
                .into_iter()
                .map(|id| Navigator::new(self.doc.clone(), id))
                .collect()),
            _ => Err(Error::evaluation("expression does not select nodes")),
        }
    }

    /// Detach the current node and move to its former parent
    pub fn delete_self(&mut self) -> bool {
        let Some(parent) = self.doc.borrow().parent_of(self.id) else {
            return false;
        };
        self.doc.borrow_mut().detach(self.id);
        self.id = parent;
        true
    }
}

impl std::fmt::Debug for Navigator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Navigator({:?}, {})", self.doc, self.id)
    }
}
