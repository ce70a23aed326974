//! DOM Module - Arena-based XML Document
//!
//! Implements a mutable DOM representation using:
//! - Arena allocation for nodes
//! - NodeId (u32) indices that stay valid across edits
//! - String interning for names, prefixes and namespace URIs
//! - Namespace resolution stack while parsing
//!
//! [`Document`] is the shared handle the rest of the crate works with: the
//! arena plus the XPath bindings (prefixes and variables) used for every
//! path evaluated against it.

pub mod document;
pub mod namespace;
pub mod node;
pub mod strings;

use std::cell::{Ref, RefCell, RefMut};
use std::fmt;
use std::rc::Rc;

pub use document::{split_qname, XmlDocument};
pub use namespace::ns;
pub use node::{NodeId, NodeKind, XmlNode};
pub use strings::StringPool;

use crate::error::Result;
use crate::xpath::XPathContext;

/// Shared, single-threaded handle to a mutable document
#[derive(Clone, Default)]
pub struct Document {
    inner: Rc<DocumentInner>,
}

#[derive(Default)]
struct DocumentInner {
    xml: RefCell<XmlDocument>,
    context: RefCell<XPathContext>,
}

impl Document {
    /// An empty document
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parse(input: &str) -> Result<Self> {
        Ok(Self::from(XmlDocument::parse(input)?))
    }

    pub fn borrow(&self) -> Ref<'_, XmlDocument> {
        self.inner.xml.borrow()
    }

    pub fn borrow_mut(&self) -> RefMut<'_, XmlDocument> {
        self.inner.xml.borrow_mut()
    }

    /// Namespace and variable bindings for paths evaluated on this document
    pub fn context(&self) -> Ref<'_, XPathContext> {
        self.inner.context.borrow()
    }

    pub fn context_mut(&self) -> RefMut<'_, XPathContext> {
        self.inner.context.borrow_mut()
    }

    /// Whether both handles point at the same document
    pub fn ptr_eq(&self, other: &Document) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn to_xml(&self) -> String {
        self.borrow().to_xml()
    }
}

impl From<XmlDocument> for Document {
    fn from(xml: XmlDocument) -> Self {
        Document {
            inner: Rc::new(DocumentInner {
                xml: RefCell::new(xml),
                context: RefCell::new(XPathContext::new()),
            }),
        }
    }
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Document").field(&Rc::as_ptr(&self.inner)).finish()
    }
}
