//! xmlbind - Typed object/XML binding over a mutable document
//!
//! Layers, bottom up:
//! - dom: arena document with namespace scopes
//! - xpath: XPath 1.0 evaluation over the arena
//! - path: paths that can also create the nodes they select
//! - node / cursor: one node contract over two backends, plus cursors that
//!   select, create, re-type and remove typed nodes
//! - references: one primary per shared value, id/ref markers elsewhere
//! - serializer / accessor: converting values to and from nodes
//!
//! ```
//! use xmlbind::{Backend, DataType, Document, ReferenceFormat, ReferenceManager, Value, XmlAccessor};
//!
//! let doc = Document::parse("<Order/>").unwrap();
//! let order = doc.root_element(Backend::Tree).unwrap();
//! let mut refs = ReferenceManager::new(&order, ReferenceFormat::default());
//!
//! let city = XmlAccessor::path("Ship/Address[@kind='home']/City", DataType::string());
//! city.set(&order, &mut refs, None, Some(&Value::from("Oslo"))).unwrap();
//! assert_eq!(
//!     doc.to_xml(),
//!     "<Order><Ship><Address kind=\"home\"><City>Oslo</City></Address></Ship></Order>"
//! );
//! ```

pub mod accessor;
pub mod cursor;
pub mod dom;
pub mod error;
pub mod node;
pub mod path;
pub mod references;
pub mod serializer;
pub mod types;
pub mod value;
pub mod xpath;

pub use accessor::XmlAccessor;
pub use cursor::{Cursor, CursorFlags};
pub use dom::{Document, XmlDocument};
pub use error::{Error, Result};
pub use node::{Backend, Navigator, Node, NodeType};
pub use path::{CompiledPath, CompiledStep};
pub use references::{Assignment, GetStarting, ReferenceFormat, ReferenceManager, Token};
pub use serializer::{CustomSerializer, TypeSerializer};
pub use types::{DataType, TypeMap, XmlName, XmlType};
pub use value::{Object, Value};
pub use xpath::{XPathContext, XPathValue};
