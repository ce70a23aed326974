//! Streaming hooks for custom serializers
//!
//! A serializer that wants to produce or consume raw markup gets one of
//! these instead of the node API:
//! - [`SubtreeReader`] hands out a quick-xml reader over the node's markup
//! - [`SubtreeWriter`] collects events and replaces the node's children
//! - [`AttributeWriter`] collects attributes and sets them together

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use super::Node;
use crate::error::{Error, Result};
use crate::types::XmlName;

/// Read access to the markup of one node
pub struct SubtreeReader {
    xml: String,
}

impl SubtreeReader {
    pub(crate) fn new(xml: String) -> Self {
        SubtreeReader { xml }
    }

    pub fn xml(&self) -> &str {
        &self.xml
    }

    /// A fresh reader positioned before the node's start tag
    pub fn reader(&self) -> Reader<&[u8]> {
        let mut reader = Reader::from_str(&self.xml);
        reader.config_mut().trim_text(true);
        reader
    }
}

/// Collects child content for a node; nothing changes until [`finish`]
///
/// [`finish`]: SubtreeWriter::finish
pub struct SubtreeWriter {
    node: Node,
    writer: Writer<Vec<u8>>,
}

impl SubtreeWriter {
    pub(crate) fn new(node: Node) -> Self {
        SubtreeWriter {
            node,
            writer: Writer::new(Vec::new()),
        }
    }

    /// The underlying writer, for arbitrary events
    pub fn writer(&mut self) -> &mut Writer<Vec<u8>> {
        &mut self.writer
    }

    pub fn write_event<'a>(&mut self, event: impl Into<Event<'a>>) -> Result<()> {
        self.writer.write_event(event).map_err(Error::xml)?;
        Ok(())
    }

    /// `<name>text</name>`
    pub fn write_text_element(&mut self, name: &str, text: &str) -> Result<()> {
        self.write_event(Event::Start(BytesStart::new(name)))?;
        if !text.is_empty() {
            self.write_event(Event::Text(BytesText::new(text)))?;
        }
        self.write_event(Event::End(BytesEnd::new(name)))
    }

    /// Replace the node's children with everything written so far,
    /// realizing the node first. Returns the new children.
    pub fn finish(self) -> Result<Vec<Node>> {
        let bytes = self.writer.into_inner();
        let xml = std::str::from_utf8(&bytes)?;
        let location = self.node.realize_location()?;
        let added = {
            let mut doc = location.doc.borrow_mut();
            doc.clear_children(location.id);
            doc.append_fragment(location.id, xml)?
        };
        Ok(added
            .into_iter()
            .map(|id| location.with_id(id).node(None))
            .collect())
    }
}

/// Collects attributes for an element
pub struct AttributeWriter {
    node: Node,
    pending: Vec<(XmlName, String)>,
}

impl AttributeWriter {
    pub(crate) fn new(node: Node) -> Self {
        AttributeWriter {
            node,
            pending: Vec::new(),
        }
    }

    pub fn write(&mut self, name: XmlName, value: &str) -> &mut Self {
        self.pending.push((name, value.to_string()));
        self
    }

    /// Set every collected attribute, realizing the element first
    pub fn finish(self) -> Result<()> {
        for (name, value) in &self.pending {
            self.node.set_attribute(name, Some(value))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::Document;
    use crate::node::Backend;

    #[test]
    fn test_reader_sees_node_markup() {
        let doc = Document::parse("<r><a x='1'>t</a></r>").unwrap();
        let root = doc.root_element(Backend::Tree).unwrap();
        let reader = root.read_subtree().unwrap();
        assert_eq!(reader.xml(), "<r><a x=\"1\">t</a></r>");

        let mut reader = reader.reader();
        let mut names = Vec::new();
        loop {
            match reader.read_event().unwrap() {
                Event::Start(e) => names.push(String::from_utf8(e.name().as_ref().to_vec()).unwrap()),
                Event::Eof => break,
                _ => {}
            }
        }
        assert_eq!(names, ["r", "a"]);
    }

    #[test]
    fn test_writer_replaces_children() {
        let doc = Document::parse("<r><old/></r>").unwrap();
        let root = doc.root_element(Backend::Tree).unwrap();
        let mut writer = root.write_children();
        writer.write_text_element("a", "1 < 2").unwrap();
        writer.write_text_element("b", "").unwrap();
        let added = writer.finish().unwrap();
        assert_eq!(added.len(), 2);
        assert_eq!(added[0].value(), "1 < 2");
        assert_eq!(doc.to_xml(), "<r><a>1 &lt; 2</a><b/></r>");
    }

    #[test]
    fn test_attribute_writer() {
        let doc = Document::parse("<r/>").unwrap();
        let root = doc.root_element(Backend::Navigator).unwrap();
        let mut writer = root.write_attributes();
        writer
            .write(XmlName::new("a", ""), "1")
            .write(XmlName::new("b", "urn:x"), "2");
        writer.finish().unwrap();
        assert_eq!(doc.to_xml(), "<r xmlns:p=\"urn:x\" a=\"1\" p:b=\"2\"/>");
    }
}
