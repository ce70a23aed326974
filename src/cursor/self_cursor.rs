//! Self cursor: yields its node once, as a given type

use super::CursorOps;
use crate::error::{Error, Result};
use crate::node::{Backend, Location, Node, Placeholder};
use crate::types::{DataType, XmlName};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Initial,
    Current,
    End,
}

pub(crate) struct SelfCursor {
    node: Node,
    data_type: DataType,
    state: State,
}

impl SelfCursor {
    pub(crate) fn new(node: Node, data_type: DataType) -> Self {
        SelfCursor {
            node,
            data_type,
            state: State::Initial,
        }
    }
}

impl CursorOps for SelfCursor {
    fn move_next(&mut self) -> Result<bool> {
        let moved = self.state == State::Initial;
        self.state = if moved { State::Current } else { State::End };
        Ok(moved)
    }

    fn reset(&mut self) {
        self.state = State::Initial;
    }

    fn move_to_end(&mut self) -> Result<()> {
        self.state = State::End;
        Ok(())
    }

    fn is_at_end(&mut self) -> Result<bool> {
        Ok(self.state != State::Initial)
    }

    fn move_to(&mut self, position: &Location) -> Result<()> {
        match self.node.location() {
            Some(location) if location.same_position(position) => {
                self.state = State::Current;
                Ok(())
            }
            _ => Err(Error::invalid_operation("node is not selected by this cursor")),
        }
    }

    fn create(&mut self, _data_type: &DataType) -> Result<()> {
        Err(Error::invalid_operation("a self cursor cannot create nodes"))
    }

    /// Re-type the node; the document is unchanged
    fn coerce(&mut self, data_type: &DataType) -> Result<()> {
        if self.state != State::Current {
            return Err(Error::invalid_operation("cursor is not positioned on a match"));
        }
        self.data_type = data_type.clone();
        Ok(())
    }

    fn remove(&mut self) -> Result<()> {
        Err(Error::invalid_operation("a self cursor cannot remove its node"))
    }

    fn realize(&mut self) -> Result<()> {
        self.node.realize()
    }

    fn current(&self) -> Option<Location> {
        if self.state == State::Current {
            self.node.location()
        } else {
            None
        }
    }

    fn current_type(&self) -> Option<DataType> {
        (self.state == State::Current).then(|| self.data_type.clone())
    }

    fn placeholder(&self) -> Placeholder {
        Placeholder {
            kind: self.node.kind(),
            name: XmlName::new(&self.node.local_name(), &self.node.namespace_uri()),
            xsi_type: None,
            data_type: self.data_type.clone(),
        }
    }

    fn backend(&self) -> Backend {
        self.node.backend()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::Document;

    #[test]
    fn test_yields_once() {
        let doc = Document::parse("<r>x</r>").unwrap();
        let root = doc.root_element(Backend::Tree).unwrap();
        let cursor = root.select_self(DataType::string());
        assert!(cursor.move_next().unwrap());
        assert!(cursor.position_eq(&root));
        assert_eq!(cursor.value(), "x");
        assert!(!cursor.move_next().unwrap());
        cursor.reset();
        assert!(cursor.move_next().unwrap());
    }

    #[test]
    fn test_coerce_retypes_without_edits() {
        let doc = Document::parse("<r>5</r>").unwrap();
        let root = doc.root_element(Backend::Tree).unwrap();
        let cursor = root.select_self(DataType::string());
        assert!(matches!(cursor.coerce(&DataType::i32()), Err(Error::InvalidOperation(_))));
        cursor.move_next().unwrap();
        cursor.coerce(&DataType::i32()).unwrap();
        assert_eq!(cursor.data_type(), Some(DataType::i32()));
        assert_eq!(doc.to_xml(), "<r>5</r>");
        assert!(matches!(cursor.create(&DataType::i32()), Err(Error::InvalidOperation(_))));
        assert!(matches!(cursor.remove(), Err(Error::InvalidOperation(_))));
    }
}
