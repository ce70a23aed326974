//! Cursors: iteration, creation and removal over selected nodes
//!
//! Three selection strategies share one state machine:
//! - [`child`]: child elements and/or attributes matched through a
//!   [`TypeMap`]
//! - [`path`]: nodes selected by a compiled path, created step by step
//!   when missing
//! - [`self_cursor`]: the parent node itself, once
//!
//! A [`Cursor`] dereferences to the [`Node`] it currently stands on. With
//! no current match that node is virtual, and writing through it creates
//! the match.

mod child;
mod path;
mod self_cursor;

use std::cell::RefCell;
use std::ops::{BitOr, Deref};
use std::rc::Rc;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::node::{Backend, Location, Node, Placeholder};
use crate::path::CompiledPath;
use crate::types::{DataType, TypeMap};

/// Selection and mutation flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CursorFlags(u8);

impl CursorFlags {
    pub const NONE: CursorFlags = CursorFlags(0);
    pub const ELEMENTS: CursorFlags = CursorFlags(1);
    pub const ATTRIBUTES: CursorFlags = CursorFlags(2);
    pub const ALL_NODES: CursorFlags = CursorFlags(1 | 2);
    /// More than one match is allowed; without it a second match means none
    pub const MULTIPLE: CursorFlags = CursorFlags(4);
    /// Create, coerce and remove are allowed
    pub const MUTABLE: CursorFlags = CursorFlags(8);

    pub fn contains(self, other: CursorFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn includes_elements(self) -> bool {
        self.contains(Self::ELEMENTS)
    }

    pub fn includes_attributes(self) -> bool {
        self.contains(Self::ATTRIBUTES)
    }

    pub fn allows_multiple(self) -> bool {
        self.contains(Self::MULTIPLE)
    }

    pub fn is_mutable(self) -> bool {
        self.contains(Self::MUTABLE)
    }
}

impl BitOr for CursorFlags {
    type Output = CursorFlags;

    fn bitor(self, rhs: CursorFlags) -> CursorFlags {
        CursorFlags(self.0 | rhs.0)
    }
}

/// One selection strategy's state machine
pub(crate) trait CursorOps {
    fn move_next(&mut self) -> Result<bool>;

    fn reset(&mut self);

    fn move_to_end(&mut self) -> Result<()>;

    /// Whether no further match follows, without moving
    fn is_at_end(&mut self) -> Result<bool>;

    fn move_to(&mut self, position: &Location) -> Result<()>;

    fn create(&mut self, data_type: &DataType) -> Result<()>;

    fn coerce(&mut self, data_type: &DataType) -> Result<()>;

    fn remove(&mut self) -> Result<()>;

    /// Create the default match when the cursor found none
    fn realize(&mut self) -> Result<()>;

    fn current(&self) -> Option<Location>;

    fn current_type(&self) -> Option<DataType>;

    fn placeholder(&self) -> Placeholder;

    fn backend(&self) -> Backend;
}

pub(crate) type SharedCursor = Rc<RefCell<dyn CursorOps>>;

#[derive(Clone)]
pub struct Cursor {
    core: SharedCursor,
    node: Node,
}

impl Cursor {
    fn new(ops: impl CursorOps + 'static) -> Cursor {
        let core: SharedCursor = Rc::new(RefCell::new(ops));
        Cursor {
            node: Node::from_cursor(core.clone()),
            core,
        }
    }

    pub(crate) fn over_self(node: Node, data_type: DataType) -> Cursor {
        Cursor::new(self_cursor::SelfCursor::new(node, data_type))
    }

    pub(crate) fn over_children(parent: Node, types: TypeMap, flags: CursorFlags) -> Cursor {
        Cursor::new(child::ChildCursor::new(parent, types, flags))
    }

    pub(crate) fn over_path(
        parent: Node,
        path: Arc<CompiledPath>,
        types: TypeMap,
        flags: CursorFlags,
    ) -> Result<Cursor> {
        Ok(Cursor::new(path::PathCursor::new(parent, path, types, flags)?))
    }

    pub fn move_next(&self) -> Result<bool> {
        self.core.borrow_mut().move_next()
    }

    /// Back to before the first match
    pub fn reset(&self) {
        self.core.borrow_mut().reset()
    }

    /// Skip past the last match without visiting the rest
    pub fn move_to_end(&self) -> Result<()> {
        self.core.borrow_mut().move_to_end()
    }

    pub fn is_at_end(&self) -> Result<bool> {
        self.core.borrow_mut().is_at_end()
    }

    pub fn has_current(&self) -> bool {
        self.core.borrow().current().is_some()
    }

    /// Reposition onto a node saved from this cursor
    pub fn move_to(&self, position: &Node) -> Result<()> {
        let location = position
            .location()
            .ok_or_else(|| Error::invalid_operation("cannot move to a virtual node"))?;
        self.core.borrow_mut().move_to(&location)
    }

    /// Create a node of `data_type`: before the current match, or after
    /// the last one when past the end
    pub fn create(&self, data_type: &DataType) -> Result<()> {
        self.core.borrow_mut().create(data_type)
    }

    /// Re-type the current match in place
    pub fn coerce(&self, data_type: &DataType) -> Result<()> {
        self.core.borrow_mut().coerce(data_type)
    }

    /// Delete the current match; the next `move_next` continues after it
    pub fn remove(&self) -> Result<()> {
        self.core.borrow_mut().remove()
    }

    /// Advance and re-type the next match, or append one past the end
    pub fn make_next(&self, data_type: &DataType) -> Result<()> {
        if self.move_next()? {
            self.coerce(data_type)
        } else {
            self.create(data_type)
        }
    }

    /// Delete every remaining match
    pub fn remove_all_next(&self) -> Result<()> {
        while self.move_next()? {
            self.remove()?;
        }
        Ok(())
    }

    /// The current position as a node unaffected by later moves
    pub fn save(&self) -> Node {
        self.node.save()
    }

    pub fn node(&self) -> &Node {
        &self.node
    }
}

impl Deref for Cursor {
    type Target = Node;

    fn deref(&self) -> &Node {
        &self.node
    }
}
