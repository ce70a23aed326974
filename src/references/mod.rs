//! Reference tracking: one primary node per shared value
//!
//! When the same [`Object`] is stored at several places in a document only
//! one of them, the *primary*, holds its content. Every other place is a
//! *reference* carrying just a marker that points back at the primary's
//! identity (see [`ReferenceFormat`]).
//!
//! Reads go through [`ReferenceManager::on_get_starting`] and
//! [`ReferenceManager::on_get_completed`]; writes through
//! [`ReferenceManager::on_assigning_value`] and
//! [`ReferenceManager::on_assigned_value`]. The first call of each pair
//! decides whether the caller should touch the document at all and hands
//! out a [`Token`] the second call consumes.

mod format;

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use log::{debug, trace};

pub use format::{ReferenceFormat, REFERENCE_NS};

use crate::dom::NodeId;
use crate::error::{Error, Result};
use crate::node::Node;
use crate::types::DataType;
use crate::value::{Object, Value, WeakObject};

type EntryRef = Rc<RefCell<Entry>>;

/// Everything known about one tracked value
struct Entry {
    /// 0 until a reference needs to point here
    id: u32,
    node: Node,
    references: Vec<Node>,
    values: Vec<EntryValue>,
}

struct EntryValue {
    data_type: DataType,
    value: WeakObject,
    in_graph: bool,
}

impl Entry {
    fn new(node: &Node) -> EntryRef {
        Self::with_id(0, node)
    }

    fn with_id(id: u32, node: &Node) -> EntryRef {
        Rc::new(RefCell::new(Entry {
            id,
            node: node.save(),
            references: Vec::new(),
            values: Vec::new(),
        }))
    }

    /// Drop `node` from the references; returns whether it was one
    fn remove_reference(&mut self, node: &Node) -> bool {
        match self.references.iter().position(|r| r.position_eq(node)) {
            Some(index) => {
                self.references.remove(index);
                true
            }
            None => false,
        }
    }
}

/// Handed out when starting a read or write; passed back on completion
#[derive(Clone)]
pub struct Token(TokenKind);

#[derive(Clone)]
enum TokenKind {
    /// Nothing is tracked at the node yet
    CreateEntry,
    Entry(EntryRef),
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            TokenKind::CreateEntry => f.write_str("Token(new)"),
            TokenKind::Entry(entry) => write!(f, "Token(entry {})", entry.borrow().id),
        }
    }
}

/// Outcome of [`ReferenceManager::on_get_starting`]
#[derive(Debug)]
pub enum GetStarting {
    /// The value was read before; use it as is
    Cached(Value),
    /// Read the value from `node` (the primary when the original node was
    /// a reference), then report it through `on_get_completed`
    Proceed { node: Node, token: Option<Token> },
}

/// Outcome of [`ReferenceManager::on_assigning_value`]
#[derive(Debug)]
pub struct Assignment {
    /// Whether the caller should write the value's content
    pub proceed: bool,
    pub token: Option<Token>,
}

/// Tracks which node holds each shared value of one document
pub struct ReferenceManager {
    format: ReferenceFormat,
    by_id: HashMap<u32, EntryRef>,
    /// Keyed by allocation address; the weak handle keeps the address from
    /// being reused while the key exists
    by_value: HashMap<usize, (WeakObject, EntryRef)>,
    /// Primaries by position, for nodes that carry no identity marker
    by_position: HashMap<NodeId, EntryRef>,
    next_id: u32,
}

impl ReferenceManager {
    /// Scan `root`'s subtree for existing markers. References may appear
    /// before the primary they point at.
    pub fn new(root: &Node, format: ReferenceFormat) -> Self {
        let mut manager = ReferenceManager {
            format,
            by_id: HashMap::new(),
            by_value: HashMap::new(),
            by_position: HashMap::new(),
            next_id: 1,
        };
        manager.populate(root);
        manager
    }

    pub fn format(&self) -> &ReferenceFormat {
        &self.format
    }

    fn populate(&mut self, root: &Node) {
        let mut deferred = Vec::new();

        for node in root.select_subtree() {
            if let Some(id) = self.format.try_get_identity(&node) {
                if !self.by_id.contains_key(&id) {
                    let entry = Entry::with_id(id, &node);
                    self.place(&entry);
                    self.by_id.insert(id, entry);
                }
                if self.next_id <= id {
                    self.next_id = id + 1;
                }
            } else if let Some(id) = self.format.try_get_reference(&node) {
                match self.by_id.get(&id) {
                    Some(entry) => entry.borrow_mut().references.push(node),
                    None => deferred.push((id, node)),
                }
            }
        }

        for (id, node) in deferred {
            if let Some(entry) = self.by_id.get(&id) {
                entry.borrow_mut().references.push(node);
            }
        }
        debug!(
            "reference manager: {} identities, next id {}",
            self.by_id.len(),
            self.next_id
        );
    }

    // ------------------------------------------------------------------
    // Lookup
    // ------------------------------------------------------------------

    /// The primary node of a tracked value
    pub fn try_get(&self, value: &Value) -> Option<Node> {
        let object = tracked_object(value)?;
        let entry = self.entry_for(object)?;
        let node = entry.borrow().node.clone();
        Some(node)
    }

    /// The in-graph value standing for `value`: a value of a compatible type
    /// tracked at the same primary, or `value` itself
    pub fn try_get_value(&self, value: &Value) -> Option<Value> {
        let object = tracked_object(value)?;
        let entry = self.entry_for(object)?;
        let found = compatible_value(&entry, object.data_type()).unwrap_or_else(|| object.clone());
        Some(Value::Object(found))
    }

    pub fn is_tracked(&self, value: &Value) -> bool {
        self.try_get(value).is_some()
    }

    fn entry_for(&self, object: &Object) -> Option<EntryRef> {
        let (weak, entry) = self.by_value.get(&object.address())?;
        match weak.upgrade() {
            Some(live) if live.ptr_eq(object) => Some(entry.clone()),
            _ => None,
        }
    }

    /// The entry `node` belongs to, by marker or else by position, and
    /// whether `node` is a reference to it
    fn entry_at(&self, node: &Node) -> Result<Option<(EntryRef, bool)>> {
        let (id, is_reference) = if let Some(id) = self.format.try_get_identity(node) {
            (id, false)
        } else if let Some(id) = self.format.try_get_reference(node) {
            (id, true)
        } else {
            return Ok(self.entry_by_position(node).map(|entry| (entry, false)));
        };
        match self.by_id.get(&id) {
            Some(entry) => Ok(Some((entry.clone(), is_reference))),
            None => Err(Error::IdNotFound(id)),
        }
    }

    fn entry_by_position(&self, node: &Node) -> Option<EntryRef> {
        let location = node.location()?;
        let entry = self.by_position.get(&location.id)?;
        let placed = entry.borrow().node.position_eq(node);
        placed.then(|| entry.clone())
    }

    /// Record where an entry's primary lives
    fn place(&mut self, entry: &EntryRef) {
        if let Some(location) = entry.borrow().node.location() {
            self.by_position.insert(location.id, entry.clone());
        }
    }

    fn unplace(&mut self, entry: &EntryRef) {
        if let Some(location) = entry.borrow().node.location() {
            let placed_here = self
                .by_position
                .get(&location.id)
                .is_some_and(|e| Rc::ptr_eq(e, entry));
            if placed_here {
                self.by_position.remove(&location.id);
            }
        }
    }

    fn new_entry(&mut self, node: &Node) -> EntryRef {
        let entry = Entry::new(node);
        self.place(&entry);
        entry
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    pub fn on_get_starting(&mut self, node: &Node) -> Result<GetStarting> {
        let Some(data_type) = node.data_type().filter(|t| !t.is_value_like()) else {
            return Ok(GetStarting::Proceed {
                node: node.clone(),
                token: None,
            });
        };

        let Some((entry, is_reference)) = self.entry_at(node)? else {
            return Ok(GetStarting::Proceed {
                node: node.clone(),
                token: Some(Token(TokenKind::CreateEntry)),
            });
        };

        let node = if is_reference {
            redirect(&entry, &data_type)?
        } else {
            node.clone()
        };

        match compatible_value(&entry, &data_type) {
            Some(found) => {
                trace!("identity hit for {}", data_type);
                Ok(GetStarting::Cached(Value::Object(found)))
            }
            None => Ok(GetStarting::Proceed {
                node,
                token: Some(Token(TokenKind::Entry(entry))),
            }),
        }
    }

    pub fn on_get_completed(&mut self, node: &Node, value: &Value, token: Option<Token>) {
        let Some(object) = tracked_object(value) else {
            return;
        };
        if node.data_type().is_some_and(|t| t.is_value_like()) || self.entry_for(object).is_some() {
            return;
        }
        let entry = match token {
            Some(Token(TokenKind::CreateEntry)) => self.new_entry(node),
            Some(Token(TokenKind::Entry(entry))) => entry,
            None => return,
        };
        let data_type = node.data_type().unwrap_or_else(|| object.data_type().clone());
        self.add_value(&entry, data_type, object, true);
    }

    // ------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------

    /// Clearing a slot: drops its marker and, for a primary, hands the
    /// content to a reference
    pub fn on_assigning_null(&mut self, node: &Node, old: Option<&Value>) -> Result<bool> {
        self.on_assigning_value(node, old, None).map(|a| a.proceed)
    }

    pub fn on_assigning_value(
        &mut self,
        node: &Node,
        old: Option<&Value>,
        new: Option<&Value>,
    ) -> Result<Assignment> {
        if let (Some(Value::Object(old)), Some(Value::Object(new))) = (old, new) {
            if old.ptr_eq(new) {
                return Ok(Assignment {
                    proceed: false,
                    token: None,
                });
            }
        }

        let old_entry = self.on_replacing_value(node, old)?;

        let Some(object) = new.and_then(tracked_object) else {
            return Ok(self.finish_assignment(old_entry, None, None));
        };

        if let Some(entry) = self.entry_for(object) {
            self.add_reference(node, &entry)?;
            return Ok(self.finish_assignment(old_entry, Some(entry), None));
        }

        let entry = match &old_entry {
            Some(old) => old.clone(),
            None => self.new_entry(node),
        };
        self.add_value(&entry, object.data_type().clone(), object, true);
        self.format.clear_identity(node)?;
        self.format.clear_reference(node)?;
        let token = Some(Token(TokenKind::Entry(entry.clone())));
        Ok(self.finish_assignment(old_entry, Some(entry), token))
    }

    /// The serializer may store a different value than it was given; keep
    /// tracking what actually ended up in the graph
    pub fn on_assigned_value(&mut self, node: &Node, given: &Value, stored: &Value, token: Option<Token>) {
        let Some(Token(TokenKind::Entry(entry))) = token else {
            return;
        };
        if same_object(given, stored) {
            return;
        }
        if let Some(given) = tracked_object(given) {
            set_not_in_graph(&entry, given);
        }
        let Some(stored) = tracked_object(stored) else {
            return;
        };
        if self.entry_for(stored).is_some() {
            return;
        }
        let data_type = node.data_type().unwrap_or_else(|| stored.data_type().clone());
        self.add_value(&entry, data_type, stored, true);
    }

    fn finish_assignment(
        &mut self,
        old_entry: Option<EntryRef>,
        new_entry: Option<EntryRef>,
        token: Option<Token>,
    ) -> Assignment {
        if let Some(old) = &old_entry {
            let reused = new_entry.as_ref().is_some_and(|new| Rc::ptr_eq(old, new));
            let id = old.borrow().id;
            if !reused && id > 0 {
                self.by_id.remove(&id);
            }
            if !reused {
                self.unplace(old);
            }
        }
        Assignment {
            proceed: token.is_some() || new_entry.is_none(),
            token,
        }
    }

    /// Detach `node` from whatever it held before. Returns the entry when
    /// `node` was a primary without references, for reuse.
    fn on_replacing_value(&mut self, node: &Node, old: Option<&Value>) -> Result<Option<EntryRef>> {
        let (entry, is_reference) = match old.and_then(tracked_object) {
            Some(object) => match self.entry_for(object) {
                Some(entry) => {
                    let is_reference = !entry.borrow().node.position_eq(node);
                    (entry, is_reference)
                }
                None => return Ok(None),
            },
            None if old.is_some() => return Ok(None),
            None => match self.entry_at(node)? {
                Some(found) => found,
                None => return Ok(None),
            },
        };

        if is_reference {
            entry.borrow_mut().remove_reference(node);
            self.clear_reference(&entry, node)?;
            return Ok(None);
        }

        if entry.borrow().references.is_empty() {
            self.prepare_for_reuse(&entry)?;
            return Ok(Some(entry));
        }

        // The first reference takes over the content
        let promoted = entry.borrow_mut().references.remove(0);
        self.clear_reference(&entry, &promoted)?;
        let primary = entry.borrow().node.clone();
        primary.copy_to(&promoted)?;
        primary.clear()?;
        debug!("promoted reference {:?} to primary of {}", promoted, entry.borrow().id);
        self.unplace(&entry);
        entry.borrow_mut().node = promoted;
        self.place(&entry);
        Ok(None)
    }

    fn add_reference(&mut self, node: &Node, entry: &EntryRef) -> Result<()> {
        if entry.borrow().node.position_eq(node) {
            return Ok(());
        }
        if entry.borrow().references.is_empty() {
            let id = self.generate_id(entry);
            let primary = entry.borrow().node.clone();
            self.format.set_identity(&primary, id)?;
        }
        let id = entry.borrow().id;
        node.clear()?;
        entry.borrow_mut().references.push(node.save());
        self.format.set_reference(node, id)?;
        debug!("{:?} now refers to identity {}", node, id);
        Ok(())
    }

    fn generate_id(&mut self, entry: &EntryRef) -> u32 {
        let mut e = entry.borrow_mut();
        if e.id == 0 {
            e.id = self.next_id;
            self.next_id += 1;
            self.by_id.insert(e.id, entry.clone());
        }
        e.id
    }

    fn add_value(&mut self, entry: &EntryRef, data_type: DataType, object: &Object, in_graph: bool) {
        entry.borrow_mut().values.push(EntryValue {
            data_type,
            value: object.downgrade(),
            in_graph,
        });
        if self.by_value.len().is_power_of_two() {
            self.by_value.retain(|_, (weak, _)| weak.upgrade().is_some());
        }
        self.by_value
            .insert(object.address(), (object.downgrade(), entry.clone()));
    }

    /// Removing the last reference also removes the primary's identity
    fn clear_reference(&self, entry: &EntryRef, node: &Node) -> Result<()> {
        self.format.clear_reference(node)?;
        let e = entry.borrow();
        if e.references.is_empty() {
            self.format.clear_identity(&e.node)?;
        }
        Ok(())
    }

    fn prepare_for_reuse(&mut self, entry: &EntryRef) -> Result<()> {
        let values = std::mem::take(&mut entry.borrow_mut().values);
        for item in values {
            if let Some(object) = item.value.upgrade() {
                self.by_value.remove(&object.address());
            }
        }
        let primary = entry.borrow().node.clone();
        self.format.clear_identity(&primary)
    }

    /// Learn the alternate values another manager tracks for the values
    /// both of them know
    pub fn union_with(&mut self, other: &ReferenceManager) {
        let mut visited: Vec<EntryRef> = Vec::new();

        for (address, (weak, other_entry)) in &other.by_value {
            let Some(key) = weak.upgrade() else {
                continue;
            };
            let Some(this_entry) = self.entry_for(&key) else {
                continue;
            };
            if visited.iter().any(|e| Rc::ptr_eq(e, &this_entry)) {
                continue;
            }
            visited.push(this_entry.clone());

            let candidates: Vec<(DataType, Object)> = other_entry
                .borrow()
                .values
                .iter()
                .filter_map(|v| v.value.upgrade().map(|o| (v.data_type.clone(), o)))
                .collect();
            for (data_type, target) in candidates {
                if target.address() == *address || self.entry_for(&target).is_some() {
                    continue;
                }
                self.add_value(&this_entry, data_type, &target, false);
            }
        }
    }
}

impl fmt::Debug for ReferenceManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReferenceManager")
            .field("identities", &self.by_id.len())
            .field("values", &self.by_value.len())
            .field("next_id", &self.next_id)
            .finish()
    }
}

/// Values with identity whose type is not value-like
fn tracked_object(value: &Value) -> Option<&Object> {
    value.as_object().filter(|o| !o.data_type().is_value_like())
}

fn same_object(a: &Value, b: &Value) -> bool {
    matches!((a, b), (Value::Object(a), Value::Object(b)) if a.ptr_eq(b))
}

/// A live in-graph value usable as `data_type`
fn compatible_value(entry: &EntryRef, data_type: &DataType) -> Option<Object> {
    entry
        .borrow()
        .values
        .iter()
        .filter(|v| v.in_graph && data_type.is_assignable_from(&v.data_type))
        .find_map(|v| v.value.upgrade())
}

fn set_not_in_graph(entry: &EntryRef, object: &Object) {
    let mut e = entry.borrow_mut();
    let found = e
        .values
        .iter_mut()
        .find(|v| v.value.upgrade().is_some_and(|o| o.ptr_eq(object)));
    if let Some(item) = found {
        item.in_graph = false;
    }
}

/// The primary, selected as `data_type`
fn redirect(entry: &EntryRef, data_type: &DataType) -> Result<Node> {
    let primary = entry.borrow().node.clone();
    let cursor = primary.select_self(data_type.clone());
    cursor.move_next()?;
    Ok(cursor.save())
}
