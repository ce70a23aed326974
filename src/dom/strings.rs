//! Interned names
//!
//! Local names, prefixes and namespace URIs are stored once and referred to
//! by `u32` id. Text and attribute values are not interned: they change on
//! every write and would only grow the pool.

use std::collections::HashMap;
use std::rc::Rc;

/// Id 0 is always the empty string, which doubles as "no prefix" and
/// "no namespace".
#[derive(Debug, Clone)]
pub struct StringPool {
    strings: Vec<Rc<str>>,
    ids: HashMap<Rc<str>, u32>,
}

impl Default for StringPool {
    fn default() -> Self {
        Self::new()
    }
}

impl StringPool {
    pub fn new() -> Self {
        let empty: Rc<str> = Rc::from("");
        StringPool {
            ids: HashMap::from([(empty.clone(), 0)]),
            strings: vec![empty],
        }
    }

    pub fn intern(&mut self, s: &str) -> u32 {
        if let Some(&id) = self.ids.get(s) {
            return id;
        }
        let id = self.strings.len() as u32;
        let shared: Rc<str> = Rc::from(s);
        self.strings.push(shared.clone());
        self.ids.insert(shared, id);
        id
    }

    /// The id of `s` if it was interned before
    pub fn find(&self, s: &str) -> Option<u32> {
        self.ids.get(s).copied()
    }

    /// Unknown ids resolve to the empty string
    pub fn get(&self, id: u32) -> &str {
        self.strings.get(id as usize).map_or("", |s| &**s)
    }

    pub fn len(&self) -> usize {
        self.strings.len()
    }

    /// Whether only the empty string is stored
    pub fn is_empty(&self) -> bool {
        self.strings.len() == 1
    }
}
