//! Value serializers and their process-wide cache
//!
//! [`get`] hands out one serializer per [`DataType`], constructing it on
//! first use. Built-in types are written as text; anything else must be
//! [`register`]ed first, typically as a [`CustomSerializer`].

mod builtin;

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, LazyLock, PoisonError, RwLock};

use log::debug;

use crate::error::{Error, Result};
use crate::node::Node;
use crate::types::DataType;
use crate::value::Value;

use builtin::TextSerializer;

/// Converts between a node and an in-memory value
pub trait TypeSerializer: Send + Sync {
    fn read(&self, node: &Node) -> Result<Value>;

    fn write(&self, node: &Node, value: &Value) -> Result<()>;

    /// Fail where `write` would, without touching any node
    fn check(&self, _value: &Value) -> Result<()> {
        Ok(())
    }
}

type ReadFn = dyn Fn(&Node) -> Result<Value> + Send + Sync;
type WriteFn = dyn Fn(&Node, &Value) -> Result<()> + Send + Sync;
type CheckFn = dyn Fn(&Value) -> Result<()> + Send + Sync;

/// A serializer built from a pair of closures
pub struct CustomSerializer {
    read: Box<ReadFn>,
    write: Box<WriteFn>,
    check: Option<Box<CheckFn>>,
}

impl CustomSerializer {
    pub fn new<R, W>(read: R, write: W) -> Self
    where
        R: Fn(&Node) -> Result<Value> + Send + Sync + 'static,
        W: Fn(&Node, &Value) -> Result<()> + Send + Sync + 'static,
    {
        CustomSerializer {
            read: Box::new(read),
            write: Box::new(write),
            check: None,
        }
    }

    /// Validate values before the accessor creates or retypes a node
    pub fn with_check<C>(mut self, check: C) -> Self
    where
        C: Fn(&Value) -> Result<()> + Send + Sync + 'static,
    {
        self.check = Some(Box::new(check));
        self
    }
}

impl TypeSerializer for CustomSerializer {
    fn read(&self, node: &Node) -> Result<Value> {
        (self.read)(node)
    }

    fn write(&self, node: &Node, value: &Value) -> Result<()> {
        (self.write)(node, value)
    }

    fn check(&self, value: &Value) -> Result<()> {
        self.check.as_ref().map_or(Ok(()), |check| check(value))
    }
}

impl fmt::Debug for CustomSerializer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CustomSerializer")
    }
}

type Cache = HashMap<DataType, Arc<dyn TypeSerializer>>;

static CACHE: LazyLock<RwLock<Cache>> = LazyLock::new(|| RwLock::new(HashMap::new()));

/// The serializer for `data_type`. Every caller gets the same instance.
pub fn get(data_type: &DataType) -> Result<Arc<dyn TypeSerializer>> {
    {
        let cache = CACHE.read().unwrap_or_else(PoisonError::into_inner);
        if let Some(found) = cache.get(data_type) {
            return Ok(found.clone());
        }
    }

    let mut cache = CACHE.write().unwrap_or_else(PoisonError::into_inner);
    // Another thread may have built it while we waited
    if let Some(found) = cache.get(data_type) {
        return Ok(found.clone());
    }
    let built: Arc<dyn TypeSerializer> = match TextSerializer::for_type(data_type) {
        Some(text) => Arc::new(text),
        None => {
            return Err(Error::serialization(format!(
                "no serializer for type `{}`",
                data_type
            )))
        }
    };
    debug!("constructed serializer for {}", data_type);
    cache.insert(data_type.clone(), built.clone());
    Ok(built)
}

/// Install (or replace) the serializer used for `data_type`
pub fn register(data_type: DataType, serializer: Arc<dyn TypeSerializer>) {
    debug!("registered serializer for {}", data_type);
    CACHE
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .insert(data_type, serializer);
}
