//! Typed in-memory values
//!
//! Simple values are plain data. [`Object`] values carry identity: two
//! objects are the same value only when they share one allocation, which is
//! what the reference manager keys on.

use std::any::Any;
use std::fmt;
use std::rc::{Rc, Weak};

use chrono::{DateTime, FixedOffset};
use url::Url;
use uuid::Uuid;

use crate::types::DataType;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(String),
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Char(char),
    DateTime(DateTime<FixedOffset>),
    Bytes(Vec<u8>),
    Uuid(Uuid),
    Uri(Url),
    Object(Object),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    /// The concrete type of an object value
    pub fn object_type(&self) -> Option<&DataType> {
        self.as_object().map(Object::data_type)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Float(n)
    }
}

impl From<Object> for Value {
    fn from(o: Object) -> Self {
        Value::Object(o)
    }
}

/// A shared value with identity
#[derive(Clone)]
pub struct Object {
    inner: Rc<dyn Any>,
    data_type: DataType,
}

impl Object {
    pub fn new<T: Any>(value: T, data_type: DataType) -> Self {
        Object {
            inner: Rc::new(value),
            data_type,
        }
    }

    pub fn data_type(&self) -> &DataType {
        &self.data_type
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.inner.downcast_ref::<T>()
    }

    /// Whether both handles refer to the same allocation
    pub fn ptr_eq(&self, other: &Object) -> bool {
        self.address() == other.address()
    }

    /// Address of the shared allocation; stable while any handle lives
    pub fn address(&self) -> usize {
        Rc::as_ptr(&self.inner) as *const () as usize
    }

    pub fn downgrade(&self) -> WeakObject {
        WeakObject {
            inner: Rc::downgrade(&self.inner),
            data_type: self.data_type.clone(),
        }
    }
}

impl PartialEq for Object {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Object({} @ {:#x})", self.data_type, self.address())
    }
}

/// A non-owning handle to an [`Object`]
#[derive(Clone)]
pub struct WeakObject {
    inner: Weak<dyn Any>,
    data_type: DataType,
}

impl WeakObject {
    pub fn upgrade(&self) -> Option<Object> {
        self.inner.upgrade().map(|inner| Object {
            inner,
            data_type: self.data_type.clone(),
        })
    }

    pub fn data_type(&self) -> &DataType {
        &self.data_type
    }
}

impl fmt::Debug for WeakObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WeakObject({})", self.data_type)
    }
}
