//! Value type descriptors

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Describes the type of value a node holds.
///
/// Cheap to clone; two descriptors are the same type when their names
/// match. Value-like types (primitives, strings) are never tracked by the
/// reference manager.
#[derive(Clone)]
pub struct DataType {
    inner: Arc<Inner>,
}

struct Inner {
    name: String,
    value_like: bool,
    base: Option<DataType>,
}

impl DataType {
    fn build(name: &str, value_like: bool, base: Option<DataType>) -> Self {
        DataType {
            inner: Arc::new(Inner {
                name: name.to_string(),
                value_like,
                base,
            }),
        }
    }

    /// A value-like type: copied, never shared by identity
    pub fn value(name: &str) -> Self {
        Self::build(name, true, None)
    }

    /// A reference type whose values have identity
    pub fn reference(name: &str) -> Self {
        Self::build(name, false, None)
    }

    /// A reference type deriving from `base`
    pub fn derived(name: &str, base: &DataType) -> Self {
        Self::build(name, base.is_value_like(), Some(base.clone()))
    }

    pub fn string() -> Self {
        Self::value("string")
    }

    pub fn bool() -> Self {
        Self::value("bool")
    }

    pub fn i32() -> Self {
        Self::value("i32")
    }

    pub fn i64() -> Self {
        Self::value("i64")
    }

    pub fn u32() -> Self {
        Self::value("u32")
    }

    pub fn u64() -> Self {
        Self::value("u64")
    }

    pub fn f32() -> Self {
        Self::value("f32")
    }

    pub fn f64() -> Self {
        Self::value("f64")
    }

    pub fn char() -> Self {
        Self::value("char")
    }

    pub fn datetime() -> Self {
        Self::value("datetime")
    }

    pub fn bytes() -> Self {
        Self::value("bytes")
    }

    pub fn uuid() -> Self {
        Self::value("uuid")
    }

    pub fn uri() -> Self {
        Self::value("uri")
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn is_value_like(&self) -> bool {
        self.inner.value_like
    }

    pub fn base(&self) -> Option<&DataType> {
        self.inner.base.as_ref()
    }

    /// Whether a value of type `other` can be used where `self` is expected
    pub fn is_assignable_from(&self, other: &DataType) -> bool {
        let mut current = Some(other);
        while let Some(t) = current {
            if t == self {
                return true;
            }
            current = t.base();
        }
        false
    }
}

impl PartialEq for DataType {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner) || self.inner.name == other.inner.name
    }
}

impl Eq for DataType {}

impl Hash for DataType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.name.hash(state);
    }
}

impl fmt::Debug for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DataType({})", self.inner.name)
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.inner.name)
    }
}
