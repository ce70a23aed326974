//! Compiled paths
//!
//! A [`CompiledPath`] carries both a selection program, usable for any XPath
//! expression, and, when the expression stays inside the creatable subset,
//! the chain of steps needed to build matching nodes that do not exist yet.
//!
//! Compilation results are kept in a process-wide LRU cache keyed by the
//! expression text.

mod compiler;
mod step;

use std::num::NonZeroUsize;
use std::sync::{Arc, LazyLock, Mutex, PoisonError};

use lru::LruCache;

pub use step::{CompiledStep, PathNode, PathValue};

use crate::error::Result;
use crate::xpath::CompiledExpr;

/// Number of compiled paths kept by [`compile`]
pub const DEFAULT_CACHE_CAPACITY: usize = 256;

static CACHE: LazyLock<Mutex<LruCache<String, Arc<CompiledPath>>>> = LazyLock::new(|| {
    let capacity = NonZeroUsize::new(DEFAULT_CACHE_CAPACITY).unwrap_or(NonZeroUsize::MIN);
    Mutex::new(LruCache::new(capacity))
});

/// A compiled XPath expression
#[derive(Debug, Clone)]
pub struct CompiledPath {
    expression: String,
    select: CompiledExpr,
    first_step: Option<CompiledStep>,
    depth: usize,
}

impl CompiledPath {
    /// Compile without consulting the cache
    pub fn new(expression: &str) -> Result<Self> {
        let select = crate::xpath::compiler::compile(expression)?;
        let (first_step, depth) = match compiler::parse_steps(expression) {
            Some((step, depth)) => (Some(step), depth),
            None => (None, 0),
        };
        Ok(CompiledPath {
            expression: expression.to_string(),
            select,
            first_step,
            depth,
        })
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    pub fn select(&self) -> &CompiledExpr {
        &self.select
    }

    /// Whether missing nodes on this path can be created
    pub fn is_creatable(&self) -> bool {
        self.first_step.is_some()
    }

    pub fn first_step(&self) -> Option<&CompiledStep> {
        self.first_step.as_ref()
    }

    pub fn last_step(&self) -> Option<&CompiledStep> {
        self.steps().last()
    }

    pub fn steps(&self) -> impl Iterator<Item = &CompiledStep> {
        std::iter::successors(self.first_step(), |step| step.next_step())
    }

    /// The step at `index`, counting from the first
    pub fn step(&self, index: usize) -> Option<&CompiledStep> {
        self.steps().nth(index)
    }

    /// Number of steps; zero when not creatable
    pub fn depth(&self) -> usize {
        self.depth
    }
}

/// Compile an expression, reusing a cached result when available
pub fn compile(expression: &str) -> Result<Arc<CompiledPath>> {
    if let Some(path) = CACHE
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .get(expression)
    {
        return Ok(Arc::clone(path));
    }

    let path = Arc::new(CompiledPath::new(expression)?);
    log::trace!(
        "compiled path `{}` (creatable: {}, depth: {})",
        expression,
        path.is_creatable(),
        path.depth
    );
    CACHE
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .put(expression.to_string(), Arc::clone(&path));
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn test_creatable_path() {
        let path = compile("aa/bb[@cc='1']/@dd").unwrap();
        assert!(path.is_creatable());
        assert_eq!(path.depth(), 3);
        let texts: Vec<&str> = path.steps().map(|s| s.text.as_str()).collect();
        assert_eq!(texts, vec!["aa", "bb[@cc='1']", "@dd"]);
        assert_eq!(path.last_step().unwrap().text, "@dd");
        assert_eq!(path.step(1).unwrap().text, "bb[@cc='1']");
        assert!(path.step(3).is_none());
    }

    #[test]
    fn test_selection_only_path() {
        let path = compile("//aa[position() > 1]").unwrap();
        assert!(!path.is_creatable());
        assert_eq!(path.depth(), 0);
        assert!(path.first_step().is_none());
        assert_eq!(path.expression(), "//aa[position() > 1]");
    }

    #[test]
    fn test_syntax_error() {
        assert!(matches!(compile("aa["), Err(Error::InvalidPath { .. })));
        assert!(matches!(compile("aa]"), Err(Error::InvalidPath { .. })));
    }

    #[test]
    fn test_cache_returns_shared_instance() {
        let first = compile("cached/path").unwrap();
        let second = compile("cached/path").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }
}
