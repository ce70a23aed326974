//! Creatable path structure: steps, predicate dependencies and values.

use crate::xpath::CompiledExpr;

/// A literal or variable that a created node is assigned
#[derive(Debug, Clone)]
pub struct PathValue {
    /// Source text, quotes included: `'1'`, `"1"`, `$v`
    pub text: String,
    pub expr: CompiledExpr,
}

/// A node that must exist for a predicate to hold
#[derive(Debug, Clone, Default)]
pub struct PathNode {
    pub prefix: Option<String>,
    /// `None` only for a self-reference (`.`)
    pub local_name: Option<String>,
    pub is_attribute: bool,
    pub(crate) value: Option<PathValue>,
    pub dependencies: Vec<PathNode>,
    /// Next node of a nested predicate path (`b/c` in `a[b/c]`)
    pub next: Option<Box<PathNode>>,
}

impl PathNode {
    pub(crate) fn self_reference() -> Self {
        PathNode::default()
    }

    pub fn is_self_reference(&self) -> bool {
        self.local_name.is_none()
    }

    /// The node's own value, or the value of its self-reference predicate
    pub fn value(&self) -> Option<&PathValue> {
        self.value.as_ref().or_else(|| {
            self.dependencies
                .first()
                .filter(|d| d.is_self_reference())
                .and_then(|d| d.value.as_ref())
        })
    }

    /// Dependencies that name real nodes
    pub fn named_dependencies(&self) -> impl Iterator<Item = &PathNode> {
        self.dependencies.iter().filter(|d| !d.is_self_reference())
    }

    /// No nested path and no dependency other than a self-reference
    pub fn is_simple(&self) -> bool {
        self.next.is_none() && self.has_only_self_dependency()
    }

    pub(crate) fn has_only_self_dependency(&self) -> bool {
        match self.dependencies.as_slice() {
            [] => true,
            [only] => only.is_self_reference(),
            _ => false,
        }
    }

    /// Last node of the nested path starting here
    pub(crate) fn tail_mut(&mut self) -> &mut PathNode {
        match self.next {
            Some(ref mut next) => next.tail_mut(),
            None => self,
        }
    }
}

/// One `/`-separated step of a creatable path
#[derive(Debug, Clone)]
pub struct CompiledStep {
    pub node: PathNode,
    /// Source text of the step, predicates included
    pub text: String,
    /// The step compiled as a relative expression
    pub select: CompiledExpr,
    pub next: Option<Box<CompiledStep>>,
}

impl CompiledStep {
    pub fn next_step(&self) -> Option<&CompiledStep> {
        self.next.as_deref()
    }

    pub fn is_attribute(&self) -> bool {
        self.node.is_attribute
    }

    pub fn is_simple(&self) -> bool {
        self.next.is_none() && self.node.has_only_self_dependency()
    }
}
