//! XPath 1.0 Engine
//!
//! Query side of path handling:
//! - every axis except `namespace`
//! - attributes as first-class nodes
//! - namespace prefixes and `$variables` bound through [`XPathContext`]
//! - the core function library

pub mod ast;
pub mod axes;
pub mod compiler;
pub mod context;
pub mod eval;
pub mod functions;
pub mod lexer;
pub mod parser;
pub mod value;

pub use compiler::CompiledExpr;
pub use context::XPathContext;
pub use eval::{evaluate_compiled, evaluate_from_node, EvalContext};
pub use value::XPathValue;
