//! Lowering of the syntax tree to a postfix program
//!
//! Operands are emitted before the operation that consumes them, so the
//! evaluator runs a program with a single value stack. Predicates stay
//! nested programs because they run once per candidate node.

use super::ast::{Axis, BinaryOp, Expr, NodeTest, PathStart, Step};
use crate::error::Result;

#[derive(Debug, Clone, PartialEq)]
pub struct CompiledExpr {
    pub ops: Vec<Op>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    /// Push the document node
    Root,
    /// Push the context node
    Context,
    /// Replace the node-set on top with the nodes reached along an axis
    Navigate(Axis, NodeTest),
    /// Keep the nodes on top for which the program holds
    Predicate(Box<CompiledExpr>),
    Union,
    Number(f64),
    String(String),
    Variable(String),
    /// Function name and argument count
    Call(String, usize),
    Binary(BinaryOp),
    Negate,
}

impl CompiledExpr {
    pub fn compile(expr: &Expr) -> Self {
        let mut ops = Vec::new();
        emit(expr, &mut ops);
        CompiledExpr { ops }
    }
}

fn emit(expr: &Expr, ops: &mut Vec<Op>) {
    match expr {
        Expr::Number(n) => ops.push(Op::Number(*n)),
        Expr::Literal(s) => ops.push(Op::String(s.clone())),
        Expr::Variable(name) => ops.push(Op::Variable(name.clone())),
        Expr::Call { name, args } => {
            args.iter().for_each(|arg| emit(arg, ops));
            ops.push(Op::Call(name.clone(), args.len()));
        }
        Expr::Negate(inner) => {
            emit(inner, ops);
            ops.push(Op::Negate);
        }
        Expr::Binary { op, left, right } => {
            emit(left, ops);
            emit(right, ops);
            ops.push(Op::Binary(*op));
        }
        Expr::Union(left, right) => {
            emit(left, ops);
            emit(right, ops);
            ops.push(Op::Union);
        }
        Expr::Filter { primary, predicates } => {
            emit(primary, ops);
            emit_predicates(predicates, ops);
        }
        Expr::Path { start, steps } => {
            match start {
                PathStart::Root => ops.push(Op::Root),
                PathStart::Context => ops.push(Op::Context),
                PathStart::Expr(inner) => emit(inner, ops),
            }
            steps.iter().for_each(|step| emit_step(step, ops));
        }
    }
}

fn emit_step(step: &Step, ops: &mut Vec<Op>) {
    ops.push(Op::Navigate(step.axis, step.test.clone()));
    emit_predicates(&step.predicates, ops);
}

fn emit_predicates(predicates: &[Expr], ops: &mut Vec<Op>) {
    for predicate in predicates {
        ops.push(Op::Predicate(Box::new(CompiledExpr::compile(predicate))));
    }
}

/// Parse and compile an expression
pub fn compile(xpath: &str) -> Result<CompiledExpr> {
    super::parser::parse(xpath).map(|expr| CompiledExpr::compile(&expr))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relative_step_starts_at_context() {
        let compiled = compile("a[@b='1']").unwrap();
        assert_eq!(compiled.ops[0], Op::Context);
        assert_eq!(compiled.ops[1], Op::Navigate(Axis::Child, NodeTest::name(None, "a")));
        let Op::Predicate(predicate) = &compiled.ops[2] else {
            panic!("expected a predicate");
        };
        assert_eq!(
            predicate.ops,
            vec![
                Op::Context,
                Op::Navigate(Axis::Attribute, NodeTest::name(None, "b")),
                Op::String("1".to_string()),
                Op::Binary(BinaryOp::Eq),
            ]
        );
    }

    #[test]
    fn test_operands_precede_operators() {
        let compiled = compile("count(/r) + 1").unwrap();
        assert_eq!(
            compiled.ops,
            vec![
                Op::Root,
                Op::Navigate(Axis::Child, NodeTest::name(None, "r")),
                Op::Call("count".to_string(), 1),
                Op::Number(1.0),
                Op::Binary(BinaryOp::Add),
            ]
        );
    }

    #[test]
    fn test_prefixed_name_is_kept_for_evaluation() {
        let compiled = compile("p:a").unwrap();
        assert_eq!(compiled.ops[1], Op::Navigate(Axis::Child, NodeTest::name(Some("p"), "a")));
    }
}
