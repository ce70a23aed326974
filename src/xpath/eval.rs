//! XPath Evaluation Engine
//!
//! Evaluates compiled XPath expressions against an XML document.

use std::collections::HashSet;

use super::ast::BinaryOp;
use super::axes::{matches_node_test, navigate, resolve_node_test};
use super::compiler::{CompiledExpr, Op};
use super::context::XPathContext;
use super::functions::{self, CallSite};
use super::value::XPathValue;
use crate::dom::{NodeId, XmlDocument};
use crate::error::{Error, Result};

/// Evaluation context
pub struct EvalContext<'a> {
    pub doc: &'a XmlDocument,
    pub bindings: &'a XPathContext,
    pub context_node: NodeId,
    pub context_position: usize,
    pub context_size: usize,
}

impl<'a> EvalContext<'a> {
    pub fn new(doc: &'a XmlDocument, bindings: &'a XPathContext, context_node: NodeId) -> Self {
        EvalContext {
            doc,
            bindings,
            context_node,
            context_position: 1,
            context_size: 1,
        }
    }
}

/// Compile and evaluate an expression from a context node
#[must_use = "XPath evaluation result should be used"]
pub fn evaluate_from_node(
    doc: &XmlDocument,
    bindings: &XPathContext,
    context_node: NodeId,
    xpath: &str,
) -> Result<XPathValue> {
    let compiled = super::compiler::compile(xpath)?;
    evaluate_compiled(&compiled, &EvalContext::new(doc, bindings, context_node))
}

/// Evaluate a compiled expression
pub fn evaluate_compiled(expr: &CompiledExpr, ctx: &EvalContext<'_>) -> Result<XPathValue> {
    let mut stack: Vec<XPathValue> = Vec::new();

    for op in &expr.ops {
        match op {
            Op::Root => {
                stack.push(XPathValue::single_node(ctx.doc.document_node_id()));
            }

            Op::Context => {
                stack.push(XPathValue::single_node(ctx.context_node));
            }

            Op::Navigate(axis, node_test) => {
                let current = stack
                    .pop()
                    .unwrap_or(XPathValue::single_node(ctx.context_node));
                let XPathValue::NodeSet(nodes) = current else {
                    return Err(Error::evaluation("location step applied to a non-node-set"));
                };
                let test = resolve_node_test(node_test, ctx.bindings)?;

                let mut seen = HashSet::with_capacity(nodes.len());
                let mut result = Vec::with_capacity(nodes.len());
                for node in nodes {
                    for candidate in navigate(ctx.doc, node, *axis) {
                        if matches_node_test(ctx.doc, candidate, &test, *axis) && seen.insert(candidate) {
                            result.push(candidate);
                        }
                    }
                }
                ctx.doc.sort_document_order(&mut result);
                stack.push(XPathValue::NodeSet(result));
            }

            Op::Predicate(pred_expr) => {
                let current = stack.pop().unwrap_or_default();
                let XPathValue::NodeSet(nodes) = current else {
                    return Err(Error::evaluation("predicate applied to a non-node-set"));
                };
                let size = nodes.len();
                let mut filtered = Vec::new();

                for (i, &node) in nodes.iter().enumerate() {
                    let pred_ctx = EvalContext {
                        doc: ctx.doc,
                        bindings: ctx.bindings,
                        context_node: node,
                        context_position: i + 1,
                        context_size: size,
                    };

                    let include = match evaluate_compiled(pred_expr, &pred_ctx)? {
                        XPathValue::Number(n) => (i + 1) as f64 == n,
                        other => other.to_boolean(),
                    };
                    if include {
                        filtered.push(node);
                    }
                }

                stack.push(XPathValue::NodeSet(filtered));
            }

            Op::Union => {
                let right = stack.pop().unwrap_or_default();
                let left = stack.pop().unwrap_or_default();

                match (left, right) {
                    (XPathValue::NodeSet(mut l), XPathValue::NodeSet(r)) => {
                        l.extend(r);
                        ctx.doc.sort_document_order(&mut l);
                        stack.push(XPathValue::NodeSet(l));
                    }
                    _ => return Err(Error::evaluation("union requires two node-sets")),
                }
            }

            Op::Number(n) => {
                stack.push(XPathValue::Number(*n));
            }

            Op::String(s) => {
                stack.push(XPathValue::String(s.clone()));
            }

            Op::Variable(name) => {
                let value = ctx
                    .bindings
                    .variable(name)
                    .cloned()
                    .ok_or_else(|| Error::evaluation(format!("variable ${} is not bound", name)))?;
                stack.push(value);
            }

            Op::Negate => {
                let val = stack.pop().unwrap_or(XPathValue::Number(0.0));
                stack.push(XPathValue::Number(-val.number(ctx.doc)));
            }

            Op::Binary(op) => {
                let right = stack.pop().unwrap_or(XPathValue::Number(0.0));
                let left = stack.pop().unwrap_or(XPathValue::Number(0.0));
                let doc = ctx.doc;

                let result = match op {
                    BinaryOp::Or => XPathValue::Boolean(left.to_boolean() || right.to_boolean()),
                    BinaryOp::And => XPathValue::Boolean(left.to_boolean() && right.to_boolean()),
                    BinaryOp::Eq => XPathValue::Boolean(compare_values(doc, &left, &right, true)),
                    BinaryOp::NotEq => XPathValue::Boolean(compare_values(doc, &left, &right, false)),
                    BinaryOp::Lt => compare_numbers(doc, &left, &right, |a, b| a < b),
                    BinaryOp::LtEq => compare_numbers(doc, &left, &right, |a, b| a <= b),
                    BinaryOp::Gt => compare_numbers(doc, &left, &right, |a, b| a > b),
                    BinaryOp::GtEq => compare_numbers(doc, &left, &right, |a, b| a >= b),
                    BinaryOp::Add => XPathValue::Number(left.number(doc) + right.number(doc)),
                    BinaryOp::Sub => XPathValue::Number(left.number(doc) - right.number(doc)),
                    BinaryOp::Mul => XPathValue::Number(left.number(doc) * right.number(doc)),
                    BinaryOp::Div => XPathValue::Number(left.number(doc) / right.number(doc)),
                    BinaryOp::Mod => XPathValue::Number(left.number(doc) % right.number(doc)),
                };

                stack.push(result);
            }

            Op::Call(name, arg_count) => {
                let split = stack.len().saturating_sub(*arg_count);
                let args = stack.split_off(split);
                let site = CallSite {
                    doc: ctx.doc,
                    context: ctx.context_node,
                    position: ctx.context_position,
                    size: ctx.context_size,
                };
                stack.push(functions::call(name, args, &site)?);
            }
        }
    }

    Ok(stack.pop().unwrap_or_default())
}

/// Equality per XPath 1.0: node-sets compare by the string-values of
/// their members, booleans and numbers by converted value
fn compare_values(doc: &XmlDocument, left: &XPathValue, right: &XPathValue, equal: bool) -> bool {
    let test = |a: &str, b: &str| (a == b) == equal;

    match (left, right) {
        (XPathValue::NodeSet(ln), XPathValue::NodeSet(rn)) => {
            let right_values: Vec<String> = rn.iter().map(|&r| doc.string_value(r)).collect();
            ln.iter().any(|&l| {
                let ls = doc.string_value(l);
                right_values.iter().any(|rs| test(&ls, rs))
            })
        }
        (XPathValue::NodeSet(nodes), other) | (other, XPathValue::NodeSet(nodes)) => match other {
            XPathValue::Boolean(b) => (!nodes.is_empty() == *b) == equal,
            XPathValue::Number(n) => nodes
                .iter()
                .any(|&node| (super::value::parse_number(&doc.string_value(node)) == *n) == equal),
            _ => {
                let other = other.to_string_value();
                nodes.iter().any(|&node| test(&doc.string_value(node), &other))
            }
        },
        (XPathValue::Boolean(_), _) | (_, XPathValue::Boolean(_)) => {
            (left.to_boolean() == right.to_boolean()) == equal
        }
        (XPathValue::Number(_), _) | (_, XPathValue::Number(_)) => {
            (left.to_number() == right.to_number()) == equal
        }
        _ => test(&left.to_string_value(), &right.to_string_value()),
    }
}

/// Compare two values as numbers
fn compare_numbers<F>(doc: &XmlDocument, left: &XPathValue, right: &XPathValue, cmp: F) -> XPathValue
where
    F: Fn(f64, f64) -> bool,
{
    XPathValue::Boolean(cmp(left.number(doc), right.number(doc)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(xml: &str, xpath: &str) -> (XmlDocument, XPathValue) {
        let doc = XmlDocument::parse(xml).unwrap();
        let root = doc.root_element_id().unwrap();
        let result = evaluate_from_node(&doc, &XPathContext::new(), root, xpath).unwrap();
        (doc, result)
    }

    #[test]
    fn test_simple_path() {
        let (_, result) = eval("<root><child/></root>", "/root/child");
        assert_eq!(result.as_nodeset().unwrap().len(), 1);
    }

    #[test]
    fn test_descendant() {
        let (_, result) = eval("<root><a><b/></a></root>", "//b");
        assert_eq!(result.as_nodeset().unwrap().len(), 1);
    }

    #[test]
    fn test_positional_predicate() {
        let (doc, result) = eval("<root><a/><b/><c/></root>", "*[2]");
        let nodes = result.as_nodeset().unwrap();
        assert_eq!(doc.local_name(nodes[0]), "b");
    }

    #[test]
    fn test_attribute_predicate() {
        let (doc, result) = eval("<root><a k='1'/><a k='2'>x</a></root>", "a[@k='2']");
        let nodes = result.as_nodeset().unwrap();
        assert_eq!(nodes.len(), 1);
        assert_eq!(doc.string_value(nodes[0]), "x");
    }

    #[test]
    fn test_attributes_are_nodes() {
        let (doc, result) = eval("<root Item='1' Other='2'/>", "@Item|@Other");
        let nodes = result.as_nodeset().unwrap();
        assert_eq!(nodes.len(), 2);
        assert_eq!(doc.local_name(nodes[0]), "Item");
        assert_eq!(doc.text(nodes[1]), "2");
    }

    #[test]
    fn test_parent_and_self_steps() {
        let (doc, result) = eval("<root k='v'><a/></root>", "a/../@k");
        assert_eq!(doc.text(result.as_nodeset().unwrap()[0]), "v");
        let (_, result) = eval("<root><a>2</a></root>", "a/. * 3 - 1");
        assert_eq!(result.to_number(), 5.0);
    }

    #[test]
    fn test_count_and_sum() {
        let (_, count) = eval("<root><a>1</a><a>2</a></root>", "count(a)");
        assert_eq!(count.to_number(), 2.0);
        let (_, sum) = eval("<root><a>1</a><a>2</a></root>", "sum(a)");
        assert_eq!(sum.to_number(), 3.0);
    }

    #[test]
    fn test_numeric_equality_against_nodes() {
        let (_, result) = eval("<root><a>1.0</a></root>", "a = 1");
        assert!(result.to_boolean());
    }

    #[test]
    fn test_variables() {
        let doc = XmlDocument::parse("<root><a>x</a></root>").unwrap();
        let root = doc.root_element_id().unwrap();
        let mut bindings = XPathContext::new();
        bindings.set_variable("v", "x");
        let result = evaluate_from_node(&doc, &bindings, root, "a = $v").unwrap();
        assert!(result.to_boolean());

        let unbound = evaluate_from_node(&doc, &XPathContext::new(), root, "a = $v");
        assert!(matches!(unbound, Err(Error::Evaluation(_))));
    }
}
