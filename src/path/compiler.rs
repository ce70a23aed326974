//! Creatable path compiler
//!
//! Recognizes the subset of XPath that can be materialized into new nodes:
//! a sequence of child or attribute steps, where each step may carry
//! predicates made of `and`-joined nested paths, each optionally compared
//! to a string literal or a variable.
//!
//! ```text
//! path       := step ('/' step)*
//! step       := '.' | '@'? qname predicate*
//! predicate  := '[' expr ('and' expr)* ']'
//! expr       := nested ('=' value)? | value '=' nested
//! nested     := node ('/' node)*
//! value      := literal | '$' qname
//! ```
//!
//! Anything outside the subset still compiles for selection; it just yields
//! no steps and is reported as not creatable.

use super::step::{CompiledStep, PathNode, PathValue};
use crate::xpath::compiler::compile as compile_expr;
use crate::xpath::ast::BinaryOp;
use crate::xpath::lexer::{Lexer, Spanned, Token};

/// Parse `input` into its creatable steps, or `None` if it is not creatable
pub(crate) fn parse_steps(input: &str) -> Option<(CompiledStep, usize)> {
    let mut parser = StepParser::new(input);
    let steps = parser.parse_path()?;
    let depth = steps.len();
    let mut iter = steps.into_iter().rev();
    let mut head = iter.next()?;
    for mut step in iter {
        step.next = Some(Box::new(head));
        head = step;
    }
    Some((head, depth))
}

struct StepParser<'a> {
    lexer: Lexer<'a>,
    current: Spanned,
    /// End of the last consumed token
    consumed: usize,
}

impl<'a> StepParser<'a> {
    fn new(input: &'a str) -> Self {
        let mut lexer = Lexer::new(input);
        let current = lexer.next_spanned();
        StepParser {
            lexer,
            current,
            consumed: 0,
        }
    }

    fn source(&self, start: usize) -> &'a str {
        &self.lexer.input()[start..self.consumed]
    }

    fn advance(&mut self) {
        self.consumed = self.current.end;
        self.current = self.lexer.next_spanned();
    }

    fn accept(&mut self, token: &Token) -> bool {
        if &self.current.token == token {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: &Token) -> Option<()> {
        self.accept(token).then_some(())
    }

    fn parse_path(&mut self) -> Option<Vec<CompiledStep>> {
        let mut steps: Vec<CompiledStep> = Vec::new();
        loop {
            self.parse_step(&mut steps)?;
            if self.current.token == Token::Eof {
                return (!steps.is_empty()).then_some(steps);
            }
            self.expect(&Token::Slash)?;
            if steps.last().is_some_and(CompiledStep::is_attribute) {
                return None;
            }
        }
    }

    fn parse_step(&mut self, steps: &mut Vec<CompiledStep>) -> Option<()> {
        let start = self.current.start;
        if let Some(node) = self.parse_node()? {
            let text = self.source(start).to_string();
            let select = compile_expr(&text).ok()?;
            steps.push(CompiledStep {
                node,
                text,
                select,
                next: None,
            });
        }
        Some(())
    }

    /// `Some(None)` is a self-reference
    fn parse_node(&mut self) -> Option<Option<PathNode>> {
        if self.accept(&Token::Dot) {
            return (self.current.token != Token::LeftBracket).then_some(None);
        }
        let mut node = PathNode {
            is_attribute: self.accept(&Token::At),
            ..PathNode::default()
        };
        self.parse_qualified_name(&mut node)?;
        self.parse_predicates(&mut node)?;
        Some(Some(node))
    }

    fn parse_qualified_name(&mut self, node: &mut PathNode) -> Option<()> {
        let Token::Name { prefix, local } = &self.current.token else {
            return None;
        };
        node.prefix = prefix.clone();
        node.local_name = Some(local.clone());
        self.advance();
        Some(())
    }

    fn parse_predicates(&mut self, node: &mut PathNode) -> Option<()> {
        while self.accept(&Token::LeftBracket) {
            loop {
                self.parse_expression(node)?;
                if !self.accept(&Token::Operator(BinaryOp::And)) {
                    break;
                }
            }
            self.expect(&Token::RightBracket)?;
        }
        Some(())
    }

    fn parse_expression(&mut self, parent: &mut PathNode) -> Option<()> {
        let path_first = matches!(
            self.current.token,
            Token::Name { .. } | Token::At | Token::Dot
        );
        let mut nested;
        if path_first {
            nested = self.parse_nested_path(parent)?;
            if self.accept(&Token::Operator(BinaryOp::Eq)) {
                nested.tail_mut().value = Some(self.parse_value()?);
            }
        } else {
            let value = self.parse_value()?;
            self.expect(&Token::Operator(BinaryOp::Eq))?;
            nested = self.parse_nested_path(parent)?;
            nested.tail_mut().value = Some(value);
        }
        parent.dependencies.push(nested);
        Some(())
    }

    fn parse_nested_path(&mut self, parent: &PathNode) -> Option<PathNode> {
        let mut chain: Vec<PathNode> = Vec::new();
        loop {
            if let Some(node) = self.parse_node()? {
                chain.push(node);
            }
            if !self.accept(&Token::Slash) {
                break;
            }
            if chain.last().is_some_and(|n| n.is_attribute) {
                return None;
            }
        }

        let mut iter = chain.into_iter().rev();
        let Some(mut head) = iter.next() else {
            // A bare `.` may only open the predicate list
            return parent
                .dependencies
                .is_empty()
                .then(PathNode::self_reference);
        };
        for mut node in iter {
            node.next = Some(Box::new(head));
            head = node;
        }
        Some(head)
    }

    fn parse_value(&mut self) -> Option<PathValue> {
        let start = self.current.start;
        match self.current.token {
            Token::Literal(_) | Token::Variable(_) => self.advance(),
            _ => return None,
        }
        let text = self.source(start).to_string();
        let expr = compile_expr(&text).ok()?;
        Some(PathValue { text, expr })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn steps(input: &str) -> Vec<CompiledStep> {
        let (head, depth) = parse_steps(input).unwrap();
        let mut result = Vec::new();
        let mut step = Some(&head);
        while let Some(s) = step {
            result.push(s.clone());
            step = s.next_step();
        }
        assert_eq!(result.len(), depth);
        result
    }

    fn name(node: &PathNode) -> &str {
        node.local_name.as_deref().unwrap_or(".")
    }

    #[test]
    fn test_single_element_step() {
        let steps = steps("aa");
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].text, "aa");
        assert!(!steps[0].is_attribute());
        assert!(steps[0].is_simple());
    }

    #[test]
    fn test_prefixed_steps() {
        let steps = steps("p:aa/@q:bb");
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].node.prefix.as_deref(), Some("p"));
        assert_eq!(name(&steps[1].node), "bb");
        assert!(steps[1].is_attribute());
        assert_eq!(steps[1].text, "@q:bb");
    }

    #[test]
    fn test_self_steps_are_skipped() {
        let steps = steps("aa/./bb");
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].text, "aa");
        assert_eq!(steps[1].text, "bb");
    }

    #[test]
    fn test_step_text_includes_predicates() {
        let steps = steps("aa[bb='1' and @cc=$v]/dd");
        assert_eq!(steps[0].text, "aa[bb='1' and @cc=$v]");
        let deps = &steps[0].node.dependencies;
        assert_eq!(deps.len(), 2);
        assert_eq!(name(&deps[0]), "bb");
        assert_eq!(deps[0].value().unwrap().text, "'1'");
        assert!(deps[1].is_attribute);
        assert_eq!(deps[1].value().unwrap().text, "$v");
    }

    #[test]
    fn test_value_on_the_left() {
        let steps = steps("aa['1' = bb/cc]");
        let dep = &steps[0].node.dependencies[0];
        assert_eq!(name(dep), "bb");
        assert!(dep.value().is_none());
        let tail = dep.next.as_deref().unwrap();
        assert_eq!(name(tail), "cc");
        assert_eq!(tail.value().unwrap().text, "'1'");
    }

    #[test]
    fn test_self_reference_value() {
        let steps = steps("aa[.='1']");
        let node = &steps[0].node;
        assert!(node.dependencies[0].is_self_reference());
        assert_eq!(node.value().unwrap().text, "'1'");
        assert!(steps[0].is_simple());
    }

    #[test]
    fn test_nested_predicates() {
        let steps = steps("aa[bb[cc='x']]");
        let bb = &steps[0].node.dependencies[0];
        assert_eq!(name(&bb.dependencies[0]), "cc");
        assert!(!steps[0].is_simple());
    }

    #[test]
    fn test_self_reference_after_dependency_is_rejected() {
        assert!(parse_steps("aa[bb and .='1']").is_none());
    }

    #[test]
    fn test_non_creatable_forms() {
        for input in [
            "/aa",
            "//aa",
            "aa/..",
            "*",
            "aa[1]",
            "aa[bb or cc]",
            "aa[bb != '1']",
            "aa[bb = cc]",
            "aa[count(bb)]",
            "@aa/bb",
            "aa[@bb/cc]",
            "child::aa",
            "aa|bb",
            "p:*",
            "aa[.][bb]x",
        ] {
            assert!(parse_steps(input).is_none(), "{} should not be creatable", input);
        }
    }
}
