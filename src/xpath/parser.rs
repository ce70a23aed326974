//! XPath 1.0 parser
//!
//! Binary operators are parsed by precedence climbing over
//! [`BinaryOp::precedence`]; unions, filters and location paths by
//! recursive descent below them.

use super::ast::{Axis, BinaryOp, Expr, NodeTest, PathStart, Step};
use super::lexer::{Lexer, Token};
use crate::error::{Error, Result};

type ParseResult<T> = std::result::Result<T, String>;

/// Parse an expression; trailing input is an error
pub fn parse(input: &str) -> Result<Expr> {
    let mut parser = Parser::new(input);
    parser
        .expression(1)
        .and_then(|expr| match parser.current {
            Token::Eof => Ok(expr),
            ref other => Err(format!("unexpected {:?} after expression", other)),
        })
        .map_err(|message| Error::invalid_path(input, message))
}

struct Parser<'a> {
    lexer: Lexer<'a>,
    current: Token,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        let mut lexer = Lexer::new(input);
        let current = lexer.next_token();
        Parser { lexer, current }
    }

    fn bump(&mut self) -> Token {
        std::mem::replace(&mut self.current, self.lexer.next_token())
    }

    fn eat(&mut self, token: &Token) -> bool {
        let found = &self.current == token;
        if found {
            self.bump();
        }
        found
    }

    fn expect(&mut self, token: &Token) -> ParseResult<()> {
        if self.eat(token) {
            Ok(())
        } else {
            Err(format!("expected {:?}, found {:?}", token, self.current))
        }
    }

    fn expression(&mut self, min_precedence: u8) -> ParseResult<Expr> {
        let mut left = self.unary()?;
        while let Token::Operator(op) = self.current {
            if op.precedence() < min_precedence {
                break;
            }
            self.bump();
            let right = self.expression(op.precedence() + 1)?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn unary(&mut self) -> ParseResult<Expr> {
        if self.eat(&Token::Operator(BinaryOp::Sub)) {
            return Ok(Expr::Negate(Box::new(self.unary()?)));
        }
        let mut expr = self.path()?;
        while self.eat(&Token::Pipe) {
            expr = Expr::Union(Box::new(expr), Box::new(self.path()?));
        }
        Ok(expr)
    }

    fn path(&mut self) -> ParseResult<Expr> {
        let mut steps = Vec::new();
        let start = match self.current {
            Token::Slash => {
                self.bump();
                if !self.starts_step() {
                    return Ok(Expr::Path {
                        start: PathStart::Root,
                        steps,
                    });
                }
                steps.push(self.step()?);
                PathStart::Root
            }
            Token::DoubleSlash => {
                self.bump();
                steps.push(Step::descendant_or_self());
                steps.push(self.step()?);
                PathStart::Root
            }
            _ if self.starts_step() => {
                steps.push(self.step()?);
                PathStart::Context
            }
            _ => {
                let filtered = self.filter()?;
                if !matches!(self.current, Token::Slash | Token::DoubleSlash) {
                    return Ok(filtered);
                }
                PathStart::Expr(Box::new(filtered))
            }
        };

        loop {
            if self.eat(&Token::Slash) {
                steps.push(self.step()?);
            } else if self.eat(&Token::DoubleSlash) {
                steps.push(Step::descendant_or_self());
                steps.push(self.step()?);
            } else {
                return Ok(Expr::Path { start, steps });
            }
        }
    }

    fn starts_step(&self) -> bool {
        matches!(
            self.current,
            Token::Name { .. }
                | Token::Star
                | Token::PrefixStar(_)
                | Token::NodeType(_)
                | Token::Axis(_)
                | Token::At
                | Token::Dot
                | Token::DoubleDot
        )
    }

    fn step(&mut self) -> ParseResult<Step> {
        let axis = match self.current {
            Token::Dot => {
                self.bump();
                return Ok(Step::new(Axis::Self_, NodeTest::Node));
            }
            Token::DoubleDot => {
                self.bump();
                return Ok(Step::new(Axis::Parent, NodeTest::Node));
            }
            Token::At => {
                self.bump();
                Axis::Attribute
            }
            Token::Axis(axis) => {
                self.bump();
                axis
            }
            _ => Axis::Child,
        };
        let mut step = Step::new(axis, self.node_test()?);
        while self.eat(&Token::LeftBracket) {
            step.predicates.push(self.predicate_body()?);
        }
        Ok(step)
    }

    fn node_test(&mut self) -> ParseResult<NodeTest> {
        match self.bump() {
            Token::Star => Ok(NodeTest::Wildcard),
            Token::PrefixStar(prefix) => Ok(NodeTest::PrefixWildcard(prefix)),
            Token::Name { prefix, local } => Ok(NodeTest::Name { prefix, local }),
            Token::NodeType(kind) => {
                self.expect(&Token::LeftParen)?;
                let target = match self.current {
                    Token::Literal(_) if kind == "processing-instruction" => match self.bump() {
                        Token::Literal(target) => Some(target),
                        _ => None,
                    },
                    _ => None,
                };
                self.expect(&Token::RightParen)?;
                Ok(match kind.as_str() {
                    "node" => NodeTest::Node,
                    "text" => NodeTest::Text,
                    "comment" => NodeTest::Comment,
                    _ => NodeTest::ProcessingInstruction(target),
                })
            }
            other => Err(format!("expected a node test, found {:?}", other)),
        }
    }

    /// After `[`: the predicate and its closing bracket
    fn predicate_body(&mut self) -> ParseResult<Expr> {
        let predicate = self.expression(1)?;
        self.expect(&Token::RightBracket)?;
        Ok(predicate)
    }

    fn filter(&mut self) -> ParseResult<Expr> {
        let primary = self.primary()?;
        let mut predicates = Vec::new();
        while self.eat(&Token::LeftBracket) {
            predicates.push(self.predicate_body()?);
        }
        if predicates.is_empty() {
            return Ok(primary);
        }
        Ok(Expr::Filter {
            primary: Box::new(primary),
            predicates,
        })
    }

    fn primary(&mut self) -> ParseResult<Expr> {
        match self.bump() {
            Token::Number(n) => Ok(Expr::Number(n)),
            Token::Literal(s) => Ok(Expr::Literal(s)),
            Token::Variable(name) => Ok(Expr::Variable(name)),
            Token::LeftParen => {
                let inner = self.expression(1)?;
                self.expect(&Token::RightParen)?;
                Ok(inner)
            }
            Token::Function(name) => {
                self.expect(&Token::LeftParen)?;
                let mut args = Vec::new();
                if !self.eat(&Token::RightParen) {
                    loop {
                        args.push(self.expression(1)?);
                        if self.eat(&Token::RightParen) {
                            break;
                        }
                        self.expect(&Token::Comma)?;
                    }
                }
                Ok(Expr::Call { name, args })
            }
            other => Err(format!("unexpected {:?}", other)),
        }
    }
}
