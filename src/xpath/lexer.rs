//! XPath tokenizer
//!
//! Follows the XPath 1.0 disambiguation rule: right after an operand, `*`
//! is multiplication and `and`, `or`, `div`, `mod` are operators; anywhere
//! else they are name tests. Every token records its byte span so callers
//! can slice the exact source text of a construct.

use super::ast::{Axis, BinaryOp};

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Slash,
    DoubleSlash,
    Dot,
    DoubleDot,
    At,
    Pipe,
    Comma,
    LeftParen,
    RightParen,
    LeftBracket,
    RightBracket,
    /// `*` as a name test
    Star,
    /// `prefix:*`
    PrefixStar(String),
    Operator(BinaryOp),
    Number(f64),
    Literal(String),
    /// `local` or `prefix:local` in name-test position
    Name {
        prefix: Option<String>,
        local: String,
    },
    /// `$name` or `$prefix:name`
    Variable(String),
    /// A name followed by `(`; the parenthesis is not consumed
    Function(String),
    /// `node`, `text`, `comment` or `processing-instruction` before `(`
    NodeType(String),
    /// `axis::`, separator included
    Axis(Axis),
    /// A character that starts no token, or an unterminated literal's quote
    Invalid(char),
    Eof,
}

impl Token {
    fn ends_operand(&self) -> bool {
        matches!(
            self,
            Token::Name { .. }
                | Token::Star
                | Token::PrefixStar(_)
                | Token::Number(_)
                | Token::Literal(_)
                | Token::Variable(_)
                | Token::RightParen
                | Token::RightBracket
                | Token::Dot
                | Token::DoubleDot
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub start: usize,
    pub end: usize,
}

pub struct Lexer<'a> {
    input: &'a str,
    pos: usize,
    after_operand: bool,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Lexer {
            input,
            pos: 0,
            after_operand: false,
        }
    }

    pub fn input(&self) -> &'a str {
        self.input
    }

    pub fn next_spanned(&mut self) -> Spanned {
        self.pos = self.input.len() - self.rest().trim_start_matches(is_space).len();
        let start = self.pos;
        let token = self.scan();
        self.after_operand = token.ends_operand();
        Spanned {
            token,
            start,
            end: self.pos,
        }
    }

    pub fn next_token(&mut self) -> Token {
        self.next_spanned().token
    }

    fn rest(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn eat(&mut self, c: char) -> bool {
        let found = self.rest().starts_with(c);
        if found {
            self.pos += c.len_utf8();
        }
        found
    }

    fn scan(&mut self) -> Token {
        let rest = self.rest();
        let Some(c) = rest.chars().next() else {
            return Token::Eof;
        };
        if c == '"' || c == '\'' {
            return self.literal(c);
        }
        if c.is_ascii_digit() || (c == '.' && rest[1..].starts_with(|d: char| d.is_ascii_digit())) {
            return self.number();
        }
        if is_name_start(c) {
            return self.name();
        }

        self.pos += c.len_utf8();
        match c {
            '/' if self.eat('/') => Token::DoubleSlash,
            '/' => Token::Slash,
            '.' if self.eat('.') => Token::DoubleDot,
            '.' => Token::Dot,
            '@' => Token::At,
            '|' => Token::Pipe,
            ',' => Token::Comma,
            '(' => Token::LeftParen,
            ')' => Token::RightParen,
            '[' => Token::LeftBracket,
            ']' => Token::RightBracket,
            '$' => self.variable(),
            '*' if self.after_operand => Token::Operator(BinaryOp::Mul),
            '*' => Token::Star,
            '+' => Token::Operator(BinaryOp::Add),
            '-' => Token::Operator(BinaryOp::Sub),
            '=' => Token::Operator(BinaryOp::Eq),
            '!' if self.eat('=') => Token::Operator(BinaryOp::NotEq),
            '<' if self.eat('=') => Token::Operator(BinaryOp::LtEq),
            '<' => Token::Operator(BinaryOp::Lt),
            '>' if self.eat('=') => Token::Operator(BinaryOp::GtEq),
            '>' => Token::Operator(BinaryOp::Gt),
            other => Token::Invalid(other),
        }
    }

    fn literal(&mut self, quote: char) -> Token {
        let body = &self.rest()[1..];
        match body.find(quote) {
            Some(len) => {
                self.pos += len + 2;
                Token::Literal(body[..len].to_string())
            }
            None => {
                self.pos = self.input.len();
                Token::Invalid(quote)
            }
        }
    }

    fn number(&mut self) -> Token {
        let rest = self.rest();
        let digits = |s: &str| s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
        let mut len = digits(rest);
        if rest[len..].starts_with('.') {
            len += 1 + digits(&rest[len + 1..]);
        }
        self.pos += len;
        Token::Number(rest[..len].parse().unwrap_or(f64::NAN))
    }

    fn ncname(&mut self) -> &'a str {
        let rest = self.rest();
        let len = rest.find(|c: char| !is_name_char(c)).unwrap_or(rest.len());
        self.pos += len;
        &rest[..len]
    }

    fn followed_by(&self, pattern: &str) -> bool {
        self.rest().trim_start_matches(is_space).starts_with(pattern)
    }

    fn name(&mut self) -> Token {
        let first = self.ncname();
        if self.after_operand {
            if let Some(op) = BinaryOp::from_name(first) {
                return Token::Operator(op);
            }
        }

        if let Some(after) = self.rest().strip_prefix(':') {
            if after.starts_with('*') {
                self.pos += 2;
                return Token::PrefixStar(first.to_string());
            }
            if after.starts_with(is_name_start) {
                self.pos += 1;
                let local = self.ncname();
                if self.followed_by("(") {
                    return Token::Function(format!("{}:{}", first, local));
                }
                return Token::Name {
                    prefix: Some(first.to_string()),
                    local: local.to_string(),
                };
            }
        }

        if self.followed_by("::") {
            self.pos = self.input.len() - self.rest().trim_start_matches(is_space).len() + 2;
            return Axis::from_name(first).map_or(Token::Invalid(':'), Token::Axis);
        }
        if self.followed_by("(") {
            return match first {
                "node" | "text" | "comment" | "processing-instruction" => {
                    Token::NodeType(first.to_string())
                }
                _ => Token::Function(first.to_string()),
            };
        }
        Token::Name {
            prefix: None,
            local: first.to_string(),
        }
    }

    fn variable(&mut self) -> Token {
        if !self.rest().starts_with(is_name_start) {
            return Token::Invalid('$');
        }
        let first = self.ncname();
        let prefixed = self
            .rest()
            .strip_prefix(':')
            .is_some_and(|after| after.starts_with(is_name_start));
        if prefixed {
            self.pos += 1;
            let local = self.ncname();
            return Token::Variable(format!("{}:{}", first, local));
        }
        Token::Variable(first.to_string())
    }
}

fn is_space(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\r' | '\n')
}

fn is_name_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | '\u{B7}')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(input: &str) -> Vec<Token> {
        let mut lexer = Lexer::new(input);
        let mut tokens = Vec::new();
        loop {
            match lexer.next_token() {
                Token::Eof => return tokens,
                token => tokens.push(token),
            }
        }
    }

    fn name(local: &str) -> Token {
        Token::Name {
            prefix: None,
            local: local.to_string(),
        }
    }

    #[test]
    fn test_path_with_predicate() {
        assert_eq!(
            tokens("/r//item[@id='x']"),
            vec![
                Token::Slash,
                name("r"),
                Token::DoubleSlash,
                name("item"),
                Token::LeftBracket,
                Token::At,
                name("id"),
                Token::Operator(BinaryOp::Eq),
                Token::Literal("x".to_string()),
                Token::RightBracket,
            ]
        );
    }

    #[test]
    fn test_operator_names_depend_on_position() {
        assert_eq!(
            tokens("and and and"),
            vec![name("and"), Token::Operator(BinaryOp::And), name("and")]
        );
        assert_eq!(
            tokens("* * *"),
            vec![Token::Star, Token::Operator(BinaryOp::Mul), Token::Star]
        );
        assert_eq!(
            tokens("div div 2"),
            vec![name("div"), Token::Operator(BinaryOp::Div), Token::Number(2.0)]
        );
    }

    #[test]
    fn test_axes_functions_and_node_types() {
        assert_eq!(
            tokens("child :: a"),
            vec![Token::Axis(Axis::Child), name("a")]
        );
        assert_eq!(
            tokens("count (text())"),
            vec![
                Token::Function("count".to_string()),
                Token::LeftParen,
                Token::NodeType("text".to_string()),
                Token::LeftParen,
                Token::RightParen,
                Token::RightParen,
            ]
        );
        assert_eq!(tokens("bogus::a")[0], Token::Invalid(':'));
    }

    #[test]
    fn test_prefixed_names_and_variables() {
        assert_eq!(
            tokens("p:a/q:*"),
            vec![
                Token::Name {
                    prefix: Some("p".to_string()),
                    local: "a".to_string()
                },
                Token::Slash,
                Token::PrefixStar("q".to_string()),
            ]
        );
        assert_eq!(
            tokens("$p:v = $w"),
            vec![
                Token::Variable("p:v".to_string()),
                Token::Operator(BinaryOp::Eq),
                Token::Variable("w".to_string()),
            ]
        );
    }

    #[test]
    fn test_numbers() {
        assert_eq!(
            tokens("1.5 - .5"),
            vec![
                Token::Number(1.5),
                Token::Operator(BinaryOp::Sub),
                Token::Number(0.5)
            ]
        );
        assert_eq!(tokens("a-b"), vec![name("a-b")]);
    }

    #[test]
    fn test_spans_exclude_whitespace() {
        let input = "aa[ bb = 'x' ]";
        let mut lexer = Lexer::new(input);
        let mut texts = Vec::new();
        loop {
            let spanned = lexer.next_spanned();
            if spanned.token == Token::Eof {
                break;
            }
            texts.push(&input[spanned.start..spanned.end]);
        }
        assert_eq!(texts, ["aa", "[", "bb", "=", "'x'", "]"]);
    }

    #[test]
    fn test_unterminated_literal() {
        assert_eq!(tokens("'abc"), vec![Token::Invalid('\'')]);
    }
}
