//! Text parser for structured filters
//!
//! Grammar (loosest binding first):
//!
//! ```text
//! expr       := and_expr ( (OR | "||") and_expr )*
//! and_expr   := primary ( (AND | "&&") primary )*
//! primary    := "(" expr ")" | comparison
//! comparison := key ("==" | "!=" | "<" | "<=" | ">" | ">=") scalar
//!             | key (IN | NIN | NOT IN) "[" scalar ("," scalar)* "]"
//! key        := ident ( "[" string "]" )?
//! ```

use super::ast::{Expression, ExpressionType, FilterValue, Key, Operand};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum FilterParseError {
    #[error("filter expression is empty")]
    Empty,

    #[error("unexpected character '{ch}' at position {position}")]
    UnexpectedChar { ch: char, position: usize },

    #[error("unterminated string starting at position {0}")]
    UnterminatedString(usize),

    #[error("invalid number '{0}'")]
    InvalidNumber(String),

    #[error("expected {expected} at position {position}, found {found}")]
    Unexpected {
        expected: &'static str,
        found: String,
        position: usize,
    },
}

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Ident(String),
    Str(String),
    Int(i64),
    Float(f64),
    True,
    False,
    And,
    Or,
    Not,
    In,
    Nin,
    Op(ExpressionType),
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
}

impl Tok {
    fn describe(&self) -> String {
        match self {
            Tok::Ident(s) => format!("identifier '{}'", s),
            Tok::Str(s) => format!("string '{}'", s),
            Tok::Int(i) => i.to_string(),
            Tok::Float(f) => f.to_string(),
            other => format!("{:?}", other),
        }
    }
}

/// Parse filter text into an expression tree
pub fn parse_filter(input: &str) -> Result<Expression, FilterParseError> {
    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        return Err(FilterParseError::Empty);
    }

    let mut parser = Parser { tokens, pos: 0 };
    let expression = parser.expression()?.into_expression();
    if let Some((tok, position)) = parser.tokens.get(parser.pos) {
        return Err(FilterParseError::Unexpected {
            expected: "end of expression",
            found: tok.describe(),
            position: *position,
        });
    }
    Ok(expression)
}

fn tokenize(input: &str) -> Result<Vec<(Tok, usize)>, FilterParseError> {
    let chars: Vec<(usize, char)> = input.char_indices().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let (position, c) = chars[i];
        let next = chars.get(i + 1).map(|(_, c)| *c);

        match c {
            c if c.is_whitespace() => i += 1,
            '(' => {
                tokens.push((Tok::LParen, position));
                i += 1;
            }
            ')' => {
                tokens.push((Tok::RParen, position));
                i += 1;
            }
            '[' => {
                tokens.push((Tok::LBracket, position));
                i += 1;
            }
            ']' => {
                tokens.push((Tok::RBracket, position));
                i += 1;
            }
            ',' => {
                tokens.push((Tok::Comma, position));
                i += 1;
            }
            '&' if next == Some('&') => {
                tokens.push((Tok::And, position));
                i += 2;
            }
            '|' if next == Some('|') => {
                tokens.push((Tok::Or, position));
                i += 2;
            }
            '=' if next == Some('=') => {
                tokens.push((Tok::Op(ExpressionType::Eq), position));
                i += 2;
            }
            '!' if next == Some('=') => {
                tokens.push((Tok::Op(ExpressionType::Ne), position));
                i += 2;
            }
            '<' | '>' => {
                let (kind, width) = match (c, next) {
                    ('<', Some('=')) => (ExpressionType::Lte, 2),
                    ('<', _) => (ExpressionType::Lt, 1),
                    ('>', Some('=')) => (ExpressionType::Gte, 2),
                    _ => (ExpressionType::Gt, 1),
                };
                tokens.push((Tok::Op(kind), position));
                i += width;
            }
            '"' | '\'' => {
                let quote = c;
                let mut value = String::new();
                let mut j = i + 1;
                loop {
                    match chars.get(j) {
                        None => return Err(FilterParseError::UnterminatedString(position)),
                        Some((_, '\\')) => {
                            if let Some((_, escaped)) = chars.get(j + 1) {
                                value.push(*escaped);
                            }
                            j += 2;
                        }
                        Some((_, ch)) if *ch == quote => break,
                        Some((_, ch)) => {
                            value.push(*ch);
                            j += 1;
                        }
                    }
                }
                tokens.push((Tok::Str(value), position));
                i = j + 1;
            }
            c if c.is_ascii_digit() || (c == '-' && next.is_some_and(|n| n.is_ascii_digit())) => {
                let mut j = i + 1;
                while j < chars.len() && (chars[j].1.is_ascii_digit() || chars[j].1 == '.') {
                    j += 1;
                }
                let text: String = chars[i..j].iter().map(|(_, c)| *c).collect();
                let tok = if text.contains('.') {
                    Tok::Float(
                        text.parse()
                            .map_err(|_| FilterParseError::InvalidNumber(text.clone()))?,
                    )
                } else {
                    Tok::Int(
                        text.parse()
                            .map_err(|_| FilterParseError::InvalidNumber(text.clone()))?,
                    )
                };
                tokens.push((tok, position));
                i = j;
            }
            c if c.is_alphabetic() || c == '_' => {
                let mut j = i + 1;
                while j < chars.len()
                    && (chars[j].1.is_alphanumeric() || chars[j].1 == '_' || chars[j].1 == '.')
                {
                    j += 1;
                }
                let word: String = chars[i..j].iter().map(|(_, c)| *c).collect();
                let tok = match word.to_ascii_uppercase().as_str() {
                    "AND" => Tok::And,
                    "OR" => Tok::Or,
                    "NOT" => Tok::Not,
                    "IN" => Tok::In,
                    "NIN" => Tok::Nin,
                    "TRUE" => Tok::True,
                    "FALSE" => Tok::False,
                    _ => Tok::Ident(word),
                };
                tokens.push((tok, position));
                i = j;
            }
            other => {
                return Err(FilterParseError::UnexpectedChar {
                    ch: other,
                    position,
                })
            }
        }
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<(Tok, usize)>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Tok> {
        self.tokens.get(self.pos).map(|(tok, _)| tok)
    }

    fn unexpected(&self, expected: &'static str) -> FilterParseError {
        match self.tokens.get(self.pos) {
            Some((tok, position)) => FilterParseError::Unexpected {
                expected,
                found: tok.describe(),
                position: *position,
            },
            None => FilterParseError::Unexpected {
                expected,
                found: "end of input".to_string(),
                position: self.tokens.last().map(|(_, p)| p + 1).unwrap_or(0),
            },
        }
    }

    fn expect(&mut self, want: Tok, expected: &'static str) -> Result<(), FilterParseError> {
        if self.peek() == Some(&want) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.unexpected(expected))
        }
    }

    fn expression(&mut self) -> Result<Node, FilterParseError> {
        let mut left = self.and_expression()?;
        while self.peek() == Some(&Tok::Or) {
            self.pos += 1;
            let right = self.and_expression()?;
            left = Node::Expr(Expression::new(
                ExpressionType::Or,
                left.into_operand(),
                right.into_operand(),
            ));
        }
        Ok(left)
    }

    fn and_expression(&mut self) -> Result<Node, FilterParseError> {
        let mut left = self.primary()?;
        while self.peek() == Some(&Tok::And) {
            self.pos += 1;
            let right = self.primary()?;
            left = Node::Expr(Expression::new(
                ExpressionType::And,
                left.into_operand(),
                right.into_operand(),
            ));
        }
        Ok(left)
    }

    fn primary(&mut self) -> Result<Node, FilterParseError> {
        if self.peek() == Some(&Tok::LParen) {
            self.pos += 1;
            let inner = self.expression()?;
            self.expect(Tok::RParen, "')'")?;
            return Ok(Node::Group(inner.into_expression()));
        }
        self.comparison().map(Node::Expr)
    }

    fn comparison(&mut self) -> Result<Expression, FilterParseError> {
        let key = self.key()?;

        let op = match self.peek() {
            Some(Tok::Op(kind)) => Some(*kind),
            Some(Tok::In) => Some(ExpressionType::In),
            Some(Tok::Nin) | Some(Tok::Not) => Some(ExpressionType::Nin),
            _ => None,
        };
        let kind = op.ok_or_else(|| self.unexpected("comparison operator"))?;
        let negated = self.peek() == Some(&Tok::Not);
        self.pos += 1;

        match kind {
            ExpressionType::In | ExpressionType::Nin => {
                if negated {
                    self.expect(Tok::In, "IN after NOT")?;
                }
                self.list_comparison(kind, key)
            }
            _ => {
                let value = self.scalar()?;
                Ok(Expression::new(kind, Operand::Key(key), Operand::Value(value)))
            }
        }
    }

    fn list_comparison(
        &mut self,
        kind: ExpressionType,
        key: Key,
    ) -> Result<Expression, FilterParseError> {
        self.expect(Tok::LBracket, "'['")?;
        let mut values = vec![self.scalar()?];
        while self.peek() == Some(&Tok::Comma) {
            self.pos += 1;
            values.push(self.scalar()?);
        }
        self.expect(Tok::RBracket, "']'")?;
        Ok(Expression::new(
            kind,
            Operand::Key(key),
            Operand::Value(FilterValue::List(values)),
        ))
    }

    fn key(&mut self) -> Result<Key, FilterParseError> {
        let name = match self.peek() {
            Some(Tok::Ident(name)) => name.clone(),
            _ => return Err(self.unexpected("field name")),
        };
        self.pos += 1;

        if self.peek() == Some(&Tok::LBracket) {
            self.pos += 1;
            let attribute = match self.peek() {
                Some(Tok::Str(attribute)) => attribute.clone(),
                _ => return Err(self.unexpected("quoted attribute name")),
            };
            self.pos += 1;
            self.expect(Tok::RBracket, "']'")?;
            return Ok(Key(format!("{}[\"{}\"]", name, attribute)));
        }

        Ok(Key(name))
    }

    fn scalar(&mut self) -> Result<FilterValue, FilterParseError> {
        let value = match self.peek() {
            Some(Tok::Str(s)) => FilterValue::Text(s.clone()),
            Some(Tok::Int(i)) => FilterValue::Int(*i),
            Some(Tok::Float(f)) => FilterValue::Float(*f),
            Some(Tok::True) => FilterValue::Bool(true),
            Some(Tok::False) => FilterValue::Bool(false),
            _ => return Err(self.unexpected("value")),
        };
        self.pos += 1;
        Ok(value)
    }
}

/// Intermediate parse result; groups only become `Operand::Group` once
/// they are placed under an operator
enum Node {
    Expr(Expression),
    Group(Expression),
}

impl Node {
    fn into_operand(self) -> Operand {
        match self {
            Node::Expr(e) => Operand::Expression(Box::new(e)),
            Node::Group(e) => Operand::Group(Box::new(e)),
        }
    }

    fn into_expression(self) -> Expression {
        match self {
            Node::Expr(e) | Node::Group(e) => e,
        }
    }
}
