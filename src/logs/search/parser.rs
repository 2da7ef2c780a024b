//! Tokenizer/parser for free-text search queries
//!
//! Terms are whitespace separated and conjunctive by default. `"..."` is a
//! phrase, a leading `-` excludes a term, `or` joins its neighbours and
//! parentheses nest.

use super::ast::{Node, Root, Token};
use std::iter::Peekable;
use std::str::CharIndices;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueryParseError {
    #[error("unterminated phrase starting at position {0}")]
    UnterminatedPhrase(usize),

    #[error("unmatched ')' at position {0}")]
    UnmatchedClose(usize),

    #[error("unclosed '(' at position {0}")]
    UnclosedGroup(usize),
}

type Chars<'a> = Peekable<CharIndices<'a>>;

pub fn parse_query(input: &str) -> Result<Root, QueryParseError> {
    let mut chars = input.char_indices().peekable();
    parse_root(&mut chars, None)
}

fn parse_root(chars: &mut Chars<'_>, open: Option<usize>) -> Result<Root, QueryParseError> {
    let mut children = Vec::new();

    while let Some(&(position, c)) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '(' => {
                chars.next();
                let nested = parse_root(chars, Some(position))?;
                if !nested.is_empty() {
                    children.push(Node::Root(nested));
                }
            }
            ')' => {
                chars.next();
                return match open {
                    Some(_) => Ok(Root { children }),
                    None => Err(QueryParseError::UnmatchedClose(position)),
                };
            }
            '"' => {
                let phrase = read_phrase(chars)?;
                if !phrase.is_empty() {
                    children.push(Node::Token(Token::plain(&phrase)));
                }
            }
            '-' => {
                chars.next();
                let term = match chars.peek() {
                    Some(&(_, '"')) => read_phrase(chars)?,
                    _ => read_word(chars),
                };
                if term.is_empty() {
                    children.push(Node::Token(Token::plain("-")));
                } else {
                    children.push(Node::Token(Token::exclude(&term)));
                }
            }
            _ => {
                let word = read_word(chars);
                if word.eq_ignore_ascii_case("or") {
                    children.push(Node::Token(Token::or()));
                } else if !word.eq_ignore_ascii_case("and") {
                    children.push(Node::Token(Token::plain(&word)));
                }
            }
        }
    }

    match open {
        Some(position) => Err(QueryParseError::UnclosedGroup(position)),
        None => Ok(Root { children }),
    }
}

fn read_word(chars: &mut Chars<'_>) -> String {
    let mut word = String::new();
    while let Some(&(_, c)) = chars.peek() {
        if c.is_whitespace() || c == '(' || c == ')' || c == '"' {
            break;
        }
        word.push(c);
        chars.next();
    }
    word
}

fn read_phrase(chars: &mut Chars<'_>) -> Result<String, QueryParseError> {
    let start = chars.next().map(|(position, _)| position).unwrap_or_default();
    let mut phrase = String::new();
    for (_, c) in chars.by_ref() {
        if c == '"' {
            return Ok(phrase);
        }
        phrase.push(c);
    }
    Err(QueryParseError::UnterminatedPhrase(start))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logs::search::ast::TokenKind;

    fn tokens(root: &Root) -> Vec<(TokenKind, String)> {
        root.children
            .iter()
            .filter_map(|node| match node {
                Node::Token(t) => Some((t.kind, t.value.clone())),
                Node::Root(_) => None,
            })
            .collect()
    }

    #[test]
    fn test_plain_terms() {
        let root = parse_query("hello world").unwrap();
        assert_eq!(
            tokens(&root),
            vec![
                (TokenKind::Plain, "hello".to_string()),
                (TokenKind::Plain, "world".to_string())
            ]
        );
    }

    #[test]
    fn test_or_and_exclude() {
        let root = parse_query("hello OR world -java").unwrap();
        assert_eq!(
            tokens(&root),
            vec![
                (TokenKind::Plain, "hello".to_string()),
                (TokenKind::Or, "or".to_string()),
                (TokenKind::Plain, "world".to_string()),
                (TokenKind::Exclude, "java".to_string())
            ]
        );
    }

    #[test]
    fn test_phrase_and_explicit_and() {
        let root = parse_query(r#""connection reset" and timeout"#).unwrap();
        assert_eq!(
            tokens(&root),
            vec![
                (TokenKind::Plain, "connection reset".to_string()),
                (TokenKind::Plain, "timeout".to_string())
            ]
        );
    }

    #[test]
    fn test_nested_group() {
        let root = parse_query("hello (world or java)").unwrap();
        assert_eq!(root.children.len(), 2);
        match &root.children[1] {
            Node::Root(nested) => assert_eq!(nested.children.len(), 3),
            other => panic!("expected nested root, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(
            parse_query(r#"hello "world"#),
            Err(QueryParseError::UnterminatedPhrase(6))
        );
        assert_eq!(
            parse_query("hello (world"),
            Err(QueryParseError::UnclosedGroup(6))
        );
        assert_eq!(
            parse_query("hello) world"),
            Err(QueryParseError::UnmatchedClose(5))
        );
    }
}
