//! Free-text query to FTS5 `MATCH` expression compilation

use super::ast::{Node, Root, Token, TokenKind};

/// Renders a parsed free-text query into a backend full-text match expression
pub trait QueryCompiler: Send + Sync {
    fn compile(&self, root: &Root) -> String;
}

/// SQLite FTS5 dialect
#[derive(Debug, Clone, Copy, Default)]
pub struct Fts5QueryCompiler;

impl QueryCompiler for Fts5QueryCompiler {
    fn compile(&self, root: &Root) -> String {
        let mut out = String::new();
        let mut nodes = root.children.iter();

        while let Some(node) = nodes.next() {
            match node {
                Node::Token(token) => match token.kind {
                    TokenKind::Exclude => {
                        out.push_str(if out.is_empty() { "NOT " } else { " NOT " });
                        push_quoted(&token.value, &mut out);
                    }
                    TokenKind::Or => {
                        if !out.is_empty() {
                            out.push_str(" OR ");
                        }
                        // the operand is the node after the connective
                        if let Some(next) = nodes.next() {
                            self.push_operand(next, &mut out);
                        }
                    }
                    TokenKind::Plain => {
                        if !out.is_empty() {
                            out.push_str(" AND ");
                        }
                        push_quoted(&token.value, &mut out);
                    }
                },
                Node::Root(nested) => {
                    if !out.is_empty() {
                        out.push_str(" AND ");
                    }
                    self.push_group(nested, &mut out);
                }
            }
        }

        out
    }
}

impl Fts5QueryCompiler {
    fn push_operand(&self, node: &Node, out: &mut String) {
        match node {
            Node::Token(Token { value, .. }) => push_quoted(value, out),
            Node::Root(nested) => self.push_group(nested, out),
        }
    }

    fn push_group(&self, nested: &Root, out: &mut String) {
        out.push('(');
        out.push_str(&self.compile(nested));
        out.push(')');
    }
}

fn push_quoted(term: &str, out: &mut String) {
    out.push('"');
    out.push_str(&term.replace('"', "\"\""));
    out.push('"');
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logs::search::parser::parse_query;

    fn convert(query: &str) -> String {
        Fts5QueryCompiler.compile(&parse_query(query).unwrap())
    }

    #[test]
    fn test_single_term() {
        assert_eq!(convert("hello"), r#""hello""#);
    }

    #[test]
    fn test_implicit_and() {
        assert_eq!(convert("hello world"), r#""hello" AND "world""#);
    }

    #[test]
    fn test_or() {
        assert_eq!(convert("hello or world"), r#""hello" OR "world""#);
    }

    #[test]
    fn test_exclude() {
        assert_eq!(convert("hello -world"), r#""hello" NOT "world""#);
    }

    #[test]
    fn test_leading_exclude() {
        assert_eq!(convert("-hello"), r#"NOT "hello""#);
    }

    #[test]
    fn test_nested_group() {
        assert_eq!(
            convert("hello (world or java)"),
            r#""hello" AND ("world" OR "java")"#
        );
    }

    #[test]
    fn test_or_with_group_operand() {
        assert_eq!(
            convert("error or (timeout refused)"),
            r#""error" OR ("timeout" AND "refused")"#
        );
    }

    #[test]
    fn test_phrase_is_kept_whole() {
        assert_eq!(
            convert(r#""connection reset" -debug"#),
            r#""connection reset" NOT "debug""#
        );
    }

    #[test]
    fn test_empty_query_compiles_to_empty() {
        assert_eq!(convert("   "), "");
    }
}
