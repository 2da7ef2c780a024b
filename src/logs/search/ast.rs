//! Free-text query syntax tree

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Plain,
    /// Disjunction between the previous node and the next one
    Or,
    Exclude,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Token(Token),
    Root(Root),
}

/// Sequence of nodes; nested roots come from parenthesized sub-queries
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Root {
    pub children: Vec<Node>,
}

impl Root {
    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }
}

impl Token {
    pub fn plain(value: &str) -> Self {
        Self {
            kind: TokenKind::Plain,
            value: value.to_string(),
        }
    }

    pub fn exclude(value: &str) -> Self {
        Self {
            kind: TokenKind::Exclude,
            value: value.to_string(),
        }
    }

    pub fn or() -> Self {
        Self {
            kind: TokenKind::Or,
            value: "or".to_string(),
        }
    }
}
