//! Free-text search over log bodies

pub mod ast;
pub mod compiler;
pub mod parser;

pub use ast::{Node, Root, Token, TokenKind};
pub use compiler::{Fts5QueryCompiler, QueryCompiler};
pub use parser::{parse_query, QueryParseError};
