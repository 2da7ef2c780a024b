//! Structured filters: `field OP value` boolean expressions

pub mod ast;
pub mod compiler;
pub mod parser;

pub use ast::{Expression, ExpressionType, FilterValue, Key, Operand};
pub use compiler::{CompileError, FilterCompiler, Sqlite3FilterCompiler};
pub use parser::{parse_filter, FilterParseError};
