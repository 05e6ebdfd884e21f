//! Set-algebra condition language for watchers
//!
//! An expression compares two set calculations, e.g.
//! `fetch_0 - fetch_1 != empty`. Variables name fetch groups; their sampled
//! values are treated as sets of strings when the expression is evaluated.

pub mod ast;
pub mod error;
pub mod eval;
pub mod lexer;
pub mod parser;

pub use ast::{Calc, CompareOp, Comparison, Factor, SetOp};
pub use error::{SyntaxError, SyntaxErrorKind};
pub use parser::{compile, ParsedExpression};

/// Keyword for the empty-set literal
pub const EMPTY_KEYWORD: &str = "empty";

/// Maximum length of a variable name
pub const MAX_VARIABLE_LEN: usize = 31;

/// Maximum parenthesis nesting accepted by the parser
pub const MAX_NESTING: usize = 64;
