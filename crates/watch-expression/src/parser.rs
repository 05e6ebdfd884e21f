//! Recursive-descent parser producing [`ParsedExpression`]
//!
//! Grammar:
//!
//! ```text
//! expression := calc COMPARE calc
//! calc       := factor (SETOP factor)*
//! factor     := VARIABLE | "empty" | "(" calc ")"
//! ```

use crate::ast::{Calc, Comparison, Factor};
use crate::error::{SyntaxError, SyntaxErrorKind};
use crate::lexer::{tokenize, Token, TokenKind};
use crate::MAX_NESTING;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// A compiled expression: source text, tree, and referenced variables
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedExpression {
    source: String,
    tree: Comparison,
    variables: BTreeSet<String>,
}

impl ParsedExpression {
    /// Original expression text
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Root of the syntax tree
    pub fn tree(&self) -> &Comparison {
        &self.tree
    }

    /// Variable names referenced anywhere in the expression
    pub fn variables(&self) -> &BTreeSet<String> {
        &self.variables
    }
}

impl fmt::Display for ParsedExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl FromStr for ParsedExpression {
    type Err = SyntaxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        compile(s)
    }
}

/// Compile expression text
pub fn compile(source: &str) -> Result<ParsedExpression, SyntaxError> {
    let tokens = tokenize(source)?;
    let mut parser = Parser {
        tokens: &tokens,
        pos: 0,
        source,
        variables: BTreeSet::new(),
    };
    let tree = parser.parse_expression()?;
    Ok(ParsedExpression {
        source: source.to_string(),
        tree,
        variables: parser.variables,
    })
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    source: &'a str,
    variables: BTreeSet<String>,
}

impl<'a> Parser<'a> {
    fn parse_expression(&mut self) -> Result<Comparison, SyntaxError> {
        let lhs = self.parse_calc(0)?;

        let op = match self.next() {
            Some(Token {
                kind: TokenKind::Compare(op),
                ..
            }) => *op,
            Some(token) => return Err(self.unexpected(token)),
            None => return Err(self.end()),
        };

        let rhs = self.parse_calc(0)?;

        // Exactly one comparison; anything left over is an error
        if let Some(token) = self.next() {
            return Err(self.unexpected(token));
        }

        Ok(Comparison { lhs, op, rhs })
    }

    fn parse_calc(&mut self, depth: usize) -> Result<Calc, SyntaxError> {
        let head = self.parse_factor(depth)?;
        let mut tail = Vec::new();

        while let Some(Token {
            kind: TokenKind::SetOp(op),
            ..
        }) = self.peek()
        {
            let op = *op;
            self.pos += 1;
            tail.push((op, self.parse_factor(depth)?));
        }

        Ok(Calc { head, tail })
    }

    fn parse_factor(&mut self, depth: usize) -> Result<Factor, SyntaxError> {
        let Some(token) = self.next() else {
            return Err(self.end());
        };

        match &token.kind {
            TokenKind::Empty => Ok(Factor::Empty),
            TokenKind::Variable(name) => {
                self.variables.insert(name.clone());
                Ok(Factor::Variable(name.clone()))
            }
            TokenKind::LeftParen => {
                if depth >= MAX_NESTING {
                    return Err(SyntaxError::new(
                        token.start,
                        SyntaxErrorKind::NestingTooDeep,
                    ));
                }
                let inner = self.parse_calc(depth + 1)?;
                match self.next() {
                    Some(Token {
                        kind: TokenKind::RightParen,
                        ..
                    }) => Ok(Factor::Group(Box::new(inner))),
                    Some(other) => Err(self.unexpected(other)),
                    None => Err(self.end()),
                }
            }
            _ => Err(self.unexpected(token)),
        }
    }

    fn peek(&self) -> Option<&'a Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<&'a Token> {
        let token = self.tokens.get(self.pos);
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn unexpected(&self, token: &Token) -> SyntaxError {
        SyntaxError::new(
            token.start,
            SyntaxErrorKind::UnexpectedToken(self.source[token.start..token.end].to_string()),
        )
    }

    fn end(&self) -> SyntaxError {
        SyntaxError::new(self.source.len(), SyntaxErrorKind::UnexpectedEnd)
    }
}
