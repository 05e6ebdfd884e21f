//! Tokenizer for expression text

use crate::ast::{CompareOp, SetOp};
use crate::error::{SyntaxError, SyntaxErrorKind};
use crate::{EMPTY_KEYWORD, MAX_VARIABLE_LEN};

/// Token kinds produced by the lexer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    /// Variable name
    Variable(String),
    /// The `empty` keyword
    Empty,
    /// `(`
    LeftParen,
    /// `)`
    RightParen,
    /// One of `& | - ^`
    SetOp(SetOp),
    /// One of `== != <= >= < >`
    Compare(CompareOp),
}

/// A token with its byte span in the source text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub start: usize,
    pub end: usize,
}

/// Split expression text into tokens, skipping whitespace
pub fn tokenize(source: &str) -> Result<Vec<Token>, SyntaxError> {
    let bytes = source.as_bytes();
    let mut tokens = Vec::new();
    let mut pos = 0;

    while pos < bytes.len() {
        let byte = bytes[pos];

        if byte.is_ascii_whitespace() {
            pos += 1;
            continue;
        }

        if is_variable_byte(byte) {
            let start = pos;
            while pos < bytes.len() && is_variable_byte(bytes[pos]) {
                pos += 1;
            }
            let word = &source[start..pos];
            if word.len() > MAX_VARIABLE_LEN {
                return Err(SyntaxError::new(start, SyntaxErrorKind::VariableTooLong));
            }
            let kind = if word == EMPTY_KEYWORD {
                TokenKind::Empty
            } else {
                TokenKind::Variable(word.to_string())
            };
            tokens.push(Token {
                kind,
                start,
                end: pos,
            });
            continue;
        }

        let next = bytes.get(pos + 1).copied();
        let (kind, len) = match (byte, next) {
            (b'(', _) => (TokenKind::LeftParen, 1),
            (b')', _) => (TokenKind::RightParen, 1),
            (b'&', _) => (TokenKind::SetOp(SetOp::Intersection), 1),
            (b'|', _) => (TokenKind::SetOp(SetOp::Union), 1),
            (b'-', _) => (TokenKind::SetOp(SetOp::Difference), 1),
            (b'^', _) => (TokenKind::SetOp(SetOp::SymmetricDifference), 1),
            (b'=', Some(b'=')) => (TokenKind::Compare(CompareOp::Equal), 2),
            (b'!', Some(b'=')) => (TokenKind::Compare(CompareOp::NotEqual), 2),
            (b'<', Some(b'=')) => (TokenKind::Compare(CompareOp::Subset), 2),
            (b'>', Some(b'=')) => (TokenKind::Compare(CompareOp::Superset), 2),
            (b'<', _) => (TokenKind::Compare(CompareOp::ProperSubset), 1),
            (b'>', _) => (TokenKind::Compare(CompareOp::ProperSuperset), 1),
            _ => {
                // Report the full character, not the first byte of a multi-byte sequence
                let ch = source[pos..].chars().next().unwrap_or('\u{FFFD}');
                return Err(SyntaxError::new(
                    pos,
                    SyntaxErrorKind::UnexpectedCharacter(ch),
                ));
            }
        };

        tokens.push(Token {
            kind,
            start: pos,
            end: pos + len,
        });
        pos += len;
    }

    Ok(tokens)
}

fn is_variable_byte(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || byte == b'_'
}
