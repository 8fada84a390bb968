//! Token kinds and the flat token sequence produced by the lexer.

use crate::source::Span;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Int,
    Hex,
    Bin,
    Float,
    Size,
    Bool,
    Char,
    String,
    Identifier,
    Punctuator,
    CommentLine,
    CommentBlock,
    Eof,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Int => "integer literal",
            Self::Hex => "hex literal",
            Self::Bin => "binary literal",
            Self::Float => "float literal",
            Self::Size => "size literal",
            Self::Bool => "boolean literal",
            Self::Char => "character literal",
            Self::String => "string literal",
            Self::Identifier => "identifier",
            Self::Punctuator => "punctuator",
            Self::CommentLine => "line comment",
            Self::CommentBlock => "block comment",
            Self::Eof => "end of file",
        };
        f.write_str(s)
    }
}

/// A single lexical token. `lexeme` is the literal source text (already
/// unescaped for string/char literals is *not* done here — that happens in
/// the parser/evaluator at the point a literal is turned into an `Object`,
/// matching how the lexer never does semantic work beyond recognizing
/// token boundaries).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub lexeme: String,
    pub span: Span,
}

impl Token {
    pub fn is(&self, lexeme: &str) -> bool {
        self.lexeme == lexeme
    }

    pub fn is_kind(&self, kind: TokenKind) -> bool {
        self.kind == kind
    }
}

/// Index of a token inside the flat stream produced by the lexer. Tokens
/// are stored in a `Vec<Token>` rather than a linked structure so any
/// token can reach its neighbors (`prev`/`next`) for diagnostic hints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct TokenIndex(pub usize);

pub struct TokenStream {
    pub tokens: Vec<Token>,
}

impl TokenStream {
    pub fn get(&self, idx: TokenIndex) -> &Token {
        &self.tokens[idx.0]
    }

    pub fn prev(&self, idx: TokenIndex, step: usize) -> Option<&Token> {
        idx.0.checked_sub(step).map(|i| &self.tokens[i])
    }

    pub fn next(&self, idx: TokenIndex, step: usize) -> Option<&Token> {
        self.tokens.get(idx.0 + step)
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}
