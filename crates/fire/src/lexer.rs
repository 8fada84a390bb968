//! Byte stream -> token stream.
//!
//! Grounded in `original_source/src/Lexer.cpp`: a single forward scan with
//! no backtracking, longest-match on a fixed punctuator table, and
//! identifiers/keywords sharing one token kind (the parser tells keywords
//! apart by string match, not the lexer).

use crate::source::{FileId, SourceMap, Span};
use crate::token::{Token, TokenKind, TokenStream};
use std::fmt;

/// Punctuators, longest first so that e.g. `<<=` is matched before `<<`
/// before `<`. This exact order is load-bearing: swapping `>>` and `>=`
/// would make `>>=` lex as `>` `>` `=` instead of `>>=`.
const PUNCTUATORS: &[&str] = &[
    "<<=", ">>=", "<<", ">>", "<=", ">=", "==", "!=", "&&", "||", "->", "::", "..", "<", ">", "+", "-", "/", "*", "%",
    "=", ";", ":", ",", ".", "[", "]", "(", ")", "{", "}", "!", "?", "&", "^", "|", "@", "~",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LexError {
    UnterminatedLiteral { span: Span, is_string: bool },
    InvalidEscape { span: Span, escape: char },
    InvalidCharLiteral { span: Span },
    InvalidToken { span: Span, byte: u8 },
}

impl LexError {
    pub fn span(&self) -> Span {
        match self {
            Self::UnterminatedLiteral { span, .. }
            | Self::InvalidEscape { span, .. }
            | Self::InvalidCharLiteral { span }
            | Self::InvalidToken { span, .. } => *span,
        }
    }
}

impl fmt::Display for LexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnterminatedLiteral { is_string, .. } => {
                write!(f, "unterminated {} literal", if *is_string { "string" } else { "character" })
            }
            Self::InvalidEscape { escape, .. } => write!(f, "invalid escape sequence `\\{escape}`"),
            Self::InvalidCharLiteral { .. } => write!(f, "character literal must contain exactly one code point"),
            Self::InvalidToken { byte, .. } => write!(f, "invalid token (byte 0x{byte:02x})"),
        }
    }
}

impl std::error::Error for LexError {}

pub struct Lexer<'a> {
    source: &'a SourceMap,
    file: FileId,
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a SourceMap, file: FileId) -> Self {
        Self {
            source,
            file,
            bytes: source.text(file).as_bytes(),
            pos: 0,
        }
    }

    pub fn lex(mut self) -> Result<TokenStream, LexError> {
        let mut tokens = Vec::new();
        self.skip_space();
        while self.check() {
            tokens.push(self.next_token()?);
            self.skip_space();
        }
        tokens.push(Token {
            kind: TokenKind::Eof,
            lexeme: String::new(),
            span: Span::point(self.file, self.pos as u32),
        });
        Ok(TokenStream { tokens })
    }

    fn check(&self) -> bool {
        self.pos < self.bytes.len()
    }

    fn peek(&self) -> u8 {
        self.bytes.get(self.pos).copied().unwrap_or(0)
    }

    fn peek_at(&self, offset: usize) -> u8 {
        self.bytes.get(self.pos + offset).copied().unwrap_or(0)
    }

    fn skip_space(&mut self) {
        while self.check() && self.peek().is_ascii_whitespace() {
            self.pos += 1;
        }
    }

    fn matches(&self, s: &str) -> bool {
        let bytes = s.as_bytes();
        self.pos + bytes.len() <= self.bytes.len() && &self.bytes[self.pos..self.pos + bytes.len()] == bytes
    }

    fn text_since(&self, start: usize) -> String {
        String::from_utf8_lossy(&self.bytes[start..self.pos]).into_owned()
    }

    fn next_token(&mut self) -> Result<Token, LexError> {
        let start = self.pos;
        let c = self.peek();

        if c.is_ascii_digit() {
            return Ok(self.lex_number(start));
        }

        if c.is_ascii_alphabetic() || c == b'_' {
            while self.check() && (self.peek().is_ascii_alphanumeric() || self.peek() == b'_') {
                self.pos += 1;
            }
            let lexeme = self.text_since(start);
            let kind = if lexeme == "true" || lexeme == "false" {
                TokenKind::Bool
            } else {
                TokenKind::Identifier
            };
            return Ok(Token {
                kind,
                lexeme,
                span: Span::new(self.file, start as u32, self.pos as u32),
            });
        }

        if c == b'"' || c == b'\'' {
            return self.lex_literal(start, c);
        }

        if self.matches("//") {
            while self.check() && self.peek() != b'\n' {
                self.pos += 1;
            }
            return Ok(Token {
                kind: TokenKind::CommentLine,
                lexeme: self.text_since(start),
                span: Span::new(self.file, start as u32, self.pos as u32),
            });
        }
        if self.matches("/*") {
            self.pos += 2;
            while self.check() && !self.matches("*/") {
                self.pos += 1;
            }
            self.pos = (self.pos + 2).min(self.bytes.len());
            return Ok(Token {
                kind: TokenKind::CommentBlock,
                lexeme: self.text_since(start),
                span: Span::new(self.file, start as u32, self.pos as u32),
            });
        }

        for punct in PUNCTUATORS {
            if self.matches(punct) {
                self.pos += punct.len();
                return Ok(Token {
                    kind: TokenKind::Punctuator,
                    lexeme: (*punct).to_string(),
                    span: Span::new(self.file, start as u32, self.pos as u32),
                });
            }
        }

        Err(LexError::InvalidToken {
            span: Span::new(self.file, start as u32, (start + 1) as u32),
            byte: c,
        })
    }

    fn lex_number(&mut self, start: usize) -> Token {
        let mut kind = TokenKind::Int;

        if self.peek() == b'0' && (self.peek_at(1) == b'x' || self.peek_at(1) == b'X') {
            self.pos += 2;
            while self.check() && self.peek().is_ascii_hexdigit() {
                self.pos += 1;
            }
            kind = TokenKind::Hex;
        } else if self.peek() == b'0' && (self.peek_at(1) == b'b' || self.peek_at(1) == b'B') {
            self.pos += 2;
            while self.check() && (self.peek() == b'0' || self.peek() == b'1') {
                self.pos += 1;
            }
            kind = TokenKind::Bin;
        } else {
            while self.check() && self.peek().is_ascii_digit() {
                self.pos += 1;
            }
            if self.peek() == b'.' && self.peek_at(1).is_ascii_digit() {
                self.pos += 1;
                while self.check() && self.peek().is_ascii_digit() {
                    self.pos += 1;
                }
                kind = TokenKind::Float;
            } else if self.peek() == b'u' {
                self.pos += 1;
                kind = TokenKind::Size;
            }
        }

        Token {
            kind,
            lexeme: self.text_since(start),
            span: Span::new(self.file, start as u32, self.pos as u32),
        }
    }

    fn lex_literal(&mut self, start: usize, quote: u8) -> Result<Token, LexError> {
        self.pos += 1; // opening quote
        let mut code_points = 0usize;
        loop {
            if !self.check() {
                return Err(LexError::UnterminatedLiteral {
                    span: Span::new(self.file, start as u32, self.pos as u32),
                    is_string: quote == b'"',
                });
            }
            let c = self.peek();
            if c == quote {
                self.pos += 1;
                break;
            }
            if c == b'\\' {
                let escape_pos = self.pos;
                self.pos += 1;
                if !self.check() {
                    return Err(LexError::UnterminatedLiteral {
                        span: Span::new(self.file, start as u32, self.pos as u32),
                        is_string: quote == b'"',
                    });
                }
                let escape = self.peek();
                if !matches!(escape, b'n' | b'r' | b'\\' | b'"' | b'\'') {
                    return Err(LexError::InvalidEscape {
                        span: Span::new(self.file, escape_pos as u32, (self.pos + 1) as u32),
                        escape: escape as char,
                    });
                }
                self.pos += 1;
                code_points += 1;
                continue;
            }
            self.pos += 1;
            code_points += 1;
        }

        let span = Span::new(self.file, start as u32, self.pos as u32);
        if quote == b'\'' && code_points != 1 {
            return Err(LexError::InvalidCharLiteral { span });
        }

        Ok(Token {
            kind: if quote == b'"' { TokenKind::String } else { TokenKind::Char },
            lexeme: self.text_since(start),
            span,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(src: &str) -> (SourceMap, Result<TokenStream, LexError>) {
        let mut map = SourceMap::new();
        let file = map.add_file("t.fire", src.to_string());
        let tokens = Lexer::new(&map, file).lex();
        (map, tokens)
    }

    #[test]
    fn punctuator_longest_match() {
        let (_, toks) = lex("<<= >>= << >> <= >= == != && || -> :: ..");
        let toks = toks.unwrap();
        let expect = ["<<=", ">>=", "<<", ">>", "<=", ">=", "==", "!=", "&&", "||", "->", "::", ".."];
        for (tok, exp) in toks.tokens.iter().zip(expect.iter()) {
            assert_eq!(tok.lexeme, *exp);
        }
    }

    #[test]
    fn splits_double_angle_for_templates() {
        let (_, toks) = lex("a@<Vec<int>>(1)");
        let toks = toks.unwrap();
        let lexemes: Vec<_> = toks.tokens.iter().map(|t| t.lexeme.as_str()).collect();
        assert!(lexemes.contains(&">>"));
    }

    #[test]
    fn numbers() {
        let (_, toks) = lex("42 3.14 0xFF 0b101 7u");
        let toks = toks.unwrap();
        let kinds: Vec<_> = toks.tokens.iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![
                TokenKind::Int,
                TokenKind::Float,
                TokenKind::Hex,
                TokenKind::Bin,
                TokenKind::Size,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn string_and_char_literals() {
        let (_, toks) = lex(r#" "hi\n" 'a' "#);
        let toks = toks.unwrap();
        assert_eq!(toks.tokens[0].kind, TokenKind::String);
        assert_eq!(toks.tokens[1].kind, TokenKind::Char);
    }

    #[test]
    fn multi_char_literal_is_rejected() {
        let (_, toks) = lex("'ab'");
        assert!(matches!(toks, Err(LexError::InvalidCharLiteral { .. })));
    }

    #[test]
    fn unterminated_string_is_rejected() {
        let (_, toks) = lex("\"no end");
        assert!(matches!(toks, Err(LexError::UnterminatedLiteral { is_string: true, .. })));
    }

    #[test]
    fn keywords_are_not_reserved_at_lex_time() {
        let (_, toks) = lex("fn let if else");
        let toks = toks.unwrap();
        for tok in &toks.tokens[..4] {
            assert_eq!(tok.kind, TokenKind::Identifier);
        }
    }

    #[test]
    fn lex_round_trip_outside_comments() {
        let src = "let  a   =  1 + 2;\n";
        let (map, toks) = lex(src);
        let toks = toks.unwrap();
        let mut pos = 0usize;
        for tok in &toks.tokens {
            if tok.kind == crate::token::TokenKind::Eof {
                continue;
            }
            let s = tok.span.start as usize;
            assert!(src.as_bytes()[pos..s].iter().all(u8::is_ascii_whitespace));
            pos = tok.span.end as usize;
        }
        let _ = map;
    }
}
