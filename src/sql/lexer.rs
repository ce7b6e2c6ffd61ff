//! # SQL Lexer - Offset Tokenizer
//!
//! The lexer classifies one token at a time and records only its byte range.
//! Consumers re-derive identifier and literal text from the offsets
//! (`text`, `string_literal`) instead of holding on to a token stream, and
//! can rewind to any earlier offset with `set_offset` to re-scan a clause.
//!
//! ## Protocol
//!
//! ```ignore
//! let mut lexer = Lexer::new("SELECT name FROM t;");
//! while lexer.advance() {
//!     let token = lexer.token();
//!     println!("{:?} {:?}", token.kind, lexer.text(token));
//! }
//! ```
//!
//! `advance` returns `false` at end of input. A malformed token is reported as
//! `TokenKind::Error` with a message; the caller decides whether that aborts.
//!
//! ## Keyword Lookup
//!
//! Keywords are matched case-insensitively through a compile-time perfect hash
//! map (phf). The upper-cased probe lives in a stack buffer, so scanning never
//! allocates.
//!
//! ## Token Classes
//!
//! - **Reserved words**: clause introducers, join words, logical operators,
//!   type names and aggregate names
//! - **Identifiers**: `[A-Za-z_][A-Za-z0-9_]*` that are not reserved
//! - **Literals**: integers (`42`), decimals (`3.14`, `1e3`), strings (`'it''s'`)
//! - **Operators**: `+ - * / % = <> != < <= > >=`
//! - **Punctuation**: `, . ( )`
//! - **Terminator**: `;`
//!
//! `--` starts a comment that runs to the end of the line.

use phf::phf_map;

use super::token::{Keyword, Operator, Punct, Token, TokenKind};
use crate::types::TextBuf;

static KEYWORDS: phf::Map<&'static str, Keyword> = phf_map! {
    "SELECT" => Keyword::Select,
    "FROM" => Keyword::From,
    "WHERE" => Keyword::Where,
    "INSERT" => Keyword::Insert,
    "INTO" => Keyword::Into,
    "VALUES" => Keyword::Values,
    "UPDATE" => Keyword::Update,
    "TABLE" => Keyword::Table,
    "SET" => Keyword::Set,
    "DELETE" => Keyword::Delete,
    "CREATE" => Keyword::Create,
    "INDEX" => Keyword::Index,
    "ON" => Keyword::On,
    "JOIN" => Keyword::Join,
    "INNER" => Keyword::Inner,
    "CROSS" => Keyword::Cross,
    "AS" => Keyword::As,
    "AND" => Keyword::And,
    "OR" => Keyword::Or,
    "XOR" => Keyword::Xor,
    "NOT" => Keyword::Not,
    "NULL" => Keyword::Null,
    "GROUP" => Keyword::Group,
    "ORDER" => Keyword::Order,
    "BY" => Keyword::By,
    "ASC" => Keyword::Asc,
    "DESC" => Keyword::Desc,
    "INT" => Keyword::Int,
    "INTEGER" => Keyword::Integer,
    "DECIMAL" => Keyword::Decimal,
    "STRING" => Keyword::String,
    "COUNT" => Keyword::Count,
    "SUM" => Keyword::Sum,
    "MIN" => Keyword::Min,
    "MAX" => Keyword::Max,
    "AVG" => Keyword::Avg,
};

/// Longest reserved word, used to size the upper-case probe buffer.
const MAX_KEYWORD_LEN: usize = 8;

pub struct Lexer<'a> {
    input: &'a str,
    bytes: &'a [u8],
    pos: usize,
    current: Token,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            input,
            bytes: input.as_bytes(),
            pos: 0,
            current: Token {
                kind: TokenKind::Terminator,
                start: 0,
                end: 0,
            },
        }
    }

    pub fn reset(&mut self, input: &'a str) {
        *self = Self::new(input);
    }

    pub fn input(&self) -> &'a str {
        self.input
    }

    /// Scans the next token. Returns `false` at end of input.
    pub fn advance(&mut self) -> bool {
        self.skip_whitespace_and_comments();
        if self.is_eof() {
            self.current = Token {
                kind: TokenKind::Terminator,
                start: self.pos,
                end: self.pos,
            };
            return false;
        }
        let start = self.pos;
        let kind = self.scan();
        self.current = Token {
            kind,
            start,
            end: self.pos,
        };
        true
    }

    pub fn token(&self) -> Token {
        self.current
    }

    /// Offset just past the current token.
    pub fn offset(&self) -> usize {
        self.pos
    }

    /// Resumes scanning at `offset`; the next `advance` reads from there.
    pub fn set_offset(&mut self, offset: usize) {
        self.pos = offset.min(self.bytes.len());
    }

    pub fn text(&self, token: Token) -> &'a str {
        &self.input[token.start..token.end]
    }

    /// Content of a string literal token with quotes removed and `''` unescaped.
    pub fn string_literal(&self, token: Token) -> TextBuf {
        let raw = &self.bytes[token.start + 1..token.end - 1];
        let mut out = TextBuf::new();
        let mut i = 0;
        while i < raw.len() {
            out.push(raw[i]);
            if raw[i] == b'\'' {
                i += 1;
            }
            i += 1;
        }
        out
    }

    fn is_eof(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    fn current_byte(&self) -> u8 {
        self.bytes[self.pos]
    }

    fn peek_byte(&self) -> Option<u8> {
        self.bytes.get(self.pos + 1).copied()
    }

    fn skip_whitespace_and_comments(&mut self) {
        while !self.is_eof() {
            match self.current_byte() {
                b' ' | b'\t' | b'\r' | b'\n' => self.pos += 1,
                b'-' if self.peek_byte() == Some(b'-') => {
                    while !self.is_eof() && self.current_byte() != b'\n' {
                        self.pos += 1;
                    }
                }
                _ => break,
            }
        }
    }

    fn scan(&mut self) -> TokenKind {
        let ch = self.current_byte();

        if ch.is_ascii_alphabetic() || ch == b'_' {
            return self.scan_identifier_or_keyword();
        }

        if ch.is_ascii_digit() {
            return self.scan_number();
        }

        self.pos += 1;
        match ch {
            b'\'' => self.scan_string(),
            b'+' => TokenKind::Operator(Operator::Plus),
            b'-' => TokenKind::Operator(Operator::Minus),
            b'*' => TokenKind::Operator(Operator::Star),
            b'/' => TokenKind::Operator(Operator::Slash),
            b'%' => TokenKind::Operator(Operator::Percent),
            b'=' => TokenKind::Operator(Operator::Eq),
            b'<' => match self.bytes.get(self.pos) {
                Some(b'=') => {
                    self.pos += 1;
                    TokenKind::Operator(Operator::LtEq)
                }
                Some(b'>') => {
                    self.pos += 1;
                    TokenKind::Operator(Operator::NotEq)
                }
                _ => TokenKind::Operator(Operator::Lt),
            },
            b'>' => match self.bytes.get(self.pos) {
                Some(b'=') => {
                    self.pos += 1;
                    TokenKind::Operator(Operator::GtEq)
                }
                _ => TokenKind::Operator(Operator::Gt),
            },
            b'!' => match self.bytes.get(self.pos) {
                Some(b'=') => {
                    self.pos += 1;
                    TokenKind::Operator(Operator::NotEq)
                }
                _ => TokenKind::Error("expected '=' after '!'"),
            },
            b',' => TokenKind::Punctuation(Punct::Comma),
            b'.' => TokenKind::Punctuation(Punct::Dot),
            b'(' => TokenKind::Punctuation(Punct::LParen),
            b')' => TokenKind::Punctuation(Punct::RParen),
            b';' => TokenKind::Terminator,
            _ => {
                while !self.is_eof() && !self.input.is_char_boundary(self.pos) {
                    self.pos += 1;
                }
                TokenKind::Error("unexpected character")
            }
        }
    }

    fn scan_identifier_or_keyword(&mut self) -> TokenKind {
        let start = self.pos;
        while !self.is_eof()
            && (self.current_byte().is_ascii_alphanumeric() || self.current_byte() == b'_')
        {
            self.pos += 1;
        }

        let word = &self.bytes[start..self.pos];
        if word.len() > MAX_KEYWORD_LEN {
            return TokenKind::Identifier;
        }
        let mut upper = [0u8; MAX_KEYWORD_LEN];
        for (dst, src) in upper.iter_mut().zip(word) {
            *dst = src.to_ascii_uppercase();
        }
        let probe = std::str::from_utf8(&upper[..word.len()]).unwrap_or_default();
        match KEYWORDS.get(probe) {
            Some(&keyword) => TokenKind::Reserved(keyword),
            None => TokenKind::Identifier,
        }
    }

    fn scan_number(&mut self) -> TokenKind {
        while !self.is_eof() && self.current_byte().is_ascii_digit() {
            self.pos += 1;
        }

        let mut is_decimal = false;
        if !self.is_eof()
            && self.current_byte() == b'.'
            && self.peek_byte().is_some_and(|b| b.is_ascii_digit())
        {
            is_decimal = true;
            self.pos += 1;
            while !self.is_eof() && self.current_byte().is_ascii_digit() {
                self.pos += 1;
            }
        }

        if !self.is_eof() && matches!(self.current_byte(), b'e' | b'E') {
            let mark = self.pos;
            self.pos += 1;
            if !self.is_eof() && matches!(self.current_byte(), b'+' | b'-') {
                self.pos += 1;
            }
            if !self.is_eof() && self.current_byte().is_ascii_digit() {
                is_decimal = true;
                while !self.is_eof() && self.current_byte().is_ascii_digit() {
                    self.pos += 1;
                }
            } else {
                self.pos = mark;
            }
        }

        if !self.is_eof()
            && (self.current_byte().is_ascii_alphabetic() || self.current_byte() == b'_')
        {
            return TokenKind::Error("invalid numeric literal");
        }

        if is_decimal {
            TokenKind::Decimal
        } else {
            TokenKind::Integer
        }
    }

    fn scan_string(&mut self) -> TokenKind {
        loop {
            if self.is_eof() {
                return TokenKind::Error("unterminated string");
            }
            if self.current_byte() == b'\'' {
                if self.peek_byte() == Some(b'\'') {
                    self.pos += 2;
                } else {
                    self.pos += 1;
                    return TokenKind::String;
                }
            } else {
                self.pos += 1;
            }
        }
    }
}
