//! # Token Definitions
//!
//! Tokens carry only a classification and the half-open byte range they cover
//! in the statement text. Identifier and literal text is re-derived from the
//! offsets when a consumer needs it, so a token is `Copy` and borrows nothing.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Keyword {
    Select,
    From,
    Where,
    Insert,
    Into,
    Values,
    Update,
    Table,
    Set,
    Delete,
    Create,
    Index,
    On,
    Join,
    Inner,
    Cross,
    As,
    And,
    Or,
    Xor,
    Not,
    Null,
    Group,
    Order,
    By,
    Asc,
    Desc,
    Int,
    Integer,
    Decimal,
    String,
    Count,
    Sum,
    Min,
    Max,
    Avg,
}

impl Keyword {
    pub fn as_str(&self) -> &'static str {
        match self {
            Keyword::Select => "SELECT",
            Keyword::From => "FROM",
            Keyword::Where => "WHERE",
            Keyword::Insert => "INSERT",
            Keyword::Into => "INTO",
            Keyword::Values => "VALUES",
            Keyword::Update => "UPDATE",
            Keyword::Table => "TABLE",
            Keyword::Set => "SET",
            Keyword::Delete => "DELETE",
            Keyword::Create => "CREATE",
            Keyword::Index => "INDEX",
            Keyword::On => "ON",
            Keyword::Join => "JOIN",
            Keyword::Inner => "INNER",
            Keyword::Cross => "CROSS",
            Keyword::As => "AS",
            Keyword::And => "AND",
            Keyword::Or => "OR",
            Keyword::Xor => "XOR",
            Keyword::Not => "NOT",
            Keyword::Null => "NULL",
            Keyword::Group => "GROUP",
            Keyword::Order => "ORDER",
            Keyword::By => "BY",
            Keyword::Asc => "ASC",
            Keyword::Desc => "DESC",
            Keyword::Int => "INT",
            Keyword::Integer => "INTEGER",
            Keyword::Decimal => "DECIMAL",
            Keyword::String => "STRING",
            Keyword::Count => "COUNT",
            Keyword::Sum => "SUM",
            Keyword::Min => "MIN",
            Keyword::Max => "MAX",
            Keyword::Avg => "AVG",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Punct {
    Comma,
    Dot,
    LParen,
    RParen,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Reserved(Keyword),
    Identifier,
    Integer,
    Decimal,
    String,
    Operator(Operator),
    Punctuation(Punct),
    Terminator,
    Error(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub start: usize,
    pub end: usize,
}

impl Token {
    pub fn is_keyword(&self, keyword: Keyword) -> bool {
        self.kind == TokenKind::Reserved(keyword)
    }

    pub fn is_punct(&self, punct: Punct) -> bool {
        self.kind == TokenKind::Punctuation(punct)
    }

    pub fn is_operator(&self, op: Operator) -> bool {
        self.kind == TokenKind::Operator(op)
    }
}
