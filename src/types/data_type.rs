//! # Attribute and Expression Types
//!
//! Two small enums describe types at different stages:
//!
//! | Type | Where | Variants |
//! |------|-------|----------|
//! | `AttrType` | relation headers, on disk | Int, Decimal, String |
//! | `ValueKind` | expression verification, runtime values | Null, Int, Decimal, Text, Bool |
//!
//! `AttrType` is `#[repr(u8)]` because its discriminant is written into
//! relation files and bound EET nodes. Every attribute is null-capable through
//! the tuple null bitmap, so there is no separate nullable flag.

use eyre::{bail, Result};

use crate::config::{DECIMAL_SIZE, INT_SIZE};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum AttrType {
    Int = 1,
    Decimal = 2,
    String = 3,
}

impl AttrType {
    pub fn from_u8(code: u8) -> Result<Self> {
        Ok(match code {
            1 => AttrType::Int,
            2 => AttrType::Decimal,
            3 => AttrType::String,
            other => bail!("invalid attribute type code {}", other),
        })
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Stored width for fixed-size types.
    pub fn fixed_size(self) -> Option<usize> {
        match self {
            AttrType::Int => Some(INT_SIZE),
            AttrType::Decimal => Some(DECIMAL_SIZE),
            AttrType::String => None,
        }
    }

    pub fn kind(self) -> ValueKind {
        match self {
            AttrType::Int => ValueKind::Int,
            AttrType::Decimal => ValueKind::Decimal,
            AttrType::String => ValueKind::Text,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            AttrType::Int => "INT",
            AttrType::Decimal => "DECIMAL",
            AttrType::String => "STRING",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Null,
    Int,
    Decimal,
    Text,
    Bool,
}

impl ValueKind {
    pub fn is_numeric(self) -> bool {
        matches!(self, ValueKind::Int | ValueKind::Decimal)
    }

    /// Storage type used when a value of this kind lands in a tuple.
    /// Booleans and bare NULLs are stored as INT.
    pub fn storage_type(self) -> AttrType {
        match self {
            ValueKind::Decimal => AttrType::Decimal,
            ValueKind::Text => AttrType::String,
            ValueKind::Null | ValueKind::Int | ValueKind::Bool => AttrType::Int,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ValueKind::Null => "NULL",
            ValueKind::Int => "INT",
            ValueKind::Decimal => "DECIMAL",
            ValueKind::Text => "STRING",
            ValueKind::Bool => "BOOLEAN",
        }
    }
}
