//! # petitdb Configuration Constants
//!
//! This module groups every tunable or format-defining constant of the engine.
//! Values that define on-disk or in-arena encodings must never change without
//! migrating existing relation files.
//!
//! ## Dependency Graph
//!
//! ```text
//! MIN_ARENA_SIZE (256)
//!       │
//!       └─> DEFAULT_NESTED_SCOPE_SIZE (must be >= MIN_ARENA_SIZE)
//!             Nested sub-statements (DELETE -> UPDATE, INSERT slot
//!             lookup) carve this many bytes out of the caller arena.
//!
//! MAX_ATTRIBUTES (64)
//!       │
//!       └─> MAX_NULL_BITMAP_SIZE (derived: ceil(MAX_ATTRIBUTES / 8))
//!
//! EET node encoding
//!       │
//!       ├─> EET_CONSTANT_NODE_SIZE (tag + 8 byte payload)
//!       ├─> EET_ATTRIBUTE_NODE_SIZE (tag + 16 byte payload, bound in place)
//!       └─> EET_STRING_HEADER_SIZE (tag + u16 length, followed by bytes)
//! ```
//!
//! ## Critical Invariants
//!
//! 1. `DEFAULT_NESTED_SCOPE_SIZE >= MIN_ARENA_SIZE`
//! 2. `MAX_NULL_BITMAP_SIZE * 8 >= MAX_ATTRIBUTES`
//! 3. `MAX_STRING_SIZE` fits in the `u16` size field of a header entry

// ============================================================================
// ARENA CONFIGURATION
// ============================================================================

/// Smallest arena the engine accepts for compiling a statement.
pub const MIN_ARENA_SIZE: usize = 256;

/// Bytes carved out of the caller arena for each nested sub-statement.
pub const DEFAULT_NESTED_SCOPE_SIZE: usize = 1024;

const _: () = assert!(
    DEFAULT_NESTED_SCOPE_SIZE >= MIN_ARENA_SIZE,
    "nested scopes must be able to hold a minimal statement"
);

// ============================================================================
// CLAUSE SEGMENTATION
// ============================================================================

/// Encoded size of one clause record on the arena back stack:
/// kind (1) + start (4) + end (4) + term count (2).
pub const CLAUSE_RECORD_SIZE: usize = 11;

// ============================================================================
// EXPRESSION EVALUATION TREE ENCODING
// ============================================================================

/// Integer and decimal constants: tag + 8 byte little-endian payload.
pub const EET_CONSTANT_NODE_SIZE: usize = 9;

/// Attribute references: tag + 16 byte payload. Unbound nodes carry source
/// offsets, bound nodes carry the resolved position and layout.
pub const EET_ATTRIBUTE_NODE_SIZE: usize = 17;

/// String constants: tag + u16 length, followed by the bytes.
pub const EET_STRING_HEADER_SIZE: usize = 3;

/// NULL literal and every operator node.
pub const EET_TAG_ONLY_NODE_SIZE: usize = 1;

// ============================================================================
// RELATION LAYOUT
// ============================================================================

/// Maximum attributes per relation header (including join concatenations).
pub const MAX_ATTRIBUTES: usize = 64;

/// Largest null bitmap a tuple can carry.
pub const MAX_NULL_BITMAP_SIZE: usize = MAX_ATTRIBUTES.div_ceil(8);

/// Largest declared STRING(n) attribute.
pub const MAX_STRING_SIZE: usize = 255;

/// Stored width of an INT attribute (i32, little endian).
pub const INT_SIZE: usize = 4;

/// Stored width of a DECIMAL attribute (f64, little endian).
pub const DECIMAL_SIZE: usize = 8;

/// Reserved attribute used for soft deletes.
pub const SOFT_DELETE_ATTRIBUTE: &str = "__delete";

const _: () = assert!(
    MAX_NULL_BITMAP_SIZE * 8 >= MAX_ATTRIBUTES,
    "null bitmap must cover every attribute"
);

const _: () = assert!(
    MAX_STRING_SIZE <= u16::MAX as usize,
    "string sizes are stored as u16"
);

// ============================================================================
// FILE STORAGE
// ============================================================================

/// Extension of relation data files.
pub const RELATION_FILE_EXTENSION: &str = "rel";

/// Extension of per-attribute index files.
pub const INDEX_FILE_EXTENSION: &str = "idx";

/// Size of one index entry: key (i64) + record offset (u64).
pub const INDEX_ENTRY_SIZE: usize = 16;
