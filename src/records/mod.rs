//! # Records
//!
//! Row buffers shared by storage and the operator runtime. See `tuple` for the
//! byte layout.

mod tuple;

pub use tuple::Tuple;
