//! # petitdb Configuration Module
//!
//! This module centralizes the configuration constants shared by the arena,
//! the SQL compiler, the operator runtime and the file storage. Constants that
//! depend on each other live next to each other and their relationships are
//! enforced through compile-time assertions.
//!
//! ## Module Organization
//!
//! - [`constants`]: All numeric and naming constants with dependency notes

pub mod constants;
pub use constants::*;
