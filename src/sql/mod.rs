//! # SQL Compiler and Runtime
//!
//! A statement travels through four stages, all of them allocating from the
//! caller's `QueryArena`:
//!
//! ```text
//! text ──> clause segmentation ──> expression compilation (EET)
//!                                          │
//!          operator tree <── access-path optimization
//!               │
//!          pull-based execution (open / next / close)
//! ```
//!
//! ## Module Overview
//!
//! | Module | Purpose |
//! |--------|---------|
//! | `token`, `lexer` | Keyword table and zero-copy tokenizer |
//! | `clause` | Splits a statement into canonical clause records |
//! | `expr` | Compiles infix expressions into flat postfix EETs |
//! | `eet` | EET storage, verification, binding and evaluation |
//! | `optimizer` | Index range narrowing and index-ordered joins |
//! | `executor` | Scan, joins, selection, projection, sort, aggregate |
//! | `planner` | Builds operator trees and runs DML/DDL |
//! | `context` | Arena and storage handed to every operator call |
//!
//! Nothing in this module keeps state between statements; the catalog and
//! data live entirely behind the `Storage` collaborator.

pub mod clause;
pub mod context;
pub mod eet;
pub mod executor;
pub mod expr;
pub mod lexer;
pub mod optimizer;
pub mod planner;
pub mod token;

pub use clause::{segment, Clause, ClauseKind, ClauseList};
pub use context::ExecutionContext;
pub use eet::Eet;
pub use executor::{Executor, Next, Operator};
pub use lexer::Lexer;
pub use planner::{Plan, Planner};
