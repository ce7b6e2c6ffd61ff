//! # petitdb - Embedded SQL for Memory-Constrained Devices
//!
//! petitdb compiles and runs a small SQL dialect inside a single
//! caller-supplied byte buffer. No statement touches the general heap for
//! its working state: clause records, compiled expressions, tuples and sort
//! buffers all come out of one `QueryArena`.
//!
//! ## Quick Start
//!
//! ```ignore
//! use petitdb::{Engine, FileStorage, QueryArena};
//!
//! let engine = Engine::new(FileStorage::open("./data")?);
//! let mut buf = [0u8; 4096];
//! let arena = QueryArena::new(&mut buf);
//!
//! engine.execute("CREATE TABLE T (id INT, name STRING(16))", &arena)?;
//! engine.execute("INSERT INTO T VALUES (1, 'a')", &arena)?;
//! let rows = engine.query("SELECT name FROM T WHERE id >= 1", &arena)?;
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────┐
//! │        Engine (prepare/query)        │
//! ├─────────────────────────────────────┤
//! │  Clause segmentation │ EET compiler  │
//! ├─────────────────────────────────────┤
//! │  Planner │ Access-path optimizer     │
//! ├─────────────────────────────────────┤
//! │   Pull-based operator runtime        │
//! ├─────────────────────────────────────┤
//! │  Tuples │ Relation headers │ Values  │
//! ├─────────────────────────────────────┤
//! │  Storage collaborator (files, index) │
//! └─────────────────────────────────────┘
//!          all over one QueryArena
//! ```
//!
//! ## File Layout
//!
//! `FileStorage` keeps one file per relation and one per index:
//!
//! ```text
//! data_dir/
//! ├── t.rel        # header block followed by fixed-size records
//! └── t.id.idx     # sorted (key, record offset) entries on t.id
//! ```
//!
//! ## Module Overview
//!
//! - `config`: shared constants with compile-time checks
//! - `memory`: dual-direction arena and nested scopes
//! - `types`, `schema`, `records`: values, relation headers, tuple layout
//! - `sql`: segmentation, expression compiler, planner, operators
//! - `storage`: the `Storage` collaborator and its file-backed implementation
//! - `database`: `Engine`, prepared plans, engine configuration
//! - `error`: typed error payloads and their classification

#[macro_use]
mod macros;

pub mod config;
pub mod database;
pub mod error;
pub mod memory;
pub mod records;
pub mod schema;
pub mod sql;
pub mod storage;
pub mod types;

pub use database::{
    Engine, EngineConfig, EngineConfigBuilder, ExecuteResult, Prepared, QueryPlan,
};
pub use error::{ErrorClass, SchemaError, SyntaxError};
pub use memory::{MemoryError, QueryArena};
pub use records::Tuple;
pub use schema::RelationHeader;
pub use sql::Next;
pub use storage::{FileStorage, Storage};
pub use types::{AttrType, Value};
