//! # Schema Metadata
//!
//! Relation headers are the only schema object the engine needs at query
//! time. They are loaded from storage when a scan is built and derived by
//! joins, projections and aggregates. Persisting them (the catalog) is the
//! storage collaborator's job.

mod header;

pub use header::{Attribute, HeaderBuilder, RelationHeader};
