//! # Type System
//!
//! ## Module Structure
//!
//! - `data_type`: `AttrType` (stored attribute types) and `ValueKind`
//!   (expression-level types, including BOOLEAN and NULL)
//! - `value`: runtime scalar `Value`
//!
//! ## Usage
//!
//! ```ignore
//! use petitdb::types::{AttrType, Value};
//!
//! let v = Value::from("name");
//! assert_eq!(AttrType::Int.fixed_size(), Some(4));
//! ```

mod data_type;
mod value;

pub use data_type::{AttrType, ValueKind};
pub use value::{TextBuf, Value};
