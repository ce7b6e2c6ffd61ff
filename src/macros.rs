//! # Internal Macros
//!
//! ## le_field_accessors!
//!
//! On-disk structs keep their integers as zerocopy little-endian wrappers so
//! they can be cast straight from file bytes. This macro generates a native
//! getter and a `set_` setter per field, naming the wrapper once:
//!
//! ```ignore
//! #[repr(C)]
//! struct IndexEntry {
//!     key: I64,
//!     record_offset: U64,
//! }
//!
//! impl IndexEntry {
//!     le_field_accessors! {
//!         key: i64 => I64,
//!         record_offset: u64 => U64,
//!     }
//! }
//!
//! // entry.key() -> i64, entry.set_record_offset(42)
//! ```

/// Native getters and setters for zerocopy little-endian fields.
#[macro_export]
macro_rules! le_field_accessors {
    ($($field:ident : $native:ty => $wrapper:ident),* $(,)?) => {
        $(
            ::paste::paste! {
                #[inline]
                pub fn $field(&self) -> $native {
                    self.$field.get()
                }

                #[inline]
                pub fn [<set_ $field>](&mut self, value: $native) {
                    self.$field = ::zerocopy::little_endian::$wrapper::new(value);
                }
            }
        )*
    };
}
