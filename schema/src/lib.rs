//! This is a Rust library with the runtime half of an interface description
//! language: the structural type model, the deduplicating type table, and the
//! self-describing `DIDL` binary format for types and values.
//!
//! ```
//! use brine_idl_schema::*;
//!
//! let mut builder = TypeTableBuilder::new();
//! let point = Type::record(vec![
//!     Field::named("x", Type::Int32),
//!     Field::named("y", Type::Int32),
//! ]);
//! builder.register_type_with_label("Point", &point).unwrap();
//! let table = builder.freeze();
//!
//! let value = Value::record([("x", Value::Int32(1)), ("y", Value::Int32(-1))]);
//! let bytes = encode(&table, &[Type::id("Point")], &[value.clone()]).unwrap();
//! assert_eq!(&bytes[..4], b"DIDL");
//! assert_eq!(decode_as(&table, &[Type::id("Point")], &bytes).unwrap(), vec![value]);
//! ```

pub mod bb;
pub mod codec;
pub mod error;
pub mod table;
pub mod traits;
pub mod types;
pub mod value;
pub mod wire;

pub use bb::*;
pub use codec::*;
pub use error::*;
pub use table::*;
pub use traits::*;
pub use types::*;
pub use value::*;

/// Prefix of every encoded message.
pub const MAGIC: [u8; 4] = *b"DIDL";

pub const TYPE_NULL: i32 = -1;
pub const TYPE_BOOL: i32 = -2;
pub const TYPE_NAT: i32 = -3;
pub const TYPE_INT: i32 = -4;
pub const TYPE_NAT8: i32 = -5;
pub const TYPE_NAT16: i32 = -6;
pub const TYPE_NAT32: i32 = -7;
pub const TYPE_NAT64: i32 = -8;
pub const TYPE_INT8: i32 = -9;
pub const TYPE_INT16: i32 = -10;
pub const TYPE_INT32: i32 = -11;
pub const TYPE_INT64: i32 = -12;
pub const TYPE_FLOAT32: i32 = -13;
pub const TYPE_FLOAT64: i32 = -14;
pub const TYPE_TEXT: i32 = -15;
pub const TYPE_RESERVED: i32 = -16;
pub const TYPE_EMPTY: i32 = -17;
pub const TYPE_OPT: i32 = -18;
pub const TYPE_VEC: i32 = -19;
pub const TYPE_RECORD: i32 = -20;
pub const TYPE_VARIANT: i32 = -21;
pub const TYPE_FUNC: i32 = -22;
pub const TYPE_SERVICE: i32 = -23;
pub const TYPE_PRINCIPAL: i32 = -24;
