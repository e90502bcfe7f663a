//! Mapping of plain Rust types onto IDL types, for callers whose types are
//! known statically.

use crate::{
    codec,
    error::WireError,
    table::TypeTable,
    types::Type,
    value::Value,
};
use num_bigint::{BigInt, BigUint};

/// A Rust type with a fixed IDL counterpart.
pub trait IdlType: Sized {
    /// The IDL type values of `Self` are written as.
    fn ty() -> Type;

    fn into_value(self) -> Value;

    fn from_value(value: Value) -> Result<Self, WireError>;
}

fn unexpected<T: IdlType>(value: &Value) -> WireError {
    WireError::mismatch(T::ty(), value.kind())
}

macro_rules! impl_idl_type {
    ($rust:ty, $variant:ident) => {
        impl IdlType for $rust {
            fn ty() -> Type {
                Type::$variant
            }

            fn into_value(self) -> Value {
                Value::$variant(self)
            }

            fn from_value(value: Value) -> Result<Self, WireError> {
                match value {
                    Value::$variant(inner) => Ok(inner),
                    other => Err(unexpected::<Self>(&other)),
                }
            }
        }
    };
}

impl_idl_type!(bool, Bool);
impl_idl_type!(u8, Nat8);
impl_idl_type!(u16, Nat16);
impl_idl_type!(u32, Nat32);
impl_idl_type!(u64, Nat64);
impl_idl_type!(i8, Int8);
impl_idl_type!(i16, Int16);
impl_idl_type!(i32, Int32);
impl_idl_type!(i64, Int64);
impl_idl_type!(f32, Float32);
impl_idl_type!(f64, Float64);
impl_idl_type!(String, Text);
impl_idl_type!(BigUint, Nat);
impl_idl_type!(BigInt, Int);

impl IdlType for () {
    fn ty() -> Type {
        Type::Null
    }

    fn into_value(self) -> Value {
        Value::Null
    }

    fn from_value(value: Value) -> Result<Self, WireError> {
        match value {
            Value::Null => Ok(()),
            other => Err(unexpected::<Self>(&other)),
        }
    }
}

impl<T: IdlType> IdlType for Option<T> {
    fn ty() -> Type {
        Type::opt(T::ty())
    }

    fn into_value(self) -> Value {
        Value::Opt(self.map(|inner| Box::new(inner.into_value())))
    }

    fn from_value(value: Value) -> Result<Self, WireError> {
        match value {
            Value::Opt(Some(inner)) => Ok(Some(T::from_value(*inner)?)),
            Value::Opt(None) => Ok(None),
            other => Err(unexpected::<Self>(&other)),
        }
    }
}

impl<T: IdlType> IdlType for Vec<T> {
    fn ty() -> Type {
        Type::vec(T::ty())
    }

    fn into_value(self) -> Value {
        Value::Vec(self.into_iter().map(IdlType::into_value).collect())
    }

    fn from_value(value: Value) -> Result<Self, WireError> {
        match value {
            Value::Vec(values) => values.into_iter().map(T::from_value).collect(),
            Value::Blob(bytes) => bytes.into_iter().map(|byte| T::from_value(Value::Nat8(byte))).collect(),
            other => Err(unexpected::<Self>(&other)),
        }
    }
}

/// Encodes a single Rust value as a one-argument message.
pub fn encode_one<T: IdlType>(value: T) -> Result<Vec<u8>, WireError> {
    codec::encode(&TypeTable::new(), &[T::ty()], &[value.into_value()])
}

/// Decodes a one-argument message into a Rust value. The wire type must be
/// equivalent to `T`'s IDL type.
pub fn decode_one<T: IdlType>(bytes: &[u8]) -> Result<T, WireError> {
    let mut values = codec::decode_as(&TypeTable::new(), &[T::ty()], bytes)?;
    match values.pop() {
        Some(value) => T::from_value(value),
        None => Err(WireError::mismatch("1 argument", "0 arguments")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rust_types_round_trip() {
        assert_eq!(decode_one::<u64>(&encode_one(7u64).unwrap()), Ok(7));
        assert_eq!(decode_one::<String>(&encode_one("hi".to_owned()).unwrap()), Ok("hi".to_owned()));
        assert_eq!(decode_one::<()>(&encode_one(()).unwrap()), Ok(()));
        assert_eq!(
            decode_one::<Option<Vec<i16>>>(&encode_one(Some(vec![-1i16, 2])).unwrap()),
            Ok(Some(vec![-1, 2]))
        );
        assert_eq!(
            decode_one::<BigInt>(&encode_one(BigInt::from(-1000)).unwrap()),
            Ok(BigInt::from(-1000))
        );
    }

    #[test]
    fn bytes_travel_as_blob() {
        let bytes = encode_one(vec![1u8, 2, 3]).unwrap();
        assert_eq!(bytes, b"DIDL\x01\x6d\x7b\x01\x00\x03\x01\x02\x03");
        assert_eq!(decode_one::<Vec<u8>>(&bytes), Ok(vec![1, 2, 3]));
    }

    #[test]
    fn wire_type_must_match() {
        let bytes = encode_one(true).unwrap();
        assert!(matches!(decode_one::<u8>(&bytes), Err(WireError::TypeMismatch { .. })));
    }
}
