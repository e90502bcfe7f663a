use crate::{
    bb::{self, ByteBuffer, ByteBufferMut},
    error::WireError,
    table::TypeTable,
    types::{idl_hash, Field, Type},
};

use num_bigint::{BigInt, BigUint};
use std::collections::BTreeMap;
use std::fmt;
use std::ops::Index;

/// Nesting depth past which decoding gives up.
pub const MAX_DECODE_DEPTH: usize = 512;

/// Elements of zero-size types (`null`, `reserved`, records of those) that a
/// single decode may produce. They consume no input, so nothing else bounds
/// how many a short message can claim.
pub const MAX_ZERO_SIZED_ELEMENTS: u64 = 1 << 22;

/// This type holds dynamic IDL data.
///
/// Values don't carry their type. They are written and read against a
/// [`Type`] and the [`TypeTable`] that resolves its named references. Record
/// fields and variant alternatives are keyed by their numeric id.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Nat(BigUint),
    Int(BigInt),
    Nat8(u8),
    Nat16(u16),
    Nat32(u32),
    Nat64(u64),
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
    Text(String),
    Reserved,
    /// `None` is an opaque principal reference.
    Principal(Option<Vec<u8>>),
    Opt(Option<Box<Value>>),
    Vec(Vec<Value>),
    /// A `vec nat8`. Decoding always produces this form; encoding also
    /// accepts a [`Value::Vec`] of [`Value::Nat8`].
    Blob(Vec<u8>),
    Record(BTreeMap<u32, Value>),
    Variant(u32, Box<Value>),
    Service(Option<Vec<u8>>),
    Func(Option<FuncRef>),
    /// The opaque payload of a type this reader does not know.
    Future(Vec<u8>),
}

/// A concrete function reference: the service that hosts it and the method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FuncRef {
    pub service: Option<Vec<u8>>,
    pub method:  String,
}

impl Value {
    /// A record from `(name, value)` pairs; names are hashed to field ids.
    pub fn record<'n>(fields: impl IntoIterator<Item = (&'n str, Value)>) -> Value {
        Value::Record(
            fields
                .into_iter()
                .map(|(name, value)| (idl_hash(name), value))
                .collect(),
        )
    }

    /// A record whose fields are numbered by position.
    pub fn tuple(values: impl IntoIterator<Item = Value>) -> Value {
        Value::Record(
            values
                .into_iter()
                .enumerate()
                .map(|(i, value)| (i as u32, value))
                .collect(),
        )
    }

    /// The variant alternative `name` carrying `value`.
    pub fn variant(name: &str, value: Value) -> Value {
        Value::Variant(idl_hash(name), Box::new(value))
    }

    pub fn some(value: Value) -> Value {
        Value::Opt(Some(Box::new(value)))
    }

    pub fn none() -> Value {
        Value::Opt(None)
    }

    pub fn text(value: &str) -> Value {
        Value::Text(value.to_owned())
    }

    pub fn nat(value: u64) -> Value {
        Value::Nat(BigUint::from(value))
    }

    pub fn int(value: i64) -> Value {
        Value::Int(BigInt::from(value))
    }

    /// A convenience method to extract the value out of a [Bool](#variant.Bool).
    /// Returns `None` for other value kinds.
    pub fn as_bool(&self) -> Option<bool> {
        match *self {
            Value::Bool(value) => Some(value),
            _ => None,
        }
    }

    /// A convenience method to extract the value out of a [Text](#variant.Text).
    pub fn as_text(&self) -> Option<&str> {
        match *self {
            Value::Text(ref value) => Some(value.as_str()),
            _ => None,
        }
    }

    pub fn as_nat(&self) -> Option<&BigUint> {
        match *self {
            Value::Nat(ref value) => Some(value),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<&BigInt> {
        match *self {
            Value::Int(ref value) => Some(value),
            _ => None,
        }
    }

    /// A convenience method to get the elements of a [Vec](#variant.Vec).
    /// Returns an empty slice for other value kinds.
    pub fn as_vec(&self) -> &[Value] {
        match *self {
            Value::Vec(ref values) => values.as_slice(),
            _ => &[],
        }
    }

    /// A convenience method to extract a field out of a [Record](#variant.Record)
    /// by its name. Returns `None` for other value kinds or if the field isn't
    /// present.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.get_id(idl_hash(name))
    }

    /// Like [get](#method.get), by numeric field id.
    pub fn get_id(&self, id: u32) -> Option<&Value> {
        match *self {
            Value::Record(ref fields) => fields.get(&id),
            _ => None,
        }
    }

    /// A convenience method to update a field on a [Record](#variant.Record).
    /// Does nothing for other value kinds.
    pub fn set(&mut self, name: &str, value: Value) {
        if let Value::Record(ref mut fields) = *self {
            fields.insert(idl_hash(name), value);
        }
    }

    /// The length of a [Vec](#variant.Vec), [Blob](#variant.Blob) or
    /// [Text](#variant.Text). Returns `0` for other value kinds.
    pub fn len(&self) -> usize {
        match *self {
            Value::Vec(ref values) => values.len(),
            Value::Blob(ref bytes) => bytes.len(),
            Value::Text(ref text) => text.len(),
            _ => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// A convenience method to append to a [Vec](#variant.Vec). Does nothing
    /// for other value kinds.
    pub fn push(&mut self, value: Value) {
        if let Value::Vec(ref mut values) = *self {
            values.push(value);
        }
    }

    /// Short name of the value's kind, used in error messages.
    pub fn kind(&self) -> &'static str {
        match *self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Nat(_) => "nat",
            Value::Int(_) => "int",
            Value::Nat8(_) => "nat8",
            Value::Nat16(_) => "nat16",
            Value::Nat32(_) => "nat32",
            Value::Nat64(_) => "nat64",
            Value::Int8(_) => "int8",
            Value::Int16(_) => "int16",
            Value::Int32(_) => "int32",
            Value::Int64(_) => "int64",
            Value::Float32(_) => "float32",
            Value::Float64(_) => "float64",
            Value::Text(_) => "text",
            Value::Reserved => "reserved",
            Value::Principal(_) => "principal",
            Value::Opt(_) => "opt",
            Value::Vec(_) => "vec",
            Value::Blob(_) => "blob",
            Value::Record(_) => "record",
            Value::Variant(..) => "variant",
            Value::Service(_) => "service",
            Value::Func(_) => "func",
            Value::Future(_) => "future",
        }
    }

    /// Decodes a value of type `ty` from `bytes`, which must hold exactly one
    /// payload and nothing else.
    pub fn decode(table: &TypeTable, ty: &Type, bytes: &[u8]) -> Result<Value, WireError> {
        let mut bb = ByteBuffer::new(bytes);
        let value = Value::decode_bb(table, ty, &mut bb)?;
        match bb.remaining() {
            0 => Ok(value),
            extra => Err(WireError::TrailingBytes(extra)),
        }
    }

    /// Encodes this value's payload as type `ty`. The output buffer is sized
    /// up front with [size_bytes](#method.size_bytes).
    pub fn encode(&self, table: &TypeTable, ty: &Type) -> Result<Vec<u8>, WireError> {
        let mut bb = ByteBufferMut::with_capacity(self.size_bytes(table, ty)?);
        self.encode_bb(table, ty, &mut bb)?;
        Ok(bb.data())
    }

    /// Decodes a value of type `ty` from `bb` starting at the current index.
    /// After this function returns, the current index will be advanced by the
    /// amount of data that was successfully parsed.
    pub fn decode_bb(table: &TypeTable, ty: &Type, bb: &mut ByteBuffer) -> Result<Value, WireError> {
        Decoder::new(table).decode(ty, bb)
    }

    /// Encodes the current value to the end of `bb` as type `ty`. Named
    /// references in `ty` are resolved through `table`.
    pub fn encode_bb(&self, table: &TypeTable, ty: &Type, bb: &mut ByteBufferMut) -> Result<(), WireError> {
        let ty = table.follow(ty)?;
        match (ty, self) {
            (Type::Reserved, _) => {}
            (Type::Empty, _) => return Err(WireError::EmptySerialization),
            (Type::Null, Value::Null) => {}
            (Type::Bool, Value::Bool(value)) => bb.write_bool(*value),
            (Type::Nat, Value::Nat(value)) => bb.write_nat(value),
            (Type::Int, Value::Int(value)) => bb.write_int(value),
            (Type::Nat8, Value::Nat8(value)) => bb.write_byte(*value),
            (Type::Nat16, Value::Nat16(value)) => bb.write_u16(*value),
            (Type::Nat32, Value::Nat32(value)) => bb.write_u32(*value),
            (Type::Nat64, Value::Nat64(value)) => bb.write_u64(*value),
            (Type::Int8, Value::Int8(value)) => bb.write_i8(*value),
            (Type::Int16, Value::Int16(value)) => bb.write_i16(*value),
            (Type::Int32, Value::Int32(value)) => bb.write_i32(*value),
            (Type::Int64, Value::Int64(value)) => bb.write_i64(*value),
            (Type::Float32, Value::Float32(value)) => bb.write_f32(*value),
            (Type::Float64, Value::Float64(value)) => bb.write_f64(*value),
            (Type::Text, Value::Text(value)) => bb.write_text(value),
            (Type::Principal, Value::Principal(id)) | (Type::Service(_), Value::Service(id)) => {
                write_reference(id.as_deref(), bb)
            }
            (Type::Func(_), Value::Func(func)) => match func {
                Some(func) => {
                    bb.write_byte(1);
                    write_reference(func.service.as_deref(), bb);
                    bb.write_text(&func.method);
                }
                None => bb.write_byte(0),
            },
            (Type::Opt(inner), Value::Opt(value)) => match value {
                Some(value) => {
                    bb.write_byte(1);
                    value.encode_bb(table, inner, bb)?;
                }
                None => bb.write_byte(0),
            },
            (Type::Vec(inner), Value::Blob(bytes)) if *table.follow(inner)? == Type::Nat8 => {
                bb.write_blob(bytes)
            }
            (Type::Vec(inner), Value::Vec(values)) => {
                bb.write_var_uint(values.len() as u64);
                for value in values {
                    value.encode_bb(table, inner, bb)?;
                }
            }
            (Type::Record(fields), Value::Record(values)) => {
                for field in record_fields(fields, values)? {
                    let value = values.get(&field.id).ok_or(WireError::MissingField(field.id))?;
                    value.encode_bb(table, &field.ty, bb)?;
                }
            }
            (Type::Variant(fields), Value::Variant(id, value)) => {
                let field = variant_field(fields, *id)
                    .ok_or_else(|| WireError::mismatch(ty, format!("variant tag {}", id)))?;
                bb.write_var_uint(*id as u64);
                value.encode_bb(table, &field.ty, bb)?;
            }
            (Type::Future { .. }, Value::Future(bytes)) => bb.write_blob(bytes),
            (ty, value) => return Err(WireError::mismatch(ty, value.kind())),
        }
        Ok(())
    }

    /// The exact number of bytes [encode_bb](#method.encode_bb) writes for
    /// this value as type `ty`.
    pub fn size_bytes(&self, table: &TypeTable, ty: &Type) -> Result<usize, WireError> {
        let ty = table.follow(ty)?;
        let size = match (ty, self) {
            (Type::Reserved, _) => 0,
            (Type::Empty, _) => return Err(WireError::EmptySerialization),
            (Type::Null, Value::Null) => 0,
            (Type::Bool, Value::Bool(_)) => 1,
            (Type::Nat, Value::Nat(value)) => bb::size_nat(value),
            (Type::Int, Value::Int(value)) => bb::size_int(value),
            (Type::Nat8, Value::Nat8(_)) | (Type::Int8, Value::Int8(_)) => 1,
            (Type::Nat16, Value::Nat16(_)) | (Type::Int16, Value::Int16(_)) => 2,
            (Type::Nat32, Value::Nat32(_)) | (Type::Int32, Value::Int32(_)) => 4,
            (Type::Float32, Value::Float32(_)) => 4,
            (Type::Nat64, Value::Nat64(_)) | (Type::Int64, Value::Int64(_)) => 8,
            (Type::Float64, Value::Float64(_)) => 8,
            (Type::Text, Value::Text(value)) => size_blob(value.len()),
            (Type::Principal, Value::Principal(id)) | (Type::Service(_), Value::Service(id)) => {
                size_reference(id.as_deref())
            }
            (Type::Func(_), Value::Func(func)) => match func {
                Some(func) => 1 + size_reference(func.service.as_deref()) + size_blob(func.method.len()),
                None => 1,
            },
            (Type::Opt(inner), Value::Opt(value)) => match value {
                Some(value) => 1 + value.size_bytes(table, inner)?,
                None => 1,
            },
            (Type::Vec(inner), Value::Blob(bytes)) if *table.follow(inner)? == Type::Nat8 => {
                size_blob(bytes.len())
            }
            (Type::Vec(inner), Value::Vec(values)) => {
                let mut size = bb::size_var_uint(values.len() as u64);
                for value in values {
                    size += value.size_bytes(table, inner)?;
                }
                size
            }
            (Type::Record(fields), Value::Record(values)) => {
                let mut size = 0;
                for field in record_fields(fields, values)? {
                    let value = values.get(&field.id).ok_or(WireError::MissingField(field.id))?;
                    size += value.size_bytes(table, &field.ty)?;
                }
                size
            }
            (Type::Variant(fields), Value::Variant(id, value)) => {
                let field = variant_field(fields, *id)
                    .ok_or_else(|| WireError::mismatch(ty, format!("variant tag {}", id)))?;
                bb::size_var_uint(*id as u64) + value.size_bytes(table, &field.ty)?
            }
            (Type::Future { .. }, Value::Future(bytes)) => size_blob(bytes.len()),
            (ty, value) => return Err(WireError::mismatch(ty, value.kind())),
        };
        Ok(size)
    }
}

/// The fields of a record in ascending id order, after checking that `values`
/// holds nothing the type doesn't declare.
fn record_fields<'t>(fields: &'t [Field], values: &BTreeMap<u32, Value>) -> Result<Vec<&'t Field>, WireError> {
    if let Some(extra) = values.keys().find(|id| !fields.iter().any(|field| field.id == **id)) {
        return Err(WireError::mismatch(
            Type::Record(fields.to_vec()),
            format!("record with extra field {}", extra),
        ));
    }
    let mut sorted: Vec<&Field> = fields.iter().collect();
    sorted.sort_by_key(|field| field.id);
    Ok(sorted)
}

fn variant_field(fields: &[Field], id: u32) -> Option<&Field> {
    fields.iter().find(|field| field.id == id)
}

fn size_blob(len: usize) -> usize {
    bb::size_var_uint(len as u64) + len
}

fn size_reference(id: Option<&[u8]>) -> usize {
    match id {
        Some(id) => 1 + size_blob(id.len()),
        None => 1,
    }
}

fn write_reference(id: Option<&[u8]>, bb: &mut ByteBufferMut) {
    match id {
        Some(id) => {
            bb.write_byte(1);
            bb.write_blob(id);
        }
        None => bb.write_byte(0),
    }
}

fn read_reference(bb: &mut ByteBuffer) -> Result<Option<Vec<u8>>, WireError> {
    if bb.read_presence()? {
        Ok(Some(bb.read_blob()?.to_vec()))
    } else {
        Ok(None)
    }
}

/// Reads payloads against one table. The zero-size element allowance is
/// shared by everything read through the same decoder.
pub(crate) struct Decoder<'t> {
    table:      &'t TypeTable,
    zero_sized: u64,
}

impl<'t> Decoder<'t> {
    pub(crate) fn new(table: &'t TypeTable) -> Decoder<'t> {
        Decoder { table, zero_sized: MAX_ZERO_SIZED_ELEMENTS }
    }

    pub(crate) fn decode(&mut self, ty: &Type, bb: &mut ByteBuffer) -> Result<Value, WireError> {
        self.decode_at(ty, bb, 0)
    }

    fn decode_at(&mut self, ty: &Type, bb: &mut ByteBuffer, depth: usize) -> Result<Value, WireError> {
        if depth > MAX_DECODE_DEPTH {
            return Err(WireError::RecursionLimit);
        }
        let table = self.table;
        let value = match table.follow(ty)? {
            Type::Null => Value::Null,
            Type::Reserved => Value::Reserved,
            Type::Empty => return Err(WireError::EmptySerialization),
            Type::Bool => Value::Bool(bb.read_bool()?),
            Type::Nat => Value::Nat(bb.read_nat()?),
            Type::Int => Value::Int(bb.read_int()?),
            Type::Nat8 => Value::Nat8(bb.read_byte()?),
            Type::Nat16 => Value::Nat16(bb.read_u16()?),
            Type::Nat32 => Value::Nat32(bb.read_u32()?),
            Type::Nat64 => Value::Nat64(bb.read_u64()?),
            Type::Int8 => Value::Int8(bb.read_i8()?),
            Type::Int16 => Value::Int16(bb.read_i16()?),
            Type::Int32 => Value::Int32(bb.read_i32()?),
            Type::Int64 => Value::Int64(bb.read_i64()?),
            Type::Float32 => Value::Float32(bb.read_f32()?),
            Type::Float64 => Value::Float64(bb.read_f64()?),
            Type::Text => Value::Text(bb.read_text()?.to_owned()),
            Type::Principal => Value::Principal(read_reference(bb)?),
            Type::Service(_) => Value::Service(read_reference(bb)?),
            Type::Func(_) => {
                if bb.read_presence()? {
                    let service = read_reference(bb)?;
                    let method = bb.read_text()?.to_owned();
                    Value::Func(Some(FuncRef { service, method }))
                } else {
                    Value::Func(None)
                }
            }
            Type::Opt(inner) => {
                if bb.read_presence()? {
                    Value::Opt(Some(Box::new(self.decode_at(inner, bb, depth + 1)?)))
                } else {
                    Value::Opt(None)
                }
            }
            Type::Vec(inner) if *table.follow(inner)? == Type::Nat8 => {
                Value::Blob(bb.read_blob()?.to_vec())
            }
            Type::Vec(inner) => {
                let count = bb.read_var_uint()?;
                if is_zero_sized(table, inner, 0)? {
                    self.zero_sized = self
                        .zero_sized
                        .checked_sub(count)
                        .ok_or(WireError::TooManyElements(MAX_ZERO_SIZED_ELEMENTS))?;
                } else if count > bb.remaining() as u64 {
                    return Err(WireError::UnexpectedEof);
                }
                let mut values = Vec::with_capacity((count as usize).min(bb.remaining()));
                for _ in 0..count {
                    values.push(self.decode_at(inner, bb, depth + 1)?);
                }
                Value::Vec(values)
            }
            Type::Record(fields) => {
                let mut sorted: Vec<&Field> = fields.iter().collect();
                sorted.sort_by_key(|field| field.id);
                let mut values = BTreeMap::new();
                for field in sorted {
                    values.insert(field.id, self.decode_at(&field.ty, bb, depth + 1)?);
                }
                Value::Record(values)
            }
            Type::Variant(fields) => {
                let tag = bb.read_var_uint()?;
                let field = u32::try_from(tag)
                    .ok()
                    .and_then(|id| variant_field(fields, id))
                    .ok_or(WireError::InvalidVariantTag(tag))?;
                Value::Variant(field.id, Box::new(self.decode_at(&field.ty, bb, depth + 1)?))
            }
            Type::Future { .. } => Value::Future(bb.read_blob()?.to_vec()),
            Type::Id(name) => return Err(WireError::UnresolvedName(name.clone())),
        };
        Ok(value)
    }
}

/// Whether every value of `ty` encodes to zero bytes.
fn is_zero_sized(table: &TypeTable, ty: &Type, depth: usize) -> Result<bool, WireError> {
    if depth > MAX_DECODE_DEPTH {
        return Ok(false);
    }
    match table.follow(ty)? {
        Type::Null | Type::Reserved => Ok(true),
        Type::Record(fields) => {
            for field in fields {
                if !is_zero_sized(table, &field.ty, depth + 1)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        _ => Ok(false),
    }
}

impl Index<usize> for Value {
    type Output = Value;

    /// A convenience method that adds support for `self[index]` expressions.
    /// It will panic if this value isn't a [Vec](#variant.Vec) or if the
    /// provided index is out of bounds.
    fn index(&self, index: usize) -> &Value {
        match *self {
            Value::Vec(ref values) => &values[index],
            _ => panic!("cannot index into a {} value", self.kind()),
        }
    }
}

fn write_bytes_literal(f: &mut fmt::Formatter, bytes: &[u8]) -> fmt::Result {
    f.write_str("blob \"")?;
    for byte in bytes {
        write!(f, "\\{:02x}", byte)?;
    }
    f.write_str("\"")
}

/// Renders the value in IDL value syntax, with fields shown by id.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Value::Null => f.write_str("null"),
            Value::Bool(value) => write!(f, "{}", value),
            Value::Nat(ref value) => write!(f, "{}", value),
            Value::Int(ref value) => write!(f, "{}", value),
            Value::Nat8(value) => write!(f, "{} : nat8", value),
            Value::Nat16(value) => write!(f, "{} : nat16", value),
            Value::Nat32(value) => write!(f, "{} : nat32", value),
            Value::Nat64(value) => write!(f, "{} : nat64", value),
            Value::Int8(value) => write!(f, "{} : int8", value),
            Value::Int16(value) => write!(f, "{} : int16", value),
            Value::Int32(value) => write!(f, "{} : int32", value),
            Value::Int64(value) => write!(f, "{} : int64", value),
            Value::Float32(value) => write!(f, "{} : float32", value),
            Value::Float64(value) => write!(f, "{} : float64", value),
            Value::Text(ref value) => write!(f, "{:?}", value),
            Value::Reserved => f.write_str("reserved"),
            Value::Principal(Some(ref id)) => {
                f.write_str("principal ")?;
                write_bytes_literal(f, id)
            }
            Value::Principal(None) | Value::Service(None) | Value::Func(None) => f.write_str("opaque"),
            Value::Service(Some(ref id)) => {
                f.write_str("service ")?;
                write_bytes_literal(f, id)
            }
            Value::Func(Some(ref func)) => write!(f, "func {:?}.{}", func.service, func.method),
            Value::Opt(None) => f.write_str("null"),
            Value::Opt(Some(ref value)) => write!(f, "opt {}", value),
            Value::Vec(ref values) => {
                f.write_str("vec {")?;
                for value in values {
                    write!(f, " {};", value)?;
                }
                f.write_str(" }")
            }
            Value::Blob(ref bytes) | Value::Future(ref bytes) => write_bytes_literal(f, bytes),
            Value::Record(ref fields) => {
                f.write_str("record {")?;
                for (id, value) in fields {
                    write!(f, " {} = {};", id, value)?;
                }
                f.write_str(" }")
            }
            Value::Variant(id, ref value) => write!(f, "variant {{ {} = {} }}", id, value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::TypeTableBuilder;

    fn encode(value: &Value, ty: &Type) -> Vec<u8> {
        let bytes = value.encode(&TypeTable::new(), ty).unwrap();
        assert_eq!(bytes.len(), value.size_bytes(&TypeTable::new(), ty).unwrap());
        bytes
    }

    fn decode(ty: &Type, bytes: &[u8]) -> Result<Value, WireError> {
        Value::decode(&TypeTable::new(), ty, bytes)
    }

    #[test]
    fn value_basic() {
        let mut value = Value::Vec(vec![]);
        assert!(value.is_empty());
        value.push(Value::Bool(true));
        value.push(Value::text("abc"));
        assert_eq!(value.len(), 2);
        assert_eq!(value[0].as_bool(), Some(true));
        assert_eq!(value[1].as_text(), Some("abc"));

        let mut record = Value::record([("x", Value::nat(1))]);
        assert_eq!(record.get("x"), Some(&Value::nat(1)));
        assert_eq!(record.get("y"), None);
        record.set("y", Value::int(-2));
        assert_eq!(record.get_id(idl_hash("y")), Some(&Value::int(-2)));
        assert_eq!(record.to_string(), format!("record {{ {} = 1; {} = -2; }}", idl_hash("x"), idl_hash("y")));
    }

    #[test]
    fn primitive_payloads() {
        assert_eq!(encode(&Value::nat(42), &Type::Nat), [0x2a]);
        assert_eq!(encode(&Value::int(-1), &Type::Int), [0x7f]);
        assert_eq!(encode(&Value::Bool(true), &Type::Bool), [1]);
        assert_eq!(encode(&Value::Null, &Type::Null), [0u8; 0]);
        assert_eq!(encode(&Value::Nat16(0x1234), &Type::Nat16), [0x34, 0x12]);
        assert_eq!(encode(&Value::Int64(-2), &Type::Int64), [0xfe, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff]);
        assert_eq!(encode(&Value::Float32(1.0), &Type::Float32), [0x00, 0x00, 0x80, 0x3f]);
        assert_eq!(encode(&Value::text("hi"), &Type::Text), [2, b'h', b'i']);

        assert_eq!(decode(&Type::Nat, &[0x2a]), Ok(Value::nat(42)));
        assert_eq!(decode(&Type::Int, &[0x7f]), Ok(Value::int(-1)));
        assert_eq!(decode(&Type::Float64, &[0, 0, 0, 0, 0, 0, 0xf0, 0x3f]), Ok(Value::Float64(1.0)));
    }

    #[test]
    fn reserved_accepts_anything_and_writes_nothing() {
        assert_eq!(encode(&Value::text("ignored"), &Type::Reserved), [0u8; 0]);
        assert_eq!(decode(&Type::Reserved, &[]), Ok(Value::Reserved));
    }

    #[test]
    fn empty_cannot_be_written_or_read() {
        assert_eq!(
            Value::Null.encode(&TypeTable::new(), &Type::Empty),
            Err(WireError::EmptySerialization)
        );
        assert_eq!(decode(&Type::Empty, &[]), Err(WireError::EmptySerialization));
    }

    #[test]
    fn invalid_discriminants() {
        assert_eq!(decode(&Type::Bool, &[2]), Err(WireError::InvalidBoolean(2)));
        assert_eq!(decode(&Type::opt(Type::Nat), &[7]), Err(WireError::InvalidPresenceFlag(7)));
        assert_eq!(decode(&Type::Principal, &[9]), Err(WireError::InvalidPresenceFlag(9)));
        assert_eq!(decode(&Type::Nat, &[0x2a, 0x00]), Err(WireError::TrailingBytes(1)));
    }

    #[test]
    fn opt_and_vec() {
        let ty = Type::vec(Type::opt(Type::Nat8));
        let value = Value::Vec(vec![Value::some(Value::Nat8(5)), Value::none()]);
        assert_eq!(encode(&value, &ty), [2, 1, 5, 0]);
        assert_eq!(decode(&ty, &[2, 1, 5, 0]), Ok(value));
    }

    #[test]
    fn blob_forms() {
        let bytes = vec![0xde, 0xad];
        assert_eq!(encode(&Value::Blob(bytes.clone()), &Type::blob()), [2, 0xde, 0xad]);
        assert_eq!(
            encode(&Value::Vec(vec![Value::Nat8(0xde), Value::Nat8(0xad)]), &Type::blob()),
            [2, 0xde, 0xad]
        );
        assert_eq!(decode(&Type::blob(), &[2, 0xde, 0xad]), Ok(Value::Blob(bytes)));
    }

    #[test]
    fn records_serialize_in_id_order() {
        let ty = Type::Record(vec![Field::new(5, Type::Nat8), Field::new(1, Type::Bool)]);
        let value = Value::Record(BTreeMap::from([(5, Value::Nat8(9)), (1, Value::Bool(true))]));
        assert_eq!(encode(&value, &ty), [1, 9]);
        assert_eq!(decode(&ty, &[1, 9]), Ok(value));

        let missing = Value::Record(BTreeMap::from([(5, Value::Nat8(9))]));
        assert_eq!(missing.encode(&TypeTable::new(), &ty), Err(WireError::MissingField(1)));

        let extra = Value::Record(BTreeMap::from([(1, Value::Bool(true)), (5, Value::Nat8(9)), (7, Value::Null)]));
        assert!(matches!(extra.encode(&TypeTable::new(), &ty), Err(WireError::TypeMismatch { .. })));
    }

    #[test]
    fn recursive_list_payload() {
        let mut builder = TypeTableBuilder::new();
        let body = Type::record(vec![
            Field::named("head", Type::Int),
            Field::named("tail", Type::opt(Type::id("List"))),
        ]);
        builder.register_type_with_label("List", &body).unwrap();
        let table = builder.freeze();

        let single = Value::record([("head", Value::int(1)), ("tail", Value::none())]);
        assert_eq!(single.encode(&table, &Type::id("List")).unwrap(), [0x01, 0x00]);

        let pair = Value::record([("head", Value::int(2)), ("tail", Value::some(single.clone()))]);
        let bytes = pair.encode(&table, &Type::id("List")).unwrap();
        assert_eq!(bytes, [0x02, 0x01, 0x01, 0x00]);
        assert_eq!(pair.size_bytes(&table, &Type::id("List")), Ok(4));
        assert_eq!(Value::decode(&table, &Type::id("List"), &bytes), Ok(pair));
    }

    #[test]
    fn variant_writes_field_id() {
        let ty = Type::variant(vec![Field::named("A", Type::Null), Field::named("B", Type::Null)]);
        let a = Value::variant("A", Value::Null);
        let mut expected = ByteBufferMut::new();
        expected.write_var_uint(idl_hash("A") as u64);
        assert_eq!(encode(&a, &ty), expected.data());
        assert_eq!(decode(&ty, &[0x41]), Ok(a));
        assert_eq!(decode(&ty, &[0x43]), Err(WireError::InvalidVariantTag(0x43)));

        let unknown = Value::variant("C", Value::Null);
        assert!(matches!(unknown.encode(&TypeTable::new(), &ty), Err(WireError::TypeMismatch { .. })));
    }

    #[test]
    fn references() {
        let principal = Value::Principal(Some(vec![0x04]));
        assert_eq!(encode(&principal, &Type::Principal), [1, 1, 4]);
        assert_eq!(encode(&Value::Principal(None), &Type::Principal), [0]);

        let func_ty = Type::Func(crate::types::FuncType { args: vec![], rets: vec![], modes: vec![] });
        let func = Value::Func(Some(FuncRef { service: Some(vec![0xab]), method: "go".to_owned() }));
        let bytes = encode(&func, &func_ty);
        assert_eq!(bytes, [1, 1, 1, 0xab, 2, b'g', b'o']);
        assert_eq!(decode(&func_ty, &bytes), Ok(func));

        let service_ty = Type::service(vec![]);
        assert_eq!(encode(&Value::Service(Some(vec![1, 2])), &service_ty), [1, 2, 1, 2]);
    }

    #[test]
    fn mismatched_values_fail_loudly() {
        assert_eq!(
            Value::Bool(true).encode(&TypeTable::new(), &Type::Nat),
            Err(WireError::TypeMismatch { expected: "nat".to_owned(), found: "bool".to_owned() })
        );
        assert_eq!(
            Value::Null.encode(&TypeTable::new(), &Type::id("Nowhere")),
            Err(WireError::UnresolvedName("Nowhere".to_owned()))
        );
    }

    #[test]
    fn deep_nesting_is_bounded() {
        let mut builder = TypeTableBuilder::new();
        builder.register_type_with_label("Deep", &Type::opt(Type::id("Deep"))).unwrap();
        let table = builder.freeze();
        let bytes = vec![1u8; MAX_DECODE_DEPTH + 10];
        assert_eq!(
            Value::decode(&table, &Type::id("Deep"), &bytes),
            Err(WireError::RecursionLimit)
        );
    }

    #[test]
    fn huge_vec_counts_are_rejected() {
        let bytes = [0xff, 0xff, 0xff, 0xff, 0x0f];
        assert_eq!(
            decode(&Type::vec(Type::Null), &bytes),
            Err(WireError::TooManyElements(MAX_ZERO_SIZED_ELEMENTS))
        );
        assert_eq!(decode(&Type::vec(Type::Bool), &bytes), Err(WireError::UnexpectedEof));
        assert_eq!(
            decode(&Type::vec(Type::Null), &[3]),
            Ok(Value::Vec(vec![Value::Null, Value::Null, Value::Null]))
        );
    }

    #[test]
    fn long_zero_sized_vecs_round_trip() {
        let unit = Type::record(vec![Field::new(0, Type::Null), Field::new(1, Type::Reserved)]);
        let cases = [
            (Type::vec(Type::Null), Value::Null),
            (Type::vec(Type::Reserved), Value::Reserved),
            (Type::vec(unit), Value::tuple([Value::Null, Value::Reserved])),
        ];
        for (ty, element) in cases {
            let value = Value::Vec(vec![element; 70_000]);
            let bytes = encode(&value, &ty);
            assert_eq!(bytes.len(), 3);
            assert_eq!(decode(&ty, &bytes), Ok(value));
        }
    }
}
