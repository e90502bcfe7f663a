//! Whole messages: the `DIDL` prelude followed by one payload per argument.

use crate::{
    bb::{ByteBuffer, ByteBufferMut},
    error::WireError,
    table::{TypeTable, TypeTableBuilder},
    types::Type,
    value::{Decoder, Value},
    wire,
};
use log::debug;

/// Encodes `values` as a message whose arguments have the given `types`.
///
/// Named references in `types` are looked up in `env`. Only the labels the
/// arguments actually depend on are copied into the message's own table, so
/// the prelude stays minimal.
pub fn encode(env: &TypeTable, types: &[Type], values: &[Value]) -> Result<Vec<u8>, WireError> {
    if types.len() != values.len() {
        return Err(WireError::mismatch(
            format!("{} arguments", types.len()),
            format!("{} values", values.len()),
        ));
    }

    let mut builder = TypeTableBuilder::new();
    for ty in types {
        env.copy_labels_for_type(ty, &mut builder)?;
    }
    let mut codes = Vec::with_capacity(types.len());
    for ty in types {
        codes.push(builder.register_type(ty)?);
    }
    let table = builder.freeze();

    let mut prelude = ByteBufferMut::new();
    wire::write_prelude(&table, &codes, &mut prelude)?;

    let mut size = prelude.len();
    for (ty, value) in types.iter().zip(values) {
        size += value.size_bytes(&table, ty)?;
    }
    let mut bb = ByteBufferMut::with_capacity(size);
    bb.write_bytes(&prelude.data());
    for (ty, value) in types.iter().zip(values) {
        value.encode_bb(&table, ty, &mut bb)?;
    }

    debug!("encoded {} arguments into {} bytes", types.len(), bb.len());
    Ok(bb.data())
}

/// Decodes a self-describing message into its argument types and values.
///
/// The returned types refer to the message's own table through
/// [`wire::table_label`] names where they are recursive; use
/// [`decode_with_table`] to keep that table.
pub fn decode(bytes: &[u8]) -> Result<Vec<(Type, Value)>, WireError> {
    let (_, args) = decode_with_table(bytes)?;
    Ok(args)
}

/// Like [`decode`], also returning the table rebuilt from the prelude.
pub fn decode_with_table(bytes: &[u8]) -> Result<(TypeTable, Vec<(Type, Value)>), WireError> {
    let mut bb = ByteBuffer::new(bytes);
    let (table, types) = wire::read_prelude(&mut bb)?;

    let mut decoder = Decoder::new(&table);
    let mut args = Vec::with_capacity(types.len());
    for ty in types {
        let value = decoder.decode(&ty, &mut bb)?;
        args.push((ty, value));
    }
    if bb.remaining() > 0 {
        return Err(WireError::TrailingBytes(bb.remaining()));
    }

    debug!("decoded {} arguments from {} bytes", args.len(), bytes.len());
    Ok((table, args))
}

/// Decodes a message whose arguments are expected to have `expected` types
/// (resolved against `env`).
///
/// Each wire type must be structurally equivalent to the expected one. An
/// expected `reserved` accepts any wire type and yields [`Value::Reserved`].
/// Expected types that are named references come back as-is, so the values
/// can be read against `env`.
pub fn decode_as(env: &TypeTable, expected: &[Type], bytes: &[u8]) -> Result<Vec<Value>, WireError> {
    let (table, args) = decode_with_table(bytes)?;
    if args.len() != expected.len() {
        return Err(WireError::mismatch(
            format!("{} arguments", expected.len()),
            format!("{} arguments", args.len()),
        ));
    }

    let mut values = Vec::with_capacity(args.len());
    for ((wire_ty, value), expected_ty) in args.into_iter().zip(expected) {
        if *env.follow(expected_ty)? == Type::Reserved {
            values.push(Value::Reserved);
            continue;
        }
        if !env.equivalent(expected_ty, &table, &wire_ty)? {
            return Err(WireError::mismatch(expected_ty, &wire_ty));
        }
        values.push(value);
    }
    Ok(values)
}
