//! brine-idl
//!
//! This crate bundles the IDL compiler with the `DIDL` runtime.
//!
//! - `compile_idl` / `load_idl_file` (re-exported from the compiler)
//! - `encode` / `decode` / `decode_as` and the `Value` model (re-exported from the schema crate)
//! - JSON rendering of decoded messages and of type descriptors

use num_traits::ToPrimitive;
use serde_json::{json, Map, Value as Json};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

pub use brine_idl_compiler::{compile_idl, compile_idl_with, CompiledActor, CompiledIdl, IdlError};
pub use brine_idl_schema::{
    decode, decode_as, decode_one, decode_with_table, encode, encode_one, idl_hash, Field, FuncMode,
    FuncRef, FuncType, IdlType, Method, Type, TypeTable, TypeTableBuilder, Value, WireError,
};

/// Compiles the file at `path`, reading imports relative to the importing
/// file.
pub fn load_idl_file(path: impl AsRef<Path>) -> Result<CompiledIdl, IdlError> {
    let path = path.as_ref();
    let text = fs::read_to_string(path)?;
    let root = path.parent().map(Path::to_path_buf).unwrap_or_default();

    // Imports name paths relative to the file that contains them; remember
    // the directory each loaded file lives in so nested imports resolve too.
    let mut dirs: Vec<PathBuf> = vec![root];
    let mut seen = HashSet::new();
    compile_idl_with(&text, |import| {
        let candidates: Vec<PathBuf> = dirs.iter().rev().map(|dir| dir.join(import)).collect();
        let found = candidates
            .into_iter()
            .find(|candidate| candidate.is_file())
            .ok_or_else(|| IdlError::ImportError(format!("Cannot find {}", import)))?;
        if seen.insert(found.clone()) {
            if let Some(dir) = found.parent() {
                dirs.push(dir.to_path_buf());
            }
        }
        Ok(fs::read_to_string(&found)?)
    })
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|byte| format!("{:02x}", byte)).collect()
}

fn reference(id: &Option<Vec<u8>>) -> Json {
    match id {
        Some(id) => Json::String(hex(id)),
        None => Json::Null,
    }
}

fn field_key(field: &Field) -> String {
    match &field.name {
        Some(name) => name.clone(),
        None => field.id.to_string(),
    }
}

/// Renders `value` as JSON, using the field names `ty` carries.
///
/// Big numbers that do not fit 64 bits become decimal strings. Byte strings
/// and references become lowercase hex. `opt` renders as an empty or a
/// one-element array, so nested options stay distinguishable.
pub fn value_to_json(table: &TypeTable, ty: &Type, value: &Value) -> Result<Json, IdlError> {
    let ty = table.follow(ty)?;
    let json = match (ty, value) {
        (_, Value::Null) | (_, Value::Reserved) => Json::Null,
        (_, Value::Bool(value)) => json!(value),
        (_, Value::Nat(value)) => match value.to_u64() {
            Some(small) => json!(small),
            None => Json::String(value.to_string()),
        },
        (_, Value::Int(value)) => match value.to_i64() {
            Some(small) => json!(small),
            None => Json::String(value.to_string()),
        },
        (_, Value::Nat8(value)) => json!(value),
        (_, Value::Nat16(value)) => json!(value),
        (_, Value::Nat32(value)) => json!(value),
        (_, Value::Nat64(value)) => json!(value),
        (_, Value::Int8(value)) => json!(value),
        (_, Value::Int16(value)) => json!(value),
        (_, Value::Int32(value)) => json!(value),
        (_, Value::Int64(value)) => json!(value),
        (_, Value::Float32(value)) => json!(value),
        (_, Value::Float64(value)) => json!(value),
        (_, Value::Text(value)) => json!(value),
        (_, Value::Blob(bytes)) | (_, Value::Future(bytes)) => Json::String(hex(bytes)),
        (_, Value::Principal(id)) | (_, Value::Service(id)) => reference(id),
        (_, Value::Func(None)) => Json::Null,
        (_, Value::Func(Some(func))) => json!({
            "service": reference(&func.service),
            "method": func.method,
        }),
        (Type::Opt(inner), Value::Opt(value)) => match value {
            Some(value) => Json::Array(vec![value_to_json(table, inner, value)?]),
            None => Json::Array(vec![]),
        },
        (Type::Vec(inner), Value::Vec(values)) => {
            let mut items = Vec::with_capacity(values.len());
            for value in values {
                items.push(value_to_json(table, inner, value)?);
            }
            Json::Array(items)
        }
        (Type::Record(fields), Value::Record(values)) => {
            let mut object = Map::new();
            for field in fields {
                if let Some(value) = values.get(&field.id) {
                    object.insert(field_key(field), value_to_json(table, &field.ty, value)?);
                }
            }
            Json::Object(object)
        }
        (Type::Variant(fields), Value::Variant(id, value)) => {
            let field = fields
                .iter()
                .find(|field| field.id == *id)
                .ok_or(WireError::InvalidVariantTag(*id as u64))?;
            let mut object = Map::new();
            object.insert(field_key(field), value_to_json(table, &field.ty, value)?);
            Json::Object(object)
        }
        (ty, value) => {
            return Err(WireError::TypeMismatch {
                expected: ty.to_string(),
                found:    value.kind().to_owned(),
            }
            .into())
        }
    };
    Ok(json)
}

fn message_to_json(table: &TypeTable, args: &[(Type, Value)]) -> Result<Json, IdlError> {
    let mut items = Vec::with_capacity(args.len());
    for (ty, value) in args {
        items.push(json!({
            "type": ty.to_string(),
            "value": value_to_json(table, ty, value)?,
        }));
    }
    Ok(Json::Array(items))
}

/// Decode a `DIDL` message into a pretty-printed JSON string.
///
/// Wire types carry no field names, so record and variant keys are numeric
/// ids. Use [`decode_to_json_as`] to render with the names of known types.
pub fn decode_to_json(buffer: &[u8]) -> Result<String, IdlError> {
    let (table, args) = decode_with_table(buffer)?;
    Ok(serde_json::to_string_pretty(&message_to_json(&table, &args)?)?)
}

/// Like [`decode_to_json`], checking the message against `expected` types
/// (resolved in `env`) and rendering with their field names.
pub fn decode_to_json_as(env: &TypeTable, expected: &[Type], buffer: &[u8]) -> Result<String, IdlError> {
    let values = decode_as(env, expected, buffer)?;
    let args: Vec<(Type, Value)> = expected.iter().cloned().zip(values).collect();
    Ok(serde_json::to_string_pretty(&message_to_json(env, &args)?)?)
}

/// Serialize type descriptors into a pretty-printed JSON string.
pub fn types_to_json(types: &[Type]) -> Result<String, IdlError> {
    Ok(serde_json::to_string_pretty(types)?)
}

pub mod compiler {
    pub use brine_idl_compiler::*;
}

pub mod schema {
    pub use brine_idl_schema::*;
}
