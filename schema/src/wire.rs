//! The self-describing type prelude.
//!
//! ```text
//! "DIDL" leb(entry count) entry* leb(arg count) sleb(type code)*
//! ```
//!
//! Each entry is a signed opcode followed by its payload. Member types are
//! written as a signed code: negative for primitives, otherwise an index into
//! the entries. Indices may point forward, which is how recursive types are
//! expressed. Entries with an opcode this reader does not know are kept as
//! [`Type::Future`] as long as they carry a length-prefixed payload.

use crate::{
    bb::{ByteBuffer, ByteBufferMut},
    error::WireError,
    table::{TypeTable, TypeTableBuilder},
    types::{Field, FuncMode, FuncType, Method, Type},
    value::MAX_DECODE_DEPTH,
    MAGIC, TYPE_FUNC, TYPE_OPT, TYPE_RECORD, TYPE_SERVICE, TYPE_VARIANT, TYPE_VEC,
};
use log::debug;

/// Decoded subtrees larger than this are referenced by label instead of being
/// copied into every parent.
const MAX_INLINE_NODES: usize = 4096;

/// Writes the full prelude: magic, every entry of `table`, then `args`.
pub fn write_prelude(table: &TypeTable, args: &[i32], bb: &mut ByteBufferMut) -> Result<(), WireError> {
    bb.write_bytes(&MAGIC);
    bb.write_var_uint(table.len() as u64);
    for entry in table.entries() {
        write_entry(table, entry, bb)?;
    }
    bb.write_var_uint(args.len() as u64);
    for &code in args {
        bb.write_var_int(code as i64);
    }
    Ok(())
}

/// Writes one registry entry's type descriptor.
pub fn write_entry(table: &TypeTable, ty: &Type, bb: &mut ByteBufferMut) -> Result<(), WireError> {
    let member = |bb: &mut ByteBufferMut, ty: &Type| -> Result<(), WireError> {
        bb.write_var_int(table.type_code(ty)? as i64);
        Ok(())
    };

    match ty {
        Type::Opt(inner) => {
            bb.write_var_int(TYPE_OPT as i64);
            member(bb, inner)?;
        }
        Type::Vec(inner) => {
            bb.write_var_int(TYPE_VEC as i64);
            member(bb, inner)?;
        }
        Type::Record(fields) | Type::Variant(fields) => {
            let opcode = if matches!(ty, Type::Record(_)) { TYPE_RECORD } else { TYPE_VARIANT };
            bb.write_var_int(opcode as i64);
            bb.write_var_uint(fields.len() as u64);
            let mut sorted: Vec<&Field> = fields.iter().collect();
            sorted.sort_by_key(|field| field.id);
            for field in sorted {
                bb.write_var_uint(field.id as u64);
                member(bb, &field.ty)?;
            }
        }
        Type::Func(func) => {
            bb.write_var_int(TYPE_FUNC as i64);
            bb.write_var_uint(func.args.len() as u64);
            for arg in &func.args {
                member(bb, arg)?;
            }
            bb.write_var_uint(func.rets.len() as u64);
            for ret in &func.rets {
                member(bb, ret)?;
            }
            bb.write_var_uint(func.modes.len() as u64);
            for mode in &func.modes {
                bb.write_byte(mode.to_byte());
            }
        }
        Type::Service(methods) => {
            bb.write_var_int(TYPE_SERVICE as i64);
            bb.write_var_uint(methods.len() as u64);
            let mut sorted: Vec<&Method> = methods.iter().collect();
            sorted.sort_by(|a, b| a.name.cmp(&b.name));
            for method in sorted {
                bb.write_text(&method.name);
                member(bb, &method.ty)?;
            }
        }
        Type::Future { opcode, payload } => {
            bb.write_var_int(*opcode);
            bb.write_blob(payload);
        }
        other => {
            return Err(WireError::InvalidTypeTable(format!(
                "{} cannot be a table entry",
                other
            )))
        }
    }
    Ok(())
}

/// Label given to decoded entries that are referenced by name.
pub fn table_label(index: usize) -> String {
    format!("table{}", index)
}

enum RawEntry {
    Opt(i64),
    Vec(i64),
    Record(Vec<(u32, i64)>),
    Variant(Vec<(u32, i64)>),
    Func { args: Vec<i64>, rets: Vec<i64>, modes: Vec<FuncMode> },
    Service(Vec<(String, i64)>),
    Future { opcode: i64, payload: Vec<u8> },
}

impl RawEntry {
    fn codes(&self) -> Vec<i64> {
        match self {
            RawEntry::Opt(code) | RawEntry::Vec(code) => vec![*code],
            RawEntry::Record(fields) | RawEntry::Variant(fields) => {
                fields.iter().map(|(_, code)| *code).collect()
            }
            RawEntry::Func { args, rets, .. } => args.iter().chain(rets).copied().collect(),
            RawEntry::Service(methods) => methods.iter().map(|(_, code)| *code).collect(),
            RawEntry::Future { .. } => vec![],
        }
    }
}

fn read_codes(bb: &mut ByteBuffer) -> Result<Vec<i64>, WireError> {
    let count = bb.read_len()?;
    let mut codes = Vec::with_capacity(count);
    for _ in 0..count {
        codes.push(bb.read_var_int()?);
    }
    Ok(codes)
}

fn read_fields(bb: &mut ByteBuffer) -> Result<Vec<(u32, i64)>, WireError> {
    let count = bb.read_len()?;
    let mut fields: Vec<(u32, i64)> = Vec::with_capacity(count);
    for _ in 0..count {
        let id = u32::try_from(bb.read_var_uint()?)
            .map_err(|_| WireError::InvalidTypeTable("field id exceeds 32 bits".to_owned()))?;
        if let Some(&(previous, _)) = fields.last() {
            if id <= previous {
                return Err(WireError::InvalidTypeTable(format!(
                    "field id {} is out of order or duplicated",
                    id
                )));
            }
        }
        fields.push((id, bb.read_var_int()?));
    }
    Ok(fields)
}

fn read_entry(bb: &mut ByteBuffer) -> Result<RawEntry, WireError> {
    let opcode = bb.read_var_int()?;
    let entry = match opcode {
        c if c == TYPE_OPT as i64 => RawEntry::Opt(bb.read_var_int()?),
        c if c == TYPE_VEC as i64 => RawEntry::Vec(bb.read_var_int()?),
        c if c == TYPE_RECORD as i64 => RawEntry::Record(read_fields(bb)?),
        c if c == TYPE_VARIANT as i64 => RawEntry::Variant(read_fields(bb)?),
        c if c == TYPE_FUNC as i64 => {
            let args = read_codes(bb)?;
            let rets = read_codes(bb)?;
            let count = bb.read_len()?;
            let mut modes = Vec::with_capacity(count);
            for _ in 0..count {
                let byte = bb.read_byte()?;
                let mode = FuncMode::from_byte(byte).ok_or_else(|| {
                    WireError::InvalidTypeTable(format!("unknown function annotation {}", byte))
                })?;
                modes.push(mode);
            }
            RawEntry::Func { args, rets, modes }
        }
        c if c == TYPE_SERVICE as i64 => {
            let count = bb.read_len()?;
            let mut methods: Vec<(String, i64)> = Vec::with_capacity(count);
            for _ in 0..count {
                let name = bb.read_text()?.to_owned();
                if methods.last().map_or(false, |(previous, _)| *previous >= name) {
                    return Err(WireError::InvalidTypeTable(format!(
                        "method {} is out of order or duplicated",
                        name
                    )));
                }
                methods.push((name, bb.read_var_int()?));
            }
            RawEntry::Service(methods)
        }
        c if c >= 0 || Type::primitive(c).is_some() => {
            return Err(WireError::InvalidTypeTable(format!(
                "opcode {} cannot start a table entry",
                c
            )))
        }
        c => RawEntry::Future {
            opcode:  c,
            payload: bb.read_blob()?.to_vec(),
        },
    };
    Ok(entry)
}

fn check_code(code: i64, entries: usize) -> Result<(), WireError> {
    let known = if code >= 0 {
        (code as u64) < entries as u64
    } else {
        Type::primitive(code).is_some()
    };
    if known {
        Ok(())
    } else {
        Err(WireError::UnknownType(code))
    }
}

/// Rebuilds nested [`Type`] trees from raw entries. A member that points back
/// to an entry still being expanded becomes a reference to that entry's label.
struct Expander<'r> {
    raw:      &'r [RawEntry],
    memo:     Vec<Option<(Type, usize)>>,
    on_stack: Vec<bool>,
    labelled: Vec<bool>,
    depth:    usize,
}

impl<'r> Expander<'r> {
    fn new(raw: &'r [RawEntry]) -> Expander<'r> {
        Expander {
            raw,
            memo:     vec![None; raw.len()],
            on_stack: vec![false; raw.len()],
            labelled: vec![false; raw.len()],
            depth:    0,
        }
    }

    fn member(&mut self, code: i64) -> Result<(Type, usize), WireError> {
        if code < 0 {
            let ty = Type::primitive(code).ok_or(WireError::UnknownType(code))?;
            return Ok((ty.clone(), 1));
        }
        let index = code as usize;
        if self.on_stack[index] {
            self.labelled[index] = true;
            return Ok((Type::Id(table_label(index)), 1));
        }
        let (ty, nodes) = self.expand(index)?;
        if nodes > MAX_INLINE_NODES {
            self.labelled[index] = true;
            return Ok((Type::Id(table_label(index)), 1));
        }
        Ok((ty, nodes))
    }

    fn expand(&mut self, index: usize) -> Result<(Type, usize), WireError> {
        if let Some(done) = &self.memo[index] {
            return Ok(done.clone());
        }
        if self.depth >= MAX_DECODE_DEPTH {
            return Err(WireError::RecursionLimit);
        }
        self.depth += 1;
        self.on_stack[index] = true;

        let raw = self.raw;
        let mut nodes = 1;
        let ty = match &raw[index] {
            RawEntry::Opt(code) => {
                let (inner, n) = self.member(*code)?;
                nodes += n;
                Type::opt(inner)
            }
            RawEntry::Vec(code) => {
                let (inner, n) = self.member(*code)?;
                nodes += n;
                Type::vec(inner)
            }
            RawEntry::Record(fields) | RawEntry::Variant(fields) => {
                let mut members = Vec::with_capacity(fields.len());
                for &(id, code) in fields {
                    let (ty, n) = self.member(code)?;
                    nodes += n;
                    members.push(Field::new(id, ty));
                }
                if matches!(raw[index], RawEntry::Record(_)) {
                    Type::Record(members)
                } else {
                    Type::Variant(members)
                }
            }
            RawEntry::Func { args, rets, modes } => {
                let mut func = FuncType {
                    args:  Vec::with_capacity(args.len()),
                    rets:  Vec::with_capacity(rets.len()),
                    modes: modes.clone(),
                };
                for &code in args {
                    let (ty, n) = self.member(code)?;
                    nodes += n;
                    func.args.push(ty);
                }
                for &code in rets {
                    let (ty, n) = self.member(code)?;
                    nodes += n;
                    func.rets.push(ty);
                }
                Type::Func(func)
            }
            RawEntry::Service(methods) => {
                let mut members = Vec::with_capacity(methods.len());
                for (name, code) in methods {
                    let (ty, n) = self.member(*code)?;
                    nodes += n;
                    members.push(Method { name: name.clone(), ty });
                }
                Type::Service(members)
            }
            RawEntry::Future { opcode, payload } => Type::Future {
                opcode:  *opcode,
                payload: payload.clone(),
            },
        };

        self.on_stack[index] = false;
        self.depth -= 1;
        self.memo[index] = Some((ty.clone(), nodes));
        Ok((ty, nodes))
    }
}

/// Reads the prelude and returns the rebuilt table with the argument types.
///
/// Entries keep their wire indices. An entry referenced recursively is bound
/// to the label [`table_label`]`(index)` and appears as [`Type::Id`] inside
/// the types that refer back to it.
pub fn read_prelude(bb: &mut ByteBuffer) -> Result<(TypeTable, Vec<Type>), WireError> {
    if bb.read_bytes(MAGIC.len()).map_err(|_| WireError::BadMagic)? != MAGIC {
        return Err(WireError::BadMagic);
    }

    let count = bb.read_len()?;
    let mut raw = Vec::with_capacity(count);
    for _ in 0..count {
        raw.push(read_entry(bb)?);
    }
    for entry in &raw {
        for code in entry.codes() {
            check_code(code, count)?;
        }
    }
    for entry in &raw {
        if let RawEntry::Service(methods) = entry {
            for (name, code) in methods {
                if *code < 0 || !matches!(raw[*code as usize], RawEntry::Func { .. } | RawEntry::Future { .. }) {
                    return Err(WireError::InvalidTypeTable(format!(
                        "method {} does not have a function type",
                        name
                    )));
                }
            }
        }
    }

    let arg_codes = read_codes(bb)?;
    for &code in &arg_codes {
        check_code(code, count)?;
    }

    let mut expander = Expander::new(&raw);
    let mut entries = Vec::with_capacity(count);
    for index in 0..count {
        entries.push(expander.expand(index)?.0);
    }
    let mut args = Vec::with_capacity(arg_codes.len());
    for &code in &arg_codes {
        args.push(expander.member(code)?.0);
    }

    let mut builder = TypeTableBuilder::new();
    for entry in entries {
        builder.push_entry(entry);
    }
    for (index, &labelled) in expander.labelled.iter().enumerate() {
        if labelled {
            builder.bind_label(table_label(index), index as i32);
        }
    }

    debug!(
        "decoded prelude with {} entries and {} arguments",
        count,
        args.len()
    );
    Ok((builder.freeze(), args))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::idl_hash;

    fn prelude(table: &TypeTable, args: &[i32]) -> Vec<u8> {
        let mut bb = ByteBufferMut::new();
        write_prelude(table, args, &mut bb).unwrap();
        bb.data()
    }

    fn read(bytes: &[u8]) -> Result<(TypeTable, Vec<Type>), WireError> {
        read_prelude(&mut ByteBuffer::new(bytes))
    }

    #[test]
    fn empty_prelude() {
        assert_eq!(prelude(&TypeTable::new(), &[]), b"DIDL\x00\x00");
        let (table, args) = read(b"DIDL\x00\x00").unwrap();
        assert!(table.is_empty());
        assert!(args.is_empty());
    }

    #[test]
    fn primitive_arguments_are_inline() {
        let bytes = prelude(&TypeTable::new(), &[crate::TYPE_NAT, crate::TYPE_TEXT]);
        assert_eq!(bytes, b"DIDL\x00\x02\x7d\x71");
        let (_, args) = read(&bytes).unwrap();
        assert_eq!(args, vec![Type::Nat, Type::Text]);
    }

    #[test]
    fn bad_magic_is_rejected() {
        assert_eq!(read(b"DIDX\x00\x00").unwrap_err(), WireError::BadMagic);
        assert_eq!(read(b"DI").unwrap_err(), WireError::BadMagic);
        assert_eq!(read(b"").unwrap_err(), WireError::BadMagic);
    }

    #[test]
    fn record_and_opt_entries() {
        let mut builder = TypeTableBuilder::new();
        let ty = Type::record(vec![Field::named("a", Type::opt(Type::Bool))]);
        let code = builder.register_type(&ty).unwrap();
        let table = builder.freeze();

        let bytes = prelude(&table, &[code]);
        // record with one field (id 97) pointing at entry 1, then opt bool
        assert_eq!(bytes, b"DIDL\x02\x6c\x01\x61\x01\x6e\x7e\x01\x00");

        let (decoded, args) = read(&bytes).unwrap();
        assert_eq!(decoded.len(), 2);
        assert_eq!(args, vec![ty]);
    }

    #[test]
    fn recursive_entries_get_labels() {
        let body = Type::record(vec![
            Field::named("head", Type::Int),
            Field::named("tail", Type::opt(Type::id("List"))),
        ]);
        let mut builder = TypeTableBuilder::new();
        let code = builder.register_type_with_label("List", &body).unwrap();
        let table = builder.freeze();

        let (decoded, args) = read(&prelude(&table, &[code])).unwrap();
        let expected = Type::record(vec![
            Field::new(idl_hash("head"), Type::Int),
            Field::new(idl_hash("tail"), Type::opt(Type::id("table0"))),
        ]);
        assert_eq!(args, vec![expected.clone()]);
        assert_eq!(decoded.resolve("table0"), Ok(&expected));
        assert_eq!(decoded.label_code("table1"), None);
    }

    #[test]
    fn functions_and_services() {
        let func = Type::Func(FuncType {
            args:  vec![Type::Text],
            rets:  vec![Type::Nat],
            modes: vec![FuncMode::Query],
        });
        let service = Type::service(vec![Method { name: "get".to_owned(), ty: func.clone() }]);
        let mut builder = TypeTableBuilder::new();
        let code = builder.register_type(&service).unwrap();
        let table = builder.freeze();

        let bytes = prelude(&table, &[code]);
        assert_eq!(
            bytes,
            b"DIDL\x02\x69\x01\x03get\x01\x6a\x01\x71\x01\x7d\x01\x01\x01\x00"
        );
        let (_, args) = read(&bytes).unwrap();
        assert_eq!(args, vec![service]);
    }

    #[test]
    fn out_of_range_references_are_unknown() {
        // opt pointing at entry 5 of a one-entry table
        assert_eq!(read(b"DIDL\x01\x6e\x05\x00").unwrap_err(), WireError::UnknownType(5));
        // argument pointing past the table
        assert_eq!(read(b"DIDL\x00\x01\x00").unwrap_err(), WireError::UnknownType(0));
        // member with an unknown negative code
        assert_eq!(read(b"DIDL\x01\x6d\x4f\x00").unwrap_err(), WireError::UnknownType(-49));
    }

    #[test]
    fn future_entries_round_trip() {
        // opcode -30, three payload bytes
        let bytes = b"DIDL\x01\x62\x03\xaa\xbb\xcc\x01\x00";
        let (table, args) = read(bytes).unwrap();
        let future = Type::Future { opcode: -30, payload: vec![0xaa, 0xbb, 0xcc] };
        assert_eq!(args, vec![future.clone()]);
        assert_eq!(prelude(&table, &[0]), bytes.to_vec());
    }

    #[test]
    fn unsorted_fields_are_rejected() {
        let bytes = b"DIDL\x01\x6c\x02\x02\x7d\x01\x7d\x01\x00";
        assert!(matches!(read(bytes), Err(WireError::InvalidTypeTable(_))));
    }

    #[test]
    fn forward_references_are_allowed() {
        // entry 0 is vec of entry 1, entry 1 is opt nat
        let (_, args) = read(b"DIDL\x02\x6d\x01\x6e\x7d\x01\x00").unwrap();
        assert_eq!(args, vec![Type::vec(Type::opt(Type::Nat))]);
    }

    fn opt_chain(len: usize) -> Vec<u8> {
        let mut bb = ByteBufferMut::new();
        bb.write_bytes(&MAGIC);
        bb.write_var_uint(len as u64);
        for index in 0..len {
            bb.write_var_int(TYPE_OPT as i64);
            if index + 1 == len {
                bb.write_var_int(crate::TYPE_NAT as i64);
            } else {
                bb.write_var_int(index as i64 + 1);
            }
        }
        bb.write_var_uint(1);
        bb.write_var_int(0);
        bb.data()
    }

    #[test]
    fn deep_entry_chains_hit_the_depth_limit() {
        assert_eq!(read(&opt_chain(200_000)).unwrap_err(), WireError::RecursionLimit);
        assert_eq!(read(&opt_chain(MAX_DECODE_DEPTH + 1)).unwrap_err(), WireError::RecursionLimit);

        let (table, args) = read(&opt_chain(3)).unwrap();
        assert_eq!(table.len(), 3);
        assert_eq!(args, vec![Type::opt(Type::opt(Type::opt(Type::Nat)))]);
    }
}
