use crate::*;
use serde::Serialize;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Field identifier derived from a textual label:
/// `(Σ codepoint(name[i]) * 223^(len-1-i)) mod 2^32`.
pub fn idl_hash(name: &str) -> u32 {
    name.chars()
        .fold(0u32, |hash, c| hash.wrapping_mul(223).wrapping_add(c as u32))
}

/// A type of the interface language.
///
/// Constructed types nest their members by value. Recursion only ever goes
/// through [`Type::Id`], which names an entry of a [`TypeTable`], so no
/// value of this type is ever infinite.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum Type {
    Null,
    Bool,
    Nat,
    Int,
    Nat8,
    Nat16,
    Nat32,
    Nat64,
    Int8,
    Int16,
    Int32,
    Int64,
    Float32,
    Float64,
    Text,
    Reserved,
    Empty,
    Principal,
    Opt(Box<Type>),
    Vec(Box<Type>),
    Record(Vec<Field>),
    Variant(Vec<Field>),
    Func(FuncType),
    Service(Vec<Method>),
    Id(String),
    /// An entry with an opcode this reader does not know. The payload is kept
    /// verbatim so it can be written back out.
    Future { opcode: i64, payload: Vec<u8> },
}

/// A record field or variant alternative. Equality and hashing only look at
/// `id` and `ty`; the name is carried for display.
#[derive(Debug, Clone, Serialize)]
pub struct Field {
    pub id:   u32,
    pub name: Option<String>,
    pub ty:   Type,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct FuncType {
    pub args:  Vec<Type>,
    pub rets:  Vec<Type>,
    pub modes: Vec<FuncMode>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum FuncMode {
    Query,
    Oneway,
    CompositeQuery,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Method {
    pub name: String,
    pub ty:   Type,
}

static PRIMITIVES: [Type; 18] = [
    Type::Null,
    Type::Bool,
    Type::Nat,
    Type::Int,
    Type::Nat8,
    Type::Nat16,
    Type::Nat32,
    Type::Nat64,
    Type::Int8,
    Type::Int16,
    Type::Int32,
    Type::Int64,
    Type::Float32,
    Type::Float64,
    Type::Text,
    Type::Reserved,
    Type::Empty,
    Type::Principal,
];

impl Field {
    pub fn new(id: u32, ty: Type) -> Field {
        Field { id, name: None, ty }
    }

    pub fn named(name: &str, ty: Type) -> Field {
        Field {
            id:   idl_hash(name),
            name: Some(name.to_owned()),
            ty,
        }
    }
}

impl PartialEq for Field {
    fn eq(&self, other: &Field) -> bool {
        self.id == other.id && self.ty == other.ty
    }
}

impl Eq for Field {}

impl Hash for Field {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
        self.ty.hash(state);
    }
}

impl FuncMode {
    /// The annotation byte used in the type table.
    pub fn to_byte(self) -> u8 {
        match self {
            FuncMode::Query          => 1,
            FuncMode::Oneway         => 2,
            FuncMode::CompositeQuery => 3,
        }
    }

    pub fn from_byte(byte: u8) -> Option<FuncMode> {
        match byte {
            1 => Some(FuncMode::Query),
            2 => Some(FuncMode::Oneway),
            3 => Some(FuncMode::CompositeQuery),
            _ => None,
        }
    }

    pub fn keyword(self) -> &'static str {
        match self {
            FuncMode::Query          => "query",
            FuncMode::Oneway         => "oneway",
            FuncMode::CompositeQuery => "composite_query",
        }
    }
}

impl Type {
    /// A record with its fields in canonical (ascending id) order.
    pub fn record(mut fields: Vec<Field>) -> Type {
        fields.sort_by_key(|field| field.id);
        Type::Record(fields)
    }

    /// A variant with its alternatives in canonical (ascending id) order.
    pub fn variant(mut fields: Vec<Field>) -> Type {
        fields.sort_by_key(|field| field.id);
        Type::Variant(fields)
    }

    /// A service with its methods in canonical (name) order.
    pub fn service(mut methods: Vec<Method>) -> Type {
        methods.sort_by(|a, b| a.name.cmp(&b.name));
        Type::Service(methods)
    }

    pub fn opt(inner: Type) -> Type {
        Type::Opt(Box::new(inner))
    }

    pub fn vec(inner: Type) -> Type {
        Type::Vec(Box::new(inner))
    }

    /// `blob` is shorthand for `vec nat8`.
    pub fn blob() -> Type {
        Type::Vec(Box::new(Type::Nat8))
    }

    pub fn is_blob(&self) -> bool {
        matches!(self, Type::Vec(inner) if **inner == Type::Nat8)
    }

    pub fn id(name: &str) -> Type {
        Type::Id(name.to_owned())
    }

    /// Primitive types are written inline as their negative opcode and never
    /// occupy a table slot.
    pub fn is_primitive(&self) -> bool {
        self.opcode().is_some()
    }

    /// Constructed types are written as table entries and referenced by index.
    pub fn is_constructed(&self) -> bool {
        matches!(
            self,
            Type::Opt(_)
                | Type::Vec(_)
                | Type::Record(_)
                | Type::Variant(_)
                | Type::Func(_)
                | Type::Service(_)
                | Type::Future { .. }
        )
    }

    /// The fixed opcode of a primitive type.
    pub fn opcode(&self) -> Option<i32> {
        let code = match self {
            Type::Null      => TYPE_NULL,
            Type::Bool      => TYPE_BOOL,
            Type::Nat       => TYPE_NAT,
            Type::Int       => TYPE_INT,
            Type::Nat8      => TYPE_NAT8,
            Type::Nat16     => TYPE_NAT16,
            Type::Nat32     => TYPE_NAT32,
            Type::Nat64     => TYPE_NAT64,
            Type::Int8      => TYPE_INT8,
            Type::Int16     => TYPE_INT16,
            Type::Int32     => TYPE_INT32,
            Type::Int64     => TYPE_INT64,
            Type::Float32   => TYPE_FLOAT32,
            Type::Float64   => TYPE_FLOAT64,
            Type::Text      => TYPE_TEXT,
            Type::Reserved  => TYPE_RESERVED,
            Type::Empty     => TYPE_EMPTY,
            Type::Principal => TYPE_PRINCIPAL,
            _ => return None,
        };
        Some(code)
    }

    /// The primitive type for `opcode`, borrowed from a static table.
    pub fn primitive(opcode: i64) -> Option<&'static Type> {
        match opcode {
            -17..=-1 => Some(&PRIMITIVES[(-opcode - 1) as usize]),
            c if c == TYPE_PRINCIPAL as i64 => Some(&PRIMITIVES[17]),
            _ => None,
        }
    }

    /// The primitive keyword, if this is a primitive type.
    pub fn keyword(&self) -> Option<&'static str> {
        let keyword = match self {
            Type::Null      => "null",
            Type::Bool      => "bool",
            Type::Nat       => "nat",
            Type::Int       => "int",
            Type::Nat8      => "nat8",
            Type::Nat16     => "nat16",
            Type::Nat32     => "nat32",
            Type::Nat64     => "nat64",
            Type::Int8      => "int8",
            Type::Int16     => "int16",
            Type::Int32     => "int32",
            Type::Int64     => "int64",
            Type::Float32   => "float32",
            Type::Float64   => "float64",
            Type::Text      => "text",
            Type::Reserved  => "reserved",
            Type::Empty     => "empty",
            Type::Principal => "principal",
            _ => return None,
        };
        Some(keyword)
    }

    /// Looks up a primitive by its keyword.
    pub fn from_keyword(keyword: &str) -> Option<Type> {
        PRIMITIVES
            .iter()
            .find(|ty| ty.keyword() == Some(keyword))
            .cloned()
    }

    /// Calls `f` on every direct member type.
    pub fn for_each_member<'t>(&'t self, mut f: impl FnMut(&'t Type)) {
        match self {
            Type::Opt(inner) | Type::Vec(inner) => f(inner),
            Type::Record(fields) | Type::Variant(fields) => {
                for field in fields {
                    f(&field.ty);
                }
            }
            Type::Func(func) => {
                for ty in func.args.iter().chain(func.rets.iter()) {
                    f(ty);
                }
            }
            Type::Service(methods) => {
                for method in methods {
                    f(&method.ty);
                }
            }
            _ => {}
        }
    }
}

fn write_fields(f: &mut fmt::Formatter, keyword: &str, fields: &[Field], variant: bool) -> fmt::Result {
    write!(f, "{} {{", keyword)?;
    for (i, field) in fields.iter().enumerate() {
        f.write_str(if i == 0 { " " } else { "; " })?;
        match field.name {
            Some(ref name) => write!(f, "{}", name)?,
            None => write!(f, "{}", field.id)?,
        }
        if !(variant && field.ty == Type::Null) {
            write!(f, ": {}", field.ty)?;
        }
    }
    if !fields.is_empty() {
        f.write_str(" ")?;
    }
    f.write_str("}")
}

fn write_tuple(f: &mut fmt::Formatter, types: &[Type]) -> fmt::Result {
    f.write_str("(")?;
    for (i, ty) in types.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{}", ty)?;
    }
    f.write_str(")")
}

impl fmt::Display for FuncType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write_tuple(f, &self.args)?;
        f.write_str(" -> ")?;
        write_tuple(f, &self.rets)?;
        for mode in &self.modes {
            write!(f, " {}", mode.keyword())?;
        }
        Ok(())
    }
}

/// Renders the type in IDL syntax.
impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if let Some(keyword) = self.keyword() {
            return f.write_str(keyword);
        }
        match self {
            Type::Opt(inner) => write!(f, "opt {}", inner),
            Type::Vec(_) if self.is_blob() => f.write_str("blob"),
            Type::Vec(inner) => write!(f, "vec {}", inner),
            Type::Record(fields) => write_fields(f, "record", fields, false),
            Type::Variant(fields) => write_fields(f, "variant", fields, true),
            Type::Func(func) => write!(f, "func {}", func),
            Type::Service(methods) => {
                f.write_str("service {")?;
                for method in methods {
                    match method.ty {
                        Type::Func(ref func) => write!(f, " {}: {};", method.name, func)?,
                        ref other => write!(f, " {}: {};", method.name, other)?,
                    }
                }
                f.write_str(" }")
            }
            Type::Id(name) => f.write_str(name),
            Type::Future { opcode, .. } => write!(f, "future({})", opcode),
            _ => Ok(()),
        }
    }
}
