use crate::{error::WireError, types::Type};
use log::{debug, trace};
use std::collections::{HashMap, HashSet};

/// A frozen type table: the ordered registry of constructed types plus the
/// label map.
///
/// Labels map to a type code: a registry index (`>= 0`) or a primitive opcode
/// (`< 0`), the same convention the wire format uses for member references.
/// Once frozen a table is never mutated, so it can be shared freely between
/// encoders.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TypeTable {
    entries: Vec<Type>,
    index:   HashMap<Type, u32>,
    labels:  HashMap<String, i32>,
}

/// The single writer of a [`TypeTable`]. Populate it, then call
/// [`freeze`](TypeTableBuilder::freeze).
#[derive(Debug, Default)]
pub struct TypeTableBuilder {
    table: TypeTable,
}

impl TypeTableBuilder {
    pub fn new() -> TypeTableBuilder {
        TypeTableBuilder::default()
    }

    /// Registers `ty` and returns its type code.
    ///
    /// Primitives return their opcode without taking a slot. A structurally
    /// equal constructed type that is already present returns its existing
    /// index; otherwise the type is appended and its constructed members are
    /// registered after it. Named references are looked up but never
    /// registered, which keeps cyclic definitions finite.
    pub fn register_type(&mut self, ty: &Type) -> Result<i32, WireError> {
        if let Type::Id(name) = ty {
            return self
                .table
                .label_code(name)
                .ok_or_else(|| WireError::UnresolvedName(name.clone()));
        }
        if let Some(code) = ty.opcode() {
            return Ok(code);
        }
        if let Some(&index) = self.table.index.get(ty) {
            return Ok(index as i32);
        }

        let index = self.table.entries.len() as u32;
        trace!("registering type table entry {}: {}", index, ty);
        self.table.entries.push(ty.clone());
        self.table.index.insert(ty.clone(), index);

        let mut members = Vec::new();
        ty.for_each_member(|member| {
            if member.is_constructed() {
                members.push(member);
            }
        });
        for member in members {
            self.register_type(member)?;
        }

        Ok(index as i32)
    }

    /// Registers `ty` and binds `label` to it.
    ///
    /// Binding an existing label is a no-op returning the code bound first.
    /// `ty` may itself be a reference to an already bound label, which makes
    /// `label` an alias of it.
    pub fn register_type_with_label(&mut self, label: &str, ty: &Type) -> Result<i32, WireError> {
        if let Some(code) = self.table.label_code(label) {
            return Ok(code);
        }
        let code = self.register_type(ty)?;
        trace!("binding label {} to type code {}", label, code);
        self.table.labels.insert(label.to_owned(), code);
        Ok(code)
    }

    /// Binds `label` to a code directly. Used when rebuilding a table from the
    /// wire, where entries arrive already numbered.
    pub(crate) fn bind_label(&mut self, label: String, code: i32) {
        self.table.labels.entry(label).or_insert(code);
    }

    /// Appends an entry without structural deduplication, keeping wire order.
    pub(crate) fn push_entry(&mut self, ty: Type) -> u32 {
        let index = self.table.entries.len() as u32;
        self.table.index.entry(ty.clone()).or_insert(index);
        self.table.entries.push(ty);
        index
    }

    pub fn resolve(&self, label: &str) -> Result<&Type, WireError> {
        self.table.resolve(label)
    }

    pub fn is_bound(&self, label: &str) -> bool {
        self.table.labels.contains_key(label)
    }

    /// Ends population and hands out the read-only table.
    pub fn freeze(self) -> TypeTable {
        debug!(
            "froze type table with {} entries and {} labels",
            self.table.entries.len(),
            self.table.labels.len()
        );
        self.table
    }
}

impl TypeTable {
    /// An empty table, for types that carry no named references.
    pub fn new() -> TypeTable {
        TypeTable::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The registry, in index order.
    pub fn entries(&self) -> &[Type] {
        &self.entries
    }

    pub fn entry(&self, index: u32) -> Option<&Type> {
        self.entries.get(index as usize)
    }

    /// All labels with their type codes, sorted by label.
    pub fn labels(&self) -> Vec<(&str, i32)> {
        let mut labels: Vec<_> = self
            .labels
            .iter()
            .map(|(label, &code)| (label.as_str(), code))
            .collect();
        labels.sort();
        labels
    }

    pub fn label_code(&self, label: &str) -> Option<i32> {
        self.labels.get(label).copied()
    }

    /// The type a code stands for.
    pub fn type_for_code(&self, code: i64) -> Result<&Type, WireError> {
        if code < 0 {
            Type::primitive(code).ok_or(WireError::UnknownType(code))
        } else {
            self.entries
                .get(code as usize)
                .ok_or(WireError::UnknownType(code))
        }
    }

    /// The type bound to `label`.
    pub fn resolve(&self, label: &str) -> Result<&Type, WireError> {
        let code = self
            .label_code(label)
            .ok_or_else(|| WireError::UnresolvedName(label.to_owned()))?;
        self.type_for_code(code as i64)
    }

    /// Follows named references until a concrete type is reached.
    pub fn follow<'t>(&'t self, mut ty: &'t Type) -> Result<&'t Type, WireError> {
        while let Type::Id(name) = ty {
            ty = self.resolve(name)?;
        }
        Ok(ty)
    }

    /// The code a member reference to `ty` is written as.
    pub fn type_code(&self, ty: &Type) -> Result<i32, WireError> {
        if let Some(code) = ty.opcode() {
            return Ok(code);
        }
        match ty {
            Type::Id(name) => self
                .label_code(name)
                .ok_or_else(|| WireError::UnresolvedName(name.clone())),
            _ => self.index.get(ty).map(|&index| index as i32).ok_or_else(|| {
                WireError::InvalidTypeTable(format!("type {} is not registered", ty))
            }),
        }
    }

    /// Copies into `into` every label `ty` transitively depends on, so that
    /// `ty` can be encoded against `into` alone.
    pub fn copy_labels_for_type(&self, ty: &Type, into: &mut TypeTableBuilder) -> Result<(), WireError> {
        let mut pending = vec![ty];
        let mut seen: HashSet<&str> = HashSet::new();

        while let Some(current) = pending.pop() {
            match current {
                Type::Id(name) => {
                    if seen.insert(name.as_str()) {
                        let body = self.resolve(name)?;
                        into.register_type_with_label(name, body)?;
                        pending.push(body);
                    }
                }
                other => other.for_each_member(|member| pending.push(member)),
            }
        }

        Ok(())
    }

    /// Structural equivalence of `a` (against this table) and `b` (against
    /// `other`), looking through named references. Recursive types are
    /// compared coinductively.
    pub fn equivalent(&self, a: &Type, other: &TypeTable, b: &Type) -> Result<bool, WireError> {
        let mut assumed = HashSet::new();
        Equivalence { left: self, right: other, assumed: &mut assumed }.check(a, b)
    }
}

struct Equivalence<'t, 's> {
    left:    &'t TypeTable,
    right:   &'t TypeTable,
    assumed: &'s mut HashSet<(String, String)>,
}

impl Equivalence<'_, '_> {
    fn check(&mut self, a: &Type, b: &Type) -> Result<bool, WireError> {
        if let (Type::Id(x), Type::Id(y)) = (a, b) {
            if !self.assumed.insert((x.clone(), y.clone())) {
                return Ok(true);
            }
        }
        let a = self.left.follow(a)?;
        let b = self.right.follow(b)?;

        let equal = match (a, b) {
            (Type::Opt(x), Type::Opt(y)) | (Type::Vec(x), Type::Vec(y)) => self.check(x, y)?,
            (Type::Record(xs), Type::Record(ys)) | (Type::Variant(xs), Type::Variant(ys)) => {
                if xs.len() != ys.len() {
                    return Ok(false);
                }
                for (x, y) in xs.iter().zip(ys) {
                    if x.id != y.id || !self.check(&x.ty, &y.ty)? {
                        return Ok(false);
                    }
                }
                true
            }
            (Type::Func(x), Type::Func(y)) => {
                if x.modes != y.modes || x.args.len() != y.args.len() || x.rets.len() != y.rets.len() {
                    return Ok(false);
                }
                for (x, y) in x.args.iter().zip(&y.args).chain(x.rets.iter().zip(&y.rets)) {
                    if !self.check(x, y)? {
                        return Ok(false);
                    }
                }
                true
            }
            (Type::Service(xs), Type::Service(ys)) => {
                if xs.len() != ys.len() {
                    return Ok(false);
                }
                for (x, y) in xs.iter().zip(ys) {
                    if x.name != y.name || !self.check(&x.ty, &y.ty)? {
                        return Ok(false);
                    }
                }
                true
            }
            (a, b) if a.is_primitive() || b.is_primitive() => a == b,
            (Type::Future { .. }, Type::Future { .. }) => a == b,
            _ => false,
        };
        Ok(equal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Field, FuncMode, FuncType, Method};

    fn list_body() -> Type {
        Type::record(vec![
            Field::named("head", Type::Int),
            Field::named("tail", Type::opt(Type::id("List"))),
        ])
    }

    #[test]
    fn structural_duplicates_share_a_slot() {
        let mut builder = TypeTableBuilder::new();
        let a = builder.register_type(&Type::vec(Type::Text)).unwrap();
        let b = builder.register_type(&Type::vec(Type::Text)).unwrap();
        assert_eq!(a, b);
        assert_eq!(builder.freeze().len(), 1);
    }

    #[test]
    fn primitives_never_take_a_slot() {
        let mut builder = TypeTableBuilder::new();
        assert_eq!(builder.register_type(&Type::Nat).unwrap(), crate::TYPE_NAT);
        assert_eq!(builder.register_type_with_label("Amount", &Type::Nat).unwrap(), crate::TYPE_NAT);
        let table = builder.freeze();
        assert!(table.is_empty());
        assert_eq!(table.resolve("Amount"), Ok(&Type::Nat));
    }

    #[test]
    fn members_are_registered_after_parents() {
        let mut builder = TypeTableBuilder::new();
        let ty = Type::record(vec![Field::named("items", Type::vec(Type::opt(Type::Text)))]);
        assert_eq!(builder.register_type(&ty).unwrap(), 0);
        let table = builder.freeze();
        assert_eq!(table.len(), 3);
        assert_eq!(table.entry(1), Some(&Type::vec(Type::opt(Type::Text))));
        assert_eq!(table.entry(2), Some(&Type::opt(Type::Text)));
    }

    #[test]
    fn labels_are_idempotent() {
        let mut builder = TypeTableBuilder::new();
        let first = builder.register_type_with_label("List", &list_body()).unwrap();
        let second = builder.register_type_with_label("List", &Type::vec(Type::Nat)).unwrap();
        assert_eq!(first, second);
        assert_eq!(builder.freeze().len(), 2);
    }

    #[test]
    fn labels_short_circuit_to_existing_structure() {
        let mut builder = TypeTableBuilder::new();
        let anonymous = builder.register_type(&Type::vec(Type::Nat)).unwrap();
        let labelled = builder.register_type_with_label("Nats", &Type::vec(Type::Nat)).unwrap();
        assert_eq!(anonymous, labelled);
        let table = builder.freeze();
        assert_eq!(table.len(), 1);
        assert_eq!(table.label_code("Nats"), Some(0));
    }

    #[test]
    fn recursive_record_resolves_lazily() {
        let mut builder = TypeTableBuilder::new();
        let code = builder.register_type_with_label("List", &list_body()).unwrap();
        let table = builder.freeze();

        assert_eq!(code, 0);
        assert_eq!(table.len(), 2);
        assert_eq!(table.resolve("List"), Ok(&list_body()));
        assert_eq!(table.type_code(&Type::opt(Type::id("List"))), Ok(1));
        assert_eq!(table.follow(&Type::id("List")), Ok(&list_body()));
    }

    #[test]
    fn unresolved_names_are_reported() {
        let table = TypeTable::new();
        assert_eq!(
            table.resolve("Missing"),
            Err(WireError::UnresolvedName("Missing".to_owned()))
        );
        let mut builder = TypeTableBuilder::new();
        assert_eq!(
            builder.register_type(&Type::id("Missing")),
            Err(WireError::UnresolvedName("Missing".to_owned()))
        );
    }

    #[test]
    fn copy_labels_extracts_minimal_closure() {
        let mut builder = TypeTableBuilder::new();
        builder.register_type_with_label("List", &list_body()).unwrap();
        builder.register_type_with_label("Amount", &Type::Nat).unwrap();
        builder.register_type_with_label("Unused", &Type::vec(Type::Text)).unwrap();
        builder
            .register_type_with_label("Wrapper", &Type::record(vec![Field::named("list", Type::id("List"))]))
            .unwrap();
        let env = builder.freeze();

        let func = Type::Func(FuncType {
            args:  vec![Type::id("Wrapper"), Type::id("Amount")],
            rets:  vec![],
            modes: vec![FuncMode::Oneway],
        });
        let mut sub = TypeTableBuilder::new();
        env.copy_labels_for_type(&func, &mut sub).unwrap();
        let sub = sub.freeze();

        assert!(sub.label_code("List").is_some());
        assert!(sub.label_code("Wrapper").is_some());
        assert_eq!(sub.label_code("Amount"), Some(crate::TYPE_NAT));
        assert_eq!(sub.label_code("Unused"), None);
        assert_eq!(sub.len(), 3);
    }

    #[test]
    fn equivalence_through_recursion() {
        let mut left = TypeTableBuilder::new();
        left.register_type_with_label("List", &list_body()).unwrap();
        let left = left.freeze();

        let renamed = Type::record(vec![
            Field::named("head", Type::Int),
            Field::named("tail", Type::opt(Type::id("Chain"))),
        ]);
        let mut right = TypeTableBuilder::new();
        right.register_type_with_label("Chain", &renamed).unwrap();
        let right = right.freeze();

        assert_eq!(left.equivalent(&Type::id("List"), &right, &Type::id("Chain")), Ok(true));
        assert_eq!(left.equivalent(&Type::id("List"), &right, &Type::Int), Ok(false));

        let service = Type::service(vec![Method {
            name: "get".to_owned(),
            ty:   Type::Func(FuncType { args: vec![], rets: vec![Type::id("List")], modes: vec![] }),
        }]);
        assert_eq!(left.equivalent(&service, &left, &service), Ok(true));
    }
}
