use brine_idl_schema::{
    idl_hash, Field, FuncMode, FuncType, Method, Type, TypeTable, TypeTableBuilder,
};
use log::debug;
use std::collections::{HashMap, HashSet};

use crate::{
    types::{Definition, FieldExpr, Label, Program, TypeExpr},
    verifier::verify_program,
    tokenizer::tokenize_idl,
    parser::parse_idl,
    utils::{compile_error, quote},
    error::IdlError,
};

/// The result of compiling an IDL file.
#[derive(Debug, Clone)]
pub struct CompiledIdl {
    /// The parsed program with imported definitions merged in front.
    pub program:     Program,
    /// Every definition's label and type, frozen after compilation.
    pub table:       TypeTable,
    /// Definitions in source order. Aliases appear as [`Type::Id`] of the
    /// definition they ultimately name, or as the primitive that definition
    /// stands for.
    pub definitions: Vec<(String, Type)>,
    pub actor:       Option<CompiledActor>,
}

/// The compiled `service` declaration of a file.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledActor {
    pub name: Option<String>,
    /// Init arguments, empty when the service takes none.
    pub init: Vec<Type>,
    /// A [`Type::Service`], or a [`Type::Id`] naming one.
    pub ty:   Type,
}

impl CompiledIdl {
    pub fn definition(&self, name: &str) -> Option<&Type> {
        self.definitions
            .iter()
            .find(|(label, _)| label == name)
            .map(|(_, ty)| ty)
    }

    /// The signature of one of the actor's methods.
    pub fn method(&self, name: &str) -> Result<&FuncType, IdlError> {
        let actor = self
            .actor
            .as_ref()
            .ok_or_else(|| compile_error("The file does not declare a service"))?;
        let Type::Service(methods) = self.table.follow(&actor.ty)? else {
            return Err(compile_error("The actor is not a service"));
        };
        let method = methods
            .iter()
            .find(|method| method.name == name)
            .ok_or_else(|| compile_error(format!("The service has no method {}", quote(name))))?;
        match self.table.follow(&method.ty)? {
            Type::Func(func) => Ok(func),
            other => Err(compile_error(format!("The method {} has type {}", quote(name), other))),
        }
    }
}

/// Tokenizes and parses IDL source without compiling it.
pub fn parse_source(text: &str) -> Result<Program, IdlError> {
    let tokens = tokenize_idl(text)?;
    parse_idl(&tokens)
}

/// Compile IDL source that has no imports.
/// Returns `Err(IdlError)` if tokenization/parsing/verification fails.
pub fn compile_idl(text: &str) -> Result<CompiledIdl, IdlError> {
    compile_idl_with(text, |path| {
        Err(IdlError::ImportError(format!("No loader available for {}", quote(path))))
    })
}

/// Compile IDL source, fetching the text of each `import` through `loader`.
///
/// Imported definitions come before the importing file's own. Services
/// declared in imported files are ignored, and a file imported more than
/// once is merged once.
pub fn compile_idl_with<F>(text: &str, mut loader: F) -> Result<CompiledIdl, IdlError>
where
    F: FnMut(&str) -> Result<String, IdlError>,
{
    let program = parse_source(text)?;
    let mut stack = Vec::new();
    let mut done = HashSet::new();
    let definitions = merge_imports(&program, &mut loader, &mut stack, &mut done)?;
    compile_program(Program {
        imports: program.imports,
        definitions,
        actor: program.actor,
    })
}

fn merge_imports<F>(
    program: &Program,
    loader: &mut F,
    stack: &mut Vec<String>,
    done: &mut HashSet<String>,
) -> Result<Vec<Definition>, IdlError>
where
    F: FnMut(&str) -> Result<String, IdlError>,
{
    let mut merged = Vec::new();
    for import in &program.imports {
        if stack.contains(&import.path) {
            stack.push(import.path.clone());
            return Err(IdlError::ImportError(format!("Import cycle: {}", stack.join(" -> "))));
        }
        if done.contains(&import.path) {
            continue;
        }
        debug!("importing {}", import.path);
        let text = loader(&import.path)?;
        let imported = parse_source(&text)?;
        stack.push(import.path.clone());
        merged.extend(merge_imports(&imported, loader, stack, done)?);
        stack.pop();
        done.insert(import.path.clone());
    }
    merged.extend(program.definitions.iter().cloned());
    Ok(merged)
}

/// Verify and compile an already merged program into a frozen type table.
pub fn compile_program(program: Program) -> Result<CompiledIdl, IdlError> {
    verify_program(&program)?;

    let bodies: HashMap<&str, &TypeExpr> = program
        .definitions
        .iter()
        .map(|def| (def.name.as_str(), &def.ty))
        .collect();
    let lowering = Lowering { bodies };

    let mut definitions = Vec::with_capacity(program.definitions.len());
    for def in &program.definitions {
        definitions.push((def.name.clone(), lowering.lower(&def.ty)?));
    }

    // Aliases resolve through the label of their target, so every other
    // definition is bound first.
    let mut builder = TypeTableBuilder::new();
    for (name, ty) in definitions.iter().filter(|(_, ty)| !matches!(ty, Type::Id(_))) {
        builder.register_type_with_label(name, ty)?;
    }
    for (name, ty) in definitions.iter().filter(|(_, ty)| matches!(ty, Type::Id(_))) {
        builder.register_type_with_label(name, ty)?;
    }

    let actor = match &program.actor {
        Some(actor) => {
            let mut init = Vec::new();
            for arg in actor.init.iter().flatten() {
                init.push(lowering.lower(&arg.ty)?);
            }
            let ty = lowering.lower(&actor.body)?;
            for ty in init.iter().chain(std::iter::once(&ty)) {
                builder.register_type(ty)?;
            }
            Some(CompiledActor { name: actor.name.clone(), init, ty })
        }
        None => None,
    };

    let table = builder.freeze();
    debug!(
        "compiled {} definitions into {} table entries",
        definitions.len(),
        table.len()
    );
    Ok(CompiledIdl { program, table, definitions, actor })
}

/// What a field's type comes from.
#[derive(Debug, Clone, Copy)]
pub(crate) enum FieldBody<'a> {
    Expr(&'a TypeExpr),
    /// The bare `record { T }` shorthand.
    Named(&'a str),
    /// The bare `variant { A }` shorthand.
    Null,
}

pub(crate) struct FieldSlot<'a> {
    pub id:     u32,
    pub name:   Option<String>,
    pub body:   FieldBody<'a>,
    pub line:   usize,
    pub column: usize,
}

fn parse_field_id(text: &str, field: &FieldExpr) -> Result<u32, IdlError> {
    let digits = text.replace('_', "");
    let parsed = match digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => digits.parse::<u32>(),
    };
    parsed.map_err(|_| {
        compile_error(format!(
            "The field id {} is not a 32-bit natural (line {}, column {})",
            text, field.line, field.column
        ))
    })
}

/// Assigns every field its numeric id.
///
/// Names hash with [`idl_hash`]; numeric labels are taken as written; a
/// positional field takes its index in the declaration list.
pub(crate) fn field_layout(fields: &[FieldExpr], variant: bool) -> Result<Vec<FieldSlot<'_>>, IdlError> {
    let mut slots = Vec::with_capacity(fields.len());

    for (index, field) in fields.iter().enumerate() {
        let positional = || {
            u32::try_from(index).map_err(|_| {
                compile_error(format!(
                    "Too many positional fields (line {}, column {})",
                    field.line, field.column
                ))
            })
        };

        let (id, name, body) = match (&field.label, &field.ty) {
            (Some(Label::Name(name)) | Some(Label::Text(name)), Some(ty)) => {
                (idl_hash(name), Some(name.clone()), FieldBody::Expr(ty))
            }
            (Some(Label::Id(text)), Some(ty)) => (parse_field_id(text, field)?, None, FieldBody::Expr(ty)),
            (Some(Label::Name(name)), None) if !variant => (positional()?, None, FieldBody::Named(name)),
            (Some(Label::Name(name)) | Some(Label::Text(name)), None) if variant => {
                (idl_hash(name), Some(name.clone()), FieldBody::Null)
            }
            (Some(Label::Id(text)), None) if variant => (parse_field_id(text, field)?, None, FieldBody::Null),
            (None, Some(ty)) => (positional()?, None, FieldBody::Expr(ty)),
            _ => {
                return Err(compile_error(format!(
                    "The field at line {}, column {} needs a type",
                    field.line, field.column
                )))
            }
        };

        slots.push(FieldSlot { id, name, body, line: field.line, column: field.column });
    }

    Ok(slots)
}

struct Lowering<'a> {
    bodies: HashMap<&'a str, &'a TypeExpr>,
}

impl Lowering<'_> {
    /// Follows alias definitions to the definition that has a real body.
    fn canonical<'n>(&'n self, mut name: &'n str) -> Result<&'n str, IdlError> {
        for _ in 0..=self.bodies.len() {
            match self.bodies.get(name) {
                Some(TypeExpr::Name { name: target, .. }) => name = target.as_str(),
                Some(_) => return Ok(name),
                None => return Err(compile_error(format!("The type {} is not defined", quote(name)))),
            }
        }
        Err(compile_error(format!("Recursive nesting of {} is not allowed", quote(name))))
    }

    /// Names of primitives lower to the primitive itself, so they share
    /// table entries with the spelled-out form.
    fn reference(&self, name: &str) -> Result<Type, IdlError> {
        let target = self.canonical(name)?;
        match self.bodies.get(target) {
            Some(expr @ TypeExpr::Primitive(_)) => self.lower(expr),
            _ => Ok(Type::id(target)),
        }
    }

    fn lower_fields(&self, fields: &[FieldExpr], variant: bool) -> Result<Vec<Field>, IdlError> {
        let mut lowered = Vec::with_capacity(fields.len());
        for slot in field_layout(fields, variant)? {
            let ty = match slot.body {
                FieldBody::Expr(expr) => self.lower(expr)?,
                FieldBody::Named(name) => self.reference(name)?,
                FieldBody::Null => Type::Null,
            };
            lowered.push(Field { id: slot.id, name: slot.name, ty });
        }
        Ok(lowered)
    }

    fn lower(&self, expr: &TypeExpr) -> Result<Type, IdlError> {
        let ty = match expr {
            TypeExpr::Name { name, .. } => self.reference(name)?,
            TypeExpr::Primitive(keyword) => Type::from_keyword(keyword)
                .ok_or_else(|| compile_error(format!("Unknown primitive {}", quote(keyword))))?,
            TypeExpr::Opt(inner) => Type::opt(self.lower(inner)?),
            TypeExpr::Vec(inner) => Type::vec(self.lower(inner)?),
            TypeExpr::Blob => Type::blob(),
            TypeExpr::Record(fields) => Type::record(self.lower_fields(fields, false)?),
            TypeExpr::Variant(fields) => Type::variant(self.lower_fields(fields, true)?),
            TypeExpr::Func(func) => {
                let mut args = Vec::with_capacity(func.args.len());
                for arg in &func.args {
                    args.push(self.lower(&arg.ty)?);
                }
                let mut rets = Vec::with_capacity(func.rets.len());
                for ret in &func.rets {
                    rets.push(self.lower(&ret.ty)?);
                }
                let mut modes = Vec::with_capacity(func.modes.len());
                for mode in &func.modes {
                    modes.push(match mode.as_str() {
                        "query" => FuncMode::Query,
                        "oneway" => FuncMode::Oneway,
                        "composite_query" => FuncMode::CompositeQuery,
                        other => return Err(compile_error(format!("Unknown annotation {}", quote(other)))),
                    });
                }
                Type::Func(FuncType { args, rets, modes })
            }
            TypeExpr::Service(methods) => {
                let mut lowered = Vec::with_capacity(methods.len());
                for method in methods {
                    lowered.push(Method { name: method.name.clone(), ty: self.lower(&method.ty)? });
                }
                Type::service(lowered)
            }
        };
        Ok(ty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use brine_idl_schema::wire;

    #[test]
    fn test_compile_list() {
        let compiled = compile_idl("type List = record { head: int; tail: opt List };").unwrap();
        let table = &compiled.table;
        assert_eq!(table.len(), 2);
        assert_eq!(table.label_code("List"), Some(0));
        assert_eq!(
            compiled.definition("List"),
            Some(&Type::record(vec![
                Field::named("head", Type::Int),
                Field::named("tail", Type::opt(Type::id("List"))),
            ]))
        );
    }

    #[test]
    fn test_field_ids() {
        let compiled = compile_idl("type R = record { nat; 5: text; bool; a: int; reserved };").unwrap();
        let Some(Type::Record(fields)) = compiled.definition("R") else {
            panic!("expected a record");
        };
        let ids: Vec<u32> = fields.iter().map(|field| field.id).collect();
        assert_eq!(ids, vec![0, 2, 4, 5, 97]);
        assert_eq!(fields[1].ty, Type::Bool);

        let compiled = compile_idl("type V = variant { A; 0x10; \"B c\": text };").unwrap();
        let Some(Type::Variant(fields)) = compiled.definition("V") else {
            panic!("expected a variant");
        };
        assert_eq!(fields[0], Field::new(16, Type::Null));
        assert_eq!(fields[1], Field::new(idl_hash("A"), Type::Null));
        assert_eq!(fields[1].name.as_deref(), Some("A"));
        assert_eq!(fields[2].id, idl_hash("B c"));

        let compiled = compile_idl("type R = record { \"é\": nat };").unwrap();
        let Some(Type::Record(fields)) = compiled.definition("R") else {
            panic!("expected a record");
        };
        assert_eq!(fields[0].id, 233);

        assert!(matches!(
            compile_idl("type R = record { -1: nat };"),
            Err(IdlError::CompileError(_))
        ));
        assert!(matches!(
            compile_idl("type R = record { \"quoted\" };"),
            Err(IdlError::CompileError(_))
        ));
    }

    #[test]
    fn test_structural_duplicates_share_an_index() {
        let compiled = compile_idl(
            "type A = record { x: nat }; type B = record { x: nat }; type C = vec A; type D = vec B;",
        )
        .unwrap();
        let table = &compiled.table;
        assert_eq!(table.label_code("A"), table.label_code("B"));
        assert_eq!(table.label_code("A"), Some(0));
        assert_ne!(table.label_code("C"), table.label_code("D"));
    }

    #[test]
    fn test_aliases_point_at_their_target() {
        let compiled = compile_idl("type A = B; type B = C; type C = vec nat; type N = nat; type M = N;").unwrap();
        let table = &compiled.table;
        assert_eq!(table.label_code("A"), table.label_code("C"));
        assert_eq!(table.label_code("M"), Some(brine_idl_schema::TYPE_NAT));
        assert_eq!(compiled.definition("A"), Some(&Type::id("C")));
        assert_eq!(table.resolve("A"), Ok(&Type::vec(Type::Nat)));
        assert_eq!(compiled.definition("M"), Some(&Type::Nat));
    }

    #[test]
    fn test_primitive_aliases_share_entries() {
        let compiled = compile_idl(
            "type N = nat; type A = record { x: opt N }; type B = record { x: opt nat }; type C = vec N;",
        )
        .unwrap();
        let table = &compiled.table;
        assert_eq!(table.label_code("A"), Some(0));
        assert_eq!(table.label_code("B"), Some(0));
        assert_eq!(compiled.definition("C"), Some(&Type::vec(Type::Nat)));
        // record, opt nat, vec nat
        assert_eq!(table.len(), 3);
    }

    #[test]
    fn test_actor_methods() {
        let compiled = compile_idl(
            "type Account = record { owner: principal };\n\
             type Transfer = func (to: Account, amount: nat) -> (variant { ok; err: text });\n\
             service : (nat) -> {\n\
               balance: (Account) -> (nat) query;\n\
               transfer: Transfer;\n\
             }",
        )
        .unwrap();
        let actor = compiled.actor.as_ref().unwrap();
        assert_eq!(actor.init, vec![Type::Nat]);

        let balance = compiled.method("balance").unwrap();
        assert_eq!(balance.args, vec![Type::id("Account")]);
        assert_eq!(balance.modes, vec![FuncMode::Query]);
        let transfer = compiled.method("transfer").unwrap();
        assert_eq!(transfer.args.len(), 2);
        assert!(compiled.method("missing").is_err());

        let mut bb = brine_idl_schema::ByteBufferMut::new();
        wire::write_prelude(&compiled.table, &[], &mut bb).unwrap();
        let (decoded, _) = wire::read_prelude(&mut brine_idl_schema::ByteBuffer::new(&bb.data())).unwrap();
        assert_eq!(decoded.len(), compiled.table.len());
    }

    #[test]
    fn test_imports() {
        let files: HashMap<&str, &str> = HashMap::from([
            ("base.did", "type Id = nat64; service : { ignored: () -> () }"),
            ("user.did", "import \"base.did\"; type User = record { id: Id };"),
        ]);
        let loader = |path: &str| {
            files
                .get(path)
                .map(|text| text.to_string())
                .ok_or_else(|| IdlError::ImportError(path.to_owned()))
        };

        let compiled = compile_idl_with(
            "import \"user.did\"; import \"base.did\"; type Users = vec User;",
            loader,
        )
        .unwrap();
        let names: Vec<&str> = compiled.definitions.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(names, vec!["Id", "User", "Users"]);
        assert!(compiled.actor.is_none());

        assert!(matches!(
            compile_idl("import \"base.did\";"),
            Err(IdlError::ImportError(_))
        ));
    }

    #[test]
    fn test_import_cycles() {
        let loader = |path: &str| match path {
            "a.did" => Ok("import \"b.did\"; type A = nat;".to_owned()),
            "b.did" => Ok("import \"a.did\"; type B = nat;".to_owned()),
            other => Err(IdlError::ImportError(other.to_owned())),
        };
        match compile_idl_with("import \"a.did\";", loader) {
            Err(IdlError::ImportError(msg)) => assert_eq!(msg, "Import cycle: a.did -> b.did -> a.did"),
            other => panic!("expected an import cycle, got {:?}", other),
        }
    }
}
