use std::collections::{HashMap, HashSet};
use crate::{
    compiler::{field_layout, FieldBody},
    parser::{FUNC_MODES, TYPE_KEYWORDS},
    types::{Definition, Program, TypeExpr},
    utils::{compile_error, quote},
    error::IdlError,
};
use brine_idl_schema::Type;

pub const RESERVED_NAMES: [&str; 2] = ["type", "import"];

fn is_reserved(name: &str) -> bool {
    RESERVED_NAMES.contains(&name)
        || TYPE_KEYWORDS.contains(&name)
        || FUNC_MODES.contains(&name)
        || Type::from_keyword(name).is_some()
}

/// Calls `f` on `expr` and every type expression nested in it.
pub fn walk<'a, F>(expr: &'a TypeExpr, f: &mut F) -> Result<(), IdlError>
where
    F: FnMut(&'a TypeExpr) -> Result<(), IdlError>,
{
    f(expr)?;
    match expr {
        TypeExpr::Opt(inner) | TypeExpr::Vec(inner) => walk(inner, f),
        TypeExpr::Record(fields) | TypeExpr::Variant(fields) => {
            for field in fields {
                if let Some(ty) = &field.ty {
                    walk(ty, f)?;
                }
            }
            Ok(())
        }
        TypeExpr::Func(func) => {
            for arg in func.args.iter().chain(&func.rets) {
                walk(&arg.ty, f)?;
            }
            Ok(())
        }
        TypeExpr::Service(methods) => {
            for method in methods {
                walk(&method.ty, f)?;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

struct Verifier<'a> {
    definitions: HashMap<&'a str, &'a Definition>,
}

impl<'a> Verifier<'a> {
    /// The body a name stands for once aliases are followed.
    fn target(&self, name: &str) -> Option<&'a TypeExpr> {
        let mut body = &self.definitions.get(name).copied()?.ty;
        for _ in 0..=self.definitions.len() {
            match body {
                TypeExpr::Name { name, .. } => body = &self.definitions.get(name.as_str()).copied()?.ty,
                other => return Some(other),
            }
        }
        None
    }

    fn check_defined(&self, name: &str, line: usize, column: usize) -> Result<(), IdlError> {
        if !self.definitions.contains_key(name) {
            return Err(compile_error(format!(
                "The type {} is not defined (line {}, column {})",
                quote(name),
                line,
                column
            )));
        }
        Ok(())
    }

    fn check_node(&self, expr: &'a TypeExpr) -> Result<(), IdlError> {
        match expr {
            TypeExpr::Name { name, line, column } => self.check_defined(name, *line, *column),
            TypeExpr::Record(fields) | TypeExpr::Variant(fields) => {
                let layout = field_layout(fields, matches!(expr, TypeExpr::Variant(_)))?;
                let mut ids = HashSet::new();
                for slot in &layout {
                    if !ids.insert(slot.id) {
                        return Err(compile_error(format!(
                            "The id {} is used twice (line {}, column {})",
                            slot.id, slot.line, slot.column
                        )));
                    }
                    if let FieldBody::Named(name) = slot.body {
                        self.check_defined(name, slot.line, slot.column)?;
                    }
                }
                Ok(())
            }
            TypeExpr::Func(func) => {
                let mut modes = HashSet::new();
                for mode in &func.modes {
                    if !modes.insert(mode.as_str()) {
                        return Err(compile_error(format!("The annotation {} is repeated", quote(mode))));
                    }
                }
                if modes.len() > 1 {
                    return Err(compile_error(format!(
                        "A function cannot be both {}",
                        func.modes.join(" and ")
                    )));
                }
                if modes.contains("oneway") && !func.rets.is_empty() {
                    return Err(compile_error("A oneway function cannot return results"));
                }
                Ok(())
            }
            TypeExpr::Service(methods) => {
                let mut names = HashSet::new();
                for method in methods {
                    if !names.insert(method.name.as_str()) {
                        return Err(compile_error(format!(
                            "The method {} is defined twice (line {}, column {})",
                            quote(&method.name),
                            method.line,
                            method.column
                        )));
                    }
                    if let TypeExpr::Name { name, .. } = &method.ty {
                        if !matches!(self.target(name), Some(TypeExpr::Func(_))) {
                            return Err(compile_error(format!(
                                "The method {} must have a function type, but {} is not one",
                                quote(&method.name),
                                quote(name)
                            )));
                        }
                    }
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Names reachable from `expr` without passing through a type that has
    /// an empty value (`opt`, `vec`, variants and references).
    fn direct_refs(&self, expr: &'a TypeExpr, out: &mut Vec<&'a str>) -> Result<(), IdlError> {
        match expr {
            TypeExpr::Name { name, .. } => out.push(name),
            TypeExpr::Record(fields) => {
                for slot in field_layout(fields, false)? {
                    match slot.body {
                        FieldBody::Expr(ty) => self.direct_refs(ty, out)?,
                        FieldBody::Named(name) => out.push(name),
                        FieldBody::Null => {}
                    }
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn check_recursion(&self, name: &'a str, state: &mut HashMap<&'a str, u8>) -> Result<(), IdlError> {
        let definition = match self.definitions.get(name) {
            Some(def) => *def,
            None => return Ok(()),
        };
        match state.get(name) {
            Some(1) => {
                return Err(compile_error(format!(
                    "Recursive nesting of {} is not allowed",
                    quote(name)
                )))
            }
            Some(_) => return Ok(()),
            None => {}
        }
        state.insert(name, 1);
        let mut refs = Vec::new();
        self.direct_refs(&definition.ty, &mut refs)?;
        for next in refs {
            self.check_recursion(next, state)?;
        }
        state.insert(name, 2);
        Ok(())
    }
}

/// Returns `Ok(())` if verification passed, or `Err(IdlError::CompileError(_))` otherwise.
pub fn verify_program(program: &Program) -> Result<(), IdlError> {
    let mut definitions: HashMap<&str, &Definition> = HashMap::new();

    // 1) Check duplicate / reserved type names
    for def in &program.definitions {
        if is_reserved(&def.name) {
            return Err(compile_error(format!(
                "The type name {} is reserved (line {}, column {})",
                quote(&def.name),
                def.line,
                def.column
            )));
        }
        if definitions.insert(def.name.as_str(), def).is_some() {
            return Err(compile_error(format!(
                "The type {} is defined twice (line {}, column {})",
                quote(&def.name),
                def.line,
                def.column
            )));
        }
    }

    let verifier = Verifier { definitions };

    // 2) Check that no definition contains itself without an escape
    let mut state: HashMap<&str, u8> = HashMap::new();
    for def in &program.definitions {
        verifier.check_recursion(&def.name, &mut state)?;
    }

    // 3) Check every node of every definition, then the actor
    for def in &program.definitions {
        walk(&def.ty, &mut |expr| verifier.check_node(expr))?;
    }

    if let Some(actor) = &program.actor {
        for arg in actor.init.iter().flatten() {
            walk(&arg.ty, &mut |expr| verifier.check_node(expr))?;
        }
        walk(&actor.body, &mut |expr| verifier.check_node(expr))?;
        if let TypeExpr::Name { name, .. } = &actor.body {
            if !matches!(verifier.target(name), Some(TypeExpr::Service(_))) {
                return Err(compile_error(format!(
                    "The actor must have a service type, but {} is not one",
                    quote(name)
                )));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{parser::parse_idl, tokenizer::tokenize_idl};

    fn verify(text: &str) -> Result<(), IdlError> {
        verify_program(&parse_idl(&tokenize_idl(text)?)?)
    }

    fn assert_rejected(text: &str, needle: &str) {
        match verify(text) {
            Err(IdlError::CompileError(msg)) => assert!(msg.contains(needle), "{}: {}", text, msg),
            other => panic!("expected a CompileError for {}, got {:?}", text, other),
        }
    }

    #[test]
    fn test_accepts_recursion_through_opt() {
        verify("type List = record { head: int; tail: opt List };").unwrap();
        verify("type Tree = variant { leaf: int; node: record { Tree; Tree } };").unwrap();
        verify("type A = vec B; type B = record { a: A };").unwrap();
    }

    #[test]
    fn test_rejects_bad_names() {
        assert_rejected("type A = nat; type A = text;", "defined twice");
        assert_rejected("type nat = text;", "reserved");
        assert_rejected("type A = record { b: B };", "not defined");
        assert_rejected("type A = record { B };", "not defined");
        assert_rejected("service : Missing", "not defined");
    }

    #[test]
    fn test_rejects_uninhabited_cycles() {
        assert_rejected("type A = B; type B = A;", "Recursive nesting");
        assert_rejected("type A = record { a: A };", "Recursive nesting");
        assert_rejected("type A = record { b: record { a: A } };", "Recursive nesting");
    }

    #[test]
    fn test_rejects_duplicate_ids() {
        assert_rejected("type A = record { a: nat; a: text };", "used twice");
        assert_rejected("type A = record { 97: nat; a: text };", "used twice");
        assert_rejected("type A = record { nat; 0: text };", "used twice");
        assert_rejected("type A = record { 1: nat; text };", "used twice");
        verify("type A = record { 1: nat; 3: text; bool };").unwrap();
        assert_rejected("type A = variant { X; X };", "used twice");
    }

    #[test]
    fn test_rejects_bad_services() {
        assert_rejected("service : { m: () -> (); m: () -> () }", "defined twice");
        assert_rejected("type T = nat; service : { m: T }", "function type");
        assert_rejected("type F = func () -> (nat) oneway;", "oneway");
        assert_rejected("type F = func () -> () query query;", "repeated");
        assert_rejected("type F = func () -> () query oneway;", "both");
        assert_rejected("type S = nat; service : S", "service type");
        verify("type F = func (nat) -> (); type G = F; service : { m: G }").unwrap();
    }
}
