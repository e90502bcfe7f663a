use crate::{
    tokenizer::Token,
    types::{Actor, ArgExpr, Definition, FieldExpr, FuncExpr, Import, Label, MethodExpr, Program, TypeExpr},
    utils::{error, quote},
    error::IdlError,
};
use brine_idl_schema::Type;
use lazy_static::lazy_static;
use log::debug;
use regex::Regex;

lazy_static! {
    static ref IDENTIFIER: Regex = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap();
    static ref NUMBER:     Regex = Regex::new(r"^([+-]?\d[0-9_]*|0[xX][0-9A-Fa-f_]+)$").unwrap();
    static ref TEXT:       Regex = Regex::new(r#"^".*"$"#).unwrap();
    static ref EOF:        Regex = Regex::new(r"^$").unwrap();
}

/// Keywords that start a type expression.
pub const TYPE_KEYWORDS: [&str; 7] = ["opt", "vec", "blob", "record", "variant", "func", "service"];

pub const FUNC_MODES: [&str; 3] = ["query", "oneway", "composite_query"];

static END: Token = Token { text: String::new(), line: 0, column: 0 };

fn is_type_keyword(text: &str) -> bool {
    TYPE_KEYWORDS.contains(&text) || Type::from_keyword(text).is_some()
}

struct Parser<'a> {
    tokens: &'a [Token],
    index:  usize,
}

impl<'a> Parser<'a> {
    fn current_token(&self) -> &'a Token {
        self.peek(0)
    }

    fn peek(&self, offset: usize) -> &'a Token {
        let tokens = self.tokens;
        tokens
            .get(self.index + offset)
            .or_else(|| tokens.last())
            .unwrap_or(&END)
    }

    fn at(&self, text: &str) -> bool {
        self.current_token().text == text
    }

    fn eat(&mut self, text: &str) -> bool {
        if self.at(text) {
            self.index += 1;
            true
        } else {
            false
        }
    }

    fn eat_match(&mut self, test: &Regex) -> Option<&'a Token> {
        let tok = self.current_token();
        if test.is_match(&tok.text) {
            self.index += 1;
            Some(tok)
        } else {
            None
        }
    }

    fn expect(&mut self, text: &str) -> Result<(), IdlError> {
        if !self.eat(text) {
            return Err(self.expected(&quote(text)));
        }
        Ok(())
    }

    fn expect_match(&mut self, test: &Regex, expected: &str) -> Result<&'a Token, IdlError> {
        self.eat_match(test).ok_or_else(|| self.expected(expected))
    }

    fn expected(&self, expected: &str) -> IdlError {
        let tok = self.current_token();
        let found = if tok.text.is_empty() { "end of input".to_owned() } else { quote(&tok.text) };
        error(&format!("Expected {} but found {}", expected, found), tok.line, tok.column)
    }

    fn unexpected_token(&self) -> IdlError {
        let tok = self.current_token();
        error(&format!("Unexpected token {}", quote(&tok.text)), tok.line, tok.column)
    }

    /// Consumes `separator` unless the list closes here.
    fn separator(&mut self, separator: &str, close: &str) -> Result<(), IdlError> {
        if !self.eat(separator) && !self.at(close) {
            return Err(self.expected(&format!("{} or {}", quote(separator), quote(close))));
        }
        Ok(())
    }

    fn program(&mut self) -> Result<Program, IdlError> {
        let mut imports     = Vec::new();
        let mut definitions = Vec::new();

        loop {
            let tok = self.current_token();
            if self.eat("type") {
                let name_tok = self.expect_match(&IDENTIFIER, "identifier")?;
                self.expect("=")?;
                let ty = self.type_expr()?;
                definitions.push(Definition {
                    name:   name_tok.text.clone(),
                    line:   name_tok.line,
                    column: name_tok.column,
                    ty,
                });
            } else if self.eat("import") {
                let path_tok = self.expect_match(&TEXT, "quoted path")?;
                imports.push(Import {
                    path:   unescape(path_tok)?,
                    line:   tok.line,
                    column: tok.column,
                });
            } else {
                break;
            }
            self.eat(";");
        }

        let actor = if self.at("service") {
            let actor = self.actor()?;
            self.eat(";");
            Some(actor)
        } else {
            None
        };

        if self.eat_match(&EOF).is_none() {
            return Err(self.unexpected_token());
        }

        Ok(Program { imports, definitions, actor })
    }

    fn actor(&mut self) -> Result<Actor, IdlError> {
        let tok = self.current_token();
        self.expect("service")?;
        let name = self.eat_match(&IDENTIFIER).map(|name_tok| name_tok.text.clone());
        self.expect(":")?;

        let init = if self.at("(") {
            let args = self.args()?;
            self.expect("->")?;
            Some(args)
        } else {
            None
        };

        let body = if self.at("{") {
            TypeExpr::Service(self.methods()?)
        } else if let Some(name_tok) = self.eat_match(&IDENTIFIER) {
            name_ref(name_tok)
        } else {
            return Err(self.expected("service body or service name"));
        };

        Ok(Actor { name, line: tok.line, column: tok.column, init, body })
    }

    fn type_expr(&mut self) -> Result<TypeExpr, IdlError> {
        let tok = self.current_token();
        let ty = match tok.text.as_str() {
            "opt" => {
                self.index += 1;
                TypeExpr::Opt(Box::new(self.type_expr()?))
            }
            "vec" => {
                self.index += 1;
                TypeExpr::Vec(Box::new(self.type_expr()?))
            }
            "blob" => {
                self.index += 1;
                TypeExpr::Blob
            }
            "record" => {
                self.index += 1;
                TypeExpr::Record(self.fields()?)
            }
            "variant" => {
                self.index += 1;
                TypeExpr::Variant(self.fields()?)
            }
            "func" => {
                self.index += 1;
                TypeExpr::Func(self.func_signature()?)
            }
            "service" => {
                self.index += 1;
                TypeExpr::Service(self.methods()?)
            }
            text if Type::from_keyword(text).is_some() => {
                self.index += 1;
                TypeExpr::Primitive(text.to_owned())
            }
            _ => match self.eat_match(&IDENTIFIER) {
                Some(name_tok) => name_ref(name_tok),
                None => return Err(self.expected("type")),
            },
        };
        Ok(ty)
    }

    fn label(&mut self) -> Result<Option<Label>, IdlError> {
        let tok = self.current_token();
        let label = if IDENTIFIER.is_match(&tok.text) {
            Label::Name(tok.text.clone())
        } else if TEXT.is_match(&tok.text) {
            Label::Text(unescape(tok)?)
        } else if NUMBER.is_match(&tok.text) {
            Label::Id(tok.text.clone())
        } else {
            return Ok(None);
        };
        self.index += 1;
        Ok(Some(label))
    }

    fn fields(&mut self) -> Result<Vec<FieldExpr>, IdlError> {
        self.expect("{")?;
        let mut fields = Vec::new();

        while !self.eat("}") {
            let tok = self.current_token();
            let next = &self.peek(1).text;
            let bare_keyword = is_type_keyword(&tok.text);

            let (label, ty) = if next == ":" {
                let label = self.label()?.ok_or_else(|| self.expected("field name or id"))?;
                self.expect(":")?;
                (Some(label), Some(self.type_expr()?))
            } else if (next == ";" || next == "}") && !bare_keyword {
                match self.label()? {
                    Some(label) => (Some(label), None),
                    None => (None, Some(self.type_expr()?)),
                }
            } else {
                (None, Some(self.type_expr()?))
            };

            fields.push(FieldExpr { label, ty, line: tok.line, column: tok.column });
            self.separator(";", "}")?;
        }

        Ok(fields)
    }

    fn func_signature(&mut self) -> Result<FuncExpr, IdlError> {
        let args = self.args()?;
        self.expect("->")?;
        let rets = self.args()?;
        let mut modes = Vec::new();
        while FUNC_MODES.contains(&self.current_token().text.as_str()) {
            modes.push(self.current_token().text.clone());
            self.index += 1;
        }
        Ok(FuncExpr { args, rets, modes })
    }

    fn args(&mut self) -> Result<Vec<ArgExpr>, IdlError> {
        self.expect("(")?;
        let mut args = Vec::new();

        while !self.eat(")") {
            let tok = self.current_token();
            let name = if self.peek(1).text == ":" && (IDENTIFIER.is_match(&tok.text) || TEXT.is_match(&tok.text)) {
                let name = if TEXT.is_match(&tok.text) { unescape(tok)? } else { tok.text.clone() };
                self.index += 2;
                Some(name)
            } else {
                None
            };
            let ty = self.type_expr()?;
            args.push(ArgExpr { name, ty });
            self.separator(",", ")")?;
        }

        Ok(args)
    }

    fn methods(&mut self) -> Result<Vec<MethodExpr>, IdlError> {
        self.expect("{")?;
        let mut methods = Vec::new();

        while !self.eat("}") {
            let tok = self.current_token();
            let name = if IDENTIFIER.is_match(&tok.text) {
                tok.text.clone()
            } else if TEXT.is_match(&tok.text) {
                unescape(tok)?
            } else {
                return Err(self.expected("method name"));
            };
            self.index += 1;
            self.expect(":")?;

            let ty = if self.at("(") {
                TypeExpr::Func(self.func_signature()?)
            } else if let Some(name_tok) = self.eat_match(&IDENTIFIER) {
                name_ref(name_tok)
            } else {
                return Err(self.expected("function signature or function type name"));
            };

            methods.push(MethodExpr { name, line: tok.line, column: tok.column, ty });
            self.separator(";", "}")?;
        }

        Ok(methods)
    }
}

fn name_ref(tok: &Token) -> TypeExpr {
    TypeExpr::Name {
        name:   tok.text.clone(),
        line:   tok.line,
        column: tok.column,
    }
}

/// Decodes a quoted token. Supports `\n`, `\r`, `\t`, `\\`, `\"`, `\'`,
/// two-digit hex byte escapes and `\u{...}`; the result must be valid UTF-8.
fn unescape(tok: &Token) -> Result<String, IdlError> {
    let invalid = |what: &str| error(&format!("{} in {}", what, tok.text), tok.line, tok.column);

    let inner = tok
        .text
        .strip_prefix('"')
        .and_then(|text| text.strip_suffix('"'))
        .ok_or_else(|| invalid("Unterminated text"))?;

    let mut bytes = Vec::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            let mut buf = [0u8; 4];
            bytes.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
            continue;
        }
        match chars.next() {
            Some('n') => bytes.push(b'\n'),
            Some('r') => bytes.push(b'\r'),
            Some('t') => bytes.push(b'\t'),
            Some('\\') => bytes.push(b'\\'),
            Some('"') => bytes.push(b'"'),
            Some('\'') => bytes.push(b'\''),
            Some('u') => {
                if chars.next() != Some('{') {
                    return Err(invalid("Invalid unicode escape"));
                }
                let hex: String = chars.by_ref().take_while(|&c| c != '}').collect();
                let c = u32::from_str_radix(&hex, 16)
                    .ok()
                    .and_then(char::from_u32)
                    .ok_or_else(|| invalid("Invalid unicode escape"))?;
                let mut buf = [0u8; 4];
                bytes.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
            }
            Some(high) => {
                let low = chars.next().ok_or_else(|| invalid("Invalid escape"))?;
                let byte = [high, low]
                    .iter()
                    .collect::<String>();
                let byte = u8::from_str_radix(&byte, 16).map_err(|_| invalid("Invalid escape"))?;
                bytes.push(byte);
            }
            None => return Err(invalid("Invalid escape")),
        }
    }

    String::from_utf8(bytes).map_err(|_| invalid("Invalid UTF-8"))
}

/// Parses a token stream produced by
/// [`tokenize_idl`](crate::tokenizer::tokenize_idl).
pub fn parse_idl(tokens: &[Token]) -> Result<Program, IdlError> {
    let mut parser = Parser { tokens, index: 0 };
    let program = parser.program()?;
    debug!(
        "parsed {} definitions and {} imports",
        program.definitions.len(),
        program.imports.len()
    );
    Ok(program)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenizer::tokenize_idl;

    fn parse(text: &str) -> Result<Program, IdlError> {
        parse_idl(&tokenize_idl(text)?)
    }

    fn name(text: &str, line: usize, column: usize) -> TypeExpr {
        TypeExpr::Name { name: text.to_owned(), line, column }
    }

    #[test]
    fn test_parse_definitions() {
        let program = parse("type A = nat; type B = opt vec A\ntype C = blob;").unwrap();
        assert_eq!(program.definitions.len(), 3);
        assert_eq!(program.definitions[0].ty, TypeExpr::Primitive("nat".into()));
        assert_eq!(
            program.definitions[1].ty,
            TypeExpr::Opt(Box::new(TypeExpr::Vec(Box::new(name("A", 1, 32)))))
        );
        assert_eq!(program.definitions[2].name, "C");
        assert_eq!(program.definitions[2].line, 2);
        assert_eq!(program.definitions[2].ty, TypeExpr::Blob);
        assert!(program.actor.is_none());
    }

    #[test]
    fn test_parse_field_forms() {
        let program = parse(r#"type R = record { a: nat; 0x10: text; "q x": bool; int; Other }"#).unwrap();
        let TypeExpr::Record(fields) = &program.definitions[0].ty else {
            panic!("expected a record");
        };
        assert_eq!(fields.len(), 5);
        assert_eq!(fields[0].label, Some(Label::Name("a".into())));
        assert_eq!(fields[1].label, Some(Label::Id("0x10".into())));
        assert_eq!(fields[2].label, Some(Label::Text("q x".into())));
        assert_eq!(fields[3].label, None);
        assert_eq!(fields[3].ty, Some(TypeExpr::Primitive("int".into())));
        assert_eq!(fields[4].label, Some(Label::Name("Other".into())));
        assert_eq!(fields[4].ty, None);

        let program = parse("type V = variant { A; B: text; 7 }").unwrap();
        let TypeExpr::Variant(fields) = &program.definitions[0].ty else {
            panic!("expected a variant");
        };
        assert_eq!(fields[0].ty, None);
        assert_eq!(fields[2].label, Some(Label::Id("7".into())));
    }

    #[test]
    fn test_parse_func_and_service() {
        let program = parse(
            "type F = func (to: principal, nat) -> () oneway;\n\
             service Ledger : (text) -> {\n  send: F;\n  balance: (principal) -> (nat) query composite_query;\n}",
        )
        .unwrap();
        let TypeExpr::Func(func) = &program.definitions[0].ty else {
            panic!("expected a func");
        };
        assert_eq!(func.args.len(), 2);
        assert_eq!(func.args[0].name.as_deref(), Some("to"));
        assert_eq!(func.modes, vec!["oneway".to_owned()]);

        let actor = program.actor.unwrap();
        assert_eq!(actor.name.as_deref(), Some("Ledger"));
        assert_eq!(actor.init.as_ref().map(Vec::len), Some(1));
        let TypeExpr::Service(methods) = &actor.body else {
            panic!("expected a service body");
        };
        assert_eq!(methods[0].ty, name("F", 3, 9));
        assert!(matches!(&methods[1].ty, TypeExpr::Func(f) if f.modes.len() == 2));
    }

    #[test]
    fn test_parse_imports_and_named_actor() {
        let program = parse("import \"base.did\";\ntype T = Base;\nservice : Api").unwrap();
        assert_eq!(program.imports[0].path, "base.did");
        assert_eq!(program.actor.unwrap().body, name("Api", 3, 11));
    }

    #[test]
    fn test_parse_text_escapes() {
        let program = parse(r#"type R = record { "a\"b\u{e9}\41": nat }"#).unwrap();
        let TypeExpr::Record(fields) = &program.definitions[0].ty else {
            panic!("expected a record");
        };
        assert_eq!(fields[0].label, Some(Label::Text("a\"b\u{e9}A".into())));
    }

    #[test]
    fn test_parse_errors_carry_position() {
        let err = parse("type A = record { a: nat\n b: nat }").unwrap_err();
        match err {
            IdlError::ParseError { line, column, .. } => assert_eq!((line, column), (2, 2)),
            other => panic!("expected a ParseError, got {:?}", other),
        }

        for input in ["type = nat;", "type A nat;", "type A = ;", "service : { m: 5 }", "type A = nat; junk"] {
            assert!(matches!(parse(input), Err(IdlError::ParseError { .. })), "{}", input);
        }
    }
}
