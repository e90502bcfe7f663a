use serde::Serialize;

/// A parsed IDL file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Program {
    pub imports:     Vec<Import>,
    pub definitions: Vec<Definition>,
    pub actor:       Option<Actor>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Import {
    pub path:   String,
    pub line:   usize,
    pub column: usize,
}

/// `type name = ty;`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Definition {
    pub name:   String,
    pub line:   usize,
    pub column: usize,
    pub ty:     TypeExpr,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum TypeExpr {
    /// A reference to a definition.
    Name {
        name:   String,
        line:   usize,
        column: usize,
    },
    /// A primitive keyword such as `nat` or `principal`.
    Primitive(String),
    Opt(Box<TypeExpr>),
    Vec(Box<TypeExpr>),
    Blob,
    Record(Vec<FieldExpr>),
    Variant(Vec<FieldExpr>),
    Func(FuncExpr),
    Service(Vec<MethodExpr>),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Label {
    /// A bare identifier.
    Name(String),
    /// A quoted name, already unescaped.
    Text(String),
    /// A decimal or hex literal, as written.
    Id(String),
}

/// One entry of a record or variant body.
///
/// `label` is absent for positional fields; `ty` is absent for the bare
/// shorthand (`variant { A }`, or `record { T }` with `T` a type name).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldExpr {
    pub label:  Option<Label>,
    pub ty:     Option<TypeExpr>,
    pub line:   usize,
    pub column: usize,
}

/// A function argument or result. Names are documentation only.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArgExpr {
    pub name: Option<String>,
    pub ty:   TypeExpr,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FuncExpr {
    pub args:  Vec<ArgExpr>,
    pub rets:  Vec<ArgExpr>,
    pub modes: Vec<String>,
}

/// `name : (args) -> (rets)` or `name : FuncName` inside a service body.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MethodExpr {
    pub name:   String,
    pub line:   usize,
    pub column: usize,
    pub ty:     TypeExpr,
}

/// The trailing `service name? : (init args ->)? body` declaration.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Actor {
    pub name:   Option<String>,
    pub line:   usize,
    pub column: usize,
    pub init:   Option<Vec<ArgExpr>>,
    /// Either a service body or the name of a service definition.
    pub body:   TypeExpr,
}
