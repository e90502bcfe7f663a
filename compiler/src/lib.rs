//! brine-idl-compiler
//!
//! This crate implements:
//!  1) A tokenizer + parser for `.did` interface files,
//!  2) A verifier (duplicate names, unresolved names, duplicate field ids, uninhabited cycles, etc.),
//!  3) The compiler from parsed definitions to a frozen [`TypeTable`](brine_idl_schema::TypeTable),
//!     with imports fetched through a caller supplied loader,
//!  4) Error types (`IdlError`).

pub mod error;
pub mod types;
pub mod utils;
pub mod tokenizer;
pub mod parser;
pub mod verifier;
pub mod compiler;

pub use compiler::compile_idl;
pub use compiler::compile_idl_with;
pub use compiler::compile_program;
pub use compiler::parse_source;
pub use compiler::{CompiledActor, CompiledIdl};
pub use error::IdlError;
