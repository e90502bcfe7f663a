use brine_idl_schema::WireError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IdlError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error at line {line}, column {column}: {msg}")]
    ParseError {
        msg:    String,
        line:   usize,
        column: usize,
    },

    #[error("Compile error: {0}")]
    CompileError(String),

    #[error("Import error: {0}")]
    ImportError(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Wire error: {0}")]
    Wire(#[from] WireError),
}
