use crate::error::IdlError;

pub fn quote(text: &str) -> String {
    serde_json::to_string(text).unwrap_or_else(|_| format!("\"{}\"", text))
}

pub fn error(msg: &str, line: usize, column: usize) -> IdlError {
    IdlError::ParseError {
        msg: msg.to_owned(),
        line,
        column,
    }
}

pub fn compile_error(msg: impl Into<String>) -> IdlError {
    IdlError::CompileError(msg.into())
}
