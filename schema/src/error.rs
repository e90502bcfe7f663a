use thiserror::Error;

/// Failures raised while reading or writing the binary wire format.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WireError {
    #[error("Unexpected end of input")]
    UnexpectedEof,

    #[error("Malformed variable-length integer")]
    MalformedVarint,

    #[error("Bad magic tag, expected \"DIDL\"")]
    BadMagic,

    #[error("Unknown type opcode {0}")]
    UnknownType(i64),

    #[error("Invalid boolean byte {0:#04x}")]
    InvalidBoolean(u8),

    #[error("Invalid presence flag {0:#04x}")]
    InvalidPresenceFlag(u8),

    #[error("Values of type empty cannot be serialized or deserialized")]
    EmptySerialization,

    #[error("Text is not valid UTF-8")]
    InvalidUtf8,

    #[error("Variant tag {0} is not an alternative of the expected type")]
    InvalidVariantTag(u64),

    #[error("Invalid type table: {0}")]
    InvalidTypeTable(String),

    #[error("Unresolved type name \"{0}\"")]
    UnresolvedName(String),

    #[error("Type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: String, found: String },

    #[error("Missing record field {0}")]
    MissingField(u32),

    #[error("{0} trailing bytes after the last value")]
    TrailingBytes(usize),

    #[error("Nesting exceeds the decoder depth limit")]
    RecursionLimit,

    #[error("More than {0} zero-size elements in one message")]
    TooManyElements(u64),
}

impl WireError {
    pub(crate) fn mismatch(expected: impl ToString, found: impl ToString) -> WireError {
        WireError::TypeMismatch {
            expected: expected.to_string(),
            found:    found.to_string(),
        }
    }
}
