use thiserror::Error;

/// Failure to decode a wire entity. Decoding never yields a partial value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("type mismatch: expected tag {expected:#04x}, found {found:#04x}")]
    TypeMismatch { expected: u8, found: u8 },

    #[error("truncated input: {field} needs {needed} bytes, {remaining} remaining")]
    Truncated {
        field: &'static str,
        needed: usize,
        remaining: usize,
    },

    #[error("malformed field {field}: {reason}")]
    MalformedField { field: &'static str, reason: String },
}

impl DecodeError {
    pub fn malformed(field: &'static str, reason: impl Into<String>) -> Self {
        Self::MalformedField {
            field,
            reason: reason.into(),
        }
    }
}

/// Failure to encode a value into its wire form.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodeError {
    #[error("field {field} is {len} bytes, maximum is {max}")]
    FieldTooLarge {
        field: &'static str,
        len: usize,
        max: usize,
    },

    #[error("value of {field} does not fit its wire width: {value}")]
    OutOfRange { field: &'static str, value: u64 },
}
