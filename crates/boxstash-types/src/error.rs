use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid hex string: {0}")]
    InvalidHex(String),

    #[error("invalid byte length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("invalid ABI type descriptor `{descriptor}`: {reason}")]
    InvalidAbiType { descriptor: String, reason: String },

    #[error("ABI value does not match type {expected}")]
    AbiMismatch { expected: String },

    #[error("value {value} does not fit in uint{bits}")]
    AbiOverflow { value: u64, bits: u16 },

    #[error("unknown blob status code {0}")]
    UnknownStatus(u8),

    #[error("invalid store limits: {0}")]
    InvalidLimits(String),

    #[error("invalid document locator `{locator}`: {reason}")]
    InvalidLocator { locator: String, reason: String },
}
