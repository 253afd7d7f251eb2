//! Type conversion error types.

use thiserror::Error;

/// Errors that can occur during value validation and encoding.
///
/// The coercion variants carry the exact message surfaced to callers
/// when a bulk-load cell fails validation; the bulk engine aborts the
/// load with this error and leaves the connection reusable.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TypeError {
    /// Value cannot be coerced to a date.
    #[error("Invalid date.")]
    InvalidDate,

    /// Value cannot be coerced to a time.
    #[error("Invalid time.")]
    InvalidTime,

    /// Value cannot be coerced to a number or is out of range.
    #[error("Invalid number.")]
    InvalidNumber,

    /// Value is not a string.
    #[error("Invalid string.")]
    InvalidString,

    /// Value cannot be coerced to a boolean.
    #[error("Invalid boolean.")]
    InvalidBoolean,

    /// Value is not a byte buffer.
    #[error("Invalid buffer.")]
    InvalidBuffer,

    /// Value cannot be coerced to a GUID.
    #[error("Invalid GUID.")]
    InvalidGuid,

    /// NULL in a column declared NOT NULL.
    #[error("unexpected null value")]
    UnexpectedNull,

    /// Value does not fit the column's declared length.
    #[error("value too large: need {needed} bytes, column holds {available}")]
    ValueTooLarge {
        /// Bytes needed.
        needed: usize,
        /// Bytes available in the column.
        available: usize,
    },

    /// Value type has no encoding for the target column type.
    #[error("unsupported conversion from {from} to {to}")]
    UnsupportedConversion {
        /// Source value type.
        from: &'static str,
        /// Target column type.
        to: &'static str,
    },
}
