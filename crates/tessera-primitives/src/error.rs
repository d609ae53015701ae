//! Parse errors for fixed-width values

use thiserror::Error;

/// Error returned when a fixed-width value cannot be parsed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PrimitiveError {
    /// Input was not valid hex
    #[error("invalid hex string: {0}")]
    InvalidHex(String),

    /// Input decoded to the wrong number of bytes
    #[error("invalid length for {kind}: expected {expected} bytes, got {got}")]
    InvalidLength {
        /// Name of the target type
        kind: &'static str,
        /// Required byte count
        expected: usize,
        /// Byte count actually supplied
        got: usize,
    },
}
