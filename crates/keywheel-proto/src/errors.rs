//! Wire-format error types.
//!
//! Every decode failure is a distinct variant so callers (and tests) can
//! tell malformed framing apart from unknown enumerated values. Decoding
//! is total: no input byte sequence panics, every rejection is one of
//! these errors.

use thiserror::Error;

/// Result alias for wire-format operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors produced while encoding or decoding wire records.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// Record or prefix shorter than its fixed minimum.
    #[error("record too short: expected at least {expected} bytes, got {actual}")]
    Truncated {
        /// Minimum byte count the record family requires.
        expected: usize,
        /// Bytes actually available.
        actual: usize,
    },

    /// Record sign does not match [`crate::HAI_SIGN`].
    #[error("invalid record sign {0:#06x}")]
    InvalidSign(u16),

    /// Tag byte carries a wire version this implementation does not speak.
    #[error("unsupported wire version {0}")]
    UnsupportedVersion(u8),

    /// Tag byte carries an unexpected packet type for this record family.
    #[error("unexpected packet type {0}")]
    UnexpectedPacketType(u8),

    /// Key-flag bits are not a defined combination for this record family.
    #[error("invalid key flags {0:#04b}")]
    InvalidKeyFlags(u8),

    /// Key-encrypting-key index other than the default (0); KEK rollover
    /// is not part of the protocol.
    #[error("unknown KEK index {0}")]
    UnknownKek(u32),

    /// Cipher id byte is not a defined value.
    #[error("unknown cipher id {0}")]
    UnknownCipher(u8),

    /// Message-authentication id other than "none".
    #[error("unknown auth id {0}")]
    UnknownAuth(u8),

    /// Stream-encapsulation byte is not a defined value.
    #[error("unknown stream encapsulation {0}")]
    UnknownEncapsulation(u8),

    /// Declared salt length exceeds the protocol maximum.
    #[error("salt length {0} exceeds maximum")]
    SaltTooLong(usize),

    /// Declared key length is not a valid AES key size.
    #[error("invalid wrapped-key length {0}")]
    InvalidKeyLength(usize),

    /// Record length disagrees with the lengths its header declares.
    #[error("record length mismatch: header declares {declared} bytes, record has {actual}")]
    LengthMismatch {
        /// Total length implied by the header's length fields.
        declared: usize,
        /// Length of the record actually presented.
        actual: usize,
    },
}
