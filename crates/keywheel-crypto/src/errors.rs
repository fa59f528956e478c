//! Error types for cryptographic operations.

use keywheel_proto::CipherId;

/// Errors produced by key derivation, key wrapping, and packet ciphers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CryptoError {
    /// The cipher identity is recognized on the wire but has no
    /// implementation in this build.
    #[error("unsupported cipher: {0:?}")]
    UnsupportedCipher(CipherId),

    /// A key buffer has a length outside the supported AES sizes.
    #[error("invalid key length: {len} bytes (expected 16, 24, or 32)")]
    InvalidKeyLength {
        /// Length of the offending key buffer.
        len: usize,
    },

    /// A payload exceeds the maximum the cipher was opened for.
    #[error("payload too long: {len} bytes (cipher opened for {max})")]
    PayloadTooLong {
        /// Length of the offending payload.
        len: usize,
        /// Maximum payload length fixed at open time.
        max: usize,
    },

    /// A wrap input or output buffer is not a whole number of
    /// semiblocks, or is below the minimum wrappable size.
    #[error("bad key wrap length: {len} bytes")]
    WrapLength {
        /// Length of the offending buffer.
        len: usize,
    },

    /// Unwrapping produced a corrupt integrity block: the wrapped key
    /// was tampered with or the KEK does not match.
    #[error("key unwrap integrity check failed")]
    WrapIntegrity,
}

/// Convenience alias for crypto results.
pub type Result<T> = core::result::Result<T, CryptoError>;
