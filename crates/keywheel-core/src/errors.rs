//! Session-layer error types.
//!
//! Construction failures are fatal: nothing partial escapes a failed
//! create or clone. Per-packet failures are transient: the caller drops
//! that one packet and keeps going, and session state (counters, active
//! slot) is untouched. [`SessionError::is_fatal`] and
//! [`SessionError::is_transient`] encode that split for callers that
//! route errors generically.

use keywheel_crypto::CryptoError;
use keywheel_proto::{CipherId, Encapsulation, ProtocolError};

use crate::config::Direction;
use crate::context::KeyParity;

/// Reasons a configuration fails validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// The CRYPTO flag must be set on every session config.
    #[error("the CRYPTO flag is not set")]
    CryptoFlagMissing,

    /// Key length is not a valid AES key size.
    #[error("invalid key length {len} (expected 16, 24, or 32)")]
    KeyLength {
        /// Configured key length in bytes.
        len: usize,
    },

    /// Maximum payload length must be positive.
    #[error("data_max_len must be greater than zero")]
    DataMaxLen,

    /// Passphrase length outside the supported range.
    #[error("passphrase of {len} bytes outside 8..=79")]
    PassphraseLength {
        /// Length of the offending passphrase.
        len: usize,
    },

    /// A preshared secret must cover at least one KEK.
    #[error("preshared secret of {len} bytes is shorter than the {key_len}-byte key")]
    PresharedTooShort {
        /// Length of the offending secret.
        len: usize,
        /// Configured key length it must cover.
        key_len: usize,
    },

    /// The packet budget per key must be at least one.
    #[error("km_refresh_rate must be at least 1")]
    RefreshRate,

    /// The announce window must fit inside the refresh period.
    #[error("km_pre_announce {pre_announce} must be smaller than km_refresh_rate {refresh_rate}")]
    PreAnnounce {
        /// Configured announce window in packets.
        pre_announce: u32,
        /// Configured packets-per-key budget.
        refresh_rate: u32,
    },
}

/// Reasons a key-material record is rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeyMaterialError {
    /// The record does not decode as a KM message.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Key derivation or unwrapping failed. [`CryptoError::WrapIntegrity`]
    /// here is how a mismatched shared secret manifests.
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// The record announces a different cipher than this session runs.
    #[error("announced cipher {announced:?} does not match session cipher {session:?}")]
    CipherMismatch {
        /// Cipher id carried by the record.
        announced: CipherId,
        /// Cipher id of the session's instance.
        session: CipherId,
    },

    /// The record announces a different stream framing.
    #[error("announced encapsulation {announced:?} does not match session {session:?}")]
    EncapsulationMismatch {
        /// Encapsulation carried by the record.
        announced: Encapsulation,
        /// Encapsulation the session was created for.
        session: Encapsulation,
    },

    /// The record announces a key of a different size than the session's
    /// cipher instance was opened for.
    #[error("announced key length {announced} does not match session key length {session}")]
    KeyLengthMismatch {
        /// Key length carried by the record.
        announced: usize,
        /// Key length the session was created for.
        session: usize,
    },
}

/// Errors surfaced by session operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// Configuration validation failed; no session was produced.
    #[error("invalid session configuration")]
    Config(#[from] ConfigError),

    /// The cipher instance could not be opened; construction aborted.
    #[error("cipher instance open failed")]
    CipherInit(#[source] CryptoError),

    /// A context's key schedule could not be set up (create, clone, or
    /// rekey).
    #[error("context key schedule setup failed")]
    ContextInit(#[source] KeyMaterialError),

    /// The cipher failed mid-packet on the transmit path. The packet is
    /// dropped by the caller; counters and rotation state are unchanged.
    #[error("packet encryption failed")]
    Encrypt(#[source] CryptoError),

    /// The cipher failed mid-packet on the receive path.
    #[error("packet decryption failed")]
    Decrypt(#[source] CryptoError),

    /// The operation needs a keyed or active context that does not exist
    /// yet. Wait for key material (receive) or rotation (transmit).
    #[error("no keyed context is ready")]
    NotReady,

    /// A transmit operation was invoked on a receive session or vice
    /// versa.
    #[error("operation requires a {required:?} session")]
    WrongDirection {
        /// Direction the operation is defined for.
        required: Direction,
    },

    /// The requested buffer exceeds the session's configured capacity.
    /// Nothing is corrupted; a following valid request succeeds.
    #[error("buffer of {requested} bytes exceeds capacity of {capacity}")]
    BufferTooSmall {
        /// Padded size the request needed.
        requested: usize,
        /// Configured maximum payload length.
        capacity: usize,
    },

    /// A key-material record was rejected; no context was modified.
    #[error("key material rejected")]
    KeyMaterial(#[source] KeyMaterialError),

    /// A data packet's prefix could not be read or written.
    #[error("malformed packet prefix")]
    Packet(#[source] ProtocolError),

    /// A data packet references a rotation slot holding no key.
    #[error("no key installed for the {parity:?} slot")]
    NoKey {
        /// Parity the packet's key flag selected.
        parity: KeyParity,
    },
}

impl SessionError {
    /// Construction failures: the session (or clone) was not produced
    /// and retrying without a config change will fail again.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Config(_) | Self::CipherInit(_) | Self::ContextInit(_))
    }

    /// Per-packet failures: drop the offending packet or record and
    /// continue; the session remains consistent.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Encrypt(_)
                | Self::Decrypt(_)
                | Self::KeyMaterial(_)
                | Self::Packet(_)
                | Self::NoKey { .. }
        )
    }
}
