//! Keywheel Cryptographic Primitives
//!
//! Cryptographic building blocks for Keywheel stream encryption. Pure
//! functions and small cipher objects with deterministic outputs;
//! callers provide key material and packet indices, so every operation
//! is reproducible under test.
//!
//! # Key Lifecycle
//!
//! Stream keys are random and short-lived; the passphrase-derived KEK
//! is the only long-lived secret and never leaves the host.
//!
//! ```text
//! Passphrase + salt tail
//!        │
//!        ▼
//! PBKDF2-HMAC-SHA1 → KEK (refreshed when the salt tail changes)
//!        │
//!        ▼
//! RFC 3394 Key Wrap → wrapped SEK (announced in KM messages)
//!        │
//!        ▼
//! AES-CTR Keystream → packet ciphertext
//! ```
//!
//! The receiving side runs the same derivation, unwraps the announced
//! key, and keeps it until the sender rotates away from it.
//!
//! # Security
//!
//! Key Separation:
//! - The KEK binds only to the passphrase and the trailing salt bytes
//! - Stream keys are random per rotation slot, never derived from the passphrase
//! - Compromising one stream key exposes one rotation window, not the stream
//!
//! Keystream Uniqueness:
//! - The CTR nonce binds (salt, packet index); each index gets a fresh keystream
//! - Key rotation replaces the key well before the 32-bit packet index wraps
//!
//! Integrity:
//! - RFC 3394 unwrap fails loudly under a wrong KEK or tampered record
//! - Payload ciphertext is not authenticated; transport integrity is assumed

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod cipher;
pub mod errors;
pub mod kdf;
pub mod keywrap;

pub use cipher::{AesCtrCipher, KeyView, PacketCipher, ctr_iv, open_cipher};
pub use errors::{CryptoError, Result};
pub use kdf::{KEK_SALT_LEN, PBKDF2_ITERATIONS, derive_kek};
pub use keywrap::{WRAP_OVERHEAD, unwrap_key, wrap_key};
