//! Passphrase-to-KEK derivation.
//!
//! The key-encrypting key is never carried on the wire. Both peers
//! derive it from the shared passphrase and the trailing bytes of the
//! announced keying salt, so a KEK silently refreshes whenever that
//! portion of the salt changes.

use pbkdf2::pbkdf2_hmac;
use sha1::Sha1;

use crate::errors::{CryptoError, Result};

/// PBKDF2 iteration count for KEK derivation.
pub const PBKDF2_ITERATIONS: u32 = 2048;

/// Number of trailing salt bytes fed into the KDF.
///
/// Only this tail binds the KEK; the leading salt bytes may change
/// (for keystream freshness) without invalidating wrapped keys.
pub const KEK_SALT_LEN: usize = 8;

/// Derives a key-encrypting key from a passphrase and keying salt.
///
/// `kek_len` selects the AES flavor of the resulting KEK and must be
/// 16, 24, or 32 bytes. Salts shorter than [`KEK_SALT_LEN`] are used
/// whole.
///
/// The caller owns the returned key material and is responsible for
/// zeroing it when the KEK is retired.
pub fn derive_kek(passphrase: &[u8], salt: &[u8], kek_len: usize) -> Result<Vec<u8>> {
    if !matches!(kek_len, 16 | 24 | 32) {
        return Err(CryptoError::InvalidKeyLength { len: kek_len });
    }

    let tail_start = salt.len().saturating_sub(KEK_SALT_LEN);
    let mut kek = vec![0u8; kek_len];
    pbkdf2_hmac::<Sha1>(passphrase, &salt[tail_start..], PBKDF2_ITERATIONS, &mut kek);
    Ok(kek)
}
