//! AES key wrap (RFC 3394).
//!
//! Session keys travel inside key-material records wrapped under the
//! passphrase-derived KEK. The wrap adds an 8-byte integrity block, so
//! unwrapping with the wrong KEK fails loudly instead of yielding a
//! garbage key.

use aes::cipher::{BlockDecrypt, BlockEncrypt, KeyInit};
use aes::{Aes128, Aes192, Aes256, Block};
use zeroize::Zeroize;

use crate::errors::{CryptoError, Result};

/// Bytes a wrapped key carries over the plain key.
pub const WRAP_OVERHEAD: usize = 8;

/// 64-bit semiblock the wrap algorithm permutes.
const SEMIBLOCK: usize = 8;

/// RFC 3394 initial integrity value.
const INTEGRITY_IV: u64 = 0xA6A6_A6A6_A6A6_A6A6;

/// Wrap rounds fixed by the RFC.
const ROUNDS: usize = 6;

/// KEK schedule selected by key length.
enum Kek {
    Aes128(Aes128),
    Aes192(Aes192),
    Aes256(Aes256),
}

impl Kek {
    fn new(kek: &[u8]) -> Result<Self> {
        let bad = |_| CryptoError::InvalidKeyLength { len: kek.len() };
        match kek.len() {
            16 => Ok(Self::Aes128(Aes128::new_from_slice(kek).map_err(bad)?)),
            24 => Ok(Self::Aes192(Aes192::new_from_slice(kek).map_err(bad)?)),
            32 => Ok(Self::Aes256(Aes256::new_from_slice(kek).map_err(bad)?)),
            len => Err(CryptoError::InvalidKeyLength { len }),
        }
    }

    fn encrypt_block(&self, block: &mut Block) {
        match self {
            Self::Aes128(c) => c.encrypt_block(block),
            Self::Aes192(c) => c.encrypt_block(block),
            Self::Aes256(c) => c.encrypt_block(block),
        }
    }

    fn decrypt_block(&self, block: &mut Block) {
        match self {
            Self::Aes128(c) => c.decrypt_block(block),
            Self::Aes192(c) => c.decrypt_block(block),
            Self::Aes256(c) => c.decrypt_block(block),
        }
    }
}

/// Big-endian read of up to eight bytes.
fn be64(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0, |acc, &b| (acc << 8) | u64::from(b))
}

/// Wraps `plain` under `kek`, returning `plain.len() + 8` bytes.
///
/// The plain key must be a whole number of semiblocks and at least two
/// of them, which every supported AES key size satisfies.
pub fn wrap_key(kek: &[u8], plain: &[u8]) -> Result<Vec<u8>> {
    if plain.len() % SEMIBLOCK != 0 || plain.len() < 2 * SEMIBLOCK {
        return Err(CryptoError::WrapLength { len: plain.len() });
    }
    let cipher = Kek::new(kek)?;
    let n = plain.len() / SEMIBLOCK;

    let mut a = INTEGRITY_IV;
    let mut out = vec![0u8; WRAP_OVERHEAD + plain.len()];
    out[WRAP_OVERHEAD..].copy_from_slice(plain);

    let mut scratch = [0u8; 16];
    for j in 0..ROUNDS {
        for i in 1..=n {
            let r = i * SEMIBLOCK;
            scratch[..SEMIBLOCK].copy_from_slice(&a.to_be_bytes());
            scratch[SEMIBLOCK..].copy_from_slice(&out[r..r + SEMIBLOCK]);
            cipher.encrypt_block(Block::from_mut_slice(&mut scratch));
            a = be64(&scratch[..SEMIBLOCK]) ^ (n * j + i) as u64;
            out[r..r + SEMIBLOCK].copy_from_slice(&scratch[SEMIBLOCK..]);
        }
    }
    out[..SEMIBLOCK].copy_from_slice(&a.to_be_bytes());
    scratch.zeroize();
    Ok(out)
}

/// Unwraps `wrapped` under `kek`, returning the plain key.
///
/// Fails with [`CryptoError::WrapIntegrity`] when the integrity block
/// does not verify; the partially recovered key is zeroed before the
/// error returns.
pub fn unwrap_key(kek: &[u8], wrapped: &[u8]) -> Result<Vec<u8>> {
    if wrapped.len() % SEMIBLOCK != 0 || wrapped.len() < WRAP_OVERHEAD + 2 * SEMIBLOCK {
        return Err(CryptoError::WrapLength { len: wrapped.len() });
    }
    let cipher = Kek::new(kek)?;
    let n = wrapped.len() / SEMIBLOCK - 1;

    let mut a = be64(&wrapped[..SEMIBLOCK]);
    let mut out = wrapped[WRAP_OVERHEAD..].to_vec();

    let mut scratch = [0u8; 16];
    for j in (0..ROUNDS).rev() {
        for i in (1..=n).rev() {
            let r = (i - 1) * SEMIBLOCK;
            scratch[..SEMIBLOCK].copy_from_slice(&(a ^ (n * j + i) as u64).to_be_bytes());
            scratch[SEMIBLOCK..].copy_from_slice(&out[r..r + SEMIBLOCK]);
            cipher.decrypt_block(Block::from_mut_slice(&mut scratch));
            a = be64(&scratch[..SEMIBLOCK]);
            out[r..r + SEMIBLOCK].copy_from_slice(&scratch[SEMIBLOCK..]);
        }
    }
    scratch.zeroize();

    if a != INTEGRITY_IV {
        out.zeroize();
        return Err(CryptoError::WrapIntegrity);
    }
    Ok(out)
}
