//! Pluggable packet ciphers.
//!
//! A session owns exactly one cipher instance per direction and drives
//! it through the [`PacketCipher`] trait. Key material is passed per
//! call as a [`KeyView`], never stored in the cipher, because the
//! active key changes across rotations while the cipher instance
//! persists for the session's lifetime.

use aes::cipher::{KeyIvInit, StreamCipher};
use keywheel_proto::CipherId;

use crate::errors::{CryptoError, Result};

type Aes128Ctr = ctr::Ctr128BE<aes::Aes128>;
type Aes192Ctr = ctr::Ctr128BE<aes::Aes192>;
type Aes256Ctr = ctr::Ctr128BE<aes::Aes256>;

/// Leading salt bytes mixed into the CTR nonce.
const CTR_SALT_LEN: usize = 14;

/// Borrowed key material for one packet operation.
#[derive(Clone, Copy)]
pub struct KeyView<'a> {
    /// Stream-encrypting key.
    pub sek: &'a [u8],
    /// Keying salt announced alongside the key.
    pub salt: &'a [u8],
}

impl std::fmt::Debug for KeyView<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Key bytes stay out of logs.
        f.debug_struct("KeyView")
            .field("sek_len", &self.sek.len())
            .field("salt_len", &self.salt.len())
            .finish()
    }
}

/// One direction's bulk cipher.
pub trait PacketCipher: Send {
    /// Enumerated wire identity announced in KM messages.
    fn id(&self) -> CipherId;

    /// Block alignment payload buffers must provide (1 = none).
    fn pad_factor(&self) -> usize {
        1
    }

    /// Encrypts `payload` in place for packet index `pki`, returning
    /// the ciphertext length.
    fn encrypt(&mut self, key: KeyView<'_>, pki: u32, payload: &mut [u8]) -> Result<usize>;

    /// Decrypts `payload` in place for packet index `pki`, returning
    /// the cleartext length.
    fn decrypt(&mut self, key: KeyView<'_>, pki: u32, payload: &mut [u8]) -> Result<usize>;
}

/// Builds the 16-byte CTR nonce for one packet.
///
/// The leading 14 salt bytes seed the nonce (shorter salts are
/// zero-extended), the packet index is XORed big-endian at offsets
/// 10..14, and the trailing two bytes are the in-packet block counter
/// starting at zero.
#[must_use]
pub fn ctr_iv(salt: &[u8], pki: u32) -> [u8; 16] {
    let mut iv = [0u8; 16];
    let take = salt.len().min(CTR_SALT_LEN);
    iv[..take].copy_from_slice(&salt[..take]);
    for (slot, byte) in iv[10..14].iter_mut().zip(pki.to_be_bytes()) {
        *slot ^= byte;
    }
    iv
}

/// AES counter-mode packet cipher (the production cipher).
///
/// Needs no padding, and encryption and decryption are the same
/// keystream XOR. The key size and maximum payload are fixed at open
/// time; every call is checked against them.
pub struct AesCtrCipher {
    key_len: usize,
    data_max_len: usize,
}

impl AesCtrCipher {
    /// Opens a cipher for the given key size and maximum payload.
    ///
    /// # Errors
    ///
    /// [`CryptoError::InvalidKeyLength`] unless `key_len` is 16, 24, or
    /// 32.
    pub fn open(key_len: usize, data_max_len: usize) -> Result<Self> {
        if !matches!(key_len, 16 | 24 | 32) {
            return Err(CryptoError::InvalidKeyLength { len: key_len });
        }
        Ok(Self { key_len, data_max_len })
    }

    fn apply(&self, key: KeyView<'_>, pki: u32, payload: &mut [u8]) -> Result<usize> {
        if payload.len() > self.data_max_len {
            return Err(CryptoError::PayloadTooLong {
                len: payload.len(),
                max: self.data_max_len,
            });
        }
        if key.sek.len() != self.key_len {
            return Err(CryptoError::InvalidKeyLength { len: key.sek.len() });
        }

        let iv = ctr_iv(key.salt, pki);
        let bad = |_| CryptoError::InvalidKeyLength { len: key.sek.len() };
        match key.sek.len() {
            16 => Aes128Ctr::new_from_slices(key.sek, &iv).map_err(bad)?.apply_keystream(payload),
            24 => Aes192Ctr::new_from_slices(key.sek, &iv).map_err(bad)?.apply_keystream(payload),
            32 => Aes256Ctr::new_from_slices(key.sek, &iv).map_err(bad)?.apply_keystream(payload),
            len => return Err(CryptoError::InvalidKeyLength { len }),
        }
        Ok(payload.len())
    }
}

impl PacketCipher for AesCtrCipher {
    fn id(&self) -> CipherId {
        CipherId::AesCtr
    }

    fn encrypt(&mut self, key: KeyView<'_>, pki: u32, payload: &mut [u8]) -> Result<usize> {
        self.apply(key, pki, payload)
    }

    fn decrypt(&mut self, key: KeyView<'_>, pki: u32, payload: &mut [u8]) -> Result<usize> {
        self.apply(key, pki, payload)
    }
}

/// Instantiates the cipher named by a wire identity.
///
/// Only AES-CTR is implemented. The other identities decode fine but
/// fail here with [`CryptoError::UnsupportedCipher`], so a session
/// refuses the configuration up front instead of at the first packet.
pub fn open_cipher(
    id: CipherId,
    key_len: usize,
    data_max_len: usize,
) -> Result<Box<dyn PacketCipher>> {
    match id {
        CipherId::AesCtr => Ok(Box::new(AesCtrCipher::open(key_len, data_max_len)?)),
        other => Err(CryptoError::UnsupportedCipher(other)),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const SEK: [u8; 16] = [0x2B; 16];
    const SALT: [u8; 16] = [0x10; 16];

    fn view<'a>(sek: &'a [u8], salt: &'a [u8]) -> KeyView<'a> {
        KeyView { sek, salt }
    }

    #[test]
    fn nonce_layout() {
        let iv = ctr_iv(&SALT, 0x0102_0304);
        assert_eq!(hex::encode(iv), "10101010101010101010111213140000");

        // Packet index zero leaves the salt bytes untouched.
        let iv = ctr_iv(&SALT, 0);
        assert_eq!(hex::encode(iv), "10101010101010101010101010100000");
    }

    #[test]
    fn short_salt_is_zero_extended() {
        let iv = ctr_iv(&[0xFF; 4], 0);
        assert_eq!(hex::encode(iv), "ffffffff000000000000000000000000");
    }

    #[test]
    fn keystream_round_trips() {
        let mut cipher = AesCtrCipher::open(16, 1500).unwrap();
        let clear = b"attack at dawn".to_vec();
        let mut buf = clear.clone();

        let n = cipher.encrypt(view(&SEK, &SALT), 7, &mut buf).unwrap();
        assert_eq!(n, clear.len());
        assert_ne!(buf, clear);

        let n = cipher.decrypt(view(&SEK, &SALT), 7, &mut buf).unwrap();
        assert_eq!(n, clear.len());
        assert_eq!(buf, clear);
    }

    #[test]
    fn packet_index_varies_the_keystream() {
        let mut cipher = AesCtrCipher::open(16, 1500).unwrap();
        let mut a = [0u8; 32];
        let mut b = [0u8; 32];
        cipher.encrypt(view(&SEK, &SALT), 1, &mut a).unwrap();
        cipher.encrypt(view(&SEK, &SALT), 2, &mut b).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn salt_and_key_vary_the_keystream() {
        let mut cipher = AesCtrCipher::open(16, 1500).unwrap();
        let mut a = [0u8; 32];
        let mut b = [0u8; 32];
        let mut c = [0u8; 32];
        cipher.encrypt(view(&SEK, &SALT), 1, &mut a).unwrap();
        cipher.encrypt(view(&SEK, &[0x11; 16]), 1, &mut b).unwrap();
        cipher.encrypt(view(&[0x2C; 16], &SALT), 1, &mut c).unwrap();
        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn every_key_size_round_trips() {
        for key_len in [16usize, 24, 32] {
            let mut cipher = AesCtrCipher::open(key_len, 256).unwrap();
            let sek = vec![0x42u8; key_len];
            let clear = vec![0xA5u8; 100];
            let mut buf = clear.clone();
            cipher.encrypt(view(&sek, &SALT), 3, &mut buf).unwrap();
            cipher.decrypt(view(&sek, &SALT), 3, &mut buf).unwrap();
            assert_eq!(buf, clear);
        }
    }

    #[test]
    fn rejects_overlong_payload() {
        let mut cipher = AesCtrCipher::open(16, 8).unwrap();
        let mut buf = [0u8; 9];
        assert_eq!(
            cipher.encrypt(view(&SEK, &SALT), 0, &mut buf),
            Err(CryptoError::PayloadTooLong { len: 9, max: 8 })
        );
    }

    #[test]
    fn rejects_mismatched_key_size() {
        let mut cipher = AesCtrCipher::open(32, 1500).unwrap();
        let mut buf = [0u8; 16];
        assert_eq!(
            cipher.encrypt(view(&SEK, &SALT), 0, &mut buf),
            Err(CryptoError::InvalidKeyLength { len: 16 })
        );
    }

    #[test]
    fn open_cipher_refuses_unimplemented_modes() {
        assert!(open_cipher(CipherId::AesCtr, 16, 1500).is_ok());
        for id in [CipherId::AesEcb, CipherId::AesCbc, CipherId::AesGcm] {
            assert_eq!(
                open_cipher(id, 16, 1500).err(),
                Some(CryptoError::UnsupportedCipher(id))
            );
        }
    }

    #[test]
    fn pad_factor_is_unit() {
        let cipher = AesCtrCipher::open(16, 1500).unwrap();
        assert_eq!(cipher.pad_factor(), 1);
    }
}
