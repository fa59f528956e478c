//! Session configuration and the shared secret.

use std::time::Duration;

use keywheel_crypto::{CryptoError, derive_kek};
use keywheel_proto::{CfgFlags, CipherId, Encapsulation};
use zeroize::Zeroize;

use crate::errors::ConfigError;

/// Direction a session operates in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Encrypts outgoing packets and emits key-material records.
    Transmit,
    /// Decrypts incoming packets keyed by received key-material records.
    Receive,
}

/// Shared secret both peers hold out of band.
///
/// Bytes are zeroized on drop. The debug representation never prints
/// them.
#[derive(Clone)]
pub enum Secret {
    /// Text passphrase; the KEK is derived from it and the announced
    /// salt's tail.
    Passphrase(Vec<u8>),
    /// Raw preshared KEK material; the leading `key_len` bytes are the
    /// KEK, no derivation.
    Preshared(Vec<u8>),
}

impl Secret {
    /// Convenience constructor from passphrase text.
    #[must_use]
    pub fn passphrase(text: &str) -> Self {
        Self::Passphrase(text.as_bytes().to_vec())
    }

    /// Raw secret bytes.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        match self {
            Self::Passphrase(bytes) | Self::Preshared(bytes) => bytes,
        }
    }

    /// KEK for an announced salt. The caller owns the returned key and
    /// zeroizes it when done.
    pub(crate) fn kek(&self, salt: &[u8], key_len: usize) -> Result<Vec<u8>, CryptoError> {
        match self {
            Self::Passphrase(passphrase) => derive_kek(passphrase, salt, key_len),
            Self::Preshared(bytes) => bytes
                .get(..key_len)
                .map(<[u8]>::to_vec)
                .ok_or(CryptoError::InvalidKeyLength { len: bytes.len() }),
        }
    }
}

impl Drop for Secret {
    fn drop(&mut self) {
        match self {
            Self::Passphrase(bytes) | Self::Preshared(bytes) => bytes.zeroize(),
        }
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Passphrase(bytes) => write!(f, "Secret::Passphrase({} bytes)", bytes.len()),
            Self::Preshared(bytes) => write!(f, "Secret::Preshared({} bytes)", bytes.len()),
        }
    }
}

/// Immutable session parameters, fixed at create time.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// `CRYPTO` is required; `TX` selects the transmit direction.
    pub flags: CfgFlags,
    /// Transport framing of the data stream.
    pub encapsulation: Encapsulation,
    /// Cipher announced in key-material records and applied to payloads.
    pub cipher: CipherId,
    /// AES key size in bytes: 16, 24, or 32.
    pub key_len: usize,
    /// Largest payload one packet may carry.
    pub data_max_len: usize,
    /// Shared secret protecting the key material.
    pub secret: Secret,
    /// Re-announce the active key after this long without any KM
    /// emission. Zero disables the timer.
    pub km_tx_period: Duration,
    /// Packets encrypted under one key before rotating to the next.
    pub km_refresh_rate: u32,
    /// Packets ahead of rotation at which the next key starts being
    /// announced.
    pub km_pre_announce: u32,
}

impl SessionConfig {
    /// Default re-announcement period.
    pub const DEFAULT_KM_TX_PERIOD: Duration = Duration::from_secs(1);

    /// Default packets-per-key budget.
    pub const DEFAULT_KM_REFRESH_RATE: u32 = 1 << 24;

    /// Default announce window in packets.
    pub const DEFAULT_KM_PRE_ANNOUNCE: u32 = 1 << 12;

    /// Receive-direction configuration with the default rotation policy
    /// and the AES-CTR cipher.
    #[must_use]
    pub fn new(
        encapsulation: Encapsulation,
        key_len: usize,
        data_max_len: usize,
        secret: Secret,
    ) -> Self {
        Self {
            flags: CfgFlags::receive(),
            encapsulation,
            cipher: CipherId::AesCtr,
            key_len,
            data_max_len,
            secret,
            km_tx_period: Self::DEFAULT_KM_TX_PERIOD,
            km_refresh_rate: Self::DEFAULT_KM_REFRESH_RATE,
            km_pre_announce: Self::DEFAULT_KM_PRE_ANNOUNCE,
        }
    }

    /// The same configuration flipped to the transmit direction.
    #[must_use]
    pub fn transmit(mut self) -> Self {
        self.flags |= CfgFlags::TX;
        self
    }

    /// Direction encoded in the flags.
    #[must_use]
    pub fn direction(&self) -> Direction {
        if self.flags.is_transmit() { Direction::Transmit } else { Direction::Receive }
    }

    pub(crate) fn set_direction(&mut self, direction: Direction) {
        match direction {
            Direction::Transmit => self.flags |= CfgFlags::TX,
            Direction::Receive => self.flags -= CfgFlags::TX,
        }
    }

    /// Validates every field. Session construction calls this; exposed
    /// so embedders can reject bad configs before reaching for a cipher.
    ///
    /// # Errors
    ///
    /// The first [`ConfigError`] encountered, checked in field order.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.flags.contains(CfgFlags::CRYPTO) {
            return Err(ConfigError::CryptoFlagMissing);
        }
        if !matches!(self.key_len, 16 | 24 | 32) {
            return Err(ConfigError::KeyLength { len: self.key_len });
        }
        if self.data_max_len == 0 {
            return Err(ConfigError::DataMaxLen);
        }
        match &self.secret {
            Secret::Passphrase(bytes) if !(8..=79).contains(&bytes.len()) => {
                return Err(ConfigError::PassphraseLength { len: bytes.len() });
            }
            Secret::Preshared(bytes) if bytes.len() < self.key_len => {
                return Err(ConfigError::PresharedTooShort {
                    len: bytes.len(),
                    key_len: self.key_len,
                });
            }
            _ => {}
        }
        if self.km_refresh_rate == 0 {
            return Err(ConfigError::RefreshRate);
        }
        if self.km_pre_announce >= self.km_refresh_rate {
            return Err(ConfigError::PreAnnounce {
                pre_announce: self.km_pre_announce,
                refresh_rate: self.km_refresh_rate,
            });
        }
        Ok(())
    }
}
