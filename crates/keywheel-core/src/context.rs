//! Per-slot crypto contexts.
//!
//! A session owns two contexts, one per [`KeyParity`]. Each carries one
//! stream key through its lifecycle ([`ContextStatus`]) together with
//! the derived key-encrypting key and the cached encoded KM record that
//! announces it. All key bytes are zeroized on overwrite and on drop.

use keywheel_crypto::{CryptoError, KeyView, wrap_key};
use keywheel_proto::{CipherId, Encapsulation, KeyFlags, KmMessage};
use rand::RngCore;
use zeroize::Zeroize;

use crate::config::Secret;
use crate::errors::KeyMaterialError;

/// Keying-salt length generated for fresh keys.
pub const SALT_LEN: usize = 16;

/// Which of the two rotation slots a context occupies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyParity {
    /// Slot selected by the even key flag.
    Even,
    /// Slot selected by the odd key flag.
    Odd,
}

impl KeyParity {
    /// Wire flag selecting this slot alone.
    #[must_use]
    pub const fn key_flags(self) -> KeyFlags {
        match self {
            Self::Even => KeyFlags::Even,
            Self::Odd => KeyFlags::Odd,
        }
    }

    /// The other slot.
    #[must_use]
    pub const fn other(self) -> Self {
        match self {
            Self::Even => Self::Odd,
            Self::Odd => Self::Even,
        }
    }
}

/// Lifecycle state of one slot's key.
///
/// Transmit contexts walk `Idle → Keyed → Announced → Active →
/// Decommissioned` and back to `Keyed` when the slot is reused. Receive
/// contexts only ever hold `Idle` or `Keyed` (plus states copied from a
/// transmit session by a directional clone).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextStatus {
    /// No key installed.
    Idle,
    /// Key installed, not yet announced.
    Keyed,
    /// Key announced ahead of rotation, not yet carrying traffic.
    Announced,
    /// Key currently protecting traffic.
    Active,
    /// Key superseded by rotation; retained for stragglers until the
    /// slot is reused.
    Decommissioned,
}

impl ContextStatus {
    /// Whether the slot holds usable key material in this state.
    #[must_use]
    pub const fn is_keyed(self) -> bool {
        !matches!(self, Self::Idle)
    }
}

/// One rotation slot: a stream key plus its announcement state.
pub struct CryptoContext {
    parity: KeyParity,
    status: ContextStatus,
    encrypting: bool,
    /// The cached KM record has not yet reached its scheduled emissions.
    announce_pending: bool,
    /// The periodic re-announce timer fired for this slot.
    time_to_send: bool,
    sek: Vec<u8>,
    salt: Vec<u8>,
    kek: Vec<u8>,
    /// Salt the cached KEK was derived from; a mismatch invalidates it.
    kek_salt: Vec<u8>,
    packet_count: u64,
    km_cache: Vec<u8>,
}

impl CryptoContext {
    pub(crate) fn new(parity: KeyParity) -> Self {
        Self {
            parity,
            status: ContextStatus::Idle,
            encrypting: false,
            announce_pending: false,
            time_to_send: false,
            sek: Vec::new(),
            salt: Vec::new(),
            kek: Vec::new(),
            kek_salt: Vec::new(),
            packet_count: 0,
            km_cache: Vec::new(),
        }
    }

    /// Slot this context occupies.
    #[must_use]
    pub fn parity(&self) -> KeyParity {
        self.parity
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn status(&self) -> ContextStatus {
        self.status
    }

    /// Packets protected under the current key so far.
    #[must_use]
    pub fn packet_count(&self) -> u64 {
        self.packet_count
    }

    /// Whether this context belongs to a transmit session.
    #[must_use]
    pub fn is_encrypting(&self) -> bool {
        self.encrypting
    }

    pub(crate) fn key_view(&self) -> KeyView<'_> {
        KeyView { sek: &self.sek, salt: &self.salt }
    }

    pub(crate) fn encoded_km(&self) -> &[u8] {
        &self.km_cache
    }

    pub(crate) fn announce_pending(&self) -> bool {
        self.announce_pending
    }

    pub(crate) fn time_to_send(&self) -> bool {
        self.time_to_send
    }

    /// Installs a fresh random key and salt, resetting the packet
    /// counter and invalidating the cached KM record.
    pub(crate) fn rekey(&mut self, key_len: usize) {
        self.sek.zeroize();
        let mut sek = vec![0u8; key_len];
        rand::thread_rng().fill_bytes(&mut sek);
        self.sek = sek;

        let mut salt = vec![0u8; SALT_LEN];
        rand::thread_rng().fill_bytes(&mut salt);
        self.salt.zeroize();
        self.salt = salt;

        self.packet_count = 0;
        self.km_cache.clear();
        self.announce_pending = false;
        self.time_to_send = false;
        self.status = ContextStatus::Keyed;
    }

    /// Derives (or reuses) the KEK for the current salt.
    pub(crate) fn ensure_kek(
        &mut self,
        secret: &Secret,
        key_len: usize,
    ) -> Result<(), CryptoError> {
        if !self.kek.is_empty() && self.kek_salt == self.salt {
            return Ok(());
        }
        let kek = secret.kek(&self.salt, key_len)?;
        self.kek.zeroize();
        self.kek = kek;
        self.kek_salt.zeroize();
        self.kek_salt.clone_from(&self.salt);
        Ok(())
    }

    /// Wraps the current key under the KEK and caches the encoded KM
    /// record announcing it.
    pub(crate) fn refresh_km(
        &mut self,
        cipher: CipherId,
        encapsulation: Encapsulation,
    ) -> Result<(), KeyMaterialError> {
        let wrap = wrap_key(&self.kek, &self.sek)?;
        let msg = KmMessage {
            key_flags: self.parity.key_flags(),
            cipher,
            encapsulation,
            salt: self.salt.clone(),
            sek_len: self.sek.len(),
            wrap,
        };
        let mut cache = Vec::with_capacity(msg.encoded_len());
        msg.encode(&mut cache)?;
        self.km_cache = cache;
        Ok(())
    }

    /// Installs a received key, remembering the record that delivered it
    /// so replays of the same record are recognized.
    pub(crate) fn install(&mut self, sek: Vec<u8>, salt: &[u8], record: &[u8]) {
        self.sek.zeroize();
        self.sek = sek;
        self.salt.zeroize();
        self.salt = salt.to_vec();
        self.packet_count = 0;
        self.km_cache = record.to_vec();
        self.announce_pending = false;
        self.time_to_send = false;
        self.status = ContextStatus::Keyed;
    }

    /// Takes over a live key from another session's context.
    pub(crate) fn adopt_key(&mut self, sek: &[u8], salt: &[u8]) {
        self.sek.zeroize();
        self.sek = sek.to_vec();
        self.salt.zeroize();
        self.salt = salt.to_vec();
        self.packet_count = 0;
        self.km_cache.clear();
        self.announce_pending = false;
        self.time_to_send = false;
        self.status = ContextStatus::Keyed;
    }

    /// Receive-direction copy of this context: key material and
    /// announcement cache survive, the KEK and transmit-side scheduling
    /// flags do not.
    pub(crate) fn decrypting_copy(&self) -> Self {
        Self {
            parity: self.parity,
            status: self.status,
            encrypting: false,
            announce_pending: false,
            time_to_send: false,
            sek: self.sek.clone(),
            salt: self.salt.clone(),
            kek: Vec::new(),
            kek_salt: Vec::new(),
            packet_count: self.packet_count,
            km_cache: self.km_cache.clone(),
        }
    }

    /// Marks the cached KM record as announced ahead of rotation.
    pub(crate) fn mark_announced(&mut self) {
        self.status = ContextStatus::Announced;
        self.announce_pending = true;
    }

    /// Promotes this slot to carry traffic. The send-now flag guarantees
    /// one KM emission under the new active key.
    pub(crate) fn activate(&mut self) {
        self.status = ContextStatus::Active;
        self.time_to_send = true;
    }

    /// Retires this slot after rotation.
    pub(crate) fn decommission(&mut self) {
        self.status = ContextStatus::Decommissioned;
        self.announce_pending = false;
        self.time_to_send = false;
    }

    pub(crate) fn bump_packet_count(&mut self) {
        self.packet_count += 1;
    }

    pub(crate) fn set_encrypting(&mut self, encrypting: bool) {
        self.encrypting = encrypting;
    }

    pub(crate) fn set_announce_pending(&mut self, pending: bool) {
        self.announce_pending = pending;
    }

    pub(crate) fn set_time_to_send(&mut self, due: bool) {
        self.time_to_send = due;
    }

    /// Wipes every key-material field: SEK, salt, KEK, and the salt the
    /// KEK was derived from.
    fn wipe_keys(&mut self) {
        self.sek.zeroize();
        self.salt.zeroize();
        self.kek.zeroize();
        self.kek_salt.zeroize();
    }
}

impl Drop for CryptoContext {
    fn drop(&mut self) {
        self.wipe_keys();
    }
}

impl std::fmt::Debug for CryptoContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Key bytes stay out of logs.
        f.debug_struct("CryptoContext")
            .field("parity", &self.parity)
            .field("status", &self.status)
            .field("encrypting", &self.encrypting)
            .field("announce_pending", &self.announce_pending)
            .field("time_to_send", &self.time_to_send)
            .field("packet_count", &self.packet_count)
            .field("km_cached", &!self.km_cache.is_empty())
            .finish()
    }
}
