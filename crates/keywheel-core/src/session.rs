//! Crypto session lifecycle: create, inject, clone, drop.

use std::time::Instant;

use keywheel_crypto::{PacketCipher, open_cipher};
use keywheel_proto::{KeyFlags, PacketLayout};

use crate::config::{Direction, SessionConfig};
use crate::context::{CryptoContext, KeyParity};
use crate::errors::SessionError;

/// One end of an encrypted stream.
///
/// A session owns its cipher instance and both rotation slots for the
/// whole connection lifetime. Every mutating operation takes `&mut
/// self`; the transport thread that owns the connection drives the
/// session, and nothing here blocks or consults a clock on its own.
/// Operations that need time take `now` from the caller.
///
/// Transmit sessions come out of [`Session::create`] already keyed and
/// announcing; receive sessions start idle and become usable on the
/// first accepted KM record.
pub struct Session {
    pub(crate) config: SessionConfig,
    pub(crate) layout: PacketLayout,
    pub(crate) cipher: Box<dyn PacketCipher>,
    /// Slot 0 is even parity, slot 1 odd; the alternate of `i` is `1 - i`.
    pub(crate) contexts: [CryptoContext; 2],
    pub(crate) active: Option<usize>,
    /// Rolling packet index for standalone framing. SRT framing reads
    /// the transport's sequence number instead.
    pub(crate) packet_index: u32,
    pub(crate) last_km_sent: Option<Instant>,
}

impl Session {
    /// Creates a session with the cipher the config names, resolved from
    /// the built-in implementations.
    ///
    /// # Errors
    ///
    /// [`SessionError::Config`] on validation failure,
    /// [`SessionError::CipherInit`] when the cipher cannot be opened,
    /// [`SessionError::ContextInit`] when the first transmit key
    /// schedule cannot be set up. Nothing partial escapes a failure.
    pub fn create(config: SessionConfig) -> Result<Self, SessionError> {
        config.validate()?;
        let cipher = open_cipher(config.cipher, config.key_len, config.data_max_len)
            .map_err(SessionError::CipherInit)?;
        Self::with_cipher(config, cipher)
    }

    /// Creates a session around a caller-provided cipher instance.
    ///
    /// This is the injection seam for cipher implementations beyond the
    /// built-in ones. The instance is authoritative for the cipher id
    /// announced in KM records; the config's `cipher` field is
    /// overwritten from it.
    ///
    /// # Errors
    ///
    /// As [`Session::create`], minus the cipher-open step.
    pub fn with_cipher(
        mut config: SessionConfig,
        cipher: Box<dyn PacketCipher>,
    ) -> Result<Self, SessionError> {
        config.validate()?;
        config.cipher = cipher.id();

        let layout = config.encapsulation.layout();
        let transmit = config.direction() == Direction::Transmit;
        let mut session = Self {
            layout,
            cipher,
            contexts: [CryptoContext::new(KeyParity::Even), CryptoContext::new(KeyParity::Odd)],
            active: None,
            packet_index: 0,
            last_km_sent: None,
            config,
        };

        if transmit {
            for ctx in &mut session.contexts {
                ctx.set_encrypting(true);
            }
            session.rekey_slot(0)?;
            session.contexts[0].mark_announced();
            session.contexts[0].activate();
            session.active = Some(0);
        }

        tracing::info!(
            direction = ?session.config.direction(),
            cipher = ?session.config.cipher,
            encapsulation = ?session.config.encapsulation,
            key_len = session.config.key_len,
            "Crypto session created"
        );
        Ok(session)
    }

    /// Reconstructs a config equivalent to this session's, reading the
    /// key length back from the active (or first keyed) context.
    ///
    /// # Errors
    ///
    /// [`SessionError::NotReady`] when neither context is keyed yet.
    pub fn extract_config(&self) -> Result<SessionConfig, SessionError> {
        let keyed = self.current_key_context()?;
        let mut config = self.config.clone();
        config.key_len = keyed.key_view().sek.len();
        Ok(config)
    }

    /// Builds a new session of the requested direction sharing no
    /// mutable state with this one.
    ///
    /// A transmit clone runs the normal create path and then cross-keys
    /// its first context from this session's current key, so a sender
    /// spawned off a receiver sends under the key the paired peer
    /// already holds. A receive clone duplicates both contexts through
    /// their decrypting copy and opens a fresh cipher instance, since
    /// instances hold mutable scratch state and are never shared.
    ///
    /// # Errors
    ///
    /// [`SessionError::NotReady`] for a transmit clone of an unkeyed
    /// session; [`SessionError::CipherInit`] /
    /// [`SessionError::ContextInit`] on sub-step failures (an
    /// externally supplied cipher without a built-in counterpart
    /// cannot be reopened, so such sessions do not clone). Nothing
    /// partial escapes.
    pub fn clone_for(&self, direction: Direction) -> Result<Self, SessionError> {
        match direction {
            Direction::Transmit => self.transmit_clone(),
            Direction::Receive => self.receive_clone(),
        }
    }

    fn transmit_clone(&self) -> Result<Self, SessionError> {
        let mut config = self.extract_config()?;
        config.set_direction(Direction::Transmit);
        let mut clone = Self::create(config)?;

        // Cross-key: replace the create path's fresh key with the
        // source's current key material and re-wrap its KM cache.
        let source = self.current_key_context()?;
        let key = source.key_view();
        clone.contexts[0].adopt_key(key.sek, key.salt);
        clone.contexts[0]
            .ensure_kek(&clone.config.secret, clone.config.key_len)
            .map_err(|err| SessionError::ContextInit(err.into()))?;
        let cipher_id = clone.config.cipher;
        let encapsulation = clone.config.encapsulation;
        clone.contexts[0]
            .refresh_km(cipher_id, encapsulation)
            .map_err(SessionError::ContextInit)?;
        clone.contexts[0].mark_announced();
        clone.contexts[0].activate();
        clone.active = Some(0);

        tracing::debug!(parity = ?source.parity(), "Transmit clone cross-keyed from source");
        Ok(clone)
    }

    fn receive_clone(&self) -> Result<Self, SessionError> {
        let mut config = self.config.clone();
        config.set_direction(Direction::Receive);
        let cipher = open_cipher(config.cipher, config.key_len, config.data_max_len)
            .map_err(SessionError::CipherInit)?;
        Ok(Self {
            layout: self.layout,
            cipher,
            contexts: [self.contexts[0].decrypting_copy(), self.contexts[1].decrypting_copy()],
            active: self.active,
            packet_index: self.packet_index,
            last_km_sent: None,
            config,
        })
    }

    /// Direction this session operates in.
    #[must_use]
    pub fn direction(&self) -> Direction {
        self.config.direction()
    }

    /// The configuration the session was created with.
    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Both rotation slots, even then odd.
    #[must_use]
    pub fn contexts(&self) -> &[CryptoContext; 2] {
        &self.contexts
    }

    /// The active context's key flag as wire bits, for transports that
    /// stamp their own headers before handing packets in.
    ///
    /// # Errors
    ///
    /// [`SessionError::NotReady`] when no context is active.
    pub fn key_flags(&self) -> Result<KeyFlags, SessionError> {
        let slot = self.active_slot()?;
        Ok(self.contexts[slot].parity().key_flags())
    }

    /// The alternate of a rotation slot.
    pub(crate) const fn alternate(slot: usize) -> usize {
        1 - slot
    }

    pub(crate) fn active_slot(&self) -> Result<usize, SessionError> {
        self.active.ok_or(SessionError::NotReady)
    }

    /// The active context, or the first keyed one when nothing is
    /// active yet.
    pub(crate) fn current_key_context(&self) -> Result<&CryptoContext, SessionError> {
        if let Some(slot) = self.active {
            return Ok(&self.contexts[slot]);
        }
        self.contexts
            .iter()
            .find(|ctx| ctx.status().is_keyed())
            .ok_or(SessionError::NotReady)
    }

    pub(crate) fn require_transmit(&self) -> Result<(), SessionError> {
        if self.config.direction() == Direction::Transmit {
            Ok(())
        } else {
            Err(SessionError::WrongDirection { required: Direction::Transmit })
        }
    }

    pub(crate) fn require_receive(&self) -> Result<(), SessionError> {
        if self.config.direction() == Direction::Receive {
            Ok(())
        } else {
            Err(SessionError::WrongDirection { required: Direction::Receive })
        }
    }

    /// Rekeys a slot and rebuilds its KM cache: fresh salt+SEK, KEK
    /// derived or reused, SEK wrapped and encoded.
    pub(crate) fn rekey_slot(&mut self, slot: usize) -> Result<(), SessionError> {
        let cipher = self.config.cipher;
        let encapsulation = self.config.encapsulation;
        let key_len = self.config.key_len;

        self.contexts[slot].rekey(key_len);
        self.contexts[slot]
            .ensure_kek(&self.config.secret, key_len)
            .map_err(|err| SessionError::ContextInit(err.into()))?;
        self.contexts[slot]
            .refresh_km(cipher, encapsulation)
            .map_err(SessionError::ContextInit)
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("direction", &self.config.direction())
            .field("cipher", &self.config.cipher)
            .field("layout", &self.layout)
            .field("active", &self.active)
            .field("contexts", &self.contexts)
            .finish_non_exhaustive()
    }
}
