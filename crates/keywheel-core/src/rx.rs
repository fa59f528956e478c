//! Receive side: KM intake and payload decryption.

use keywheel_proto::{KeyFlags, KmMessage, ProtocolError};
use zeroize::Zeroize;

use crate::context::KeyParity;
use crate::errors::{KeyMaterialError, SessionError};
use crate::session::Session;

impl Session {
    /// Accepts an encoded KM record: decodes it, validates it against
    /// this session, unwraps the announced key(s) under the shared
    /// secret, and installs them into the named slot(s).
    ///
    /// The sender repeats KM records across the announce window, so a
    /// record identical to what a slot already holds is acknowledged
    /// without re-deriving anything. A `Both` record installs the even
    /// key first; the last slot installed becomes the expected parity.
    ///
    /// # Errors
    ///
    /// [`SessionError::WrongDirection`] on a transmit session;
    /// [`SessionError::KeyMaterial`] for records that do not decode, do
    /// not match the session's cipher/encapsulation/key length, or do
    /// not unwrap under the shared secret
    /// ([`keywheel_crypto::CryptoError::WrapIntegrity`] is the wrong-
    /// secret case). A rejected record modifies no context.
    pub fn receive_km(&mut self, record: &[u8]) -> Result<(), SessionError> {
        self.require_receive()?;

        let msg =
            KmMessage::decode(record).map_err(|err| SessionError::KeyMaterial(err.into()))?;

        if msg.cipher != self.config.cipher {
            return Err(SessionError::KeyMaterial(KeyMaterialError::CipherMismatch {
                announced: msg.cipher,
                session: self.config.cipher,
            }));
        }
        if msg.encapsulation != self.config.encapsulation {
            return Err(SessionError::KeyMaterial(KeyMaterialError::EncapsulationMismatch {
                announced: msg.encapsulation,
                session: self.config.encapsulation,
            }));
        }
        if msg.sek_len != self.config.key_len {
            return Err(SessionError::KeyMaterial(KeyMaterialError::KeyLengthMismatch {
                announced: msg.sek_len,
                session: self.config.key_len,
            }));
        }

        let slots: &[usize] = match msg.key_flags {
            KeyFlags::Even => &[0],
            KeyFlags::Odd => &[1],
            KeyFlags::Both => &[0, 1],
        };

        // Announce-window replay: the record is literally what the
        // slots already hold.
        if slots.iter().all(|&slot| self.contexts[slot].encoded_km() == record) {
            return Ok(());
        }

        let mut kek = self
            .config
            .secret
            .kek(&msg.salt, self.config.key_len)
            .map_err(|err| SessionError::KeyMaterial(err.into()))?;
        let unwrapped = keywheel_crypto::unwrap_key(&kek, &msg.wrap);
        kek.zeroize();
        let mut keys = unwrapped.map_err(|err| SessionError::KeyMaterial(err.into()))?;

        // decode() pinned wrap length to sek_len × key count, so the
        // unwrapped block splits exactly.
        for (idx, &slot) in slots.iter().enumerate() {
            let sek = keys[idx * msg.sek_len..(idx + 1) * msg.sek_len].to_vec();
            self.contexts[slot].install(sek, &msg.salt, record);
            self.active = Some(slot);
        }
        keys.zeroize();

        tracing::debug!(
            flags = ?msg.key_flags,
            sek_len = msg.sek_len,
            "Installed received key material"
        );
        Ok(())
    }

    /// Decrypts one data packet's payload in place, keyed by the slot
    /// the prefix names, returning the cleartext length. A packet with
    /// no key flag is unencrypted and passes through unchanged.
    ///
    /// # Errors
    ///
    /// [`SessionError::WrongDirection`] on a transmit session;
    /// [`SessionError::Packet`] on an unreadable prefix;
    /// [`SessionError::NoKey`] when the named slot holds no key (the KM
    /// record has not arrived yet); [`SessionError::Decrypt`] when the
    /// cipher fails. All of these leave counters untouched; the caller
    /// drops (or queues) the packet and continues.
    pub fn decrypt_packet(
        &mut self,
        prefix: &[u8],
        payload: &mut [u8],
    ) -> Result<usize, SessionError> {
        self.require_receive()?;

        let Some(flags) = self.layout.key_flags(prefix).map_err(SessionError::Packet)? else {
            return Ok(payload.len());
        };
        let (slot, parity) = match flags {
            KeyFlags::Even => (0, KeyParity::Even),
            KeyFlags::Odd => (1, KeyParity::Odd),
            // key_flags() on a data prefix never yields Both.
            KeyFlags::Both => {
                return Err(SessionError::Packet(ProtocolError::InvalidKeyFlags(flags.bits())));
            }
        };

        if !self.contexts[slot].status().is_keyed() {
            return Err(SessionError::NoKey { parity });
        }

        let pki = self.layout.packet_index(prefix).map_err(SessionError::Packet)?;
        let written = self
            .cipher
            .decrypt(self.contexts[slot].key_view(), pki, payload)
            .map_err(SessionError::Decrypt)?;

        self.contexts[slot].bump_packet_count();
        self.active = Some(slot);
        Ok(written)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Instant;

    use keywheel_crypto::{CryptoError, derive_kek, wrap_key};
    use keywheel_proto::{CipherId, Encapsulation};

    use super::*;
    use crate::config::{Direction, Secret, SessionConfig};
    use crate::context::ContextStatus;

    fn receive_session() -> Session {
        let config =
            SessionConfig::new(Encapsulation::Srt, 16, 1456, Secret::passphrase("correct horse"));
        Session::create(config).unwrap()
    }

    fn transmit_record(passphrase: &str) -> Vec<u8> {
        let config =
            SessionConfig::new(Encapsulation::Srt, 16, 1456, Secret::passphrase(passphrase))
                .transmit();
        let mut session = Session::create(config).unwrap();
        let records = session.manage_keys(Instant::now(), 1).unwrap();
        records[0].to_vec()
    }

    #[test]
    fn receive_ops_refuse_transmit_sessions() {
        let config =
            SessionConfig::new(Encapsulation::Srt, 16, 1456, Secret::passphrase("correct horse"))
                .transmit();
        let mut session = Session::create(config).unwrap();
        let wrong = SessionError::WrongDirection { required: Direction::Receive };
        assert_eq!(session.receive_km(&[0u8; 16]).err(), Some(wrong.clone()));
        let mut payload = [0u8; 8];
        assert_eq!(session.decrypt_packet(&[0u8; 16], &mut payload).err(), Some(wrong));
    }

    #[test]
    fn accepted_record_keys_the_named_slot() {
        let mut session = receive_session();
        let record = transmit_record("correct horse");
        session.receive_km(&record).unwrap();
        assert_eq!(session.contexts()[0].status(), ContextStatus::Keyed);
        assert_eq!(session.contexts()[1].status(), ContextStatus::Idle);
        assert_eq!(session.key_flags().unwrap(), KeyFlags::Even);
    }

    #[test]
    fn replayed_record_is_acknowledged_without_rework() {
        let mut session = receive_session();
        let record = transmit_record("correct horse");
        session.receive_km(&record).unwrap();
        let sek_before = session.contexts()[0].key_view().sek.to_vec();

        // A fresh install would zero this counter again.
        session.contexts[0].bump_packet_count();
        session.receive_km(&record).unwrap();
        assert_eq!(session.contexts()[0].packet_count(), 1);
        assert_eq!(session.contexts()[0].key_view().sek, &sek_before[..]);
    }

    #[test]
    fn wrong_secret_is_an_integrity_failure() {
        let mut session = receive_session();
        let record = transmit_record("wrong stirrup");
        let err = session.receive_km(&record).unwrap_err();
        assert_eq!(
            err,
            SessionError::KeyMaterial(KeyMaterialError::Crypto(CryptoError::WrapIntegrity))
        );
        assert!(err.is_transient());
        // The rejected record keyed nothing.
        assert_eq!(session.contexts()[0].status(), ContextStatus::Idle);
    }

    #[test]
    fn undecodable_record_is_rejected() {
        let mut session = receive_session();
        let err = session.receive_km(&[0u8; 4]).unwrap_err();
        assert!(matches!(err, SessionError::KeyMaterial(KeyMaterialError::Protocol(_))));
    }

    #[test]
    fn mismatched_announcements_are_rejected() {
        let mut session = receive_session();

        let mut msg = KmMessage::decode(&transmit_record("correct horse")).unwrap();
        msg.cipher = CipherId::AesEcb;
        let mut bytes = Vec::new();
        msg.encode(&mut bytes).unwrap();
        assert!(matches!(
            session.receive_km(&bytes).unwrap_err(),
            SessionError::KeyMaterial(KeyMaterialError::CipherMismatch { .. })
        ));

        let mut msg = KmMessage::decode(&transmit_record("correct horse")).unwrap();
        msg.encapsulation = Encapsulation::TsUdp;
        let mut bytes = Vec::new();
        msg.encode(&mut bytes).unwrap();
        assert!(matches!(
            session.receive_km(&bytes).unwrap_err(),
            SessionError::KeyMaterial(KeyMaterialError::EncapsulationMismatch { .. })
        ));

        let msg = KmMessage {
            sek_len: 32,
            wrap: vec![0u8; 8 + 32],
            ..KmMessage::decode(&transmit_record("correct horse")).unwrap()
        };
        let mut bytes = Vec::new();
        msg.encode(&mut bytes).unwrap();
        assert!(matches!(
            session.receive_km(&bytes).unwrap_err(),
            SessionError::KeyMaterial(KeyMaterialError::KeyLengthMismatch {
                announced: 32,
                session: 16
            })
        ));
    }

    #[test]
    fn dual_key_record_installs_even_then_odd() {
        let mut session = receive_session();

        let salt = [0x5Au8; 16];
        let kek = derive_kek(b"correct horse", &salt, 16).unwrap();
        let mut keys = vec![0x11u8; 16];
        keys.extend_from_slice(&[0x22u8; 16]);
        let msg = KmMessage {
            key_flags: KeyFlags::Both,
            cipher: CipherId::AesCtr,
            encapsulation: Encapsulation::Srt,
            salt: salt.to_vec(),
            sek_len: 16,
            wrap: wrap_key(&kek, &keys).unwrap(),
        };
        let mut record = Vec::new();
        msg.encode(&mut record).unwrap();

        session.receive_km(&record).unwrap();
        assert_eq!(session.contexts()[0].key_view().sek, [0x11; 16]);
        assert_eq!(session.contexts()[1].key_view().sek, [0x22; 16]);
        // The odd slot was installed last and names the expected parity.
        assert_eq!(session.key_flags().unwrap(), KeyFlags::Odd);
    }

    #[test]
    fn unencrypted_packet_passes_through() {
        let mut session = receive_session();
        let prefix = [0u8; 16];
        let mut payload = [0x42u8; 32];
        assert_eq!(session.decrypt_packet(&prefix, &mut payload), Ok(32));
        assert_eq!(payload, [0x42; 32]);
    }

    #[test]
    fn packet_before_key_material_reports_no_key() {
        let mut session = receive_session();
        let mut prefix = [0u8; 16];
        prefix[4] = KeyFlags::Odd.bits() << 3;
        let mut payload = [0u8; 16];
        assert_eq!(
            session.decrypt_packet(&prefix, &mut payload).err(),
            Some(SessionError::NoKey { parity: KeyParity::Odd })
        );
    }

    #[test]
    fn truncated_prefix_is_a_packet_error() {
        let mut session = receive_session();
        let mut payload = [0u8; 16];
        let err = session.decrypt_packet(&[0u8; 4], &mut payload).unwrap_err();
        assert!(matches!(err, SessionError::Packet(ProtocolError::Truncated { .. })));
    }
}
