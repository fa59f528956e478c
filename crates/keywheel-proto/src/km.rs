//! Keying-material (KM) control messages.
//!
//! A KM message announces one rotation slot's stream key to the peer:
//! the salt in the clear, the stream key itself wrapped under the
//! key-encrypting key. The sender repeats the message across the
//! announce window, so decoding must be cheap and strictly idempotent:
//! the same bytes always decode to the same message.
//!
//! The 16-byte fixed header is parsed zero-copy ([`KmHeader`]); the
//! variable tail (salt + wrapped key block) is carried owned in
//! [`KmMessage`]. The wrapped block is ciphertext and the salt is
//! public, so neither is zeroized here.

use bytes::BufMut;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::{
    HAI_SIGN, WIRE_VERSION,
    errors::{ProtocolError, Result},
};

/// Two-bit key-flag field: which rotation slot(s) a record refers to.
///
/// Data prefixes carry `Even` or `Odd`; a KM message may carry `Both`
/// when one record announces the keys of both slots (even key first in
/// the wrapped block).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum KeyFlags {
    /// Even rotation slot.
    Even = 0b01,
    /// Odd rotation slot.
    Odd = 0b10,
    /// Both slots in one record (KM messages only).
    Both = 0b11,
}

impl KeyFlags {
    /// Raw two-bit wire value.
    #[must_use]
    pub const fn bits(self) -> u8 {
        self as u8
    }

    /// Decode the two-bit wire value. `0b00` (no key) has no variant.
    #[must_use]
    pub const fn from_bits(bits: u8) -> Option<Self> {
        match bits {
            0b01 => Some(Self::Even),
            0b10 => Some(Self::Odd),
            0b11 => Some(Self::Both),
            _ => None,
        }
    }

    /// Number of keys a KM message with these flags carries.
    #[must_use]
    pub const fn key_count(self) -> usize {
        match self {
            Self::Even | Self::Odd => 1,
            Self::Both => 2,
        }
    }

    /// Whether the even slot is included.
    #[must_use]
    pub const fn includes_even(self) -> bool {
        self.bits() & 0b01 != 0
    }

    /// Whether the odd slot is included.
    #[must_use]
    pub const fn includes_odd(self) -> bool {
        self.bits() & 0b10 != 0
    }
}

/// Enumerated cipher identity carried in KM messages.
///
/// Identity is a wire value, never an implementation pointer; a session
/// accepts a KM message only when this id matches its own cipher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CipherId {
    /// AES in ECB mode (block-aligned payloads).
    AesEcb = 1,
    /// AES in counter mode (the production cipher).
    AesCtr = 2,
    /// AES in CBC mode.
    AesCbc = 3,
    /// AES-GCM (authenticated).
    AesGcm = 4,
}

impl CipherId {
    /// Raw wire byte.
    #[must_use]
    pub const fn to_u8(self) -> u8 {
        self as u8
    }

    /// Decode the wire byte.
    #[must_use]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::AesEcb),
            2 => Some(Self::AesCtr),
            3 => Some(Self::AesCbc),
            4 => Some(Self::AesGcm),
            _ => None,
        }
    }
}

/// Stream encapsulation: which transport framing the data packets use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Encapsulation {
    /// Standalone framing (self-contained media-stream records over UDP).
    TsUdp = 1,
    /// Prefixes embedded in SRT data packet headers.
    Srt = 2,
}

impl Encapsulation {
    /// Raw wire byte.
    #[must_use]
    pub const fn to_u8(self) -> u8 {
        self as u8
    }

    /// Decode the wire byte.
    #[must_use]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::TsUdp),
            2 => Some(Self::Srt),
            _ => None,
        }
    }

    /// Packet prefix layout used under this encapsulation.
    #[must_use]
    pub const fn layout(self) -> crate::packet::PacketLayout {
        match self {
            Self::TsUdp => crate::packet::PacketLayout::Standalone,
            Self::Srt => crate::packet::PacketLayout::Srt,
        }
    }
}

/// Fixed 16-byte KM message header (big-endian network byte order).
///
/// Fields are raw byte arrays to keep the packed layout alignment-free;
/// accessor methods decode them. All 16-byte patterns are valid for the
/// cast itself; semantic validation happens in [`KmHeader::from_bytes`]
/// and [`KmMessage::decode`], cheapest checks first.
#[repr(C, packed)]
#[derive(Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct KmHeader {
    tag: u8,            // 0 | version (3 bits) | packet type (4 bits)
    sign: [u8; 2],      // HAI_SIGN
    flags: u8,          // resv (6 bits) | key flags (2 bits)
    keki: [u8; 4],      // key-encrypting-key index, always 0
    cipher: u8,         // CipherId
    auth: u8,           // always 0 (no message auth)
    encapsulation: u8,  // Encapsulation
    resv1: u8,          //
    resv2: [u8; 2],     //
    salt_words: u8,     // salt length / 4
    sek_words: u8,      // stream key length / 4, per key
}

impl KmHeader {
    /// Size of the serialized header.
    pub const SIZE: usize = 16;

    /// Packet type tag nibble for KM messages.
    pub const PACKET_TYPE: u8 = 2;

    /// Largest salt a KM message may carry.
    pub const MAX_SALT_LEN: usize = 16;

    /// Parse the fixed header from the front of a record (zero-copy).
    ///
    /// Validates length, version, packet type, and sign; the enumerated
    /// fields and length arithmetic are validated by
    /// [`KmMessage::decode`], which needs the full record.
    ///
    /// # Errors
    ///
    /// - [`ProtocolError::Truncated`] on fewer than 16 bytes
    /// - [`ProtocolError::UnsupportedVersion`] on a foreign version
    /// - [`ProtocolError::UnexpectedPacketType`] when the tag is not a KM
    ///   message
    /// - [`ProtocolError::InvalidSign`] on a wrong sign
    pub fn from_bytes(bytes: &[u8]) -> Result<&Self> {
        let header = Self::ref_from_prefix(bytes)
            .map_err(|_| ProtocolError::Truncated { expected: Self::SIZE, actual: bytes.len() })?
            .0;

        if header.version() != WIRE_VERSION {
            return Err(ProtocolError::UnsupportedVersion(header.version()));
        }

        if header.packet_type() != Self::PACKET_TYPE {
            return Err(ProtocolError::UnexpectedPacketType(header.packet_type()));
        }

        if u16::from_be_bytes(header.sign) != HAI_SIGN {
            return Err(ProtocolError::InvalidSign(u16::from_be_bytes(header.sign)));
        }

        Ok(header)
    }

    /// Wire version from the tag byte.
    ///
    /// The reserved top bit reads as part of the version, so a record
    /// with it set reports a version this implementation does not
    /// speak and is rejected.
    #[must_use]
    pub fn version(&self) -> u8 {
        self.tag >> 4
    }

    /// Packet type nibble from the tag byte.
    #[must_use]
    pub fn packet_type(&self) -> u8 {
        self.tag & 0x0F
    }

    /// Raw two-bit key-flag field.
    #[must_use]
    pub fn key_flag_bits(&self) -> u8 {
        self.flags & 0x03
    }

    /// Key-encrypting-key index (0 on every conforming record).
    #[must_use]
    pub fn keki(&self) -> u32 {
        u32::from_be_bytes(self.keki)
    }

    /// Raw cipher id byte.
    #[must_use]
    pub fn cipher(&self) -> u8 {
        self.cipher
    }

    /// Raw auth id byte.
    #[must_use]
    pub fn auth(&self) -> u8 {
        self.auth
    }

    /// Raw stream-encapsulation byte.
    #[must_use]
    pub fn encapsulation(&self) -> u8 {
        self.encapsulation
    }

    /// Declared salt length in bytes.
    #[must_use]
    pub fn salt_len(&self) -> usize {
        usize::from(self.salt_words) * 4
    }

    /// Declared per-key stream key length in bytes.
    #[must_use]
    pub fn sek_len(&self) -> usize {
        usize::from(self.sek_words) * 4
    }

    /// Serialized header bytes.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let bytes = IntoBytes::as_bytes(self);
        let mut arr = [0u8; Self::SIZE];
        arr.copy_from_slice(bytes);
        arr
    }
}

// Manual Debug implementation (can't derive due to packed repr)
impl std::fmt::Debug for KmHeader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KmHeader")
            .field("version", &self.version())
            .field("packet_type", &self.packet_type())
            .field("key_flag_bits", &format!("{:#04b}", self.key_flag_bits()))
            .field("keki", &self.keki())
            .field("cipher", &self.cipher())
            .field("auth", &self.auth())
            .field("encapsulation", &self.encapsulation())
            .field("salt_len", &self.salt_len())
            .field("sek_len", &self.sek_len())
            .finish_non_exhaustive()
    }
}

// Manual PartialEq implementation (can't derive due to packed repr)
impl PartialEq for KmHeader {
    fn eq(&self, other: &Self) -> bool {
        self.to_bytes() == other.to_bytes()
    }
}

impl Eq for KmHeader {}

/// Decoded KM message: header fields plus the owned variable tail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KmMessage {
    /// Which slot(s) the wrapped block keys.
    pub key_flags: KeyFlags,
    /// Cipher the announced key is for.
    pub cipher: CipherId,
    /// Transport framing of the data stream the key protects.
    pub encapsulation: Encapsulation,
    /// Keying salt (public; also feeds KEK derivation).
    pub salt: Vec<u8>,
    /// Per-key stream key length in bytes.
    pub sek_len: usize,
    /// Key-wrapped stream key block: `8 + sek_len × key_count` bytes.
    pub wrap: Vec<u8>,
}

impl KmMessage {
    /// Integrity/IV overhead the key-wrap algorithm adds to the keys.
    pub const WRAP_TAG_LEN: usize = 8;

    /// Largest possible encoded KM message (both 256-bit keys, full
    /// salt).
    pub const MAX_SIZE: usize =
        KmHeader::SIZE + KmHeader::MAX_SALT_LEN + Self::WRAP_TAG_LEN + 2 * 32;

    /// Total encoded length of this message.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        KmHeader::SIZE + self.salt.len() + self.wrap.len()
    }

    /// Encode into `dst`.
    ///
    /// # Errors
    ///
    /// Rejects messages whose fields are mutually inconsistent (salt not
    /// word-aligned or over the maximum, key length not an AES size,
    /// wrap block length disagreeing with `sek_len` × key count), which
    /// are the same checks [`Self::decode`] applies to received records.
    pub fn encode(&self, dst: &mut impl BufMut) -> Result<()> {
        if self.salt.len() > KmHeader::MAX_SALT_LEN || self.salt.len() % 4 != 0 {
            return Err(ProtocolError::SaltTooLong(self.salt.len()));
        }
        if !matches!(self.sek_len, 16 | 24 | 32) {
            return Err(ProtocolError::InvalidKeyLength(self.sek_len));
        }
        let expected_wrap = Self::WRAP_TAG_LEN + self.sek_len * self.key_flags.key_count();
        if self.wrap.len() != expected_wrap {
            return Err(ProtocolError::LengthMismatch {
                declared: expected_wrap,
                actual: self.wrap.len(),
            });
        }

        dst.put_u8((WIRE_VERSION << 4) | KmHeader::PACKET_TYPE);
        dst.put_u16(HAI_SIGN);
        dst.put_u8(self.key_flags.bits());
        dst.put_u32(0); // KEKI: default key-encrypting key
        dst.put_u8(self.cipher.to_u8());
        dst.put_u8(0); // auth: none
        dst.put_u8(self.encapsulation.to_u8());
        dst.put_u8(0);
        dst.put_u16(0);
        dst.put_u8((self.salt.len() / 4) as u8);
        dst.put_u8((self.sek_len / 4) as u8);
        dst.put_slice(&self.salt);
        dst.put_slice(&self.wrap);
        Ok(())
    }

    /// Decode and fully validate a KM record.
    ///
    /// The record must be exactly as long as its header declares;
    /// trailing bytes are rejected, since a KM message is always a whole
    /// control payload.
    ///
    /// # Errors
    ///
    /// Everything [`KmHeader::from_bytes`] rejects, plus
    /// [`ProtocolError::InvalidKeyFlags`], [`ProtocolError::UnknownKek`],
    /// [`ProtocolError::UnknownCipher`], [`ProtocolError::UnknownAuth`],
    /// [`ProtocolError::UnknownEncapsulation`],
    /// [`ProtocolError::SaltTooLong`],
    /// [`ProtocolError::InvalidKeyLength`], and
    /// [`ProtocolError::LengthMismatch`].
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let header = KmHeader::from_bytes(bytes)?;

        let key_flags = KeyFlags::from_bits(header.key_flag_bits())
            .ok_or(ProtocolError::InvalidKeyFlags(header.key_flag_bits()))?;

        if header.keki() != 0 {
            return Err(ProtocolError::UnknownKek(header.keki()));
        }

        let cipher = CipherId::from_u8(header.cipher())
            .ok_or(ProtocolError::UnknownCipher(header.cipher()))?;

        if header.auth() != 0 {
            return Err(ProtocolError::UnknownAuth(header.auth()));
        }

        let encapsulation = Encapsulation::from_u8(header.encapsulation())
            .ok_or(ProtocolError::UnknownEncapsulation(header.encapsulation()))?;

        let salt_len = header.salt_len();
        if salt_len > KmHeader::MAX_SALT_LEN {
            return Err(ProtocolError::SaltTooLong(salt_len));
        }

        let sek_len = header.sek_len();
        if !matches!(sek_len, 16 | 24 | 32) {
            return Err(ProtocolError::InvalidKeyLength(sek_len));
        }

        let wrap_len = Self::WRAP_TAG_LEN + sek_len * key_flags.key_count();
        let declared = KmHeader::SIZE + salt_len + wrap_len;
        if bytes.len() != declared {
            return Err(ProtocolError::LengthMismatch { declared, actual: bytes.len() });
        }

        let salt = bytes[KmHeader::SIZE..KmHeader::SIZE + salt_len].to_vec();
        let wrap = bytes[KmHeader::SIZE + salt_len..].to_vec();

        Ok(Self { key_flags, cipher, encapsulation, salt, sek_len, wrap })
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;

    fn sample() -> KmMessage {
        KmMessage {
            key_flags: KeyFlags::Even,
            cipher: CipherId::AesCtr,
            encapsulation: Encapsulation::Srt,
            salt: (0u8..16).collect(),
            sek_len: 16,
            wrap: vec![0xAA; 24],
        }
    }

    fn encode_to_vec(msg: &KmMessage) -> Vec<u8> {
        let mut out = Vec::new();
        msg.encode(&mut out).expect("sample message encodes");
        out
    }

    #[test]
    fn header_size() {
        assert_eq!(std::mem::size_of::<KmHeader>(), KmHeader::SIZE);
        assert_eq!(KmHeader::SIZE, 16);
    }

    #[test]
    fn exact_header_byte_layout() {
        let bytes = encode_to_vec(&sample());
        assert_eq!(hex::encode(&bytes[..KmHeader::SIZE]), "12202901000000000200020000000404");
        assert_eq!(bytes.len(), 16 + 16 + 24);
        assert_eq!(&bytes[16..32], &(0u8..16).collect::<Vec<u8>>()[..]);
        assert_eq!(&bytes[32..], &[0xAA; 24]);
    }

    #[test]
    fn round_trip() {
        let msg = sample();
        let decoded = KmMessage::decode(&encode_to_vec(&msg)).expect("decodes");
        assert_eq!(decoded, msg);
        assert_eq!(decoded.encoded_len(), 56);
    }

    #[test]
    fn both_keys_round_trip() {
        let msg = KmMessage {
            key_flags: KeyFlags::Both,
            wrap: vec![0x55; 8 + 2 * 16],
            ..sample()
        };
        let decoded = KmMessage::decode(&encode_to_vec(&msg)).expect("decodes");
        assert_eq!(decoded.key_flags.key_count(), 2);
        assert_eq!(decoded.wrap.len(), 40);
    }

    #[test]
    fn reject_short_buffer() {
        assert_eq!(
            KmMessage::decode(&[0x12; 8]),
            Err(ProtocolError::Truncated { expected: 16, actual: 8 })
        );
    }

    #[test]
    fn reject_wrong_version() {
        let mut bytes = encode_to_vec(&sample());
        bytes[0] = (3 << 4) | KmHeader::PACKET_TYPE;
        assert_eq!(KmMessage::decode(&bytes), Err(ProtocolError::UnsupportedVersion(3)));
    }

    #[test]
    fn reject_reserved_tag_bit() {
        // The tag's top bit is pinned to zero; set, it reads as a
        // foreign version.
        let mut bytes = encode_to_vec(&sample());
        bytes[0] |= 0x80;
        assert_eq!(KmMessage::decode(&bytes), Err(ProtocolError::UnsupportedVersion(9)));
    }

    #[test]
    fn reject_data_record() {
        let mut bytes = encode_to_vec(&sample());
        bytes[0] = (WIRE_VERSION << 4) | 1; // media-stream tag
        assert_eq!(KmMessage::decode(&bytes), Err(ProtocolError::UnexpectedPacketType(1)));
    }

    #[test]
    fn reject_bad_sign() {
        let mut bytes = encode_to_vec(&sample());
        bytes[1] = 0xFF;
        assert_eq!(KmMessage::decode(&bytes), Err(ProtocolError::InvalidSign(0xFF29)));
    }

    #[test]
    fn reject_zero_key_flags() {
        let mut bytes = encode_to_vec(&sample());
        bytes[3] = 0;
        assert_eq!(KmMessage::decode(&bytes), Err(ProtocolError::InvalidKeyFlags(0)));
    }

    #[test]
    fn reject_nondefault_kek_index() {
        let mut bytes = encode_to_vec(&sample());
        bytes[7] = 2;
        assert_eq!(KmMessage::decode(&bytes), Err(ProtocolError::UnknownKek(2)));
    }

    #[test]
    fn reject_unknown_cipher_and_auth() {
        let mut bytes = encode_to_vec(&sample());
        bytes[8] = 9;
        assert_eq!(KmMessage::decode(&bytes), Err(ProtocolError::UnknownCipher(9)));

        let mut bytes = encode_to_vec(&sample());
        bytes[9] = 1;
        assert_eq!(KmMessage::decode(&bytes), Err(ProtocolError::UnknownAuth(1)));
    }

    #[test]
    fn reject_length_mismatch() {
        let mut bytes = encode_to_vec(&sample());
        bytes.push(0);
        assert_eq!(
            KmMessage::decode(&bytes),
            Err(ProtocolError::LengthMismatch { declared: 56, actual: 57 })
        );

        let mut bytes = encode_to_vec(&sample());
        bytes.truncate(55);
        assert_eq!(
            KmMessage::decode(&bytes),
            Err(ProtocolError::LengthMismatch { declared: 56, actual: 55 })
        );
    }

    #[test]
    fn reject_invalid_key_length() {
        let mut bytes = encode_to_vec(&sample());
        bytes[15] = 5; // 20-byte key is not an AES size
        assert_eq!(KmMessage::decode(&bytes), Err(ProtocolError::InvalidKeyLength(20)));
    }

    #[test]
    fn encode_rejects_inconsistent_wrap() {
        let msg = KmMessage { wrap: vec![0; 10], ..sample() };
        let mut out = Vec::new();
        assert_eq!(
            msg.encode(&mut out),
            Err(ProtocolError::LengthMismatch { declared: 24, actual: 10 })
        );
    }
}
