//! Data-packet prefix layouts.
//!
//! The session layer never frames whole packets; it only reads and
//! writes a small prefix at the front of each one. Under standalone
//! encapsulation the prefix is this protocol's own 8-byte media-stream
//! header (tag, sign, key flag, packet index). Under SRT encapsulation
//! the prefix is the transport's 16-byte data header: the transport owns
//! the sequence number and timestamp, and this layer only reads the
//! sequence number as a packet index and stamps the two key-flag bits of
//! the message-number word.
//!
//! ```text
//! standalone (8 bytes)                 SRT (16 bytes)
//! +----+------+----+-------------+    +--------------+--------------+
//! |0x11| sign | KF | packet index|    |0|  sequence number          |
//! +----+------+----+-------------+    +--------------+--------------+
//!                                     |FF|O|KK|R|  message number   |
//!                                     +--------------+--------------+
//!                                     |  timestamp   | destination  |
//!                                     +--------------+--------------+
//! ```

use crate::{
    HAI_SIGN, WIRE_VERSION,
    errors::{ProtocolError, Result},
    km::KeyFlags,
};

// KK field of the SRT message-number word, bits 3-4 of its first byte.
const SRT_KK_SHIFT: u32 = 3;
const SRT_KK_MASK: u8 = 0b11 << SRT_KK_SHIFT;

/// Per-transport prefix layout descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketLayout {
    /// Self-framed 8-byte media-stream prefix, written by this layer.
    Standalone,
    /// 16-byte SRT data header owned by the transport; this layer stamps
    /// only the key-flag bits.
    Srt,
}

impl PacketLayout {
    /// Packet type tag nibble for standalone media-stream records.
    pub const MEDIA_PACKET_TYPE: u8 = 1;

    /// Prefix length in bytes for this layout.
    #[must_use]
    pub const fn prefix_len(self) -> usize {
        match self {
            Self::Standalone => 8,
            Self::Srt => 16,
        }
    }

    /// Stamp a prefix for transmission.
    ///
    /// Standalone: writes the whole prefix (tag, sign, key flag, and
    /// `pki` as the packet index). SRT: writes only the key-flag bits;
    /// the transport has already stamped the sequence number `pki` was
    /// read from, so it is ignored here.
    ///
    /// # Errors
    ///
    /// [`ProtocolError::Truncated`] when `prefix` is shorter than
    /// [`Self::prefix_len`]; [`ProtocolError::InvalidKeyFlags`] for
    /// [`KeyFlags::Both`], which no data packet may carry.
    pub fn stamp_prefix(self, prefix: &mut [u8], flags: KeyFlags, pki: u32) -> Result<()> {
        if prefix.len() < self.prefix_len() {
            return Err(ProtocolError::Truncated {
                expected: self.prefix_len(),
                actual: prefix.len(),
            });
        }
        if flags == KeyFlags::Both {
            return Err(ProtocolError::InvalidKeyFlags(flags.bits()));
        }

        match self {
            Self::Standalone => {
                prefix[0] = (WIRE_VERSION << 4) | Self::MEDIA_PACKET_TYPE;
                prefix[1..3].copy_from_slice(&HAI_SIGN.to_be_bytes());
                prefix[3] = flags.bits();
                prefix[4..8].copy_from_slice(&pki.to_be_bytes());
            }
            Self::Srt => {
                prefix[4] = (prefix[4] & !SRT_KK_MASK) | (flags.bits() << SRT_KK_SHIFT);
            }
        }
        Ok(())
    }

    /// Packet index carried by a prefix (standalone: this layer's own
    /// counter; SRT: the transport's 31-bit sequence number).
    ///
    /// # Errors
    ///
    /// [`ProtocolError::Truncated`] when `prefix` is too short.
    pub fn packet_index(self, prefix: &[u8]) -> Result<u32> {
        if prefix.len() < self.prefix_len() {
            return Err(ProtocolError::Truncated {
                expected: self.prefix_len(),
                actual: prefix.len(),
            });
        }
        Ok(match self {
            Self::Standalone => u32::from_be_bytes([prefix[4], prefix[5], prefix[6], prefix[7]]),
            Self::Srt => {
                u32::from_be_bytes([prefix[0], prefix[1], prefix[2], prefix[3]]) & 0x7FFF_FFFF
            }
        })
    }

    /// Key flag carried by a received prefix; `None` means the payload
    /// is not encrypted.
    ///
    /// Standalone prefixes are fully validated (version, packet type,
    /// sign) since they are this protocol's own records; SRT prefixes
    /// have no magic of their own and only the flag bits are read.
    ///
    /// # Errors
    ///
    /// [`ProtocolError::Truncated`], and for standalone prefixes the tag
    /// and sign rejections of a foreign record;
    /// [`ProtocolError::InvalidKeyFlags`] when the bits name both slots.
    pub fn key_flags(self, prefix: &[u8]) -> Result<Option<KeyFlags>> {
        if prefix.len() < self.prefix_len() {
            return Err(ProtocolError::Truncated {
                expected: self.prefix_len(),
                actual: prefix.len(),
            });
        }

        let bits = match self {
            Self::Standalone => {
                // High nibble: reserved bit (pinned zero) plus version.
                let version = prefix[0] >> 4;
                if version != WIRE_VERSION {
                    return Err(ProtocolError::UnsupportedVersion(version));
                }
                let packet_type = prefix[0] & 0x0F;
                if packet_type != Self::MEDIA_PACKET_TYPE {
                    return Err(ProtocolError::UnexpectedPacketType(packet_type));
                }
                let sign = u16::from_be_bytes([prefix[1], prefix[2]]);
                if sign != HAI_SIGN {
                    return Err(ProtocolError::InvalidSign(sign));
                }
                prefix[3] & 0x03
            }
            Self::Srt => (prefix[4] >> SRT_KK_SHIFT) & 0x03,
        };

        match KeyFlags::from_bits(bits) {
            None => Ok(None),
            Some(KeyFlags::Both) => Err(ProtocolError::InvalidKeyFlags(bits)),
            Some(flags) => Ok(Some(flags)),
        }
    }
}
