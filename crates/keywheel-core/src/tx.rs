//! Transmit data pipeline.
//!
//! The per-packet flow is `tx_buffer` (provision an aligned buffer),
//! fill the payload, then `process` (schedule, encrypt, collect KM
//! emissions, rotate). Transports that interleave the steps themselves
//! use `manage_keys` and `encrypt_packet` directly.

use std::time::Instant;

use bytes::Bytes;
use keywheel_proto::PacketLayout;

use crate::errors::SessionError;
use crate::session::Session;

/// Rounds a payload length up to the cipher's block alignment.
fn pad_to(len: usize, factor: usize) -> usize {
    if factor <= 1 { len } else { len.div_ceil(factor) * factor }
}

/// Owned outgoing-packet buffer: a prefix region for the transport or
/// media-stream header followed by a pad-aligned payload region.
pub struct TxBuffer {
    buf: Vec<u8>,
    prefix_len: usize,
}

impl TxBuffer {
    fn new(prefix_len: usize, payload_len: usize) -> Self {
        Self { buf: vec![0u8; prefix_len + payload_len], prefix_len }
    }

    /// Length of the prefix region.
    #[must_use]
    pub fn prefix_len(&self) -> usize {
        self.prefix_len
    }

    /// Prefix region.
    #[must_use]
    pub fn prefix(&self) -> &[u8] {
        &self.buf[..self.prefix_len]
    }

    /// Prefix region, writable. SRT transports stamp their sequence
    /// number here before handing the packet to [`Session::process`].
    pub fn prefix_mut(&mut self) -> &mut [u8] {
        &mut self.buf[..self.prefix_len]
    }

    /// Payload region.
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.buf[self.prefix_len..]
    }

    /// Payload region, writable.
    pub fn payload_mut(&mut self) -> &mut [u8] {
        &mut self.buf[self.prefix_len..]
    }

    /// The whole packet, prefix then payload.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Total packet length.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Whether the buffer is zero-sized.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub(crate) fn split_mut(&mut self) -> (&mut [u8], &mut [u8]) {
        self.buf.split_at_mut(self.prefix_len)
    }
}

impl std::fmt::Debug for TxBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TxBuffer")
            .field("prefix_len", &self.prefix_len)
            .field("payload_len", &(self.buf.len() - self.prefix_len))
            .finish()
    }
}

/// Output of one [`Session::process`] call.
#[derive(Debug)]
pub struct TxBatch {
    /// Encoded KM records due on this batch; the caller sends them
    /// ahead of the packet.
    pub key_material: Vec<Bytes>,
    /// Length of the encrypted packet, prefix included.
    pub packet_len: usize,
}

impl TxBatch {
    /// Send slots the batch occupies: one per KM record plus the packet.
    #[must_use]
    pub fn slot_count(&self) -> usize {
        self.key_material.len() + 1
    }
}

impl Session {
    /// Provisions a packet buffer for `data_len` payload bytes, rounded
    /// up to the cipher's pad factor.
    ///
    /// # Errors
    ///
    /// [`SessionError::WrongDirection`] on a receive session;
    /// [`SessionError::BufferTooSmall`] when the padded payload exceeds
    /// the configured capacity; nothing is corrupted and the next
    /// valid request succeeds.
    pub fn tx_buffer(&self, data_len: usize) -> Result<TxBuffer, SessionError> {
        self.require_transmit()?;
        let padded = pad_to(data_len, self.cipher.pad_factor());
        if padded > self.config.data_max_len {
            return Err(SessionError::BufferTooSmall {
                requested: padded,
                capacity: self.config.data_max_len,
            });
        }
        Ok(TxBuffer::new(self.layout.prefix_len(), padded))
    }

    /// Runs the rotation scheduler and drains due KM emissions, at most
    /// `max_out` (zero emits nothing and is not an error).
    ///
    /// # Errors
    ///
    /// [`SessionError::WrongDirection`] on a receive session;
    /// [`SessionError::NotReady`] when no context is active;
    /// [`SessionError::ContextInit`] when a pre-announce rekey fails.
    pub fn manage_keys(
        &mut self,
        now: Instant,
        max_out: usize,
    ) -> Result<Vec<Bytes>, SessionError> {
        self.require_transmit()?;
        self.manage_km(now)?;
        Ok(self.pending_km(now, max_out))
    }

    /// Stamps the prefix and encrypts the payload in place under the
    /// active key, returning the total packet length. Does not run the
    /// scheduler.
    ///
    /// # Errors
    ///
    /// [`SessionError::WrongDirection`] on a receive session;
    /// [`SessionError::NotReady`] when no context is active;
    /// [`SessionError::Packet`] on a malformed prefix;
    /// [`SessionError::Encrypt`] when the cipher fails; counters and
    /// rotation state are untouched and the caller drops the packet.
    pub fn encrypt_packet(
        &mut self,
        prefix: &mut [u8],
        payload: &mut [u8],
    ) -> Result<usize, SessionError> {
        self.require_transmit()?;
        self.encrypt_in_place(prefix, payload)
    }

    pub(crate) fn encrypt_in_place(
        &mut self,
        prefix: &mut [u8],
        payload: &mut [u8],
    ) -> Result<usize, SessionError> {
        let slot = self.active_slot()?;

        // Standalone framing owns the packet index; SRT reads back the
        // sequence number the transport already stamped.
        let pki = match self.layout {
            PacketLayout::Standalone => self.packet_index,
            PacketLayout::Srt => self.layout.packet_index(prefix).map_err(SessionError::Packet)?,
        };
        let flags = self.contexts[slot].parity().key_flags();
        self.layout.stamp_prefix(prefix, flags, pki).map_err(SessionError::Packet)?;

        let written = self
            .cipher
            .encrypt(self.contexts[slot].key_view(), pki, payload)
            .map_err(SessionError::Encrypt)?;

        self.contexts[slot].bump_packet_count();
        if self.layout == PacketLayout::Standalone {
            self.packet_index = self.packet_index.wrapping_add(1);
        }
        Ok(prefix.len() + written)
    }

    /// The combined per-packet entry point: schedule, encrypt, collect
    /// KM emissions, rotate.
    ///
    /// A failed encrypt aborts the call before any KM emission is
    /// consumed, so a dropped packet never discards an announcement.
    ///
    /// # Errors
    ///
    /// As [`Session::manage_keys`] and [`Session::encrypt_packet`].
    pub fn process(
        &mut self,
        now: Instant,
        packet: &mut TxBuffer,
        max_km: usize,
    ) -> Result<TxBatch, SessionError> {
        self.require_transmit()?;
        self.manage_km(now)?;

        let (prefix, payload) = packet.split_mut();
        let packet_len = self.encrypt_in_place(prefix, payload)?;

        let key_material = self.pending_km(now, max_km);
        self.rotate_if_due()?;
        Ok(TxBatch { key_material, packet_len })
    }
}
