//! Public configuration flag word.
//!
//! The flag word travels in session configuration, not on the wire, but
//! its bit assignments are part of the public contract with embedding
//! transports and are stable across versions.

use bitflags::bitflags;

bitflags! {
    /// Session configuration flags.
    ///
    /// `CRYPTO` must always be set; a session without it is a
    /// configuration error, kept explicit so a zeroed config can never
    /// silently construct a working session. `TX` selects the transmit
    /// direction; absent means receive.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CfgFlags: u32 {
        /// Payload encryption is enabled (mandatory).
        const CRYPTO = 0x01;
        /// Session encrypts outgoing packets (absent: decrypts incoming).
        const TX = 0x02;
    }
}

impl CfgFlags {
    /// Flag word for a transmit session.
    #[must_use]
    pub const fn transmit() -> Self {
        Self::CRYPTO.union(Self::TX)
    }

    /// Flag word for a receive session.
    #[must_use]
    pub const fn receive() -> Self {
        Self::CRYPTO
    }

    /// Whether the word selects the transmit direction.
    #[must_use]
    pub const fn is_transmit(self) -> bool {
        self.contains(Self::TX)
    }
}
