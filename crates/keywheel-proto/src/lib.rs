//! Wire records for the Keywheel stream-encryption protocol.
//!
//! Two record families share a common tag scheme: keying-material (KM)
//! control messages, which carry a wrapped stream key from sender to
//! receiver, and the per-packet data prefixes in which the sender stamps
//! the two-bit key flag that tells the receiver which of the two rotating
//! keys encrypted a payload.
//!
//! A KM message is a fixed 16-byte header followed by a salt and the
//! key-wrapped stream key(s):
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |0|Vers |  PT   |             Sign              |    resv   |KF |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                             KEKI                              |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |    Cipher     |     Auth      |      SE       |     resv      |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |             resv              |    Slen/4     |    Klen/4     |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                        Salt  ...                              |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                     Wrapped key(s)  ...                       |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! All multi-byte integers are big-endian. Header parsing uses
//! compile-time verified layouts via `zerocopy`; every field of a record
//! is validated before the record is accepted, cheapest checks first.
#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod errors;
pub mod flags;
pub mod km;
pub mod packet;

pub use errors::{ProtocolError, Result};
pub use flags::CfgFlags;
pub use km::{CipherId, Encapsulation, KeyFlags, KmHeader, KmMessage};
pub use packet::PacketLayout;

/// Record sign shared by every Keywheel wire record ("HAI" packed into
/// three 5-bit letters).
pub const HAI_SIGN: u16 = 0x2029;

/// Wire format version carried in the tag byte of every record.
pub const WIRE_VERSION: u8 = 1;
