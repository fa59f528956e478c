//! Keywheel session engine.
//!
//! Key-rotation session layer for encrypted packet streams. A
//! [`Session`] owns two rotation slots holding the even and odd stream
//! keys: while one key carries traffic, the next is generated, wrapped
//! under the passphrase-derived KEK, and announced by repetition ahead
//! of rotation, so the receiver can switch keys without a round trip.
//! Each data packet names the key that encrypted it in a two-bit flag
//! stamped into its prefix.
//!
//! # Architecture
//!
//! ```text
//!  even slot   ACTIVE ───────────────────────────▶ DECOMMISSIONED ─┐
//!                │ refresh_rate packets                            │ rekey
//!                │            ┌── announce window ──┐              ▼
//!  odd slot    IDLE ────────▶ KEYED ─▶ ANNOUNCED ───┴─▶ ACTIVE   (next
//!                rekey at refresh - pre_announce              generation)
//! ```
//!
//! The engine is sans-IO: nothing blocks, nothing reads the clock, and
//! time-driven behavior (periodic KM re-announcement) takes `now` from
//! the caller. The transport sends what `process` hands back: the due
//! KM records ahead of the encrypted packet.
//!
//! # Components
//!
//! - [`Session`]: one end of an encrypted stream; create, clone, drive
//! - [`SessionConfig`] / [`Secret`]: immutable parameters and the
//!   shared secret protecting announced keys
//! - [`CryptoContext`]: one rotation slot and its key lifecycle
//! - [`TxBuffer`] / [`TxBatch`]: pad-aligned packet buffers and the
//!   per-packet emission bundle
//! - [`SessionError`]: typed failures, split fatal / transient
//!
//! Custom ciphers plug in through [`PacketCipher`] and
//! [`Session::with_cipher`]; the built-in implementation is AES-CTR.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod config;
pub mod context;
pub mod errors;
mod rotation;
mod rx;
pub mod session;
pub mod tx;

pub use config::{Direction, Secret, SessionConfig};
pub use context::{ContextStatus, CryptoContext, KeyParity};
pub use errors::{ConfigError, KeyMaterialError, SessionError};
pub use keywheel_crypto::{CryptoError, KeyView, PacketCipher};
pub use keywheel_proto::{
    CfgFlags, CipherId, Encapsulation, KeyFlags, KmMessage, PacketLayout, ProtocolError,
};
pub use session::Session;
pub use tx::{TxBatch, TxBuffer};
