//! Fuzz target for the receive pipeline (KM intake → packet decrypt)
//!
//! # Strategy
//!
//! - Raw records: arbitrary bytes through the full KM validation path
//! - Valid records: programmatically wrapped keys under the session secret
//! - Packets: arbitrary prefixes and payloads through decrypt
//!
//! # Invariants
//!
//! - Malformed records and packets are rejected with errors, never panics
//! - A well-formed record wrapped under the right secret always installs
//! - Decryption never reads outside the supplied buffers

#![no_main]

use arbitrary::Arbitrary;
use keywheel_core::{Encapsulation, Secret, Session, SessionConfig};
use keywheel_crypto::{derive_kek, wrap_key};
use keywheel_proto::{CipherId, KeyFlags, KmMessage};
use libfuzzer_sys::fuzz_target;

const PASSPHRASE: &str = "fuzzing passphrase";

#[derive(Debug, Arbitrary)]
struct RxScenario {
    srt_framing: bool,
    steps: Vec<RxStep>,
}

#[derive(Debug, Arbitrary)]
enum RxStep {
    RawRecord(Vec<u8>),
    ValidRecord { flags: u8, key_byte: u8, salt: [u8; 16] },
    Packet { prefix: Vec<u8>, payload: Vec<u8> },
}

fuzz_target!(|scenario: RxScenario| {
    let encapsulation =
        if scenario.srt_framing { Encapsulation::Srt } else { Encapsulation::TsUdp };
    let config =
        SessionConfig::new(encapsulation, 16, 1456, Secret::passphrase(PASSPHRASE));
    let mut session = Session::create(config).expect("receive config is valid");

    for step in scenario.steps {
        match step {
            RxStep::RawRecord(bytes) => {
                // May be rejected for any number of reasons, must not panic.
                let _ = session.receive_km(&bytes);
            }
            RxStep::ValidRecord { flags, key_byte, salt } => {
                let key_flags = match flags % 3 {
                    0 => KeyFlags::Even,
                    1 => KeyFlags::Odd,
                    _ => KeyFlags::Both,
                };
                let count: usize = if key_flags == KeyFlags::Both { 2 } else { 1 };
                let kek = derive_kek(PASSPHRASE.as_bytes(), &salt, 16).expect("kek derives");
                let msg = KmMessage {
                    key_flags,
                    cipher: CipherId::AesCtr,
                    encapsulation,
                    salt: salt.to_vec(),
                    sek_len: 16,
                    wrap: wrap_key(&kek, &vec![key_byte; 16 * count]).expect("wraps"),
                };
                let mut record = Vec::new();
                msg.encode(&mut record).expect("encodes");
                session.receive_km(&record).expect("well-formed record must install");
            }
            RxStep::Packet { prefix, mut payload } => {
                let _ = session.decrypt_packet(&prefix, &mut payload);
            }
        }
    }
});
