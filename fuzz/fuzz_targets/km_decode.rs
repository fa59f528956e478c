//! Fuzz target for KmMessage::decode
//!
//! This fuzzer tests KM record parsing with arbitrary byte sequences to find:
//! - Parser crashes or panics
//! - Integer overflows in length arithmetic
//! - Salt/wrap bounds that bypass validation
//!
//! The fuzzer should NEVER panic. All invalid inputs should return an error,
//! and any accepted record must re-encode to an equal message.

#![no_main]

use keywheel_proto::KmMessage;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(msg) = KmMessage::decode(data) else {
        return;
    };

    // Accepted records survive a re-encode round trip.
    let mut bytes = Vec::new();
    msg.encode(&mut bytes).expect("decoded message must re-encode");
    let again = KmMessage::decode(&bytes).expect("re-encoded message must decode");
    assert_eq!(msg, again);
});
