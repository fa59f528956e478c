//! Fuzz target for AES key wrap/unwrap
//!
//! This fuzzer drives the key-wrap primitives with arbitrary inputs to find:
//! - Panics on odd KEK or blob sizes
//! - Out-of-bounds access in the semiblock loops
//! - Integrity checks that accept corrupted blobs
//!
//! The fuzzer should NEVER panic. Unwrap of arbitrary bytes may only fail;
//! a wrap of valid key material must always unwrap back to the input.

#![no_main]

use arbitrary::Arbitrary;
use keywheel_crypto::{unwrap_key, wrap_key};
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
struct WrapInput {
    kek_seed: [u8; 32],
    kek_len_choice: u8,
    key_count: bool,
    sek_seed: u8,
    blob: Vec<u8>,
    flip: Option<(u16, u8)>,
}

fuzz_target!(|input: WrapInput| {
    // Arbitrary blobs must be rejected cleanly, never panic.
    let _ = unwrap_key(&input.kek_seed, &input.blob);
    let _ = unwrap_key(&input.blob, &input.blob);

    let kek_len = [16, 24, 32][(input.kek_len_choice % 3) as usize];
    let kek = &input.kek_seed[..kek_len];
    let sek_len = if input.key_count { 32 } else { 16 };
    let plain = vec![input.sek_seed; sek_len];

    let wrapped = wrap_key(kek, &plain).expect("valid sizes must wrap");
    let unwrapped = unwrap_key(kek, &wrapped).expect("own wrap must unwrap");
    assert_eq!(unwrapped, plain);

    // A single flipped bit must fail the integrity check.
    if let Some((pos, bit)) = input.flip {
        let mut corrupt = wrapped.clone();
        let idx = pos as usize % corrupt.len();
        corrupt[idx] ^= 1 << (bit % 8);
        assert!(unwrap_key(kek, &corrupt).is_err());
    }
});
