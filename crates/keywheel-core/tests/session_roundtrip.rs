//! End-to-end key handoff between transmit and receive sessions.
//!
//! A transmit session produces KM records and encrypted packets; a
//! receive session fed those records must recover every payload. The
//! tests cover both framings, all key lengths, passphrase and
//! pre-shared secrets, decryption across a rotation boundary, and
//! directional clones.

use std::time::Instant;

use keywheel_core::{
    ContextStatus, Direction, Encapsulation, KeyFlags, Secret, Session, SessionConfig,
};

const MESSAGE: &[u8] = b"the quick brown fox jumps over the lazy dog";

fn pair(encapsulation: Encapsulation, key_len: usize) -> (Session, Session) {
    let config =
        SessionConfig::new(encapsulation, key_len, 1456, Secret::passphrase("correct horse"));
    let tx = Session::create(config.clone().transmit()).expect("transmit create");
    let rx = Session::create(config).expect("receive create");
    (tx, rx)
}

/// Runs one packet through `tx`, forwards every KM record to `rx`, and
/// returns the full wire image (prefix + ciphertext).
fn send(tx: &mut Session, rx: &mut Session, seqno: u32, payload: &[u8]) -> Vec<u8> {
    let mut packet = tx.tx_buffer(payload.len()).expect("buffer fits");
    if packet.prefix_len() == 16 {
        packet.prefix_mut()[..4].copy_from_slice(&seqno.to_be_bytes());
    }
    packet.payload_mut().copy_from_slice(payload);
    let batch = tx.process(Instant::now(), &mut packet, 2).expect("process succeeds");
    for record in &batch.key_material {
        rx.receive_km(record).expect("km accepted");
    }
    packet.as_bytes().to_vec()
}

fn decrypt(rx: &mut Session, wire: &[u8], prefix_len: usize) -> Vec<u8> {
    let mut payload = wire[prefix_len..].to_vec();
    let written = rx.decrypt_packet(&wire[..prefix_len], &mut payload).expect("decrypts");
    payload.truncate(written);
    payload
}

#[test]
fn km_handoff_then_payload_roundtrip() {
    for key_len in [16usize, 24, 32] {
        let (mut tx, mut rx) = pair(Encapsulation::Srt, key_len);
        let wire = send(&mut tx, &mut rx, 7, MESSAGE);
        assert_ne!(&wire[16..], MESSAGE, "payload must be transformed on the wire");
        assert_eq!(decrypt(&mut rx, &wire, 16), MESSAGE);
    }
}

/// INVARIANT: keystreams are derived per packet from the carried
/// index, so arrival order does not matter.
#[test]
fn standalone_framing_decrypts_out_of_order() {
    let (mut tx, mut rx) = pair(Encapsulation::TsUdp, 16);
    let first = send(&mut tx, &mut rx, 0, b"first packet payload");
    let second = send(&mut tx, &mut rx, 0, b"second packet payload");

    assert_eq!(decrypt(&mut rx, &second, 8), b"second packet payload");
    assert_eq!(decrypt(&mut rx, &first, 8), b"first packet payload");
}

#[test]
fn preshared_secret_handoff() {
    let secret = Secret::Preshared((0u8..32).collect());
    let config = SessionConfig::new(Encapsulation::Srt, 16, 1456, secret);
    let mut tx = Session::create(config.clone().transmit()).expect("transmit create");
    let mut rx = Session::create(config).expect("receive create");

    let wire = send(&mut tx, &mut rx, 2, MESSAGE);
    assert_eq!(decrypt(&mut rx, &wire, 16), MESSAGE);
}

#[test]
fn first_batch_leads_with_key_material() {
    let mut config =
        SessionConfig::new(Encapsulation::Srt, 16, 1456, Secret::passphrase("correct horse"))
            .transmit();
    config.km_refresh_rate = 1000;
    config.km_pre_announce = 50;
    let mut session = Session::create(config).expect("create succeeds");

    let mut packet = session.tx_buffer(100).expect("buffer fits");
    packet.prefix_mut()[..4].copy_from_slice(&1u32.to_be_bytes());
    let batch = session.process(Instant::now(), &mut packet, 2).expect("process succeeds");
    assert_eq!(batch.key_material.len(), 1, "first batch announces the active key");
    assert_eq!(batch.slot_count(), 2);
    assert_eq!(batch.packet_len, packet.len());
}

/// INVARIANT: the retired key stays installed on both ends, so packets
/// from before the switch decrypt even when they arrive after it.
#[test]
fn rotation_boundary_keeps_old_packets_decryptable() {
    let mut config =
        SessionConfig::new(Encapsulation::Srt, 16, 1456, Secret::passphrase("correct horse"));
    config.km_refresh_rate = 6;
    config.km_pre_announce = 2;
    let mut tx = Session::create(config.clone().transmit()).expect("transmit create");
    let mut rx = Session::create(config).expect("receive create");

    let mut wires = Vec::new();
    for seqno in 0..8u32 {
        wires.push(send(&mut tx, &mut rx, seqno, MESSAGE));
    }

    assert_eq!(tx.key_flags().expect("active"), KeyFlags::Odd);
    assert_eq!(tx.contexts()[0].status(), ContextStatus::Decommissioned);

    // Straggler from before the switch, then current traffic.
    assert_eq!(decrypt(&mut rx, &wires[0], 16), MESSAGE);
    assert_eq!(decrypt(&mut rx, &wires[7], 16), MESSAGE);
}

/// A sender spawned off a receiver reuses the installed key rather
/// than generating its own, so the peer needs no additional KM.
#[test]
fn transmit_clone_sends_under_the_receivers_key() {
    let (mut tx, mut rx) = pair(Encapsulation::Srt, 16);
    send(&mut tx, &mut rx, 1, MESSAGE);

    let mut clone = rx.clone_for(Direction::Transmit).expect("clone succeeds");
    let mut packet = clone.tx_buffer(MESSAGE.len()).expect("buffer fits");
    packet.prefix_mut()[..4].copy_from_slice(&9u32.to_be_bytes());
    packet.payload_mut().copy_from_slice(MESSAGE);
    clone.process(Instant::now(), &mut packet, 2).expect("process succeeds");

    let mut payload = packet.payload().to_vec();
    let written = rx.decrypt_packet(packet.prefix(), &mut payload).expect("decrypts");
    assert_eq!(&payload[..written], MESSAGE);
}

#[test]
fn receive_clone_of_a_sender_reads_its_own_stream() {
    let (mut tx, _) = pair(Encapsulation::Srt, 16);
    let mut loopback = tx.clone_for(Direction::Receive).expect("clone succeeds");

    let mut packet = tx.tx_buffer(MESSAGE.len()).expect("buffer fits");
    packet.prefix_mut()[..4].copy_from_slice(&5u32.to_be_bytes());
    packet.payload_mut().copy_from_slice(MESSAGE);
    tx.process(Instant::now(), &mut packet, 0).expect("process succeeds");

    let mut payload = packet.payload().to_vec();
    let written = loopback.decrypt_packet(packet.prefix(), &mut payload).expect("decrypts");
    assert_eq!(&payload[..written], MESSAGE);
}

/// Data can outrun its KM record; the failure is transient and the
/// same ciphertext decrypts once the record lands.
#[test]
fn packet_ahead_of_its_key_material_is_retriable() {
    let (mut tx, mut rx) = pair(Encapsulation::Srt, 16);

    let mut packet = tx.tx_buffer(MESSAGE.len()).expect("buffer fits");
    packet.prefix_mut()[..4].copy_from_slice(&1u32.to_be_bytes());
    packet.payload_mut().copy_from_slice(MESSAGE);
    let batch = tx.process(Instant::now(), &mut packet, 2).expect("process succeeds");

    let mut payload = packet.payload().to_vec();
    let err = rx.decrypt_packet(packet.prefix(), &mut payload).expect_err("no key yet");
    assert!(err.is_transient());

    for record in &batch.key_material {
        rx.receive_km(record).expect("km accepted");
    }
    let written = rx.decrypt_packet(packet.prefix(), &mut payload).expect("decrypts");
    assert_eq!(&payload[..written], MESSAGE);
}
