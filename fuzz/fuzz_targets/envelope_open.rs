//! Opening an arbitrary envelope under a fixed key must never panic and
//! must reject everything that was not sealed under that key.

#![no_main]

use arbitrary::Arbitrary;
use emberlink_core::open_with_key;
use emberlink_crypto::SymmetricKey;
use emberlink_proto::{Envelope, MacAddress, MessageType};
use libfuzzer_sys::fuzz_target;

#[derive(Arbitrary, Debug)]
struct Input {
    tag: u8,
    key_id: u8,
    counter: u16,
    nonce: [u8; 12],
    ciphertext: Vec<u8>,
    src: [u8; 6],
    dst: [u8; 6],
}

fuzz_target!(|input: Input| {
    let Ok(msg_type) = MessageType::from_tag(input.tag) else {
        return;
    };
    if !msg_type.is_envelope() {
        return;
    }

    let envelope = Envelope {
        msg_type,
        key_id: input.key_id,
        counter: input.counter,
        nonce: input.nonce,
        ciphertext: input.ciphertext,
    };
    let key = SymmetricKey::from_bytes([0x42; 32]);
    let result = open_with_key(
        &key,
        &envelope,
        MacAddress::new(input.src),
        MacAddress::new(input.dst),
    );
    assert!(result.is_err(), "random bytes must never authenticate");
});
