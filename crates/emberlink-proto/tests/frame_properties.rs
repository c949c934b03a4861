//! Property tests for the frame codec.
//!
//! Two families: round-trip (any well-formed frame survives
//! encode → decode unchanged) and totality (decode never panics and
//! never accepts an oversized input, whatever the bytes).

use emberlink_proto::{
    AEAD_TAG_LEN, ENVELOPE_HEADER_LEN, Envelope, Frame, HANDSHAKE_IV_LEN, HMAC_LEN,
    InvalidateReason, MAX_FRAME_LEN, MessageType, NONCE_LEN, PUBLIC_KEY_LEN,
};
use proptest::prelude::*;

fn arb_envelope_type() -> impl Strategy<Value = MessageType> {
    prop_oneof![
        Just(MessageType::SensorData),
        Just(MessageType::DownstreamDataSet),
        Just(MessageType::ControlData),
        Just(MessageType::DownstreamCtrlData),
        Just(MessageType::ClockRequest),
        Just(MessageType::ClockResponse),
        Just(MessageType::NodeNameSet),
        Just(MessageType::HaDiscovery),
        Just(MessageType::DownstreamDataGet),
        Just(MessageType::NodeNameResult),
        Just(MessageType::BroadcastKeyResponse),
        Just(MessageType::BroadcastKeyRequest),
        Just(MessageType::SensorBroadcastData),
        Just(MessageType::DownstreamBroadcastDataSet),
        Just(MessageType::DownstreamBroadcastCtrlData),
        Just(MessageType::DownstreamBroadcastDataGet),
    ]
}

fn arb_frame() -> impl Strategy<Value = Frame> {
    let max_ciphertext = MAX_FRAME_LEN - ENVELOPE_HEADER_LEN;
    let max_clear = MAX_FRAME_LEN - 3;
    prop_oneof![
        (any::<[u8; PUBLIC_KEY_LEN]>(), any::<[u8; HANDSHAKE_IV_LEN]>(), any::<[u8; HMAC_LEN]>())
            .prop_map(|(public_key, iv, hmac)| Frame::ClientHello { public_key, iv, hmac }),
        (
            any::<[u8; PUBLIC_KEY_LEN]>(),
            any::<[u8; HANDSHAKE_IV_LEN]>(),
            any::<u8>(),
            any::<[u8; HMAC_LEN]>(),
        )
            .prop_map(|(public_key, iv, key_id, hmac)| Frame::ServerHello {
                public_key,
                iv,
                key_id,
                hmac
            }),
        (
            arb_envelope_type(),
            any::<u8>(),
            any::<u16>(),
            any::<[u8; NONCE_LEN]>(),
            proptest::collection::vec(any::<u8>(), AEAD_TAG_LEN..=max_ciphertext),
        )
            .prop_map(|(msg_type, key_id, counter, nonce, ciphertext)| Frame::Envelope(
                Envelope { msg_type, key_id, counter, nonce, ciphertext }
            )),
        (any::<u16>(), proptest::collection::vec(any::<u8>(), 0..=max_clear))
            .prop_map(|(counter, payload)| Frame::ClearData { counter, payload }),
        (
            prop_oneof![
                Just(InvalidateReason::UnknownError),
                Just(InvalidateReason::WrongData),
                Just(InvalidateReason::UnregisteredNode),
                Just(InvalidateReason::KeyExpired),
                Just(InvalidateReason::Kicked),
            ],
            any::<[u8; HMAC_LEN]>()
        )
            .prop_map(|(reason, hmac)| Frame::InvalidateKey { reason, hmac }),
    ]
}

proptest! {
    #[test]
    fn frame_round_trip(frame in arb_frame()) {
        let wire = frame.to_bytes().expect("within MTU by construction");
        prop_assert!(wire.len() <= MAX_FRAME_LEN);
        let parsed = Frame::decode(&wire).expect("should decode");
        prop_assert_eq!(parsed, frame);
    }

    #[test]
    fn decode_is_total(bytes in proptest::collection::vec(any::<u8>(), 0..=300)) {
        // Must never panic; acceptance implies the input was within MTU.
        if Frame::decode(&bytes).is_ok() {
            prop_assert!(bytes.len() <= MAX_FRAME_LEN);
        }
    }

    #[test]
    fn decoded_frames_reencode_identically(bytes in proptest::collection::vec(any::<u8>(), 0..=MAX_FRAME_LEN)) {
        if let Ok(frame) = Frame::decode(&bytes) {
            let wire = frame.to_bytes().expect("decoded frame is within MTU");
            prop_assert_eq!(wire, bytes);
        }
    }
}
