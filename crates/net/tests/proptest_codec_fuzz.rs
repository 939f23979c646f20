//! Fuzz-style property tests for network codec
//!
//! These tests validate that message decoders handle arbitrary
//! network input gracefully without crashing.

use fpsim_core::SimTick;
use fpsim_input::{ButtonSet, TickInput};
use fpsim_net::{
    decode_client_message, decode_server_message, encode_client_message, encode_server_message,
    ClientMessage, InputBundle, ServerMessage, TickedInput,
};
use glam::Vec2;
use proptest::prelude::*;

fn tick_input() -> impl Strategy<Value = TickInput> {
    (
        -1.0f32..1.0,
        -1.0f32..1.0,
        -10.0f32..10.0,
        -10.0f32..10.0,
        any::<u16>(),
        any::<u16>(),
    )
        .prop_map(|(mx, my, lx, ly, held, previous)| TickInput {
            movement: Vec2::new(mx, my).clamp_length_max(1.0),
            look_delta: Vec2::new(lx, ly),
            held: ButtonSet::from_bits_truncate(held),
            previous: ButtonSet::from_bits_truncate(previous),
        })
}

proptest! {
    /// Property: Arbitrary bytes don't crash client decoder
    #[test]
    fn arbitrary_bytes_dont_crash_client(
        random_bytes in prop::collection::vec(any::<u8>(), 0..2000),
    ) {
        if let Ok(msg) = decode_client_message(&random_bytes) {
            let _ = msg.verify();
        }
    }

    /// Property: Arbitrary bytes don't crash server decoder
    #[test]
    fn arbitrary_bytes_dont_crash_server(
        random_bytes in prop::collection::vec(any::<u8>(), 0..2000),
    ) {
        if let Ok(msg) = decode_server_message(&random_bytes) {
            let _ = msg.verify();
        }
    }

    /// Property: A valid header over random payload bytes never panics
    #[test]
    fn framed_garbage_dont_crash(
        tag in 0u8..4,
        payload in prop::collection::vec(any::<u8>(), 0..512),
    ) {
        let mut frame = ((payload.len() + 1) as u32).to_le_bytes().to_vec();
        frame.push(tag);
        frame.extend_from_slice(&payload);
        let _ = decode_client_message(&frame);
        let _ = decode_server_message(&frame);
    }

    /// Property: Handshake messages roundtrip
    #[test]
    fn handshake_roundtrips(
        version in any::<u16>(),
        schema_hash in any::<u64>(),
    ) {
        let msg = ClientMessage::Handshake {
            version,
            schema_hash,
        };

        let encoded = encode_client_message(&msg).unwrap();
        let decoded = decode_client_message(&encoded).unwrap();

        prop_assert_eq!(msg, decoded);
    }

    /// Property: Redundant input bundles roundtrip and stay valid
    #[test]
    fn input_bundle_roundtrips(
        entity in any::<u64>(),
        first in 0u64..1_000_000,
        inputs in prop::collection::vec(tick_input(), 1..8),
    ) {
        let bundle = InputBundle {
            entity,
            inputs: inputs
                .into_iter()
                .enumerate()
                .map(|(i, input)| TickedInput { tick: SimTick(first + i as u64), input })
                .collect(),
        };
        prop_assert!(bundle.verify().is_ok());
        let msg = ClientMessage::Input(bundle);

        let encoded = encode_client_message(&msg).unwrap();
        let decoded = decode_client_message(&encoded).unwrap();

        prop_assert_eq!(msg, decoded);
    }

    /// Property: Server handshake roundtrips
    #[test]
    fn server_handshake_roundtrips(
        accepted in any::<bool>(),
        entity in any::<u64>(),
        tick in any::<u64>(),
    ) {
        let msg = ServerMessage::HandshakeResponse {
            accepted,
            reason: if accepted { None } else { Some("Test".to_string()) },
            entity: if accepted { Some(entity) } else { None },
            tick: SimTick(tick),
        };

        let encoded = encode_server_message(&msg).unwrap();
        let decoded = decode_server_message(&encoded).unwrap();

        prop_assert_eq!(msg, decoded);
    }

    /// Property: Truncating a valid frame never decodes
    #[test]
    fn truncated_frames_rejected(
        schema_hash in any::<u64>(),
        cut in 1usize..8,
    ) {
        let encoded = encode_client_message(&ClientMessage::Handshake {
            version: 1,
            schema_hash,
        })
        .unwrap();
        let keep = encoded.len().saturating_sub(cut);
        prop_assert!(decode_client_message(&encoded[..keep]).is_err());
    }
}
