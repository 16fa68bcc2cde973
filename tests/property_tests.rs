//! Property-based tests using proptest
//!
//! Frames survive the codec no matter how the byte stream is chunked, and
//! malformed prefixes never panic the decoder.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use bytes::BytesMut;
use lobby_relay::core::codec::FrameCodec;
use lobby_relay::core::frame::{Frame, MAX_FRAME_SIZE};
use proptest::prelude::*;
use tokio_util::codec::{Decoder, Encoder};

fn frame_strategy() -> impl Strategy<Value = Frame> {
    (
        any::<u16>(),
        any::<i32>(),
        prop::collection::vec(any::<u8>(), 0..MAX_FRAME_SIZE),
    )
        .prop_map(|(kind, hold, body)| Frame::from_raw(kind, hold, body.into()).unwrap())
}

// Property: a sequence of frames decodes back identically under any chunking
proptest! {
    #[test]
    fn prop_frames_roundtrip_across_chunks(
        frames in prop::collection::vec(frame_strategy(), 1..5),
        chunk in 1usize..512,
    ) {
        let mut wire = BytesMut::new();
        for frame in &frames {
            FrameCodec.encode(frame.clone(), &mut wire).unwrap();
        }

        let mut codec = FrameCodec;
        let mut buffer = BytesMut::new();
        let mut decoded = Vec::new();
        for piece in wire.chunks(chunk) {
            buffer.extend_from_slice(piece);
            while let Some(frame) = codec.decode(&mut buffer).unwrap() {
                decoded.push(frame);
            }
        }

        prop_assert!(buffer.is_empty());
        prop_assert_eq!(decoded, frames);
    }
}

// Property: bytes trailing a frame stay in the buffer untouched
proptest! {
    #[test]
    fn prop_trailing_payload_is_preserved(
        frame in frame_strategy(),
        trailer in prop::collection::vec(any::<u8>(), 0..2048),
    ) {
        let mut buffer = BytesMut::new();
        FrameCodec.encode(frame.clone(), &mut buffer).unwrap();
        buffer.extend_from_slice(&trailer);

        let decoded = FrameCodec.decode(&mut buffer).unwrap();
        prop_assert_eq!(decoded, Some(frame));
        prop_assert_eq!(&buffer[..], &trailer[..]);
    }
}

// Property: arbitrary input either decodes, waits, or errors, never panics
proptest! {
    #[test]
    fn prop_decoder_never_panics(data in prop::collection::vec(any::<u8>(), 0..8192)) {
        let mut buffer = BytesMut::from(&data[..]);
        let _ = FrameCodec.decode(&mut buffer);
    }
}

// Property: bodies at or above the cap are refused at construction
proptest! {
    #[test]
    fn prop_oversized_body_rejected(extra in 0usize..1024) {
        let body = vec![0u8; MAX_FRAME_SIZE + extra];
        prop_assert!(Frame::from_raw(1, 0, body.into()).is_err());
    }
}
