//! Unit tests for kgcheck-wire

use bytes::{BufMut, Bytes, BytesMut};
use kgcheck_types::{CollectionName, ErrorKind, ItemSet, NodeId, RecordId};
use test_case::test_case;

use crate::{
    FRAME_HEADER_SIZE, Frame, MAGIC, MAX_PAYLOAD_SIZE, PROTOCOL_VERSION, Request, RequestBody,
    RequestId, Response, ResponseBody, WireError,
};

fn update_request() -> Request {
    Request::new(
        RequestId::new(7),
        RequestBody::Update {
            collection: CollectionName::new("forumkeygroup"),
            record: RecordId::new("forumkey"),
            payload: ["c1-1", "c2-4"].into_iter().collect::<ItemSet>().encode(),
        },
    )
}

// ============================================================================
// Frame Tests
// ============================================================================

#[test]
fn frame_header_layout() {
    let bytes = Frame::new(Bytes::from_static(b"abc")).to_bytes().unwrap();

    assert_eq!(&bytes[..4], &MAGIC);
    assert_eq!(bytes[4], PROTOCOL_VERSION);
    assert_eq!(&bytes[5..FRAME_HEADER_SIZE], &3u32.to_be_bytes());
    assert_eq!(&bytes[FRAME_HEADER_SIZE..], b"abc");
}

#[test]
fn partial_frame_decodes_to_none_until_complete() {
    let encoded = Frame::new(Bytes::from_static(b"hello world")).to_bytes().unwrap();
    let mut buf = BytesMut::new();

    for (i, byte) in encoded.iter().enumerate() {
        buf.put_u8(*byte);
        let decoded = Frame::decode(&mut buf).unwrap();
        if i + 1 < encoded.len() {
            assert!(decoded.is_none(), "decoded early at byte {i}");
        } else {
            assert_eq!(decoded.unwrap().payload, Bytes::from_static(b"hello world"));
        }
    }
    assert!(buf.is_empty());
}

#[test]
fn back_to_back_frames_decode_in_order() {
    let mut buf = BytesMut::new();
    Frame::new(Bytes::from_static(b"one")).encode(&mut buf).unwrap();
    Frame::new(Bytes::from_static(b"two")).encode(&mut buf).unwrap();

    let first = Frame::decode(&mut buf).unwrap().unwrap();
    let second = Frame::decode(&mut buf).unwrap().unwrap();

    assert_eq!(first.payload, Bytes::from_static(b"one"));
    assert_eq!(second.payload, Bytes::from_static(b"two"));
    assert!(Frame::decode(&mut buf).unwrap().is_none());
}

#[test]
fn bad_magic_is_rejected() {
    let mut buf = BytesMut::from(&b"HTTP/1.1 200"[..]);
    assert!(matches!(
        Frame::decode(&mut buf),
        Err(WireError::InvalidMagic(_))
    ));
}

#[test]
fn unknown_version_is_rejected() {
    let mut buf = BytesMut::new();
    buf.put_slice(&MAGIC);
    buf.put_u8(PROTOCOL_VERSION + 1);
    buf.put_u32(0);

    assert!(matches!(
        Frame::decode(&mut buf),
        Err(WireError::UnsupportedVersion { .. })
    ));
}

#[test]
fn oversized_frame_is_rejected_before_buffering() {
    let mut buf = BytesMut::new();
    buf.put_slice(&MAGIC);
    buf.put_u8(PROTOCOL_VERSION);
    buf.put_u32((MAX_PAYLOAD_SIZE + 1) as u32);

    assert!(matches!(
        Frame::decode(&mut buf),
        Err(WireError::FrameTooLarge { .. })
    ));
}

#[test]
fn oversized_payload_is_refused_before_encoding() {
    let frame = Frame::new(vec![0u8; MAX_PAYLOAD_SIZE + 1]);
    let mut buf = BytesMut::new();
    buf.put_slice(b"prefix");

    let err = frame.encode(&mut buf).unwrap_err();

    assert!(matches!(
        err,
        WireError::FrameTooLarge { size, max } if size == MAX_PAYLOAD_SIZE + 1 && max == MAX_PAYLOAD_SIZE
    ));
    assert_eq!(&buf[..], b"prefix");
    assert!(frame.to_bytes().is_err());
}

#[test]
fn payload_at_the_limit_encodes() {
    let frame = Frame::new(vec![7u8; MAX_PAYLOAD_SIZE]);
    let mut buf = BytesMut::new();
    frame.encode(&mut buf).unwrap();

    let decoded = Frame::decode(&mut buf).unwrap().unwrap();
    assert_eq!(decoded.payload.len(), MAX_PAYLOAD_SIZE);
}

// ============================================================================
// Message Tests
// ============================================================================

#[test]
fn request_survives_framing() {
    let request = update_request();
    let mut buf = BytesMut::new();
    request.to_frame().unwrap().encode(&mut buf).unwrap();

    let frame = Frame::decode(&mut buf).unwrap().unwrap();
    assert_eq!(Request::from_frame(&frame).unwrap(), request);
}

#[test_case(ResponseBody::Done; "done")]
#[test_case(ResponseBody::Versions(vec![]); "no versions")]
#[test_case(ResponseBody::Versions(vec![Bytes::from_static(b"[]"), Bytes::from_static(b"[\"a\"]")]); "siblings")]
#[test_case(ResponseBody::Error { kind: ErrorKind::Conflict, message: "stale".into() }; "error")]
fn response_survives_framing(body: ResponseBody) {
    let response = Response::new(RequestId::new(42), body);
    let frame = response.to_frame().unwrap();
    assert_eq!(Response::from_frame(&frame).unwrap(), response);
}

#[test]
fn garbage_payload_is_a_serialization_error() {
    let frame = Frame::new(Bytes::from_static(&[0xff, 0xff, 0xff]));
    assert!(matches!(
        Request::from_frame(&frame),
        Err(WireError::Serialization(_))
    ));
}

#[test]
fn op_names() {
    let body = RequestBody::AddReplica {
        collection: CollectionName::new("kg"),
        node: NodeId::new("n2"),
    };
    assert_eq!(body.op_name(), "add_replica");
    assert_eq!(update_request().body.op_name(), "update");
}

mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn split_delivery_never_corrupts_frames(
            payloads in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..64), 1..6),
            chunk in 1usize..17,
        ) {
            let mut wire = BytesMut::new();
            for p in &payloads {
                Frame::new(p.clone()).encode(&mut wire).unwrap();
            }

            let mut buf = BytesMut::new();
            let mut decoded = Vec::new();
            for piece in wire.chunks(chunk) {
                buf.put_slice(piece);
                while let Some(frame) = Frame::decode(&mut buf).unwrap() {
                    decoded.push(frame.payload.to_vec());
                }
            }

            prop_assert_eq!(decoded, payloads);
        }
    }
}
