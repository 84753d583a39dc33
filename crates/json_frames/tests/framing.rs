use json_frames::{split_frames, FrameError, FrameLimits, SyncFrameReader};
use serde_json::{json, Value};

fn objects() -> Vec<Value> {
    vec![
        json!({"site_number": "05586100", "code": "00065", "times": [], "values": []}),
        json!({"note": "closing } and opening { inside a string"}),
        json!({"nested": {"deeper": {"list": [{"a": 1}, {"b": "}}}"}]}}}),
        json!({"escaped": "quote \" then brace }"}),
        json!({"message": "upstream failure"}),
    ]
}

#[test]
fn concatenated_objects_yield_one_frame_each() {
    let values = objects();
    let mut stream = Vec::new();
    for value in &values {
        stream.extend_from_slice(serde_json::to_string(value).unwrap().as_bytes());
    }

    let frames = split_frames(&stream);
    assert_eq!(frames.len(), values.len());
    for (frame, expected) in frames.iter().zip(values.iter()) {
        let frame = frame.as_ref().expect("frame");
        let reparsed: Value = serde_json::from_slice(&frame.bytes).expect("re-parse");
        assert_eq!(&reparsed, expected);
    }
}

#[test]
fn string_value_with_closing_brace_does_not_end_frame_early() {
    // A reader that stops at the first `}` would hand `{"id":"a}` to the parser.
    let stream = br#"{"id":"a}","code":"00060"}{"id":"b","code":"00065"}"#;
    let frames = split_frames(stream);
    assert_eq!(frames.len(), 2);

    let first: Value = serde_json::from_slice(&frames[0].as_ref().unwrap().bytes).unwrap();
    assert_eq!(first["id"], "a}");
    assert_eq!(first["code"], "00060");
}

#[test]
fn bytes_before_and_between_frames_are_ignored() {
    let stream = b"&{Host:localhost}\n{\"a\":1}\r\n  {\"b\":2}\n";
    let mut reader = SyncFrameReader::new(&stream[..], FrameLimits::default());
    let frames: Vec<_> = reader.by_ref().collect();

    // The Go-style debug print is itself brace-delimited, so it surfaces as a frame that the
    // caller will fail to parse.
    assert_eq!(frames.len(), 3);
    assert_eq!(frames[0].as_ref().unwrap().bytes, b"{Host:localhost}");
    assert_eq!(frames[1].as_ref().unwrap().bytes, b"{\"a\":1}");
    assert_eq!(frames[2].as_ref().unwrap().frame_number, 3);
    assert_eq!(reader.skipped_bytes(), 1 + 1 + 2 + 2 + 1);
}

#[test]
fn clean_end_of_stream_yields_no_error() {
    let frames = split_frames(b"{\"a\":1}\n\n");
    assert_eq!(frames.len(), 1);
    assert!(frames[0].is_ok());
}

#[test]
fn source_closing_mid_frame_is_truncation() {
    let frames = split_frames(b"{\"a\":1}{\"b\":[1,2");
    assert_eq!(frames.len(), 2);
    match &frames[1] {
        Err(err @ FrameError::Truncated { frame_number, .. }) => {
            assert_eq!(*frame_number, 2);
            assert!(!err.is_recoverable());
        }
        other => panic!("expected truncation, got {other:?}"),
    }
}

#[test]
fn empty_stream_has_no_frames() {
    assert!(split_frames(b"").is_empty());
}
